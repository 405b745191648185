//! Transfer learning: frozen pretrained backbone plus a fresh head.
//!
//! The backbone is any ONNX feature extractor taking an RGB image (e.g. an
//! EfficientNet-B0 export without its top). Its feature map is pooled and fed
//! through `BatchNorm → Dense512(relu) → Dropout(0.5) → Dense256(relu) →
//! Dropout(0.3) → Dense5(softmax)`.

use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{BatchNorm, Dropout, DropoutConfig, Linear};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};
use cardioscan_core::{AnalysisError, NUM_CLASSES, Probabilities};
use tracing::info;

use crate::network::{Cpu, SeededInit, batch_norm, tensor_values};

/// Backbone output handed to the head.
#[derive(Debug, Clone)]
pub enum Features {
    /// `[batch, channels, height, width]` feature map.
    Map(Tensor<Cpu, 4>),
    /// `[batch, channels]`, already pooled by the backbone.
    Pooled(Tensor<Cpu, 2>),
}

impl Features {
    fn channels(&self) -> usize {
        match self {
            Self::Map(t) => t.dims()[1],
            Self::Pooled(t) => t.dims()[1],
        }
    }
}

#[derive(Module, Debug)]
struct HeadNetwork<B: Backend> {
    pool: AdaptiveAvgPool2d,
    norm: BatchNorm<B, 1>,
    fc1: Linear<B>,
    dropout1: Dropout,
    fc2: Linear<B>,
    dropout2: Dropout,
    output: Linear<B>,
}

impl<B: Backend> HeadNetwork<B> {
    fn forward_map(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_pooled(self.pool.forward(features).flatten::<2>(1, 3))
    }

    fn forward_pooled(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(features.unsqueeze_dim::<3>(2)).squeeze::<2>(2);
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(self.dropout1.forward(x)));
        softmax(self.output.forward(self.dropout2.forward(x)), 1)
    }
}

/// Seeded classification head over `channels` backbone features.
#[derive(Debug)]
pub struct TransferHead {
    network: HeadNetwork<Cpu>,
    channels: usize,
}

impl TransferHead {
    pub fn new(channels: usize, seed: u64) -> Self {
        let mut init = SeededInit::new(seed);
        let network = HeadNetwork {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            norm: batch_norm(channels),
            fc1: init.linear(channels, 512),
            dropout1: DropoutConfig::new(0.5).init(),
            fc2: init.linear(512, 256),
            dropout2: DropoutConfig::new(0.3).init(),
            output: init.linear(256, NUM_CLASSES),
        };
        info!(channels, params = network.num_params(), seed, "built classification head");
        Self { network, channels }
    }

    pub fn classify(&self, features: Features) -> Result<Probabilities, AnalysisError> {
        if features.channels() != self.channels {
            return Err(AnalysisError::Inference(format!(
                "head expects {} feature channels, backbone produced {}",
                self.channels,
                features.channels()
            )));
        }
        let output = match features {
            Features::Map(t) => self.network.forward_map(t),
            Features::Pooled(t) => self.network.forward_pooled(t),
        };
        Probabilities::from_model_output(&tensor_values(output)?)
    }
}

#[cfg(feature = "onnx")]
pub use session::TransferClassifier;

#[cfg(feature = "onnx")]
mod session {
    use std::path::Path;

    use burn::tensor::{Tensor, TensorData};
    use cardioscan_core::{AnalysisError, Probabilities};
    use ndarray::Array4;

    use super::{Features, TransferHead};
    use crate::classifier::Classifier;
    use crate::onnx::{ImageSession, Layout};

    /// ONNX backbone followed by a burn head.
    pub struct TransferClassifier {
        backbone: ImageSession,
        head: TransferHead,
    }

    impl TransferClassifier {
        pub fn load(backbone: &Path, input_size: (u32, u32), seed: u64) -> Result<Self, AnalysisError> {
            let session = ImageSession::load(backbone, input_size)?;
            let dims = session.output_dims().unwrap_or_default();
            let channels = feature_channels(&dims, session.layout()).ok_or_else(|| {
                AnalysisError::Load(format!(
                    "{}: cannot determine feature channels from output shape {dims:?}",
                    backbone.display()
                ))
            })?;
            Ok(Self {
                backbone: session,
                head: TransferHead::new(channels, seed),
            })
        }
    }

    impl Classifier for TransferClassifier {
        fn name(&self) -> &str {
            "transfer"
        }

        fn input_size(&self) -> (u32, u32) {
            self.backbone.input_size()
        }

        fn predict(&mut self, input: &Array4<f32>) -> Result<Probabilities, AnalysisError> {
            let (dims, data) = self.backbone.run(input)?;
            let features = to_features(&dims, data, self.backbone.layout())?;
            self.head.classify(features)
        }
    }

    /// Channel count of a static backbone output shape.
    fn feature_channels(dims: &[i64], layout: Layout) -> Option<usize> {
        let c = match (dims.len(), layout) {
            (2, _) => dims[1],
            (4, Layout::Nhwc) => dims[3],
            (4, Layout::Nchw) => dims[1],
            _ => return None,
        };
        usize::try_from(c).ok().filter(|&c| c > 0)
    }

    /// Backbone output as head input. Channels-last maps are moved to channels-first.
    fn to_features(dims: &[i64], data: Vec<f32>, layout: Layout) -> Result<Features, AnalysisError> {
        let d: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
        let expected: usize = d.iter().product();
        if data.len() != expected {
            return Err(AnalysisError::Inference(format!(
                "backbone output {dims:?} holds {} values",
                data.len()
            )));
        }
        let device = Default::default();
        match (d.as_slice(), layout) {
            (&[1, c], _) => Ok(Features::Pooled(Tensor::from_data(TensorData::new(data, [1, c]), &device))),
            (&[1, h, w, c], Layout::Nhwc) => Ok(Features::Map(
                Tensor::from_data(TensorData::new(data, [1, h, w, c]), &device).permute([0, 3, 1, 2]),
            )),
            (&[1, c, h, w], Layout::Nchw) => Ok(Features::Map(Tensor::from_data(
                TensorData::new(data, [1, c, h, w]),
                &device,
            ))),
            _ => Err(AnalysisError::Inference(format!(
                "unsupported backbone output shape {dims:?}"
            ))),
        }
    }

}
