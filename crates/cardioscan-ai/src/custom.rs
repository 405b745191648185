//! Fully custom CNN built from scratch.
//!
//! Four conv blocks (32/64/128/256 filters), each
//! `Conv3x3(relu) → BatchNorm → MaxPool2x2 → Dropout(0.25)`, then
//! `Flatten → Dense512(relu) → BatchNorm → Dropout(0.5) → Dense256(relu) →
//! Dropout(0.3) → Dense5(softmax)`.

use burn::nn::conv::Conv2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, Dropout, DropoutConfig, Linear};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};
use cardioscan_core::{AnalysisError, NUM_CLASSES, Probabilities};
use ndarray::Array4;
use tracing::info;

use crate::classifier::Classifier;
use crate::network::{Cpu, SeededInit, batch_norm, image_tensor, tensor_values};

const BLOCK_FILTERS: [usize; 4] = [32, 64, 128, 256];
const KERNEL: usize = 3;

#[derive(Module, Debug)]
struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    pool: MaxPool2d,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv.forward(x));
        let x = self.pool.forward(self.norm.forward(x));
        self.dropout.forward(x)
    }
}

#[derive(Module, Debug)]
struct Network<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    fc1: Linear<B>,
    norm: BatchNorm<B, 1>,
    dropout1: Dropout,
    fc2: Linear<B>,
    dropout2: Dropout,
    output: Linear<B>,
}

impl<B: Backend> Network<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(images, |x, block| block.forward(x));
        let x = relu(self.fc1.forward(x.flatten::<2>(1, 3)));
        let x = self.norm.forward(x.unsqueeze_dim::<3>(2)).squeeze::<2>(2);
        let x = relu(self.fc2.forward(self.dropout1.forward(x)));
        softmax(self.output.forward(self.dropout2.forward(x)), 1)
    }
}

/// Custom convolutional classifier with freshly initialised weights.
pub struct CustomCnn {
    network: Network<Cpu>,
    input_size: (u32, u32),
}

impl CustomCnn {
    /// Build the architecture for a `(height, width)` input.
    ///
    /// Fails when the input is too small to survive all four conv blocks.
    pub fn new(input_size: (u32, u32), seed: u64) -> Result<Self, AnalysisError> {
        let (height, width) = input_size;
        let out_h = feature_extent(height as usize).ok_or_else(|| too_small(input_size))?;
        let out_w = feature_extent(width as usize).ok_or_else(|| too_small(input_size))?;

        let mut init = SeededInit::new(seed);
        let mut blocks = Vec::with_capacity(BLOCK_FILTERS.len());
        let mut channels = 3;
        for filters in BLOCK_FILTERS {
            blocks.push(ConvBlock {
                conv: init.conv2d(channels, filters, KERNEL),
                norm: batch_norm(filters),
                pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
                dropout: DropoutConfig::new(0.25).init(),
            });
            channels = filters;
        }

        let flat = out_h * out_w * channels;
        let network = Network {
            blocks,
            fc1: init.linear(flat, 512),
            norm: batch_norm(512),
            dropout1: DropoutConfig::new(0.5).init(),
            fc2: init.linear(512, 256),
            dropout2: DropoutConfig::new(0.3).init(),
            output: init.linear(256, NUM_CLASSES),
        };

        info!(height, width, flat, params = network.num_params(), seed, "built custom CNN");
        Ok(Self { network, input_size })
    }
}

impl Classifier for CustomCnn {
    fn name(&self) -> &str {
        "custom-cnn"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn predict(&mut self, input: &Array4<f32>) -> Result<Probabilities, AnalysisError> {
        let (h, w) = self.input_size;
        let expected = [1, h as usize, w as usize, 3];
        if input.shape() != expected {
            return Err(AnalysisError::Inference(format!(
                "custom CNN expects input {expected:?}, got {:?}",
                input.shape()
            )));
        }
        let output = self.network.forward(image_tensor(input));
        Probabilities::from_model_output(&tensor_values(output)?)
    }
}

/// Spatial extent left after the four conv/pool blocks, if any.
fn feature_extent(mut size: usize) -> Option<usize> {
    for _ in BLOCK_FILTERS {
        size = size.checked_sub(KERNEL - 1)? / 2;
        if size == 0 {
            return None;
        }
    }
    Some(size)
}

/// Smallest square input the custom CNN accepts.
fn min_input_size() -> u32 {
    (1..).find(|&s| feature_extent(s as usize).is_some()).unwrap_or(u32::MAX)
}

fn too_small((h, w): (u32, u32)) -> AnalysisError {
    AnalysisError::Config(format!(
        "custom CNN needs at least {0}x{0} input, got {h}x{w}",
        min_input_size()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_extent_at_default_resolution() {
        assert_eq!(feature_extent(224), Some(12));
    }

    #[test]
    fn minimum_input_size() {
        assert_eq!(min_input_size(), 46);
        assert_eq!(feature_extent(46), Some(1));
        assert_eq!(feature_extent(45), None);
    }

    #[test]
    fn layer_sizes_at_minimum_resolution() {
        // Conv kernels and biases, batch norm scale and shift, then the dense stack
        // over a 1x1x256 feature map.
        let conv = 896 + 18_496 + 73_856 + 295_168;
        let norms = 2 * (32 + 64 + 128 + 256) + 2 * 512;
        let dense = 131_584 + 131_328 + 1_285;
        let cnn = CustomCnn::new((46, 46), 42).unwrap();
        assert_eq!(cnn.network.num_params(), conv + norms + dense);
    }

    #[test]
    fn rejects_tiny_input() {
        let err = CustomCnn::new((32, 32), 42).err().unwrap();
        assert!(matches!(err, AnalysisError::Config(_)));
        assert!(err.to_string().contains("46x46"), "{err}");
    }

    #[test]
    fn predicts_a_distribution() {
        let mut cnn = CustomCnn::new((48, 48), 42).unwrap();
        let input = Array4::from_shape_fn((1, 48, 48, 3), |(_, y, x, c)| {
            ((y * 48 + x) * 3 + c) as f32 / (48.0 * 48.0 * 3.0)
        });
        let probs = cnn.predict(&input).unwrap();
        let sum: f32 = probs.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum = {sum}");
        assert!(probs.as_slice().iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn same_seed_same_prediction() {
        let input = Array4::from_elem((1, 48, 48, 3), 0.4f32);
        let mut a = CustomCnn::new((48, 48), 7).unwrap();
        let mut b = CustomCnn::new((48, 48), 7).unwrap();
        let pa = a.predict(&input).unwrap();
        assert_eq!(pa, b.predict(&input).unwrap());
        assert_eq!(pa, a.predict(&input).unwrap());
    }

    #[test]
    fn rejects_mismatched_input() {
        let mut cnn = CustomCnn::new((48, 48), 1).unwrap();
        let err = cnn.predict(&Array4::zeros((1, 50, 48, 3))).unwrap_err();
        assert!(matches!(err, AnalysisError::Inference(_)));
    }
}
