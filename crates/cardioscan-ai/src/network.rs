//! Shared burn plumbing for the untrained networks.
//!
//! Everything runs on the pure-Rust `NdArray` backend. Trainable weights are
//! Glorot-uniform draws from a seeded `StdRng` and biases start at zero, so
//! the same seed always rebuilds the same network. Batch norm layers keep
//! their fresh running statistics (mean 0, variance 1).

use burn::backend::NdArray;
use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig};
use burn::tensor::{Tensor, TensorData};
use cardioscan_core::AnalysisError;
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub type Cpu = NdArray<f32>;

/// Keras default.
const BN_EPSILON: f64 = 1e-3;

/// Seeded layer factory.
pub struct SeededInit {
    rng: StdRng,
}

impl SeededInit {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `kernel x kernel` convolution, stride 1, no padding.
    pub fn conv2d(&mut self, c_in: usize, c_out: usize, kernel: usize) -> Conv2d<Cpu> {
        let device = Default::default();
        let mut conv = Conv2dConfig::new([c_in, c_out], [kernel, kernel])
            .with_initializer(Initializer::Zeros)
            .init::<Cpu>(&device);
        let area = kernel * kernel;
        let weight = self.glorot([c_out, c_in, kernel, kernel], c_in * area, c_out * area);
        conv.weight = Param::from_tensor(weight);
        conv
    }

    pub fn linear(&mut self, d_in: usize, d_out: usize) -> Linear<Cpu> {
        let device = Default::default();
        let mut linear = LinearConfig::new(d_in, d_out)
            .with_initializer(Initializer::Zeros)
            .init::<Cpu>(&device);
        linear.weight = Param::from_tensor(self.glorot([d_in, d_out], d_in, d_out));
        linear
    }

    fn glorot<const D: usize>(&mut self, shape: [usize; D], fan_in: usize, fan_out: usize) -> Tensor<Cpu, D> {
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let count = shape.iter().product();
        let values: Vec<f32> = (0..count).map(|_| self.rng.random_range(-limit..limit)).collect();
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }
}

/// Batch norm over `channels` features. `D = 2` for conv maps, `D = 1` for
/// dense activations reshaped to `[batch, channels, 1]`.
pub fn batch_norm<const D: usize>(channels: usize) -> BatchNorm<Cpu, D> {
    BatchNormConfig::new(channels)
        .with_epsilon(BN_EPSILON)
        .init(&Default::default())
}

/// NHWC image batch to an NCHW tensor.
pub fn image_tensor(input: &Array4<f32>) -> Tensor<Cpu, 4> {
    let (n, h, w, c) = input.dim();
    let values: Vec<f32> = input.iter().copied().collect();
    Tensor::<Cpu, 4>::from_data(TensorData::new(values, [n, h, w, c]), &Default::default())
        .permute([0, 3, 1, 2])
}

/// Flat row-major copy of a tensor's values.
pub fn tensor_values<const D: usize>(tensor: Tensor<Cpu, D>) -> Result<Vec<f32>, AnalysisError> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| AnalysisError::Inference(format!("reading network output: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tensor_is_channels_first() {
        // h=1, w=2, c=3
        let input = Array4::from_shape_vec((1, 1, 2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = image_tensor(&input);
        assert_eq!(t.dims(), [1, 3, 1, 2]);
        assert_eq!(tensor_values(t).unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn glorot_weights_are_bounded_and_seeded() {
        let a = tensor_values(SeededInit::new(5).linear(10, 6).weight.val()).unwrap();
        let b = tensor_values(SeededInit::new(5).linear(10, 6).weight.val()).unwrap();
        let c = tensor_values(SeededInit::new(6).linear(10, 6).weight.val()).unwrap();
        let limit = (6.0f32 / 16.0).sqrt();
        assert_eq!(a.len(), 60);
        assert!(a.iter().all(|w| w.abs() <= limit));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn conv_bias_starts_at_zero() {
        let conv = SeededInit::new(1).conv2d(3, 4, 3);
        assert_eq!(conv.weight.val().dims(), [4, 3, 3, 3]);
        let bias = conv.bias.map(|b| tensor_values(b.val()).unwrap()).unwrap_or_default();
        assert_eq!(bias, vec![0.0; 4]);
    }
}
