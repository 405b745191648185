//! Image preprocessing and cardiac classifier inference.
//!
//! Trained models run through ONNX Runtime (`onnx` feature). Untrained
//! architectures are burn networks evaluated on the CPU `NdArray` backend.
//! Contrast enhancement uses OpenCV when the `opencv` feature is enabled.

#[cfg(not(feature = "opencv"))]
mod clahe;
mod classifier;
#[cfg(not(feature = "opencv"))]
mod color;
mod custom;
mod enhance;
mod network;
#[cfg(feature = "onnx")]
mod onnx;
mod preprocess;
mod transfer;

pub use classifier::{Architecture, Classifier, ModelConfig, load_classifier};
pub use custom::CustomCnn;
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
pub use preprocess::{DEFAULT_INPUT_SIZE, Preprocessor, load_image};
#[cfg(feature = "onnx")]
pub use transfer::TransferClassifier;
pub use transfer::{Features, TransferHead};
