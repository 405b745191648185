//! Classifier contract and the model provider.
//!
//! A trained model is loaded from an ONNX file. Without one, a fresh
//! architecture can be built instead, but only when the caller explicitly
//! allows untrained inference: its predictions are meaningless.

use std::fmt;
use std::path::{Path, PathBuf};

use cardioscan_core::{AnalysisError, Probabilities};
use ndarray::Array4;
use tracing::warn;

use crate::custom::CustomCnn;
use crate::preprocess::DEFAULT_INPUT_SIZE;

/// Image tensor in, class probabilities out.
pub trait Classifier {
    /// Short description for logs.
    fn name(&self) -> &str;

    /// Expected `(height, width)` of the input image.
    fn input_size(&self) -> (u32, u32);

    /// Run one forward pass over a `[1, height, width, 3]` tensor.
    fn predict(&mut self, input: &Array4<f32>) -> Result<Probabilities, AnalysisError>;
}

/// Which architecture to build when no trained model is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Architecture {
    /// Frozen pretrained ONNX backbone plus a fresh classification head.
    #[default]
    Transfer,
    /// Convolutional stack built from scratch.
    Custom,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transfer => "transfer",
            Self::Custom => "custom",
        })
    }
}

/// Everything the model provider needs to produce a classifier.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Trained ONNX model. Used whenever the file exists.
    pub model_path: Option<PathBuf>,
    pub architecture: Architecture,
    /// ONNX feature extractor for [`Architecture::Transfer`].
    pub backbone_path: Option<PathBuf>,
    /// Permit falling back to a freshly initialised architecture.
    pub allow_untrained: bool,
    /// `(height, width)` for built architectures and dynamic-shape models.
    pub input_size: (u32, u32),
    /// Seed for fresh weight initialisation.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            architecture: Architecture::default(),
            backbone_path: None,
            allow_untrained: false,
            input_size: (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE),
            seed: 42,
        }
    }
}

/// Produce the classifier described by `config`.
///
/// An existing `model_path` is always preferred. Otherwise a fresh
/// architecture is built if `allow_untrained` is set, and a load error is
/// returned if not.
pub fn load_classifier(config: &ModelConfig) -> Result<Box<dyn Classifier>, AnalysisError> {
    match &config.model_path {
        Some(path) if path.exists() => return load_trained(path, config.input_size),
        Some(path) if !config.allow_untrained => {
            return Err(AnalysisError::Load(format!(
                "model file {} not found",
                path.display()
            )));
        }
        Some(path) => warn!(path = %path.display(), "model file not found"),
        None if !config.allow_untrained => {
            return Err(AnalysisError::Load(
                "no trained model supplied (pass --model, or --allow-untrained to run a fresh architecture)"
                    .into(),
            ));
        }
        None => {}
    }

    warn!(
        architecture = %config.architecture,
        "running an untrained classifier; predictions are not clinically meaningful"
    );
    build_untrained(config)
}

fn build_untrained(config: &ModelConfig) -> Result<Box<dyn Classifier>, AnalysisError> {
    match config.architecture {
        Architecture::Custom => Ok(Box::new(CustomCnn::new(config.input_size, config.seed)?)),
        Architecture::Transfer => {
            let backbone = config.backbone_path.as_deref().ok_or_else(|| {
                AnalysisError::Config(
                    "the transfer architecture needs a pretrained backbone (--backbone)".into(),
                )
            })?;
            build_transfer(backbone, config)
        }
    }
}

#[cfg(feature = "onnx")]
fn load_trained(path: &Path, fallback_size: (u32, u32)) -> Result<Box<dyn Classifier>, AnalysisError> {
    let classifier = crate::onnx::OnnxClassifier::load(path, fallback_size)?;
    tracing::info!(model = %path.display(), "loaded trained classifier");
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "onnx"))]
fn load_trained(path: &Path, _fallback_size: (u32, u32)) -> Result<Box<dyn Classifier>, AnalysisError> {
    Err(AnalysisError::Load(format!(
        "cannot load {}: built without ONNX Runtime support (enable the `onnx` feature)",
        path.display()
    )))
}

#[cfg(feature = "onnx")]
fn build_transfer(backbone: &Path, config: &ModelConfig) -> Result<Box<dyn Classifier>, AnalysisError> {
    let classifier = crate::transfer::TransferClassifier::load(backbone, config.input_size, config.seed)?;
    tracing::info!(backbone = %backbone.display(), "built transfer-learning classifier");
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "onnx"))]
fn build_transfer(backbone: &Path, _config: &ModelConfig) -> Result<Box<dyn Classifier>, AnalysisError> {
    Err(AnalysisError::Load(format!(
        "cannot load backbone {}: built without ONNX Runtime support (enable the `onnx` feature)",
        backbone.display()
    )))
}
