use std::path::PathBuf;

use thiserror::Error;

/// Every way a single analysis run can fail.
///
/// The CLI renders the `Display` form of these into the failure envelope.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Argument(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not load image from {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl AnalysisError {
    /// Short machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Argument(_) => "argument",
            Self::Config(_) => "config",
            Self::Decode { .. } => "decode",
            Self::Load(_) => "load",
            Self::Inference(_) => "inference",
        }
    }
}
