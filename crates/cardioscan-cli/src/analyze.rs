//! Analysis pipeline: decode → model → preprocess → inference → report.

use std::path::Path;
use std::time::Instant;

use cardioscan_ai::{ModelConfig, Preprocessor, load_classifier, load_image};
use cardioscan_core::{AnalysisError, ClinicalTable, DiagnosticReport, PatientData, ResultComposer};
use tracing::{debug, info};

/// Run one image through the classifier described by `config`.
///
/// The image is decoded first so an unreadable file is reported as such
/// whatever the model settings. It is resized once the classifier has fixed
/// the input resolution.
pub fn run_analysis(
    config: &ModelConfig,
    table: &ClinicalTable,
    image: &Path,
    patient: Option<&PatientData>,
) -> Result<DiagnosticReport, AnalysisError> {
    let start = Instant::now();

    let decoded = load_image(image)?;

    let mut classifier = load_classifier(config)?;
    let (height, width) = classifier.input_size();
    info!(classifier = classifier.name(), height, width, "classifier ready");

    let tensor = Preprocessor::new(width, height).preprocess_image(&decoded)?;
    debug!(shape = ?tensor.shape(), "preprocessed image");

    let probabilities = classifier.predict(&tensor)?;
    debug!(probabilities = ?probabilities.as_slice(), "inference complete");

    let report = ResultComposer::new(table).compose(&probabilities, patient);
    info!(
        diagnosis = %report.diagnosis,
        confidence = report.confidence,
        risk = report.risk_level.as_str(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "analysis complete"
    );
    Ok(report)
}
