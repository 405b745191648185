//! Core types for CardioScan: class labels, clinical reference data, patient
//! metadata, and composition of diagnostic reports from model output.

pub mod clinical;
pub mod error;
pub mod labels;
pub mod patient;
pub mod probabilities;
pub mod report;

pub use clinical::{ClinicalEntry, ClinicalTable};
pub use error::AnalysisError;
pub use labels::{CLASS_LABELS, NUM_CLASSES};
pub use patient::PatientData;
pub use probabilities::{Probabilities, softmax};
pub use report::{ClassProbabilities, DiagnosticReport, ResultComposer, RiskLevel, Status};
