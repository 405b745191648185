//! Diagnostic report composition.
//!
//! Turns a validated probability vector (plus optional patient data) into the
//! report consumed by the backend: top class, confidence, risk tier, and the
//! clinical text for that class.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::clinical::ClinicalTable;
use crate::labels::{CLASS_LABELS, NORMAL_INDEX};
use crate::patient::PatientData;
use crate::probabilities::Probabilities;

pub const MODEL_TYPE: &str = "CNN";
pub const MODEL_VERSION: &str = "1.0.0";

/// Normal vs abnormal finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Abnormal,
}

/// Clinical urgency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Risk tier for a predicted class and its confidence percentage.
    ///
    /// | class | confidence | risk |
    /// |---|---|---|
    /// | Normal | any | Low |
    /// | Cardiomegaly, Pulmonary Congestion | > 80 | Moderate, else Low |
    /// | Aortic Abnormality, Heart Failure | > 70 | High, else Moderate |
    pub fn assess(class_index: usize, confidence: f64) -> Self {
        match class_index {
            NORMAL_INDEX => Self::Low,
            1 | 2 if confidence > 80.0 => Self::Moderate,
            1 | 2 => Self::Low,
            _ if confidence > 70.0 => Self::High,
            _ => Self::Moderate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

/// Per-class probabilities as percentages, in label order.
///
/// Serializes as a JSON object keyed by class label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities(Vec<(&'static str, f64)>);

impl ClassProbabilities {
    fn from_probabilities(probs: &Probabilities) -> Self {
        Self(
            CLASS_LABELS
                .iter()
                .zip(probs.as_slice())
                .map(|(&label, &p)| (label, f64::from(p) * 100.0))
                .collect(),
        )
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, value) in &self.0 {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Structured result of one analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    #[serde(skip)]
    pub predicted_index: usize,
    pub diagnosis: String,
    /// Top-class probability as a percentage, two decimal places.
    pub confidence: f64,
    pub status: Status,
    pub risk_level: RiskLevel,
    pub class_probabilities: ClassProbabilities,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub model_type: &'static str,
    pub model_version: &'static str,
    /// Filled in by the caller; always `null` here.
    pub timestamp: Option<String>,
}

/// Builds [`DiagnosticReport`]s against an injected clinical table.
pub struct ResultComposer<'a> {
    table: &'a ClinicalTable,
}

impl<'a> ResultComposer<'a> {
    pub fn new(table: &'a ClinicalTable) -> Self {
        Self { table }
    }

    /// Compose a report from classifier probabilities.
    pub fn compose(
        &self,
        probs: &Probabilities,
        patient: Option<&PatientData>,
    ) -> DiagnosticReport {
        let (predicted_index, top) = probs.top();
        // Risk uses the unrounded confidence.
        let confidence = f64::from(top) * 100.0;

        let status = if predicted_index == NORMAL_INDEX {
            Status::Normal
        } else {
            Status::Abnormal
        };

        let age = patient.and_then(PatientData::age);

        DiagnosticReport {
            predicted_index,
            diagnosis: CLASS_LABELS[predicted_index].to_string(),
            confidence: round2(confidence),
            status,
            risk_level: RiskLevel::assess(predicted_index, confidence),
            class_probabilities: ClassProbabilities::from_probabilities(probs),
            findings: self.table.findings_for(predicted_index),
            recommendations: self.table.recommendations_for(predicted_index, age),
            model_type: MODEL_TYPE,
            model_version: MODEL_VERSION,
            timestamp: None,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
