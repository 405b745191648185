//! Clinical reference table: canned findings and recommendations per class.
//!
//! The table is immutable once loaded. A built-in copy is compiled into the
//! binary; a replacement with the same JSON shape can be loaded from disk.
//! Per-request adjustments (see [`ClinicalTable::recommendations_for`]) always
//! work on a fresh copy.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AnalysisError;
use crate::labels::{CLASS_LABELS, NUM_CLASSES};

const BUILTIN_TABLE: &str = include_str!("../data/clinical_table.json");

/// Findings and recommendations for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEntry {
    pub label: String,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Extra recommendation for older patients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeAdvisory {
    /// Applies when the patient's age is strictly greater than this.
    pub age_above: f64,
    pub recommendation: String,
}

/// Clinical reference data keyed by class index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalTable {
    classes: Vec<ClinicalEntry>,
    age_advisory: AgeAdvisory,
}

impl ClinicalTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self, AnalysisError> {
        Self::from_json_str(BUILTIN_TABLE)
    }

    /// Load a replacement table from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("reading clinical table {}: {e}", path.display()))
        })?;
        let table = Self::from_json_str(&text)?;
        debug!(path = %path.display(), "loaded clinical table");
        Ok(table)
    }

    /// Parse and validate a table from JSON text.
    ///
    /// The table must hold exactly one entry per class, labelled in the same
    /// order as [`CLASS_LABELS`].
    pub fn from_json_str(text: &str) -> Result<Self, AnalysisError> {
        let table: Self = serde_json::from_str(text)
            .map_err(|e| AnalysisError::Config(format!("clinical table: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if self.classes.len() != NUM_CLASSES {
            return Err(AnalysisError::Config(format!(
                "clinical table has {} classes, expected {NUM_CLASSES}",
                self.classes.len()
            )));
        }
        for (i, (entry, expected)) in self.classes.iter().zip(CLASS_LABELS).enumerate() {
            if entry.label != expected {
                return Err(AnalysisError::Config(format!(
                    "clinical table entry {i} is labelled {:?}, expected {expected:?}",
                    entry.label
                )));
            }
        }
        Ok(())
    }

    /// Entry for a class index.
    pub fn entry(&self, index: usize) -> Option<&ClinicalEntry> {
        self.classes.get(index)
    }

    /// Findings for a class, copied out of the table.
    pub fn findings_for(&self, index: usize) -> Vec<String> {
        self.entry(index)
            .map(|e| e.findings.clone())
            .unwrap_or_default()
    }

    /// Recommendations for a class, with the age advisory appended when the
    /// patient is older than the advisory threshold.
    ///
    /// Returns a new vector; the table itself is never modified.
    pub fn recommendations_for(&self, index: usize, age: Option<f64>) -> Vec<String> {
        let mut recommendations = self
            .entry(index)
            .map(|e| e.recommendations.clone())
            .unwrap_or_default();
        if age.is_some_and(|a| a > self.age_advisory.age_above) {
            recommendations.push(self.age_advisory.recommendation.clone());
        }
        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let table = ClinicalTable::builtin().unwrap();
        for (i, label) in CLASS_LABELS.iter().enumerate() {
            let entry = table.entry(i).unwrap();
            assert_eq!(&entry.label, label);
            assert!(!entry.findings.is_empty(), "{label} has no findings");
            assert!(!entry.recommendations.is_empty(), "{label} has no recommendations");
        }
        assert_eq!(table.age_advisory.age_above, 65.0);
        assert_eq!(
            table.age_advisory.recommendation,
            "Age-specific cardiac monitoring"
        );
    }

    #[test]
    fn normal_entry_text() {
        let table = ClinicalTable::builtin().unwrap();
        let findings = table.findings_for(0);
        assert_eq!(findings[0], "Cardiothoracic ratio within normal limits");
        assert_eq!(findings.len(), 5);
        assert_eq!(table.recommendations_for(0, None).len(), 4);
    }

    #[test]
    fn age_above_threshold_appends_once() {
        let table = ClinicalTable::builtin().unwrap();
        let base = table.recommendations_for(1, None);
        let elderly = table.recommendations_for(1, Some(70.0));
        assert_eq!(elderly.len(), base.len() + 1);
        assert_eq!(elderly.last().unwrap(), "Age-specific cardiac monitoring");
    }

    #[test]
    fn age_at_or_below_threshold_appends_nothing() {
        let table = ClinicalTable::builtin().unwrap();
        let base = table.recommendations_for(3, None);
        assert_eq!(table.recommendations_for(3, Some(40.0)), base);
        assert_eq!(table.recommendations_for(3, Some(65.0)), base);
    }

    #[test]
    fn repeated_requests_do_not_accumulate() {
        let table = ClinicalTable::builtin().unwrap();
        let first = table.recommendations_for(4, Some(80.0));
        let second = table.recommendations_for(4, Some(80.0));
        assert_eq!(first, second);
        assert_eq!(table.entry(4).unwrap().recommendations.len(), 5);
    }

    #[test]
    fn rejects_wrong_class_count() {
        let json = r#"{
            "classes": [{"label": "Normal", "findings": [], "recommendations": []}],
            "ageAdvisory": {"ageAbove": 65, "recommendation": "x"}
        }"#;
        let err = ClinicalTable::from_json_str(json).unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
        assert!(err.to_string().contains("expected 5"), "{err}");
    }

    #[test]
    fn rejects_misordered_labels() {
        let mut table = ClinicalTable::builtin().unwrap();
        table.classes.swap(1, 2);
        let json = serde_json::to_string(&table).unwrap();
        let err = ClinicalTable::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("Pulmonary Congestion"), "{err}");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = ClinicalTable::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ClinicalTable::from_path(Path::new("/nonexistent/clinical.json")).unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }
}
