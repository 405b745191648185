//! Optional per-request patient metadata.
//!
//! Arbitrary JSON attributes are accepted and kept; only `age` is read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::AnalysisError;

/// Patient attributes supplied alongside an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientData(Map<String, Value>);

impl PatientData {
    /// Parse patient data from a JSON object literal.
    ///
    /// Anything other than a JSON object is rejected.
    pub fn from_json_str(text: &str) -> Result<Self, AnalysisError> {
        serde_json::from_str(text)
            .map_err(|e| AnalysisError::Argument(format!("invalid patient data JSON: {e}")))
    }

    /// Patient age in years, if present and numeric.
    ///
    /// Numeric strings such as `"72"` are accepted. Other types are ignored.
    pub fn age(&self) -> Option<f64> {
        match self.0.get("age")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(age = %s, "ignoring non-numeric patient age");
                    None
                }
            },
            Value::Null => None,
            other => {
                warn!(age = %other, "ignoring non-numeric patient age");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_and_reads_age() {
        let p = PatientData::from_json_str(r#"{"age": 70, "sex": "F"}"#).unwrap();
        assert_eq!(p.age(), Some(70.0));
        assert_eq!(p.0.get("sex"), Some(&Value::String("F".into())));
    }

    #[test]
    fn numeric_string_age() {
        let p = PatientData::from_json_str(r#"{"age": " 66 "}"#).unwrap();
        assert_eq!(p.age(), Some(66.0));
    }

    #[test]
    fn non_numeric_age_is_ignored() {
        let p = PatientData::from_json_str(r#"{"age": "old"}"#).unwrap();
        assert_eq!(p.age(), None);
        let p = PatientData::from_json_str(r#"{"age": [70]}"#).unwrap();
        assert_eq!(p.age(), None);
    }

    #[test]
    fn missing_age() {
        let p = PatientData::from_json_str("{}").unwrap();
        assert!(p.0.is_empty());
        assert_eq!(p.age(), None);
    }

    #[test]
    fn malformed_json_is_argument_error() {
        let err = PatientData::from_json_str("{age: 70").unwrap_err();
        assert!(matches!(err, AnalysisError::Argument(_)));
        assert!(err.to_string().starts_with("invalid patient data JSON"));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(PatientData::from_json_str("[1, 2]").is_err());
        assert!(PatientData::from_json_str("42").is_err());
    }
}
