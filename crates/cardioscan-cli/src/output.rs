//! JSON envelopes written to stdout.
//!
//! Every run prints exactly one of these on a single line:
//! `{"success":true,"analysis":{..}}` or `{"success":false,"error":".."}`.

use cardioscan_core::{AnalysisError, DiagnosticReport};
use serde::Serialize;

#[derive(Serialize)]
struct Success<'a> {
    success: bool,
    analysis: &'a DiagnosticReport,
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    error: &'a str,
}

pub fn render_success(report: &DiagnosticReport) -> Result<String, AnalysisError> {
    to_line(&Success {
        success: true,
        analysis: report,
    })
}

pub fn render_failure(message: &str) -> String {
    let envelope = Failure {
        success: false,
        error: message,
    };
    to_line(&envelope).unwrap_or_else(|_| r#"{"success":false,"error":"unknown error"}"#.into())
}

fn to_line<T: Serialize>(value: &T) -> Result<String, AnalysisError> {
    serde_json::to_string(value)
        .map_err(|e| AnalysisError::Inference(format!("serializing result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardioscan_core::{ClinicalTable, Probabilities, ResultComposer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    #[test]
    fn failure_envelope_shape() {
        let v: Value = serde_json::from_str(&render_failure("No image path provided")).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "No image path provided");
        assert_eq!(v.as_object().unwrap().len(), 2);
    }

    #[test]
    fn failure_message_is_escaped() {
        let text = render_failure("bad \"quote\"\nnewline");
        assert!(!text.contains('\n'));
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["error"], "bad \"quote\"\nnewline");
    }

    #[test]
    fn success_envelope_wraps_report() {
        let table = ClinicalTable::builtin().unwrap();
        let probs = Probabilities::from_model_output(&[0.1, 0.6, 0.1, 0.1, 0.1]).unwrap();
        let report = ResultComposer::new(&table).compose(&probs, None);

        let text = render_success(&report).unwrap();
        assert!(text.starts_with(r#"{"success":true,"analysis":{"diagnosis":"#), "{text}");
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["analysis"]["diagnosis"], "Cardiomegaly");
        assert_eq!(v["analysis"]["timestamp"], Value::Null);
    }

    #[test]
    fn serialization_failure_is_an_error() {
        // JSON object keys must be strings.
        let mut bad = BTreeMap::new();
        bad.insert((1, 2), "x");
        let err = to_line(&bad).unwrap_err();
        assert!(matches!(err, AnalysisError::Inference(_)));
        assert!(err.to_string().contains("serializing result"), "{err}");
    }
}
