//! Extraction payload validation.
//!
//! The extraction service is an LLM behind an HTTP endpoint; its output is
//! untrusted. Validation is lenient at the element level (a malformed array
//! entry is skipped, a missing array defaults to empty) but strict at the
//! envelope level: a response that is not a JSON object at all is a hard
//! `InvalidPayload` error, never an empty success.

use posture_types::{AssetDraft, ExtractionPayload, ExtractionSummary, FindingDraft, VulnerabilityDraft};
use serde_json::Value;
use tracing::warn;

use crate::error::ExtractError;

/// Validate a raw service response into a usable payload.
pub fn validate_payload(value: Value) -> Result<ExtractionPayload, ExtractError> {
    let Value::Object(ref map) = value else {
        return Err(ExtractError::InvalidPayload(format!(
            "expected a JSON object, got {}",
            type_name(&value)
        )));
    };

    let assets: Vec<AssetDraft> = lenient_array(map.get("assets"), "assets");
    let vulnerabilities: Vec<VulnerabilityDraft> =
        lenient_array(map.get("vulnerabilities"), "vulnerabilities");
    let pentest_findings: Vec<FindingDraft> =
        lenient_array(map.get("pentestFindings"), "pentestFindings");

    let mut summary: ExtractionSummary = map
        .get("summary")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    summary.confidence = summary.confidence.clamp(0.0, 100.0);

    Ok(ExtractionPayload {
        assets,
        vulnerabilities,
        pentest_findings,
        summary,
    })
}

/// Parse an array field element by element; anything that doesn't fit the
/// draft shape is dropped with a warning rather than failing the file.
fn lenient_array<T: serde::de::DeserializeOwned>(value: Option<&Value>, field: &str) -> Vec<T> {
    let Some(Value::Array(items)) = value else {
        if value.is_some() {
            warn!(field, "extraction field is not an array, treating as empty");
        }
        return Vec::new();
    };
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value(item.clone()) {
            Ok(parsed) => out.push(parsed),
            Err(e) => warn!(field, index, error = %e, "skipping malformed extraction element"),
        }
    }
    out
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_arrays_default_to_empty() {
        let payload = validate_payload(json!({"summary": {"confidence": 40}})).unwrap();
        assert!(payload.assets.is_empty());
        assert!(payload.vulnerabilities.is_empty());
        assert!(payload.pentest_findings.is_empty());
        assert_eq!(payload.summary.confidence, 40.0);
    }

    #[test]
    fn non_array_field_treated_as_empty() {
        let payload = validate_payload(json!({"assets": "nope"})).unwrap();
        assert!(payload.assets.is_empty());
    }

    #[test]
    fn malformed_elements_are_skipped_not_fatal() {
        let payload = validate_payload(json!({
            "vulnerabilities": [
                {"title": "SQL injection", "severity": "High"},
                42,
                {"title": "XSS", "cvss_score": 6.1}
            ]
        }))
        .unwrap();
        assert_eq!(payload.vulnerabilities.len(), 2);
        assert_eq!(payload.vulnerabilities[0].title, "SQL injection");
    }

    #[test]
    fn confidence_clamped_to_range() {
        let high = validate_payload(json!({"summary": {"confidence": 250}})).unwrap();
        assert_eq!(high.summary.confidence, 100.0);
        let low = validate_payload(json!({"summary": {"confidence": -3}})).unwrap();
        assert_eq!(low.summary.confidence, 0.0);
    }

    #[test]
    fn non_object_response_is_an_error() {
        assert!(validate_payload(json!([1, 2, 3])).is_err());
        assert!(validate_payload(json!("plain text")).is_err());
    }
}
