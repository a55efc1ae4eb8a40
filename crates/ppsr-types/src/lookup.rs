//! Request and response bodies for the lookup endpoint.
//!
//! Field names on the wire follow the public API (`vin_number`,
//! `plateNumber`, `requestId`, ...), so existing callers keep working.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::CorrelationId;

/// Number of leading identifier characters kept when masking for logs.
const MASK_VISIBLE_CHARS: usize = 6;

/// A single lookup call.
#[derive(Clone, Serialize, Deserialize)]
pub struct LookupRequest {
    pub username: String,
    pub password: String,
    /// Vehicle identifier (VIN) submitted to the search form.
    pub vin_number: String,
    /// Optional plate the caller already knows; recorded, never submitted.
    #[serde(default)]
    pub plate_number: Option<String>,
}

// Manual Debug so the password never reaches a log line.
impl std::fmt::Debug for LookupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vin_number", &mask_identifier(&self.vin_number))
            .field("plate_number", &self.plate_number)
            .finish()
    }
}

/// A required request field was blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}` must not be blank")]
pub struct ValidationError {
    pub field: &'static str,
}

impl LookupRequest {
    /// Check that every required field carries a value.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("username", &self.username),
            ("password", &self.password),
            ("vin_number", &self.vin_number),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError { field });
            }
        }
        Ok(())
    }
}

/// Mask an identifier for logging: first six characters, then asterisks.
pub fn mask_identifier(value: &str) -> String {
    let visible: String = value.chars().take(MASK_VISIBLE_CHARS).collect();
    format!("{visible}********")
}

/// Status of a completed lookup. Fatal failures never produce a
/// [`LookupResponse`]; they are reported as HTTP 500 `{"detail": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupStatus {
    Success,
}

/// Response body for a completed lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub status: LookupStatus,
    pub message: String,
    /// Scraped registration plate; `null` when extraction failed.
    pub plate_number: Option<String>,
    pub request_id: CorrelationId,
    pub logs_dir: PathBuf,
    pub trace: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LookupRequest {
        LookupRequest {
            username: "u".into(),
            password: "p".into(),
            vin_number: "1HGCM82633A123456".into(),
            plate_number: None,
        }
    }

    #[test]
    fn plate_number_is_optional_on_the_wire() {
        let req: LookupRequest = serde_json::from_str(
            r#"{"username":"u","password":"p","vin_number":"1HGCM82633A123456"}"#,
        )
        .unwrap();
        assert!(req.plate_number.is_none());
        assert_eq!(req.vin_number, "1HGCM82633A123456");
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let err = serde_json::from_str::<LookupRequest>(r#"{"username":"u","password":"p"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut req = request();
        req.vin_number = "   ".into();
        assert_eq!(req.validate(), Err(ValidationError { field: "vin_number" }));

        let mut req = request();
        req.password = String::new();
        assert_eq!(req.validate(), Err(ValidationError { field: "password" }));

        assert!(request().validate().is_ok());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut req = request();
        req.password = "hunter2".into();
        let dbg = format!("{req:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("1HGCM82633A123456"));
        assert!(dbg.contains("1HGCM8********"));
    }

    #[test]
    fn mask_handles_short_identifiers() {
        assert_eq!(mask_identifier("ABC"), "ABC********");
        assert_eq!(mask_identifier(""), "********");
    }

    #[test]
    fn response_uses_camel_case_keys() {
        let resp = LookupResponse {
            status: LookupStatus::Success,
            message: "Login attempt completed".into(),
            plate_number: None,
            request_id: CorrelationId::new("0a1b2c3d"),
            logs_dir: PathBuf::from("logs/0a1b2c3d"),
            trace: PathBuf::from("logs/0a1b2c3d/trace-0a1b2c3d.json"),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["plateNumber"], serde_json::Value::Null);
        assert_eq!(json["requestId"], "0a1b2c3d");
        assert_eq!(json["logsDir"], "logs/0a1b2c3d");
        assert_eq!(json["trace"], "logs/0a1b2c3d/trace-0a1b2c3d.json");
    }
}
