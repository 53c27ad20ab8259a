//! Remote validation of scanned tokens.
//!
//! One POST per accepted token; no retries here or above. The caller learns
//! success or failure only, and the student sees a single generic notice for
//! every failure kind.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use crate::config::ScannerConfig;
use crate::error::ValidationError;
use crate::token::ScanToken;

pub const SUCCESS_STATUS: &str = "success";

#[derive(Serialize)]
struct AttendanceRequest<'a> {
    token: &'a ScanToken,
}

/// Body returned by the attendance endpoint on a 2xx.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceResponse {
    #[serde(default)]
    pub status: Option<String>,
    /// Whatever else the backend sent, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttendanceResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS_STATUS)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FailureReason {
    /// The backend answered but did not report success.
    Rejected(AttendanceResponse),
    /// The call itself failed.
    Error(ValidationError),
}

/// Verdict for one submitted token. Consumed immediately by outcome reporting.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationResult {
    Success(AttendanceResponse),
    Failure(FailureReason),
}

impl ValidationResult {
    pub fn from_call(call: Result<AttendanceResponse, ValidationError>) -> Self {
        match call {
            Ok(response) if response.is_success() => ValidationResult::Success(response),
            Ok(response) => ValidationResult::Failure(FailureReason::Rejected(response)),
            Err(err) => ValidationResult::Failure(FailureReason::Error(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success(_))
    }
}

/// Exchanges a token for the backend's verdict.
///
/// Implementations run on a worker thread, hence `Send + Sync`.
pub trait Validator: Send + Sync {
    fn validate(&self, token: &ScanToken) -> Result<AttendanceResponse, ValidationError>;
}

/// `POST {base_url}/api/v1/attendance/` over `ureq`.
pub struct HttpValidator {
    agent: ureq::Agent,
    endpoint: Url,
}

impl HttpValidator {
    pub fn new(config: &ScannerConfig) -> Result<Self> {
        let endpoint = config.attendance_url()?;
        Ok(Self::with_endpoint(endpoint, config.request_timeout))
    }

    pub fn with_endpoint(endpoint: Url, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Validator for HttpValidator {
    fn validate(&self, token: &ScanToken) -> Result<AttendanceResponse, ValidationError> {
        let body = serde_json::to_string(&AttendanceRequest { token })
            .map_err(|e| ValidationError::Body(e.to_string()))?;

        let response = match self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(ValidationError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(ValidationError::Transport(transport.to_string()))
            }
        };

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(ValidationError::Status(status));
        }
        let raw = response
            .into_string()
            .map_err(|e| ValidationError::Body(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ValidationError::Body(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_token_object() {
        let token = ScanToken::new("abc123").unwrap();
        let body = serde_json::to_string(&AttendanceRequest { token: &token }).unwrap();
        assert_eq!(body, r#"{"token":"abc123"}"#);
    }

    #[test]
    fn only_success_status_counts_as_success() {
        let ok: AttendanceResponse =
            serde_json::from_str(r#"{"status":"success","course":"CS101"}"#).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.extra.get("course"), Some(&Value::from("CS101")));

        for body in [r#"{"status":"error"}"#, r#"{"status":"SUCCESS"}"#, "{}"] {
            let response: AttendanceResponse = serde_json::from_str(body).unwrap();
            assert!(!response.is_success(), "{body} must not be success");
        }
    }

    #[test]
    fn from_call_classifies_outcomes() {
        let success = AttendanceResponse {
            status: Some("success".into()),
            ..AttendanceResponse::default()
        };
        assert!(ValidationResult::from_call(Ok(success)).is_success());

        let rejected = ValidationResult::from_call(Ok(AttendanceResponse::default()));
        assert!(matches!(
            rejected,
            ValidationResult::Failure(FailureReason::Rejected(_))
        ));

        let failed = ValidationResult::from_call(Err(ValidationError::Status(500)));
        assert_eq!(
            failed,
            ValidationResult::Failure(FailureReason::Error(ValidationError::Status(500)))
        );
    }

    #[test]
    fn endpoint_comes_from_config() -> Result<()> {
        let cfg = ScannerConfig::new("http://127.0.0.1:8000")?;
        let validator = HttpValidator::new(&cfg)?;
        assert_eq!(
            validator.endpoint().as_str(),
            "http://127.0.0.1:8000/api/v1/attendance/"
        );
        Ok(())
    }
}
