use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::capabilities::{HttpOutcome, KvError, RequestError};

pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The request never got a response.
    Network,
    /// Non-2xx response.
    Http,
    /// Rejected locally before any request was issued.
    Validation,
    /// 2xx response whose body could not be understood.
    Decode,
    /// The request could not be built, e.g. a malformed base URL.
    Request,
    /// Local storage failed.
    Storage,
}

/// One failing form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut error = Self::new();
        error.push(field, message);
        error
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.message.as_str())
    }

    /// `Ok(())` when no field failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ApiError {
    #[error("{message}")]
    Network { message: String },

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("unexpected response: {reason}")]
    Decode { reason: String },

    #[error("could not build request: {reason}")]
    Request { reason: String },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::Request { .. } => ErrorKind::Request,
            ApiError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for display next to the failed action.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Builds the error for a non-2xx response from its problem payload.
    pub fn rejected(status: u16, status_text: &str, body: &[u8]) -> Self {
        ApiError::Http {
            status,
            message: problem_message(body, status_text),
        }
    }

    pub fn decode(e: &serde_json::Error) -> Self {
        ApiError::Decode {
            reason: e.to_string(),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        ApiError::Request {
            reason: e.to_string(),
        }
    }
}

impl From<crux_http::HttpError> for ApiError {
    fn from(e: crux_http::HttpError) -> Self {
        match e {
            crux_http::HttpError::Http { code, body, .. } => ApiError::rejected(
                u16::from(code),
                code.canonical_reason(),
                body.as_deref().unwrap_or_default(),
            ),
            crux_http::HttpError::Url(reason) => ApiError::Request { reason },
            other => ApiError::Network {
                message: other.to_string(),
            },
        }
    }
}

impl From<KvError> for ApiError {
    fn from(e: KvError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

/// Body of a 2xx response. Non-2xx statuses become `Http` errors whether
/// the shell reported them as a response or as an error.
pub fn response_body(outcome: HttpOutcome) -> Result<Vec<u8>, ApiError> {
    let mut response = outcome?;
    let status = response.status();
    let body = response.take_body().unwrap_or_default();
    if status.is_success() {
        Ok(body)
    } else {
        Err(ApiError::rejected(
            u16::from(status),
            status.canonical_reason(),
            &body,
        ))
    }
}

/// Problem payload returned by the backend on failure.
#[derive(Debug, Clone, Default, Deserialize)]
struct ProblemDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    violations: Vec<Violation>,
}

#[derive(Debug, Clone, Deserialize)]
struct Violation {
    #[serde(rename = "propertyPath", default)]
    property_path: String,
    #[serde(default)]
    message: String,
}

/// Picks the most specific message: `detail`, then the joined
/// violations, then `title`. A body that is not JSON yields the status
/// text.
pub fn problem_message(body: &[u8], status_text: &str) -> String {
    let problem: ProblemDetails = match serde_json::from_slice(body) {
        Ok(problem) => problem,
        Err(_) => {
            let text = status_text.trim();
            return if text.is_empty() {
                GENERIC_ERROR_MESSAGE.to_string()
            } else {
                text.to_string()
            };
        }
    };

    if let Some(detail) = problem.detail.filter(|d| !d.is_empty()) {
        return detail;
    }

    if !problem.violations.is_empty() {
        return problem
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.property_path, v.message))
            .collect::<Vec<_>>()
            .join(", ");
    }

    if let Some(title) = problem.title.filter(|t| !t.is_empty()) {
        return title;
    }

    GENERIC_ERROR_MESSAGE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_body(body: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&body).unwrap()
    }

    #[test]
    fn test_detail_wins() {
        let body = json_body(json!({"title": "An error occurred", "detail": "Not Found"}));
        assert_eq!(problem_message(&body, "Not Found"), "Not Found");
    }

    #[test]
    fn test_violations_joined() {
        let body = json_body(json!({
            "title": "Validation failed",
            "violations": [
                {"propertyPath": "name", "message": "This value should not be blank."},
                {"propertyPath": "latitude", "message": "Out of range."}
            ]
        }));
        assert_eq!(
            problem_message(&body, "Unprocessable Entity"),
            "name: This value should not be blank., latitude: Out of range."
        );
    }

    #[test]
    fn test_title_fallback() {
        let body = json_body(json!({"title": "Internal Server Error"}));
        assert_eq!(problem_message(&body, ""), "Internal Server Error");
    }

    #[test]
    fn test_empty_problem_is_generic() {
        assert_eq!(problem_message(&json_body(json!({})), "Bad Request"), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_non_json_body_uses_status_text() {
        assert_eq!(problem_message(b"<html>oops</html>", "Bad Gateway"), "Bad Gateway");
        assert_eq!(problem_message(b"<html>oops</html>", " "), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_rejected_keeps_status() {
        let error = ApiError::rejected(404, "Not Found", &json_body(json!({"detail": "gone"})));
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.kind(), ErrorKind::Http);
        assert_eq!(error.user_message(), "gone");
    }

    #[test]
    fn test_shell_failures_are_network_errors() {
        let error: ApiError = crux_http::HttpError::Io("offline".into()).into();
        assert_eq!(error.kind(), ErrorKind::Network);
        let error: ApiError = crux_http::HttpError::Timeout.into();
        assert_eq!(error.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_malformed_url_is_not_a_network_error() {
        let error: ApiError = crux_http::HttpError::Url("relative URL without a base".into()).into();
        assert_eq!(error.kind(), ErrorKind::Request);

        let error: ApiError = crate::capabilities::ApiRequest::get("api.example.com/api")
            .unwrap_err()
            .into();
        assert_eq!(error.kind(), ErrorKind::Request);
        assert!(error.user_message().starts_with("could not build request"));
    }

    #[test]
    fn test_validation_error_lookup() {
        let mut error = ValidationError::new();
        error.push("name", "Name is required");
        assert_eq!(error.message_for("name"), Some("Name is required"));
        assert_eq!(error.message_for("description"), None);
        assert!(error.clone().into_result().is_err());
        assert!(ValidationError::new().into_result().is_ok());
    }

    #[test]
    fn test_errors_survive_serialization() {
        let error = ApiError::Validation(ValidationError::single("username", "Required"));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(serde_json::from_value::<ApiError>(json).unwrap(), error);
    }
}
