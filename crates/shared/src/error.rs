use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error body returned by the service on non-2xx responses.
///
/// `detail` is usually a string, but request validation failures return a
/// list of objects, so it is kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Value,
}

impl ApiErrorBody {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect();
                if parts.is_empty() {
                    Some(self.detail.to_string())
                } else {
                    Some(parts.join("; "))
                }
            }
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiException {
    pub status: u16,
    pub message: String,
}

impl ApiException {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Builds an exception from a raw response body, falling back to
    /// `fallback` when the body carries no usable detail.
    pub fn from_body(status: u16, raw: &str, fallback: &str) -> Self {
        let message = ApiErrorBody::parse(raw)
            .and_then(|body| body.message())
            .unwrap_or_else(|| fallback.to_string());
        Self::new(status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_detail_is_surfaced() {
        let err = ApiException::from_body(400, r#"{"detail":"Incorrect username or password"}"#, "Login failed");
        assert_eq!(err.message, "Incorrect username or password");
        assert_eq!(err.status, 400);
    }

    #[test]
    fn validation_detail_list_is_joined() {
        let raw = r#"{"detail":[{"loc":["body","password"],"msg":"field required"},{"msg":"too short"}]}"#;
        let err = ApiException::from_body(422, raw, "Registration failed");
        assert_eq!(err.message, "field required; too short");
    }

    #[test]
    fn non_json_body_uses_fallback() {
        let err = ApiException::from_body(502, "<html>bad gateway</html>", "Login failed");
        assert_eq!(err.message, "Login failed");
    }
}
