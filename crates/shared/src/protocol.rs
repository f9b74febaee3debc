use serde::{Deserialize, Serialize};

/// Multipart field carrying the uploaded image bytes.
pub const SEARCH_UPLOAD_FIELD: &str = "file";
pub const SEARCH_PATH: &str = "/api/search";
pub const LOGIN_PATH: &str = "/api/token";
pub const REGISTER_PATH: &str = "/api/register";

/// Form-encoded credentials for the login and register endpoints.
///
/// The service follows the OAuth2 password form, so the account identifier
/// travels as `username` even when it is an email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}
