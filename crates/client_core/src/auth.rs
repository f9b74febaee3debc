use std::sync::Arc;

use reqwest::{Client, Response};
use shared::{
    error::ApiException,
    protocol::{CredentialsForm, TokenResponse},
};
use tracing::info;

use crate::{
    error::AuthError,
    session::{Session, TokenStore},
    ClientConfig,
};

/// Login, registration and logout against the auth endpoints.
///
/// Successful logins update both the shared [`Session`] and the durable
/// [`TokenStore`]; logout clears both.
pub struct AuthClient {
    http: Client,
    config: ClientConfig,
    session: Session,
    store: Arc<dyn TokenStore>,
}

impl AuthClient {
    pub fn new(
        config: ClientConfig,
        session: Session,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            http: config.http_client()?,
            config,
            session,
            store,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let response = self
            .post_credentials(&self.config.login_path, username, password)
            .await?;
        let response = ensure_success(response, "Login failed").await?;
        let token: TokenResponse = response.json().await?;

        self.store
            .save_token(&token.access_token)
            .await
            .map_err(AuthError::Store)?;
        self.session.set_token(token.access_token).await;
        info!(username, token_type = %token.token_type, "auth: logged in");
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let response = self
            .post_credentials(&self.config.register_path, username, password)
            .await?;
        ensure_success(response, "Registration failed").await?;
        info!(username, "auth: registered");
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.store.clear_token().await.map_err(AuthError::Store)?;
        self.session.clear().await;
        info!("auth: logged out");
        Ok(())
    }

    async fn post_credentials(
        &self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<Response, AuthError> {
        let url = self.config.endpoint(path)?;
        Ok(self
            .http
            .post(url)
            .form(&CredentialsForm {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?)
    }
}

async fn ensure_success(response: Response, fallback: &str) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AuthError::Rejected(ApiException::from_body(
        status.as_u16(),
        &body,
        fallback,
    )))
}
