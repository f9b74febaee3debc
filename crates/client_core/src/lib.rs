use std::{sync::Arc, time::Duration};

use reqwest::Client;
use shared::protocol::{LOGIN_PATH, REGISTER_PATH, SEARCH_PATH};
use tracing::info;
use url::Url;

pub mod auth;
pub mod error;
pub mod lifecycle;
pub mod preview;
pub mod runtime;
pub mod search_client;
pub mod selection;
pub mod session;

pub use auth::AuthClient;
pub use error::{AuthError, PreviewError, SearchError, SelectionError};
pub use lifecycle::{
    Failure, FailureKind, LifecycleEvent, LifecycleSnapshot, LifecycleState, SearchLifecycle,
    SubmitTicket,
};
pub use preview::{MemoryPreviewStore, PreviewRef, PreviewStore, TempDirPreviewStore};
pub use runtime::{RuntimeClosed, RuntimeHandle, SearchRuntime};
pub use search_client::{HttpSearchClient, ImageUpload, SearchService};
pub use selection::{CandidateFile, SelectionManager, SelectionPolicy, SelectionSource};
pub use session::{MemoryTokenStore, Session, TokenStore, TOKEN_STORAGE_KEY};

/// Where the service lives and how requests to it are issued.
///
/// `request_timeout` has no default: without one, a request waits as long
/// as the transport lets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub search_path: String,
    pub login_path: String,
    pub register_path: String,
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>) -> Result<Self, url::ParseError> {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Url::parse(&api_base_url)?;
        Ok(Self {
            api_base_url,
            search_path: SEARCH_PATH.to_string(),
            login_path: LOGIN_PATH.to_string(),
            register_path: REGISTER_PATH.to_string(),
            request_timeout: None,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{path}", self.api_base_url))
    }

    pub(crate) fn http_client(&self) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

/// Everything a front end needs: the shared session, the auth client and a
/// running search lifecycle.
pub struct VisualSearchClient {
    session: Session,
    auth: AuthClient,
    runtime: SearchRuntime,
}

impl VisualSearchClient {
    pub async fn start(
        config: ClientConfig,
        policy: SelectionPolicy,
        previews: Arc<dyn PreviewStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> anyhow::Result<Self> {
        let session = Session::restore(tokens.as_ref()).await?;
        info!(
            api = %config.api_base_url,
            authenticated = session.is_authenticated().await,
            "client: starting"
        );
        let auth = AuthClient::new(config.clone(), session.clone(), tokens)?;
        let search = HttpSearchClient::new(config, session.clone())?;
        let lifecycle = SearchLifecycle::new(SelectionManager::new(previews, policy));
        let runtime = SearchRuntime::spawn(lifecycle, Arc::new(search));
        Ok(Self {
            session,
            auth,
            runtime,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn runtime(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    /// Stops the lifecycle loop and releases the live preview, if any.
    pub async fn shutdown(self) -> Result<(), RuntimeClosed> {
        let mut lifecycle = self.runtime.shutdown().await?;
        lifecycle.reset();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
