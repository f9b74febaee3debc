//! Auth token held as an explicit session value.
//!
//! A [`Session`] is handed to every client that issues requests; the
//! [`TokenStore`] keeps the token durable across process restarts under
//! [`TOKEN_STORAGE_KEY`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use storage::Storage;
use tokio::sync::{Mutex, RwLock};

pub const TOKEN_STORAGE_KEY: &str = "visual_search_token";

#[derive(Clone, Default)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    /// Builds a session from whatever token the store already holds.
    pub async fn restore(store: &dyn TokenStore) -> Result<Self> {
        Ok(match store.load_token().await? {
            Some(token) => Self::with_token(token),
            None => Self::anonymous(),
        })
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub(crate) async fn set_token(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub(crate) async fn clear(&self) {
        *self.token.write().await = None;
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<String>>;
    async fn save_token(&self, token: &str) -> Result<()>;
    async fn clear_token(&self) -> Result<()>;
}

#[async_trait]
impl TokenStore for Storage {
    async fn load_token(&self) -> Result<Option<String>> {
        self.load_setting(TOKEN_STORAGE_KEY).await
    }

    async fn save_token(&self, token: &str) -> Result<()> {
        self.put_setting(TOKEN_STORAGE_KEY, token).await
    }

    async fn clear_token(&self) -> Result<()> {
        self.delete_setting(TOKEN_STORAGE_KEY).await.map(|_| ())
    }
}

/// Non-durable store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load_token(&self) -> Result<Option<String>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save_token(&self, token: &str) -> Result<()> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }

    async fn clear_token(&self) -> Result<()> {
        *self.token.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn restores_token_from_sqlite_store() {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        assert!(!Session::restore(&storage)
            .await
            .expect("restore")
            .is_authenticated()
            .await);

        storage.save_token("tok-123").await.expect("save");
        let session = Session::restore(&storage).await.expect("restore");
        assert_eq!(session.token().await.as_deref(), Some("tok-123"));
        assert_eq!(
            storage
                .load_setting(TOKEN_STORAGE_KEY)
                .await
                .expect("load")
                .as_deref(),
            Some("tok-123")
        );

        storage.clear_token().await.expect("clear");
        assert_eq!(storage.load_token().await.expect("load"), None);
    }

    #[tokio::test]
    async fn cloned_sessions_share_the_token() {
        let session = Session::anonymous();
        let shared_view = session.clone();
        session.set_token("abc".to_string()).await;
        assert_eq!(shared_view.token().await.as_deref(), Some("abc"));
        session.clear().await;
        assert!(!shared_view.is_authenticated().await);
    }
}
