use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{domain::SearchOutcome, error::ApiErrorBody, protocol::SEARCH_UPLOAD_FIELD};
use tracing::{info, warn};

use crate::{error::SearchError, session::Session, ClientConfig};

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Image bytes and metadata carried by one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, upload: ImageUpload) -> Result<SearchOutcome, SearchError>;
}

pub struct HttpSearchClient {
    http: Client,
    config: ClientConfig,
    session: Session,
}

impl HttpSearchClient {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, SearchError> {
        Ok(Self {
            http: config.http_client()?,
            config,
            session,
        })
    }
}

#[async_trait]
impl SearchService for HttpSearchClient {
    async fn search(&self, upload: ImageUpload) -> Result<SearchOutcome, SearchError> {
        let url = self.config.endpoint(&self.config.search_path)?;
        let size = upload.bytes.len();
        let media_type = upload
            .media_type
            .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string());
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str(&media_type)?;
        let form = Form::new().part(SEARCH_UPLOAD_FIELD, part);

        let mut request = self.http.post(url.clone()).multipart(form);
        if let Some(token) = self.session.token().await {
            request = request.bearer_auth(token);
        }

        info!(%url, file = %upload.file_name, size, "search: uploading image");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = ApiErrorBody::parse(&body).and_then(|body| body.message());
            warn!(status = status.as_u16(), ?detail, "search: service rejected request");
            return Err(SearchError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let outcome: SearchOutcome = response.json().await?;
        info!(
            matches = outcome.matches.len(),
            latency = outcome.latency.as_deref().unwrap_or("-"),
            "search: results received"
        );
        Ok(outcome)
    }
}
