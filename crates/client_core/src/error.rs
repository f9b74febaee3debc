use shared::error::ApiException;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to write preview '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("preview directory '{path}' is unavailable: {source}")]
    Directory {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("unsupported file type ({})", media_type.as_deref().unwrap_or("unknown"))]
    InvalidFileType { media_type: Option<String> },
    #[error("file is {size} bytes, above the configured upload limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error(transparent)]
    Preview(#[from] PreviewError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("search transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search service returned status {status}{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Status { status: u16, detail: Option<String> },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid auth endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("auth transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{}", .0.message)]
    Rejected(ApiException),
    #[error("token store failure: {0:#}")]
    Store(anyhow::Error),
}
