use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store write failed with {stored_chunks} chunks already committed: {source}")]
    StoreWrite {
        stored_chunks: usize,
        #[source]
        source: SearchError,
    },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("language model call failed: {0}")]
    Upstream(String),

    #[error("language model returned unparseable content: {raw}")]
    Malformed {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
