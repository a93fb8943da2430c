use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocsignError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] crate::workflow::WorkflowError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid stage '{id}': {reason}")]
    InvalidStage { id: String, reason: String },

    #[error("Failed to resolve secret for stage '{id}': {source}")]
    Secret {
        id: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("PDF has no page with index {0}")]
    PageNotFound(usize),

    #[error("Failed to read page content: {0}")]
    Content(String),

    #[error("Invalid keyword '{keyword}': {reason}")]
    InvalidKeyword { keyword: String, reason: String },

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Failed to write PDF: {0}")]
    Write(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Content(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Document '{id}' is not in folder '{folder}'")]
    NotInFolder { id: String, folder: String },

    #[error("Invalid document id '{0}'")]
    InvalidId(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move document from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt document metadata for '{id}': {reason}")]
    Metadata { id: String, reason: String },

    #[error("Store transport failure: {0}")]
    Transport(String),

    #[error("Store quota exceeded: {0}")]
    Quota(String),
}

impl StoreError {
    /// True when the failure means the document is absent, as opposed to the
    /// store itself being unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::NotInFolder { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DocsignError>;
