/// Shared error type used across all DocChat crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid rename: {0}")]
    InvalidRename(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("no documents supplied")]
    EmptyDocumentSet,

    #[error("session {0} has no documents attached")]
    NoAnswererBound(String),

    #[error("ingestion: {0}")]
    Ingestion(String),

    #[error("generation: {0}")]
    Generation(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Caller errors are rejected before any state is touched.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRename(_)
                | Self::UnknownSession(_)
                | Self::EmptyDocumentSet
                | Self::NoAnswererBound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
