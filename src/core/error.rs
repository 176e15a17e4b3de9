use thiserror::Error;

/// Per-item conditions raised by the room detection core. None of these
/// abort a batch; callers log them and move on to the next item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room not found")]
    NotFound,
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("no block context for room number '{0}'")]
    NoBlockContext(String),
}

/// Failures of the external page text-span source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("page {0} not found")]
    PageNotFound(u32),
    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
