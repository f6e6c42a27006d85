use thiserror::Error;

/// Result alias used by the container core.
pub type Result<T> = std::result::Result<T, PaketError>;

/// Errors returned by the container read engine and its primitives.
///
/// A failed digest comparison is not an error: reads report it through
/// their `verified` flag instead.
#[derive(Debug, Error)]
pub enum PaketError {
    /// Key length is not 16, 24 or 32 bytes (or a requested random key size is out of range)
    #[error("Key error: {0}")]
    Key(String),

    /// The secure random source could not be read
    #[error("Entropy error: {0}")]
    Entropy(String),

    /// Logical name is absent from the index
    #[error("Not found in index: {0}")]
    NotFound(String),

    /// Open, seek, read or close failures on the backing file
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// Aggregate query against an index with no entries
    #[error("Index has no entries")]
    EmptyIndex,

    /// Backing file is missing or empty at construction time
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The container was shut down
    #[error("Container is closed")]
    Closed,

    /// Malformed segment, descriptor or index document
    #[error("Format error: {0}")]
    Format(String),

    /// Builder was given the same logical name twice
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
}

impl PaketError {
    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    pub fn entropy(msg: impl Into<String>) -> Self {
        Self::Entropy(msg.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

impl From<std::io::Error> for PaketError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for PaketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}
