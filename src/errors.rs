use thiserror::Error;

/// Unified error type for header parsing and tile decoding.
///
/// Per-block and per-record failures (bad signature, invalid zoom table,
/// invalid tag index, ...) are caught where they occur and turned into a
/// `tracing::warn!` plus "skip this block/way" instead of ever reaching a
/// caller as one of these variants - only errors that should abort the
/// whole open or the whole query propagate this far.
#[derive(Debug, Error)]
pub enum MapFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("system time error: {0}")]
    SystemTime(#[from] std::time::SystemTimeError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("buffer overflow: {0}")]
    BufferOverflow(String),

    #[error("invalid tag index: {0}")]
    InvalidTagIndex(u32),

    #[error("block decode error: {0}")]
    BlockDecode(String),

    #[error("index entry out of range: block {0}")]
    IndexOutOfRange(i64),

    #[error("{0}")]
    Other(String),
}

impl MapFileError {
    pub fn new(message: impl Into<String>) -> Self {
        MapFileError::Other(message.into())
    }
}

impl From<String> for MapFileError {
    fn from(message: String) -> Self {
        MapFileError::Other(message)
    }
}

impl From<&str> for MapFileError {
    fn from(message: &str) -> Self {
        MapFileError::Other(message.to_string())
    }
}
