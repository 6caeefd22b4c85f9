use thiserror::Error;

/// Errors returned by `pagebackup_core` operations.
///
/// Callers branch on variant, not on message text, to decide whether a
/// failure is fatal at the call site or should be folded into a per-file
/// "invalid" result (see the non-strict consistency-check path).
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration: unknown or unavailable compression algorithm,
    /// an unsupported backup mode for the given inputs, and similar
    /// call-time misuse. Always fatal.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An I/O error occurred (open, read, seek, or write failure).
    #[error("I/O error: {0}")]
    Io(String),

    /// A page or backup stream failed a structural or checksum check in a
    /// context where corruption is fatal (strict/backup mode).
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// The backup stream itself is malformed: out-of-order blocks, a
    /// payload length that does not decompress to `BLOCK_SIZE`, or an
    /// unexpected end of file mid-frame.
    #[error("backup stream framing error: {0}")]
    Framing(String),

    /// A cooperative cancellation token was observed set at a block
    /// boundary.
    #[error("interrupted")]
    Cancelled,
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
