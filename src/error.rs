//! Error types for tilefeed-client.

use thiserror::Error;

/// Why a single cell delta was dropped instead of applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaFault {
    /// `y` was given without `x`.
    #[error("y present without x")]
    MissingX,
    /// `x` was given without `y`.
    #[error("x present without y")]
    MissingY,
    /// Carry-forward delta with no valid coordinate before it in the batch.
    #[error("implicit position with no anchor coordinate")]
    NoAnchor,
    /// Advancing or offsetting the coordinate left the `i64` range.
    #[error("coordinate out of range")]
    CoordinateOverflow,
    /// Glyph was empty or longer than one character.
    #[error("glyph {0:?} is not a single character")]
    BadGlyph(String),
    /// The cell object itself did not deserialize.
    #[error("unreadable cell: {0}")]
    Unreadable(String),
}

/// Main error type for all tilefeed operations.
#[derive(Debug, Error)]
pub enum TilefeedError {
    /// The shared inflate context hit invalid data. The connection must be torn down.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// A value whose boundary was found but which could not be parsed into records.
    #[error("Malformed value at stream offset {offset}: {reason}")]
    MalformedValue { offset: u64, reason: String },

    /// A record that could not be used: no string `msg` field (`kind` is
    /// empty then), or a payload that does not match its discriminant.
    #[error("Malformed {kind:?} record: {reason}")]
    MalformedRecord { kind: String, reason: String },

    /// A cell delta that could not be decoded; it was skipped.
    #[error("Invalid cell delta #{index}: {reason}")]
    InvalidDelta { index: usize, reason: DeltaFault },

    /// An incomplete value grew past the configured limit.
    #[error("Buffered value of {size} bytes exceeds maximum {max}")]
    ValueTooLarge { size: usize, max: usize },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while writing outbound payloads.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The outbound queue is at capacity.
    #[error("Outbound queue full")]
    OutboundFull,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl TilefeedError {
    /// Whether this error ends the connection's pipeline.
    ///
    /// Malformed input is reported and skipped, and a full outbound queue can
    /// be retried. Everything else leaves the decoder unable to continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TilefeedError::MalformedValue { .. }
                | TilefeedError::MalformedRecord { .. }
                | TilefeedError::InvalidDelta { .. }
                | TilefeedError::OutboundFull
        )
    }
}

/// Result type alias using TilefeedError.
pub type Result<T> = std::result::Result<T, TilefeedError>;
