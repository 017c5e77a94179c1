//! Error types for extension negotiation and frame processing.
//!
//! Header parsing has no error kind: malformed parameters degrade to flags
//! and are judged later by the builders.

use thiserror::Error;

/// Result type alias for extension operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while negotiating or running WebSocket extensions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The builder registry violates a negotiation invariant
    /// (duplicate names, overlapping RSV bits).
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// A runtime extension could not allocate its codec context.
    ///
    /// Negotiation treats this as "no match" for the affected extension.
    #[error("Resource error: {0}")]
    Resource(String),

    /// The peer sent a frame inconsistent with the negotiated extensions.
    ///
    /// Connection-fatal: close with a protocol error close code.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Reserved bits set without a negotiated extension claiming them.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Frame payload grew beyond the configured maximum while inflating.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Size reached when the limit was hit.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Extension-related runtime error (compression failure, use after shutdown).
    #[error("Extension error: {0}")]
    Extension(String),

    /// Invalid extension configuration.
    #[error("Invalid extension: {0}")]
    InvalidExtension(String),
}

impl Error {
    /// Whether the connection must be closed with a protocol error.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation(_) | Error::ReservedBitsSet | Error::FrameTooLarge { .. }
        )
    }
}
