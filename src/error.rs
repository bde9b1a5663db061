//! Error type shared by every GEODE operation.
//!
//! Radio timeouts while listening in a slot are the expected "peer silent"
//! outcome and never surface here.

use thiserror::Error;

/// Errors reported by the GEODE link layer.
///
/// [`BufEmpty`](Error::BufEmpty) and [`BufFull`](Error::BufFull) are recoverable:
/// the caller retries, or uses [`Mode::Block`](crate::link::Mode::Block).
/// Everything else is a setup or protocol failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// The radio driver reported a failure.
    #[error("radio driver failure")]
    Radio,
    /// The node configuration is inconsistent (e.g. more connections than buffers).
    #[error("invalid configuration")]
    InvalidConfig,
    /// `start` was called twice on the same link.
    #[error("link already started")]
    AlreadyStarted,
    /// The request can never be satisfied by a buffer of this capacity.
    #[error("request exceeds buffer capacity")]
    Oversized,
    /// Not enough bytes are buffered to satisfy a read.
    #[error("not enough buffered data")]
    BufEmpty,
    /// Not enough free space to accept a write.
    #[error("not enough free buffer space")]
    BufFull,
    /// A received frame could not be decoded.
    #[error("malformed frame")]
    InvalidFrame,
    /// The slot is not served by this node.
    #[error("invalid slot {0}")]
    InvalidSlot(u8),
    /// All connection slots are taken.
    #[error("no free connection slot")]
    NoFreeSlot,
    /// A formatted message does not fit the scratch buffer.
    #[error("formatted message too long")]
    Format,
}
