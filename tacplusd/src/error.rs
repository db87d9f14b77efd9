//! The server-side error taxonomy.
//!
//! The connection driver decides between reply-then-close, silent-close and
//! keep-serving based on which of these kinds it observes.

use std::io;

use thiserror::Error;

use tacplus_protocol::{DeserializeError, SerializeError};

/// A violation of the per-session sequence-number discipline.
///
/// All of these close the connection without a reply; a peer that cannot
/// count packets cannot be trusted with an answer.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Client packets must carry odd sequence numbers.
    #[error("even sequence number {0} from client")]
    EvenSequenceNumber(u8),

    /// A packet for an unknown session must open it with sequence number 1.
    #[error("sequence number {0} for a session this connection has not started")]
    UnknownSession(u8),

    /// A continuation packet skipped ahead or fell behind.
    #[error("out-of-order sequence number: expected {expected}, got {actual}")]
    OutOfOrder {
        /// The sequence number the session state called for.
        expected: u8,
        /// The sequence number actually received.
        actual: u8,
    },

    /// The session used up the 8-bit sequence space.
    #[error("sequence number overflow, session must be terminated")]
    Overflow,
}

/// An error raised by a handler while processing a dispatched packet.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The packet body could not be decoded.
    ///
    /// A sub-field length mismatch here is the bad-secret signal; the
    /// connection driver distinguishes it via
    /// [`DeserializeError::indicates_bad_secret`].
    #[error("request body could not be decoded: {0}")]
    Codec(#[from] DeserializeError),

    /// A reply body could not be encoded.
    #[error("reply could not be encoded: {0}")]
    Encode(#[from] SerializeError),

    /// The handler tried to send a second reply for one request.
    #[error("handler attempted to reply twice to one request")]
    AlreadyReplied,

    /// The reply sequence number would exceed the protocol maximum.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// The handler gave no verdict; the dispatcher treats this as a fault
    /// rather than silently dropping the request.
    #[error("handler completed without replying or scheduling a continuation")]
    NoVerdict,

    /// A handler panicked; the panic was caught at the dispatch boundary.
    #[error("handler panicked")]
    Panicked,
}

/// A connection-fatal error.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer broke framing: malformed header, oversized body, or a
    /// malformed PROXY preamble.
    #[error("protocol framing error: {0}")]
    Framing(DeserializeError),

    /// The peer's obfuscation state disagrees with ours: wrong shared secret,
    /// or the unencrypted flag did not match the transport mode.
    #[error("shared secret or obfuscation mode mismatch")]
    BadSecret,

    /// The unencrypted flag did not match the connection's transport mode.
    #[error("unencrypted flag did not match transport mode")]
    UnencryptedFlagMismatch,

    /// The peer violated the sequence discipline.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// The PROXY v1 preamble was malformed.
    #[error("malformed PROXY protocol preamble: {0}")]
    Proxy(#[from] crate::proxy::ProxyError),

    /// A reply could not be encoded.
    #[error("reply could not be encoded: {0}")]
    Encode(#[from] SerializeError),

    /// Socket-level failure or deadline expiry.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The per-packet read deadline expired.
    #[error("read deadline exceeded")]
    ReadTimeout,

    /// The write deadline expired.
    #[error("write deadline exceeded")]
    WriteTimeout,
}
