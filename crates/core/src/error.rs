//! Error types for the camera-to-RTP pipeline.

use std::fmt;

/// Errors that can occur anywhere between a raw camera frame and the wire.
///
/// Variants map to the pipeline stage that failed and to how fatal the
/// failure is:
///
/// - **Setup**: [`Configuration`](Self::Configuration) and
///   [`Transport`](Self::Transport) are raised before or while a session is
///   opened. Partially acquired resources are released before they surface.
/// - **Resources**: [`Allocation`](Self::Allocation) is fatal to the
///   operation and never retried.
/// - **Per frame**: [`Conversion`](Self::Conversion) and
///   [`Protocol`](Self::Protocol) fail the current frame only; the session
///   stays open.
/// - **Per session**: [`Encode`](Self::Encode) poisons the session. The
///   caller must close it and may not resubmit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resource exhaustion while allocating a picture or scratch buffer.
    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },

    /// Invalid or unsupported stream parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The source frame could not be converted into the encoder's layout.
    #[error("pixel conversion failed: {0}")]
    Conversion(String),

    /// The encoder reported a hard failure.
    #[error("encode error: {0}")]
    Encode(EncodeErrorKind),

    /// Malformed length-prefixed framing found while unpacking a wire frame.
    #[error("protocol error: {0}")]
    Protocol(ProtocolErrorKind),

    /// Opening, connecting or (in strict mode) writing to the transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was closed; no further frames are accepted.
    #[error("session closed")]
    SessionClosed,

    /// A previous encode failure left the session unusable.
    #[error("session failed after an encoder error")]
    SessionFailed,
}

/// Specific kind of encoder failure.
#[derive(Debug)]
pub enum EncodeErrorKind {
    /// The codec rejected the picture or failed internally.
    Codec(String),
    /// The compressed output did not fit into the fixed scratch buffer.
    BufferOverflow { needed: usize, capacity: usize },
    /// No encoder backend is compiled in for the requested codec.
    Unavailable(&'static str),
}

impl fmt::Display for EncodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(msg) => write!(f, "codec failure: {msg}"),
            Self::BufferOverflow { needed, capacity } => write!(
                f,
                "compressed picture of {needed} bytes exceeds {capacity} byte output buffer"
            ),
            Self::Unavailable(codec) => write!(f, "no {codec} encoder compiled in"),
        }
    }
}

/// Specific kind of wire-frame framing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Fewer than 4 bytes remain where a length prefix is expected.
    TruncatedPrefix { offset: usize, remaining: usize },
    /// A declared sub-packet length runs past the end of the frame.
    LengthOverrun {
        offset: usize,
        declared: usize,
        available: usize,
    },
    /// A sub-packet is larger than the transport accepts or than the
    /// 32-bit length prefix can describe.
    PacketTooLarge(usize),
    /// A non-empty compressed unit yielded no packets, e.g. H.264 output
    /// without Annex B start codes.
    NoPayload(usize),
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedPrefix { offset, remaining } => write!(
                f,
                "truncated length prefix at offset {offset} ({remaining} bytes left)"
            ),
            Self::LengthOverrun {
                offset,
                declared,
                available,
            } => write!(
                f,
                "sub-packet at offset {offset} declares {declared} bytes but only {available} remain"
            ),
            Self::PacketTooLarge(len) => write!(f, "packet of {len} bytes exceeds the size limit"),
            Self::NoPayload(len) => {
                write!(f, "compressed unit of {len} bytes produced no packets")
            }
        }
    }
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
