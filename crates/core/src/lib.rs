//! Live camera frames to RTP.
//!
//! The pipeline for one frame:
//!
//! ```text
//! raw frame ─► PixelConverter ─► FrameEncoder ─► rescale ─► RtpMuxer ─► send_wire_frame ─► UDP
//!   (NV21)       (I420 Picture)   (CompressedUnit) (µs→90k)  (WireFrame)   (PacketSink)
//! ```
//!
//! [`OutputSession`] owns one instance of each stage and runs them in order
//! for every [`submit_frame`](OutputSession::submit_frame) call.

pub mod codec;
pub mod error;
pub mod media;
pub mod mux;
pub mod sdp;
pub mod session;
pub mod stream;
pub mod time;
pub mod transport;
pub mod wire;

pub use codec::{CompressedUnit, FrameEncoder, VideoEncoder};
pub use error::{EncodeErrorKind, Error, ProtocolErrorKind, Result};
pub use media::{Picture, PixelConverter, PixelFormat};
pub use mux::{Packetizer, RtpMuxer};
pub use session::{FrameOutcome, OutputSession, SessionBuilder, SessionState};
pub use stream::{Codec, StreamDescriptor};
pub use time::{NO_TIMESTAMP, Rational, rescale};
pub use transport::{PacketSink, RtpUrl, SendPolicy, SendReport, TransportStats, UdpTransport};
pub use wire::WireFrame;
