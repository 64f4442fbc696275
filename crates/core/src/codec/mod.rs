//! Video compression.
//!
//! The compression algorithm itself is a pluggable capability: anything
//! implementing [`VideoEncoder`] can sit behind a session. [`FrameEncoder`]
//! wraps it with the state the pipeline owns: the descriptor the encoder
//! was opened with, the frame counter, and the bounds check on the fixed
//! output buffer.
//!
//! ## Lookahead
//!
//! Encoders may hold pictures back (B-frame reordering, rate-control
//! lookahead, frame skipping). An `encode` call that consumes a picture and
//! emits nothing returns `Ok(None)`; that is routine, not an error.
//!
//! | Backend | Module | Feature |
//! |---------|--------|---------|
//! | H.264 (OpenH264) | `h264` | `h264` |

#[cfg(feature = "h264")]
pub mod h264;

use std::sync::Arc;

use crate::error::{EncodeErrorKind, Error, Result};
use crate::media::Picture;
use crate::stream::{Codec, StreamDescriptor};
use crate::time::{Rational, rescale};

/// Capacity of the per-session compressed output buffer.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 200_000;

/// Result of one successful encoder call that produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPicture {
    /// Bytes written to the front of the output buffer.
    pub size: usize,
    /// Whether the codec classified this unit as a key frame.
    pub key_frame: bool,
}

/// Compression capability.
///
/// Implementations keep whatever codec state they need between calls. The
/// picture format and dimensions are fixed when the encoder is opened and
/// must not change for its lifetime.
///
/// H.264 output must be an Annex B byte stream: every NAL unit preceded by
/// a `00 00 01` or `00 00 00 01` start code. Units without start codes
/// are rejected by the muxer with [`ProtocolErrorKind::NoPayload`].
///
/// [`ProtocolErrorKind::NoPayload`]: crate::error::ProtocolErrorKind::NoPayload
pub trait VideoEncoder: Send {
    /// Compress one picture into `out`.
    ///
    /// Returns `Ok(None)` when the picture was consumed but no output is
    /// ready yet. Output that does not fit in `out` must be reported as
    /// [`EncodeErrorKind::BufferOverflow`], never truncated.
    fn encode(&mut self, picture: &Picture, pts: i64, out: &mut [u8])
    -> Result<Option<EncodedPicture>>;

    /// Ask for the next produced unit to be a key frame.
    fn force_key_frame(&mut self) {}

    /// Short backend name for logging.
    fn name(&self) -> &'static str;
}

/// One compressed access unit.
///
/// Borrows its payload from the session's scratch buffer, so it cannot
/// outlive the next encode call.
#[derive(Debug, Clone, Copy)]
pub struct CompressedUnit<'a> {
    pub data: &'a [u8],
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub key_frame: bool,
    pub stream_index: usize,
}

impl CompressedUnit<'_> {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Rescale pts, dts and duration from `from` into `to`.
    pub fn rescale(&mut self, from: Rational, to: Rational) {
        self.pts = rescale(self.pts, from, to);
        self.dts = rescale(self.dts, from, to);
        self.duration = rescale(self.duration, from, to);
    }
}

/// Session-owned encoder state.
pub struct FrameEncoder {
    inner: Box<dyn VideoEncoder>,
    descriptor: Arc<StreamDescriptor>,
    frame_number: u64,
    pictures_in: u64,
}

impl FrameEncoder {
    pub fn new(inner: Box<dyn VideoEncoder>, descriptor: Arc<StreamDescriptor>) -> Self {
        tracing::debug!(
            backend = inner.name(),
            width = descriptor.width(),
            height = descriptor.height(),
            "frame encoder opened"
        );
        Self {
            inner,
            descriptor,
            frame_number: 0,
            pictures_in: 0,
        }
    }

    /// Number of compressed units produced so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of pictures submitted so far.
    pub fn pictures_in(&self) -> u64 {
        self.pictures_in
    }

    pub fn force_key_frame(&mut self) {
        self.inner.force_key_frame();
    }

    /// Compress `picture`, writing the payload into `out`.
    ///
    /// `pts` and `duration` are in the caller's input time domain; the
    /// produced unit carries them unchanged (`dts == pts`, stream index 0).
    pub fn encode<'a>(
        &mut self,
        picture: &Picture,
        pts: i64,
        duration: i64,
        out: &'a mut [u8],
    ) -> Result<Option<CompressedUnit<'a>>> {
        if picture.width() != self.descriptor.width()
            || picture.height() != self.descriptor.height()
        {
            return Err(Error::Configuration(format!(
                "picture {}x{} does not match encoder {}x{}",
                picture.width(),
                picture.height(),
                self.descriptor.width(),
                self.descriptor.height()
            )));
        }

        self.pictures_in += 1;
        let capacity = out.len();

        let Some(encoded) = self.inner.encode(picture, pts, out)? else {
            tracing::trace!(pts, pictures_in = self.pictures_in, "picture buffered by encoder");
            return Ok(None);
        };

        if encoded.size > capacity {
            return Err(Error::Encode(EncodeErrorKind::BufferOverflow {
                needed: encoded.size,
                capacity,
            }));
        }
        if encoded.size == 0 {
            return Ok(None);
        }

        self.frame_number += 1;
        tracing::trace!(
            frame_number = self.frame_number,
            size = encoded.size,
            key_frame = encoded.key_frame,
            "picture encoded"
        );

        Ok(Some(CompressedUnit {
            data: &out[..encoded.size],
            pts,
            dts: pts,
            duration,
            key_frame: encoded.key_frame,
            stream_index: 0,
        }))
    }
}

impl std::fmt::Debug for FrameEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEncoder")
            .field("backend", &self.inner.name())
            .field("frame_number", &self.frame_number)
            .field("pictures_in", &self.pictures_in)
            .finish()
    }
}

/// Open the compiled-in encoder backend for `descriptor`'s codec.
pub fn open_encoder(descriptor: &StreamDescriptor) -> Result<Box<dyn VideoEncoder>> {
    match descriptor.codec() {
        #[cfg(feature = "h264")]
        Codec::H264 => Ok(Box::new(h264::OpenH264Encoder::new(descriptor)?)),
        #[cfg(not(feature = "h264"))]
        Codec::H264 => Err(Error::Encode(EncodeErrorKind::Unavailable("H264"))),
    }
}
