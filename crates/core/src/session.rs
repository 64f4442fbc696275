//! Output sessions: one camera feed streamed to one RTP peer.
//!
//! A session owns every per-stream resource: the pixel converter and its
//! picture buffer, the encoder and its fixed output buffer, the RTP muxer
//! and the transport. [`OutputSession::submit_frame`] drives one camera
//! frame through all of them.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionBuilder::open  -> Open
//! encoder error         -> Failed   (frames rejected, close still required)
//! close / drop          -> Closed   (resources released exactly once)
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{self, DEFAULT_OUTPUT_CAPACITY, FrameEncoder, VideoEncoder};
use crate::error::{Error, Result};
use crate::media::{PixelConverter, PixelFormat, Picture};
use crate::mux::RtpMuxer;
use crate::sdp::{self, MediaDescription};
use crate::stream::StreamDescriptor;
use crate::time::MICROSECONDS;
use crate::transport::{
    PacketSink, RtpUrl, SendPolicy, SendReport, TransportStats, UdpTransport, send_and_record,
};
use crate::wire::WireFrame;

/// Session state machine. The uninitialized state is [`SessionBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting frames.
    Open,
    /// The encoder failed; frames are rejected until the session is closed.
    Failed,
    /// Resources released.
    Closed,
}

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Consumed by the encoder with no output yet.
    Buffered,
    /// Compressed and handed to the transport.
    Sent(SendReport),
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

/// Configuration for an [`OutputSession`] that has not been opened yet.
pub struct SessionBuilder {
    descriptor: Arc<StreamDescriptor>,
    url: RtpUrl,
    start_time_us: Option<i64>,
    policy: SendPolicy,
    encoder: Option<Box<dyn VideoEncoder>>,
    output_capacity: usize,
}

impl SessionBuilder {
    pub fn new(descriptor: Arc<StreamDescriptor>, url: RtpUrl) -> Self {
        Self {
            descriptor,
            url,
            start_time_us: None,
            policy: SendPolicy::default(),
            encoder: None,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }

    /// Reference time for the first frame's duration, in microseconds.
    /// Defaults to the wall clock at [`open`](Self::open).
    pub fn start_time_us(mut self, us: i64) -> Self {
        self.start_time_us = Some(us);
        self
    }

    pub fn send_policy(mut self, policy: SendPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use this encoder instead of the compiled-in backend.
    pub fn encoder(mut self, encoder: Box<dyn VideoEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Size of the compressed output buffer.
    pub fn output_capacity(mut self, bytes: usize) -> Self {
        self.output_capacity = bytes;
        self
    }

    /// Open the encoder, then the UDP transport named by the URL.
    pub fn open(mut self) -> Result<OutputSession<UdpTransport>> {
        let encoder = self.open_encoder()?;
        let transport = UdpTransport::open_url(&self.url)?;
        let destination = transport.peer().ip();
        self.finish(encoder, transport, destination)
    }

    /// Open with a caller-provided sink in place of the UDP transport.
    pub fn open_with_sink<S: PacketSink>(mut self, sink: S) -> Result<OutputSession<S>> {
        let encoder = self.open_encoder()?;
        let destination = self
            .url
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        self.finish(encoder, sink, destination)
    }

    fn open_encoder(&mut self) -> Result<FrameEncoder> {
        if self.output_capacity == 0 {
            return Err(Error::Configuration("output capacity must be non-zero".into()));
        }
        let backend = match self.encoder.take() {
            Some(custom) => custom,
            None => codec::open_encoder(&self.descriptor)?,
        };
        Ok(FrameEncoder::new(backend, self.descriptor.clone()))
    }

    fn finish<S: PacketSink>(
        self,
        encoder: FrameEncoder,
        sink: S,
        destination: IpAddr,
    ) -> Result<OutputSession<S>> {
        let muxer = RtpMuxer::new(self.descriptor.clone(), sink.max_packet_size())?;

        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(self.output_capacity)
            .map_err(|_| Error::Allocation {
                bytes: self.output_capacity,
            })?;
        scratch.resize(self.output_capacity, 0);

        let start = self.start_time_us.unwrap_or_else(now_micros);

        tracing::info!(
            url = %self.url,
            width = self.descriptor.width(),
            height = self.descriptor.height(),
            fps = self.descriptor.frame_rate(),
            ssrc = format_args!("{:#010X}", muxer.ssrc()),
            "output session opened"
        );

        Ok(OutputSession {
            descriptor: self.descriptor,
            url: self.url,
            destination,
            converter: PixelConverter::new(),
            picture: None,
            encoder: Some(encoder),
            muxer,
            sink: Some(sink),
            scratch,
            wire: WireFrame::with_capacity(self.output_capacity),
            policy: self.policy,
            last_frame_time: start,
            stats: TransportStats::default(),
            state: SessionState::Open,
        })
    }
}

/// An open stream from camera frames to an RTP peer.
pub struct OutputSession<S: PacketSink = UdpTransport> {
    descriptor: Arc<StreamDescriptor>,
    url: RtpUrl,
    destination: IpAddr,
    converter: PixelConverter,
    picture: Option<Picture>,
    encoder: Option<FrameEncoder>,
    muxer: RtpMuxer,
    sink: Option<S>,
    scratch: Vec<u8>,
    wire: WireFrame,
    policy: SendPolicy,
    last_frame_time: i64,
    stats: TransportStats,
    state: SessionState,
}

impl<S: PacketSink> OutputSession<S> {
    /// Push one camera frame through conversion, encoding and transport.
    ///
    /// `frame_time_us` is the capture time in microseconds. The frame's
    /// duration is its distance from the previous frame's time, which is
    /// updated even when conversion or encoding fails.
    ///
    /// An encoder error moves the session to [`SessionState::Failed`];
    /// conversion, framing and transport errors fail only this frame.
    pub fn submit_frame(
        &mut self,
        data: &[u8],
        frame_time_us: i64,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameOutcome> {
        match self.state {
            SessionState::Open => {}
            SessionState::Closed => return Err(Error::SessionClosed),
            SessionState::Failed => return Err(Error::SessionFailed),
        }
        let (Some(encoder), Some(sink)) = (self.encoder.as_mut(), self.sink.as_mut()) else {
            return Err(Error::SessionClosed);
        };

        let picture = match self.picture.take() {
            Some(p) => p,
            None => Picture::alloc(
                PixelFormat::I420,
                self.descriptor.width(),
                self.descriptor.height(),
            )?,
        };
        let picture = self.picture.insert(picture);

        let duration = frame_time_us.saturating_sub(self.last_frame_time);
        if duration < 0 {
            tracing::warn!(
                frame_time_us,
                last_frame_time = self.last_frame_time,
                "frame time went backwards"
            );
        }

        let converted = self
            .converter
            .convert(data, format, width, height, picture);
        if let Err(e) = converted {
            self.last_frame_time = frame_time_us;
            return Err(e);
        }

        let encoded = encoder.encode(picture, frame_time_us, duration, &mut self.scratch);
        self.last_frame_time = frame_time_us;

        let mut unit = match encoded {
            Ok(Some(unit)) => unit,
            Ok(None) => return Ok(FrameOutcome::Buffered),
            Err(e @ Error::Encode(_)) => {
                tracing::error!(error = %e, "encoder failed, session unusable");
                self.state = SessionState::Failed;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        unit.rescale(MICROSECONDS, self.descriptor.time_base());
        self.muxer.write_frame(&unit, &mut self.wire)?;
        let report = send_and_record(sink, &self.wire, self.policy, &mut self.stats)?;

        Ok(FrameOutcome::Sent(report))
    }

    /// Release the encoder and transport. Later calls do nothing.
    ///
    /// Returns whether this call performed the close.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }

        self.encoder = None;
        self.sink = None;
        self.picture = None;
        self.state = SessionState::Closed;

        tracing::info!(
            frames = self.stats.frames,
            packets = self.stats.packets,
            bytes_sent = self.stats.bytes_sent,
            dropped = self.stats.dropped_packets(),
            "output session closed"
        );
        true
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    pub fn url(&self) -> &RtpUrl {
        &self.url
    }

    /// Capture time of the most recent frame, in microseconds.
    pub fn last_frame_time(&self) -> i64 {
        self.last_frame_time
    }

    /// Compressed units produced so far, 0 once closed.
    pub fn frame_number(&self) -> u64 {
        self.encoder.as_ref().map_or(0, FrameEncoder::frame_number)
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn muxer(&self) -> &RtpMuxer {
        &self.muxer
    }

    /// The transport, until the session is closed.
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Ask the encoder for a key frame as soon as possible.
    pub fn request_key_frame(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.force_key_frame();
        }
    }

    /// Session description for a viewer of this stream.
    ///
    /// Includes H.264 parameter sets once the first key frame was sent.
    pub fn sdp(&self) -> String {
        let media = MediaDescription {
            port: self.url.port,
            payload_type: self.muxer.payload_type(),
            attributes: self.muxer.sdp_attributes(),
        };
        sdp::session_description(self.descriptor.title(), &[media], self.destination)
    }
}

impl OutputSession<UdpTransport> {
    pub fn builder(descriptor: Arc<StreamDescriptor>, url: RtpUrl) -> SessionBuilder {
        SessionBuilder::new(descriptor, url)
    }

    /// Local port of the RTP socket, 0 once closed.
    pub fn local_rtp_port(&self) -> u16 {
        self.sink.as_ref().map_or(0, UdpTransport::local_rtp_port)
    }

    /// Local port of the RTCP socket, 0 once closed.
    pub fn local_rtcp_port(&self) -> u16 {
        self.sink.as_ref().map_or(0, UdpTransport::local_rtcp_port)
    }
}

impl<S: PacketSink> Drop for OutputSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: PacketSink> std::fmt::Debug for OutputSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSession")
            .field("url", &self.url.to_string())
            .field("state", &self.state)
            .field("last_frame_time", &self.last_frame_time)
            .field("muxer", &self.muxer)
            .field("stats", &self.stats)
            .finish()
    }
}
