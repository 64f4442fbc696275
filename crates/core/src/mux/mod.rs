//! RTP muxing: compressed units in, length-prefixed packet streams out.
//!
//! Each compressed access unit is split into one or more RTP packets
//! (RFC 3550). Every packet carries a 12-byte fixed header
//! ([`rtp::RtpHeader`]) with:
//!
//! - **Sequence number** (16-bit, wrapping, random start) for loss detection.
//! - **Timestamp** (32-bit) on the codec clock, 90 kHz for video, derived
//!   from the unit's presentation time plus a random offset.
//! - **SSRC** (32-bit), randomly chosen per stream.
//! - **Marker bit**, set on the last packet of an access unit.
//!
//! The muxer also interleaves RTCP Sender Reports so receivers can map
//! RTP time to wall-clock time: one before the first frame, then at least
//! every [`REPORT_INTERVAL_SECS`] of media time.
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |

pub mod h264;
pub mod rtcp;
pub mod rtp;

use std::sync::Arc;
use std::time::SystemTime;

use crate::codec::CompressedUnit;
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::stream::{Codec, StreamDescriptor};
use crate::time::{NO_TIMESTAMP, Rational, rescale};
use crate::wire::WireFrame;

use self::h264::H264Packetizer;
use self::rtcp::SenderReport;
use self::rtp::RtpHeader;

/// Media time between two RTCP Sender Reports.
pub const REPORT_INTERVAL_SECS: i64 = 5;

/// Totals for one packetized access unit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Packetized {
    pub packets: usize,
    /// RTP payload bytes written, headers excluded (the SR octet count).
    pub payload_octets: usize,
}

/// Codec-specific RTP packetizer.
///
/// Each supported codec implements this trait, providing:
/// - **Packetization**: splitting an access unit into RTP packets
/// - **SDP attributes**: codec parameters for the session description
/// - **RTP metadata**: payload type, clock rate, SSRC and sequence state
///
/// The generic RTP header is handled by [`rtp::RtpHeader`]; packetizers
/// compose it rather than reimplementing header serialization.
pub trait Packetizer: Send {
    /// Append the RTP packets for one access unit to `out`.
    ///
    /// Every packet of the unit carries `rtp_timestamp`.
    fn packetize(
        &mut self,
        access_unit: &[u8],
        rtp_timestamp: u32,
        out: &mut WireFrame,
    ) -> Result<Packetized>;

    /// Codec name for the SDP `a=rtpmap` attribute (e.g. `"H264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    fn ssrc(&self) -> u32;

    /// SDP media-level attribute lines, `a=` prefix included.
    fn sdp_attributes(&self) -> Vec<String>;

    /// Sequence number the next packet will carry.
    fn next_sequence(&self) -> u16;
}

/// Builds the wire frame for each compressed unit of one RTP stream.
pub struct RtpMuxer {
    packetizer: Box<dyn Packetizer>,
    descriptor: Arc<StreamDescriptor>,
    timestamp_offset: u32,
    cname: String,
    packet_count: u32,
    octet_count: u32,
    last_clock: i64,
    last_report: Option<i64>,
}

impl RtpMuxer {
    /// Create a muxer whose packets never exceed `max_packet_size` bytes.
    ///
    /// The limit must also hold the SR+SDES compound packet, or every
    /// frame carrying a report would be rejected by the transport.
    pub fn new(descriptor: Arc<StreamDescriptor>, max_packet_size: usize) -> Result<Self> {
        let header = RtpHeader::random(descriptor.payload_type());
        let packetizer: Box<dyn Packetizer> = match descriptor.codec() {
            Codec::H264 => Box::new(H264Packetizer::new(header, max_packet_size)?),
        };
        let muxer = Self::with_packetizer(descriptor, packetizer, rand::random::<u32>());

        let report_len = muxer.report_len();
        if max_packet_size < report_len {
            return Err(Error::Configuration(format!(
                "max packet size {max_packet_size} cannot hold the {report_len} byte RTCP report"
            )));
        }
        Ok(muxer)
    }

    /// Create a muxer around an explicit packetizer and timestamp offset.
    pub fn with_packetizer(
        descriptor: Arc<StreamDescriptor>,
        packetizer: Box<dyn Packetizer>,
        timestamp_offset: u32,
    ) -> Self {
        let cname = format!("camrtp-{:08x}", packetizer.ssrc());
        tracing::debug!(
            codec = packetizer.codec_name(),
            ssrc = format_args!("{:#010X}", packetizer.ssrc()),
            timestamp_offset,
            "RTP muxer created"
        );
        Self {
            packetizer,
            descriptor,
            timestamp_offset,
            cname,
            packet_count: 0,
            octet_count: 0,
            last_clock: 0,
            last_report: None,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    pub fn payload_type(&self) -> u8 {
        self.packetizer.payload_type()
    }

    pub fn clock_rate(&self) -> u32 {
        self.packetizer.clock_rate()
    }

    /// Random offset added to every RTP timestamp.
    pub fn timestamp_offset(&self) -> u32 {
        self.timestamp_offset
    }

    pub fn next_sequence(&self) -> u16 {
        self.packetizer.next_sequence()
    }

    /// RTP data packets written so far (RTCP excluded).
    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    /// RTP payload octets written so far.
    pub fn octet_count(&self) -> u32 {
        self.octet_count
    }

    pub fn sdp_attributes(&self) -> Vec<String> {
        self.packetizer.sdp_attributes()
    }

    /// Size of the SR+SDES compound packet this muxer sends.
    pub fn report_len(&self) -> usize {
        rtcp::SENDER_REPORT_LEN + rtcp::source_description(self.ssrc(), &self.cname).len()
    }

    /// Replace the contents of `out` with the packets for `unit`.
    ///
    /// `unit` timestamps must already be in the stream's output time base.
    /// Returns the number of records written, RTCP included.
    pub fn write_frame(&mut self, unit: &CompressedUnit<'_>, out: &mut WireFrame) -> Result<usize> {
        out.clear();

        let clock = self.media_clock(unit);
        let rtp_timestamp = self.timestamp_offset.wrapping_add(clock as u32);
        let mut records = 0;

        let report_due = self.report_due(clock);
        if report_due {
            let sr = SenderReport {
                ssrc: self.packetizer.ssrc(),
                ntp_timestamp: rtcp::ntp_timestamp(SystemTime::now()),
                rtp_timestamp,
                packet_count: self.packet_count,
                octet_count: self.octet_count,
            };
            let sdes = rtcp::source_description(sr.ssrc, &self.cname);
            out.push_parts(&[&sr.write(), &sdes])?;
            records += 1;
            tracing::debug!(
                rtp_timestamp,
                packets = sr.packet_count,
                octets = sr.octet_count,
                "RTCP sender report queued"
            );
        }

        let packetized = self.packetizer.packetize(unit.data, rtp_timestamp, out)?;
        if packetized.packets == 0 && !unit.data.is_empty() {
            return Err(Error::Protocol(ProtocolErrorKind::NoPayload(unit.data.len())));
        }

        if report_due {
            self.last_report = Some(clock);
        }
        self.packet_count = self.packet_count.wrapping_add(packetized.packets as u32);
        self.octet_count = self
            .octet_count
            .wrapping_add(packetized.payload_octets as u32);
        self.last_clock = clock;

        Ok(records + packetized.packets)
    }

    /// Presentation time of `unit` on the codec clock.
    ///
    /// Falls back to dts, then to the previous frame's time, when the unit
    /// carries no timestamp.
    fn media_clock(&self, unit: &CompressedUnit<'_>) -> i64 {
        let ts = if unit.pts != NO_TIMESTAMP {
            unit.pts
        } else if unit.dts != NO_TIMESTAMP {
            unit.dts
        } else {
            return self.last_clock;
        };
        let clock = Rational::new(1, self.packetizer.clock_rate() as i32);
        rescale(ts, self.descriptor.time_base(), clock)
    }

    fn report_due(&self, clock: i64) -> bool {
        let interval = REPORT_INTERVAL_SECS * i64::from(self.packetizer.clock_rate());
        match self.last_report {
            None => true,
            Some(last) => clock.saturating_sub(last) >= interval,
        }
    }
}

impl std::fmt::Debug for RtpMuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpMuxer")
            .field("codec", &self.packetizer.codec_name())
            .field("ssrc", &self.packetizer.ssrc())
            .field("packet_count", &self.packet_count)
            .field("octet_count", &self.octet_count)
            .finish()
    }
}
