use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::rtp::{RTP_HEADER_LEN, RtpHeader};
use super::{Packetized, Packetizer};
use crate::error::{Error, Result};
use crate::wire::WireFrame;

const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_FU_A: u8 = 28;
const FU_HEADER_LEN: usize = 2;

/// H.264 RTP packetizer (RFC 6184).
///
/// Converts H.264 Annex B access units into RTP packets appended to a
/// [`WireFrame`]. Two packetization modes are used:
///
/// - **Single NAL Unit** (§5.6): NALs that fit in one packet are sent
///   as-is (12-byte header + NAL bytes).
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across packets.
///   Each fragment carries a 2-byte FU header before the NAL payload:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]
///   ```
///
/// The packet size limit is the transport's: no packet written here,
/// header included, exceeds `max_packet_size`.
///
/// SPS/PPS are captured from the first access unit carrying them; the
/// fmtp line then includes `profile-level-id` and `sprop-parameter-sets`
/// (RFC 6184 §8.1).
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    max_payload: usize,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl H264Packetizer {
    /// Smallest packet that still fits a header and a one-byte FU-A fragment.
    pub const MIN_PACKET_SIZE: usize = RTP_HEADER_LEN + FU_HEADER_LEN + 1;

    pub fn new(header: RtpHeader, max_packet_size: usize) -> Result<Self> {
        if max_packet_size < Self::MIN_PACKET_SIZE {
            return Err(Error::Configuration(format!(
                "max packet size {max_packet_size} below minimum {}",
                Self::MIN_PACKET_SIZE
            )));
        }
        Ok(Self {
            header,
            max_payload: max_packet_size - RTP_HEADER_LEN,
            sps: None,
            pps: None,
        })
    }

    /// Largest RTP payload this packetizer emits.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Derive profile-level-id from SPS NAL (RFC 6184 §8.1): bytes 1–3 are
    /// profile_idc, constraint flags, level_idc.
    fn profile_level_id(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        if sps.len() < 4 {
            return None;
        }
        Some(format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
    }

    fn sprop_parameter_sets(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let pps = self.pps.as_deref()?;
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }

    fn capture_parameter_sets(&mut self, nal: &[u8]) {
        match nal[0] & 0x1f {
            NAL_SPS if self.sps.is_none() => {
                self.sps = Some(nal.to_vec());
                tracing::debug!(bytes = nal.len(), "H.264 SPS captured from bitstream");
            }
            NAL_PPS if self.pps.is_none() => {
                self.pps = Some(nal.to_vec());
                tracing::debug!(bytes = nal.len(), "H.264 PPS captured from bitstream");
            }
            _ => {}
        }
    }

    /// Packetize one NAL unit as a single packet or as FU-A fragments.
    fn packetize_nal(
        &mut self,
        nal_unit: &[u8],
        is_last_nal: bool,
        out: &mut WireFrame,
        stats: &mut Packetized,
    ) -> Result<()> {
        if nal_unit.is_empty() {
            return Ok(());
        }

        if nal_unit.len() <= self.max_payload {
            let hdr = self.header.write(is_last_nal);
            out.push_parts(&[&hdr, nal_unit])?;
            stats.packets += 1;
            stats.payload_octets += nal_unit.len();
            return Ok(());
        }

        let nal_header = nal_unit[0];
        let nal_type = nal_header & 0x1f;
        let fu_indicator = (nal_header & 0x60) | NAL_FU_A;
        let payload = &nal_unit[1..];

        let max_fragment = self.max_payload - FU_HEADER_LEN;
        let mut fragments = 0usize;

        for (i, chunk) in payload.chunks(max_fragment).enumerate() {
            let first = i == 0;
            let last_fragment = (i + 1) * max_fragment >= payload.len();

            let start_bit = if first { 0x80 } else { 0x00 };
            let end_bit = if last_fragment { 0x40 } else { 0x00 };
            let fu = [fu_indicator, start_bit | end_bit | nal_type];

            let hdr = self.header.write(is_last_nal && last_fragment);
            out.push_parts(&[&hdr, &fu, chunk])?;
            stats.packets += 1;
            stats.payload_octets += FU_HEADER_LEN + chunk.len();
            fragments += 1;
        }

        tracing::trace!(
            nal_type,
            nal_size = nal_unit.len(),
            fragments,
            "FU-A fragmented NAL unit"
        );
        Ok(())
    }

    /// Extract NAL units from an H.264 Annex B bitstream.
    ///
    /// Scans for both 4-byte `00 00 00 01` and 3-byte `00 00 01` start
    /// codes and returns the bytes between them. The start code length is
    /// tracked per NAL so mixed 3- and 4-byte codes split correctly.
    pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
        let mut i = 0usize;

        // (nal_data_start_index, start_code_length)
        let mut start_entries: Vec<(usize, usize)> = Vec::new();

        while i < data.len() {
            if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
                start_entries.push((i + 4, 4));
                i += 4;
            } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
                start_entries.push((i + 3, 3));
                i += 3;
            } else {
                i += 1;
            }
        }

        let mut nal_units = Vec::with_capacity(start_entries.len());
        for (idx, &(start, _)) in start_entries.iter().enumerate() {
            let end = match start_entries.get(idx + 1) {
                Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
                None => data.len(),
            };
            if start < end {
                nal_units.push(&data[start..end]);
            }
        }

        nal_units
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(
        &mut self,
        access_unit: &[u8],
        rtp_timestamp: u32,
        out: &mut WireFrame,
    ) -> Result<Packetized> {
        let nal_units = Self::extract_nal_units(access_unit);
        let mut stats = Packetized::default();

        if self.sps.is_none() || self.pps.is_none() {
            for nal in &nal_units {
                self.capture_parameter_sets(nal);
            }
        }

        self.header.set_timestamp(rtp_timestamp);
        for (i, nal) in nal_units.iter().enumerate() {
            self.packetize_nal(nal, i + 1 == nal_units.len(), out, &mut stats)?;
        }

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = stats.packets,
            frame_bytes = access_unit.len(),
            seq = self.header.sequence(),
            ts = rtp_timestamp,
            "frame packetized"
        );

        Ok(stats)
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    /// 90 kHz clock rate per RFC 6184 §8.1.
    fn clock_rate(&self) -> u32 {
        90_000
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// SDP attributes per RFC 6184 §8.2.1.
    ///
    /// `a=rtpmap` defines the payload type and must precede the `a=fmtp`
    /// line that references it.
    fn sdp_attributes(&self) -> Vec<String> {
        let mut fmtp = format!("a=fmtp:{} packetization-mode=1", self.header.pt);
        if let Some(pl) = self.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={pl}"));
        }
        if let Some(sprop) = self.sprop_parameter_sets() {
            fmtp.push_str(&format!(";sprop-parameter-sets={sprop}"));
        }

        vec![
            format!(
                "a=rtpmap:{} {}/{}",
                self.payload_type(),
                self.codec_name(),
                self.clock_rate()
            ),
            fmtp,
        ]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }
}
