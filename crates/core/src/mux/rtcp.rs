//! RTCP sender reports (RFC 3550 §6.4.1) and source descriptions (§6.5).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PT_SENDER_REPORT: u8 = 200;
pub const PT_SOURCE_DESCRIPTION: u8 = 202;

/// Packet types RFC 3550 and RFC 4585 assign to RTCP (SR, RR, SDES, BYE, APP).
pub const RTCP_PAYLOAD_TYPES: std::ops::RangeInclusive<u8> = 200..=204;

/// Size of a Sender Report with no reception report blocks.
pub const SENDER_REPORT_LEN: usize = 28;
const SDES_CNAME: u8 = 1;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Convert a wall-clock time to a 64-bit NTP timestamp (32.32 fixed point).
pub fn ntp_timestamp(time: SystemTime) -> u64 {
    let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let seconds = since_unix.as_secs() + NTP_UNIX_OFFSET;
    let fraction = (u64::from(since_unix.subsec_nanos()) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

/// Sender Report with no reception report blocks.
///
/// ```text
/// |V=2|P|RC=0|  PT=200  |      length = 6      |
/// |                 SSRC of sender             |
/// |          NTP timestamp, most significant   |
/// |          NTP timestamp, least significant  |
/// |                 RTP timestamp              |
/// |             sender's packet count          |
/// |             sender's octet count           |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    pub fn write(&self) -> [u8; SENDER_REPORT_LEN] {
        let mut buf = [0u8; SENDER_REPORT_LEN];
        buf[0] = 2 << 6;
        buf[1] = PT_SENDER_REPORT;
        buf[2..4].copy_from_slice(&((SENDER_REPORT_LEN / 4 - 1) as u16).to_be_bytes());
        buf[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        buf[8..16].copy_from_slice(&self.ntp_timestamp.to_be_bytes());
        buf[16..20].copy_from_slice(&self.rtp_timestamp.to_be_bytes());
        buf[20..24].copy_from_slice(&self.packet_count.to_be_bytes());
        buf[24..28].copy_from_slice(&self.octet_count.to_be_bytes());
        buf
    }
}

/// SDES packet carrying a single CNAME item, padded to a 32-bit boundary.
///
/// CNAMEs longer than 255 bytes are truncated to fit the item length field.
pub fn source_description(ssrc: u32, cname: &str) -> Vec<u8> {
    let text = &cname.as_bytes()[..cname.len().min(255)];

    // chunk: SSRC + item header + text + END, padded to a multiple of 4
    let chunk_len = (4 + 2 + text.len() + 1).div_ceil(4) * 4;
    let total = 4 + chunk_len;

    let mut buf = Vec::with_capacity(total);
    buf.push((2 << 6) | 1);
    buf.push(PT_SOURCE_DESCRIPTION);
    buf.extend_from_slice(&((total / 4 - 1) as u16).to_be_bytes());
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.push(SDES_CNAME);
    buf.push(text.len() as u8);
    buf.extend_from_slice(text);
    buf.resize(total, 0);
    buf
}

/// Whether a datagram is RTCP, judged by its second byte (RFC 5761 §4).
pub fn is_rtcp(packet: &[u8]) -> bool {
    packet.len() >= 2 && RTCP_PAYLOAD_TYPES.contains(&packet[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_report_layout() {
        let sr = SenderReport {
            ssrc: 0x11223344,
            ntp_timestamp: 0x0102_0304_0506_0708,
            rtp_timestamp: 90_000,
            packet_count: 7,
            octet_count: 1234,
        };
        let buf = sr.write();
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], 200);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 6);
        assert_eq!(&buf[4..8], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(&buf[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]), 90_000);
        assert_eq!(u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]), 7);
        assert_eq!(u32::from_be_bytes([buf[24], buf[25], buf[26], buf[27]]), 1234);
    }

    #[test]
    fn sdes_is_word_aligned_with_correct_length() {
        let buf = source_description(0xAABBCCDD, "cam");
        assert_eq!(buf.len() % 4, 0);
        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 202);
        let words = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        assert_eq!((words + 1) * 4, buf.len());
        assert_eq!(buf[8], 1);
        assert_eq!(buf[9], 3);
        assert_eq!(&buf[10..13], b"cam");
        assert_eq!(buf[13], 0);
    }

    #[test]
    fn sdes_exact_multiple_still_terminated() {
        // 4 + 2 + 1 = 7 bytes, END makes 8: no padding needed, END present.
        let buf = source_description(1, "x");
        assert_eq!(buf.len(), 12);
        assert_eq!(buf[11], 0);
    }

    #[test]
    fn ntp_epoch_offset() {
        assert_eq!(ntp_timestamp(UNIX_EPOCH), NTP_UNIX_OFFSET << 32);
        let half = UNIX_EPOCH + Duration::from_millis(500);
        assert_eq!(ntp_timestamp(half) & 0xFFFF_FFFF, 1 << 31);
    }

    #[test]
    fn rtcp_detection() {
        assert!(is_rtcp(&[0x80, 200]));
        assert!(is_rtcp(&[0x81, 202]));
        assert!(!is_rtcp(&[0x80, 96]));
        assert!(!is_rtcp(&[0x80, 0x80 | 96]));
        assert!(!is_rtcp(&[0x80]));
    }
}
