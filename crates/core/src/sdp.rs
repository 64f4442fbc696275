//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! A viewer needs the session description to decode the raw RTP stream,
//! e.g. `ffplay -protocol_whitelist file,udp,rtp stream.sdp`. The format:
//!
//! ```text
//! v=0                                  ← protocol version
//! o=- <sess-id> <sess-ver> IN IP4 <a>  ← origin
//! s=<title>                            ← session name
//! c=IN IP4 <addr>                      ← destination address
//! t=0 0                                ← timing (live stream)
//! a=tool:camrtp                        ← sender software
//! m=video <port> RTP/AVP 96            ← media description
//! a=rtpmap:96 H264/90000               ← codec/clock rate
//! a=fmtp:96 packetization-mode=1       ← codec parameters
//! ```

use std::net::IpAddr;

use crate::stream::StreamDescriptor;

/// One `m=` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub port: u16,
    pub payload_type: u8,
    /// Media-level attribute lines, `a=` prefix included.
    pub attributes: Vec<String>,
}

impl MediaDescription {
    /// Attributes derivable from the descriptor alone, before any
    /// parameter sets have been seen.
    pub fn from_descriptor(descriptor: &StreamDescriptor, port: u16) -> Self {
        let pt = descriptor.payload_type();
        Self {
            port,
            payload_type: pt,
            attributes: vec![
                format!("a=rtpmap:{pt} {}/90000", descriptor.codec().rtp_name()),
                format!("a=fmtp:{pt} packetization-mode=1"),
            ],
        }
    }
}

/// Render a session description for streams sent to `destination`.
pub fn session_description(title: &str, media: &[MediaDescription], destination: IpAddr) -> String {
    let family = match destination {
        IpAddr::V4(_) => "IP4",
        IpAddr::V6(_) => "IP6",
    };
    let origin = match destination {
        IpAddr::V4(_) => "127.0.0.1",
        IpAddr::V6(_) => "::1",
    };

    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!("o=- 0 0 IN {family} {origin}"));
    sdp.push(format!("s={title}"));
    sdp.push(format!("c=IN {family} {destination}"));
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:camrtp".to_string());
    for m in media {
        sdp.push(format!("m=video {} RTP/AVP {}", m.port, m.payload_type));
        sdp.extend(m.attributes.iter().cloned());
    }

    tracing::debug!(sdp = %sdp.join("\\r\\n"), "SDP generated");

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn generates_h264_sdp() {
        let desc = StreamDescriptor::default();
        let media = MediaDescription::from_descriptor(&desc, 5004);
        let sdp = session_description(
            desc.title(),
            &[media],
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)),
        );

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("s=camrtp feed\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("t=0 0\r\n"));
        assert!(sdp.contains("m=video 5004 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=fmtp:96 packetization-mode=1\r\n"));

        let rtpmap_idx = sdp.find("a=rtpmap").unwrap();
        let fmtp_idx = sdp.find("a=fmtp").unwrap();
        let m_idx = sdp.find("m=video").unwrap();
        assert!(m_idx < rtpmap_idx && rtpmap_idx < fmtp_idx);
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn ipv6_destination() {
        let sdp = session_description("t", &[], "::1".parse().unwrap());
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
        assert!(!sdp.contains("m="));
    }
}
