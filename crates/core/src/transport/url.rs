use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Largest UDP payload that fits a 1500-byte Ethernet MTU over IPv4.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1472;

/// Parsed `rtp://` destination URL.
///
/// ## Wire format example
///
/// ```text
/// rtp://192.168.1.20:5004?localrtpport=5000&localrtcpport=5001&pkt_size=1200
/// ```
///
/// Recognized query options:
///
/// | Option | Meaning |
/// |--------|---------|
/// | `localrtpport` | local port the RTP socket binds |
/// | `localrtcpport` | local port the RTCP socket binds |
/// | `pkt_size` | largest datagram written, headers included |
/// | `ttl` | IP time-to-live for outgoing datagrams |
/// | `write_timeout_ms` | per-send timeout; sends block indefinitely without it |
///
/// Unknown options are logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpUrl {
    pub host: String,
    /// Remote RTP port. RTCP goes to `port + 1`.
    pub port: u16,
    pub local_rtp_port: Option<u16>,
    pub local_rtcp_port: Option<u16>,
    pub max_packet_size: usize,
    pub ttl: Option<u32>,
    pub write_timeout: Option<Duration>,
}

impl RtpUrl {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            local_rtp_port: None,
            local_rtcp_port: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            ttl: None,
            write_timeout: None,
        }
    }

    /// Pin the local RTP and RTCP ports.
    pub fn with_local_ports(mut self, rtp: u16, rtcp: u16) -> Self {
        self.local_rtp_port = Some(rtp);
        self.local_rtcp_port = Some(rtcp);
        self
    }

    /// Remote RTCP port, the RTP port plus one (RFC 3550 §11).
    ///
    /// `None` when the RTP port is 65535.
    pub fn rtcp_port(&self) -> Option<u16> {
        self.port.checked_add(1)
    }

    /// Local port for the RTCP socket: the explicit one, else the local
    /// RTP port plus one, else 0 (any).
    pub fn local_rtcp_port_or_next(&self) -> Option<u16> {
        match (self.local_rtcp_port, self.local_rtp_port) {
            (Some(p), _) => Some(p),
            (None, Some(rtp)) => rtp.checked_add(1),
            (None, None) => Some(0),
        }
    }

    /// Parse an `rtp://host:port[?options]` URL.
    ///
    /// ## Examples
    ///
    /// ```
    /// use camrtp::transport::RtpUrl;
    ///
    /// let url = RtpUrl::parse("rtp://10.0.0.2:5004?localrtpport=5000&localrtcpport=5001").unwrap();
    /// assert_eq!(url.host, "10.0.0.2");
    /// assert_eq!(url.port, 5004);
    /// assert_eq!(url.local_rtp_port, Some(5000));
    ///
    /// assert!(RtpUrl::parse("http://10.0.0.2:5004").is_err());
    /// ```
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("rtp://")
            .ok_or_else(|| Error::Configuration(format!("not an rtp:// URL: {url}")))?;

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let authority = authority.trim_end_matches('/');

        let (host, port) = split_host_port(authority)
            .ok_or_else(|| Error::Configuration(format!("missing host:port in {url}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::Configuration(format!("invalid port {port:?} in {url}")))?;
        if host.is_empty() || port == 0 {
            return Err(Error::Configuration(format!(
                "destination host and non-zero port required in {url}"
            )));
        }

        if port == u16::MAX {
            return Err(Error::Configuration(format!(
                "port {port} leaves no room for RTCP in {url}"
            )));
        }

        let mut parsed = Self::new(host, port);

        for part in query.into_iter().flat_map(|q| q.split('&')) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key {
                "localrtpport" => parsed.local_rtp_port = Some(parse_option(key, value)?),
                "localrtcpport" => parsed.local_rtcp_port = Some(parse_option(key, value)?),
                "pkt_size" => parsed.max_packet_size = parse_option(key, value)?,
                "ttl" => parsed.ttl = Some(parse_option(key, value)?),
                "write_timeout_ms" => {
                    let ms: u64 = parse_option(key, value)?;
                    parsed.write_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                }
                _ => tracing::warn!(option = key, "ignoring unknown rtp URL option"),
            }
        }

        if parsed.local_rtcp_port_or_next().is_none() {
            return Err(Error::Configuration(format!(
                "localrtpport {} leaves no room for RTCP in {url}",
                u16::MAX
            )));
        }

        Ok(parsed)
    }
}

impl fmt::Display for RtpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "rtp://[{}]:{}", self.host, self.port)?;
        } else {
            write!(f, "rtp://{}:{}", self.host, self.port)?;
        }

        let mut options = Vec::new();
        if let Some(p) = self.local_rtp_port {
            options.push(format!("localrtpport={p}"));
        }
        if let Some(p) = self.local_rtcp_port {
            options.push(format!("localrtcpport={p}"));
        }
        if self.max_packet_size != DEFAULT_MAX_PACKET_SIZE {
            options.push(format!("pkt_size={}", self.max_packet_size));
        }
        if let Some(ttl) = self.ttl {
            options.push(format!("ttl={ttl}"));
        }
        if let Some(t) = self.write_timeout {
            options.push(format!("write_timeout_ms={}", t.as_millis()));
        }
        if !options.is_empty() {
            write!(f, "?{}", options.join("&"))?;
        }
        Ok(())
    }
}

/// Split `host:port`, accepting bracketed IPv6 literals (`[::1]:5004`).
fn split_host_port(authority: &str) -> Option<(&str, &str)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return Some((host, tail.strip_prefix(':')?));
    }
    authority.rsplit_once(':')
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Configuration(format!("invalid value {value:?} for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_options() {
        let url = RtpUrl::parse(
            "rtp://cam.local:6000?localrtpport=5000&localrtcpport=5001&pkt_size=1200&ttl=4&write_timeout_ms=250",
        )
        .unwrap();
        assert_eq!(url.host, "cam.local");
        assert_eq!(url.port, 6000);
        assert_eq!(url.rtcp_port(), Some(6001));
        assert_eq!(url.local_rtp_port, Some(5000));
        assert_eq!(url.local_rtcp_port, Some(5001));
        assert_eq!(url.max_packet_size, 1200);
        assert_eq!(url.ttl, Some(4));
        assert_eq!(url.write_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn defaults_without_query() {
        let url = RtpUrl::parse("rtp://127.0.0.1:5004").unwrap();
        assert_eq!(url, RtpUrl::new("127.0.0.1", 5004));
        assert_eq!(url.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
    }

    #[test]
    fn ipv6_literal() {
        let url = RtpUrl::parse("rtp://[::1]:5004").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.to_string(), "rtp://[::1]:5004");
    }

    #[test]
    fn display_round_trips_local_ports() {
        let url = RtpUrl::new("10.0.0.2", 5004).with_local_ports(5000, 5001);
        assert_eq!(
            url.to_string(),
            "rtp://10.0.0.2:5004?localrtpport=5000&localrtcpport=5001"
        );
        assert_eq!(RtpUrl::parse(&url.to_string()).unwrap(), url);
    }

    #[test]
    fn rejects_bad_urls() {
        for bad in [
            "udp://1.2.3.4:5",
            "rtp://1.2.3.4",
            "rtp://1.2.3.4:0",
            "rtp://:5004",
            "rtp://1.2.3.4:99999",
            "rtp://1.2.3.4:5004?pkt_size=big",
            "rtp://1.2.3.4:65535",
            "rtp://1.2.3.4:5004?localrtpport=65535",
        ] {
            assert!(RtpUrl::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn unknown_option_is_ignored() {
        let url = RtpUrl::parse("rtp://1.2.3.4:5004?rtcpport=9&&").unwrap();
        assert_eq!(url.local_rtcp_port, None);
    }

    #[test]
    fn rtcp_ports_do_not_wrap() {
        let top = RtpUrl::new("1.2.3.4", u16::MAX);
        assert_eq!(top.rtcp_port(), None);

        let mut url = RtpUrl::new("1.2.3.4", 5004);
        assert_eq!(url.local_rtcp_port_or_next(), Some(0));
        url.local_rtp_port = Some(u16::MAX);
        assert_eq!(url.local_rtcp_port_or_next(), None);
        url.local_rtcp_port = Some(7000);
        assert_eq!(url.local_rtcp_port_or_next(), Some(7000));
    }
}
