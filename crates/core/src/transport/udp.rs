use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use super::PacketSink;
use super::url::RtpUrl;
use crate::error::{Error, Result};
use crate::mux::rtcp::is_rtcp;

/// UDP transport for one outbound RTP stream.
///
/// Binds two sockets, one for RTP and one for RTCP, and connects them to
/// `host:port` and `host:port+1`. Packets are routed by payload type:
/// RTCP packet types (200–204) go out the RTCP socket, everything else
/// out the RTP socket.
///
/// Sends block until the kernel accepts the datagram unless the URL set
/// `write_timeout_ms`.
#[derive(Debug)]
pub struct UdpTransport {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    peer: SocketAddr,
    max_packet_size: usize,
}

impl UdpTransport {
    /// Open from an `rtp://` URL string.
    pub fn open(url: &str) -> Result<Self> {
        Self::open_url(&RtpUrl::parse(url)?)
    }

    pub fn open_url(url: &RtpUrl) -> Result<Self> {
        let peer = (url.host.as_str(), url.port)
            .to_socket_addrs()
            .map_err(|e| Error::Transport(format!("resolve {}: {e}", url.host)))?
            .next()
            .ok_or_else(|| Error::Transport(format!("no address for {}", url.host)))?;
        let rtcp_peer = url
            .rtcp_port()
            .map(|port| SocketAddr::new(peer.ip(), port))
            .ok_or_else(|| Error::Configuration(format!("no RTCP port above {}", url.port)))?;

        let unspecified = match peer {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let rtp_port = url.local_rtp_port.unwrap_or(0);
        let rtcp_port = url.local_rtcp_port_or_next().ok_or_else(|| {
            Error::Configuration(format!("no local RTCP port above {rtp_port}"))
        })?;

        let rtp = bind_connected(SocketAddr::new(unspecified, rtp_port), peer)?;
        let rtcp = bind_connected(SocketAddr::new(unspecified, rtcp_port), rtcp_peer)?;

        for socket in [&rtp, &rtcp] {
            configure(socket, peer, url)
                .map_err(|e| Error::Transport(format!("configure socket: {e}")))?;
        }

        let transport = Self {
            rtp,
            rtcp,
            peer,
            max_packet_size: url.max_packet_size,
        };

        tracing::info!(
            peer = %peer,
            local_rtp_port = transport.local_rtp_port(),
            local_rtcp_port = transport.local_rtcp_port(),
            max_packet_size = transport.max_packet_size,
            "UDP transport opened"
        );

        Ok(transport)
    }

    /// Remote RTP address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_rtp_port(&self) -> u16 {
        self.rtp.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub fn local_rtcp_port(&self) -> u16 {
        self.rtcp.local_addr().map(|a| a.port()).unwrap_or(0)
    }
}

impl PacketSink for UdpTransport {
    fn write(&mut self, packet: &[u8]) -> io::Result<usize> {
        if is_rtcp(packet) {
            self.rtcp.send(packet)
        } else {
            self.rtp.send(packet)
        }
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

fn bind_connected(local: SocketAddr, peer: SocketAddr) -> Result<UdpSocket> {
    let socket =
        UdpSocket::bind(local).map_err(|e| Error::Transport(format!("bind {local}: {e}")))?;
    socket
        .connect(peer)
        .map_err(|e| Error::Transport(format!("connect {peer}: {e}")))?;
    Ok(socket)
}

fn configure(socket: &UdpSocket, peer: SocketAddr, url: &RtpUrl) -> io::Result<()> {
    if let Some(ttl) = url.ttl {
        match peer.ip() {
            IpAddr::V4(ip) if ip.is_multicast() => socket.set_multicast_ttl_v4(ttl)?,
            _ => socket.set_ttl(ttl)?,
        }
    }
    socket.set_write_timeout(url.write_timeout)
}
