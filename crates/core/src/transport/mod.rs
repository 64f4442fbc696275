//! Delivery of wire frames to the network.
//!
//! A [`PacketSink`] is anything that can write one datagram at a time.
//! [`send_wire_frame`] unwraps a length-prefixed [`WireFrame`] and writes
//! each packet to the sink exactly once:
//!
//! - The whole frame is validated before the first write, so malformed
//!   framing sends nothing.
//! - Short writes are counted and never retried; the transport is
//!   best-effort and unreliable.
//! - Under [`SendPolicy::BestEffort`] failed writes are counted and
//!   skipped. [`SendPolicy::Strict`] turns them into errors.
//!
//! The concrete network sink is [`UdpTransport`].

pub mod udp;
pub mod url;

use std::io;

pub use udp::UdpTransport;
pub use url::{DEFAULT_MAX_PACKET_SIZE, RtpUrl};

use crate::error::{Error, ProtocolErrorKind, Result};
use crate::wire::WireFrame;

/// Datagram-oriented output.
pub trait PacketSink {
    /// Write one packet, returning how many bytes were accepted.
    fn write(&mut self, packet: &[u8]) -> io::Result<usize>;

    /// Largest packet the sink accepts.
    fn max_packet_size(&self) -> usize;
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn write(&mut self, packet: &[u8]) -> io::Result<usize> {
        (**self).write(packet)
    }

    fn max_packet_size(&self) -> usize {
        (**self).max_packet_size()
    }
}

/// How [`send_wire_frame`] treats short and failed writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendPolicy {
    /// Count them and keep going.
    #[default]
    BestEffort,
    /// Stop at the first one with [`Error::Transport`].
    Strict,
}

/// Outcome of sending one wire frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub packets: usize,
    pub bytes_requested: usize,
    pub bytes_sent: usize,
    /// Writes that accepted some but not all bytes.
    pub short_writes: usize,
    /// Writes that errored or accepted zero bytes.
    pub failed_writes: usize,
}

impl SendReport {
    /// Every packet was written in full.
    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.bytes_requested && self.short_writes == 0 && self.failed_writes == 0
    }
}

/// Cumulative delivery counters for a session.
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub frames: u64,
    pub packets: u64,
    pub bytes_requested: u64,
    pub bytes_sent: u64,
    pub short_writes: u64,
    pub failed_writes: u64,
}

impl TransportStats {
    pub fn record(&mut self, report: &SendReport) {
        self.frames += 1;
        self.packets += report.packets as u64;
        self.bytes_requested += report.bytes_requested as u64;
        self.bytes_sent += report.bytes_sent as u64;
        self.short_writes += report.short_writes as u64;
        self.failed_writes += report.failed_writes as u64;
    }

    /// Fraction of requested bytes that reached the socket.
    pub fn delivery_ratio(&self) -> f64 {
        if self.bytes_requested == 0 {
            return 1.0;
        }
        self.bytes_sent as f64 / self.bytes_requested as f64
    }

    /// Packets lost to short or failed writes.
    pub fn dropped_packets(&self) -> u64 {
        self.short_writes + self.failed_writes
    }
}

/// Write every packet of `frame` to `sink`.
pub fn send_wire_frame<S: PacketSink + ?Sized>(
    sink: &mut S,
    frame: &WireFrame,
    policy: SendPolicy,
) -> Result<SendReport> {
    let mut report = SendReport::default();
    validate_for(sink, frame)?;
    write_packets(sink, frame, policy, &mut report)?;
    Ok(report)
}

/// [`send_wire_frame`], adding what was written to `stats`.
///
/// Packets that reached the sink before a [`SendPolicy::Strict`] failure
/// are recorded before the error is returned. A frame rejected by
/// validation wrote nothing and is not recorded.
pub fn send_and_record<S: PacketSink + ?Sized>(
    sink: &mut S,
    frame: &WireFrame,
    policy: SendPolicy,
    stats: &mut TransportStats,
) -> Result<SendReport> {
    let mut report = SendReport::default();
    validate_for(sink, frame)?;
    let written = write_packets(sink, frame, policy, &mut report);
    stats.record(&report);
    written.map(|()| report)
}

fn validate_for<S: PacketSink + ?Sized>(sink: &S, frame: &WireFrame) -> Result<()> {
    let limit = sink.max_packet_size();
    for packet in frame.packets() {
        let packet = packet?;
        if packet.len() > limit {
            return Err(Error::Protocol(ProtocolErrorKind::PacketTooLarge(
                packet.len(),
            )));
        }
    }
    Ok(())
}

fn write_packets<S: PacketSink + ?Sized>(
    sink: &mut S,
    frame: &WireFrame,
    policy: SendPolicy,
    report: &mut SendReport,
) -> Result<()> {
    for packet in frame.packets() {
        let packet = packet?;
        report.packets += 1;
        report.bytes_requested += packet.len();

        match sink.write(packet) {
            Ok(n) if n == packet.len() => report.bytes_sent += n,
            Ok(0) => {
                report.failed_writes += 1;
                tracing::debug!(len = packet.len(), "sink accepted no bytes");
                if policy == SendPolicy::Strict {
                    return Err(Error::Transport(format!(
                        "sink accepted 0 of {} bytes",
                        packet.len()
                    )));
                }
            }
            Ok(n) => {
                report.short_writes += 1;
                report.bytes_sent += n;
                tracing::debug!(len = packet.len(), written = n, "short write");
                if policy == SendPolicy::Strict {
                    return Err(Error::Transport(format!(
                        "short write: {n} of {} bytes",
                        packet.len()
                    )));
                }
            }
            Err(e) => {
                report.failed_writes += 1;
                tracing::debug!(len = packet.len(), error = %e, "packet write failed");
                if policy == SendPolicy::Strict {
                    return Err(Error::Transport(format!("packet write failed: {e}")));
                }
            }
        }
    }

    tracing::trace!(
        packets = report.packets,
        bytes = report.bytes_sent,
        short = report.short_writes,
        failed = report.failed_writes,
        "wire frame sent"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records writes; behavior per call is scripted.
    #[derive(Default)]
    struct ScriptedSink {
        script: Vec<io::Result<usize>>,
        written: Vec<Vec<u8>>,
        calls: usize,
    }

    impl PacketSink for ScriptedSink {
        fn write(&mut self, packet: &[u8]) -> io::Result<usize> {
            let result = match self.script.get_mut(self.calls) {
                Some(r) => std::mem::replace(r, Ok(0)),
                None => Ok(packet.len()),
            };
            self.calls += 1;
            if let Ok(n) = &result {
                self.written.push(packet[..*n].to_vec());
            }
            result
        }

        fn max_packet_size(&self) -> usize {
            1472
        }
    }

    fn three_packets() -> WireFrame {
        let mut frame = WireFrame::new();
        frame.push(&[1; 10]).unwrap();
        frame.push(&[2; 20]).unwrap();
        frame.push(&[3; 30]).unwrap();
        frame
    }

    #[test]
    fn writes_each_packet_once() {
        let mut sink = ScriptedSink::default();
        let report = send_wire_frame(&mut sink, &three_packets(), SendPolicy::BestEffort).unwrap();
        assert_eq!(report.packets, 3);
        assert_eq!(report.bytes_requested, 60);
        assert_eq!(report.bytes_sent, 60);
        assert!(report.is_complete());
        assert_eq!(sink.written, vec![vec![1; 10], vec![2; 20], vec![3; 30]]);
    }

    #[test]
    fn short_write_is_not_retried() {
        let mut sink = ScriptedSink {
            script: vec![Ok(10), Ok(5)],
            ..Default::default()
        };
        let report = send_wire_frame(&mut sink, &three_packets(), SendPolicy::BestEffort).unwrap();
        assert_eq!(sink.calls, 3);
        assert_eq!(report.bytes_sent, 10 + 5 + 30);
        assert_eq!(report.short_writes, 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn failed_write_is_skipped_best_effort() {
        let mut sink = ScriptedSink {
            script: vec![Err(io::Error::other("boom")), Ok(0)],
            ..Default::default()
        };
        let report = send_wire_frame(&mut sink, &three_packets(), SendPolicy::BestEffort).unwrap();
        assert_eq!(report.failed_writes, 2);
        assert_eq!(report.bytes_sent, 30);
    }

    #[test]
    fn strict_policy_stops_on_short_write() {
        let mut sink = ScriptedSink {
            script: vec![Ok(10), Ok(5)],
            ..Default::default()
        };
        let err = send_wire_frame(&mut sink, &three_packets(), SendPolicy::Strict).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(sink.calls, 2);
    }

    #[test]
    fn malformed_frame_sends_nothing() {
        let mut bytes = three_packets().as_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 0xFF, 0xFF, 0xAA]);
        let frame = WireFrame::from_bytes(bytes);

        let mut sink = ScriptedSink::default();
        let err = send_wire_frame(&mut sink, &frame, SendPolicy::BestEffort).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolErrorKind::LengthOverrun { .. })
        ));
        assert_eq!(sink.calls, 0);
    }

    #[test]
    fn oversized_packet_is_rejected_before_sending() {
        let mut frame = three_packets();
        frame.push(&[0; 1473]).unwrap();
        let mut sink = ScriptedSink::default();
        assert!(matches!(
            send_wire_frame(&mut sink, &frame, SendPolicy::BestEffort),
            Err(Error::Protocol(ProtocolErrorKind::PacketTooLarge(1473)))
        ));
        assert_eq!(sink.calls, 0);
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = TransportStats::default();
        stats.record(&SendReport {
            packets: 3,
            bytes_requested: 100,
            bytes_sent: 80,
            short_writes: 1,
            failed_writes: 1,
        });
        stats.record(&SendReport {
            packets: 1,
            bytes_requested: 100,
            bytes_sent: 100,
            ..Default::default()
        });
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.packets, 4);
        assert_eq!(stats.dropped_packets(), 2);
        assert!((stats.delivery_ratio() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn strict_failure_still_records_delivered_packets() {
        let mut sink = ScriptedSink {
            script: vec![Ok(10), Ok(5)],
            ..Default::default()
        };
        let mut stats = TransportStats::default();
        let err = send_and_record(&mut sink, &three_packets(), SendPolicy::Strict, &mut stats)
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.packets, 2);
        assert_eq!(stats.bytes_requested, 30);
        assert_eq!(stats.bytes_sent, 15);
        assert_eq!(stats.short_writes, 1);
    }

    #[test]
    fn rejected_frame_is_not_recorded() {
        let mut frame = three_packets();
        frame.push(&[0; 1473]).unwrap();
        let mut sink = ScriptedSink::default();
        let mut stats = TransportStats::default();
        assert!(send_and_record(&mut sink, &frame, SendPolicy::Strict, &mut stats).is_err());
        assert_eq!(stats.frames, 0);
        assert_eq!(sink.calls, 0);
    }
}
