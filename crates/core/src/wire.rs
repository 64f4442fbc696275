//! Length-prefixed packet stream.
//!
//! The muxer writes every RTP/RTCP packet of a frame into one contiguous
//! buffer, each prefixed with its length:
//!
//! ```text
//! +----------------+------------------+----------------+-----
//! | len (u32, BE)  | packet (len B)   | len (u32, BE)  | ...
//! +----------------+------------------+----------------+-----
//! ```
//!
//! The transport walks the records back out with [`WireFrame::packets`].

use crate::error::{Error, ProtocolErrorKind, Result};

/// Size of the big-endian length prefix in front of each packet.
pub const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WireFrame {
    buf: Vec<u8>,
}

impl WireFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    /// Wrap bytes produced elsewhere. The records are not checked until
    /// they are walked or [`validate`](Self::validate)d.
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Drop all records, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append one packet.
    pub fn push(&mut self, packet: &[u8]) -> Result<()> {
        self.push_parts(&[packet])
    }

    /// Append one packet assembled from several slices (header, payload
    /// header, payload) without an intermediate copy.
    pub fn push_parts(&mut self, parts: &[&[u8]]) -> Result<()> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let prefix = u32::try_from(len)
            .map_err(|_| Error::Protocol(ProtocolErrorKind::PacketTooLarge(len)))?;

        self.buf.reserve(LENGTH_PREFIX + len);
        self.buf.extend_from_slice(&prefix.to_be_bytes());
        for part in parts {
            self.buf.extend_from_slice(part);
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total encoded size, prefixes included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Iterate over the packet payloads.
    pub fn packets(&self) -> SubPackets<'_> {
        SubPackets {
            data: &self.buf,
            offset: 0,
        }
    }

    /// Walk every record without yielding it, returning the packet count.
    pub fn validate(&self) -> Result<usize> {
        self.packets().try_fold(0usize, |n, p| p.map(|_| n + 1))
    }
}

/// Iterator over the records of a [`WireFrame`].
///
/// Yields a [`ProtocolErrorKind`] error once and then stops if a prefix is
/// cut short or declares more bytes than remain.
#[derive(Debug, Clone)]
pub struct SubPackets<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for SubPackets<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.offset;
        if remaining == 0 {
            return None;
        }

        let offset = self.offset;
        if remaining < LENGTH_PREFIX {
            self.offset = self.data.len();
            return Some(Err(Error::Protocol(ProtocolErrorKind::TruncatedPrefix {
                offset,
                remaining,
            })));
        }

        let prefix = &self.data[offset..offset + LENGTH_PREFIX];
        let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let available = remaining - LENGTH_PREFIX;
        if declared > available {
            self.offset = self.data.len();
            return Some(Err(Error::Protocol(ProtocolErrorKind::LengthOverrun {
                offset,
                declared,
                available,
            })));
        }

        let start = offset + LENGTH_PREFIX;
        self.offset = start + declared;
        Some(Ok(&self.data[start..start + declared]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_prefixed_big_endian() {
        let mut frame = WireFrame::new();
        frame.push(&[0xAA; 3]).unwrap();
        frame.push_parts(&[&[1, 2], &[3]]).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0, 0, 0, 3, 0xAA, 0xAA, 0xAA, 0, 0, 0, 3, 1, 2, 3]
        );
        assert_eq!(frame.len(), 14);
    }

    #[test]
    fn packets_yield_payloads_in_order() {
        let mut frame = WireFrame::new();
        frame.push(&[1]).unwrap();
        frame.push(&[]).unwrap();
        frame.push(&[2, 3]).unwrap();
        let got: Vec<&[u8]> = frame.packets().map(|p| p.unwrap()).collect();
        assert_eq!(got, vec![&[1u8][..], &[][..], &[2, 3][..]]);
        assert_eq!(frame.validate().unwrap(), 3);
    }

    #[test]
    fn overrun_is_reported_with_offset() {
        // Declares 0xFFFF bytes but only two follow.
        let frame = WireFrame::from_bytes(vec![0, 0, 0, 1, 9, 0x00, 0x00, 0xFF, 0xFF, 1, 2]);
        let mut it = frame.packets();
        assert_eq!(it.next().unwrap().unwrap(), &[9]);
        let err = it.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolErrorKind::LengthOverrun {
                offset: 5,
                declared: 0xFFFF,
                available: 2
            })
        ));
        assert!(it.next().is_none());
    }

    #[test]
    fn truncated_prefix_is_reported() {
        let frame = WireFrame::from_bytes(vec![0, 0, 0, 0, 0, 0]);
        let err = frame.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolErrorKind::TruncatedPrefix {
                offset: 4,
                remaining: 2
            })
        ));
    }

    #[test]
    fn clear_keeps_nothing() {
        let mut frame = WireFrame::with_capacity(64);
        frame.push(&[1, 2, 3]).unwrap();
        frame.clear();
        assert!(frame.is_empty());
        assert_eq!(frame.validate().unwrap(), 0);
    }
}
