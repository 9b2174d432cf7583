//! Hands out a received bulk IN packet in pieces.
//!
//! A host adapter reads whole packets from the chip, but the caller may ask
//! for fewer bytes than a packet holds. The payload that does not fit is kept
//! and returned by later reads, each piece behind a copy of the packet's
//! status prefix so it still looks like a transfer from the chip.

use bytes::Bytes;

use crate::protocol::STATUS_PREFIX_LEN;

#[derive(Debug, Default)]
pub(crate) struct PacketSplitter {
    prefix: [u8; STATUS_PREFIX_LEN],
    payload: Bytes,
}

impl PacketSplitter {
    /// Payload bytes waiting for a later read.
    pub fn pending(&self) -> usize {
        self.payload.len()
    }

    /// Take in a freshly received packet and copy its first piece to `buf`.
    ///
    /// Any payload left over from the previous packet is discarded, so only
    /// call this once [`pending`](Self::pending) is zero.
    pub fn accept(&mut self, packet: &[u8], buf: &mut [u8]) -> usize {
        if packet.len() <= STATUS_PREFIX_LEN {
            let n = packet.len().min(buf.len());
            buf[..n].copy_from_slice(&packet[..n]);
            self.payload = Bytes::new();
            return n;
        }

        self.prefix.copy_from_slice(&packet[..STATUS_PREFIX_LEN]);
        self.payload = Bytes::copy_from_slice(&packet[STATUS_PREFIX_LEN..]);
        self.take(buf)
    }

    /// Copy the status prefix and as much pending payload as fits into `buf`.
    ///
    /// Returns 0 when nothing is pending or `buf` cannot hold more than the
    /// prefix.
    pub fn take(&mut self, buf: &mut [u8]) -> usize {
        if self.payload.is_empty() || buf.len() <= STATUS_PREFIX_LEN {
            return 0;
        }

        let room = buf.len() - STATUS_PREFIX_LEN;
        let piece = self.payload.split_to(room.min(self.payload.len()));
        buf[..STATUS_PREFIX_LEN].copy_from_slice(&self.prefix);
        buf[STATUS_PREFIX_LEN..STATUS_PREFIX_LEN + piece.len()].copy_from_slice(&piece);
        STATUS_PREFIX_LEN + piece.len()
    }
}
