//! Packetizer: encoded frames into sequenced datagrams.

use bytes::Bytes;

use super::datagram::{self, Header, HEADER_LEN};

pub struct Slicer {
    next_frame_id: u32,
}

impl Slicer {
    pub fn new() -> Self {
        Self { next_frame_id: 0 }
    }

    /// Partition `encoded` into fragments of at most `mtu` total bytes each.
    /// Concatenating the payloads in index order reproduces `encoded`
    /// exactly. An empty input yields no datagrams.
    pub fn slice(&mut self, encoded: &[u8], mtu: usize) -> Vec<Bytes> {
        debug_assert!(mtu > HEADER_LEN);
        if encoded.is_empty() || mtu <= HEADER_LEN {
            return Vec::new();
        }

        let payload_max = (mtu - HEADER_LEN).min(u16::MAX as usize);
        let count = encoded.len().div_ceil(payload_max);
        debug_assert!(count <= u16::MAX as usize);
        if count > u16::MAX as usize {
            return Vec::new();
        }

        let frame_id = self.next_frame_id;
        self.next_frame_id = self.next_frame_id.wrapping_add(1);

        encoded
            .chunks(payload_max)
            .enumerate()
            .map(|(i, chunk)| {
                let hdr = Header {
                    frame_id,
                    fragment_index: i as u16,
                    fragment_count: count as u16,
                    payload_len: chunk.len() as u16,
                };
                datagram::encode(&hdr, chunk)
            })
            .collect()
    }
}

impl Default for Slicer {
    fn default() -> Self {
        Self::new()
    }
}
