//! Voice datagram wire format.
//!
//! Every packet carries one fragment of one encoded frame. Integers are
//! big-endian:
//!
//!   offset  size  field
//!   0       4     frame_id         (u32, wraps)
//!   4       2     fragment_index   (u16, 0-based)
//!   6       2     fragment_count   (u16, >= 1)
//!   8       2     payload_len      (u16)
//!   10      ...   payload bytes
//!
//! There is no checksum beyond UDP's and no authentication; anything that
//! fails validation is dropped by the caller.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Hard upper bound for a packet on the wire.
pub const MAX_DATAGRAM: usize = 1200;

pub const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub frame_id: u32,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub payload_len: u16,
}

pub fn encode(hdr: &Header, payload: &[u8]) -> Bytes {
    let mut b = BytesMut::with_capacity(HEADER_LEN + payload.len());
    b.put_u32(hdr.frame_id);
    b.put_u16(hdr.fragment_index);
    b.put_u16(hdr.fragment_count);
    b.put_u16(hdr.payload_len);
    b.extend_from_slice(payload);
    b.freeze()
}

/// Parse and validate a received packet. Returns `None` for anything
/// malformed: short buffer, oversized packet, zero fragment count, index out
/// of range, or a payload length that disagrees with the buffer.
pub fn parse(buf: &[u8]) -> Option<(Header, &[u8])> {
    if buf.len() < HEADER_LEN || buf.len() > MAX_DATAGRAM {
        return None;
    }

    let mut b = buf;
    let hdr = Header {
        frame_id: b.get_u32(),
        fragment_index: b.get_u16(),
        fragment_count: b.get_u16(),
        payload_len: b.get_u16(),
    };

    if hdr.fragment_count == 0 || hdr.fragment_index >= hdr.fragment_count {
        return None;
    }
    let payload = &buf[HEADER_LEN..];
    if payload.len() != hdr.payload_len as usize {
        return None;
    }
    Some((hdr, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let hdr = Header {
            frame_id: 0xDEAD_BEEF,
            fragment_index: 2,
            fragment_count: 5,
            payload_len: 3,
        };
        let wire = encode(&hdr, &[1, 2, 3]);
        let (parsed, payload) = parse(&wire).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(parse(&[0u8; 9]).is_none());
    }

    #[test]
    fn rejects_zero_fragment_count() {
        let hdr = Header { frame_id: 1, fragment_index: 0, fragment_count: 0, payload_len: 1 };
        let wire = encode(&hdr, &[9]);
        assert!(parse(&wire).is_none());
    }

    #[test]
    fn rejects_index_out_of_range() {
        let hdr = Header { frame_id: 1, fragment_index: 3, fragment_count: 3, payload_len: 1 };
        let wire = encode(&hdr, &[9]);
        assert!(parse(&wire).is_none());
    }

    #[test]
    fn rejects_length_mismatch() {
        let hdr = Header { frame_id: 1, fragment_index: 0, fragment_count: 1, payload_len: 7 };
        let wire = encode(&hdr, &[1, 2, 3]);
        assert!(parse(&wire).is_none());
    }

    #[test]
    fn rejects_oversized_packet() {
        let big = vec![0u8; MAX_DATAGRAM + 1];
        assert!(parse(&big).is_none());
    }
}
