//! Reassembler: received datagrams back into whole encoded frames.
//!
//! Fragments may arrive out of order, duplicated, or not at all. Each
//! in-flight frame keeps an index-ordered map of payloads; the frame is
//! emitted the moment every fragment is present. Incomplete frames are
//! discarded silently, either when the in-flight table overflows (oldest
//! first) or when they out-live the reorder window. The transport is lossy
//! by contract, so there is no retry.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use super::datagram;

#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// Maximum number of partially reassembled frames kept at once.
    pub max_inflight: usize,
    /// Reorder window; records older than this are dropped.
    pub stale_after: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { max_inflight: 64, stale_after: Duration::from_millis(500) }
    }
}

struct Record {
    fragment_count: u16,
    parts: BTreeMap<u16, Vec<u8>>,
    first_seen: Instant,
}

pub struct Collector {
    cfg: CollectorConfig,
    inflight: HashMap<u32, Record>,
}

impl Collector {
    pub fn new(cfg: CollectorConfig) -> Self {
        Self { cfg, inflight: HashMap::new() }
    }

    /// Feed one received datagram; `emit` is invoked with the reassembled
    /// frame when this fragment completes it. Malformed packets and
    /// fragments that contradict an existing record are dropped.
    pub fn collect<F: FnMut(Vec<u8>)>(&mut self, packet: &[u8], mut emit: F) {
        let Some((hdr, payload)) = datagram::parse(packet) else {
            return;
        };

        self.evict_stale();

        if !self.inflight.contains_key(&hdr.frame_id) {
            self.make_room();
            self.inflight.insert(
                hdr.frame_id,
                Record {
                    fragment_count: hdr.fragment_count,
                    parts: BTreeMap::new(),
                    first_seen: Instant::now(),
                },
            );
        }

        let complete = match self.inflight.get_mut(&hdr.frame_id) {
            Some(rec) if rec.fragment_count == hdr.fragment_count => {
                rec.parts.insert(hdr.fragment_index, payload.to_vec());
                rec.parts.len() == rec.fragment_count as usize
            }
            // A count that disagrees with the record is malformed.
            _ => false,
        };

        if complete {
            if let Some(rec) = self.inflight.remove(&hdr.frame_id) {
                let total: usize = rec.parts.values().map(Vec::len).sum();
                let mut frame = Vec::with_capacity(total);
                for part in rec.parts.values() {
                    frame.extend_from_slice(part);
                }
                emit(frame);
            }
        }
    }

    /// Number of partially reassembled frames currently held.
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    fn evict_stale(&mut self) {
        let stale_after = self.cfg.stale_after;
        self.inflight.retain(|_, rec| rec.first_seen.elapsed() < stale_after);
    }

    fn make_room(&mut self) {
        while self.inflight.len() >= self.cfg.max_inflight {
            let oldest = self
                .inflight
                .iter()
                .min_by_key(|(_, rec)| rec.first_seen)
                .map(|(&id, _)| id);
            match oldest {
                Some(id) => {
                    self.inflight.remove(&id);
                }
                None => break,
            }
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::datagram::MAX_DATAGRAM;
    use crate::net::slicer::Slicer;

    fn collect_all(collector: &mut Collector, packets: &[bytes::Bytes]) -> Vec<Vec<u8>> {
        let mut emitted = Vec::new();
        for p in packets {
            collector.collect(p, |frame| emitted.push(frame));
        }
        emitted
    }

    #[test]
    fn reassembles_in_reverse_order() {
        let mut slicer = Slicer::new();
        let encoded: Vec<u8> = (0..3000).map(|i| (i % 253) as u8).collect();
        let mut packets = slicer.slice(&encoded, MAX_DATAGRAM);
        assert!(packets.len() >= 3);
        packets.reverse();

        let mut collector = Collector::default();
        let emitted = collect_all(&mut collector, &packets);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0], encoded);
        assert_eq!(collector.inflight(), 0);
    }

    #[test]
    fn missing_fragment_means_no_emit() {
        let mut slicer = Slicer::new();
        let encoded = vec![0x5A; 3000];
        let mut packets = slicer.slice(&encoded, MAX_DATAGRAM);
        packets.remove(packets.len() / 2);

        let mut collector = Collector::default();
        let emitted = collect_all(&mut collector, &packets);
        assert!(emitted.is_empty());
        assert_eq!(collector.inflight(), 1);
    }

    #[test]
    fn duplicates_are_harmless() {
        let mut slicer = Slicer::new();
        let encoded = vec![0x11; 2500];
        let packets = slicer.slice(&encoded, MAX_DATAGRAM);

        // Duplicate every fragment before the frame completes.
        let mut with_dups = Vec::new();
        for p in &packets[..packets.len() - 1] {
            with_dups.push(p.clone());
            with_dups.push(p.clone());
        }
        with_dups.push(packets[packets.len() - 1].clone());

        let mut collector = Collector::default();
        let emitted = collect_all(&mut collector, &with_dups);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0], encoded);
    }

    #[test]
    fn stale_records_are_evicted() {
        let cfg = CollectorConfig {
            max_inflight: 64,
            stale_after: Duration::from_millis(20),
        };
        let mut collector = Collector::new(cfg);

        let mut slicer = Slicer::new();
        let mut incomplete = slicer.slice(&vec![1u8; 3000], MAX_DATAGRAM);
        incomplete.pop();
        let emitted = collect_all(&mut collector, &incomplete);
        assert!(emitted.is_empty());
        assert_eq!(collector.inflight(), 1);

        std::thread::sleep(Duration::from_millis(30));

        // Any later traffic flushes the stale record.
        let later = slicer.slice(&[9, 9, 9], MAX_DATAGRAM);
        let emitted = collect_all(&mut collector, &later);
        assert_eq!(emitted.len(), 1);
        assert_eq!(collector.inflight(), 0);
    }

    #[test]
    fn capacity_evicts_oldest_record() {
        let cfg = CollectorConfig { max_inflight: 2, stale_after: Duration::from_secs(60) };
        let mut collector = Collector::new(cfg);
        let mut slicer = Slicer::new();

        // Three incomplete frames; the first record must give way.
        for _ in 0..3 {
            let mut packets = slicer.slice(&vec![3u8; 3000], MAX_DATAGRAM);
            packets.pop();
            let emitted = collect_all(&mut collector, &packets);
            assert!(emitted.is_empty());
        }
        assert_eq!(collector.inflight(), 2);
    }

    #[test]
    fn interleaved_frames_both_complete() {
        let mut slicer = Slicer::new();
        let a_data: Vec<u8> = vec![0xA0; 2500];
        let b_data: Vec<u8> = vec![0xB0; 2500];
        let a = slicer.slice(&a_data, MAX_DATAGRAM);
        let b = slicer.slice(&b_data, MAX_DATAGRAM);

        let mut interleaved = Vec::new();
        for (pa, pb) in a.iter().zip(b.iter()) {
            interleaved.push(pb.clone());
            interleaved.push(pa.clone());
        }

        let mut collector = Collector::default();
        let emitted = collect_all(&mut collector, &interleaved);
        assert_eq!(emitted.len(), 2);
        assert!(emitted.contains(&a_data));
        assert!(emitted.contains(&b_data));
    }

    #[test]
    fn malformed_packets_are_ignored() {
        let mut collector = Collector::default();
        let mut emitted = 0;
        collector.collect(&[0u8; 4], |_| emitted += 1);
        collector.collect(&vec![0u8; MAX_DATAGRAM + 8], |_| emitted += 1);
        assert_eq!(emitted, 0);
        assert_eq!(collector.inflight(), 0);
    }
}
