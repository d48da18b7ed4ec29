//! Playback FIFO between the network RX thread and the device render
//! callback.
//!
//! A bounded ring of int16 samples behind a single mutex. The producer drops
//! the oldest audio on overflow (stale audio is worse than a glitch); the
//! consumer zero-fills whatever the ring cannot supply, so underrun comes out
//! as silence. Both critical sections are a bounded copy plus pointer
//! updates.

use std::sync::Mutex;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

pub struct PlaybackFifo {
    inner: Mutex<HeapRb<i16>>,
}

impl PlaybackFifo {
    /// `capacity` is in samples; one second of audio is the intended size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: Mutex::new(HeapRb::new(capacity)) }
    }

    /// Append samples, evicting the oldest if the ring is full.
    pub fn push(&self, samples: &[i16]) {
        if let Ok(mut rb) = self.inner.lock() {
            for &s in samples {
                rb.push_overwrite(s);
            }
        }
    }

    /// Move up to `out.len()` samples into `out`, zero-filling the deficit.
    /// Returns how many real samples were popped.
    pub fn pop(&self, out: &mut [i16]) -> usize {
        let mut got = 0;
        if let Ok(mut rb) = self.inner.lock() {
            while got < out.len() {
                match rb.try_pop() {
                    Some(s) => {
                        out[got] = s;
                        got += 1;
                    }
                    None => break,
                }
            }
        }
        out[got..].fill(0);
        got
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|rb| rb.occupied_len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let fifo = PlaybackFifo::with_capacity(16);
        fifo.push(&[1, 2, 3, 4]);
        fifo.push(&[5, 6]);

        let mut out = [0i16; 6];
        assert_eq!(fifo.pop(&mut out), 6);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn underrun_fills_silence() {
        let fifo = PlaybackFifo::with_capacity(16);
        fifo.push(&[7, 8]);

        let mut out = [99i16; 5];
        assert_eq!(fifo.pop(&mut out), 2);
        assert_eq!(out, [7, 8, 0, 0, 0]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let fifo = PlaybackFifo::with_capacity(4);
        fifo.push(&[1, 2, 3, 4]);
        fifo.push(&[5, 6]);

        let mut out = [0i16; 4];
        assert_eq!(fifo.pop(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn popped_never_exceeds_pushed() {
        let fifo = PlaybackFifo::with_capacity(64);
        let mut pushed = 0usize;
        let mut popped = 0usize;
        for round in 0..20 {
            let chunk: Vec<i16> = (0..round).map(|i| i as i16).collect();
            fifo.push(&chunk);
            pushed += chunk.len();

            let mut out = vec![0i16; 7];
            popped += fifo.pop(&mut out);
            assert!(popped <= pushed);
        }
    }
}
