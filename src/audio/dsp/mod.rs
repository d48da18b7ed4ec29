//! Capture-path DSP: echo cancellation followed by noise suppression.
//!
//! The echo canceller is shared with the render path (which feeds it the
//! far-end reference), so it lives behind a mutex; the suppressor is owned
//! exclusively by the pipeline thread.

pub mod aec;
pub mod ns;

use std::sync::{Arc, Mutex};

use aec::EchoCanceller;
use ns::NoiseSuppressor;

pub struct CaptureChain {
    aec: Arc<Mutex<EchoCanceller>>,
    ns: NoiseSuppressor,
}

impl CaptureChain {
    pub fn new(aec: Arc<Mutex<EchoCanceller>>, ns: NoiseSuppressor) -> Self {
        Self { aec, ns }
    }

    /// Run one capture frame through AEC then NS, in place.
    pub fn process(&mut self, frame: &mut [i16]) {
        if let Ok(mut aec) = self.aec.lock() {
            aec.process(frame);
        }
        self.ns.process(frame);
    }

    /// Whether the suppressor classified the most recent frame as speech.
    pub fn voice_active(&self) -> bool {
        self.ns.voice_active()
    }
}
