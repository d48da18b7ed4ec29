//! Acoustic echo cancellation.
//!
//! A sample-by-sample Normalized Least Mean Squares (NLMS) adaptive filter.
//! `on_playback` records everything handed to the loudspeaker as the far-end
//! reference; `process` subtracts the filter's echo estimate from the
//! captured signal and adapts the taps toward the residual.
//!
//! Normalizing the step by the instantaneous reference power keeps the
//! adaptation stable across level changes, so the taps are never clamped.

/// NLMS parameters. The defaults cover a ~21 ms echo tail at 48 kHz.
#[derive(Debug, Clone, Copy)]
pub struct AecConfig {
    /// Number of filter taps.
    pub filter_len: usize,
    /// Adaptation step size (mu), 0.0..2.0 for stability.
    pub step_size: f32,
}

impl Default for AecConfig {
    fn default() -> Self {
        Self { filter_len: 1024, step_size: 0.2 }
    }
}

pub struct EchoCanceller {
    /// Adaptive filter taps, tap 0 pairing with the newest reference sample.
    weights: Vec<f32>,
    /// Far-end reference ring, samples normalized to [-1, 1].
    ref_buf: Vec<f32>,
    /// Next write position in `ref_buf`; the newest sample sits just behind it.
    ref_pos: usize,
    step_size: f32,
    epsilon: f32,
}

impl EchoCanceller {
    pub fn new(cfg: AecConfig) -> Self {
        Self {
            weights: vec![0.0; cfg.filter_len],
            ref_buf: vec![0.0; cfg.filter_len],
            ref_pos: 0,
            step_size: cfg.step_size,
            epsilon: 1e-6,
        }
    }

    /// Zero the taps and the reference history. Safe at any time, intended
    /// to be called between device ticks.
    pub fn reset(&mut self) {
        self.weights.fill(0.0);
        self.ref_buf.fill(0.0);
        self.ref_pos = 0;
    }

    /// Record far-end samples exactly as they were handed to the device.
    pub fn on_playback(&mut self, samples: &[i16]) {
        let len = self.ref_buf.len();
        for &s in samples {
            self.ref_buf[self.ref_pos] = s as f32 / 32768.0;
            self.ref_pos = (self.ref_pos + 1) % len;
        }
    }

    /// Subtract the estimated echo from a capture frame in place.
    pub fn process(&mut self, capture: &mut [i16]) {
        let len = self.weights.len();

        for sample in capture.iter_mut() {
            let mic = *sample as f32 / 32768.0;

            // Echo estimate and reference power in a single pass. Index 0 of
            // the logical reference view is the newest sample.
            let mut echo = 0.0f32;
            let mut power = 0.0f32;
            for k in 0..len {
                let idx = (self.ref_pos + len - 1 - k) % len;
                let x = self.ref_buf[idx];
                echo += self.weights[k] * x;
                power += x * x;
            }

            let err = mic - echo;

            if power > 0.0 {
                let step = self.step_size / (self.epsilon + power) * err;
                for k in 0..len {
                    let idx = (self.ref_pos + len - 1 - k) % len;
                    self.weights[k] += step * self.ref_buf[idx];
                }
            }

            *sample = (err * 32768.0).clamp(-32768.0, 32767.0) as i16;
        }

        // A non-finite tap means the state is unrecoverable; start over.
        if self.weights.iter().any(|w| !w.is_finite()) {
            self.reset();
        }
    }
}
