//! Frequency-domain noise suppression.
//!
//! STFT processor with Hann analysis and synthesis windows at 75 % overlap.
//! A short-term energy + zero-crossing VAD gates a running estimate of the
//! noise magnitude spectrum; each frame is attenuated per bin by a spectral
//! subtraction gain clamped to a -20 dB floor, then reconstructed by
//! overlap-add.
//!
//! The processor is streaming: any call length is accepted, one output
//! sample is produced per input sample, and the algorithmic delay is exactly
//! one frame regardless of content.

use std::collections::VecDeque;
use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

#[derive(Debug, Clone, Copy)]
pub struct NsConfig {
    /// STFT frame size (power of two).
    pub frame_size: usize,
    /// Over-subtraction factor (beta), 1.0..3.0.
    pub over_subtraction: f32,
    /// Maximum attenuation in dB; -20 dB gives a 0.1 gain floor.
    pub suppression_db: f32,
    /// VAD energy threshold on the windowed frame.
    pub energy_threshold: f32,
    /// VAD zero-crossing-rate threshold.
    pub zcr_threshold: f32,
}

impl Default for NsConfig {
    fn default() -> Self {
        Self {
            frame_size: 512,
            over_subtraction: 2.0,
            suppression_db: -20.0,
            energy_threshold: 0.005,
            zcr_threshold: 0.2,
        }
    }
}

/// Frames of VAD energy history used for the adaptive speech test.
const ENERGY_HISTORY: usize = 10;

/// Noise magnitude smoothing constant.
const ALPHA_NOISE: f32 = 0.98;

/// Squared-Hann windows at 75 % overlap sum to 3/2.
const COLA_SUM: f32 = 1.5;

pub struct NoiseSuppressor {
    frame_size: usize,
    hop: usize,
    window: Vec<f32>,
    over_subtraction: f32,
    gain_floor: f32,
    energy_threshold: f32,
    zcr_threshold: f32,

    // Streaming state.
    staging: Vec<f32>,
    staged: usize,
    analysis: Vec<f32>,
    ola: Vec<f32>,
    out_queue: VecDeque<f32>,

    // Transform state, allocated once.
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    time_buf: Vec<f32>,
    spectrum: Vec<Complex32>,
    synth_buf: Vec<f32>,
    scratch_fwd: Vec<Complex32>,
    scratch_inv: Vec<Complex32>,

    // Enhancement state.
    noise_spectrum: Vec<f32>,
    gain: Vec<f32>,
    energy_history: Vec<f32>,
    voice_active: bool,
}

impl NoiseSuppressor {
    pub fn new(cfg: NsConfig) -> Self {
        let frame_size = cfg.frame_size;
        let hop = frame_size / 4;
        let bins = frame_size / 2 + 1;

        let window: Vec<f32> = (0..frame_size)
            .map(|n| {
                let phase = 2.0 * std::f32::consts::PI * n as f32 / (frame_size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let ifft = planner.plan_fft_inverse(frame_size);
        let scratch_fwd = fft.make_scratch_vec();
        let scratch_inv = ifft.make_scratch_vec();

        // Seeding the output queue with one hop of silence fixes the
        // end-to-end delay at exactly one frame.
        let mut out_queue = VecDeque::with_capacity(2 * hop + 4);
        out_queue.extend(std::iter::repeat(0.0f32).take(hop));

        Self {
            frame_size,
            hop,
            window,
            over_subtraction: cfg.over_subtraction,
            gain_floor: 10.0f32.powf(cfg.suppression_db / 20.0),
            energy_threshold: cfg.energy_threshold,
            zcr_threshold: cfg.zcr_threshold,
            staging: vec![0.0; hop],
            staged: 0,
            analysis: vec![0.0; frame_size],
            ola: vec![0.0; frame_size],
            out_queue,
            fft,
            ifft,
            time_buf: vec![0.0; frame_size],
            spectrum: vec![Complex32::new(0.0, 0.0); bins],
            synth_buf: vec![0.0; frame_size],
            scratch_fwd,
            scratch_inv,
            noise_spectrum: vec![1e-6; bins],
            gain: vec![1.0; bins],
            energy_history: vec![0.0; ENERGY_HISTORY],
            voice_active: false,
        }
    }

    /// Restore the freshly constructed state.
    pub fn reset(&mut self) {
        self.staging.fill(0.0);
        self.staged = 0;
        self.analysis.fill(0.0);
        self.ola.fill(0.0);
        self.out_queue.clear();
        self.out_queue.extend(std::iter::repeat(0.0f32).take(self.hop));
        self.noise_spectrum.fill(1e-6);
        self.gain.fill(1.0);
        self.energy_history.fill(0.0);
        self.voice_active = false;
    }

    /// Whether the most recently analyzed frame was classified as speech.
    pub fn voice_active(&self) -> bool {
        self.voice_active
    }

    /// Suppress noise in a sample stream in place. Output length equals
    /// input length on every call.
    pub fn process(&mut self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            self.staging[self.staged] = *sample as f32 / 32768.0;
            self.staged += 1;
            if self.staged == self.hop {
                self.staged = 0;
                self.process_frame();
            }

            let out = self.out_queue.pop_front().unwrap_or(0.0);
            *sample = (out * 32768.0).clamp(-32768.0, 32767.0) as i16;
        }
    }

    fn process_frame(&mut self) {
        let frame = self.frame_size;
        let hop = self.hop;

        // Slide the analysis window and append the staged hop.
        self.analysis.copy_within(hop.., 0);
        self.analysis[frame - hop..].copy_from_slice(&self.staging);

        for i in 0..frame {
            self.time_buf[i] = self.analysis[i] * self.window[i];
        }

        self.voice_active = self.detect_voice();

        // Fixed-size buffers; the transform cannot fail.
        let _ = self
            .fft
            .process_with_scratch(&mut self.time_buf, &mut self.spectrum, &mut self.scratch_fwd);

        if !self.voice_active {
            for (n, x) in self.noise_spectrum.iter_mut().zip(self.spectrum.iter()) {
                *n = ALPHA_NOISE * *n + (1.0 - ALPHA_NOISE) * x.norm();
            }
        }

        let beta = self.over_subtraction;
        let floor = self.gain_floor;
        for k in 0..self.spectrum.len() {
            let mag = self.spectrum[k].norm();
            let g = if mag > 1e-12 {
                (1.0 - beta * self.noise_spectrum[k] / mag).clamp(floor, 1.0)
            } else {
                floor
            };
            self.gain[k] = g;
            self.spectrum[k] *= g;
        }

        // The real inverse transform requires purely real DC and Nyquist bins.
        self.spectrum[0].im = 0.0;
        if let Some(last) = self.spectrum.last_mut() {
            last.im = 0.0;
        }

        let _ = self
            .ifft
            .process_with_scratch(&mut self.spectrum, &mut self.synth_buf, &mut self.scratch_inv);

        // Synthesis window, overlap-add, emit one completed hop. The inverse
        // transform is unnormalized, hence the 1/frame factor.
        let scale = 1.0 / frame as f32;
        self.ola.copy_within(hop.., 0);
        self.ola[frame - hop..].fill(0.0);
        for i in 0..frame {
            self.ola[i] += self.synth_buf[i] * scale * self.window[i];
        }
        for i in 0..hop {
            self.out_queue.push_back(self.ola[i] / COLA_SUM);
        }
    }

    fn detect_voice(&mut self) -> bool {
        let frame = self.frame_size;
        let mut energy = 0.0f32;
        let mut crossings = 0u32;
        for i in 0..frame {
            let v = self.time_buf[i];
            energy += v * v;
            if i > 0 && (v >= 0.0) != (self.time_buf[i - 1] >= 0.0) {
                crossings += 1;
            }
        }
        energy /= frame as f32;
        let zcr = crossings as f32 / (frame - 1) as f32;

        self.energy_history.rotate_left(1);
        let last = self.energy_history.len() - 1;
        self.energy_history[last] = energy;
        let avg = self.energy_history.iter().sum::<f32>() / self.energy_history.len() as f32;

        energy > self.energy_threshold && energy > 1.5 * avg && zcr < self.zcr_threshold
    }
}
