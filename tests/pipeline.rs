//! End-to-end pipeline scenarios, no audio hardware or network required.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use voicelink::audio::codec::{VoiceDecoder, VoiceEncoder, MAX_DECODED_SAMPLES};
use voicelink::audio::dsp::aec::{AecConfig, EchoCanceller};
use voicelink::audio::dsp::ns::{NoiseSuppressor, NsConfig};
use voicelink::audio::dsp::CaptureChain;
use voicelink::audio::fifo::PlaybackFifo;
use voicelink::audio::{FRAME_SAMPLES, MAX_ENCODED_BYTES, SAMPLE_RATE};
use voicelink::net::collector::Collector;
use voicelink::net::datagram::MAX_DATAGRAM;
use voicelink::net::slicer::Slicer;

#[test]
fn shuffled_fragments_reassemble_exactly() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut slicer = Slicer::new();
    let mut collector = Collector::default();

    for _ in 0..20 {
        let len = rng.gen_range(1..=4000);
        let mut frame = vec![0u8; len];
        rng.fill(&mut frame[..]);

        let mut packets = slicer.slice(&frame, MAX_DATAGRAM);
        packets.shuffle(&mut rng);

        let mut emitted = Vec::new();
        for p in &packets {
            collector.collect(p, |f| emitted.push(f));
        }
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0], frame);
    }
}

#[test]
fn losing_a_fragment_loses_only_that_frame() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut slicer = Slicer::new();
    let mut collector = Collector::default();

    let mut lossy = vec![0u8; 3000];
    rng.fill(&mut lossy[..]);
    let mut intact = vec![0u8; 3000];
    rng.fill(&mut intact[..]);

    let mut lossy_packets = slicer.slice(&lossy, MAX_DATAGRAM);
    lossy_packets.remove(1);
    let intact_packets = slicer.slice(&intact, MAX_DATAGRAM);

    let mut emitted = Vec::new();
    for p in lossy_packets.iter().chain(intact_packets.iter()) {
        collector.collect(p, |f| emitted.push(f));
    }

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0], intact);
}

/// Speech-like test signal: a harmonic stack in short bursts with silent
/// gaps, shaped by a short attack/release ramp.
fn burst_signal(total: usize) -> Vec<i16> {
    let rate = SAMPLE_RATE as f32;
    let burst = (0.2 * rate) as usize;
    let period = (0.4 * rate) as usize;
    let ramp = (0.01 * rate) as usize;

    (0..total)
        .map(|i| {
            let phase = i % period;
            if phase >= burst {
                return 0i16;
            }
            let env = if phase < ramp {
                phase as f32 / ramp as f32
            } else if phase > burst - ramp {
                (burst - phase) as f32 / ramp as f32
            } else {
                1.0
            };
            let t = i as f32 / rate;
            let tau = 2.0 * std::f32::consts::PI * t;
            let v = 0.22 * (tau * 220.0).sin()
                + 0.10 * (tau * 440.0).sin()
                + 0.05 * (tau * 880.0).sin();
            (env * v * 32767.0) as i16
        })
        .collect()
}

fn normalized_correlation(x: &[f32], y: &[f32], lag: usize, span: usize) -> f64 {
    let mut xy = 0.0f64;
    let mut xx = 0.0f64;
    let mut yy = 0.0f64;
    for i in 0..span {
        let a = x[i] as f64;
        let b = y[i + lag] as f64;
        xy += a * b;
        xx += a * a;
        yy += b * b;
    }
    if xx <= 0.0 || yy <= 0.0 {
        return 0.0;
    }
    xy / (xx * yy).sqrt()
}

/// Loopback through the whole software pipeline: DSP chain, Opus, slicing,
/// out-of-order delivery, reassembly, decode, playback FIFO. The output must
/// be a recognizable copy of the input, delayed by at most 60 ms.
#[test]
fn full_duplex_loopback_preserves_the_signal() {
    let signal = burst_signal(57_600); // 1.2 s, a whole number of frames

    let aec = std::sync::Arc::new(std::sync::Mutex::new(EchoCanceller::new(
        AecConfig::default(),
    )));
    let mut chain = CaptureChain::new(aec, NoiseSuppressor::new(NsConfig::default()));
    let mut encoder = VoiceEncoder::new().unwrap();
    let mut decoder = VoiceDecoder::new().unwrap();
    let mut slicer = Slicer::new();
    let mut collector = Collector::default();
    let fifo = PlaybackFifo::with_capacity(SAMPLE_RATE as usize * 2);

    let mut encoded = vec![0u8; MAX_ENCODED_BYTES];
    let mut pcm = vec![0i16; MAX_DECODED_SAMPLES];
    let mut frame = [0i16; FRAME_SAMPLES];

    for chunk in signal.chunks(FRAME_SAMPLES) {
        frame.copy_from_slice(chunk);
        chain.process(&mut frame);

        let n = encoder.encode(&frame, &mut encoded).unwrap();
        if n == 0 {
            continue;
        }

        // Deliver each frame's fragments in reverse order.
        let mut packets = slicer.slice(&encoded[..n], MAX_DATAGRAM);
        packets.reverse();
        for p in &packets {
            collector.collect(p, |f| {
                let samples = decoder.decode(&f, &mut pcm).unwrap();
                fifo.push(&pcm[..samples]);
            });
        }
    }

    let mut out = vec![0i16; signal.len()];
    let got = fifo.pop(&mut out);
    assert_eq!(got, signal.len(), "loopback dropped audio");

    let x: Vec<f32> = signal.iter().map(|&s| s as f32 / 32768.0).collect();
    let y: Vec<f32> = out.iter().map(|&s| s as f32 / 32768.0).collect();

    // Search for the pipeline delay within the 60 ms bound.
    let max_lag = (SAMPLE_RATE as usize * 60) / 1000;
    let span = 24_000usize;
    let mut best_corr = 0.0f64;
    let mut best_lag = 0usize;
    for lag in 0..max_lag {
        let c = normalized_correlation(&x, &y, lag, span);
        if c > best_corr {
            best_corr = c;
            best_lag = lag;
        }
    }

    assert!(
        best_corr > 0.45,
        "loopback correlation too low: {best_corr:.3} at lag {best_lag}"
    );
    assert!(best_lag < max_lag, "delay {best_lag} exceeds 60 ms");
}
