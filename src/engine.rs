//! Pipeline orchestrator.
//!
//! Owns every component and the threads that drive them:
//!
//! - the cpal capture callback pushes mono samples into a lock-free ring;
//! - the pipeline thread assembles 10 ms frames from that ring and runs
//!   AEC → NS → encode → slice → send;
//! - the RX thread blocks on the listen socket and runs
//!   collect → decode → playback FIFO;
//! - the cpal render callback drains the FIFO into the device and feeds the
//!   played samples back to the echo canceller as its far-end reference.
//!
//! The echo canceller is the only state shared between the render and
//! capture paths, and cpal delivers those on different threads, so it lives
//! behind a mutex. Everything else is single-owner.
//!
//! Shutdown stops the device first (draining in-flight callbacks), then
//! joins the worker threads in reverse start order.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{info, warn};

use crate::audio::codec::{VoiceDecoder, VoiceEncoder, MAX_DECODED_SAMPLES};
use crate::audio::device::DuplexDevice;
use crate::audio::dsp::aec::{AecConfig, EchoCanceller};
use crate::audio::dsp::ns::{NoiseSuppressor, NsConfig};
use crate::audio::dsp::CaptureChain;
use crate::audio::fifo::PlaybackFifo;
use crate::audio::{FRAME_SAMPLES, MAX_ENCODED_BYTES, SAMPLE_RATE};
use crate::config::RuntimeConfig;
use crate::net::collector::{Collector, CollectorConfig};
use crate::net::datagram::MAX_DATAGRAM;
use crate::net::slicer::Slicer;
use crate::net::udp::{bind_receiver, ErrorThrottle, VoiceSender};

/// Capture ring holds about one second of audio between the device callback
/// and the pipeline thread.
const CAPTURE_RING_FRAMES: usize = 100;

/// Pipeline poll interval while the capture ring is short of a frame.
const PIPELINE_IDLE: Duration = Duration::from_millis(2);

pub struct Engine {
    device: DuplexDevice,
    pipeline: Option<JoinHandle<()>>,
    rx: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    /// Construct every component and start the threads and streams. Any
    /// failure here is fatal to startup.
    pub fn start(cfg: &RuntimeConfig) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let fifo = Arc::new(PlaybackFifo::with_capacity(SAMPLE_RATE as usize));
        let aec = Arc::new(Mutex::new(EchoCanceller::new(AecConfig::default())));

        let chain = CaptureChain::new(aec.clone(), NoiseSuppressor::new(NsConfig::default()));
        let encoder = VoiceEncoder::new()?;
        let decoder = VoiceDecoder::new()?;
        let slicer = Slicer::new();
        let collector = Collector::new(CollectorConfig::default());
        let sender = VoiceSender::connect(cfg.target)?;
        let rx_socket = bind_receiver(cfg.listen_port)?;

        let rb = HeapRb::<i16>::new(FRAME_SAMPLES * CAPTURE_RING_FRAMES);
        let (mut capture_prod, capture_cons) = rb.split();

        let rx = {
            let fifo = fifo.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("voice-rx".into())
                .spawn(move || rx_loop(rx_socket, collector, decoder, fifo, shutdown))
                .context("spawn rx thread")?
        };

        let pipeline = {
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("voice-pipeline".into())
                .spawn(move || {
                    pipeline_loop(capture_cons, chain, encoder, slicer, sender, shutdown)
                })
                .context("spawn pipeline thread")?
        };

        let on_capture = move |samples: &[i16]| {
            for &s in samples {
                // A full ring means the pipeline thread is behind; dropping
                // the newest capture audio is the only non-blocking option.
                let _ = capture_prod.try_push(s);
            }
        };

        let render_fifo = fifo.clone();
        let render_aec = aec.clone();
        let on_render = move |out: &mut [i16]| {
            render_fifo.pop(out);
            // The reference must be exactly what the device will play,
            // including the zero-filled underrun tail.
            if let Ok(mut aec) = render_aec.lock() {
                aec.on_playback(out);
            }
        };

        let device = DuplexDevice::start(on_capture, on_render)?;

        info!(peer = %cfg.target, listen = cfg.listen_port, "voice engine started");

        Ok(Self { device, pipeline: Some(pipeline), rx: Some(rx), shutdown })
    }

    /// Ordered shutdown: device, then pipeline, then RX. Idempotent by
    /// construction since it consumes the engine.
    pub fn stop(mut self) -> Result<()> {
        self.device.stop();
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.pipeline.take() {
            handle.join().map_err(|_| anyhow!("pipeline thread panicked"))?;
        }
        if let Some(handle) = self.rx.take() {
            handle.join().map_err(|_| anyhow!("rx thread panicked"))?;
        }
        info!("voice engine stopped");
        Ok(())
    }
}

fn pipeline_loop(
    mut capture: HeapCons<i16>,
    mut chain: CaptureChain,
    mut encoder: VoiceEncoder,
    mut slicer: Slicer,
    mut sender: VoiceSender,
    shutdown: Arc<AtomicBool>,
) {
    let mut frame = [0i16; FRAME_SAMPLES];
    let mut encoded = vec![0u8; MAX_ENCODED_BYTES];
    let mut filled = 0usize;
    let mut encode_errors = ErrorThrottle::new();

    while !shutdown.load(Ordering::Relaxed) {
        while filled < FRAME_SAMPLES {
            match capture.try_pop() {
                Some(s) => {
                    frame[filled] = s;
                    filled += 1;
                }
                None => break,
            }
        }
        if filled < FRAME_SAMPLES {
            std::thread::sleep(PIPELINE_IDLE);
            continue;
        }
        filled = 0;

        chain.process(&mut frame);

        let n = match encoder.encode(&frame, &mut encoded) {
            Ok(n) => n,
            Err(e) => {
                if encode_errors.should_log() {
                    warn!(error = %e, "encode failed, frame dropped");
                }
                continue;
            }
        };
        if n == 0 {
            // DTX: nothing worth sending.
            continue;
        }

        for packet in slicer.slice(&encoded[..n], MAX_DATAGRAM) {
            sender.send(&packet);
        }
    }
}

fn rx_loop(
    socket: UdpSocket,
    mut collector: Collector,
    mut decoder: VoiceDecoder,
    fifo: Arc<PlaybackFifo>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 2048];
    let mut pcm = vec![0i16; MAX_DECODED_SAMPLES];
    let mut recv_errors = ErrorThrottle::new();
    let mut decode_errors = ErrorThrottle::new();

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, _peer)) => {
                collector.collect(&buf[..n], |frame| {
                    match decoder.decode(&frame, &mut pcm) {
                        Ok(samples) if samples > 0 => fifo.push(&pcm[..samples]),
                        Ok(_) => {}
                        Err(e) => {
                            if decode_errors.should_log() {
                                warn!(error = %e, "decode failed, frame dropped");
                            }
                        }
                    }
                });
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                // Receive timeout; loop around to observe the shutdown flag.
            }
            Err(e) => {
                if recv_errors.should_log() {
                    warn!(error = %e, "receive failed");
                }
            }
        }
    }
}
