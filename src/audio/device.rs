//! Full-duplex audio device binding.
//!
//! Opens the default input and output devices at the fixed pipeline rate and
//! hands the engine two callbacks: capture (mono int16 samples as they
//! arrive) and render (a mono int16 buffer to fill). Devices that only offer
//! f32 or multi-channel streams are adapted at this edge; the rest of the
//! pipeline only ever sees mono int16 at 48 kHz.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange,
};
use tracing::{info, warn};

use super::{CHANNELS, SAMPLE_RATE};

pub struct DuplexDevice {
    input: Stream,
    output: Stream,
}

// Safety: cpal::Stream is Send but not Sync on some platforms due to internal
// raw pointers. The streams are only created, paused and dropped from the
// engine's owning thread; the audio callbacks never touch the Stream handles.
unsafe impl Send for DuplexDevice {}
unsafe impl Sync for DuplexDevice {}

impl DuplexDevice {
    /// Open and start both directions. `on_capture` receives mono samples,
    /// `on_render` must fill the given mono buffer.
    pub fn start(
        on_capture: impl FnMut(&[i16]) + Send + 'static,
        on_render: impl FnMut(&mut [i16]) + Send + 'static,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let input_dev = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"))?;
        let output_dev = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;

        let in_ranges: Vec<_> = input_dev
            .supported_input_configs()
            .context("query input configs")?
            .collect();
        let out_ranges: Vec<_> = output_dev
            .supported_output_configs()
            .context("query output configs")?
            .collect();

        let (in_cfg, in_ch, in_fmt) = pick_config(&in_ranges)
            .ok_or_else(|| anyhow!("input device does not support {SAMPLE_RATE} Hz"))?;
        let (out_cfg, out_ch, out_fmt) = pick_config(&out_ranges)
            .ok_or_else(|| anyhow!("output device does not support {SAMPLE_RATE} Hz"))?;

        info!(
            input = %input_dev.name().unwrap_or_default(),
            output = %output_dev.name().unwrap_or_default(),
            in_ch, out_ch, "opening duplex audio"
        );

        let output = build_output(&output_dev, &out_cfg, out_ch, out_fmt, on_render)?;
        let input = build_input(&input_dev, &in_cfg, in_ch, in_fmt, on_capture)?;

        // Render first so the echo canceller has a reference before the
        // first processed capture frame.
        output.play().context("start output stream")?;
        input.play().context("start input stream")?;

        Ok(Self { input, output })
    }

    /// Pause both directions, draining any in-flight callback.
    pub fn stop(&self) {
        let _ = self.input.pause();
        let _ = self.output.pause();
    }
}

/// Prefer native i16 and a mono layout, fall back to f32 and whatever
/// channel count the device insists on. The sample rate is not negotiable.
fn pick_config(
    ranges: &[SupportedStreamConfigRange],
) -> Option<(StreamConfig, u16, SampleFormat)> {
    for fmt in [SampleFormat::I16, SampleFormat::F32] {
        let mut candidates: Vec<&SupportedStreamConfigRange> = ranges
            .iter()
            .filter(|r| {
                r.sample_format() == fmt
                    && r.min_sample_rate().0 <= SAMPLE_RATE
                    && r.max_sample_rate().0 >= SAMPLE_RATE
            })
            .collect();
        candidates.sort_by_key(|r| r.channels());

        let picked = candidates
            .iter()
            .find(|r| r.channels() == CHANNELS)
            .or(candidates.first());
        if let Some(r) = picked {
            let ch = r.channels();
            let cfg = StreamConfig {
                channels: ch,
                sample_rate: SampleRate(SAMPLE_RATE),
                buffer_size: BufferSize::Default,
            };
            return Some((cfg, ch, fmt));
        }
    }
    None
}

fn build_input(
    dev: &cpal::Device,
    cfg: &StreamConfig,
    channels: u16,
    fmt: SampleFormat,
    mut on_capture: impl FnMut(&[i16]) + Send + 'static,
) -> Result<Stream> {
    let err_fn = |err| warn!(error = %err, "input stream error");
    let ch = channels as usize;

    let stream = match fmt {
        SampleFormat::I16 => {
            let mut mono: Vec<i16> = Vec::with_capacity(4800);
            dev.build_input_stream(
                cfg,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if ch == 1 {
                        on_capture(data);
                        return;
                    }
                    mono.clear();
                    for frame in data.chunks(ch) {
                        if let Some(&s) = frame.first() {
                            mono.push(s);
                        }
                    }
                    on_capture(&mono);
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::F32 => {
            let mut mono: Vec<i16> = Vec::with_capacity(4800);
            dev.build_input_stream(
                cfg,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    mono.clear();
                    for frame in data.chunks(ch) {
                        if let Some(&s) = frame.first() {
                            mono.push((s * 32768.0).clamp(-32768.0, 32767.0) as i16);
                        }
                    }
                    on_capture(&mono);
                },
                err_fn,
                None,
            )?
        }
        other => return Err(anyhow!("unsupported input sample format {other:?}")),
    };
    Ok(stream)
}

fn build_output(
    dev: &cpal::Device,
    cfg: &StreamConfig,
    channels: u16,
    fmt: SampleFormat,
    mut on_render: impl FnMut(&mut [i16]) + Send + 'static,
) -> Result<Stream> {
    let err_fn = |err| warn!(error = %err, "output stream error");
    let ch = channels as usize;

    let stream = match fmt {
        SampleFormat::I16 => {
            let mut mono: Vec<i16> = Vec::with_capacity(4800);
            dev.build_output_stream(
                cfg,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if ch == 1 {
                        on_render(data);
                        return;
                    }
                    mono.resize(data.len() / ch, 0);
                    on_render(&mut mono);
                    for (frame, &s) in data.chunks_mut(ch).zip(mono.iter()) {
                        frame.fill(s);
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::F32 => {
            let mut mono: Vec<i16> = Vec::with_capacity(4800);
            dev.build_output_stream(
                cfg,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / ch, 0);
                    on_render(&mut mono);
                    for (frame, &s) in data.chunks_mut(ch).zip(mono.iter()) {
                        frame.fill(s as f32 / 32768.0);
                    }
                },
                err_fn,
                None,
            )?
        }
        other => return Err(anyhow!("unsupported output sample format {other:?}")),
    };
    Ok(stream)
}
