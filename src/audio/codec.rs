//! Opus codec adapter.
//!
//! Encode and decode live on different threads, so they are separate types
//! around separate Opus contexts. The encoder is tuned for VoIP: 64 kbit/s
//! VBR with in-band FEC against the loss the transport is allowed to have.

use anyhow::{Context, Result};
use opus::{Application, Bitrate, Channels, Decoder, Encoder};
use tracing::debug;

use super::{FRAME_SAMPLES, SAMPLE_RATE};

/// Decode headroom: a burst after loss may span several 10 ms frames.
pub const MAX_DECODED_SAMPLES: usize = FRAME_SAMPLES * 6;

const STATS_EVERY_FRAMES: u64 = 1000;

pub struct VoiceEncoder {
    encoder: Encoder,
    frames: u64,
    bytes_out: u64,
}

impl VoiceEncoder {
    pub fn new() -> Result<Self> {
        let mut encoder = Encoder::new(SAMPLE_RATE, Channels::Mono, Application::Voip)
            .context("create Opus encoder")?;
        encoder.set_bitrate(Bitrate::Bits(64_000)).context("set bitrate")?;
        encoder.set_inband_fec(true).context("enable in-band FEC")?;
        encoder.set_packet_loss_perc(10).context("set expected loss")?;
        Ok(Self { encoder, frames: 0, bytes_out: 0 })
    }

    /// Encode one 480-sample frame. Returns the encoded length, which may be
    /// zero when the encoder deems the frame not worth sending.
    pub fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize> {
        let n = self.encoder.encode(pcm, out)?;

        self.frames += 1;
        self.bytes_out += n as u64;
        if self.frames % STATS_EVERY_FRAMES == 0 {
            debug!(
                frames = self.frames,
                avg_bytes = self.bytes_out / self.frames,
                "encode stats"
            );
        }
        Ok(n)
    }
}

pub struct VoiceDecoder {
    decoder: Decoder,
    frames: u64,
}

impl VoiceDecoder {
    pub fn new() -> Result<Self> {
        let decoder =
            Decoder::new(SAMPLE_RATE, Channels::Mono).context("create Opus decoder")?;
        Ok(Self { decoder, frames: 0 })
    }

    /// Decode one encoded frame into `pcm`, returning the sample count.
    /// `pcm` should offer [`MAX_DECODED_SAMPLES`] of room.
    pub fn decode(&mut self, data: &[u8], pcm: &mut [i16]) -> Result<usize> {
        let samples = self.decoder.decode(data, pcm, false)?;

        self.frames += 1;
        if self.frames % STATS_EVERY_FRAMES == 0 {
            debug!(frames = self.frames, "decode stats");
        }
        Ok(samples)
    }
}
