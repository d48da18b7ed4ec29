//! Audio pipeline components and the fixed stream format.

pub mod codec;
pub mod device;
pub mod dsp;
pub mod fifo;

/// Sample rate both endpoints run at. There is no resampling anywhere in the
/// pipeline, so this must match on both sides.
pub const SAMPLE_RATE: u32 = 48_000;

/// Mono everywhere; multi-channel devices are downmixed at the edge.
pub const CHANNELS: u16 = 1;

/// One pipeline tick is 10 ms of audio.
pub const FRAME_MS: u32 = 10;

/// Samples per pipeline tick (480 at 48 kHz).
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 1000) * FRAME_MS as usize;

/// Upper bound for a single encoded frame.
pub const MAX_ENCODED_BYTES: usize = 4000;
