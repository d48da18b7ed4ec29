//! Peer-to-peer voice link: a full-duplex audio pipeline over UDP datagrams.
//!
//! Capture path (pipeline thread): mic frame → echo canceller → noise
//! suppressor → Opus encode → slice into datagrams → send.
//! Receive path (RX thread): datagram → collector → Opus decode → playback
//! FIFO. Render path (device callback): FIFO pop → speaker, with the exact
//! played samples fed back to the echo canceller as its far-end reference.
//!
//! The transport is best-effort: lost or late fragments simply mean a frame
//! is never reassembled, and the playback FIFO papers over the gap with
//! silence.

pub mod audio;
pub mod config;
pub mod engine;
pub mod net;
