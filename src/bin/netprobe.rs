//! UDP connectivity probe.
//!
//! Sends sliced test frames to the peer and reassembles whatever arrives on
//! the listen port, so two hosts running this against each other can verify
//! their voice path (ports, firewalls, NAT) without touching audio
//! hardware.

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use rand::RngCore;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use voicelink::config::Config;
use voicelink::net::collector::{Collector, CollectorConfig};
use voicelink::net::datagram::MAX_DATAGRAM;
use voicelink::net::slicer::Slicer;
use voicelink::net::udp::{bind_receiver, VoiceSender};

#[derive(Parser, Debug)]
#[command(name = "netprobe", about = "Probe the voice UDP path without audio")]
struct Args {
    /// Peer IPv4 address ("localhost" is accepted)
    target_ip: String,

    /// UDP port the peer listens on
    #[arg(value_parser = clap::value_parser!(u16).range(1024..=65535))]
    send_port: u16,

    /// Local UDP port to receive on
    #[arg(value_parser = clap::value_parser!(u16).range(1024..=65535))]
    listen_port: u16,

    /// Number of test frames to send
    #[arg(long, default_value_t = 50)]
    frames: u32,

    /// Size of each test frame in bytes
    #[arg(long, default_value_t = 3000)]
    payload: usize,

    /// How long to keep listening after the last send
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,
}

#[derive(Default)]
struct Counters {
    sent_frames: u64,
    sent_datagrams: u64,
    recv_datagrams: u64,
    complete_frames: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();
    let cfg = Config {
        target_ip: args.target_ip.clone(),
        send_port: args.send_port,
        listen_port: args.listen_port,
    }
    .validate()?;

    let rx = bind_receiver(cfg.listen_port)?;
    // Short poll so draining between sends does not stall the send cadence.
    rx.set_read_timeout(Some(Duration::from_millis(5)))?;
    let mut tx = VoiceSender::connect(cfg.target)?;
    let mut slicer = Slicer::new();
    let mut collector = Collector::new(CollectorConfig::default());
    let mut counters = Counters::default();
    let mut rng = rand::thread_rng();

    info!(peer = %cfg.target, listen = cfg.listen_port, frames = args.frames, "probing");

    let mut payload = vec![0u8; args.payload.max(1)];
    for _ in 0..args.frames {
        rng.fill_bytes(&mut payload);
        counters.sent_frames += 1;
        for packet in slicer.slice(&payload, MAX_DATAGRAM) {
            counters.sent_datagrams += 1;
            tx.send(&packet);
        }
        drain(&rx, &mut collector, &mut counters);
        std::thread::sleep(Duration::from_millis(10));
    }

    let deadline = Instant::now() + Duration::from_millis(args.linger_ms);
    while Instant::now() < deadline {
        drain(&rx, &mut collector, &mut counters);
    }

    info!(
        sent_frames = counters.sent_frames,
        sent_datagrams = counters.sent_datagrams,
        recv_datagrams = counters.recv_datagrams,
        complete_frames = counters.complete_frames,
        "probe finished"
    );
    Ok(())
}

/// Pull everything currently queued on the socket through the collector.
fn drain(rx: &std::net::UdpSocket, collector: &mut Collector, counters: &mut Counters) {
    let mut buf = [0u8; 2048];
    loop {
        match rx.recv_from(&mut buf) {
            Ok((n, _)) => {
                counters.recv_datagrams += 1;
                let complete = &mut counters.complete_frames;
                collector.collect(&buf[..n], |_frame| *complete += 1);
            }
            Err(_) => return,
        }
    }
}
