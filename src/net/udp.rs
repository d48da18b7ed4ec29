//! UDP transport: a connected sender socket and a bound receiver socket.
//!
//! The sender binds an ephemeral port and connects to the peer's listen
//! address; the receiver binds the local listen port. Transient socket
//! errors are expected on a best-effort link and are logged at a heavy
//! throttle rather than per packet.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// How often the receive loop wakes up to observe the shutdown flag.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Log the first error, then every Nth.
const LOG_EVERY: u64 = 100;

pub struct ErrorThrottle {
    count: u64,
}

impl ErrorThrottle {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn should_log(&mut self) -> bool {
        let log = self.count % LOG_EVERY == 0;
        self.count += 1;
        log
    }
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct VoiceSender {
    sock: UdpSocket,
    errors: ErrorThrottle,
}

impl VoiceSender {
    pub fn connect(target: SocketAddrV4) -> Result<Self> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).context("bind send socket")?;
        sock.connect(target)
            .with_context(|| format!("connect send socket to {target}"))?;
        Ok(Self { sock, errors: ErrorThrottle::new() })
    }

    /// Fire-and-forget send; failures are throttled log lines, never fatal.
    pub fn send(&mut self, datagram: &[u8]) {
        if let Err(e) = self.sock.send(datagram) {
            if self.errors.should_log() {
                warn!(error = %e, "voice send failed");
            }
        }
    }
}

/// Bind the receive socket with a read timeout so the RX loop can observe
/// shutdown without an out-of-band wakeup.
pub fn bind_receiver(listen_port: u16) -> Result<UdpSocket> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, listen_port))
        .with_context(|| format!("bind listen port {listen_port}"))?;
    sock.set_read_timeout(Some(RECV_TIMEOUT))
        .context("set receive timeout")?;
    Ok(sock)
}
