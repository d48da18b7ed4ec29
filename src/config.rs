//! Command-line configuration.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::{bail, Context, Result};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "voicelink", about = "Peer-to-peer voice link over UDP")]
pub struct Config {
    /// Peer IPv4 address ("localhost" is accepted)
    pub target_ip: String,

    /// UDP port the peer listens on
    #[arg(value_parser = clap::value_parser!(u16).range(1024..=65535))]
    pub send_port: u16,

    /// Local UDP port to receive voice on
    #[arg(value_parser = clap::value_parser!(u16).range(1024..=65535))]
    pub listen_port: u16,
}

/// Validated runtime addressing.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub target: SocketAddrV4,
    pub listen_port: u16,
}

impl Config {
    pub fn validate(&self) -> Result<RuntimeConfig> {
        if self.send_port == self.listen_port {
            bail!(
                "send port and listen port must differ (both are {})",
                self.send_port
            );
        }

        let ip: Ipv4Addr = if self.target_ip == "localhost" {
            Ipv4Addr::LOCALHOST
        } else {
            self.target_ip
                .parse()
                .with_context(|| format!("invalid IPv4 address: {}", self.target_ip))?
        };

        Ok(RuntimeConfig {
            target: SocketAddrV4::new(ip, self.send_port),
            listen_port: self.listen_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(std::iter::once("voicelink").chain(args.iter().copied()))
    }

    #[test]
    fn accepts_valid_arguments() {
        let cfg = parse(&["192.168.1.10", "9001", "9002"]).unwrap();
        let rt = cfg.validate().unwrap();
        assert_eq!(rt.target, "192.168.1.10:9001".parse().unwrap());
        assert_eq!(rt.listen_port, 9002);
    }

    #[test]
    fn resolves_localhost() {
        let cfg = parse(&["localhost", "9001", "9002"]).unwrap();
        let rt = cfg.validate().unwrap();
        assert_eq!(*rt.target.ip(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn rejects_equal_ports() {
        let cfg = parse(&["127.0.0.1", "9001", "9001"]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_privileged_ports() {
        let err = parse(&["127.0.0.1", "80", "9002"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_bad_ip() {
        let cfg = parse(&["not-an-ip", "9001", "9002"]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(parse(&["127.0.0.1", "9001"]).is_err());
    }
}
