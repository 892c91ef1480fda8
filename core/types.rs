// Core types shared by the client, transport and server crates
use crate::error::InvalidTarget;
use std::fmt;
use std::str::FromStr;

/// Peer to connect to: a host (IPv4 literal or domain name) and a TCP port.
///
/// Built once per request and never mutated. Construction only rejects
/// values that can never be connected to (empty host, port 0); syntactic
/// host checks belong to the caller, see [`crate::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionTarget {
    host: String,
    port: u16,
}

impl ConnectionTarget {
    pub fn new(host: &str, port: u16) -> Result<Self, InvalidTarget> {
        let host = host.trim();
        if host.is_empty() {
            return Err(InvalidTarget::EmptyHost);
        }
        if port == 0 {
            return Err(InvalidTarget::PortOutOfRange(0));
        }
        Ok(ConnectionTarget {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Accepts "host:port"; the port is split off at the last colon
impl FromStr for ConnectionTarget {
    type Err = InvalidTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| InvalidTarget::MissingPort(s.to_string()))?;
        let port: u32 = port
            .parse()
            .map_err(|_| InvalidTarget::BadPort(port.to_string()))?;
        if port == 0 || port > u16::MAX as u32 {
            return Err(InvalidTarget::PortOutOfRange(port));
        }
        ConnectionTarget::new(host, port as u16)
    }
}

// How received bytes are turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Invalid UTF-8 sequences become U+FFFD
    #[default]
    Lossy,
    /// Invalid UTF-8 fails the request with an encoding error
    Strict,
}

// Phase of a request in which a transport failure or timeout happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Write,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Connect => write!(f, "connecting"),
            Stage::Write => write!(f, "writing request"),
            Stage::Read => write!(f, "reading response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_host() {
        let target = ConnectionTarget::new("  example.com ", 80).unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 80);
        assert_eq!(target.to_string(), "example.com:80");
    }

    #[test]
    fn new_rejects_empty_host_and_zero_port() {
        assert_eq!(ConnectionTarget::new("", 80), Err(InvalidTarget::EmptyHost));
        assert_eq!(ConnectionTarget::new("   ", 80), Err(InvalidTarget::EmptyHost));
        assert_eq!(
            ConnectionTarget::new("127.0.0.1", 0),
            Err(InvalidTarget::PortOutOfRange(0))
        );
    }

    #[test]
    fn parse_host_port() {
        let target: ConnectionTarget = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(target.host(), "127.0.0.1");
        assert_eq!(target.port(), 9000);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "localhost".parse::<ConnectionTarget>(),
            Err(InvalidTarget::MissingPort("localhost".to_string()))
        );
        assert_eq!(
            "localhost:http".parse::<ConnectionTarget>(),
            Err(InvalidTarget::BadPort("http".to_string()))
        );
        assert_eq!(
            "localhost:70000".parse::<ConnectionTarget>(),
            Err(InvalidTarget::PortOutOfRange(70000))
        );
        assert_eq!(
            ":80".parse::<ConnectionTarget>(),
            Err(InvalidTarget::EmptyHost)
        );
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Read.to_string(), "reading response");
    }
}
