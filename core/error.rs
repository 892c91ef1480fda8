//! Error taxonomy for a single request attempt

use crate::types::Stage;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::string::FromUtf8Error;
use std::time::Duration;
use thiserror::Error;

/// Result of one `send` call: the response text, or a classified failure.
pub type RequestOutcome = Result<String, RequestError>;

/// Errors a request can end with. None of them are retried internally.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Host name did not resolve, or resolved to no addresses
    #[error("cannot resolve host '{host}': {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Peer refused the connection, was unreachable, or failed the TLS handshake
    #[error("cannot connect to {addr}: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Connection could not be set up or broke after it was established
    #[error("transport failure while {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    /// Deadline elapsed before anything useful happened
    #[error("timed out after {}ms while {}", .after.as_millis(), .stage)]
    Timeout { stage: Stage, after: Duration },

    /// Response was not valid UTF-8 (strict decoding only)
    #[error("response is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),

    /// Host/port pair could not form a target at all
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] InvalidTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Connection,
    Transport,
    Timeout,
    Encoding,
    InvalidTarget,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Resolution => write!(f, "ResolutionError"),
            ErrorKind::Connection => write!(f, "ConnectionError"),
            ErrorKind::Transport => write!(f, "TransportError"),
            ErrorKind::Timeout => write!(f, "TimeoutError"),
            ErrorKind::Encoding => write!(f, "EncodingError"),
            ErrorKind::InvalidTarget => write!(f, "InvalidTarget"),
        }
    }
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Resolution { .. } => ErrorKind::Resolution,
            RequestError::Connection { .. } => ErrorKind::Connection,
            RequestError::Transport { .. } => ErrorKind::Transport,
            RequestError::Timeout { .. } => ErrorKind::Timeout,
            RequestError::Encoding(_) => ErrorKind::Encoding,
            RequestError::InvalidTarget(_) => ErrorKind::InvalidTarget,
        }
    }

    /// Stage the failure happened in, if it is tied to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RequestError::Transport { stage, .. } | RequestError::Timeout { stage, .. } => {
                Some(*stage)
            }
            RequestError::Connection { .. } => Some(Stage::Connect),
            _ => None,
        }
    }
}

/// Rejected `ConnectionTarget` input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidTarget {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("port {0} is out of range 1-65535")]
    PortOutOfRange(u32),

    #[error("'{0}' is not a port number")]
    BadPort(String),

    #[error("'{0}' has no ':port' suffix")]
    MissingPort(String),
}
