// Socket-level options applied through setsockopt/getsockopt
use nix::sys::socket::{getsockopt, setsockopt, sockopt};
use std::io::{self, Result};
use std::os::fd::AsFd;
use std::time::Duration;

/// Options applied to a stream right after it is connected or accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub nodelay: bool,
    pub keepalive: bool,
    /// `Some(d)` enables SO_LINGER with `d` rounded down to whole seconds
    pub linger: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            nodelay: true,
            keepalive: false,
            linger: None,
        }
    }
}

pub fn set_keepalive<F: AsFd>(fd: &F, enabled: bool) -> Result<()> {
    setsockopt(fd, sockopt::KeepAlive, &enabled).map_err(io::Error::from)
}

pub fn keepalive<F: AsFd>(fd: &F) -> Result<bool> {
    getsockopt(fd, sockopt::KeepAlive).map_err(io::Error::from)
}

pub fn set_reuse_addr<F: AsFd>(fd: &F, enabled: bool) -> Result<()> {
    setsockopt(fd, sockopt::ReuseAddr, &enabled).map_err(io::Error::from)
}

pub fn reuse_addr<F: AsFd>(fd: &F) -> Result<bool> {
    getsockopt(fd, sockopt::ReuseAddr).map_err(io::Error::from)
}

pub fn set_linger<F: AsFd>(fd: &F, linger: Option<Duration>) -> Result<()> {
    let value = libc::linger {
        l_onoff: linger.is_some() as libc::c_int,
        l_linger: linger.map_or(0, |d| d.as_secs().min(libc::c_int::MAX as u64) as libc::c_int),
    };
    setsockopt(fd, sockopt::Linger, &value).map_err(io::Error::from)
}

pub fn linger<F: AsFd>(fd: &F) -> Result<Option<Duration>> {
    let value = getsockopt(fd, sockopt::Linger).map_err(io::Error::from)?;
    if value.l_onoff == 0 {
        Ok(None)
    } else {
        Ok(Some(Duration::from_secs(value.l_linger.max(0) as u64)))
    }
}
