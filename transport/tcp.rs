// TCP transport implementation
use crate::options::{self, SocketOptions};
use crate::traits::{not_connected, Transport, TransportListener};
use log::debug;
use nix::sys::socket::{self, AddressFamily, Backlog, SockFlag, SockType, SockaddrStorage};
use std::io::{self, Read, Result, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

pub struct TcpTransport {
    options: SocketOptions,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(options: SocketOptions) -> Self {
        TcpTransport {
            options,
            stream: None,
        }
    }

    fn from_stream(stream: TcpStream, options: SocketOptions) -> Result<Self> {
        apply_options(&stream, &options)?;
        Ok(TcpTransport {
            options,
            stream: Some(stream),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(not_connected)
    }
}

pub(crate) fn apply_options(stream: &TcpStream, opts: &SocketOptions) -> Result<()> {
    stream.set_nodelay(opts.nodelay)?;
    if opts.keepalive {
        options::set_keepalive(stream, true)?;
    }
    if opts.linger.is_some() {
        options::set_linger(stream, opts.linger)?;
    }
    Ok(())
}

impl Transport for TcpTransport {
    fn connect(&mut self, addr: SocketAddr, timeout: Duration) -> Result<()> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        apply_options(&stream, &self.options)?;
        debug!("connected to {}", addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.stream_mut()?.write(data)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream_mut()?.read(buf)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream_mut()?.set_read_timeout(timeout)
    }

    fn shutdown_write(&mut self) -> Result<()> {
        self.stream_mut()?.shutdown(Shutdown::Write)
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // the peer may already be gone; the fd is closed on drop either way
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                if e.kind() != io::ErrorKind::NotConnected {
                    debug!("shutdown before close failed: {}", e);
                }
            }
        }
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

pub struct TcpTransportListener {
    address: SocketAddr,
    backlog: i32,
    options: SocketOptions,
    listener: Option<TcpListener>,
}

impl TcpTransportListener {
    pub fn new(address: SocketAddr, backlog: i32) -> Self {
        TcpTransportListener {
            address,
            backlog,
            options: SocketOptions::default(),
            listener: None,
        }
    }

    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Address actually bound, which differs from the requested one for port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match self.listener {
            Some(ref listener) => listener.local_addr(),
            None => Err(not_connected()),
        }
    }

    /// In non-blocking mode `accept` returns `WouldBlock` when nobody is waiting
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match self.listener {
            Some(ref listener) => listener.set_nonblocking(nonblocking),
            None => Err(not_connected()),
        }
    }
}

impl TransportListener for TcpTransportListener {
    type Connection = TcpTransport;

    fn bind(&mut self) -> Result<()> {
        let family = if self.address.is_ipv4() {
            AddressFamily::Inet
        } else {
            AddressFamily::Inet6
        };
        let fd = socket::socket(family, SockType::Stream, SockFlag::empty(), None)?;
        options::set_reuse_addr(&fd, true)?;

        let sockaddr = SockaddrStorage::from(self.address);
        socket::bind(fd.as_raw_fd(), &sockaddr)?;
        socket::listen(&fd, Backlog::new(self.backlog)?)?;

        let listener = TcpListener::from(fd);
        debug!("listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn accept(&mut self) -> Result<TcpTransport> {
        let listener = self.listener.as_ref().ok_or_else(not_connected)?;
        let (stream, peer) = listener.accept()?;
        // accepted sockets may inherit O_NONBLOCK from the listener
        stream.set_nonblocking(false)?;
        debug!("accepted connection from {}", peer);
        TcpTransport::from_stream(stream, self.options)
    }
}
