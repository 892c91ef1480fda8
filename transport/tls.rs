// TLS transport: a native-tls session over the same TCP socket handling as TcpTransport
use crate::options::SocketOptions;
use crate::tcp::apply_options;
use crate::traits::{not_connected, Transport};
use log::debug;
use native_tls::{HandshakeError, TlsConnector, TlsStream};
use std::io::{self, Read, Result, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

pub struct TlsTransport {
    connector: TlsConnector,
    /// Name sent as SNI and checked against the peer certificate
    domain: String,
    options: SocketOptions,
    stream: Option<TlsStream<TcpStream>>,
}

impl TlsTransport {
    pub fn new(connector: TlsConnector, domain: impl Into<String>, options: SocketOptions) -> Self {
        TlsTransport {
            connector,
            domain: domain.into(),
            options,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut TlsStream<TcpStream>> {
        self.stream.as_mut().ok_or_else(not_connected)
    }
}

fn handshake_error(e: HandshakeError<TcpStream>) -> io::Error {
    match e {
        HandshakeError::Failure(e) => io::Error::new(io::ErrorKind::Other, e),
        // the socket is blocking, so only its timeout can interrupt the handshake
        HandshakeError::WouldBlock(_) => {
            io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")
        }
    }
}

impl Transport for TlsTransport {
    /// The TCP connect and the handshake share `timeout`.
    fn connect(&mut self, addr: SocketAddr, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let tcp = TcpStream::connect_timeout(&addr, timeout)?;
        apply_options(&tcp, &self.options)?;

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no time left for the TLS handshake",
            ));
        }
        tcp.set_read_timeout(Some(remaining))?;
        tcp.set_write_timeout(Some(remaining))?;

        let stream = self
            .connector
            .connect(&self.domain, tcp)
            .map_err(handshake_error)?;
        stream.get_ref().set_read_timeout(None)?;
        stream.get_ref().set_write_timeout(None)?;

        debug!("TLS session with {} ({}) established", addr, self.domain);
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
        self.stream_mut()?.get_ref().set_read_timeout(timeout)
    }

    /// Sends close_notify, then half-closes the TCP socket.
    fn shutdown_write(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.shutdown()?;
        stream.get_ref().shutdown(Shutdown::Write)
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown() {
                debug!("close_notify failed: {}", e);
            }
            if let Err(e) = stream.get_ref().shutdown(Shutdown::Both) {
                if e.kind() != io::ErrorKind::NotConnected {
                    debug!("shutdown before close failed: {}", e);
                }
            }
        }
        Ok(())
    }
}

impl Drop for TlsTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
