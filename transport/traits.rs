// Transport abstraction - lets the request client run over TCP or a test double
use std::io::Result;
use std::net::SocketAddr;
use std::time::Duration;

pub trait Transport: Send {
    fn connect(&mut self, addr: SocketAddr, timeout: Duration) -> Result<()>;
    fn send(&mut self, data: &[u8]) -> Result<usize>;
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// `None` blocks indefinitely on `receive`
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
    /// Half-close: the peer sees end-of-stream, reads still work
    fn shutdown_write(&mut self) -> Result<()>;
    /// Release the connection. Calling it again is a no-op.
    fn disconnect(&mut self) -> Result<()>;
}

pub trait TransportListener: Send {
    type Connection: Transport;

    fn bind(&mut self) -> Result<()>;
    fn accept(&mut self) -> Result<Self::Connection>;
}

pub(crate) fn not_connected() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "Not connected")
}
