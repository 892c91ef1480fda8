// client: single-shot socket request library (connect, write one message, read the reply)
use log::{debug, warn};
use native_tls::{Certificate, TlsConnector};
use sockreq_core::{
    ClientConfig, ConnectionTarget, DecodePolicy, RequestError, RequestOutcome, Stage, TlsConfig,
};
use sockreq_transport::{SocketOptions, TcpTransport, TlsTransport, Transport};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

pub use sockreq_core::{ErrorKind, InvalidTarget};

const READ_CHUNK_SIZE: usize = 4096;

/// Builds a fresh, unconnected transport for each request
pub type TransportFactory =
    Box<dyn Fn(&ClientConfig, &ConnectionTarget) -> io::Result<Box<dyn Transport>> + Send + Sync>;

/// Sends one message to a peer and returns its reply.
///
/// Each [`send`](SocketRequestClient::send) call owns its own connection, so
/// a client can be shared across threads. Nothing is retried: one call is one
/// resolution, one connection, one write and one read phase.
pub struct SocketRequestClient {
    config: ClientConfig,
    factory: TransportFactory,
}

impl SocketRequestClient {
    /// Plain TCP, or TLS when `config.tls` is set.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport_factory(config, default_transport)
    }

    pub fn with_transport_factory<F>(config: ClientConfig, factory: F) -> Self
    where
        F: Fn(&ClientConfig, &ConnectionTarget) -> io::Result<Box<dyn Transport>>
            + Send
            + Sync
            + 'static,
    {
        SocketRequestClient {
            config,
            factory: Box::new(factory),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn send(&self, target: &ConnectionTarget, message: &str) -> RequestOutcome {
        let started = Instant::now();
        let outcome = self.send_inner(target, message);
        match outcome {
            Ok(ref text) => debug!(
                "{}: received {} chars in {:?}",
                target,
                text.chars().count(),
                started.elapsed()
            ),
            Err(ref e) => warn!("{}: {} ({})", target, e, e.kind()),
        }
        outcome
    }

    fn send_inner(&self, target: &ConnectionTarget, message: &str) -> RequestOutcome {
        let addrs = resolve(target)?;

        let transport = (self.factory)(&self.config, target).map_err(|source| {
            RequestError::Transport {
                stage: Stage::Connect,
                source,
            }
        })?;
        // disconnect runs on every exit path from here on
        let mut transport = DisconnectGuard(transport);

        connect_any(&mut *transport, target, &addrs, self.config.connect_timeout)?;
        write_all(&mut *transport, message.as_bytes())?;
        debug!("{}: sent {} bytes", target, message.len());

        if self.config.shutdown_write {
            transport
                .shutdown_write()
                .map_err(|source| RequestError::Transport {
                    stage: Stage::Write,
                    source,
                })?;
        }

        let response = read_response(&mut *transport, &self.config)?;
        decode(response, self.config.decode)
    }
}

impl Default for SocketRequestClient {
    fn default() -> Self {
        SocketRequestClient::new(ClientConfig::default())
    }
}

/// One request with default settings.
pub fn send_request(host: &str, port: u16, message: &str) -> RequestOutcome {
    let target = ConnectionTarget::new(host, port)?;
    SocketRequestClient::default().send(&target, message)
}

fn socket_options(config: &ClientConfig) -> SocketOptions {
    SocketOptions {
        nodelay: true,
        keepalive: config.keepalive,
        linger: config.linger,
    }
}

fn default_transport(
    config: &ClientConfig,
    target: &ConnectionTarget,
) -> io::Result<Box<dyn Transport>> {
    let options = socket_options(config);
    match config.tls {
        None => Ok(Box::new(TcpTransport::new(options))),
        Some(ref tls) => {
            let domain = tls.server_name.as_deref().unwrap_or(target.host());
            Ok(Box::new(TlsTransport::new(tls_connector(tls)?, domain, options)))
        }
    }
}

fn tls_connector(tls: &TlsConfig) -> io::Result<TlsConnector> {
    let setup_error = |e: native_tls::Error| io::Error::new(io::ErrorKind::InvalidInput, e);

    let mut builder = TlsConnector::builder();
    for pem in &tls.root_certificates {
        builder.add_root_certificate(Certificate::from_pem(pem).map_err(setup_error)?);
    }
    builder
        .danger_accept_invalid_certs(tls.accept_invalid_certs)
        .danger_accept_invalid_hostnames(tls.accept_invalid_certs);
    builder.build().map_err(setup_error)
}

struct DisconnectGuard(Box<dyn Transport>);

impl Deref for DisconnectGuard {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for DisconnectGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.disconnect() {
            debug!("disconnect failed: {}", e);
        }
    }
}

fn resolve(target: &ConnectionTarget) -> Result<Vec<SocketAddr>, RequestError> {
    let resolution_error = |source| RequestError::Resolution {
        host: target.host().to_string(),
        source,
    };

    let addrs: Vec<SocketAddr> = (target.host(), target.port())
        .to_socket_addrs()
        .map_err(resolution_error)?
        .collect();

    if addrs.is_empty() {
        return Err(resolution_error(io::Error::new(
            io::ErrorKind::NotFound,
            "no addresses returned",
        )));
    }
    Ok(addrs)
}

// Tries each resolved address in order within one shared deadline; the last
// failure decides the error
fn connect_any(
    transport: &mut dyn Transport,
    target: &ConnectionTarget,
    addrs: &[SocketAddr],
    timeout: Duration,
) -> Result<SocketAddr, RequestError> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;
    for &addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RequestError::Timeout {
                stage: Stage::Connect,
                after: timeout,
            });
        }
        match transport.connect(addr, remaining) {
            Ok(()) => return Ok(addr),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_error = Some((addr, e));
            }
        }
    }

    match last_error {
        Some((_, e)) if is_timeout(&e) => Err(RequestError::Timeout {
            stage: Stage::Connect,
            after: timeout,
        }),
        Some((addr, source)) => Err(RequestError::Connection { addr, source }),
        None => Err(RequestError::Resolution {
            host: target.host().to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to"),
        }),
    }
}

fn write_all(transport: &mut dyn Transport, mut data: &[u8]) -> Result<(), RequestError> {
    while !data.is_empty() {
        match transport.send(data) {
            Ok(0) => {
                return Err(RequestError::Transport {
                    stage: Stage::Write,
                    source: io::Error::new(io::ErrorKind::WriteZero, "peer stopped accepting data"),
                })
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(RequestError::Transport {
                    stage: Stage::Write,
                    source,
                })
            }
        }
    }
    Ok(())
}

// Reads until EOF, the byte limit, or the read deadline. A deadline hit
// after some bytes arrived still counts as a response.
fn read_response(
    transport: &mut dyn Transport,
    config: &ClientConfig,
) -> Result<Vec<u8>, RequestError> {
    let deadline = Instant::now() + config.read_timeout;
    let mut response = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let want = match config.max_response_bytes {
            Some(limit) if response.len() >= limit => break,
            Some(limit) => (limit - response.len()).min(READ_CHUNK_SIZE),
            None => READ_CHUNK_SIZE,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            if response.is_empty() {
                return Err(RequestError::Timeout {
                    stage: Stage::Read,
                    after: config.read_timeout,
                });
            }
            debug!("read deadline hit, returning {} partial bytes", response.len());
            break;
        }

        let read_error = |source| RequestError::Transport {
            stage: Stage::Read,
            source,
        };
        transport.set_read_timeout(Some(remaining)).map_err(read_error)?;

        match transport.receive(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            // the deadline check at the top of the loop decides what a timeout means
            Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        }
    }

    Ok(response)
}

fn decode(bytes: Vec<u8>, policy: DecodePolicy) -> RequestOutcome {
    match policy {
        DecodePolicy::Strict => Ok(String::from_utf8(bytes)?),
        DecodePolicy::Lossy => Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())),
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
