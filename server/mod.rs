// server: reference responder for the request client (fixed reply or echo)
// Accept loop hands connections to a fixed pool of workers over a bounded channel.
use crossbeam::channel::{bounded, Receiver};
use log::{debug, info, warn};
use sockreq_transport::{TcpTransport, TcpTransportListener, Transport, TransportListener};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_REPLY: &str = "Hello from Server!\n";

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_BACKLOG: i32 = 10;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_IDLE: Duration = Duration::from_millis(100);
const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What the server writes back for each request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Fixed(String),
    Echo,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub workers: usize,
    /// listen(2) backlog, also the capacity of the hand-off queue
    pub backlog: i32,
    pub reply: Reply,
    /// Deadline for reading the whole request. Zero gives up at once.
    pub read_timeout: Duration,
    /// Once some bytes arrived, this much silence ends the request.
    /// Peers that half-close end it sooner.
    pub request_idle: Duration,
    /// Larger requests are dropped without a reply
    pub max_request_bytes: usize,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        ServerConfig {
            bind_addr,
            workers: DEFAULT_WORKERS,
            backlog: DEFAULT_BACKLOG,
            reply: Reply::Fixed(DEFAULT_REPLY.to_string()),
            read_timeout: DEFAULT_READ_TIMEOUT,
            request_idle: DEFAULT_REQUEST_IDLE,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_reply(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_request_idle(mut self, idle: Duration) -> Self {
        self.request_idle = idle;
        self
    }

    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit.max(1);
        self
    }
}

pub struct Server {
    config: ServerConfig,
    listener: TcpTransportListener,
    local_addr: SocketAddr,
    abort: Arc<AtomicBool>,
    served: Arc<AtomicU64>,
}

impl Server {
    pub fn bind(config: ServerConfig) -> io::Result<Self> {
        let mut listener = TcpTransportListener::new(config.bind_addr, config.backlog);
        listener.bind()?;
        // polled so the accept loop can notice an abort
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Server {
            config,
            listener,
            local_addr,
            abort: Arc::new(AtomicBool::new(false)),
            served: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop on the calling thread until aborted.
    pub fn serve(mut self) -> io::Result<()> {
        let (tx, rx) = bounded::<TcpTransport>(self.config.backlog.max(1) as usize);
        let config = Arc::new(self.config.clone());

        let mut workers = Vec::with_capacity(self.config.workers);
        for i in 0..self.config.workers.max(1) {
            let rx = rx.clone();
            let config = Arc::clone(&config);
            let served = Arc::clone(&self.served);
            workers.push(
                thread::Builder::new()
                    .name(format!("sockreq-worker-{}", i))
                    .spawn(move || worker_thread(rx, config, served))?,
            );
        }
        drop(rx);

        info!("serving on {} with {} workers", self.local_addr, workers.len());

        while !self.abort.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok(conn) => {
                    if tx.send(conn).is_err() {
                        break; // all workers gone
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // one bad client must not stop the server
                    warn!("accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        drop(tx);
        for worker in workers {
            if worker.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        info!("stopped serving on {}", self.local_addr);
        Ok(())
    }

    /// Runs [`serve`](Server::serve) on a background thread.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let local_addr = self.local_addr;
        let abort = Arc::clone(&self.abort);
        let served = Arc::clone(&self.served);
        let thread = thread::Builder::new()
            .name("sockreq-accept".to_string())
            .spawn(move || self.serve())?;

        Ok(ServerHandle {
            local_addr,
            abort,
            served,
            thread: Some(thread),
        })
    }
}

/// Controls a server started with [`Server::spawn`]. Dropping it stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    abort: Arc<AtomicBool>,
    served: Arc<AtomicU64>,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections fully handled so far
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn join(mut self) -> io::Result<()> {
        self.abort();
        self.join_thread()
    }

    fn join_thread(&mut self) -> io::Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "accept thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.abort();
        let _ = self.join_thread();
    }
}

fn worker_thread(receiver: Receiver<TcpTransport>, config: Arc<ServerConfig>, served: Arc<AtomicU64>) {
    for mut conn in receiver.iter() {
        let peer = conn.peer_addr();
        if let Err(e) = handle_connection(&mut conn, &config) {
            warn!("client {:?}: {}", peer, e);
        }
        let _ = conn.disconnect();
        served.fetch_add(1, Ordering::SeqCst);
    }
}

fn handle_connection(conn: &mut TcpTransport, config: &ServerConfig) -> io::Result<()> {
    let request = read_request(conn, config)?;
    info!(
        "message received from {:?}: {}",
        conn.peer_addr(),
        String::from_utf8_lossy(&request)
    );

    let response = match config.reply {
        Reply::Fixed(ref text) => text.as_bytes(),
        Reply::Echo => &request[..],
    };
    write_all(conn, response)
}

// Reads until the peer half-closes or goes quiet for `request_idle` after
// sending something. The whole read is bounded by `read_timeout`; hitting it
// with some bytes in hand answers what arrived.
fn read_request(conn: &mut TcpTransport, config: &ServerConfig) -> io::Result<Vec<u8>> {
    let deadline = Instant::now() + config.read_timeout;
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            if request.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "no request before the read timeout",
                ));
            }
            debug!("read deadline hit with {} request bytes", request.len());
            break;
        }
        let wait = if request.is_empty() {
            remaining
        } else {
            remaining.min(config.request_idle)
        };
        conn.set_read_timeout(Some(wait))?;

        match conn.receive(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if request.len() + n > config.max_request_bytes {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("request exceeds {} bytes", config.max_request_bytes),
                    ));
                }
                request.extend_from_slice(&buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) => {
                if !request.is_empty() && wait < remaining {
                    break; // quiet after data
                }
            }
            Err(e) => return Err(e),
        }
    }

    debug!("read {} request bytes", request.len());
    Ok(request)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn write_all(conn: &mut TcpTransport, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match conn.send(data) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
