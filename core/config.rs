// Client tunables. Nothing here outlives a single request; the struct is
// cloned into each call.
use crate::types::DecodePolicy;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Budget for establishing the connection. It is shared by every resolved
    /// address (and the TLS handshake), so a host with several addresses still
    /// gives up after this long. Zero fails the connect stage at once.
    pub connect_timeout: Duration,
    /// Deadline for the whole read phase, measured from the first read
    pub read_timeout: Duration,
    /// Stop reading once this many bytes have arrived
    pub max_response_bytes: Option<usize>,
    /// Half-close the write side after the request is sent
    pub shutdown_write: bool,
    pub decode: DecodePolicy,
    /// SO_KEEPALIVE on the client socket
    pub keepalive: bool,
    /// SO_LINGER on the client socket
    pub linger: Option<Duration>,
    /// Speak TLS over the connection; `None` is plain TCP
    pub tls: Option<TlsConfig>,
}

/// Client-side TLS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Name sent as SNI and matched against the certificate. Defaults to the target host.
    pub server_name: Option<String>,
    /// PEM certificates trusted in addition to the system roots
    pub root_certificates: Vec<Vec<u8>>,
    /// Skip certificate and host name verification
    pub accept_invalid_certs: bool,
}

impl TlsConfig {
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_root_certificate(mut self, pem: Vec<u8>) -> Self {
        self.root_certificates.push(pem);
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_response_bytes: None,
            shutdown_write: false,
            decode: DecodePolicy::Lossy,
            keepalive: false,
            linger: None,
            tls: None,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = Some(limit);
        self
    }

    pub fn with_shutdown_write(mut self, enabled: bool) -> Self {
        self.shutdown_write = enabled;
        self
    }

    pub fn with_decode(mut self, policy: DecodePolicy) -> Self {
        self.decode = policy;
        self
    }

    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.max_response_bytes, None);
        assert!(!config.shutdown_write);
        assert_eq!(config.decode, DecodePolicy::Lossy);
        assert_eq!(config.tls, None);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::default()
            .with_connect_timeout(Duration::from_millis(100))
            .with_read_timeout(Duration::from_millis(200))
            .with_max_response_bytes(16)
            .with_shutdown_write(true)
            .with_decode(DecodePolicy::Strict)
            .with_linger(Some(Duration::from_secs(1)));

        assert_eq!(config.connect_timeout, Duration::from_millis(100));
        assert_eq!(config.read_timeout, Duration::from_millis(200));
        assert_eq!(config.max_response_bytes, Some(16));
        assert!(config.shutdown_write);
        assert_eq!(config.decode, DecodePolicy::Strict);
        assert_eq!(config.linger, Some(Duration::from_secs(1)));
    }

    #[test]
    fn tls_settings() {
        let config = ClientConfig::default().with_tls(
            TlsConfig::default()
                .with_server_name("localhost")
                .with_root_certificate(b"pem".to_vec()),
        );
        let tls = config.tls.unwrap();
        assert_eq!(tls.server_name.as_deref(), Some("localhost"));
        assert_eq!(tls.root_certificates, vec![b"pem".to_vec()]);
        assert!(!tls.accept_invalid_certs);
    }
}
