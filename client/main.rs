// sockreq: send one message to host:port and print the reply
use clap::Parser;
use sockreq_client::SocketRequestClient;
use sockreq_core::logger::initialize_logger;
use sockreq_core::{
    is_valid_ip_address_domain, parse_port, strip_port_suffix, ClientConfig, ConnectionTarget, DecodePolicy,
    TlsConfig,
};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sockreq")]
#[command(about = "Send a single request over TCP and print the response", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// IPv4 address or domain name of the server
    #[arg(value_name = "HOST")]
    host: String,

    /// TCP port (1-65535)
    #[arg(value_name = "PORT")]
    port: String,

    /// Message to send
    #[arg(value_name = "MESSAGE")]
    message: String,

    /// Connect timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Deadline for reading the response in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    read_timeout_ms: u64,

    /// Stop reading after this many bytes
    #[arg(long, value_name = "BYTES")]
    max_bytes: Option<usize>,

    /// Close the sending side after the message is written
    #[arg(long)]
    half_close: bool,

    /// Fail on invalid UTF-8 instead of replacing it
    #[arg(long)]
    strict_utf8: bool,

    /// Accept any host string (e.g. "localhost" or multi-label names)
    #[arg(long)]
    skip_validation: bool,

    /// Speak TLS to the server
    #[arg(long)]
    tls: bool,

    /// Extra trusted root certificate (PEM); implies --tls
    #[arg(long, value_name = "FILE")]
    ca_cert: Option<PathBuf>,

    /// Name to verify the server certificate against instead of HOST; implies --tls
    #[arg(long, value_name = "NAME")]
    server_name: Option<String>,

    /// Do not verify the server certificate; implies --tls
    #[arg(long)]
    insecure: bool,
}

fn tls_config(cli: &Cli) -> Option<TlsConfig> {
    if !(cli.tls || cli.ca_cert.is_some() || cli.server_name.is_some() || cli.insecure) {
        return None;
    }
    let mut tls = TlsConfig::default().with_accept_invalid_certs(cli.insecure);
    if let Some(ref name) = cli.server_name {
        tls = tls.with_server_name(name.clone());
    }
    if let Some(ref path) = cli.ca_cert {
        match fs::read(path) {
            Ok(pem) => tls = tls.with_root_certificate(pem),
            Err(e) => {
                eprintln!("Cannot read {}: {}", path.display(), e);
                process::exit(2);
            }
        }
    }
    Some(tls)
}

fn main() {
    initialize_logger();
    let cli = Cli::parse();

    if !cli.skip_validation && !is_valid_ip_address_domain(&cli.host) {
        eprintln!("Invalid IP address or domain: {}", cli.host);
        process::exit(2);
    }

    let port = match parse_port(&cli.port) {
        Some(port) => port,
        None => {
            eprintln!("Invalid port range: {}", cli.port);
            process::exit(2);
        }
    };

    // a ":port" accepted by the validator is dropped; PORT wins
    let target = match ConnectionTarget::new(strip_port_suffix(&cli.host), port) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    let mut config = ClientConfig::default()
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms.max(1)))
        .with_read_timeout(Duration::from_millis(cli.read_timeout_ms.max(1)))
        .with_shutdown_write(cli.half_close);
    if let Some(limit) = cli.max_bytes {
        config = config.with_max_response_bytes(limit);
    }
    if cli.strict_utf8 {
        config = config.with_decode(DecodePolicy::Strict);
    }
    if let Some(tls) = tls_config(&cli) {
        config = config.with_tls(tls);
    }

    let client = SocketRequestClient::new(config);
    match client.send(&target, &cli.message) {
        Ok(response) => println!("Response from server: {}", response),
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            process::exit(1);
        }
    }
}
