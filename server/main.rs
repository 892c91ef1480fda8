// sockreq-server: answers every connection with a fixed reply or an echo
use clap::Parser;
use sockreq_core::logger::initialize_logger;
use sockreq_core::parse_port;
use sockreq_server::{Reply, Server, ServerConfig, DEFAULT_REPLY};
use std::net::{IpAddr, SocketAddr};
use std::process;

#[derive(Parser)]
#[command(name = "sockreq-server")]
#[command(about = "Reference TCP responder for sockreq", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// TCP port to listen on (1-65535)
    #[arg(value_name = "PORT")]
    port: String,

    /// Local address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Send every request back unchanged
    #[arg(long, conflicts_with = "reply")]
    echo: bool,

    /// Fixed reply text
    #[arg(long, default_value = DEFAULT_REPLY)]
    reply: String,

    /// Drop requests larger than this without replying
    #[arg(long, value_name = "BYTES", default_value_t = 1024 * 1024)]
    max_request_bytes: usize,
}

fn main() {
    initialize_logger();
    let cli = Cli::parse();

    let port = match parse_port(&cli.port) {
        Some(port) => port,
        None => {
            eprintln!("Invalid port range: {}", cli.port);
            process::exit(2);
        }
    };

    let reply = if cli.echo {
        Reply::Echo
    } else {
        Reply::Fixed(cli.reply)
    };
    let config = ServerConfig::new(SocketAddr::new(cli.bind, port))
        .with_workers(cli.workers)
        .with_reply(reply)
        .with_max_request_bytes(cli.max_request_bytes);

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to bind {}:{}: {}", cli.bind, port, e);
            process::exit(1);
        }
    };

    println!("Server listening on {}", server.local_addr());

    if let Err(e) = server.serve() {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
