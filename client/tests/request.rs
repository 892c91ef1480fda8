// End-to-end requests against real loopback servers
use native_tls::{Identity, TlsAcceptor};
use sockreq_client::{send_request, ErrorKind, SocketRequestClient};
use sockreq_core::{ClientConfig, ConnectionTarget, Stage, TlsConfig};
use sockreq_server::{Reply, Server, ServerConfig, ServerHandle};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn spawn_server(reply: Reply) -> ServerHandle {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_workers(4)
        .with_reply(reply)
        .with_read_timeout(Duration::from_secs(2));
    Server::bind(config).unwrap().spawn().unwrap()
}

const CERT: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../testdata/localhost.crt"));
const KEY: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../testdata/localhost.key"));

fn target_for(addr: SocketAddr) -> ConnectionTarget {
    ConnectionTarget::new(&addr.ip().to_string(), addr.port()).unwrap()
}

fn quick_client() -> SocketRequestClient {
    SocketRequestClient::new(
        ClientConfig::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(2)),
    )
}

#[test]
fn ping_gets_pong() {
    let server = spawn_server(Reply::Fixed("PONG".to_string()));
    let response = quick_client()
        .send(&target_for(server.local_addr()), "PING")
        .unwrap();
    assert_eq!(response, "PONG");
}

#[test]
fn echo_returns_what_was_sent() {
    let server = spawn_server(Reply::Echo);
    let target = target_for(server.local_addr());
    let client = quick_client();

    for message in ["hello", "héllo wörld", "line one\nline two\n"] {
        assert_eq!(client.send(&target, message).unwrap(), message);
    }
}

#[test]
fn large_echo_is_returned_whole() {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_reply(Reply::Echo)
        .with_read_timeout(Duration::from_secs(5));
    let server = Server::bind(config).unwrap().spawn().unwrap();

    let message: String = (0..200_000).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    let client = SocketRequestClient::new(
        ClientConfig::default()
            .with_read_timeout(Duration::from_secs(5))
            .with_shutdown_write(true),
    );
    let response = client.send(&target_for(server.local_addr()), &message).unwrap();
    assert_eq!(response.len(), message.len());
    assert_eq!(response, message);
}

#[test]
fn oversized_request_gets_no_reply() {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_reply(Reply::Echo)
        .with_max_request_bytes(1024);
    let server = Server::bind(config).unwrap().spawn().unwrap();

    let client = SocketRequestClient::new(
        ClientConfig::default()
            .with_read_timeout(Duration::from_secs(2))
            .with_shutdown_write(true),
    );
    // the server drops the connection, possibly with a reset
    match client.send(&target_for(server.local_addr()), &"x".repeat(4096)) {
        Ok(response) => assert!(response.is_empty()),
        Err(e) => assert_eq!(e.kind(), ErrorKind::Transport),
    }
}

#[test]
fn empty_message_is_allowed() {
    let server = spawn_server(Reply::Fixed("empty ok".to_string()));
    // nothing is written, so the half-close is what tells the server the request is over
    let client = SocketRequestClient::new(
        ClientConfig::default()
            .with_read_timeout(Duration::from_secs(2))
            .with_shutdown_write(true),
    );
    let response = client.send(&target_for(server.local_addr()), "").unwrap();
    assert_eq!(response, "empty ok");
}

#[test]
fn repeated_requests_give_identical_responses() {
    let server = spawn_server(Reply::Echo);
    let target = target_for(server.local_addr());
    let client = quick_client();

    let first = client.send(&target, "same input").unwrap();
    let second = client.send(&target, "same input").unwrap();
    assert_eq!(first, second);
}

#[test]
fn unused_port_is_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let target = ConnectionTarget::new("127.0.0.1", port).unwrap();
    let err = quick_client().send(&target, "PING").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(err.stage(), Some(Stage::Connect));
}

#[test]
fn zero_connect_timeout_is_timeout_error() {
    let server = spawn_server(Reply::Fixed("unreachable".to_string()));
    let client = SocketRequestClient::new(ClientConfig::default().with_connect_timeout(Duration::ZERO));
    let err = client.send(&target_for(server.local_addr()), "PING").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.stage(), Some(Stage::Connect));
}

#[test]
fn unknown_host_is_resolution_error() {
    let target = ConnectionTarget::new("no-such-host.invalid", 9000).unwrap();
    let err = quick_client().send(&target, "PING").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn silent_server_times_out_and_sees_close() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut received = Vec::new();
        // never answers; reading to EOF proves the client closed its socket
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let timeout = Duration::from_millis(300);
    let client = SocketRequestClient::new(ClientConfig::default().with_read_timeout(timeout));

    let started = Instant::now();
    let err = client.send(&target_for(addr), "anyone there?").unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.stage(), Some(Stage::Read));
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(elapsed < timeout + Duration::from_secs(1), "took {:?}", elapsed);

    assert_eq!(server.join().unwrap(), b"anyone there?");
}

#[test]
fn partial_response_is_returned_on_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"partial").unwrap();
        // hold the connection open until the client gives up
        let mut rest = Vec::new();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let _ = stream.read_to_end(&mut rest);
    });

    let client = SocketRequestClient::new(
        ClientConfig::default().with_read_timeout(Duration::from_millis(200)),
    );
    assert_eq!(client.send(&target_for(addr), "GET").unwrap(), "partial");
    server.join().unwrap();
}

#[test]
fn half_close_lets_peer_read_to_eof() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = String::new();
        stream.read_to_string(&mut request).unwrap();
        stream.write_all(request.to_uppercase().as_bytes()).unwrap();
    });

    let client = SocketRequestClient::new(
        ClientConfig::default()
            .with_read_timeout(Duration::from_secs(2))
            .with_shutdown_write(true),
    );
    assert_eq!(client.send(&target_for(addr), "shout").unwrap(), "SHOUT");
    server.join().unwrap();
}

#[test]
fn response_is_capped_at_max_bytes() {
    let server = spawn_server(Reply::Fixed("0123456789".to_string()));
    let client = SocketRequestClient::new(
        ClientConfig::default()
            .with_read_timeout(Duration::from_secs(2))
            .with_max_response_bytes(4),
    );
    assert_eq!(client.send(&target_for(server.local_addr()), "x").unwrap(), "0123");
}

#[test]
fn concurrent_requests_are_isolated() {
    let server = spawn_server(Reply::Echo);
    let target = Arc::new(target_for(server.local_addr()));
    let client = Arc::new(quick_client());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            let target = Arc::clone(&target);
            thread::spawn(move || {
                let message = format!("request #{}", i);
                (message.clone(), client.send(&target, &message).unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (sent, received) = handle.join().unwrap();
        assert_eq!(sent, received);
    }
}

#[test]
fn send_request_uses_defaults() {
    let server = spawn_server(Reply::Fixed("hi".to_string()));
    let addr = server.local_addr();
    assert_eq!(send_request("127.0.0.1", addr.port(), "hello").unwrap(), "hi");
}

fn spawn_tls_server(listener: TcpListener) -> thread::JoinHandle<()> {
    let acceptor = TlsAcceptor::new(Identity::from_pkcs8(CERT, KEY).unwrap()).unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut tls = match acceptor.accept(stream) {
            Ok(tls) => tls,
            // a client that rejects the certificate aborts the handshake
            Err(_) => return,
        };
        let mut buf = [0u8; 256];
        let n = tls.read(&mut buf).unwrap();
        tls.write_all(&buf[..n].to_ascii_uppercase()).unwrap();
        tls.shutdown().unwrap();
    })
}

#[test]
fn tls_request_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = spawn_tls_server(listener);

    let client = SocketRequestClient::new(
        ClientConfig::default()
            .with_read_timeout(Duration::from_secs(2))
            .with_tls(
                TlsConfig::default()
                    .with_server_name("localhost")
                    .with_root_certificate(CERT.to_vec()),
            ),
    );
    assert_eq!(client.send(&target_for(addr), "secure ping").unwrap(), "SECURE PING");
    server.join().unwrap();
}

#[test]
fn tls_with_untrusted_certificate_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = spawn_tls_server(listener);

    let client = SocketRequestClient::new(
        ClientConfig::default().with_tls(TlsConfig::default().with_server_name("localhost")),
    );
    let err = client.send(&target_for(addr), "secure ping").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    server.join().unwrap();
}
