//! End-to-end scenarios exercised over the real carriers (UDP sockets and a
//! locally bound HTTP server), as opposed to the in-memory mock carrier used
//! by the unit tests in `src/transport.rs` / `src/session.rs`.

use std::net::SocketAddr;
use std::time::Duration;

use xrelay_core::carrier::https::{HttpsClientCarrier, HttpsServerCarrier};
use xrelay_core::carrier::udp::UdpCarrier;
use xrelay_core::carrier::{Carrier, PeerAddr};
use xrelay_core::{AppProtocol, Config, Error, Mode, SessionEvent, Transport};

fn config() -> Config {
    Config::new()
        .with_timeout(Duration::from_millis(300))
        .with_max_retries(4)
}

async fn udp_pair() -> (UdpCarrier, SocketAddr, UdpCarrier, SocketAddr) {
    let client = UdpCarrier::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let server = UdpCarrier::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let client_addr = client.local_addr().unwrap();
    let server_addr = server.local_addr().unwrap();
    (client, client_addr, server, server_addr)
}

#[tokio::test]
async fn default_mode_round_trip_over_udp() {
    let (client_carrier, _client_addr, server_carrier, server_addr) = udp_pair().await;

    let (client_transport, server_transport) = tokio::join!(
        Transport::connect(client_carrier, PeerAddr::Udp(server_addr), config()),
        Transport::accept(server_carrier, config()),
    );
    let client_transport = client_transport.unwrap();
    let server_transport = server_transport.unwrap();

    let (client, server) = tokio::join!(
        AppProtocol::connect_client(client_transport, "alice", "1", Mode::Default),
        AppProtocol::accept_server(server_transport, "relay", "1", Mode::Default),
    );
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    let ((), event) = tokio::join!(client.send_text("hello over udp", "alice"), server.recv_event());
    assert_eq!(
        event.unwrap(),
        SessionEvent::Message { text: "hello over udp".to_string(), sender: "alice".to_string() }
    );

    let ack = client.recv_event().await.unwrap();
    assert_eq!(ack, SessionEvent::Ack { msg_id: None });
}

#[tokio::test]
async fn secure_mode_round_trip_over_udp() {
    let (client_carrier, _client_addr, server_carrier, server_addr) = udp_pair().await;

    let (client_transport, server_transport) = tokio::join!(
        Transport::connect(client_carrier, PeerAddr::Udp(server_addr), config()),
        Transport::accept(server_carrier, config()),
    );
    let client_transport = client_transport.unwrap();
    let server_transport = server_transport.unwrap();

    let (client, server) = tokio::join!(
        AppProtocol::connect_client(client_transport, "alice", "1", Mode::Secure),
        AppProtocol::accept_server(server_transport, "relay", "1", Mode::Secure),
    );
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    let secret = "top secret message";
    let ((), event) = tokio::join!(client.send_text(secret, "alice"), server.recv_event());
    match event.unwrap() {
        SessionEvent::Message { text, .. } => assert_eq!(text, secret),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn bye_over_udp_closes_both_sides_cleanly() {
    let (client_carrier, _client_addr, server_carrier, server_addr) = udp_pair().await;

    let (client_transport, server_transport) = tokio::join!(
        Transport::connect(client_carrier, PeerAddr::Udp(server_addr), config()),
        Transport::accept(server_carrier, config()),
    );
    let client_transport = client_transport.unwrap();
    let server_transport = server_transport.unwrap();

    let (client, server) = tokio::join!(
        AppProtocol::connect_client(client_transport, "alice", "1", Mode::Default),
        AppProtocol::accept_server(server_transport, "relay", "1", Mode::Default),
    );
    let client = client.unwrap();
    let mut server = server.unwrap();

    // Mirrors what the CLI binaries do: the server keeps calling
    // `recv_event` in a loop and simply returns once it sees `PeerClosed`,
    // the same way `xrelay-client`/`xrelay-server`'s session loop does. The
    // client's `close` must complete successfully rather than timing out
    // against a peer that has stopped reading.
    let (close_result, event) = tokio::join!(client.close(), server.recv_event());
    close_result.expect("client close must not time out waiting for the peer's FIN ACK");
    assert_eq!(event.unwrap(), SessionEvent::PeerClosed);
}

#[tokio::test]
async fn mode_mismatch_over_udp_closes_both_sides() {
    let (client_carrier, _client_addr, server_carrier, server_addr) = udp_pair().await;

    let (client_transport, server_transport) = tokio::join!(
        Transport::connect(client_carrier, PeerAddr::Udp(server_addr), config()),
        Transport::accept(server_carrier, config()),
    );
    let client_transport = client_transport.unwrap();
    let server_transport = server_transport.unwrap();

    let (client, server) = tokio::join!(
        AppProtocol::connect_client(client_transport, "alice", "1", Mode::Secure),
        AppProtocol::accept_server(server_transport, "relay", "1", Mode::Default),
    );

    assert!(matches!(client, Err(Error::ModeMismatch)));
    assert!(matches!(server, Err(Error::ModeMismatch)));
}

#[tokio::test]
async fn obfs_mode_round_trip_over_https() {
    let (server_carrier, router) = HttpsServerCarrier::new(64);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();
    let serve_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client_carrier = HttpsClientCarrier::new(
        format!("http://{server_addr}"),
        "obfs-client",
        Duration::from_millis(20),
    );

    let (client_transport, server_transport) = tokio::join!(
        Transport::connect(client_carrier, PeerAddr::Https("obfs-client".to_string()), config()),
        Transport::accept(server_carrier, config()),
    );
    let client_transport = client_transport.unwrap();
    let server_transport = server_transport.unwrap();

    let (client, server) = tokio::join!(
        AppProtocol::connect_client(client_transport, "alice", "1", Mode::Obfs),
        AppProtocol::accept_server(server_transport, "relay", "1", Mode::Obfs),
    );
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    let ((), event) = tokio::join!(client.send_text("tunneled hello", "alice"), server.recv_event());
    assert_eq!(
        event.unwrap(),
        SessionEvent::Message { text: "tunneled hello".to_string(), sender: "alice".to_string() }
    );

    serve_handle.abort();
}

#[tokio::test]
async fn https_client_retries_transparently_when_server_inbox_is_full() {
    let (mut server_carrier, router) = HttpsServerCarrier::new(1);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();
    let serve_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut client_carrier = HttpsClientCarrier::new(
        format!("http://{server_addr}"),
        "retry-client",
        Duration::from_millis(20),
    );
    let peer = client_carrier.server_peer();

    client_carrier.send(b"first", &peer).await.unwrap();

    let drain = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        server_carrier.recv(Duration::from_secs(1)).await.unwrap()
    });

    // The inbox (capacity 1) already holds "first", so this hits `503` at
    // least once; it must keep retrying until `drain` frees a slot instead
    // of surfacing `CarrierUnavailable` to the caller.
    client_carrier.send(b"second", &peer).await.unwrap();

    let (drained_frame, _) = drain.await.unwrap();
    assert_eq!(drained_frame, b"first");

    serve_handle.abort();
}
