//! End-to-end relay round trips against live targets

use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, UdpSocket},
    time,
};

use phantom_service::{
    config::Config,
    phantom::{
        crypto::{self, PacketCipher},
        relay::protocol::{
            Address, Network, Request, Response, FRAME_TYPE_RESPONSE, STATUS_FORWARD_FAILED,
            STATUS_SUCCESS,
        },
    },
    server::UdpServer,
};

const TIME_WINDOW: u64 = 30;

struct TestServer {
    addr: SocketAddr,
    cipher: PacketCipher,
}

async fn start_server() -> TestServer {
    let psk = crypto::generate_psk();
    let config = Config {
        listen: "127.0.0.1:0".to_owned(),
        psk: psk.clone(),
        time_window: TIME_WINDOW,
        log_level: "error".to_owned(),
    };

    let server = UdpServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer {
        addr,
        cipher: PacketCipher::new(&psk, TIME_WINDOW).unwrap(),
    }
}

async fn start_udp_echo_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 65536];
        loop {
            let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
            socket.send_to(&buf[..n], peer).await.unwrap();
        }
    });

    addr
}

async fn start_tcp_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, ..) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).await.unwrap();
                stream.write_all(&buf[..n]).await.unwrap();
            });
        }
    });

    addr
}

/// Seals `request`, sends it to the server and opens the reply
async fn round_trip(server: &TestServer, request: &Request) -> Response {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sealed = server.cipher.seal(&request.to_bytes()).unwrap();
    client.send_to(&sealed, server.addr).await.unwrap();

    let mut buf = [0u8; 65536];
    let n = time::timeout(Duration::from_secs(5), client.recv(&mut buf))
        .await
        .expect("no reply from server")
        .unwrap();

    let plaintext = server.cipher.open(&buf[..n]).unwrap();
    Response::parse(&plaintext).unwrap()
}

#[tokio::test]
async fn udp_relay_round_trip() {
    let server = start_server().await;
    let echo_addr = start_udp_echo_server().await;

    let request = Request::new(
        Network::Udp,
        Address::from(echo_addr),
        b"Hello, Phantom!".to_vec(),
    );
    let response = round_trip(&server, &request).await;

    assert_eq!(response.frame_type, FRAME_TYPE_RESPONSE);
    assert_eq!(response.status, STATUS_SUCCESS);
    assert_eq!(response.payload, b"Hello, Phantom!");
}

#[tokio::test]
async fn tcp_relay_round_trip() {
    let server = start_server().await;
    let echo_addr = start_tcp_echo_server().await;

    let request = Request::new(Network::Tcp, Address::from(echo_addr), b"ping over tcp".to_vec());
    let response = round_trip(&server, &request).await;

    assert_eq!(response.status, STATUS_SUCCESS);
    assert_eq!(response.payload, b"ping over tcp");
}

#[tokio::test]
async fn replayed_datagram_gets_no_reply() {
    let server = start_server().await;
    let echo_addr = start_udp_echo_server().await;

    let request = Request::new(Network::Udp, Address::from(echo_addr), b"once only".to_vec());
    let sealed = server.cipher.seal(&request.to_bytes()).unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // First copy round-trips normally
    client.send_to(&sealed, server.addr).await.unwrap();
    let mut buf = [0u8; 65536];
    time::timeout(Duration::from_secs(5), client.recv(&mut buf))
        .await
        .expect("no reply to the first copy")
        .unwrap();

    // The identical datagram is silently dropped
    client.send_to(&sealed, server.addr).await.unwrap();
    let second = time::timeout(Duration::from_secs(2), client.recv(&mut buf)).await;
    assert!(second.is_err(), "replayed datagram must not be answered");
}

#[tokio::test]
async fn unreachable_target_returns_error_status() {
    let server = start_server().await;

    // Port 1 on loopback refuses connections
    let request = Request::new(
        Network::Tcp,
        Address::SocketAddress("127.0.0.1:1".parse().unwrap()),
        Vec::new(),
    );
    let response = round_trip(&server, &request).await;

    assert_eq!(response.status, STATUS_FORWARD_FAILED);
    assert!(response.payload.is_empty());
    assert_eq!(response.to_bytes(), [0x02, 0x01]);
}

#[tokio::test]
async fn garbage_and_foreign_datagrams_get_no_reply() {
    let server = start_server().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Too short to be a frame at all
    client.send_to(b"hello?", server.addr).await.unwrap();

    // Right shape, wrong key material
    let stranger = PacketCipher::new(&crypto::generate_psk(), TIME_WINDOW).unwrap();
    let request = Request::new(
        Network::Udp,
        Address::SocketAddress("127.0.0.1:9".parse().unwrap()),
        Vec::new(),
    );
    let sealed = stranger.seal(&request.to_bytes()).unwrap();
    client.send_to(&sealed, server.addr).await.unwrap();

    let mut buf = [0u8; 65536];
    let reply = time::timeout(Duration::from_secs(2), client.recv(&mut buf)).await;
    assert!(reply.is_err(), "unauthenticated datagrams must not be answered");
}
