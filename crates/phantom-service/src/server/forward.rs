//! One-shot forwarding to the requested target
//!
//! Each authenticated datagram buys exactly one outbound exchange: connect
//! (or bind), send the payload, read a single reply, close. No pooling, no
//! reuse across datagrams. Every path is bounded by an explicit deadline.

use std::{io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpStream, UdpSocket},
    time,
};

use phantom::relay::protocol::{Address, Network, Request};

/// Replies are capped at 4 KiB; the relay targets short, latency-sensitive
/// exchanges and a TCP reply's tail beyond the cap is discarded
pub const MAX_RESPONSE_SIZE: usize = 4096;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const UDP_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes the request's one-shot exchange, returning the target's reply
pub async fn forward(request: &Request) -> io::Result<Vec<u8>> {
    match request.network {
        Network::Tcp => forward_tcp(&request.addr, &request.payload).await,
        Network::Udp => forward_udp(&request.addr, &request.payload).await,
    }
}

async fn forward_tcp(addr: &Address, payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = time::timeout(TCP_CONNECT_TIMEOUT, connect_tcp(addr))
        .await
        .map_err(|_| timeout_error("tcp connect timed out"))??;

    time::timeout(TCP_EXCHANGE_TIMEOUT, async move {
        if !payload.is_empty() {
            stream.write_all(payload).await?;
        }

        // One read only; end-of-stream counts as success with whatever arrived
        let mut reply = vec![0u8; MAX_RESPONSE_SIZE];
        let n = stream.read(&mut reply).await?;
        reply.truncate(n);

        Ok(reply)
    })
    .await
    .map_err(|_| timeout_error("tcp exchange timed out"))?
}

async fn connect_tcp(addr: &Address) -> io::Result<TcpStream> {
    match *addr {
        Address::SocketAddress(sa) => TcpStream::connect(sa).await,
        Address::DomainNameAddress(ref dname, port) => {
            // Resolve with the system resolver and try every candidate in order
            let mut last_err = None;
            for sa in lookup_host((dname.as_str(), port)).await? {
                match TcpStream::connect(sa).await {
                    Ok(stream) => return Ok(stream),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(last_err.unwrap_or_else(|| resolve_error(dname, port)))
        }
    }
}

async fn forward_udp(addr: &Address, payload: &[u8]) -> io::Result<Vec<u8>> {
    // Resolution and socket setup are not charged against the exchange deadline
    let target = resolve_udp_target(addr).await?;

    // Ephemeral socket of the matching family, closed after one exchange
    let socket = match target {
        SocketAddr::V4(..) => UdpSocket::bind("0.0.0.0:0").await?,
        SocketAddr::V6(..) => UdpSocket::bind("[::]:0").await?,
    };
    socket.connect(target).await?;

    time::timeout(UDP_EXCHANGE_TIMEOUT, async move {
        // A zero-length probe datagram is still a send
        socket.send(payload).await?;

        let mut reply = vec![0u8; MAX_RESPONSE_SIZE];
        let n = socket.recv(&mut reply).await?;
        reply.truncate(n);

        Ok(reply)
    })
    .await
    .map_err(|_| timeout_error("udp exchange timed out"))?
}

async fn resolve_udp_target(addr: &Address) -> io::Result<SocketAddr> {
    match *addr {
        Address::SocketAddress(sa) => Ok(sa),
        Address::DomainNameAddress(ref dname, port) => lookup_host((dname.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| resolve_error(dname, port)),
    }
}

fn timeout_error(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, message)
}

fn resolve_error(dname: &str, port: u16) -> io::Error {
    io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("unable to resolve {dname}:{port}"),
    )
}
