//! phantom UDP server
//!
//! Owns the single listen socket. The receive loop reads serially and hands
//! every datagram to an independent worker task running the full pipeline:
//! cheap rejects, replay check, decrypt, parse, forward, encrypted reply.
//! Nothing on the wire ever distinguishes the reject paths from silence.

use std::{io, net::SocketAddr, sync::Arc};

use byte_string::ByteStr;
use log::{debug, error, info};
use tokio::{net::UdpSocket, task::JoinHandle, time};

use phantom::{
    crypto::{PacketCipher, HEADER_SIZE, NONCE_SIZE, PACKET_OVERHEAD, USER_ID_SIZE},
    net::create_inbound_udp_socket,
    relay::protocol::{Request, Response, STATUS_FORWARD_FAILED},
    security::replay::{ReplayProtector, NONCE_RETENTION, SWEEP_INTERVAL},
};

use crate::config::Config;

use super::forward;

/// Receive buffer, large enough for any UDP payload
const MAXIMUM_UDP_PAYLOAD_SIZE: usize = 65536;

/// The phantom UDP server instance
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    cipher: Arc<PacketCipher>,
    replay_protector: Arc<ReplayProtector>,
    cleanup_abortable: JoinHandle<()>,
}

impl Drop for UdpServer {
    fn drop(&mut self) {
        self.cleanup_abortable.abort();
    }
}

impl UdpServer {
    /// Creates the packet cipher, binds the listen socket and starts the
    /// replay cache janitor
    pub async fn bind(config: &Config) -> io::Result<UdpServer> {
        let cipher = PacketCipher::new(&config.psk, config.time_window).map_err(io::Error::other)?;

        let listen = config.listen_addr();
        let listen_addr = tokio::net::lookup_host(listen.as_str()).await?.next().ok_or_else(|| {
            io::Error::other(format!("unable to resolve listen address {listen}"))
        })?;
        let socket = create_inbound_udp_socket(listen_addr).await?;

        let replay_protector = Arc::new(ReplayProtector::new());

        let cleanup_abortable = {
            let replay_protector = replay_protector.clone();
            tokio::spawn(async move {
                loop {
                    time::sleep(SWEEP_INTERVAL).await;
                    replay_protector.purge_older_than(NONCE_RETENTION);
                }
            })
        };

        Ok(UdpServer {
            socket: Arc::new(socket),
            cipher: Arc::new(cipher),
            replay_protector,
            cleanup_abortable,
        })
    }

    /// Address the listen socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves forever, spawning one worker task per received datagram
    pub async fn run(self) -> io::Result<()> {
        info!(
            "phantom udp server listening on {}",
            self.socket.local_addr().expect("listener.local_addr"),
        );
        info!("user id {}", hex(&self.cipher.user_id()));

        let mut buffer = [0u8; MAXIMUM_UDP_PAYLOAD_SIZE];
        loop {
            let (n, peer_addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(s) => s,
                Err(err) => {
                    error!("udp server recv_from failed with error: {}", err);
                    continue;
                }
            };

            if n == 0 {
                continue;
            }

            let packet = buffer[..n].to_vec();
            let socket = self.socket.clone();
            let cipher = self.cipher.clone();
            let replay_protector = self.replay_protector.clone();

            tokio::spawn(async move {
                handle_packet(socket, cipher, replay_protector, packet, peer_addr).await;
            });
        }
    }
}

/// Runs one datagram through the whole pipeline.
///
/// The only path that replies to the sender is a fully authenticated request;
/// every reject before that is a silent drop, logged at debug level.
async fn handle_packet(
    socket: Arc<UdpSocket>,
    cipher: Arc<PacketCipher>,
    replay_protector: Arc<ReplayProtector>,
    packet: Vec<u8>,
    peer_addr: SocketAddr,
) {
    if packet.len() < PACKET_OVERHEAD {
        return;
    }

    if packet[..USER_ID_SIZE] != cipher.user_id() {
        debug!("udp packet from {} with foreign user id, dropped", peer_addr);
        return;
    }

    // Replay check runs before any decryption work
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&packet[HEADER_SIZE..HEADER_SIZE + NONCE_SIZE]);
    if replay_protector.check_nonce_and_set(&nonce) {
        debug!(
            "udp packet from {} with duplicate nonce {:?}, dropped",
            peer_addr,
            ByteStr::new(&nonce)
        );
        return;
    }

    let plaintext = match cipher.open(&packet) {
        Ok(p) => p,
        Err(err) => {
            debug!("udp packet from {} rejected, {}", peer_addr, err);
            return;
        }
    };

    let request = match Request::parse(&plaintext) {
        Ok(r) => r,
        Err(err) => {
            debug!("invalid request from {}, {}", peer_addr, err);
            return;
        }
    };

    debug!("request from {}: {} {}", peer_addr, request.network, request.addr);

    // An authenticated sender is entitled to a status code on failure
    let response = match forward::forward(&request).await {
        Ok(reply) => Response::new(reply),
        Err(err) => {
            debug!(
                "forward {} {} failed, error: {}",
                request.network, request.addr, err
            );
            Response::error(STATUS_FORWARD_FAILED)
        }
    };

    let sealed = match cipher.seal(&response.to_bytes()) {
        Ok(p) => p,
        Err(err) => {
            error!("sealing response for {} failed, error: {}", peer_addr, err);
            return;
        }
    };

    if let Err(err) = socket.send_to(&sealed, peer_addr).await {
        error!("udp failed to send back to client {}, error: {}", peer_addr, err);
    } else {
        debug!("response sent to {}: {} bytes", peer_addr, sealed.len());
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
