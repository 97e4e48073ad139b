//! UDP socket wrappers for the inbound listener

use std::{io, net::SocketAddr};

use cfg_if::cfg_if;
use log::warn;
use tokio::net::UdpSocket;

/// `SO_RCVBUF` / `SO_SNDBUF` requested for the inbound socket. The listener
/// is a single socket shared by every client, so it gets generous kernel
/// buffers. Best-effort: a refusing kernel is not fatal.
const INBOUND_SOCKET_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Creates the listener's `UdpSocket` bound to `addr`
pub async fn create_inbound_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;

    if let Err(err) = set_inbound_buffer_size(&socket) {
        warn!("failed to set inbound socket buffer sizes, error: {}", err);
    }

    Ok(socket)
}

cfg_if! {
    if #[cfg(unix)] {
        fn set_inbound_buffer_size(socket: &UdpSocket) -> io::Result<()> {
            use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};

            use socket2::Socket;

            // Borrow the fd briefly as a socket2::Socket; it must not be closed here
            let s = unsafe { Socket::from_raw_fd(socket.as_raw_fd()) };
            let result = s
                .set_recv_buffer_size(INBOUND_SOCKET_BUFFER_SIZE)
                .and_then(|_| s.set_send_buffer_size(INBOUND_SOCKET_BUFFER_SIZE));
            let _ = s.into_raw_fd();
            result
        }
    } else {
        fn set_inbound_buffer_size(_socket: &UdpSocket) -> io::Result<()> {
            Ok(())
        }
    }
}
