//! phantom relay server

use std::io;

use crate::config::Config;

pub use self::udprelay::UdpServer;

mod forward;
pub mod udprelay;

/// Starts the relay server with the given configuration.
///
/// Binds the listen socket, then serves until the process is shut down; an
/// `Ok` return never happens in normal operation.
pub async fn run(config: Config) -> io::Result<()> {
    let server = UdpServer::bind(&config).await?;
    server.run().await
}
