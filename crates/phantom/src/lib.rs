//! phantom is a stateless encrypted UDP relay keyed by a pre-shared secret.
//!
//! This crate holds the protocol core: the time-windowed packet cipher, the
//! inner request/response codec and the nonce replay filter. The server that
//! drives them lives in `phantom-service`.

/// phantom version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use self::{
    crypto::{CryptoError, PacketCipher},
    relay::{Address, Network, Request, Response},
    security::replay::ReplayProtector,
};

pub mod crypto;
pub mod net;
pub mod relay;
pub mod security;
