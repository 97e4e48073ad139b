//! Inner relay protocol
//!
//! The plaintext frames carried inside the encrypted envelope.

pub use self::protocol::{Address, Network, Request, Response};

pub mod protocol;
