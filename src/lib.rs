//! phantom is a stateless encrypted UDP relay keyed by a pre-shared secret.
//!
//! This crate is the binary shell: command line parsing, logging, signal
//! handling and the tokio runtime bootstrap. The relay itself lives in
//! `phantom-service` (server) and `phantom` (protocol core).
//!
//! ## Usage
//!
//! Generate a PSK and write it into a configuration file:
//!
//! ```bash
//! phantom-server --gen-psk
//! ```
//!
//! ```yaml
//! listen: ":54321"
//! psk: "BASE64-ENCODED-32-BYTE-SECRET"
//! time_window: 30
//! log_level: "info"
//! ```
//!
//! Then run the server:
//!
//! ```bash
//! phantom-server -c config.yaml
//! ```

/// phantom version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod logging;
pub mod service;
