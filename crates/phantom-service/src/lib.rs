//! phantom relay server
//!
//! A single UDP endpoint that authenticates and decrypts client datagrams,
//! executes the requested one-shot TCP or UDP exchange, and returns the
//! target's reply encrypted to the original sender. Configuration is a small
//! YAML document, see [`config::Config`].
//!
//! ```no_run
//! use phantom_service::{config::Config, run_server};
//!
//! # async fn docs() {
//! let config = Config::load_from_file("config.yaml").unwrap();
//! run_server(config).await.unwrap();
//! # }
//! ```

pub use self::server::run as run_server;
pub use phantom;

pub mod config;
pub mod server;
