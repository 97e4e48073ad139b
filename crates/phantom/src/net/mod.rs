//! Network wrappers

pub use self::udp::create_inbound_udp_socket;

pub mod udp;
