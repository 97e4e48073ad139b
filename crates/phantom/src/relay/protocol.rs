//! Plaintext request/response framing
//!
//! A request names a transport, a target address and an opaque payload:
//!
//! ```plain
//! +------+-----+----------+----------+------+----------+
//! | Type | Net | AddrType |   Addr   | Port |   Data   |
//! +------+-----+----------+----------+------+----------+
//! |  1   |  1  |    1     | Variable |  2   | Variable |
//! +------+-----+----------+----------+------+----------+
//! ```
//!
//! A response carries a status octet and the target's reply:
//!
//! ```plain
//! +------+--------+----------+
//! | Type | Status |   Data   |
//! +------+--------+----------+
//! |  1   |   1    | Variable |
//! +------+--------+----------+
//! ```

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::Cursor,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
};

use bytes::{Buf, BufMut, BytesMut};

pub use self::consts::{FRAME_TYPE_REQUEST, FRAME_TYPE_RESPONSE, STATUS_FORWARD_FAILED, STATUS_SUCCESS};

#[rustfmt::skip]
mod consts {
    pub const FRAME_TYPE_REQUEST:    u8 = 0x01;
    pub const FRAME_TYPE_RESPONSE:   u8 = 0x02;

    pub const NETWORK_TCP:           u8 = 0x01;
    pub const NETWORK_UDP:           u8 = 0x02;

    pub const ADDR_TYPE_IPV4:        u8 = 0x01;
    pub const ADDR_TYPE_DOMAIN_NAME: u8 = 0x03;
    pub const ADDR_TYPE_IPV6:        u8 = 0x04;

    pub const STATUS_SUCCESS:        u8 = 0x00;
    pub const STATUS_FORWARD_FAILED: u8 = 0x01;
}

/// Protocol error
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("packet too short")]
    ShortPacket,
    #[error("unknown network type {0:#x}")]
    UnknownNetwork(u8),
    #[error("address type {0:#x} not supported")]
    AddressTypeNotSupported(u8),
    #[error("address domain name must be UTF-8 encoding")]
    AddressDomainInvalidEncoding,
}

/// Target transport
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    #[inline]
    #[rustfmt::skip]
    pub fn as_u8(self) -> u8 {
        match self {
            Network::Tcp => consts::NETWORK_TCP,
            Network::Udp => consts::NETWORK_UDP,
        }
    }

    #[inline]
    #[rustfmt::skip]
    pub fn from_u8(code: u8) -> Option<Network> {
        match code {
            consts::NETWORK_TCP => Some(Network::Tcp),
            consts::NETWORK_UDP => Some(Network::Udp),
            _                   => None,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Network::Tcp => f.write_str("tcp"),
            Network::Udp => f.write_str("udp"),
        }
    }
}

/// Target address
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Socket address (IP Address)
    SocketAddress(SocketAddr),
    /// Domain name address, resolved by the forwarder
    DomainNameAddress(String, u16),
}

impl Address {
    /// Reads from a cursor
    pub fn read_cursor<T: AsRef<[u8]>>(cur: &mut Cursor<T>) -> Result<Address, Error> {
        if cur.remaining() < 1 {
            return Err(Error::ShortPacket);
        }

        let atyp = cur.get_u8();
        match atyp {
            consts::ADDR_TYPE_IPV4 => {
                if cur.remaining() < 4 + 2 {
                    return Err(Error::ShortPacket);
                }
                let addr = Ipv4Addr::from(cur.get_u32());
                let port = cur.get_u16();
                Ok(Address::SocketAddress(SocketAddr::V4(SocketAddrV4::new(addr, port))))
            }
            consts::ADDR_TYPE_IPV6 => {
                if cur.remaining() < 16 + 2 {
                    return Err(Error::ShortPacket);
                }
                let addr = Ipv6Addr::from(cur.get_u128());
                let port = cur.get_u16();
                Ok(Address::SocketAddress(SocketAddr::V6(SocketAddrV6::new(
                    addr, port, 0, 0,
                ))))
            }
            consts::ADDR_TYPE_DOMAIN_NAME => {
                if cur.remaining() < 1 {
                    return Err(Error::ShortPacket);
                }
                let domain_len = cur.get_u8() as usize;
                if domain_len == 0 || cur.remaining() < domain_len + 2 {
                    return Err(Error::ShortPacket);
                }
                let mut buf = vec![0u8; domain_len];
                cur.copy_to_slice(&mut buf);
                let port = cur.get_u16();
                let addr = String::from_utf8(buf).map_err(|_| Error::AddressDomainInvalidEncoding)?;
                Ok(Address::DomainNameAddress(addr, port))
            }
            _ => Err(Error::AddressTypeNotSupported(atyp)),
        }
    }

    /// Writes to buffer
    #[inline]
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        match *self {
            Address::SocketAddress(SocketAddr::V4(ref addr)) => {
                buf.put_u8(consts::ADDR_TYPE_IPV4);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Address::SocketAddress(SocketAddr::V6(ref addr)) => {
                buf.put_u8(consts::ADDR_TYPE_IPV6);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Address::DomainNameAddress(ref dname, port) => {
                debug_assert!(dname.len() <= u8::MAX as usize, "domain name too long");
                buf.put_u8(consts::ADDR_TYPE_DOMAIN_NAME);
                buf.put_u8(dname.len() as u8);
                buf.put_slice(dname.as_bytes());
                buf.put_u16(port);
            }
        }
    }

    /// Required buffer size for serializing
    #[inline]
    pub fn serialized_len(&self) -> usize {
        match *self {
            Address::SocketAddress(SocketAddr::V4(..)) => 1 + 4 + 2,
            Address::SocketAddress(SocketAddr::V6(..)) => 1 + 16 + 2,
            Address::DomainNameAddress(ref dname, ..) => 1 + 1 + dname.len() + 2,
        }
    }

    /// Associated port number
    pub fn port(&self) -> u16 {
        match *self {
            Address::SocketAddress(addr) => addr.port(),
            Address::DomainNameAddress(.., port) => port,
        }
    }

    /// Host part as text
    pub fn host(&self) -> String {
        match *self {
            Address::SocketAddress(ref addr) => addr.ip().to_string(),
            Address::DomainNameAddress(ref domain, ..) => domain.to_owned(),
        }
    }
}

impl Debug for Address {
    #[inline]
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Address::SocketAddress(ref addr) => write!(f, "{addr}"),
            Address::DomainNameAddress(ref addr, ref port) => write!(f, "{addr}:{port}"),
        }
    }
}

impl Display for Address {
    #[inline]
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Address::SocketAddress(ref addr) => write!(f, "{addr}"),
            Address::DomainNameAddress(ref addr, ref port) => write!(f, "{addr}:{port}"),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(s: SocketAddr) -> Address {
        Address::SocketAddress(s)
    }
}

impl From<(String, u16)> for Address {
    fn from((dn, port): (String, u16)) -> Address {
        Address::DomainNameAddress(dn, port)
    }
}

/// Parsed client request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Frame type octet, carried through but not enforced
    pub frame_type: u8,
    /// Target transport
    pub network: Network,
    /// Target address
    pub addr: Address,
    /// Opaque payload for the target, possibly empty
    pub payload: Vec<u8>,
}

impl Request {
    /// Creates a request frame
    pub fn new(network: Network, addr: Address, payload: Vec<u8>) -> Request {
        Request {
            frame_type: consts::FRAME_TYPE_REQUEST,
            network,
            addr,
            payload,
        }
    }

    /// Parses a request frame
    pub fn parse(data: &[u8]) -> Result<Request, Error> {
        // Type + Net + AddrType + Port is the smallest possible frame
        if data.len() < 5 {
            return Err(Error::ShortPacket);
        }

        let mut cur = Cursor::new(data);

        let frame_type = cur.get_u8();

        let network = cur.get_u8();
        let network = Network::from_u8(network).ok_or(Error::UnknownNetwork(network))?;

        let addr = Address::read_cursor(&mut cur)?;

        let payload = data[cur.position() as usize..].to_vec();

        Ok(Request {
            frame_type,
            network,
            addr,
            payload,
        })
    }

    /// Writes to buffer
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.frame_type);
        buf.put_u8(self.network.as_u8());
        self.addr.write_to_buf(buf);
        buf.put_slice(&self.payload);
    }

    /// Required buffer size for serializing
    pub fn serialized_len(&self) -> usize {
        1 + 1 + self.addr.serialized_len() + self.payload.len()
    }

    /// Serializes into a fresh byte vector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.write_to_buf(&mut buf);
        buf.to_vec()
    }
}

/// Server response frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Frame type octet
    pub frame_type: u8,
    /// `STATUS_SUCCESS`, or a non-zero error code
    pub status: u8,
    /// The target's reply, empty on error
    pub payload: Vec<u8>,
}

impl Response {
    /// Creates a success response carrying the target's reply
    pub fn new(payload: Vec<u8>) -> Response {
        Response {
            frame_type: consts::FRAME_TYPE_RESPONSE,
            status: consts::STATUS_SUCCESS,
            payload,
        }
    }

    /// Creates an error response with the given status code
    pub fn error(status: u8) -> Response {
        Response {
            frame_type: consts::FRAME_TYPE_RESPONSE,
            status,
            payload: Vec::new(),
        }
    }

    /// Parses a response frame
    pub fn parse(data: &[u8]) -> Result<Response, Error> {
        if data.len() < 2 {
            return Err(Error::ShortPacket);
        }

        Ok(Response {
            frame_type: data[0],
            status: data[1],
            payload: data[2..].to_vec(),
        })
    }

    /// Serializes into a fresh byte vector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(2 + self.payload.len());
        buf.put_u8(self.frame_type);
        buf.put_u8(self.status);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }
}
