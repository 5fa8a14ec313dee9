use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("address {0:?} has no scheme, expected tcp://host:port or udp://host:port")]
    MissingScheme(String),
    #[error("invalid protocol {scheme:?} in {address:?}, expected tcp or udp")]
    UnsupportedScheme { scheme: String, address: String },
    #[error("address {0:?} has an empty host")]
    EmptyHost(String),
}

/// Transports accepted for bind and forward addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Udp,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Tcp => write!(f, "tcp"),
            Scheme::Udp => write!(f, "udp"),
        }
    }
}

/// A `tcp://host:port` or `udp://host:port` address. Any other scheme is
/// refused at parse time, which makes misconfiguration fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAddress {
    pub scheme: Scheme,
    pub host: String,
}

impl SocketAddress {
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let Some((scheme, host)) = address.split_once("://") else {
            return Err(AddressError::MissingScheme(address.to_string()));
        };
        let scheme = match scheme {
            "tcp" => Scheme::Tcp,
            "udp" => Scheme::Udp,
            other => {
                return Err(AddressError::UnsupportedScheme {
                    scheme: other.to_string(),
                    address: address.to_string(),
                });
            }
        };
        if host.is_empty() {
            return Err(AddressError::EmptyHost(address.to_string()));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
        })
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}
