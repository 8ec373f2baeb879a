//! Endpoint abstraction for transport-agnostic socket addressing.
//!
//! Provides unified addressing for TCP, IPC, TLS, WS, WSS and in-process
//! transports with parsing support (§6.1).

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// A Unix-domain-socket address, covering the three `ipc://` forms this
/// crate supports: a filesystem path, a Linux abstract-namespace name
/// (`ipc://@name`), and a system-chosen path requested with `ipc://*`
/// (resolved into a concrete path at bind time and surfaced via
/// `last_endpoint`).
#[cfg(unix)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IpcAddr {
    /// A concrete filesystem path.
    Path(PathBuf),
    /// Linux abstract-namespace address (no filesystem entry).
    Abstract(String),
    /// `ipc://*` — caller asks the transport to pick a path.
    Wildcard,
}

#[cfg(unix)]
impl fmt::Display for IpcAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Abstract(name) => write!(f, "@{name}"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// A TCP port specifier: either a concrete port or a wildcard (`*`) that
/// asks the OS to pick an ephemeral port, resolved at bind time into
/// `last_endpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// A concrete port number.
    Fixed(u16),
    /// `tcp://host:*` — let the OS choose a port.
    Wildcard,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(p) => write!(f, "{p}"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP transport: `tcp://host:port` (port may be `*`).
    Tcp(SocketAddr),
    /// TCP bind request carrying a wildcard port, before resolution.
    TcpWildcard { host: String, port: Port },
    /// IPC transport (Unix domain socket): `ipc:///path/to/socket`,
    /// `ipc://@abstract-name`, or `ipc://*`.
    #[cfg(unix)]
    Ipc(IpcAddr),
    /// In-process transport: `inproc://name`
    Inproc(String),
    /// TLS transport: `tls://host:port` — a TCP byte stream wrapped in a
    /// TLS session per socket-option-configured credentials (§6.1, §6.2).
    Tls(SocketAddr),
    /// Plaintext WebSocket transport: `ws://host:port/path`.
    Ws { addr: SocketAddr, path: String },
    /// WebSocket-over-TLS transport: `wss://host:port/path`.
    Wss { addr: SocketAddr, path: String },
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`
    /// - `tcp://[::1]:5555` (IPv6)
    /// - `ipc:///tmp/socket.sock` (Unix only)
    /// - `inproc://name`
    ///
    /// # Examples
    ///
    /// ```
    /// use zlink_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Tcp(_)));
    ///
    /// # #[cfg(unix)]
    /// # {
    /// let endpoint = Endpoint::parse("ipc:///tmp/test.sock").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Ipc(_)));
    /// # }
    ///
    /// let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Inproc(_)));
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if this is a TCP endpoint.
    pub fn is_tcp(&self) -> bool {
        matches!(self, Endpoint::Tcp(_) | Endpoint::TcpWildcard { .. })
    }

    /// Returns true if this is an IPC endpoint.
    #[cfg(unix)]
    pub fn is_ipc(&self) -> bool {
        matches!(self, Endpoint::Ipc(_))
    }

    /// Returns true if this is an inproc endpoint.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }

    /// Returns true if this transport requires a TLS session (`tls://`,
    /// `wss://`).
    pub fn is_tls(&self) -> bool {
        matches!(self, Endpoint::Tls(_) | Endpoint::Wss { .. })
    }

    /// Returns true if this is a WebSocket transport (`ws://` or `wss://`).
    pub fn is_ws(&self) -> bool {
        matches!(self, Endpoint::Ws { .. } | Endpoint::Wss { .. })
    }

    /// Parse a `host:port` string where `port` may be the literal `*`
    /// (wildcard), returning the host and a [`Port`].
    fn parse_host_port(addr: &str) -> Result<(String, Port), EndpointError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::InvalidTcpAddress(addr.to_string()))?;
        if port == "*" {
            Ok((host.to_string(), Port::Wildcard))
        } else {
            let port: u16 = port
                .parse()
                .map_err(|_| EndpointError::InvalidTcpAddress(addr.to_string()))?;
            Ok((host.to_string(), Port::Fixed(port)))
        }
    }

    fn parse_ws_target(rest: &str) -> Result<(String, Port, String), EndpointError> {
        let (authority, path) = rest.find('/').map_or((rest, "/"), |idx| {
            (&rest[..idx], &rest[idx..])
        });
        let (host, port) = Self::parse_host_port(authority)?;
        Ok((host, port, path.to_string()))
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            match Self::parse_host_port(addr)? {
                (host, Port::Fixed(port)) => {
                    let socket_addr = format!("{host}:{port}")
                        .parse::<SocketAddr>()
                        .map_err(|_| EndpointError::InvalidTcpAddress(addr.to_string()))?;
                    Ok(Endpoint::Tcp(socket_addr))
                }
                (host, port @ Port::Wildcard) => Ok(Endpoint::TcpWildcard { host, port }),
            }
        } else if let Some(addr) = s.strip_prefix("tls://") {
            let socket_addr = addr
                .parse::<SocketAddr>()
                .map_err(|_| EndpointError::InvalidTcpAddress(addr.to_string()))?;
            Ok(Endpoint::Tls(socket_addr))
        } else if let Some(rest) = s.strip_prefix("wss://") {
            let (host, port, path) = Self::parse_ws_target(rest)?;
            let Port::Fixed(port) = port else {
                return Err(EndpointError::InvalidTcpAddress(rest.to_string()));
            };
            let addr = format!("{host}:{port}")
                .parse::<SocketAddr>()
                .map_err(|_| EndpointError::InvalidTcpAddress(rest.to_string()))?;
            Ok(Endpoint::Wss { addr, path })
        } else if let Some(rest) = s.strip_prefix("ws://") {
            let (host, port, path) = Self::parse_ws_target(rest)?;
            let Port::Fixed(port) = port else {
                return Err(EndpointError::InvalidTcpAddress(rest.to_string()));
            };
            let addr = format!("{host}:{port}")
                .parse::<SocketAddr>()
                .map_err(|_| EndpointError::InvalidTcpAddress(rest.to_string()))?;
            Ok(Endpoint::Ws { addr, path })
        } else if let Some(path) = s.strip_prefix("ipc://") {
            #[cfg(unix)]
            {
                if path == "*" {
                    Ok(Endpoint::Ipc(IpcAddr::Wildcard))
                } else if let Some(name) = path.strip_prefix('@') {
                    Ok(Endpoint::Ipc(IpcAddr::Abstract(name.to_string())))
                } else {
                    Ok(Endpoint::Ipc(IpcAddr::Path(PathBuf::from(path))))
                }
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                Err(EndpointError::IpcNotSupported)
            }
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::TcpWildcard { host, port } => write!(f, "tcp://{host}:{port}"),
            #[cfg(unix)]
            Endpoint::Ipc(addr) => write!(f, "ipc://{addr}"),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
            Endpoint::Tls(addr) => write!(f, "tls://{addr}"),
            Endpoint::Ws { addr, path } => write!(f, "ws://{addr}{path}"),
            Endpoint::Wss { addr, path } => write!(f, "wss://{addr}{path}"),
        }
    }
}

/// Errors that can occur when parsing or using endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://, ipc://, or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),

    #[error("IPC transport not supported on this platform")]
    IpcNotSupported,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_ipv4() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn test_parse_tcp_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_ipc() {
        let endpoint = Endpoint::parse("ipc:///tmp/test.sock").unwrap();
        assert!(matches!(endpoint, Endpoint::Ipc(_)));
        assert_eq!(endpoint.to_string(), "ipc:///tmp/test.sock");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Endpoint::parse("http://127.0.0.1:5555");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn test_invalid_tcp_address() {
        let result = Endpoint::parse("tcp://invalid:port");
        assert!(matches!(result, Err(EndpointError::InvalidTcpAddress(_))));
    }

    #[test]
    fn test_parse_inproc() {
        let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
        assert!(matches!(endpoint, Endpoint::Inproc(_)));
        assert_eq!(endpoint.to_string(), "inproc://my-endpoint");
    }

    #[test]
    fn test_invalid_inproc_empty() {
        let result = Endpoint::parse("inproc://");
        assert!(matches!(result, Err(EndpointError::InvalidInprocName(_))));
    }

    #[test]
    fn test_parse_tls() {
        let endpoint = Endpoint::parse("tls://127.0.0.1:5556").unwrap();
        assert!(matches!(endpoint, Endpoint::Tls(_)));
        assert!(endpoint.is_tls());
        assert_eq!(endpoint.to_string(), "tls://127.0.0.1:5556");
    }

    #[test]
    fn test_parse_ws() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:5557/feed").unwrap();
        assert!(matches!(endpoint, Endpoint::Ws { .. }));
        assert!(endpoint.is_ws());
        assert_eq!(endpoint.to_string(), "ws://127.0.0.1:5557/feed");
    }

    #[test]
    fn test_parse_ws_default_path() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:5557").unwrap();
        match endpoint {
            Endpoint::Ws { path, .. } => assert_eq!(path, "/"),
            _ => panic!("expected Ws endpoint"),
        }
    }

    #[test]
    fn test_parse_wss() {
        let endpoint = Endpoint::parse("wss://127.0.0.1:5558/feed").unwrap();
        assert!(matches!(endpoint, Endpoint::Wss { .. }));
        assert!(endpoint.is_tls());
        assert!(endpoint.is_ws());
    }

    #[test]
    fn test_parse_tcp_wildcard_port() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:*").unwrap();
        assert!(matches!(endpoint, Endpoint::TcpWildcard { .. }));
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:*");
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_ipc_abstract() {
        let endpoint = Endpoint::parse("ipc://@my-socket").unwrap();
        match endpoint {
            Endpoint::Ipc(IpcAddr::Abstract(name)) => assert_eq!(name, "my-socket"),
            _ => panic!("expected abstract ipc endpoint"),
        }
        assert_eq!(endpoint.to_string(), "ipc://@my-socket");
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_ipc_wildcard() {
        let endpoint = Endpoint::parse("ipc://*").unwrap();
        assert!(matches!(endpoint, Endpoint::Ipc(IpcAddr::Wildcard)));
    }
}
