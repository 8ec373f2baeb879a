//! Shared plumbing for establishing TLS/WS/WSS streams over a TCP socket.
//!
//! Every socket type's `connect_tls`/`bind_tls`/`connect_ws`/`bind_ws`/
//! `connect_wss`/`bind_wss` constructors go through these helpers rather
//! than repeating the `TcpStream::connect` + handshake dance per socket
//! type — the same way `zlink_core::tcp::enable_tcp_nodelay` is shared
//! instead of duplicated.

use compio::net::TcpStream;
use std::io;

use zlink_core::options::SocketOptions;

use crate::tls::{self, TlsStream};
use crate::ws::{self, WsStream};

/// Establish the client side of a `tls://` connection.
pub(crate) async fn connect_tls(
    addr: &str,
    options: &SocketOptions,
) -> io::Result<TlsStream<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    let _ = zlink_core::tcp::enable_tcp_nodelay(&stream);
    let config = tls::build_client_config(options)?;
    let hostname = options
        .tls_hostname
        .clone()
        .unwrap_or_else(|| host_of(addr));
    let server_name = rustls::pki_types::ServerName::try_from(hostname)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    tls::connect(stream, config, server_name).await
}

/// Complete the server side of a `tls://` connection over an already
/// accepted TCP stream.
pub(crate) async fn accept_tls(
    stream: TcpStream,
    options: &SocketOptions,
) -> io::Result<TlsStream<TcpStream>> {
    let config = tls::build_server_config(options)?;
    tls::accept(stream, config).await
}

/// Establish the client side of a `ws://` connection.
pub(crate) async fn connect_ws(addr: &str, path: &str) -> io::Result<WsStream<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    let _ = zlink_core::tcp::enable_tcp_nodelay(&stream);
    ws::connect(stream, &host_of(addr), path).await
}

/// Complete the server side of a `ws://` connection over an already
/// accepted TCP stream.
pub(crate) async fn accept_ws(stream: TcpStream) -> io::Result<WsStream<TcpStream>> {
    ws::accept(stream).await
}

/// Establish the client side of a `wss://` connection: TLS first, then the
/// WS upgrade handshake over the encrypted stream.
pub(crate) async fn connect_wss(
    addr: &str,
    path: &str,
    options: &SocketOptions,
) -> io::Result<WsStream<TlsStream<TcpStream>>> {
    let tls_stream = connect_tls(addr, options).await?;
    ws::connect(tls_stream, &host_of(addr), path).await
}

/// Complete the server side of a `wss://` connection over an already
/// accepted TCP stream.
pub(crate) async fn accept_wss(
    stream: TcpStream,
    options: &SocketOptions,
) -> io::Result<WsStream<TlsStream<TcpStream>>> {
    let tls_stream = accept_tls(stream, options).await?;
    ws::accept(tls_stream).await
}

/// Strip the `:port` suffix off a `host:port` string for use as a TLS
/// server name / WS `Host` header when no explicit `tls_hostname` is set.
fn host_of(addr: &str) -> String {
    addr.rsplit_once(':')
        .map_or_else(|| addr.to_string(), |(host, _)| host.to_string())
}
