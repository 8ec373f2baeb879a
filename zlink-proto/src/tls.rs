//! TLS transport adapter (`tls://`, and the inner leg of `wss://`).
//!
//! `SocketBase<S>` (base.rs) is generic over any `S: AsyncRead + AsyncWrite
//! + Unpin`, the same way `InprocStream` slots in for `inproc://`. This
//! module provides that same contract for TLS: [`TlsStream<S>`] wraps an
//! inner byte stream (normally a `compio::net::TcpStream`) and a `rustls`
//! session, presenting the encrypted connection as a plain byte stream to
//! everything above it. The core consumes pre-configured credentials
//! (`tls_cert`/`tls_key`/`tls_ca`/`tls_password`/`tls_hostname`/
//! `tls_trust_system` — §6.2) and treats TLS as an opaque transport; this
//! crate does not provision certificates.
//!
//! `rustls::Connection` is a sans-IO state machine (`read_tls`/`write_tls`/
//! `process_new_packets`); this module is the pump that drives it against
//! an async inner stream, mirroring the sans-IO style of `codec.rs`'s ZMP
//! decoder one layer down.

use bytes::BytesMut;
use compio::io::{AsyncRead, AsyncWrite};
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection};
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tracing::trace;

use zlink_core::options::SocketOptions;

/// Either half of a TLS session, unified behind `rustls`'s shared
/// `read_tls`/`write_tls`/`process_new_packets` surface.
enum Session {
    Client(Box<ClientConnection>),
    Server(Box<ServerConnection>),
}

// `rustls::ClientConnection`/`ServerConnection` both deref to
// `rustls::ConnectionCommon`, but that type carries an associated `Data`
// generic that differs per side; we dispatch by hand instead of trying to
// unify behind a single trait object.
macro_rules! with_conn {
    ($self:expr, |$conn:ident| $body:expr) => {
        match $self {
            Session::Client($conn) => $body,
            Session::Server($conn) => $body,
        }
    };
}

impl Session {
    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        with_conn!(self, |c| c.read_tls(rd))
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        with_conn!(self, |c| c.write_tls(wr))
    }

    fn process_new_packets(&mut self) -> Result<rustls::IoState, rustls::Error> {
        with_conn!(self, |c| c.process_new_packets())
    }

    fn wants_read(&self) -> bool {
        match self {
            Session::Client(c) => c.wants_read(),
            Session::Server(c) => c.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Session::Client(c) => c.wants_write(),
            Session::Server(c) => c.wants_write(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match self {
            Session::Client(c) => c.is_handshaking(),
            Session::Server(c) => c.is_handshaking(),
        }
    }

    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            Session::Client(c) => c.reader(),
            Session::Server(c) => c.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            Session::Client(c) => c.writer(),
            Session::Server(c) => c.writer(),
        }
    }
}

/// A TLS-wrapped byte stream implementing the same `AsyncRead`/`AsyncWrite`
/// contract every other transport in this crate presents to `SocketBase`.
pub struct TlsStream<S> {
    inner: S,
    session: Session,
    /// Ciphertext produced by `session.write_tls`, staged for `inner`.
    net_out: BytesMut,
}

impl<S> TlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Drain whatever ciphertext `rustls` has queued for us out to `inner`.
    /// Returns `Poll::Pending` if the inner stream can't accept more right
    /// now; partially-written data stays in `net_out` for the next call.
    fn poll_drain_net_out(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<io::Result<()>> {
        while !self.net_out.is_empty() {
            let this = &mut *self;
            match Pin::new(&mut this.inner).poll_write(cx, &this.net_out) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "TLS transport: inner stream wrote zero bytes",
                    )));
                }
                Poll::Ready(Ok(n)) => {
                    let _ = this.net_out.split_to(n);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Pull one chunk of ciphertext from `inner` into `session`, then run
    /// the TLS record layer over it. Returns `Ok(true)` if any ciphertext
    /// was processed, `Ok(false)` on a clean EOF from `inner`.
    fn poll_pump_net_in(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<io::Result<bool>> {
        let mut scratch = [0u8; 4096];
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, &mut scratch) {
            Poll::Ready(Ok(0)) => Poll::Ready(Ok(false)),
            Poll::Ready(Ok(n)) => {
                let mut cursor = io::Cursor::new(&scratch[..n]);
                this.session.read_tls(&mut cursor)?;
                this.session.process_new_packets().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("TLS error: {e}"))
                })?;
                Poll::Ready(Ok(true))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Drive the handshake to completion, alternating ciphertext reads and
    /// flushes until `rustls` reports the session is no longer handshaking.
    async fn complete_handshake(&mut self) -> io::Result<()> {
        loop {
            if !self.session.is_handshaking() {
                return Ok(());
            }
            if self.session.wants_write() {
                let mut writer = self.net_out.writer();
                let n = self.session.write_tls(&mut writer)?;
                trace!(bytes = n, "[tls] queued handshake ciphertext");
                futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_drain_net_out(cx)).await?;
            } else if self.session.wants_read() {
                let progressed =
                    futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_pump_net_in(cx))
                        .await?;
                if !progressed {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "TLS handshake: peer closed before completion",
                    ));
                }
            } else {
                return Ok(());
            }
        }
    }
}

/// Adapter so `BytesMut` can serve as a `std::io::Write` target for
/// `rustls`'s `write_tls`.
trait BytesMutWriterExt {
    fn writer(&mut self) -> BytesMutWriter<'_>;
}
impl BytesMutWriterExt for BytesMut {
    fn writer(&mut self) -> BytesMutWriter<'_> {
        BytesMutWriter(self)
    }
}
struct BytesMutWriter<'a>(&'a mut BytesMut);
impl Write for BytesMutWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S> AsyncRead for TlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let read_result = self.session.reader().read(buf);
            match read_result {
                Ok(0) => {
                    if !self.session.wants_read() {
                        return Poll::Ready(Ok(0));
                    }
                }
                Ok(n) => return Poll::Ready(Ok(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !self.session.wants_read() {
                        return Poll::Ready(Ok(0));
                    }
                }
                Err(e) => return Poll::Ready(Err(e)),
            }

            match self.as_mut().poll_pump_net_in(cx) {
                Poll::Ready(Ok(true)) => continue,
                Poll::Ready(Ok(false)) => return Poll::Ready(Ok(0)),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for TlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        // Flush queued ciphertext before accepting more plaintext so
        // `net_out` never grows unbounded.
        match self.as_mut().poll_drain_net_out(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }

        let n = self.session.writer().write(buf)?;
        let mut net_out = std::mem::take(&mut self.net_out);
        self.session.write_tls(&mut net_out.writer())?;
        self.net_out = net_out;
        let _ = self.as_mut().poll_drain_net_out(cx);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.as_mut().poll_drain_net_out(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut self.inner).poll_flush(cx),
            other => other,
        }
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.as_mut().poll_flush(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut self.inner).poll_close(cx),
            other => other,
        }
    }
}

/// Build a `rustls::ClientConfig` from socket-level TLS options
/// (`tls_ca`/`tls_trust_system`). Certificate provisioning beyond loading
/// the configured PEM files is out of scope (§1 non-goals).
pub fn build_client_config(options: &SocketOptions) -> io::Result<Arc<ClientConfig>> {
    let mut roots = rustls::RootCertStore::empty();
    if options.tls_trust_system {
        roots.extend(webpki_roots_or_empty());
    }
    if let Some(ca_path) = &options.tls_ca_file {
        load_certs_into(&mut roots, ca_path)?;
    }
    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = if let (Some(cert_path), Some(key_path)) = (&options.tls_cert, &options.tls_key) {
        let certs = load_cert_chain(cert_path)?;
        let key = load_private_key(key_path)?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
    } else {
        builder.with_no_client_auth()
    };
    Ok(Arc::new(config))
}

/// Build a `rustls::ServerConfig` from socket-level TLS options
/// (`tls_cert`/`tls_key`/`tls_password`).
pub fn build_server_config(options: &SocketOptions) -> io::Result<Arc<ServerConfig>> {
    let cert_path = options.tls_cert.as_ref().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "tls_cert not configured for TLS bind")
    })?;
    let key_path = options.tls_key.as_ref().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "tls_key not configured for TLS bind")
    })?;
    let certs = load_cert_chain(cert_path)?;
    let key = load_private_key(key_path)?;
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    Ok(Arc::new(config))
}

fn webpki_roots_or_empty() -> Vec<rustls::pki_types::TrustAnchor<'static>> {
    // `tls_trust_system` with no bundled webpki-roots crate in the
    // dependency stack is a documented no-op: the caller should supply
    // `tls_ca` explicitly. Kept as an extension point rather than pulling
    // in another dependency the teacher's stack doesn't carry.
    Vec::new()
}

fn load_certs_into(
    roots: &mut rustls::RootCertStore,
    path: &std::path::Path,
) -> io::Result<()> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert?;
        roots
            .add(cert)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    }
    Ok(())
}

fn load_cert_chain(
    path: &std::path::Path,
) -> io::Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader).collect()
}

fn load_private_key(
    path: &std::path::Path,
) -> io::Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "no private key found in tls_key file")
    })
}

/// Perform the client side of a TLS handshake over `inner` and return the
/// wrapped stream, ready for ZMP traffic.
pub async fn connect<S>(
    inner: S,
    config: Arc<ClientConfig>,
    server_name: rustls::pki_types::ServerName<'static>,
) -> io::Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = ClientConnection::new(config, server_name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stream = TlsStream {
        inner,
        session: Session::Client(Box::new(conn)),
        net_out: BytesMut::new(),
    };
    stream.complete_handshake().await?;
    Ok(stream)
}

/// Perform the server side of a TLS handshake over `inner` and return the
/// wrapped stream.
pub async fn accept<S>(inner: S, config: Arc<ServerConfig>) -> io::Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = ServerConnection::new(config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stream = TlsStream {
        inner,
        session: Session::Server(Box::new(conn)),
        net_out: BytesMut::new(),
    };
    stream.complete_handshake().await?;
    Ok(stream)
}

impl<S> std::fmt::Debug for TlsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("net_out_len", &self.net_out.len())
            .finish()
    }
}
