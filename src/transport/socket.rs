//! Connected sockets and the connect job that produces them.

use crate::base::context::IoResultExt;
use crate::base::neterror::{NetError, TransportErrorKind};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use url::Url;

#[cfg(feature = "tls")]
use boring::ssl::{SslConnector, SslMethod};

/// How long to wait between connect attempts while waiting for connectivity.
pub const CONNECTIVITY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A connected socket (TCP or TLS).
#[derive(Debug)]
pub enum SocketType {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Ssl(tokio_boring::SslStream<TcpStream>),
}

impl AsyncRead for SocketType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            SocketType::Ssl(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketType {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            SocketType::Ssl(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls")]
            SocketType::Ssl(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            SocketType::Ssl(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// TCP connect followed by a TLS handshake for `https` URLs.
#[derive(Clone)]
pub struct ConnectJob {
    #[cfg(feature = "tls")]
    tls: SslConnector,
    waits_for_connectivity: bool,
}

impl ConnectJob {
    pub fn new(waits_for_connectivity: bool) -> Result<Self, NetError> {
        Ok(Self {
            #[cfg(feature = "tls")]
            tls: build_tls_connector()?,
            waits_for_connectivity,
        })
    }

    pub async fn connect(&self, url: &Url) -> Result<SocketType, NetError> {
        let host = url
            .host_str()
            .ok_or_else(|| NetError::MalformedUrl(url.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| NetError::MalformedUrl(url.to_string()))?;

        let stream = self.connect_tcp(host, port).await?;
        let _ = stream.set_nodelay(true);

        if url.scheme() == "https" {
            self.handshake(host, stream).await
        } else {
            Ok(SocketType::Tcp(stream))
        }
    }

    async fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream, NetError> {
        // Brackets are kept by `host_str` for IPv6 literals.
        let target = host.trim_start_matches('[').trim_end_matches(']');
        loop {
            match TcpStream::connect((target, port)).await.connection_context(host, port) {
                Ok(stream) => return Ok(stream),
                Err(e) if self.waits_for_connectivity => {
                    tracing::debug!(host = %host, port, error = %e, "waiting for connectivity");
                    tokio::time::sleep(CONNECTIVITY_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[cfg(feature = "tls")]
    async fn handshake(&self, host: &str, stream: TcpStream) -> Result<SocketType, NetError> {
        let config = self
            .tls
            .configure()
            .map_err(|e| NetError::transport(TransportErrorKind::Tls, e.to_string()))?;
        let tls_stream = tokio_boring::connect(config, host, stream)
            .await
            .map_err(|e| {
                tracing::debug!(host = %host, error = %e, "TLS handshake failed");
                NetError::transport(TransportErrorKind::Tls, format!("{host}: {e}"))
            })?;
        Ok(SocketType::Ssl(tls_stream))
    }

    #[cfg(not(feature = "tls"))]
    async fn handshake(&self, host: &str, _stream: TcpStream) -> Result<SocketType, NetError> {
        Err(NetError::transport(
            TransportErrorKind::Tls,
            format!("{host}: built without TLS support"),
        ))
    }
}

#[cfg(feature = "tls")]
fn build_tls_connector() -> Result<SslConnector, NetError> {
    let tls_err = |e: boring::error::ErrorStack| {
        NetError::transport(TransportErrorKind::Tls, e.to_string())
    };
    let mut builder = SslConnector::builder(SslMethod::tls()).map_err(tls_err)?;
    // Only HTTP/1.1 is spoken on these connections.
    builder.set_alpn_protos(b"\x08http/1.1").map_err(tls_err)?;
    Ok(builder.build())
}
