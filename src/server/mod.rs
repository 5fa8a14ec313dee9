use crate::domain::{AddressError, Scheme, SocketAddress};
use crate::parser::{self, RawMessage};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid bind address: {0}")]
    Address(#[from] AddressError),
    #[error("unable to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Receives each decoded syslog message. Implemented by the forwarder;
/// tests substitute a capturing handler.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: RawMessage) -> impl Future<Output = ()> + Send;
}

/// Syslog-compatible server over TCP (newline-delimited streams) or UDP
/// (one datagram per message), selected by the bind address scheme.
///
/// Decode failures are swallowed here: a line that produces no message never
/// reaches the handler. TCP connections are served concurrently; lines
/// within one connection are handled in order.
pub struct SyslogServer {
    local_addr: SocketAddr,
    join: JoinHandle<()>,
}

impl SyslogServer {
    pub async fn start<H: MessageHandler>(
        bind_address: &str,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> Result<Self, ServerError> {
        let parsed = SocketAddress::parse(bind_address)?;
        let bind_err = |source| ServerError::Bind {
            address: bind_address.to_string(),
            source,
        };
        match parsed.scheme {
            Scheme::Tcp => {
                let listener = TcpListener::bind(&parsed.host).await.map_err(bind_err)?;
                let local_addr = listener.local_addr().map_err(bind_err)?;
                debug!(%local_addr, "syslog server listening on tcp");
                let join = tokio::spawn(accept_loop(listener, handler, cancel));
                Ok(Self { local_addr, join })
            }
            Scheme::Udp => {
                let socket = UdpSocket::bind(&parsed.host).await.map_err(bind_err)?;
                let local_addr = socket.local_addr().map_err(bind_err)?;
                debug!(%local_addr, "syslog server listening on udp");
                let join = tokio::spawn(datagram_loop(socket, handler, cancel));
                Ok(Self { local_addr, join })
            }
        }
    }

    /// Address actually bound; differs from the configured one when port 0
    /// was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the receive loops to finish after cancellation, bounded by
    /// `timeout`. In-flight messages get a chance to complete; a hung write
    /// cannot stall shutdown forever.
    pub async fn drain(self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.join).await.is_err() {
            warn!("timed out draining syslog server");
        }
    }
}

async fn accept_loop<H: MessageHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted syslog connection");
                    connections.spawn(read_lines(stream, handler.clone(), cancel.clone()));
                }
                Err(err) => {
                    warn!(error = %err, "error accepting syslog connection");
                }
            },
        }
    }
    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn read_lines<H: MessageHandler>(
    stream: TcpStream,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => {
                    if let Some(message) = parser::parse_message(&line) {
                        handler.handle(message).await;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "error reading syslog stream");
                    break;
                }
            },
        }
    }
}

async fn datagram_loop<H: MessageHandler>(
    socket: UdpSocket,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _peer)) => {
                    let datagram = String::from_utf8_lossy(&buf[..len]);
                    if let Some(message) = parser::parse_message(&datagram) {
                        handler.handle(message).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "error receiving syslog datagram");
                }
            },
        }
    }
}
