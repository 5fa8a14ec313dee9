use super::SinkError;
use crate::domain::{Scheme, SocketAddress};
use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// A best-effort line sink: one persistent connection opened at startup and
/// a dedicated writer task fed by an in-order queue. Write failures are
/// logged and the line is lost for this sink; the connection is never
/// reopened. Queueing decouples the per-message handler from sink latency
/// while keeping each sink's lines in order.
pub struct RawSink {
    address: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

enum RawConn {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl RawConn {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            RawConn::Tcp(stream) => stream.write(buf).await,
            RawConn::Udp(socket) => socket.send(buf).await,
        }
    }
}

impl RawSink {
    pub async fn connect(address: &str) -> Result<Self, SinkError> {
        let parsed = SocketAddress::parse(address)?;
        let conn = match parsed.scheme {
            Scheme::Tcp => {
                let stream = TcpStream::connect(&parsed.host).await.map_err(|source| {
                    SinkError::Connect {
                        address: address.to_string(),
                        source,
                    }
                })?;
                RawConn::Tcp(stream)
            }
            Scheme::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|source| {
                    SinkError::Connect {
                        address: address.to_string(),
                        source,
                    }
                })?;
                socket.connect(&parsed.host).await.map_err(|source| {
                    SinkError::Connect {
                        address: address.to_string(),
                        source,
                    }
                })?;
                RawConn::Udp(socket)
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(conn, rx, address.to_string()));
        Ok(Self {
            address: address.to_string(),
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Queues one rendered line. Never blocks the caller.
    pub fn enqueue(&self, line: Bytes) {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(line).is_err() {
                    warn!(sink = %self.address, "writer task gone, dropping log line");
                }
            }
            None => warn!(sink = %self.address, "sink closed, dropping log line"),
        }
    }

    /// Closes the queue and waits for the writer to drain what was already
    /// queued, bounded by `timeout`.
    pub async fn close(&self, timeout: Duration) {
        let tx = self.tx.lock().take();
        drop(tx);
        let writer = self.writer.lock().take();
        if let Some(handle) = writer
            && tokio::time::timeout(timeout, handle).await.is_err()
        {
            warn!(sink = %self.address, "timed out draining raw sink");
        }
    }
}

async fn write_loop(mut conn: RawConn, mut rx: mpsc::UnboundedReceiver<Bytes>, address: String) {
    while let Some(line) = rx.recv().await {
        match conn.write(&line).await {
            Ok(n) if n < line.len() => {
                warn!(sink = %address, "short write forwarding log line");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(sink = %address, error = %err, "error forwarding log line");
            }
        }
    }
}
