use super::SinkError;
use crate::forwarder::event::AppLogRecord;
use futures::SinkExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::error;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The managed structured-record stream to the control plane.
///
/// The connection lives behind one async mutex: writes and reconnects happen
/// under the same lock, so a reconnect can never race an in-flight write and
/// records from concurrent handlers are serialized onto the stream.
pub struct ManagedSink {
    url: String,
    write_timeout: Duration,
    conn: Mutex<WsStream>,
}

impl ManagedSink {
    /// Derives `ws://<host>/logs` from the control-plane endpoint and opens
    /// the stream. A failure here is fatal to startup.
    pub async fn connect(endpoint: &str, write_timeout: Duration) -> Result<Self, SinkError> {
        let url = logs_url(endpoint)?;
        let conn = dial(&url).await?;
        Ok(Self {
            url,
            write_timeout,
            conn: Mutex::new(conn),
        })
    }

    /// Writes one structured record. On failure: log, reconnect once, retry
    /// once; a second failure drops the record for this sink only, leaving
    /// the connection for the next message to retry.
    pub async fn send(&self, record: &AppLogRecord<'_>) {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "unable to encode log record");
                return;
            }
        };
        let mut conn = self.conn.lock().await;
        if let Err(err) = self.write(&mut conn, payload.clone()).await {
            error!(error = %err, "error writing to managed sink");
            match dial(&self.url).await {
                Ok(fresh) => {
                    *conn = fresh;
                    if let Err(err) = self.write(&mut conn, payload).await {
                        error!(error = %err, "error writing to managed sink after reconnect");
                    }
                }
                Err(err) => {
                    error!(error = %err, "unable to reconnect managed sink");
                }
            }
        }
    }

    async fn write(&self, conn: &mut WsStream, payload: String) -> Result<(), SinkError> {
        match timeout(self.write_timeout, conn.send(Message::Text(payload.into()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SinkError::ManagedWrite(err)),
            Err(_) => Err(SinkError::WriteTimeout(self.write_timeout)),
        }
    }

    pub async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if let Err(err) = conn.close(None).await {
            error!(error = %err, "error closing managed sink");
        }
    }
}

fn logs_url(endpoint: &str) -> Result<String, SinkError> {
    let parsed = Url::parse(endpoint)
        .map_err(|err| SinkError::ManagedEndpoint(format!("unable to parse {endpoint:?}: {err}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| SinkError::ManagedEndpoint(format!("{endpoint:?} has no host")))?;
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(format!("ws://{authority}/logs"))
}

async fn dial(url: &str) -> Result<WsStream, SinkError> {
    let (stream, _) = connect_async(url).await.map_err(|source| SinkError::ManagedConnect {
        url: url.to_string(),
        source,
    })?;
    Ok(stream)
}
