// Fan-out tests: one message, both sink classes, isolated failures.
use futures::StreamExt;
use logship::forwarder::{Forwarder, ForwarderConfig};
use logship::resolver::{ContainerRuntime, ContainerState, RuntimeError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

#[derive(Clone)]
struct FakeRuntime {
    env: Arc<HashMap<String, Vec<String>>>,
}

impl FakeRuntime {
    fn with_container(id: &str, app: &str, process: &str) -> Self {
        let mut env = HashMap::new();
        env.insert(
            id.to_string(),
            vec![
                format!("TSURU_APPNAME={app}"),
                format!("TSURU_PROCESSNAME={process}"),
            ],
        );
        Self { env: Arc::new(env) }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn inspect_env(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, RuntimeError>> + Send {
        let result = self
            .env
            .get(container_id)
            .cloned()
            .ok_or_else(|| RuntimeError::Unavailable(format!("no such container {container_id}")));
        async move { result }
    }

    fn list_all(&self) -> impl Future<Output = Result<Vec<ContainerState>, RuntimeError>> + Send {
        async move { Ok(vec![]) }
    }
}

/// Accepts ws connections and forwards every text frame into a channel.
fn spawn_ws_server(listener: TcpListener) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = tx.send(text.to_string());
                    }
                }
            });
        }
    });
    rx
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for forwarded line")
        .expect("sink connection failed");
    line
}

#[tokio::test]
async fn test_dispatch_reaches_managed_and_raw_sinks() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let mut frames = spawn_ws_server(ws_listener);

    let sink_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sink_addr = sink_listener.local_addr().unwrap();

    let mut forwarder = Forwarder::new(
        ForwarderConfig {
            bind_address: "tcp://127.0.0.1:0".to_string(),
            forward_addresses: vec![format!("tcp://{sink_addr}")],
            managed_endpoint: Some(format!("http://{ws_addr}")),
            ..ForwarderConfig::default()
        },
        FakeRuntime::with_container("abc123", "someapp", "web"),
    );
    forwarder.start().await.unwrap();

    let (sink_conn, _) = sink_listener.accept().await.unwrap();
    let mut sink = BufReader::new(sink_conn);

    let mut client = TcpStream::connect(forwarder.local_addr().unwrap())
        .await
        .unwrap();
    client
        .write_all(b"<30>2024-01-01T00:00:00Z myhost abc123[1]: both paths\n")
        .await
        .unwrap();

    assert_eq!(
        read_line(&mut sink).await,
        "<30>2024-01-01T00:00:00Z abc123 someapp[web]: both paths\n"
    );

    let frame = timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("timed out waiting for managed record")
        .expect("ws server gone");
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["Date"], "2024-01-01T00:00:00Z");
    assert_eq!(json["AppName"], "someapp");
    assert_eq!(json["Message"], "both paths");
    assert_eq!(json["Source"], "web");
    assert_eq!(json["Unit"], "abc123");

    forwarder.stop().await;
}

#[tokio::test]
async fn test_managed_failure_leaves_raw_sink_unaffected() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    // Accept the startup connection, then tear everything down so every
    // later managed write (and its reconnect) fails.
    let accept = tokio::spawn(async move {
        let (stream, _) = ws_listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    });

    let sink_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sink_addr = sink_listener.local_addr().unwrap();

    let mut forwarder = Forwarder::new(
        ForwarderConfig {
            bind_address: "tcp://127.0.0.1:0".to_string(),
            forward_addresses: vec![format!("tcp://{sink_addr}")],
            managed_endpoint: Some(format!("http://{ws_addr}")),
            write_timeout: Duration::from_secs(1),
            ..ForwarderConfig::default()
        },
        FakeRuntime::with_container("abc123", "someapp", "web"),
    );
    forwarder.start().await.unwrap();
    let server_side = accept.await.unwrap();
    drop(server_side);

    let (sink_conn, _) = sink_listener.accept().await.unwrap();
    let mut sink = BufReader::new(sink_conn);

    let mut client = TcpStream::connect(forwarder.local_addr().unwrap())
        .await
        .unwrap();
    for i in 0..3 {
        client
            .write_all(
                format!("<30>2024-01-01T00:00:00Z myhost abc123[1]: still flowing {i}\n")
                    .as_bytes(),
            )
            .await
            .unwrap();
    }

    for i in 0..3 {
        assert_eq!(
            read_line(&mut sink).await,
            format!("<30>2024-01-01T00:00:00Z abc123 someapp[web]: still flowing {i}\n")
        );
    }

    forwarder.stop().await;
}
