pub mod event;

pub use event::{AppLogRecord, LogEvent};

use crate::parser::RawMessage;
use crate::resolver::{ContainerRuntime, Resolver};
use crate::sender::{SinkError, SinkSet};
use crate::server::{MessageHandler, ServerError, SyslogServer};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("forwarder already started")]
    AlreadyStarted,
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Immutable configuration for one forwarder instance.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// `tcp://host:port` or `udp://host:port`.
    pub bind_address: String,
    /// Raw line-sink destinations, same scheme syntax.
    pub forward_addresses: Vec<String>,
    /// Control-plane URL; enables the managed sink when set.
    pub managed_endpoint: Option<String>,
    pub app_name_env_var: String,
    pub process_name_env_var: String,
    pub cache_capacity: usize,
    pub write_timeout: Duration,
    pub drain_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            bind_address: "udp://0.0.0.0:1514".to_string(),
            forward_addresses: Vec::new(),
            managed_endpoint: None,
            app_name_env_var: "TSURU_APPNAME=".to_string(),
            process_name_env_var: "TSURU_PROCESSNAME=".to_string(),
            cache_capacity: 100,
            write_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Per-message pipeline: source id → identity → validation → fan-out.
/// Shared between the listener and the forwarder facade.
pub struct Pipeline<R> {
    resolver: Resolver<R>,
    sinks: SinkSet,
}

impl<R: ContainerRuntime> Pipeline<R> {
    async fn handle_message(&self, raw: RawMessage) {
        let Some(source_id) = raw.source_id().map(str::to_string) else {
            warn!("ignoring message without container id or hostname");
            return;
        };
        let identity = match self.resolver.resolve(&source_id).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(%source_id, error = %err, "ignoring message, could not resolve identity");
                return;
            }
        };
        let Some(event) = LogEvent::build(raw, source_id.clone(), identity) else {
            warn!(%source_id, "ignoring invalid message: timestamp, priority and content are required");
            return;
        };
        self.sinks.dispatch(&event).await;
    }
}

impl<R: ContainerRuntime> MessageHandler for Pipeline<R> {
    fn handle(&self, message: RawMessage) -> impl Future<Output = ()> + Send {
        self.handle_message(message)
    }
}

struct Active<R> {
    pipeline: Arc<Pipeline<R>>,
    server: SyslogServer,
}

/// The forwarding daemon core. Owns the identity cache and the sink set for
/// its lifetime; single-shot lifecycle
/// `Created → Starting → Running → Stopping → Stopped`.
pub struct Forwarder<R> {
    config: ForwarderConfig,
    runtime: R,
    state: State,
    active: Option<Active<R>>,
    cancel: CancellationToken,
}

impl<R: ContainerRuntime + Clone> Forwarder<R> {
    pub fn new(config: ForwarderConfig, runtime: R) -> Self {
        Self {
            config,
            runtime,
            state: State::Created,
            active: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Opens the managed sink (if configured) and every raw sink, builds the
    /// identity cache and binds the listener, in that order. Any failure
    /// aborts startup, drops whatever was opened and leaves the forwarder in
    /// its initial state.
    pub async fn start(&mut self) -> Result<(), ForwardError> {
        if self.state != State::Created {
            return Err(ForwardError::AlreadyStarted);
        }
        self.state = State::Starting;
        match self.start_components().await {
            Ok(active) => {
                info!(
                    bind = %self.config.bind_address,
                    raw_sinks = active.pipeline.sinks.raw_count(),
                    managed = active.pipeline.sinks.has_managed(),
                    "log forwarder running"
                );
                self.active = Some(active);
                self.state = State::Running;
                Ok(())
            }
            Err(err) => {
                self.state = State::Created;
                Err(err)
            }
        }
    }

    async fn start_components(&self) -> Result<Active<R>, ForwardError> {
        let sinks = SinkSet::connect(
            &self.config.forward_addresses,
            self.config.managed_endpoint.as_deref(),
            self.config.write_timeout,
        )
        .await?;
        let resolver = Resolver::new(
            self.runtime.clone(),
            self.config.cache_capacity,
            self.config.app_name_env_var.as_str(),
            self.config.process_name_env_var.as_str(),
        );
        let pipeline = Arc::new(Pipeline { resolver, sinks });
        let server = SyslogServer::start(
            &self.config.bind_address,
            pipeline.clone(),
            self.cancel.clone(),
        )
        .await?;
        Ok(Active { pipeline, server })
    }

    /// Stops accepting, drains in-flight processing (bounded by the drain
    /// timeout), then closes the managed and raw connections. A no-op when
    /// the forwarder was never started or is already stopped.
    pub async fn stop(&mut self) {
        if self.state != State::Running {
            return;
        }
        self.state = State::Stopping;
        self.cancel.cancel();
        if let Some(active) = self.active.take() {
            active.server.drain(self.config.drain_timeout).await;
            active.pipeline.sinks.close(self.config.drain_timeout).await;
        }
        self.state = State::Stopped;
        info!("log forwarder stopped");
    }

    /// Feeds one already-decoded message through the pipeline. The listener
    /// uses the pipeline directly; this entry point exists for callers that
    /// decode elsewhere.
    pub async fn handle(&self, message: RawMessage) {
        if let Some(active) = &self.active {
            active.pipeline.handle_message(message).await;
        }
    }

    /// Bound listener address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(|a| a.server.local_addr())
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }
}
