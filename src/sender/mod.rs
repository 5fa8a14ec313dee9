pub mod managed;
pub mod raw;

pub use managed::ManagedSink;
pub use raw::RawSink;

use crate::domain::AddressError;
use crate::forwarder::event::LogEvent;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("invalid sink address: {0}")]
    Address(#[from] AddressError),
    #[error("unable to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid managed endpoint: {0}")]
    ManagedEndpoint(String),
    #[error("unable to connect managed sink at {url}: {source}")]
    ManagedConnect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("managed sink write failed: {0}")]
    ManagedWrite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("managed sink write timed out after {0:?}")]
    WriteTimeout(Duration),
}

/// The set of configured destinations: at most one managed stream plus any
/// number of raw line sinks. Owned by the forwarder for its lifetime.
pub struct SinkSet {
    managed: Option<ManagedSink>,
    raw: Vec<RawSink>,
}

impl SinkSet {
    /// Opens every configured destination. Failure on any one aborts
    /// startup; partially opened connections close on drop.
    pub async fn connect(
        forward_addresses: &[String],
        managed_endpoint: Option<&str>,
        write_timeout: Duration,
    ) -> Result<Self, SinkError> {
        let managed = match managed_endpoint {
            Some(endpoint) => Some(ManagedSink::connect(endpoint, write_timeout).await?),
            None => None,
        };
        let mut raw = Vec::with_capacity(forward_addresses.len());
        for address in forward_addresses {
            raw.push(RawSink::connect(address).await?);
        }
        Ok(Self { managed, raw })
    }

    /// Fans one event out. The line form is queued to every raw sink first
    /// (no waiting for delivery), then the structured record goes to the
    /// managed sink in the caller's task, bounded by its write timeout. No
    /// sink's failure or slowness reaches another sink.
    pub async fn dispatch(&self, event: &LogEvent) {
        if !self.raw.is_empty() {
            let line = Bytes::from(event.line());
            for sink in &self.raw {
                sink.enqueue(line.clone());
            }
        }
        if let Some(managed) = &self.managed {
            managed.send(&event.record()).await;
        }
    }

    /// Closes the managed stream, then drains and closes every raw sink.
    pub async fn close(&self, drain_timeout: Duration) {
        if let Some(managed) = &self.managed {
            managed.close().await;
        }
        for sink in &self.raw {
            sink.close(drain_timeout).await;
        }
    }

    pub fn raw_count(&self) -> usize {
        self.raw.len()
    }

    pub fn has_managed(&self) -> bool {
        self.managed.is_some()
    }
}
