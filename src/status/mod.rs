use crate::resolver::{ContainerRuntime, RuntimeError};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("invalid status endpoint: {0}")]
    Endpoint(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("status endpoint rejected report: {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Control-plane base URL; the report goes to `<endpoint>/units/status`.
    pub endpoint: String,
    pub token: String,
    pub interval: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UnitStatus {
    pub id: String,
    pub status: String,
}

/// Maps a container runtime state onto the control plane's unit vocabulary.
/// A restarting container is surfaced as `error` so operators see crash
/// loops; anything not running is simply `stopped`.
pub fn derive_status(state: &str) -> &'static str {
    match state {
        "running" => "started",
        "restarting" => "error",
        _ => "stopped",
    }
}

/// Periodic fleet-status reporter: list every container (stopped ones
/// included), derive a status per unit and push the snapshot to the control
/// plane. Pure poll-then-push; report failures are logged and the loop keeps
/// going.
pub struct StatusReporter<R> {
    runtime: R,
    client: Client,
    url: Url,
    token: String,
    interval: Duration,
}

impl<R: ContainerRuntime> StatusReporter<R> {
    pub fn new(runtime: R, config: &ReporterConfig) -> Result<Self, StatusError> {
        let url = Url::parse(&format!(
            "{}/units/status",
            config.endpoint.trim_end_matches('/')
        ))
        .map_err(|err| StatusError::Endpoint(format!("{}: {err}", config.endpoint)))?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            runtime,
            client,
            url,
            token: config.token.clone(),
            interval: config.interval,
        })
    }

    /// Reports on every interval tick (including one immediately) until
    /// cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(url = %self.url, interval = ?self.interval, "status reporter running");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.report_once().await {
                        error!(error = %err, "unable to report unit status");
                    }
                }
            }
        }
        debug!("status reporter stopped");
    }

    pub async fn report_once(&self) -> Result<(), StatusError> {
        let containers = self.runtime.list_all().await?;
        let payload: Vec<UnitStatus> = containers
            .into_iter()
            .map(|c| {
                let status = derive_status(&c.state).to_string();
                UnitStatus { id: c.id, status }
            })
            .collect();
        debug!(units = payload.len(), "reporting unit status");
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::AUTHORIZATION, format!("bearer {}", self.token))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StatusError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ContainerState;
    use std::future::Future;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone)]
    struct FakeRuntime {
        containers: Vec<ContainerState>,
    }

    impl ContainerRuntime for FakeRuntime {
        fn inspect_env(
            &self,
            container_id: &str,
        ) -> impl Future<Output = Result<Vec<String>, RuntimeError>> + Send {
            let err = RuntimeError::Unavailable(container_id.to_string());
            async move { Err(err) }
        }

        fn list_all(
            &self,
        ) -> impl Future<Output = Result<Vec<ContainerState>, RuntimeError>> + Send {
            let containers = self.containers.clone();
            async move { Ok(containers) }
        }
    }

    fn state(id: &str, state: &str) -> ContainerState {
        ContainerState {
            id: id.to_string(),
            state: state.to_string(),
        }
    }

    #[test]
    fn test_derive_status_mapping() {
        assert_eq!(derive_status("running"), "started");
        assert_eq!(derive_status("restarting"), "error");
        assert_eq!(derive_status("exited"), "stopped");
        assert_eq!(derive_status("created"), "stopped");
        assert_eq!(derive_status(""), "stopped");
    }

    #[tokio::test]
    async fn test_report_posts_derived_statuses_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/units/status"))
            .and(header("Authorization", "bearer some-token"))
            .and(body_json(serde_json::json!([
                {"id": "c1", "status": "started"},
                {"id": "c2", "status": "stopped"},
                {"id": "c3", "status": "error"},
                {"id": "c4", "status": "stopped"}
            ])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let runtime = FakeRuntime {
            containers: vec![
                state("c1", "running"),
                state("c2", "exited"),
                state("c3", "restarting"),
                state("c4", "created"),
            ],
        };
        let reporter = StatusReporter::new(
            runtime,
            &ReporterConfig {
                endpoint: server.uri(),
                token: "some-token".to_string(),
                interval: Duration::from_secs(600),
                request_timeout: Duration::from_secs(5),
            },
        )
        .unwrap();

        reporter.report_once().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_report_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let reporter = StatusReporter::new(
            FakeRuntime {
                containers: vec![state("c1", "running")],
            },
            &ReporterConfig {
                endpoint: server.uri(),
                token: "t".to_string(),
                interval: Duration::from_secs(600),
                request_timeout: Duration::from_secs(5),
            },
        )
        .unwrap();

        assert!(matches!(
            reporter.report_once().await,
            Err(StatusError::Rejected(_))
        ));
    }

    #[test]
    fn test_bad_endpoint_is_refused() {
        let result = StatusReporter::new(
            FakeRuntime { containers: vec![] },
            &ReporterConfig {
                endpoint: "not a url".to_string(),
                token: String::new(),
                interval: Duration::from_secs(600),
                request_timeout: Duration::from_secs(5),
            },
        );
        assert!(matches!(result, Err(StatusError::Endpoint(_))));
    }
}
