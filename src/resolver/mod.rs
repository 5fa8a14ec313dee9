pub mod cache;

pub use cache::IdentityCache;

use bollard::Docker;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("container runtime API error: {0}")]
    Api(#[from] bollard::errors::Error),
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no identity env vars found in container {0}")]
    NotFound(String),
    #[error("runtime lookup failed for {container_id}: {source}")]
    Runtime {
        container_id: String,
        #[source]
        source: RuntimeError,
    },
}

/// The application/process pair a log line is attributed to. Built once per
/// container and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub app_name: String,
    pub process_name: String,
}

/// A container's runtime state as reported by a list call.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub id: String,
    pub state: String,
}

/// Boundary to the container runtime. The daemon only needs two operations,
/// so tests substitute an in-memory fake.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Environment variables (`KEY=VALUE`) configured on a container.
    fn inspect_env(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, RuntimeError>> + Send;

    /// All containers, including stopped ones.
    fn list_all(&self) -> impl Future<Output = Result<Vec<ContainerState>, RuntimeError>> + Send;
}

/// Docker-backed runtime client.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects by endpoint scheme: `unix://` sockets or `tcp://`/`http://`
    /// addresses. The timeout bounds every API call made through the client.
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self, RuntimeError> {
        let timeout_secs = timeout.as_secs().max(1);
        let docker = if let Some(path) = endpoint.strip_prefix("unix://") {
            Docker::connect_with_socket(path, timeout_secs, bollard::API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_http(endpoint, timeout_secs, bollard::API_DEFAULT_VERSION)?
        };
        Ok(Self { docker })
    }
}

impl ContainerRuntime for DockerRuntime {
    fn inspect_env(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, RuntimeError>> + Send {
        let docker = self.docker.clone();
        let id = container_id.to_string();
        async move {
            let inspect = docker
                .inspect_container(&id, None::<bollard::query_parameters::InspectContainerOptions>)
                .await?;
            Ok(inspect.config.and_then(|c| c.env).unwrap_or_default())
        }
    }

    fn list_all(&self) -> impl Future<Output = Result<Vec<ContainerState>, RuntimeError>> + Send {
        let docker = self.docker.clone();
        async move {
            let options = bollard::query_parameters::ListContainersOptions {
                all: true,
                ..Default::default()
            };
            let containers = docker.list_containers(Some(options)).await?;
            Ok(containers
                .into_iter()
                .filter_map(|c| {
                    let id = c.id?;
                    let state = c.state.map(|s| s.to_string().to_lowercase()).unwrap_or_default();
                    Some(ContainerState { id, state })
                })
                .collect())
        }
    }
}

/// Identity resolver: memoizing front over the runtime's inspect call.
pub struct Resolver<R> {
    runtime: R,
    cache: IdentityCache,
    app_prefix: String,
    process_prefix: String,
}

impl<R: ContainerRuntime> Resolver<R> {
    pub fn new(
        runtime: R,
        cache_capacity: usize,
        app_prefix: impl Into<String>,
        process_prefix: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            cache: IdentityCache::new(cache_capacity),
            app_prefix: app_prefix.into(),
            process_prefix: process_prefix.into(),
        }
    }

    /// Resolves a source id to its identity. A cache hit performs no I/O.
    /// On a miss the container's env list is scanned once, in order, and the
    /// result is cached only when both names were captured non-empty.
    pub async fn resolve(&self, source_id: &str) -> Result<Identity, ResolveError> {
        if let Some(identity) = self.cache.get(source_id) {
            return Ok(identity);
        }
        let env = self.runtime.inspect_env(source_id).await.map_err(|source| {
            ResolveError::Runtime {
                container_id: source_id.to_string(),
                source,
            }
        })?;
        let mut app_name: Option<String> = None;
        let mut process_name: Option<String> = None;
        for entry in &env {
            if app_name.is_none()
                && let Some(rest) = entry.strip_prefix(&self.app_prefix)
                && !rest.is_empty()
            {
                app_name = Some(rest.to_string());
            }
            if process_name.is_none()
                && let Some(rest) = entry.strip_prefix(&self.process_prefix)
                && !rest.is_empty()
            {
                process_name = Some(rest.to_string());
            }
            if let (Some(app), Some(process)) = (&app_name, &process_name) {
                let identity = Identity {
                    app_name: app.clone(),
                    process_name: process.clone(),
                };
                self.cache.insert(source_id, identity.clone());
                debug!(source_id, app = %identity.app_name, "resolved container identity");
                return Ok(identity);
            }
        }
        Err(ResolveError::NotFound(source_id.to_string()))
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRuntime {
        env: HashMap<String, Vec<String>>,
        inspects: AtomicUsize,
    }

    impl FakeRuntime {
        fn with_env(id: &str, env: &[&str]) -> Self {
            let mut map = HashMap::new();
            map.insert(id.to_string(), env.iter().map(|s| s.to_string()).collect());
            Self {
                env: map,
                inspects: AtomicUsize::new(0),
            }
        }

        fn inspect_count(&self) -> usize {
            self.inspects.load(Ordering::SeqCst)
        }
    }

    impl ContainerRuntime for &'static FakeRuntime {
        fn inspect_env(
            &self,
            container_id: &str,
        ) -> impl Future<Output = Result<Vec<String>, RuntimeError>> + Send {
            self.inspects.fetch_add(1, Ordering::SeqCst);
            let result = self
                .env
                .get(container_id)
                .cloned()
                .ok_or_else(|| RuntimeError::Unavailable(format!("no such container {container_id}")));
            async move { result }
        }

        fn list_all(
            &self,
        ) -> impl Future<Output = Result<Vec<ContainerState>, RuntimeError>> + Send {
            async move { Ok(vec![]) }
        }
    }

    fn leak(runtime: FakeRuntime) -> &'static FakeRuntime {
        Box::leak(Box::new(runtime))
    }

    #[tokio::test]
    async fn test_resolve_captures_both_names_from_env() {
        let runtime = leak(FakeRuntime::with_env(
            "abc123",
            &["HOME=/", "TSURU_APPNAME=someapp", "TSURU_PROCESSNAME=web"],
        ));
        let resolver = Resolver::new(runtime, 100, "TSURU_APPNAME=", "TSURU_PROCESSNAME=");
        let identity = resolver.resolve("abc123").await.unwrap();
        assert_eq!(identity.app_name, "someapp");
        assert_eq!(identity.process_name, "web");
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_hit_skips_runtime_call() {
        let runtime = leak(FakeRuntime::with_env(
            "abc123",
            &["TSURU_APPNAME=someapp", "TSURU_PROCESSNAME=web"],
        ));
        let resolver = Resolver::new(runtime, 100, "TSURU_APPNAME=", "TSURU_PROCESSNAME=");
        let first = resolver.resolve("abc123").await.unwrap();
        let second = resolver.resolve("abc123").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.inspect_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_resolution_is_not_cached() {
        let runtime = leak(FakeRuntime::with_env(
            "abc123",
            &["HOME=/", "TSURU_APPNAME=someapp"],
        ));
        let resolver = Resolver::new(runtime, 100, "TSURU_APPNAME=", "TSURU_PROCESSNAME=");
        assert!(matches!(
            resolver.resolve("abc123").await,
            Err(ResolveError::NotFound(_))
        ));
        assert!(resolver.cache().is_empty());

        // Still a miss the second time around.
        let _ = resolver.resolve("abc123").await;
        assert_eq!(runtime.inspect_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_env_value_does_not_count() {
        let runtime = leak(FakeRuntime::with_env(
            "abc123",
            &["TSURU_APPNAME=", "TSURU_PROCESSNAME=web"],
        ));
        let resolver = Resolver::new(runtime, 100, "TSURU_APPNAME=", "TSURU_PROCESSNAME=");
        assert!(matches!(
            resolver.resolve("abc123").await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_runtime_failure_surfaces_as_resolve_error() {
        let runtime = leak(FakeRuntime::with_env("other", &[]));
        let resolver = Resolver::new(runtime, 100, "TSURU_APPNAME=", "TSURU_PROCESSNAME=");
        assert!(matches!(
            resolver.resolve("unknown").await,
            Err(ResolveError::Runtime { .. })
        ));
    }
}
