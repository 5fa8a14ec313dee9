pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{Config, ConfigError, LogLevel};
pub use logging::setup_logging;

use crate::forwarder::Forwarder;
use crate::resolver::DockerRuntime;
use crate::status::StatusReporter;
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wires the configuration into the forwarder and, when a control plane is
/// configured, the status reporter; then runs until a shutdown signal.
pub struct App {
    config: Config,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Ok(Self { config })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        setup_logging(self.config.log_level);
        info!(version = env!("CARGO_PKG_VERSION"), "starting logship");

        let runtime =
            DockerRuntime::connect(&self.config.docker_endpoint, self.config.docker_timeout)?;
        let mut forwarder = Forwarder::new(self.config.forwarder_config(), runtime.clone());
        forwarder.start().await?;

        let cancel = CancellationToken::new();
        let reporter_task = match self.config.reporter_config() {
            Some(reporter_config) => {
                let reporter = StatusReporter::new(runtime, &reporter_config)?;
                Some(tokio::spawn(reporter.run(cancel.clone())))
            }
            None => None,
        };

        shutdown::wait_for_signal().await;

        cancel.cancel();
        forwarder.stop().await;
        if let Some(task) = reporter_task {
            let _ = task.await;
        }
        Ok(())
    }
}

/// Binary entry point: parse flags (clap handles `--help`/`--version`),
/// validate, run until signalled.
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = Config::parse();
    config.post_process();
    if let Err(err) = config.validate() {
        eprintln!("configuration error: {err}");
        process::exit(2);
    }

    if let Err(err) = App::from_config(config).run().await {
        error!(error = %err, "log forwarder failed");
        process::exit(1);
    }
    Ok(())
}
