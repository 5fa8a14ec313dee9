use crate::domain::SocketAddress;
use crate::forwarder::ForwarderConfig;
use crate::status::ReporterConfig;
use clap::{Parser, ValueEnum};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Host-resident container log forwarder", long_about = None)]
pub struct Config {
    /// Syslog bind address (tcp://host:port or udp://host:port)
    #[arg(long, env = "BIND_ADDRESS", default_value = "udp://0.0.0.0:1514")]
    pub bind: String,

    /// Raw forwarding destinations, comma separated, same address syntax
    #[arg(long = "forward", env = "FORWARD_ADDRESSES", value_delimiter = ',')]
    pub forward_addresses: Vec<String>,

    /// Container runtime endpoint
    #[arg(
        long,
        env = "DOCKER_ENDPOINT",
        default_value = "unix:///var/run/docker.sock"
    )]
    pub docker_endpoint: String,

    /// Control-plane URL; enables the managed sink and the status reporter
    #[arg(long, env = "TSURU_ENDPOINT")]
    pub tsuru_endpoint: Option<String>,

    /// Bearer credential for the control plane
    #[arg(long, env = "TSURU_TOKEN", default_value = "")]
    pub tsuru_token: String,

    /// Env var prefix that carries the application name
    #[arg(long, env = "APP_NAME_ENV_VAR", default_value = "TSURU_APPNAME=")]
    pub app_name_env_var: String,

    /// Env var prefix that carries the process name
    #[arg(
        long,
        env = "PROCESS_NAME_ENV_VAR",
        default_value = "TSURU_PROCESSNAME="
    )]
    pub process_name_env_var: String,

    /// Identity cache capacity in entries
    #[arg(long, env = "CACHE_CAPACITY", default_value = "100")]
    pub cache_capacity: usize,

    /// Interval between unit status reports
    #[arg(long, env = "STATUS_INTERVAL_SECS", default_value = "60")]
    pub status_interval_secs: u64,

    /// Managed-sink write timeout
    #[arg(long, env = "WRITE_TIMEOUT_SECS", default_value = "30")]
    pub write_timeout_secs: u64,

    /// Container runtime request timeout
    #[arg(long, env = "DOCKER_TIMEOUT_SECS", default_value = "30")]
    pub docker_timeout_secs: u64,

    /// How long shutdown waits for in-flight messages
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value = "5")]
    pub drain_timeout_secs: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Derived fields (not CLI arguments)
    #[arg(skip)]
    pub status_interval: Duration,

    #[arg(skip)]
    pub write_timeout: Duration,

    #[arg(skip)]
    pub docker_timeout: Duration,

    #[arg(skip)]
    pub drain_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            bind: "udp://0.0.0.0:1514".to_string(),
            forward_addresses: Vec::new(),
            docker_endpoint: "unix:///var/run/docker.sock".to_string(),
            tsuru_endpoint: None,
            tsuru_token: String::new(),
            app_name_env_var: "TSURU_APPNAME=".to_string(),
            process_name_env_var: "TSURU_PROCESSNAME=".to_string(),
            cache_capacity: 100,
            status_interval_secs: 60,
            write_timeout_secs: 30,
            docker_timeout_secs: 30,
            drain_timeout_secs: 5,
            log_level: LogLevel::Info,
            status_interval: Duration::ZERO,
            write_timeout: Duration::ZERO,
            docker_timeout: Duration::ZERO,
            drain_timeout: Duration::ZERO,
        };
        config.post_process();
        config
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config =
            Config::try_parse_from(args).map_err(|err| ConfigError::Usage(err.to_string()))?;
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    /// Converts the `*_secs` flags into durations.
    pub fn post_process(&mut self) {
        self.status_interval = Duration::from_secs(self.status_interval_secs.max(1));
        self.write_timeout = Duration::from_secs(self.write_timeout_secs.max(1));
        self.docker_timeout = Duration::from_secs(self.docker_timeout_secs.max(1));
        self.drain_timeout = Duration::from_secs(self.drain_timeout_secs.max(1));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        SocketAddress::parse(&self.bind)
            .map_err(|err| ConfigError::InvalidConfig(err.to_string()))?;
        for address in &self.forward_addresses {
            SocketAddress::parse(address)
                .map_err(|err| ConfigError::InvalidConfig(err.to_string()))?;
        }
        if let Some(endpoint) = &self.tsuru_endpoint {
            let url = Url::parse(endpoint)
                .map_err(|err| ConfigError::InvalidUrl(format!("{endpoint}: {err}")))?;
            if url.host_str().is_none() {
                return Err(ConfigError::InvalidUrl(format!("{endpoint}: missing host")));
            }
        }
        Ok(())
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            bind_address: self.bind.clone(),
            forward_addresses: self.forward_addresses.clone(),
            managed_endpoint: self.tsuru_endpoint.clone(),
            app_name_env_var: self.app_name_env_var.clone(),
            process_name_env_var: self.process_name_env_var.clone(),
            cache_capacity: self.cache_capacity,
            write_timeout: self.write_timeout,
            drain_timeout: self.drain_timeout,
        }
    }

    /// Reporter settings, present only when a control plane is configured.
    pub fn reporter_config(&self) -> Option<ReporterConfig> {
        self.tsuru_endpoint.as_ref().map(|endpoint| ReporterConfig {
            endpoint: endpoint.clone(),
            token: self.tsuru_token.clone(),
            interval: self.status_interval,
            request_timeout: self.docker_timeout,
        })
    }
}
