use super::config::LogLevel;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Installs the global tracing subscriber. Safe to call more than once; only
/// the first call takes effect, so tests can initialize freely. `RUST_LOG`
/// overrides the configured level when set.
pub fn setup_logging(level: LogLevel) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{},hyper=warn,reqwest=warn,bollard=warn,tungstenite=warn",
                level.as_str()
            ))
        });
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).compact())
            .try_init();
    });
}
