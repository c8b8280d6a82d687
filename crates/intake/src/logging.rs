//! Process-wide tracing subscriber setup.
//!
//! `log` records emitted by this crate (and its dependencies) are bridged
//! into the same subscriber, so spans and plain log lines share one output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Installs the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// Can only succeed once per process; later calls return an error that
/// callers embedding the crate in a host with its own subscriber may ignore.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter(e.to_string()))?,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json()))
        .with((!config.json).then(|| fmt::layer()));

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(())
}
