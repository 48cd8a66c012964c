//! Tracing setup
//!
//! The subscriber is installed before configuration is loaded so the config
//! loader's own messages are not lost. The configured level is applied
//! afterwards unless `RUST_LOG` or `--log-level` already fixed it.

use tracing::warn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Level used until the configuration has been read
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Handle to the installed filter
pub struct LogLevel {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned: bool,
}

impl LogLevel {
    /// Switch to the level from the config file, unless pinned at startup
    pub fn apply_configured(&self, level: &str) {
        if self.pinned {
            return;
        }
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = self.handle.reload(filter) {
                    warn!("Failed to apply log level {}: {}", level, e);
                }
            }
            Err(e) => warn!("Ignoring invalid log level {:?}: {}", level, e),
        }
    }
}

/// Install the global subscriber, writing formatted events to `writer`
pub fn init_tracing<W>(cli_level: Option<&str>, writer: W) -> Result<LogLevel, TryInitError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, pinned) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => match cli_level {
            Some(level) => (EnvFilter::new(level), true),
            None => (EnvFilter::new(DEFAULT_LOG_LEVEL), false),
        },
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .try_init()?;

    Ok(LogLevel { handle, pinned })
}
