//! Logging setup for the command-line driver
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary.
//!
//! # Log Levels
//!
//! - `error`: designs that failed to build
//! - `warn`: pseudonym lookup misses, replaced templates
//! - `info`: loaded catalogs, built instances, design summaries
//! - `debug`: executed steps, taken branches, filled defaults
//! - `trace`: identifier allocation, selection contributions, kernel calls

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: Level,
    /// Include timestamps in log output
    pub with_timestamps: bool,
    /// Include the module path in log output
    pub with_target: bool,
    /// Use ANSI colors
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            with_timestamps: false,
            with_target: false,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Map the CLI `-v` count to a level.
    ///
    /// - 0: warn
    /// - 1 (`-v`): info
    /// - 2 (`-vv`): debug
    /// - 3+ : trace
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    pub fn with_target(mut self, enable: bool) -> Self {
        self.with_target = enable;
        self
    }

    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }

    /// Filter used by [`init`]: `RUST_LOG` if set, else this config's level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` if a subscriber was already installed.
pub fn init(config: &LogConfig) -> bool {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.with_ansi)
        .with_target(config.with_target);

    let registry = tracing_subscriber::registry().with(config.env_filter());
    if config.with_timestamps {
        registry.with(layer).try_init().is_ok()
    } else {
        registry.with(layer.without_time()).try_init().is_ok()
    }
}
