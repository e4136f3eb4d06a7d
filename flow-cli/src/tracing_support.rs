//! Logging initialisation for the runner
//!
//! Level filtering honours `RUST_LOG` unless a level is given explicitly;
//! the default is `info`. Logs go to stderr so stdout stays machine-readable.

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// JSON lines
    Json,
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Explicit filter directive; `None` reads `RUST_LOG`
    pub level: Option<String>,
    pub format: TracingFormat,
    pub timestamps: bool,
    pub target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Pretty,
            timestamps: true,
            target: true,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> anyhow::Result<EnvFilter> {
        Ok(match &self.level {
            Some(level) => EnvFilter::try_new(level)?,
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        })
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.target);
        match (self.format, self.timestamps) {
            (TracingFormat::Pretty, true) => base.pretty().boxed(),
            (TracingFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (TracingFormat::Compact, true) => base.compact().boxed(),
            (TracingFormat::Compact, false) => base.compact().without_time().boxed(),
            (TracingFormat::Json, true) => base.json().boxed(),
            (TracingFormat::Json, false) => base.json().without_time().boxed(),
        }
    }
}

/// Install the global subscriber
pub fn init_subscriber(config: &TracingConfig) -> anyhow::Result<()> {
    let filter = config.filter()?;
    tracing_subscriber::registry()
        .with(config.layer())
        .with(filter)
        .try_init()?;
    Ok(())
}
