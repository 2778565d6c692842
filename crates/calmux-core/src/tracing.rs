//! Log output for applications embedding calmux.
//!
//! Every crate logs through `tracing` macros with structured fields; this
//! module installs the subscriber that renders them. The default filter
//! covers the three calmux crates and nothing else, so host applications
//! keep their own noise level.
//!
//! ```ignore
//! use calmux_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::service())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

/// Targets the default filter enables.
const CALMUX_TARGETS: [&str; 3] = ["calmux_core", "calmux_providers", "calmux_engine"];

/// Target of cache hit/miss/eviction traces.
const CACHE_TARGET: &str = "calmux_engine::cache";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// JSON lines.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the calmux crates when neither `RUST_LOG` nor `env_filter` is set.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Adds file and line to every event.
    pub with_location: bool,
    pub with_timestamp: bool,
    /// Logs span creation and close (fan-out timing).
    pub span_events: bool,
    /// Lets per-key cache traces through regardless of `level`.
    pub trace_cache: bool,
    /// Full filter directive; replaces the computed default.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            with_location: false,
            with_timestamp: true,
            span_events: false,
            trace_cache: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Debug level, compact lines, cache traces on.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Compact,
            with_location: true,
            with_timestamp: false,
            trace_cache: true,
            ..Self::default()
        }
    }

    /// JSON lines with span timings, for services.
    #[must_use]
    pub fn service() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            with_location: true,
            span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_cache_traces(mut self, enabled: bool) -> Self {
        self.trace_cache = enabled;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Directive used when neither `RUST_LOG` nor `env_filter` is set.
    pub fn default_directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        let mut directives: Vec<String> = CALMUX_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        if self.trace_cache {
            directives.push(format!("{CACHE_TARGET}=trace"));
        }
        directives.join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.env_filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a subscriber is already installed or `env_filter` does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let location = config.with_location;

    let layer = match config.format {
        TracingOutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(location)
            .with_line_number(location)
            .with_span_events(spans)
            .boxed(),
        TracingOutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_file(location)
                .with_line_number(location)
                .with_span_events(spans);
            if config.with_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        TracingOutputFormat::Json => fmt::layer()
            .json()
            .with_file(location)
            .with_line_number(location)
            .with_span_events(spans)
            .boxed(),
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(layer))?;
    Ok(())
}
