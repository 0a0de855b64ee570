//! Tracing setup for the `tenrso-complete` binary
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directive, takes precedence over `-v`
//! - `TENRSO_LOG_FORMAT`: output format (`json`, `compact` or `pretty`,
//!   default: `compact`)
//!
//! Log events go to stderr so they never interleave with the run report on
//! stdout.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Pretty-printed multi-line format
    Pretty,
    /// JSON format for structured logging
    Json,
    /// Compact format (single line per event)
    Compact,
}

impl TracingFormat {
    /// Parse from string; anything unrecognized is compact
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => TracingFormat::Json,
            "pretty" => TracingFormat::Pretty,
            _ => TracingFormat::Compact,
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    /// Filter directive (e.g., "tenrso_completion=debug,info")
    pub filter: String,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_names: bool,
}

impl TracingConfig {
    /// Configuration for a `-v` count, unless `RUST_LOG` is set
    pub fn from_verbosity(verbose: u8) -> Self {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| verbosity_filter(verbose).to_string());
        Self {
            filter,
            ..Self::default()
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        let format = std::env::var("TENRSO_LOG_FORMAT")
            .map(|s| TracingFormat::parse(&s))
            .unwrap_or(TracingFormat::Compact);

        Self {
            format,
            filter: verbosity_filter(0).to_string(),
            with_ansi: true,
            with_target: false,
            with_thread_names: false,
        }
    }
}

/// Filter level for a `-v` count
pub fn verbosity_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber; call once at startup
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;

    match config.format {
        TracingFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_names(config.with_thread_names)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        }
        TracingFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(config.with_target)
                .with_thread_names(config.with_thread_names)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        }
        TracingFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_names(config.with_thread_names)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        }
    }

    Ok(())
}
