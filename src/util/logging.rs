//! Structured logging setup for skyfold
//!
//! Installs a `tracing` subscriber with console or JSON output. The library itself only emits
//! events; embedding applications decide whether to call one of the initialisers here.
//!
//! # Example
//!
//! ```no_run
//! use skyfold::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!("consolidation service started");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "SKYFOLD_LOG_LEVEL";
pub const LOG_JSON_ENV: &str = "SKYFOLD_LOG_JSON";

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for `skyfold` targets
    pub level: Level,

    /// Use JSON output format
    pub use_json: bool,

    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with location and thread metadata
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }
}

/// Parses a log level case-insensitively, returning `None` for anything unrecognised.
pub fn try_parse_level(level_str: &str) -> Option<Level> {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Parses a log level, defaulting to `INFO`.
///
/// ```
/// use skyfold::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("DEBUG"), Level::DEBUG);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    try_parse_level(level_str).unwrap_or_else(|| {
        eprintln!(
            "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
            level_str
        );
        Level::INFO
    })
}

fn directive(raw: &str) -> Option<Directive> {
    raw.parse().ok()
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Some(d) = directive(&format!("skyfold={}", config.level)) {
            filter = filter.add_directive(d);
        }

        if config.use_json {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `SKYFOLD_LOG_LEVEL` and `SKYFOLD_LOG_JSON`; `RUST_LOG` adds further directives.
pub fn init_from_env() {
    init_logging(config_from_env());
}

fn config_from_env() -> LoggingConfig {
    let level = env::var(LOG_LEVEL_ENV)
        .map(|v| parse_level(&v))
        .unwrap_or(Level::INFO);

    let use_json = env::var(LOG_JSON_ENV)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}
