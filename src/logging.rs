//! Structured logging setup
//!
//! `tracing` subscriber writing to stderr, so stdout stays reserved for the
//! JSON response. `RUST_LOG` overrides the configured level. Initialized at
//! most once per process.

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Logging initialization settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Minimum level for toolgate's own events
    pub level: Level,

    /// One JSON object per event instead of human-readable lines
    pub use_json: bool,

    /// Include the module target in each line
    pub include_target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
        }
    }
}

impl LogSettings {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn json(mut self, use_json: bool) -> Self {
        self.use_json = use_json;
        self
    }
}

/// Parse a level name, case-insensitive; `None` for anything unknown
pub fn parse_level(level_str: &str) -> Option<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter = EnvFilter::new("warn");
    if let Ok(directive) = format!("toolgate={}", level).parse() {
        filter = filter.add_directive(directive);
    }
    filter
}

/// Initialize the global subscriber; later calls are ignored
pub fn init_logging(settings: LogSettings) {
    INIT.call_once(|| {
        let filter = build_filter(settings.level);

        if settings.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(settings.include_target)
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(settings.include_target)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_settings_builders() {
        let settings = LogSettings::with_level(Level::ERROR).json(true);
        assert_eq!(settings.level, Level::ERROR);
        assert!(settings.use_json);
        assert!(settings.include_target);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(LogSettings::default());
        init_logging(LogSettings::with_level(Level::TRACE));
    }
}
