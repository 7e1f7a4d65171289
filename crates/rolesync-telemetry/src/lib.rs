use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "rolesync_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from a level name; unknown names fall back to INFO.
    pub fn from_level_name(level: &str, json: bool) -> Self {
        Self {
            log_level: level.parse().unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json,
        }
    }

    /// The `EnvFilter` directive string this config describes.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Initialize the global subscriber. Call once at startup; later calls are
/// ignored.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        eprintln!("rolesync-telemetry: subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("rolesync_engine".into(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.filter_directives(), "warn,rolesync_engine=debug");
    }

    #[test]
    fn unknown_level_name_falls_back_to_info() {
        assert_eq!(TelemetryConfig::from_level_name("chatty", true).log_level, Level::INFO);
        assert_eq!(TelemetryConfig::from_level_name("debug", false).log_level, Level::DEBUG);
    }

    #[test]
    fn double_init_does_not_panic() {
        let config = TelemetryConfig::default();
        init_telemetry(&config);
        init_telemetry(&config);
    }
}
