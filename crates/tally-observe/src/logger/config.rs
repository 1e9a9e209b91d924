use std::io::IsTerminal;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::logger::format::LoggerFormat;

/// Logger settings. Missing fields in a deserialized config take the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `tally_core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    /// ANSI colours in the text format. Log lines go to stderr.
    pub use_color: bool,
}

impl LoggerConfig {
    /// Defaults, with the filter taken from `RUST_LOG` and colours turned off by
    /// a non-empty `NO_COLOR`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(level) = var(EnvFilter::DEFAULT_ENV).filter(|l| !l.trim().is_empty()) {
            cfg.level = level;
        }
        if var("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            cfg.use_color = false;
        }
        cfg
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stderr().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: LoggerConfig = serde_json::from_str(r#"{"format": "json", "level": "debug"}"#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "debug");
        assert!(cfg.with_targets);
    }

    #[test]
    fn environment_overrides_filter_and_colour() {
        let cfg = LoggerConfig::from_vars(|name| match name {
            "RUST_LOG" => Some("tally_core=debug,warn".to_string()),
            "NO_COLOR" => Some("1".to_string()),
            _ => None,
        });
        assert_eq!(cfg.level, "tally_core=debug,warn");
        assert!(!cfg.use_color);
    }

    #[test]
    fn blank_environment_keeps_defaults() {
        let cfg = LoggerConfig::from_vars(|name| (name == "RUST_LOG").then(|| "  ".to_string()));
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LoggerFormat::Text);
    }
}
