//! Engine configuration
//!
//! Settings come from an agent-style argument string (`key=value;key=value`),
//! a TOML file, or CLI flags layered on top of either.

use crate::error::ConfigError;
use hotswap_rewrite::DEFAULT_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default extension of watched unit files
pub const DEFAULT_UNIT_EXTENSION: &str = ".unit";

/// Prefix accepted in front of agent argument keys
const KEY_PREFIX: &str = "hotswap.";

/// Hot-swap configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotSwapConfig {
    /// Separator between a logical name and a generation number
    pub suffix: String,
    /// Directory watched for compiled units
    pub watch_dir: PathBuf,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Name of the hot-swap aware loader to create, if any
    pub custom_loader: Option<String>,
    /// Extension of unit files, including the dot
    pub unit_extension: String,
    /// Default log filter
    pub log_level: String,
}

impl Default for HotSwapConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            watch_dir: PathBuf::from("."),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            custom_loader: None,
            unit_extension: DEFAULT_UNIT_EXTENSION.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl HotSwapConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With watched directory
    #[inline]
    #[must_use]
    pub fn with_watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watch_dir = dir.into();
        self
    }

    /// With polling interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With generation suffix
    #[inline]
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Polling interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse an agent argument string
    ///
    /// Pairs are separated by `;`, keys and values by the first `=`, and
    /// both are trimmed. Keys may carry a `hotswap.` prefix. Pairs without
    /// `=` and unknown keys are skipped; an unparsable interval keeps the
    /// default.
    #[must_use]
    pub fn from_agent_args(args: &str) -> Self {
        let mut config = Self::default();
        config.apply_agent_args(args);
        config
    }

    /// Layer an agent argument string over the current settings
    pub fn apply_agent_args(&mut self, args: &str) {
        for pair in args.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            self.apply(key.trim(), value.trim());
        }
    }

    /// Apply a single `key=value` setting
    pub fn apply(&mut self, key: &str, value: &str) {
        let key = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
        match key {
            "suffix" => self.suffix = value.to_string(),
            "watch_dir" | "project_dir" => self.watch_dir = PathBuf::from(value),
            "poll_interval" | "watcher.interval" => match value.parse::<u64>() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(_) => {
                    tracing::debug!(
                        "interval {:?} unparsable, using default of {}ms",
                        value,
                        DEFAULT_POLL_INTERVAL_MS
                    );
                    self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
                }
            },
            "custom_loader" => self.custom_loader = Some(value.to_string()).filter(|v| !v.is_empty()),
            "unit_extension" => self.unit_extension = value.to_string(),
            "log_level" | "logger.level" => self.log_level = value.to_string(),
            other => tracing::debug!("ignoring unknown setting {}", other),
        }
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML for this structure
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check values the engine and watcher depend on
    ///
    /// # Errors
    /// Returns error for an empty suffix or extension, or a zero interval
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suffix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "suffix",
                reason: "must not be empty".into(),
            });
        }
        if self.suffix.contains('/') || self.suffix.contains('.') {
            return Err(ConfigError::Invalid {
                key: "suffix",
                reason: format!("{:?} contains a name separator", self.suffix),
            });
        }
        if self.unit_extension.is_empty() {
            return Err(ConfigError::Invalid {
                key: "unit_extension",
                reason: "must not be empty".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let c = HotSwapConfig::default();
        assert_eq!(c.suffix, "$HCR$");
        assert_eq!(c.poll_interval(), Duration::from_secs(1));
        assert_eq!(c.unit_extension, ".unit");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn agent_args() {
        let c = HotSwapConfig::from_agent_args(
            " hotswap.suffix = $GEN$ ;watch_dir=/tmp/units;poll_interval=250;junk;custom_loader=plugins",
        );
        assert_eq!(c.suffix, "$GEN$");
        assert_eq!(c.watch_dir, PathBuf::from("/tmp/units"));
        assert_eq!(c.poll_interval_ms, 250);
        assert_eq!(c.custom_loader.as_deref(), Some("plugins"));
    }

    #[test]
    fn value_may_contain_equals() {
        let c = HotSwapConfig::from_agent_args("watch_dir=/a=b");
        assert_eq!(c.watch_dir, PathBuf::from("/a=b"));
    }

    #[test]
    fn bad_interval_falls_back() {
        let c = HotSwapConfig::from_agent_args("poll_interval=soon");
        assert_eq!(c.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn toml() {
        let c = HotSwapConfig::from_toml_str(
            r#"
suffix = "$V$"
poll_interval_ms = 50
unit_extension = ".bin"
"#,
        )
        .unwrap();
        assert_eq!(c.suffix, "$V$");
        assert_eq!(c.poll_interval_ms, 50);
        assert_eq!(c.unit_extension, ".bin");
        assert_eq!(c.log_level, "info");
    }

    #[test]
    fn toml_type_error() {
        assert!(matches!(
            HotSwapConfig::from_toml_str("poll_interval_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn validation() {
        assert!(HotSwapConfig::default().with_suffix("").validate().is_err());
        assert!(HotSwapConfig::default().with_suffix("a/b").validate().is_err());
        assert!(HotSwapConfig::default()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn load_missing_file() {
        let err = HotSwapConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
