//! Configuration loading and management

use std::path::PathBuf;

use tracing::warn;

/// Default minimum confidence for a sign to open or restart a window
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
/// Default time a sign must be held before it commits
pub const DEFAULT_DWELL_MS: u64 = 3_000;
/// Default cadence of the elapsed-time poll
pub const DEFAULT_POLL_MS: u64 = 100;

/// Operator-tunable range for the confidence threshold
pub const RECOMMENDED_THRESHOLD_RANGE: (f32, f32) = (0.3, 0.9);
/// Operator-tunable range for the dwell duration
pub const RECOMMENDED_DWELL_RANGE_MS: (u64, u64) = (500, 3_000);

/// Settings the commit state machine reads but never changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitConfig {
    /// Minimum confidence, in (0, 1]
    pub confidence_threshold: f32,
    /// Dwell duration in milliseconds, > 0
    pub dwell_duration_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            dwell_duration_ms: DEFAULT_DWELL_MS,
        }
    }
}

impl CommitConfig {
    /// Check hard bounds and warn about values outside the tunable range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        if self.dwell_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("dwell duration"));
        }

        let (lo, hi) = RECOMMENDED_THRESHOLD_RANGE;
        if threshold < lo || threshold > hi {
            warn!(threshold, lo, hi, "confidence threshold outside recommended range");
        }
        let (lo, hi) = RECOMMENDED_DWELL_RANGE_MS;
        if self.dwell_duration_ms < lo || self.dwell_duration_ms > hi {
            warn!(
                dwell_ms = self.dwell_duration_ms,
                lo, hi, "dwell duration outside recommended range"
            );
        }
        Ok(())
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Commit window tuning
    pub commit: CommitConfig,

    /// Interval between elapsed-time checks, in milliseconds
    pub poll_interval_ms: u64,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HOME is not set")]
    NoHome,

    #[error("invalid value for {key}: {value:?}")]
    Parse { key: &'static str, value: String },

    #[error("confidence threshold must be in (0, 1], got {0}")]
    ThresholdOutOfRange(f32),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").ok_or(ConfigError::NoHome)?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("signspell");

        let socket_path = lookup("SIGNSPELL_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let commit = CommitConfig {
            confidence_threshold: parse_or(
                &lookup,
                "SIGNSPELL_CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            )?,
            dwell_duration_ms: parse_or(&lookup, "SIGNSPELL_DWELL_MS", DEFAULT_DWELL_MS)?,
        };
        commit.validate()?;

        let poll_interval_ms = parse_or(&lookup, "SIGNSPELL_POLL_MS", DEFAULT_POLL_MS)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("poll interval"));
        }

        Ok(Self {
            commit,
            poll_interval_ms,
            socket_path,
            data_dir,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("HOME", "/home/test")])).unwrap();
        assert_eq!(config.commit, CommitConfig::default());
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_MS);
        assert!(config.socket_path.to_string_lossy().contains("signspell"));
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/test"),
            ("SIGNSPELL_CONFIDENCE_THRESHOLD", "0.75"),
            ("SIGNSPELL_DWELL_MS", "1500"),
            ("SIGNSPELL_SOCKET", "/tmp/signspell-test.sock"),
        ]))
        .unwrap();
        assert_eq!(config.commit.confidence_threshold, 0.75);
        assert_eq!(config.commit.dwell_duration_ms, 1_500);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/signspell-test.sock"));
    }

    #[test]
    fn test_config_requires_home() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(ConfigError::NoHome)
        ));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("HOME", "/home/test"),
                ("SIGNSPELL_CONFIDENCE_THRESHOLD", "0"),
            ])),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("HOME", "/home/test"),
                ("SIGNSPELL_DWELL_MS", "0"),
            ])),
            Err(ConfigError::ZeroDuration(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("HOME", "/home/test"),
                ("SIGNSPELL_DWELL_MS", "soon"),
            ])),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_threshold_of_one_is_valid() {
        let commit = CommitConfig {
            confidence_threshold: 1.0,
            dwell_duration_ms: 500,
        };
        assert!(commit.validate().is_ok());
    }
}
