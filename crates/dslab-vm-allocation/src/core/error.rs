//! Configuration errors.

use thiserror::Error;

/// Error raised when the allocation subsystem is configured with invalid values.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("can't read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{name} must be within [0, 1], got {value}")]
    NotAFraction { name: &'static str, value: f64 },

    #[error("{name} must be non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must be at least 1")]
    Zero { name: &'static str },

    #[error("under-utilization threshold {under} must be below over-utilization threshold {over}")]
    ThresholdsOverlap { under: f64, over: f64 },

    #[error("unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("bad value for option {option}: {value}")]
    BadOption { option: String, value: String },
}

/// Checks that `value` is a finite number within `[0, 1]`.
pub fn check_fraction(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0. ..=1.).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::NotAFraction { name, value })
    }
}

/// Checks that `value` is a finite non-negative number.
pub fn check_non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0. {
        Ok(value)
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// Checks that a size parameter is at least one.
pub fn check_positive_size(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { name })
    } else {
        Ok(value)
    }
}
