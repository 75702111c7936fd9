//! Result-size and running-duration forecasts declared by process definitions.
//!
//! Both forecasts are configured as short strings:
//!
//! | Forecast | Form | Meaning |
//! |---|---|---|
//! | size | `*2.5` | output is 2.5 times the input size |
//! | size | `10m`, `512k`, `1g`, `42` | fixed output size (1024-based units) |
//! | duration | `10min`, `30s`, `2h`, `500ms`, `1d` | fixed running duration |
//! | duration | `2s/mb` | duration per started megabyte of input |
//!
//! The duration forecast of a batch becomes its executions' timeout.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

const MEGABYTE: u64 = 1024 * 1024;

static SIZE_MULTIPLIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\s*(\d+(?:\.\d+)?)$").expect("valid size multiplier regex")
});

static SIZE_ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+)\s*([kmgt]?)b?$").expect("valid absolute size regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+)\s*(ms|s|sec|min|m|h|d)(\s*/\s*mb)?$").expect("valid duration regex")
});

/// Error returned when a forecast string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForecastParseError {
    #[error("unparsable size forecast: {0:?}")]
    Size(String),
    #[error("unparsable duration forecast: {0:?}")]
    Duration(String),
}

// ---------------------------------------------------------------------------
// SizeForecast
// ---------------------------------------------------------------------------

/// Forecast of the output size a process produces for a given input size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SizeForecast {
    /// Output size is the input size times this factor.
    Multiplier(f64),
    /// Output size does not depend on the input.
    Absolute(u64),
}

impl SizeForecast {
    /// Expected output size for `input_bytes` of input.
    #[must_use]
    pub fn expected_result_size_in_bytes(&self, input_bytes: u64) -> u64 {
        match *self {
            Self::Multiplier(factor) => {
                // Float precision loss is irrelevant at forecast granularity.
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss
                )]
                let expected = (input_bytes as f64 * factor).ceil() as u64;
                expected
            }
            Self::Absolute(bytes) => bytes,
        }
    }
}

impl Default for SizeForecast {
    fn default() -> Self {
        Self::Multiplier(1.0)
    }
}

impl FromStr for SizeForecast {
    type Err = ForecastParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ForecastParseError::Size(s.to_string());
        if let Some(caps) = SIZE_MULTIPLIER.captures(trimmed) {
            let factor: f64 = caps[1].parse().map_err(|_| err())?;
            return Ok(Self::Multiplier(factor));
        }
        if let Some(caps) = SIZE_ABSOLUTE.captures(trimmed) {
            let value: u64 = caps[1].parse().map_err(|_| err())?;
            let unit: u64 = match caps[2].to_ascii_lowercase().as_str() {
                "" => 1,
                "k" => 1024,
                "m" => MEGABYTE,
                "g" => MEGABYTE * 1024,
                "t" => MEGABYTE * 1024 * 1024,
                _ => return Err(err()),
            };
            return value.checked_mul(unit).map(Self::Absolute).ok_or_else(err);
        }
        Err(err())
    }
}

impl TryFrom<String> for SizeForecast {
    type Error = ForecastParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeForecast> for String {
    fn from(value: SizeForecast) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SizeForecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multiplier(factor) => write!(f, "*{factor}"),
            Self::Absolute(bytes) => write!(f, "{bytes}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DurationForecast
// ---------------------------------------------------------------------------

/// Forecast of how long a process runs for a given input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DurationForecast {
    /// Duration does not depend on the input.
    Absolute(Duration),
    /// Duration per started megabyte of input.
    PerMegabyte(Duration),
}

impl DurationForecast {
    /// Expected running duration for `input_bytes` of input.
    ///
    /// Per-megabyte forecasts count at least one megabyte so an empty input
    /// still gets a usable timeout.
    #[must_use]
    pub fn expected_running_duration(&self, input_bytes: u64) -> Duration {
        match *self {
            Self::Absolute(d) => d,
            Self::PerMegabyte(per_mb) => {
                let megabytes = input_bytes.div_ceil(MEGABYTE).max(1);
                let factor = u32::try_from(megabytes).unwrap_or(u32::MAX);
                per_mb.saturating_mul(factor)
            }
        }
    }
}

impl Default for DurationForecast {
    fn default() -> Self {
        Self::Absolute(Duration::from_secs(600))
    }
}

impl FromStr for DurationForecast {
    type Err = ForecastParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ForecastParseError::Duration(s.to_string());
        let caps = DURATION.captures(s.trim()).ok_or_else(err)?;
        let value: u64 = caps[1].parse().map_err(|_| err())?;
        let duration = match caps[2].to_ascii_lowercase().as_str() {
            "ms" => Duration::from_millis(value),
            "s" | "sec" => Duration::from_secs(value),
            "min" | "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(err)?),
            "h" => Duration::from_secs(value.checked_mul(3_600).ok_or_else(err)?),
            "d" => Duration::from_secs(value.checked_mul(86_400).ok_or_else(err)?),
            _ => return Err(err()),
        };
        if caps.get(3).is_some() {
            Ok(Self::PerMegabyte(duration))
        } else {
            Ok(Self::Absolute(duration))
        }
    }
}

impl TryFrom<String> for DurationForecast {
    type Error = ForecastParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DurationForecast> for String {
    fn from(value: DurationForecast) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DurationForecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(d) => write!(f, "{}ms", d.as_millis()),
            Self::PerMegabyte(d) => write!(f, "{}ms/mb", d.as_millis()),
        }
    }
}
