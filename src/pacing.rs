//! Inter-item pacing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{HarvestError, Result};

/// Pause a worker takes after each item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Always the same delay.
    Fixed(Duration),
    /// Uniformly drawn from `[min, max]` on every pause.
    Range { min: Duration, max: Duration },
}

impl Pacing {
    /// No delay at all.
    pub fn none() -> Self {
        Pacing::Fixed(Duration::ZERO)
    }

    /// Fixed delay in seconds.
    pub fn fixed_secs(secs: f64) -> Result<Self> {
        Ok(Pacing::Fixed(seconds(secs, &secs.to_string())?))
    }

    /// Uniform delay in seconds. The bounds are swapped if given backwards.
    pub fn range_secs(min: f64, max: f64) -> Result<Self> {
        let input = format!("{},{}", min, max);
        let (min, max) = (seconds(min, &input)?, seconds(max, &input)?);
        Ok(Pacing::Range {
            min: min.min(max),
            max: min.max(max),
        })
    }

    /// Draws the next delay.
    pub fn sample(&self) -> Duration {
        match *self {
            Pacing::Fixed(d) => d,
            Pacing::Range { min, max } if min == max => min,
            Pacing::Range { min, max } => {
                let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
        }
    }

    /// Sleeps for the next delay.
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Fixed(Duration::from_secs(1))
    }
}

/// Converts non-negative seconds to a delay that fits a `Duration`.
fn seconds(secs: f64, input: &str) -> Result<Duration> {
    if secs < 0.0 {
        return Err(invalid(input));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid(input))
}

fn invalid(input: &str) -> HarvestError {
    HarvestError::Config(format!("invalid pacing '{}'", input))
}

fn parse_secs(raw: &str, input: &str) -> Result<f64> {
    raw.trim().parse().map_err(|_| invalid(input))
}

impl FromStr for Pacing {
    type Err = HarvestError;

    /// Parses `"1"` (fixed seconds) or `"0.8,1.2"` (uniform range).
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(',') {
            Some((min, max)) => Pacing::range_secs(parse_secs(min, s)?, parse_secs(max, s)?),
            None => Pacing::fixed_secs(parse_secs(s, s)?),
        }
    }
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pacing::Fixed(d) => write!(f, "{}", d.as_secs_f64()),
            Pacing::Range { min, max } => write!(f, "{},{}", min.as_secs_f64(), max.as_secs_f64()),
        }
    }
}

impl Serialize for Pacing {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pacing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(f64),
            Pair([f64; 2]),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(s) => Pacing::fixed_secs(s),
            Raw::Pair([min, max]) => Pacing::range_secs(min, max),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}
