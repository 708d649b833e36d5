//! Statistic kinds understood by queries and alarms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A statistic computed over one period bucket.
///
/// Percentiles are written `pNN` or `pNN.NN` on the wire (the extended
/// statistic form); everything else uses its plain name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Statistic {
    Average,
    Sum,
    Minimum,
    Maximum,
    SampleCount,
    Percentile(f64),
}

impl Statistic {
    /// Parse only the extended (percentile) form, as accepted by the
    /// `ExtendedStatistic` alarm field.
    pub fn parse_extended(s: &str) -> Result<Self, CoreError> {
        let unsupported = || {
            CoreError::validation(format!(
                "The value {s} for parameter ExtendedStatistic is not supported."
            ))
        };
        let rest = s
            .strip_prefix('p')
            .filter(|rest| is_plain_decimal(rest))
            .ok_or_else(unsupported)?;
        let p: f64 = rest.parse().map_err(|_| unsupported())?;
        if !(0.0..=100.0).contains(&p) {
            return Err(unsupported());
        }
        Ok(Statistic::Percentile(p))
    }

    /// Parse only the simple (non-percentile) form, as accepted by the
    /// `Statistic` alarm field.
    pub fn parse_simple(s: &str) -> Result<Self, CoreError> {
        match s {
            "Average" => Ok(Statistic::Average),
            "Sum" => Ok(Statistic::Sum),
            "Minimum" => Ok(Statistic::Minimum),
            "Maximum" => Ok(Statistic::Maximum),
            "SampleCount" => Ok(Statistic::SampleCount),
            other => Err(CoreError::validation(format!(
                "The value {other} for parameter Statistic is not supported."
            ))),
        }
    }

    pub fn is_percentile(&self) -> bool {
        matches!(self, Statistic::Percentile(_))
    }
}

impl FromStr for Statistic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('p') {
            Self::parse_extended(s)
        } else {
            Self::parse_simple(s)
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Average => f.write_str("Average"),
            Statistic::Sum => f.write_str("Sum"),
            Statistic::Minimum => f.write_str("Minimum"),
            Statistic::Maximum => f.write_str("Maximum"),
            Statistic::SampleCount => f.write_str("SampleCount"),
            Statistic::Percentile(p) => write!(f, "p{p}"),
        }
    }
}

impl TryFrom<String> for Statistic {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Statistic> for String {
    fn from(stat: Statistic) -> Self {
        stat.to_string()
    }
}

/// Digits with an optional fractional part: `99`, `99.9`. No sign,
/// exponent or special values.
fn is_plain_decimal(s: &str) -> bool {
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    match s.split_once('.') {
        Some((whole, fraction)) => all_digits(whole) && all_digits(fraction),
        None => all_digits(s),
    }
}
