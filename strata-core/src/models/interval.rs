use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MINUTE_MS;

/// Bar interval of a kline stream.
///
/// The 1m interval is the base stream delivered by the venues; everything
/// else is rolled up from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "8h")]
    H8,
}

/// Every interval the aggregator produces from the 1m stream.
pub const AGGREGATED_INTERVALS: [Interval; 6] = [
    Interval::M5,
    Interval::M15,
    Interval::M30,
    Interval::H1,
    Interval::H4,
    Interval::H8,
];

pub const ALL_INTERVALS: [Interval; 7] = [
    Interval::M1,
    Interval::M5,
    Interval::M15,
    Interval::M30,
    Interval::H1,
    Interval::H4,
    Interval::H8,
];

impl Interval {
    pub fn ms(&self) -> i64 {
        match self {
            Interval::M1 => MINUTE_MS,
            Interval::M5 => 5 * MINUTE_MS,
            Interval::M15 => 15 * MINUTE_MS,
            Interval::M30 => 30 * MINUTE_MS,
            Interval::H1 => 60 * MINUTE_MS,
            Interval::H4 => 240 * MINUTE_MS,
            Interval::H8 => 480 * MINUTE_MS,
        }
    }

    /// Number of 1m bars that make up one bar of this interval.
    pub fn multiplier(&self) -> usize {
        (self.ms() / MINUTE_MS) as usize
    }

    /// Archive length cap for streams of this interval.
    pub fn max_count(&self) -> usize {
        match self {
            Interval::M1 => 86_400,
            Interval::M5 => 17_280,
            Interval::M15 => 5_760,
            Interval::M30 => 2_880,
            Interval::H1 => 4_320,
            Interval::H4 => 360,
            Interval::H8 => 180,
        }
    }

    /// Archive key TTL: six months for 1h streams, two months otherwise.
    pub fn ttl_secs(&self) -> i64 {
        match self {
            Interval::H1 => 6 * 30 * 86_400,
            _ => 2 * 30 * 86_400,
        }
    }
}

/// Align a timestamp down onto the interval grid.
pub fn align(timestamp_ms: i64, interval_ms: i64) -> i64 {
    timestamp_ms - timestamp_ms.rem_euclid(interval_ms)
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::H8 => "8h",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "8h" => Ok(Interval::H8),
            other => Err(format!("unknown interval: {}", other)),
        }
    }
}
