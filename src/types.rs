//! Public observation types.
//!
//! All timestamps are Unix epoch seconds, UTC. Aggregated observations stamp
//! `valid_time` with the **end** of the window they summarize; the window
//! length has to be deduced from the query that produced them.

use std::fmt;

use chrono::DateTime;
use serde::Serialize;

/// An inclusive range of UTC epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    /// Start of the range; never after `end`.
    pub start: i64,
    /// End of the range; never before `start`.
    pub end: i64,
}

impl TimeRange {
    /// Build a range, rejecting the inverted case.
    ///
    /// Returns `None` when `start > end`.
    pub fn new(start: i64, end: i64) -> Option<Self> {
        if start > end {
            return None;
        }
        Some(Self { start, end })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            DateTime::from_timestamp(self.start, 0),
            DateTime::from_timestamp(self.end, 0),
        ) {
            (Some(start), Some(end)) => write!(
                f,
                "TimeRange [{} -> {}]",
                start.format("%Y-%m-%d %H%M"),
                end.format("%Y-%m-%d %H%M")
            ),
            // Out-of-range timestamps still get a readable rendering.
            _ => write!(f, "TimeRange [{} -> {}]", self.start, self.end),
        }
    }
}

/// A temperature observation in degrees Fahrenheit.
///
/// Hourly rows carry the observation time; aggregated results carry the end
/// of the aggregation window. A window with no usable data in range carries
/// `f64::NAN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureOb {
    pub valid_time: i64,
    pub temperature_f: f64,
}

/// A precipitation accumulation in inches.
///
/// `valid_time` is the end of the accumulation period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrecipitationOb {
    pub valid_time: i64,
    pub precip_in: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_new_accepts_ordered() {
        let tr = TimeRange::new(100, 200).unwrap();
        assert_eq!(tr.start, 100);
        assert_eq!(tr.end, 200);
    }

    #[test]
    fn test_time_range_new_accepts_degenerate() {
        // Inclusive semantics make a single-instant range legal.
        assert!(TimeRange::new(100, 100).is_some());
    }

    #[test]
    fn test_time_range_new_rejects_inverted() {
        assert!(TimeRange::new(200, 100).is_none());
    }

    #[test]
    fn test_time_range_display() {
        // 2021-01-01T00:00:00Z -> 2021-01-03T06:30:00Z
        let tr = TimeRange::new(1609459200, 1609655400).unwrap();
        assert_eq!(
            tr.to_string(),
            "TimeRange [2021-01-01 0000 -> 2021-01-03 0630]"
        );
    }
}
