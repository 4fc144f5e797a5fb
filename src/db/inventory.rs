//! Cache inventory analysis — finding the holes in a requested time range.
//!
//! The gap walk is a pure function over the ascending timestamp scan so the
//! boundary rules stay unit-testable without a database.

use crate::types::TimeRange;

/// Consecutive observations farther apart than this are a gap. Hourly data
/// arrives every 3600 s; the slack tolerates clock skew and late reports
/// without declaring spurious gaps.
pub(crate) const GAP_THRESHOLD_SECS: i64 = 4_000;

/// Hard cap on the number of gaps enumerated for one request. Once hit,
/// enumeration stops and the caller proceeds with what was found.
pub(crate) const MAX_MISSING_RANGES: usize = 100;

/// List the sub-ranges of `tr` with no coverage, in ascending order.
///
/// `valid_times` must be the ascending timestamp scan for the same
/// `(site, tr)`. An empty result means the cache fully covers the range.
pub(crate) fn missing_ranges(tr: TimeRange, valid_times: &[i64]) -> Vec<TimeRange> {
    let mut gaps = Vec::new();

    let (&first, rest) = match valid_times.split_first() {
        Some(pair) => pair,
        None => {
            // Nothing cached at all; the whole range is missing.
            gaps.push(tr);
            return gaps;
        }
    };

    if first > tr.start && first - tr.start > GAP_THRESHOLD_SECS {
        gaps.push(TimeRange {
            start: tr.start,
            end: first,
        });
    }

    let mut prev = first;
    for &t in rest {
        if t - prev > GAP_THRESHOLD_SECS {
            gaps.push(TimeRange {
                start: prev,
                end: t,
            });
            if gaps.len() >= MAX_MISSING_RANGES {
                tracing::warn!("hit the {} missing-range cap inside {}", MAX_MISSING_RANGES, tr);
                return gaps;
            }
        }
        prev = t;
    }

    if tr.end > prev && tr.end - prev > GAP_THRESHOLD_SECS {
        gaps.push(TimeRange {
            start: prev,
            end: tr.end,
        });
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600;

    fn hourly(hours: impl IntoIterator<Item = i64>) -> Vec<i64> {
        hours.into_iter().map(|h| h * HOUR).collect()
    }

    #[test]
    fn test_empty_scan_is_one_full_gap() {
        let tr = TimeRange::new(0, 23 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &[]);
        assert_eq!(gaps, vec![tr]);
    }

    #[test]
    fn test_full_coverage_has_no_gaps() {
        // Hour 12 present: every step is 3600 s, under the threshold.
        let tr = TimeRange::new(0, 23 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &hourly(0..=23));
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_single_missing_hour_is_one_gap() {
        // Hours 00..11 and 13..23: the 11Z -> 13Z step is 7200 s.
        let times: Vec<i64> = hourly((0..=11).chain(13..=23));
        let tr = TimeRange::new(0, 23 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &times);
        assert_eq!(
            gaps,
            vec![TimeRange::new(11 * HOUR, 13 * HOUR).unwrap()]
        );
    }

    #[test]
    fn test_leading_gap() {
        let tr = TimeRange::new(0, 23 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &hourly(6..=23));
        assert_eq!(gaps, vec![TimeRange::new(0, 6 * HOUR).unwrap()]);
    }

    #[test]
    fn test_trailing_gap() {
        let tr = TimeRange::new(0, 23 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &hourly(0..=17));
        assert_eq!(gaps, vec![TimeRange::new(17 * HOUR, 23 * HOUR).unwrap()]);
    }

    #[test]
    fn test_offsets_at_threshold_are_not_gaps() {
        // Exactly 4000 s from the range start is tolerated, 4001 s is not.
        let tr = TimeRange::new(0, 2 * HOUR).unwrap();
        assert!(missing_ranges(tr, &[4_000, 2 * HOUR]).is_empty());
        assert_eq!(
            missing_ranges(tr, &[4_001, 2 * HOUR]),
            vec![TimeRange::new(0, 4_001).unwrap()]
        );
    }

    #[test]
    fn test_gaps_are_disjoint_and_ascending() {
        // Three separated clusters of hourly data.
        let times: Vec<i64> = hourly((0..=3).chain(10..=13).chain(20..=23));
        let tr = TimeRange::new(0, 23 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &times);

        assert_eq!(gaps.len(), 2);
        for pair in gaps.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for gap in &gaps {
            assert!(gap.start >= tr.start && gap.end <= tr.end);
        }
    }

    #[test]
    fn test_cap_stops_enumeration() {
        // Every other hour missing: alternating 2 h steps make one gap per
        // present pair. 300 present points two hours apart -> 299 gaps
        // before the cap.
        let times: Vec<i64> = (0..300).map(|i| i * 2 * HOUR).collect();
        let tr = TimeRange::new(0, 700 * HOUR).unwrap();
        let gaps = missing_ranges(tr, &times);

        assert_eq!(gaps.len(), MAX_MISSING_RANGES);
        // Enumeration stopped early: the trailing gap up to 700 h was never
        // emitted even though it exists.
        assert!(gaps.last().unwrap().end < 700 * HOUR);
    }
}
