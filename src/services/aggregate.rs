//! Windowed reduction of hourly scans.
//!
//! Both reducers share the same framing: window ends are aligned to 00:00
//! UTC of the day containing the range start and advance by the step (24 h
//! for temperatures, the caller's increment for precipitation). Every window
//! end lands strictly inside `(tr.start, tr.end]` and becomes the output's
//! `valid_time`. A window covers `(end - window_length hours, end]`.
//!
//! The hourly scan is consumed monotonically: a cursor remembers the
//! earliest row still relevant to a future window, so a full reduction is
//! O(rows + windows) even with overlapping precipitation windows.

use crate::errors::ObsError;
use crate::types::{PrecipitationOb, TemperatureOb, TimeRange};

const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Reported amounts in `(0, 0.01)` inches are trace: flagged, never summed.
const TRACE_CEILING_IN: f64 = 0.01;
/// A trace-flagged window whose sum stays below this reports the trace amount.
const TRACE_FLOOR_IN: f64 = 0.005;
/// The amount reported for a trace-only window.
const TRACE_AMOUNT_IN: f64 = 0.001;

/// Whether a temperature window keeps its largest or smallest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extreme {
    Max,
    Min,
}

/// The end of the first window: midnight UTC of the day containing
/// `tr_start`, stepped forward until strictly past the range start.
fn first_window_end(tr_start: i64, step_secs: i64) -> i64 {
    // Unix time has no leap seconds, so UTC days are exactly 86 400 s.
    let day_start = tr_start.div_euclid(DAY_SECS) * DAY_SECS;
    let mut end_prd = day_start;
    while end_prd <= tr_start {
        end_prd += step_secs;
    }
    end_prd
}

/// Upper bound on the number of windows a range can produce.
fn window_count(tr: TimeRange, step_hours: u32) -> Result<usize, ObsError> {
    let diff_seconds = tr.end as f64 - tr.start as f64;
    debug_assert!(diff_seconds >= 0.0, "backwards TimeRange");

    let num_results = (diff_seconds + 1.0) / 3_600.0 / step_hours as f64;
    if num_results >= usize::MAX as f64 / 2.0 {
        return Err(ObsError::WindowExplosion);
    }

    Ok(num_results as usize)
}

/// Reduce an ascending hourly temperature scan to one extreme per UTC day.
///
/// Windows with no in-range rows still appear, carrying `f64::NAN`.
pub(crate) fn reduce_temperatures(
    hourlies: &[TemperatureOb],
    tr: TimeRange,
    mode: Extreme,
    window_length: u32,
) -> Result<Vec<TemperatureOb>, ObsError> {
    let max_results = window_count(tr, 24)?;
    let mut results = Vec::with_capacity(max_results);

    let mut cursor = 0usize;
    let mut end_prd = first_window_end(tr.start, DAY_SECS);
    while end_prd <= tr.end && results.len() < max_results {
        let window_start = end_prd - HOUR_SECS * i64::from(window_length);
        let value = extreme_in_window(hourlies, &mut cursor, window_start, end_prd, mode);
        results.push(TemperatureOb {
            valid_time: end_prd,
            temperature_f: value,
        });
        end_prd += DAY_SECS;
    }

    Ok(results)
}

/// Fold the values inside `(start, end]`, advancing `cursor` past rows that
/// can no longer matter to any later window.
fn extreme_in_window(
    hourlies: &[TemperatureOb],
    cursor: &mut usize,
    start: i64,
    end: i64,
    mode: Extreme,
) -> f64 {
    let mut value = f64::NAN;

    for ob in &hourlies[*cursor..] {
        if ob.valid_time <= start {
            *cursor += 1;
            continue;
        }
        if ob.valid_time > end {
            break;
        }

        if value.is_nan()
            || (mode == Extreme::Max && ob.temperature_f > value)
            || (mode == Extreme::Min && ob.temperature_f < value)
        {
            value = ob.temperature_f;
        }
    }

    value
}

/// Reduce an ascending hourly precipitation scan to accumulations, one per
/// `window_increment` hours, each summing the `window_length` hours before
/// its end. Windows with no in-range rows report 0.0.
pub(crate) fn reduce_precipitation(
    hourlies: &[PrecipitationOb],
    tr: TimeRange,
    window_length: u32,
    window_increment: u32,
) -> Result<Vec<PrecipitationOb>, ObsError> {
    let step_secs = HOUR_SECS * i64::from(window_increment);
    let max_results = window_count(tr, window_increment)?;
    let mut results = Vec::with_capacity(max_results);

    let mut cursor = 0usize;
    let mut end_prd = first_window_end(tr.start, step_secs);
    while end_prd <= tr.end && results.len() < max_results {
        let window_start = end_prd - HOUR_SECS * i64::from(window_length);
        let accum = accumulation_in_window(hourlies, &mut cursor, window_start, end_prd);
        results.push(PrecipitationOb {
            valid_time: end_prd,
            precip_in: accum,
        });
        end_prd += step_secs;
    }

    Ok(results)
}

/// Accumulate precipitation inside `(start, end]`.
///
/// The upstream can stamp several running totals inside one UTC hour
/// (15-minute reports); summing them would double count, so only the last
/// value per UTC hour contributes. Trace reports in `(0, 0.01)` never add to
/// the sum, but a window with nothing except trace reports returns 0.001 so
/// measurable-but-tiny events stay visible.
fn accumulation_in_window(
    hourlies: &[PrecipitationOb],
    cursor: &mut usize,
    start: i64,
    end: i64,
) -> f64 {
    let mut sum = 0.0;
    let mut last_hour: i32 = -1;
    let mut last_hour_val = 0.0;
    let mut trace_flag = false;

    for ob in &hourlies[*cursor..] {
        if ob.valid_time <= start {
            *cursor += 1;
            continue;
        }
        if ob.valid_time > end {
            break;
        }

        let val = ob.precip_in;
        if val > 0.0 && val < TRACE_CEILING_IN {
            trace_flag = true;
        } else {
            let hour = utc_hour(ob.valid_time);
            if hour != last_hour {
                sum += last_hour_val;
            }
            last_hour = hour;
            last_hour_val = val;
        }
    }

    sum += last_hour_val;

    if trace_flag && sum < TRACE_FLOOR_IN {
        return TRACE_AMOUNT_IN;
    }

    sum
}

/// Hour of the UTC day for an epoch timestamp.
fn utc_hour(t: i64) -> i32 {
    t.div_euclid(HOUR_SECS).rem_euclid(24) as i32
}
