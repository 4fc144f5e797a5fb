use sqlx::FromRow;

/// A fully parsed hourly observation ready for insertion.
///
/// Precipitation that parsed as "missing" upstream is stored as `0.0`; the
/// trace rule at aggregation time keeps sub-hundredth reports meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NewObservation {
    pub valid_time: i64,
    pub t_f: f64,
    pub precip_in_1hr: f64,
}

/// One `(valid_time, t_f)` row from a temperature scan.
///
/// `t_f` is nullable in the schema; scans skip NULL rows rather than fail.
#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct TemperatureRow {
    pub valid_time: i64,
    pub t_f: Option<f64>,
}

/// One `(valid_time, precip_in_1hr)` row from a precipitation scan.
#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct PrecipitationRow {
    pub valid_time: i64,
    pub precip_in_1hr: Option<f64>,
}
