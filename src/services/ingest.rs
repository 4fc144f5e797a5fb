//! CSV ingest pipeline: upstream body → observation rows → cache.
//!
//! The upstream body opens with `#`-prefixed commentary, then a header row
//! naming the columns, then one row per hourly observation. Column positions
//! are discovered from the header, never assumed. Each download lands in a
//! single transaction that commits only when the body tokenizes to the end,
//! so a framing error or insert failure leaves the cache exactly as it was.
//! Rows with bad cells are dropped individually and never abort an ingest.

use chrono::DateTime;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db::models::NewObservation;
use crate::db::queries;
use crate::errors::ObsError;
use crate::services::synoptic::SynopticClient;
use crate::types::TimeRange;

/// Header substrings identifying the columns we keep. The upstream decorates
/// column names (units suffixes, set numbers), so matching is by substring.
const DATE_TIME_COL: &str = "Date_Time";
const AIR_TEMP_COL: &str = "air_temp_set_1";
const PRECIP_COL: &str = "precip_accum_one_hour_set_1";

/// Column positions resolved from the CSV header row.
#[derive(Debug, Clone, Copy, Default)]
struct ColumnMap {
    valid_time: Option<usize>,
    t_f: Option<usize>,
    precip_in_1hr: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &csv::StringRecord) -> Self {
        let mut map = Self::default();
        for (idx, name) in header.iter().enumerate() {
            if name.contains(DATE_TIME_COL) {
                map.valid_time = Some(idx);
            } else if name.contains(AIR_TEMP_COL) {
                map.t_f = Some(idx);
            } else if name.contains(PRECIP_COL) {
                map.precip_in_1hr = Some(idx);
            }
        }
        if map.valid_time.is_none() || map.t_f.is_none() {
            // Every data row will fail the per-row checks below; say why once.
            tracing::warn!("upstream CSV header is missing expected columns: {:?}", header);
        }
        map
    }
}

/// Parse one CSV record into an observation, or `None` to drop it.
///
/// Drop rules: missing or unparseable timestamp; missing or non-numeric
/// temperature; non-numeric precipitation. An empty or absent precipitation
/// cell reads as 0.0 because the upstream leaves it blank for dry hours.
fn parse_record(map: ColumnMap, record: &csv::StringRecord) -> Option<NewObservation> {
    let valid_time = match map
        .valid_time
        .and_then(|i| record.get(i))
        .and_then(|cell| DateTime::parse_from_rfc3339(cell).ok())
    {
        Some(dt) => dt.timestamp(),
        None => {
            tracing::debug!("dropping row with missing or unparseable Date_Time");
            return None;
        }
    };

    let t_f = match map
        .t_f
        .and_then(|i| record.get(i))
        .and_then(|cell| cell.parse::<f64>().ok())
    {
        Some(t_f) => t_f,
        None => {
            tracing::debug!("dropping row at {}: no usable temperature", valid_time);
            return None;
        }
    };

    let precip_in_1hr = match map.precip_in_1hr.and_then(|i| record.get(i)) {
        None => 0.0,
        Some(cell) if cell.is_empty() => 0.0,
        Some(cell) => match cell.parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!("dropping row at {}: unparseable precipitation", valid_time);
                return None;
            }
        },
    };

    Some(NewObservation {
        valid_time,
        t_f,
        precip_in_1hr,
    })
}

/// Tokenize a complete CSV body and insert every valid row inside `tx`.
///
/// Returns the number of rows inserted. The caller owns the commit/rollback
/// decision; any error out of here must roll the transaction back.
pub(crate) async fn ingest_csv(
    tx: &mut Transaction<'_, Sqlite>,
    site: &str,
    body: &[u8],
) -> Result<usize, ObsError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let map = ColumnMap::from_header(reader.headers()?);

    let mut inserted = 0usize;
    let mut record = csv::StringRecord::new();
    while reader.read_record(&mut record)? {
        if let Some(ob) = parse_record(map, &record) {
            queries::insert_observation(tx, site, &ob).await?;
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Fill one missing sub-range: fetch from upstream and ingest atomically.
pub(crate) async fn backfill_range(
    pool: &SqlitePool,
    client: &SynopticClient,
    api_key: &str,
    site: &str,
    tr: TimeRange,
) -> Result<usize, ObsError> {
    let body = client.fetch_timeseries(site, tr, api_key).await?;

    let mut tx = pool.begin().await?;
    match ingest_csv(&mut tx, site, &body).await {
        Ok(inserted) => {
            tx.commit().await?;
            tracing::debug!("cached {} observations for {} over {}", inserted, site, tr);
            Ok(inserted)
        }
        Err(err) => {
            tracing::error!("ingest for {} over {} failed, rolling back: {}", site, tr, err);
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("rollback also failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}
