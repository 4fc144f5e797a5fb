//! SQL helpers for the local observation cache.
//!
//! One table, `obs`, keyed by `(site, valid_time)`. All scans are ordered by
//! ascending `valid_time` with inclusive range bounds, which is what the
//! inventory walk and the window reducers both assume.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db::models::{NewObservation, PrecipitationRow, TemperatureRow};
use crate::errors::ObsError;
use crate::types::{PrecipitationOb, TemperatureOb, TimeRange};

/// File name of the cache database inside the cache directory.
const CACHE_FILE_NAME: &str = "wxobs.sqlite";

/// Rows older than this many days are deleted when the store closes.
/// Bounds the cache size without needing background garbage collection.
pub(crate) const RETENTION_DAYS: i64 = 555;

/// The cache is a single-writer store; one connection keeps SQLite lock
/// contention out of the picture.
const DB_POOL_MAX_CONNECTIONS: u32 = 1;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS obs (
  site          TEXT    NOT NULL, -- Synoptic Labs API site id
  valid_time    INTEGER NOT NULL, -- unix time stamp of the valid time, UTC
  t_f           REAL,             -- temperature in Fahrenheit
  precip_in_1hr REAL,             -- one hour precipitation in inches
  PRIMARY KEY (site, valid_time))";

/// Open the cache database, creating the directory chain, the file, and the
/// schema as needed.
pub(crate) async fn open_or_create(cache_dir: &Path) -> Result<SqlitePool, ObsError> {
    std::fs::create_dir_all(cache_dir).map_err(|e| {
        ObsError::CacheUnavailable(format!("cannot create {}: {}", cache_dir.display(), e))
    })?;

    let path = cache_dir.join(CACHE_FILE_NAME);
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(|e| {
            ObsError::CacheUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;

    sqlx::query(SCHEMA_SQL).execute(&pool).await.map_err(|e| {
        ObsError::CacheUnavailable(format!("cannot initialize {}: {}", path.display(), e))
    })?;

    Ok(pool)
}

/// Delete rows past the retention horizon. Returns how many went.
pub(crate) async fn prune_old_rows(pool: &SqlitePool, now: i64) -> Result<u64, sqlx::Error> {
    let cutoff = now - RETENTION_DAYS * 86_400;
    let result = sqlx::query("DELETE FROM obs WHERE valid_time < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Upsert one observation inside an open ingest transaction.
///
/// Last writer wins on the `(site, valid_time)` key, so re-downloading an
/// overlapping range simply refreshes the rows.
pub(crate) async fn insert_observation(
    tx: &mut Transaction<'_, Sqlite>,
    site: &str,
    ob: &NewObservation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR REPLACE INTO obs (valid_time, site, t_f, precip_in_1hr)
         VALUES (?, ?, ?, ?)",
    )
    .bind(ob.valid_time)
    .bind(site)
    .bind(ob.t_f)
    .bind(ob.precip_in_1hr)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Count rows for `site` with `tr.start <= valid_time <= tr.end`.
pub(crate) async fn count_in_range(
    pool: &SqlitePool,
    site: &str,
    tr: TimeRange,
) -> Result<usize, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(valid_time) FROM obs
         WHERE site = ? AND valid_time >= ? AND valid_time <= ?",
    )
    .bind(site)
    .bind(tr.start)
    .bind(tr.end)
    .fetch_one(pool)
    .await?;
    Ok(row.0 as usize)
}

/// Ascending scan of the timestamps present for `(site, tr)`.
pub(crate) async fn fetch_valid_times(
    pool: &SqlitePool,
    site: &str,
    tr: TimeRange,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT valid_time FROM obs
         WHERE site = ? AND valid_time >= ? AND valid_time <= ?
         ORDER BY valid_time ASC",
    )
    .bind(site)
    .bind(tr.start)
    .bind(tr.end)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Ascending scan of hourly temperatures for `(site, tr)`.
pub(crate) async fn fetch_temperatures(
    pool: &SqlitePool,
    site: &str,
    tr: TimeRange,
) -> Result<Vec<TemperatureOb>, sqlx::Error> {
    let rows: Vec<TemperatureRow> = sqlx::query_as(
        "SELECT valid_time, t_f FROM obs
         WHERE site = ? AND valid_time >= ? AND valid_time <= ?
         ORDER BY valid_time ASC",
    )
    .bind(site)
    .bind(tr.start)
    .bind(tr.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match row.t_f {
            Some(t_f) => Some(TemperatureOb {
                valid_time: row.valid_time,
                temperature_f: t_f,
            }),
            None => {
                tracing::debug!("skipping NULL temperature at {} for {}", row.valid_time, site);
                None
            }
        })
        .collect())
}

/// Ascending scan of hourly precipitation for `(site, tr)`.
pub(crate) async fn fetch_precipitation(
    pool: &SqlitePool,
    site: &str,
    tr: TimeRange,
) -> Result<Vec<PrecipitationOb>, sqlx::Error> {
    let rows: Vec<PrecipitationRow> = sqlx::query_as(
        "SELECT valid_time, precip_in_1hr FROM obs
         WHERE site = ? AND valid_time >= ? AND valid_time <= ?
         ORDER BY valid_time ASC",
    )
    .bind(site)
    .bind(tr.start)
    .bind(tr.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match row.precip_in_1hr {
            Some(precip_in) => Some(PrecipitationOb {
                valid_time: row.valid_time,
                precip_in,
            }),
            None => {
                tracing::debug!(
                    "skipping NULL precipitation at {} for {}",
                    row.valid_time,
                    site
                );
                None
            }
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fresh in-memory cache with the production schema.
    pub(crate) async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::query(SCHEMA_SQL).execute(&pool).await.expect("schema");
        pool
    }

    pub(crate) async fn insert_one(pool: &SqlitePool, site: &str, ob: NewObservation) {
        let mut tx = pool.begin().await.unwrap();
        insert_observation(&mut tx, site, &ob).await.unwrap();
        tx.commit().await.unwrap();
    }

    fn ob(valid_time: i64, t_f: f64, precip_in_1hr: f64) -> NewObservation {
        NewObservation {
            valid_time,
            t_f,
            precip_in_1hr,
        }
    }

    #[tokio::test]
    async fn test_insert_then_scan_returns_row_once() {
        let pool = test_pool().await;
        insert_one(&pool, "kden", ob(3_600, 32.5, 0.0)).await;

        let tr = TimeRange::new(0, 7_200).unwrap();
        let temps = fetch_temperatures(&pool, "kden", tr).await.unwrap();
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].valid_time, 3_600);
        assert_eq!(temps[0].temperature_f, 32.5);
    }

    #[tokio::test]
    async fn test_insert_is_upsert_last_writer_wins() {
        let pool = test_pool().await;
        insert_one(&pool, "kden", ob(3_600, 32.5, 0.0)).await;
        insert_one(&pool, "kden", ob(3_600, 30.0, 0.1)).await;

        let tr = TimeRange::new(0, 7_200).unwrap();
        assert_eq!(count_in_range(&pool, "kden", tr).await.unwrap(), 1);

        let temps = fetch_temperatures(&pool, "kden", tr).await.unwrap();
        assert_eq!(temps[0].temperature_f, 30.0);
        let precip = fetch_precipitation(&pool, "kden", tr).await.unwrap();
        assert_eq!(precip[0].precip_in, 0.1);
    }

    #[tokio::test]
    async fn test_count_bounds_are_inclusive() {
        let pool = test_pool().await;
        for hour in 0..4 {
            insert_one(&pool, "kden", ob(hour * 3_600, 10.0, 0.0)).await;
        }

        let tr = TimeRange::new(3_600, 7_200).unwrap();
        assert_eq!(count_in_range(&pool, "kden", tr).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_scans_are_site_scoped() {
        let pool = test_pool().await;
        insert_one(&pool, "kden", ob(3_600, 10.0, 0.0)).await;
        insert_one(&pool, "kmso", ob(3_600, 20.0, 0.0)).await;

        let tr = TimeRange::new(0, 7_200).unwrap();
        let temps = fetch_temperatures(&pool, "kden", tr).await.unwrap();
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].temperature_f, 10.0);
    }

    #[tokio::test]
    async fn test_scan_order_is_ascending() {
        let pool = test_pool().await;
        for hour in [5_i64, 1, 3, 2, 4] {
            insert_one(&pool, "kden", ob(hour * 3_600, hour as f64, 0.0)).await;
        }

        let tr = TimeRange::new(0, 6 * 3_600).unwrap();
        let times = fetch_valid_times(&pool, "kden", tr).await.unwrap();
        assert_eq!(times, vec![3_600, 7_200, 10_800, 14_400, 18_000]);
    }

    #[tokio::test]
    async fn test_prune_deletes_only_expired_rows() {
        let pool = test_pool().await;
        let now = 1_700_000_000;
        let horizon = now - RETENTION_DAYS * 86_400;
        insert_one(&pool, "kden", ob(horizon - 1, 10.0, 0.0)).await;
        insert_one(&pool, "kden", ob(horizon, 11.0, 0.0)).await;
        insert_one(&pool, "kden", ob(now, 12.0, 0.0)).await;

        let pruned = prune_old_rows(&pool, now).await.unwrap();
        assert_eq!(pruned, 1);

        let tr = TimeRange::new(0, now).unwrap();
        assert_eq!(count_in_range(&pool, "kden", tr).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_inserts() {
        let pool = test_pool().await;
        let mut tx = pool.begin().await.unwrap();
        insert_observation(&mut tx, "kden", &ob(3_600, 32.5, 0.0))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let tr = TimeRange::new(0, 7_200).unwrap();
        assert_eq!(count_in_range(&pool, "kden", tr).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_null_temperature_rows_are_skipped() {
        let pool = test_pool().await;
        sqlx::query("INSERT INTO obs (valid_time, site, t_f, precip_in_1hr) VALUES (3600, 'kden', NULL, 0.2)")
            .execute(&pool)
            .await
            .unwrap();

        let tr = TimeRange::new(0, 7_200).unwrap();
        let temps = fetch_temperatures(&pool, "kden", tr).await.unwrap();
        assert!(temps.is_empty());
        // The precipitation column is populated, so that scan still sees it.
        let precip = fetch_precipitation(&pool, "kden", tr).await.unwrap();
        assert_eq!(precip.len(), 1);
    }
}
