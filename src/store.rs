//! The observation store: the public handle tying the cache, the upstream
//! feed, and the window reducers together.
//!
//! Every query follows the same shape: normalize the site id, widen the scan
//! range so the first window's lookback is covered, backfill whatever the
//! cache is missing, then reduce the (possibly still partial) scan. Missing
//! data never fails a query — temperature windows come back NaN and
//! precipitation windows come back 0.0.

use sqlx::SqlitePool;

use crate::config::StoreConfig;
use crate::db::{inventory, queries};
use crate::errors::ObsError;
use crate::services::aggregate::{self, Extreme};
use crate::services::ingest;
use crate::services::synoptic::SynopticClient;
use crate::types::{PrecipitationOb, TemperatureOb, TimeRange};

/// Longest site identifier kept after normalization (bytes).
const MAX_SITE_LEN: usize = 31;

const HOUR_SECS: i64 = 3_600;

/// A handle to the local observation archive.
///
/// Queries are answered from the cache; stretches the cache does not cover
/// are downloaded first. Queries take `&mut self`: one handle serves one
/// call at a time, which is also the cache's single-writer contract.
#[derive(Debug)]
pub struct ObsStore {
    pool: SqlitePool,
    config: StoreConfig,
    /// Built on the first download, reused for every later one.
    client: Option<SynopticClient>,
}

impl ObsStore {
    /// Connect to the default store under `$HOME/.local/share/obsdb/`,
    /// creating the cache on first use.
    ///
    /// `api_key` is the Synoptic Labs token sent with every download.
    pub async fn connect(api_key: &str) -> Result<Self, ObsError> {
        Self::connect_with(StoreConfig::new(api_key)?).await
    }

    /// Connect with explicit configuration (cache location, upstream
    /// endpoint, User-Agent).
    pub async fn connect_with(config: StoreConfig) -> Result<Self, ObsError> {
        let pool = queries::open_or_create(&config.cache_dir).await?;
        Ok(Self {
            pool,
            config,
            client: None,
        })
    }

    /// Close the store, consuming the handle.
    ///
    /// Prunes rows past the retention horizon, then releases the cache and
    /// the HTTP client. A prune failure is logged but does not fail the
    /// close; the cache just stays a little larger until next time.
    pub async fn close(self) {
        let now = chrono::Utc::now().timestamp();
        match queries::prune_old_rows(&self.pool, now).await {
            Ok(pruned) if pruned > 0 => {
                tracing::debug!("pruned {} expired observations", pruned);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to prune expired observations: {}", e),
        }
        self.pool.close().await;
    }

    /// Maximum temperatures, one per UTC day.
    ///
    /// Each result covers the `window_length` hours before its `valid_time`
    /// (a window end, aligned to 00:00 UTC). Windows with no data carry
    /// `f64::NAN`. `window_end` is reserved and currently ignored beyond
    /// validation; windows always end at midnight UTC.
    ///
    /// # Panics
    ///
    /// Panics when `time_range` is empty or inverted, `window_end > 24`, or
    /// `window_length == 0`; these are caller contract violations, not
    /// runtime conditions.
    pub async fn query_max_t(
        &mut self,
        site: &str,
        time_range: TimeRange,
        window_end: u32,
        window_length: u32,
    ) -> Result<Vec<TemperatureOb>, ObsError> {
        self.query_temperatures(site, time_range, window_end, window_length, Extreme::Max)
            .await
    }

    /// Minimum temperatures, one per UTC day.
    ///
    /// Same contract as [`ObsStore::query_max_t`].
    ///
    /// # Panics
    ///
    /// Same conditions as [`ObsStore::query_max_t`].
    pub async fn query_min_t(
        &mut self,
        site: &str,
        time_range: TimeRange,
        window_end: u32,
        window_length: u32,
    ) -> Result<Vec<TemperatureOb>, ObsError> {
        self.query_temperatures(site, time_range, window_end, window_length, Extreme::Min)
            .await
    }

    /// Accumulated precipitation in inches.
    ///
    /// One result per `window_increment` hours, each summing the
    /// `window_length` hours before its `valid_time`. Windows with no data
    /// report 0.0. `window_offset` is reserved and currently ignored beyond
    /// validation; windows stay aligned to 00:00 UTC.
    ///
    /// # Panics
    ///
    /// Panics when `time_range` is empty or inverted, `window_offset > 24`,
    /// or `window_length`/`window_increment` is zero.
    pub async fn query_precipitation(
        &mut self,
        site: &str,
        time_range: TimeRange,
        window_length: u32,
        window_increment: u32,
        window_offset: u32,
    ) -> Result<Vec<PrecipitationOb>, ObsError> {
        assert!(
            time_range.start < time_range.end,
            "time range must span more than an instant"
        );
        assert!(window_offset <= 24, "window_offset is an hour of the UTC day");
        assert!(window_length >= 1, "window_length must be at least one hour");
        assert!(
            window_increment >= 1,
            "window_increment must be at least one hour"
        );
        let site = normalize_site(site);
        let scan_tr = self.ensure_coverage(&site, time_range, window_length).await?;
        let hourlies = queries::fetch_precipitation(&self.pool, &site, scan_tr).await?;
        aggregate::reduce_precipitation(&hourlies, time_range, window_length, window_increment)
    }

    async fn query_temperatures(
        &mut self,
        site: &str,
        time_range: TimeRange,
        window_end: u32,
        window_length: u32,
        mode: Extreme,
    ) -> Result<Vec<TemperatureOb>, ObsError> {
        assert!(
            time_range.start < time_range.end,
            "time range must span more than an instant"
        );
        assert!(window_end <= 24, "window_end is an hour of the UTC day");
        assert!(window_length >= 1, "window_length must be at least one hour");
        let site = normalize_site(site);
        let scan_tr = self.ensure_coverage(&site, time_range, window_length).await?;
        let hourlies = queries::fetch_temperatures(&self.pool, &site, scan_tr).await?;
        aggregate::reduce_temperatures(&hourlies, time_range, mode, window_length)
    }

    /// Widen the scan range to cover the first window's lookback, then
    /// backfill every stretch the cache is missing, in ascending order.
    ///
    /// The first failed backfill aborts the query; rows committed for
    /// earlier stretches stay cached and shrink the next attempt.
    async fn ensure_coverage(
        &mut self,
        site: &str,
        tr: TimeRange,
        window_length: u32,
    ) -> Result<TimeRange, ObsError> {
        let scan_tr = TimeRange {
            start: tr.start - HOUR_SECS * i64::from(window_length),
            end: tr.end,
        };

        let valid_times = queries::fetch_valid_times(&self.pool, site, scan_tr).await?;
        let missing = inventory::missing_ranges(scan_tr, &valid_times);
        if missing.is_empty() {
            tracing::debug!("cache already covers {} for {}", scan_tr, site);
            return Ok(scan_tr);
        }

        tracing::debug!("{} missing stretches of {} for {}", missing.len(), scan_tr, site);

        let client = self.client.get_or_insert_with(|| {
            SynopticClient::new(&self.config.base_url, &self.config.user_agent)
        });

        for gap in missing {
            ingest::backfill_range(&self.pool, client, &self.config.api_key, site, gap).await?;
        }

        let cached = queries::count_in_range(&self.pool, site, scan_tr).await?;
        tracing::debug!("{} rows now cover {} for {}", cached, scan_tr, site);

        Ok(scan_tr)
    }
}

/// Lowercase a site id into the ≤31-byte form used as the cache key.
fn normalize_site(site: &str) -> String {
    let mut normalized = site.to_ascii_lowercase();
    if normalized.len() > MAX_SITE_LEN {
        let mut cut = MAX_SITE_LEN;
        while !normalized.is_char_boundary(cut) {
            cut -= 1;
        }
        normalized.truncate(cut);
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_site_lowercases() {
        assert_eq!(normalize_site("KDEN"), "kden");
        assert_eq!(normalize_site("kMsO"), "kmso");
    }

    #[test]
    fn test_normalize_site_truncates_to_31_bytes() {
        let long = "a".repeat(40);
        assert_eq!(normalize_site(&long).len(), 31);
    }

    #[test]
    fn test_normalize_site_respects_char_boundaries() {
        // 16 two-byte characters: byte 31 falls mid-character.
        let long = "é".repeat(16);
        let normalized = normalize_site(&long);
        assert!(normalized.len() <= 31);
        assert_eq!(normalized, "é".repeat(15));
    }
}
