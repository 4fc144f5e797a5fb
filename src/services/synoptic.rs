//! Synoptic Labs timeseries client.
//!
//! Fetches hourly surface observations as CSV from the Synoptic Data API.
//! See: https://docs.synopticdata.com/services/time-series

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use chrono::DateTime;

use crate::errors::ObsError;
use crate::types::TimeRange;

/// Default endpoint of the Synoptic timeseries service.
pub(crate) const SYNOPTIC_API_URL: &str = "https://api.synopticdata.com/v2/stations/timeseries";

/// HTTP request timeout for Synoptic API calls (seconds). Downloads block
/// the caller, so this also bounds how long a query can stall on upstream.
const SYNOPTIC_HTTP_TIMEOUT_SECS: u64 = 60;

/// Client for the Synoptic timeseries feed.
///
/// Built once per store on the first download and reused for every later
/// one so connection setup is amortized across queries.
#[derive(Debug, Clone)]
pub(crate) struct SynopticClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl SynopticClient {
    pub(crate) fn new(base_url: &str, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SYNOPTIC_HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Build the request URL for `(site, tr)`.
    ///
    /// The endpoint wants UTC times as `YYYYMMDDHHMM` and english units so
    /// temperatures arrive in Fahrenheit and precipitation in inches.
    pub(crate) fn timeseries_url(
        &self,
        site: &str,
        tr: TimeRange,
        api_key: &str,
    ) -> Result<String, ObsError> {
        let start = format_synoptic_time(tr.start)?;
        let end = format_synoptic_time(tr.end)?;
        Ok(format!(
            "{}?stid={}&vars=air_temp,precip_accum_one_hour&units=english&output=csv&start={}&end={}&hfmetars=0&token={}",
            self.base_url, site, start, end, api_key
        ))
    }

    /// Issue one GET for `(site, tr)` and stream the CSV body into a buffer.
    ///
    /// Any connect failure, transfer failure, or non-2xx status maps to
    /// [`ObsError::UpstreamFetch`], so the caller never feeds a partial or
    /// error body to the ingest pipeline.
    pub(crate) async fn fetch_timeseries(
        &self,
        site: &str,
        tr: TimeRange,
        api_key: &str,
    ) -> Result<Vec<u8>, ObsError> {
        let url = self.timeseries_url(site, tr, api_key)?;

        // Log the range, never the URL: the URL carries the API key.
        tracing::debug!("requesting {} observations over {}", site, tr);

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| ObsError::UpstreamFetch(format!("invalid User-Agent: {}", e)))?,
        );

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ObsError::UpstreamFetch(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ObsError::UpstreamFetch(format!(
                "Synoptic returned HTTP {}",
                response.status()
            )));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ObsError::UpstreamFetch(format!("transfer failed: {}", e)))?;
            body.extend_from_slice(&chunk);
        }

        tracing::debug!("received {} bytes for {}", body.len(), site);
        Ok(body)
    }
}

/// Format an epoch timestamp the way the timeseries endpoint expects.
fn format_synoptic_time(t: i64) -> Result<String, ObsError> {
    DateTime::from_timestamp(t, 0)
        .map(|dt| dt.format("%Y%m%d%H%M").to_string())
        .ok_or_else(|| ObsError::UpstreamFetch(format!("timestamp {} is out of range", t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_synoptic_time() {
        // 2021-01-01T00:00:00Z and 2021-01-03T06:30:00Z
        assert_eq!(format_synoptic_time(1609459200).unwrap(), "202101010000");
        assert_eq!(format_synoptic_time(1609655400).unwrap(), "202101030630");
    }

    #[test]
    fn test_timeseries_url_is_bit_exact() {
        let client = SynopticClient::new(SYNOPTIC_API_URL, "test-agent");
        let tr = TimeRange::new(1609459200, 1609632000).unwrap();
        let url = client.timeseries_url("kden", tr, "secret-token").unwrap();
        assert_eq!(
            url,
            "https://api.synopticdata.com/v2/stations/timeseries?stid=kden\
             &vars=air_temp,precip_accum_one_hour&units=english&output=csv\
             &start=202101010000&end=202101030000&hfmetars=0&token=secret-token"
        );
    }

    #[test]
    fn test_timeseries_url_against_custom_base() {
        let client = SynopticClient::new("http://127.0.0.1:9999", "test-agent");
        let tr = TimeRange::new(0, 3600).unwrap();
        let url = client.timeseries_url("kmso", tr, "t").unwrap();
        assert!(url.starts_with("http://127.0.0.1:9999?stid=kmso&"));
    }
}
