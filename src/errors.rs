use thiserror::Error;

/// Everything that can go wrong while answering an observation query.
///
/// Violated caller preconditions (inverted time ranges, zero-length windows)
/// are programmer errors and panic instead of surfacing here.
#[derive(Debug, Error)]
pub enum ObsError {
    /// The cache file or its directory chain could not be created or opened.
    #[error("observation cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A read or write against the open cache failed.
    #[error("observation cache I/O error: {0}")]
    CacheIo(#[from] sqlx::Error),

    /// HTTP connect, transfer, or a non-2xx status from the upstream feed.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// The CSV tokenizer signaled a framing error. Bad cells in otherwise
    /// well-formed rows are dropped silently and never raise this.
    #[error("CSV framing error: {0}")]
    CsvParse(#[from] csv::Error),

    /// The computed number of output windows exceeds safe bounds.
    #[error("window count for the requested range exceeds safe bounds")]
    WindowExplosion,
}
