//! obsdb — a local-first archive of hourly surface weather observations.
//!
//! Queries are answered from a SQLite cache under the user's data directory.
//! Stretches the cache does not cover are downloaded from the Synoptic Labs
//! timeseries feed, stored, and the query is then answered from the cache.
//! Results are windowed aggregates: daily maximum or minimum temperature in
//! degrees Fahrenheit, and accumulated precipitation in inches.
//!
//! ```no_run
//! use obsdb::{ObsStore, TimeRange};
//!
//! # async fn demo() -> Result<(), obsdb::ObsError> {
//! let mut store = ObsStore::connect("my-synoptic-token").await?;
//!
//! // Daily highs for Denver over the first two days of 2021.
//! let tr = TimeRange::new(1609459200, 1609632000).expect("start <= end");
//! let highs = store.query_max_t("kden", tr, 0, 24).await?;
//! for ob in &highs {
//!     println!("{}: {:.1} F", ob.valid_time, ob.temperature_f);
//! }
//!
//! store.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod db;
mod errors;
mod services;
mod store;
mod types;

pub use config::StoreConfig;
pub use errors::ObsError;
pub use store::ObsStore;
pub use types::{PrecipitationOb, TemperatureOb, TimeRange};
