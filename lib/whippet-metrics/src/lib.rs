//! Low-contention summary metric core.
//!
//! A [`Summary`] tracks configurable φ-quantiles over a moving time window
//! of observations, along with a running count and sum, for each distinct
//! label value tuple. Observations are made concurrently by application
//! threads and never block on snapshot collection; collection produces an
//! immutable, mutually consistent `(count, sum, quantiles)` view per data
//! point.
//!
//! Quantile estimation is delegated to the [`ckms`] crate's streaming
//! summary, rotated through a ring of age buckets so that emitted quantiles
//! reflect recent observations only.
//!
//! # Example
//!
//! ```
//! use whippet_metrics::Summary;
//!
//! let summary = Summary::builder("http_request_duration_seconds")
//!     .help("HTTP request service time in seconds")
//!     .label_names(["method", "path", "status_code"])
//!     .quantile_with_error(0.5, 0.01)
//!     .quantile_with_error(0.95, 0.001)
//!     .quantile_with_error(0.99, 0.001)
//!     .build()
//!     .unwrap();
//!
//! summary
//!     .with_label_values(&["GET", "/", "200"])
//!     .unwrap()
//!     .observe(0.024);
//!
//! let snapshot = summary.collect();
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

mod buffer;
mod config;
mod exemplar;
mod summary;
mod time;
mod window;

pub use config::SummaryDefaults;
pub use exemplar::{ExemplarSampler, ExemplarSamplerFactory};
pub use summary::{Summary, SummaryBuilder, SummaryDataPoint, SummaryError};
pub use time::{Clock, SystemClock};
pub use window::{SlidingWindow, WindowedEstimator};
