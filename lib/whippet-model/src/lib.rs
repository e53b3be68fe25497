//! Immutable metric snapshot model.
//!
//! This crate defines the data types shared between metric cores and
//! exposition collaborators: metric metadata (with Prometheus naming rules),
//! label sets, exemplars, and the summary snapshot shape. Everything here is
//! plain data, immutable after construction, and free of any collection or
//! formatting logic.
//!
//! # Feature Flags
//!
//! - `serde`: Enables serialization/deserialization for the snapshot types.
//!   **Warning**: The serialization format is not guaranteed to be stable.

#![deny(warnings)]
#![deny(missing_docs)]

mod exemplar;
mod labels;
mod metadata;
mod summary;

pub use exemplar::{Exemplar, Exemplars};
pub use labels::{is_valid_label_name, Label, Labels};
pub use metadata::{is_valid_metric_name, sanitize_metric_name, MetadataError, MetricMetadata, Unit};
pub use summary::{Quantile, Quantiles, SummaryDataPointSnapshot, SummarySnapshot};
