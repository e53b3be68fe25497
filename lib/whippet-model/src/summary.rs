//! Summary snapshots.

use std::slice;

use crate::{exemplar::Exemplars, labels::Labels, metadata::MetricMetadata};

/// An emitted quantile: a φ value paired with the estimated value at that
/// quantile.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Quantile {
    quantile: f64,
    value: f64,
}

impl Quantile {
    /// Creates a new quantile/value pair.
    pub fn new(quantile: f64, value: f64) -> Self {
        Self { quantile, value }
    }

    /// The φ value.
    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    /// The estimated value at this quantile. May be `NaN` when the source
    /// estimator held no observations.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// An immutable list of emitted quantiles, in the order the targets were
/// configured.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Quantiles(Vec<Quantile>);

impl Quantiles {
    /// The empty list.
    pub const EMPTY: Quantiles = Quantiles(Vec::new());

    /// Creates a list from the given quantiles.
    pub fn of(quantiles: impl IntoIterator<Item = Quantile>) -> Self {
        Self(quantiles.into_iter().collect())
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of quantiles in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the quantiles in configured order.
    pub fn iter(&self) -> slice::Iter<'_, Quantile> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Quantiles {
    type Item = &'a Quantile;
    type IntoIter = slice::Iter<'a, Quantile>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The state of a single summary data point at collection time.
///
/// Immutable once constructed. The scrape timestamp is left unset by metric
/// cores; the exposition collaborator fills it in when relevant.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SummaryDataPointSnapshot {
    count: u64,
    sum: f64,
    quantiles: Quantiles,
    labels: Labels,
    exemplars: Exemplars,
    created_timestamp_ms: i64,
    scrape_timestamp_ms: Option<i64>,
}

impl SummaryDataPointSnapshot {
    /// Creates a new data point snapshot.
    pub fn new(
        count: u64, sum: f64, quantiles: Quantiles, labels: Labels, exemplars: Exemplars, created_timestamp_ms: i64,
    ) -> Self {
        Self {
            count,
            sum,
            quantiles,
            labels,
            exemplars,
            created_timestamp_ms,
            scrape_timestamp_ms: None,
        }
    }

    /// Returns a copy of this snapshot with the scrape timestamp set.
    pub fn with_scrape_timestamp_ms(mut self, scrape_timestamp_ms: i64) -> Self {
        self.scrape_timestamp_ms = Some(scrape_timestamp_ms);
        self
    }

    /// Number of observations reflected in this snapshot.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all observed values.
    ///
    /// May be `NaN` if both infinities were observed, per IEEE semantics.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// The emitted quantiles, in configured order.
    pub fn quantiles(&self) -> &Quantiles {
        &self.quantiles
    }

    /// The labels identifying this data point.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Exemplars sampled for this data point. May be empty.
    pub fn exemplars(&self) -> &Exemplars {
        &self.exemplars
    }

    /// When the data point was created, in milliseconds since the epoch.
    pub fn created_timestamp_ms(&self) -> i64 {
        self.created_timestamp_ms
    }

    /// When the data point was scraped, if set by the collector.
    pub fn scrape_timestamp_ms(&self) -> Option<i64> {
        self.scrape_timestamp_ms
    }
}

/// A complete summary metric snapshot: metadata plus one data point per
/// label set.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SummarySnapshot {
    metadata: MetricMetadata,
    data: Vec<SummaryDataPointSnapshot>,
}

impl SummarySnapshot {
    /// Creates a new summary snapshot.
    ///
    /// Data points are ordered by their labels ascending, regardless of the
    /// order they are supplied in.
    pub fn new(metadata: MetricMetadata, mut data: Vec<SummaryDataPointSnapshot>) -> Self {
        data.sort_by(|a, b| a.labels.cmp(&b.labels));
        Self { metadata, data }
    }

    /// The metric metadata.
    pub fn metadata(&self) -> &MetricMetadata {
        &self.metadata
    }

    /// The data points, ordered by labels ascending.
    pub fn data(&self) -> &[SummaryDataPointSnapshot] {
        &self.data
    }
}
