//! Exemplars.

use std::slice;

use crate::labels::Labels;

/// An auxiliary sample attached to a metric observation, carrying labels
/// that correlate it with a trace.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Exemplar {
    value: f64,
    labels: Labels,
    timestamp_ms: Option<i64>,
}

impl Exemplar {
    /// Conventional label name for the trace identifier.
    pub const TRACE_ID: &'static str = "trace_id";

    /// Conventional label name for the span identifier.
    pub const SPAN_ID: &'static str = "span_id";

    /// Creates a new exemplar.
    pub fn new(value: f64, labels: Labels, timestamp_ms: Option<i64>) -> Self {
        Self {
            value,
            labels,
            timestamp_ms,
        }
    }

    /// The observed value this exemplar was sampled from.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The exemplar labels, typically trace/span identifiers.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The timestamp the exemplar was sampled at, in milliseconds since the
    /// epoch, if known.
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }
}

/// An immutable collection of exemplars.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Exemplars(Vec<Exemplar>);

impl Exemplars {
    /// The empty collection.
    pub const EMPTY: Exemplars = Exemplars(Vec::new());

    /// Creates a collection from the given exemplars.
    pub fn of(exemplars: impl IntoIterator<Item = Exemplar>) -> Self {
        Self(exemplars.into_iter().collect())
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of exemplars in the collection.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the exemplars.
    pub fn iter(&self) -> slice::Iter<'_, Exemplar> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Exemplars {
    type Item = &'a Exemplar;
    type IntoIter = slice::Iter<'a, Exemplar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Exemplar> for Exemplars {
    fn from_iter<I: IntoIterator<Item = Exemplar>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
