//! Label sets.

use std::{fmt, slice, sync::LazyLock};

use regex::Regex;
use snafu::ensure;

use crate::metadata::{DuplicateLabelNameSnafu, InvalidLabelNameSnafu, MetadataError};

static LABEL_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name regex should be valid"));

/// Tests whether a label name is valid.
///
/// A valid label name matches `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_REGEX.is_match(name)
}

/// A single name/value label pair.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Label {
    name: String,
    value: String,
}

impl Label {
    /// The label name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The label value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.value)
    }
}

/// An immutable set of labels, ordered by label name.
///
/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*` and be unique within the
/// set. The ordering of two label sets is the lexicographic ordering of
/// their (name, value) pairs, which is the ordering exposition formats
/// expect data points to be emitted in.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Labels(Vec<Label>);

impl Labels {
    /// The empty label set.
    pub const EMPTY: Labels = Labels(Vec::new());

    /// Creates a label set from name/value pairs.
    ///
    /// The pairs are sorted by name; the input order does not matter.
    ///
    /// # Errors
    ///
    /// If a label name is invalid or appears more than once, an error is
    /// returned.
    pub fn new<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Result<Self, MetadataError>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut labels = pairs
            .into_iter()
            .map(|(name, value)| Label {
                name: name.into(),
                value: value.into(),
            })
            .collect::<Vec<_>>();

        for label in &labels {
            ensure!(
                is_valid_label_name(&label.name),
                InvalidLabelNameSnafu { name: label.name.clone() }
            );
        }

        labels.sort();
        for window in labels.windows(2) {
            ensure!(
                window[0].name != window[1].name,
                DuplicateLabelNameSnafu {
                    name: window[0].name.clone()
                }
            );
        }

        Ok(Self(labels))
    }

    /// Creates a label set from parallel name and value slices.
    ///
    /// # Errors
    ///
    /// As for [`new`][Self::new]; additionally the slices must have equal
    /// length, which the caller is expected to have ensured.
    pub fn of(names: &[impl AsRef<str>], values: &[impl AsRef<str>]) -> Result<Self, MetadataError> {
        Self::new(
            names
                .iter()
                .zip(values.iter())
                .map(|(name, value)| (name.as_ref().to_string(), value.as_ref().to_string())),
        )
    }

    /// Returns `true` if the set contains no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of labels in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the value of the label with the given name, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|label| label.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    /// Returns `true` if the set contains a label with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Merges another label set into this one, returning a new set.
    ///
    /// Labels from `other` whose name is already present in this set are
    /// ignored.
    pub fn merge(&self, other: &Labels) -> Labels {
        let mut merged = self.0.clone();
        for label in &other.0 {
            if !self.contains(&label.name) {
                merged.push(label.clone());
            }
        }
        merged.sort();
        Labels(merged)
    }

    /// Iterates over the labels in name order.
    pub fn iter(&self) -> slice::Iter<'_, Label> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, label) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", label)?;
        }
        f.write_str("}")
    }
}
