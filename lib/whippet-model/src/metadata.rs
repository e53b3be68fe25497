//! Metric metadata and naming rules.

use std::{borrow::Cow, fmt, sync::LazyLock};

use regex::Regex;
use snafu::{ensure, Snafu};

static METRIC_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z_:][a-zA-Z0-9_:]+$").expect("metric name regex should be valid"));

// According to OpenMetrics, `_count` and `_sum` should also be reserved
// suffixes. However, popular instrumentation libraries expose many gauges
// with names ending in `_count` (e.g. `jvm_buffer_count`), so those suffixes
// are allowed here even though they can collide with a summary or histogram
// of the same base name.
const RESERVED_SUFFIXES: &[&str] = &["_total", "_created", "_bucket", "_info"];

/// Errors related to metric metadata and label naming.
#[derive(Clone, Debug, Eq, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum MetadataError {
    /// The metric name does not follow the Prometheus naming rules.
    #[snafu(display("'{}': illegal metric name", name))]
    InvalidMetricName {
        /// The rejected name.
        name: String,
    },

    /// The label name does not follow the Prometheus naming rules.
    #[snafu(display("'{}': illegal label name", name))]
    InvalidLabelName {
        /// The rejected name.
        name: String,
    },

    /// The same label name appears more than once in a label set.
    #[snafu(display("duplicate label name '{}'", name))]
    DuplicateLabelName {
        /// The duplicated name.
        name: String,
    },

    /// An empty string cannot be converted into a valid metric name.
    #[snafu(display("cannot convert an empty string into a valid metric name"))]
    EmptyMetricName,
}

/// Tests whether a metric name is valid.
///
/// A valid name matches `[a-zA-Z_:][a-zA-Z0-9_:]+` and does not end with one
/// of the reserved suffixes (`_total`, `_created`, `_bucket`, `_info`), which
/// are appended by exposition formats and would otherwise collide.
pub fn is_valid_metric_name(name: &str) -> bool {
    if RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return false;
    }
    METRIC_NAME_REGEX.is_match(name)
}

/// Converts an arbitrary string into a valid metric name.
///
/// Characters outside of `[a-zA-Z0-9_:]` are replaced with `_` (digits are
/// also replaced in the first position), and reserved suffixes are stripped
/// repeatedly. A name consisting of nothing but a reserved suffix loses its
/// leading underscore instead, so `"_total"` becomes `"total"`.
///
/// # Errors
///
/// If the input is empty, an error is returned.
pub fn sanitize_metric_name(metric_name: &str) -> Result<String, MetadataError> {
    ensure!(!metric_name.is_empty(), EmptyMetricNameSnafu);

    let mut sanitized = metric_name
        .chars()
        .enumerate()
        .map(|(i, ch)| match ch {
            ':' | 'a'..='z' | 'A'..='Z' | '_' => ch,
            '0'..='9' if i > 0 => ch,
            _ => '_',
        })
        .collect::<String>();

    let mut modified = true;
    while modified {
        modified = false;
        for suffix in RESERVED_SUFFIXES {
            if sanitized == *suffix {
                return Ok(suffix[1..].to_string());
            }
            if let Some(stripped) = sanitized.strip_suffix(suffix) {
                sanitized = stripped.to_string();
                modified = true;
            }
        }
    }

    Ok(sanitized)
}

/// A unit of measurement, used as a metric name suffix by convention.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Unit(Cow<'static, str>);

impl Unit {
    /// Seconds.
    pub const SECONDS: Unit = Unit(Cow::Borrowed("seconds"));

    /// Bytes.
    pub const BYTES: Unit = Unit(Cow::Borrowed("bytes"));

    /// A ratio, between 0 and 1.
    pub const RATIO: Unit = Unit(Cow::Borrowed("ratio"));

    /// Volts.
    pub const VOLTS: Unit = Unit(Cow::Borrowed("volts"));

    /// Amperes.
    pub const AMPERES: Unit = Unit(Cow::Borrowed("amperes"));

    /// Degrees Celsius.
    pub const CELSIUS: Unit = Unit(Cow::Borrowed("celsius"));

    /// Meters.
    pub const METERS: Unit = Unit(Cow::Borrowed("meters"));

    /// Grams.
    pub const GRAMS: Unit = Unit(Cow::Borrowed("grams"));

    /// Joules.
    pub const JOULES: Unit = Unit(Cow::Borrowed("joules"));

    /// Creates a custom unit.
    pub fn custom<S: Into<String>>(name: S) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The unit name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable container for metric metadata: name, help, unit.
///
/// The name is the base name without any exposition suffix: a counter exposed
/// as `http_requests_total` has the name `http_requests`. If a unit is set,
/// the name should carry the unit as a suffix (`cache_size_bytes` with
/// [`Unit::BYTES`]); this convention is not enforced.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MetricMetadata {
    name: String,
    help: Option<String>,
    unit: Option<Unit>,
}

impl MetricMetadata {
    /// Creates metadata with the given name and no help or unit.
    ///
    /// # Errors
    ///
    /// If the name is not a valid metric name, an error is returned. Use
    /// [`sanitize_metric_name`] to convert arbitrary strings to valid names.
    pub fn new<S: Into<String>>(name: S) -> Result<Self, MetadataError> {
        let name = name.into();
        ensure!(is_valid_metric_name(&name), InvalidMetricNameSnafu { name: name.clone() });
        Ok(Self {
            name,
            help: None,
            unit: None,
        })
    }

    /// Sets the help text.
    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Sets the unit.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// The metric name, without any exposition suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The help text, if any.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The unit, if any.
    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }
}
