//! The summary metric.

use std::sync::{
    atomic::{
        AtomicU64,
        Ordering::{Acquire, Relaxed, Release},
    },
    Arc, Mutex,
};

use ckms::{CkmsQuantiles, Quantile as TargetQuantile, QuantileError};
use papaya::HashMap;
use snafu::{ensure, OptionExt as _, ResultExt as _, Snafu};
use tracing::debug;
use whippet_model::{
    is_valid_label_name, Exemplars, Labels, MetadataError, MetricMetadata, Quantile, Quantiles,
    SummaryDataPointSnapshot, SummarySnapshot, Unit,
};

use crate::{
    buffer::ObservationBuffer,
    config::SummaryDefaults,
    exemplar::{ExemplarSampler, ExemplarSamplerFactory},
    time::{Clock, SystemClock},
    window::SlidingWindow,
};

/// The label name reserved for the quantile dimension of summary metrics.
const RESERVED_QUANTILE_LABEL: &str = "quantile";

/// Errors that can occur when constructing or using a summary.
#[derive(Debug, Snafu)]
pub enum SummaryError {
    /// The metric metadata or a label name is invalid.
    #[snafu(display("invalid metric metadata: {}", source))]
    Metadata {
        /// The underlying metadata error.
        source: MetadataError,
    },

    /// A quantile target is out of range.
    #[snafu(display("invalid quantile target: {}", source))]
    QuantileTarget {
        /// The underlying target error.
        source: QuantileError,
    },

    /// A user label collides with the reserved quantile dimension.
    #[snafu(display("label name '{}' is reserved for summary metrics", name))]
    ReservedLabelName {
        /// The rejected label name.
        name: String,
    },

    /// The time window size is not positive.
    #[snafu(display("max_age_seconds cannot be {}", value))]
    InvalidMaxAgeSeconds {
        /// The rejected value.
        value: u64,
    },

    /// The age bucket count is not positive.
    #[snafu(display("age_buckets cannot be {}", value))]
    InvalidAgeBuckets {
        /// The rejected value.
        value: u32,
    },

    /// The number of label values does not match the label schema.
    #[snafu(display("expected {} label values, got {}", expected, actual))]
    LabelValuesMismatch {
        /// Number of label names in the schema.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The label-less observe path was used on a metric with labels.
    #[snafu(display("metric has label names; observe through with_label_values"))]
    MissingLabelValues,
}

/// Summary metric: a windowed, streaming estimator of configured
/// φ-quantiles over concurrently observed values, plus running count and
/// sum.
///
/// # Example
///
/// ```
/// use whippet_metrics::Summary;
///
/// let summary = Summary::builder("http_request_duration_seconds")
///     .help("HTTP request service time in seconds")
///     .label_names(["method", "path"])
///     .quantile(0.5)
///     .quantile_with_error(0.95, 0.001)
///     .build()
///     .unwrap();
///
/// summary.with_label_values(&["GET", "/"]).unwrap().observe(0.024);
///
/// let snapshot = summary.collect();
/// ```
///
/// One data point is maintained per distinct label value tuple, created
/// lazily on first use and pinned for the summary's lifetime. Observing
/// never blocks on collection: while a snapshot is being assembled,
/// concurrent observations are queued and replayed into the next snapshot
/// epoch.
pub struct Summary<C: Clock = SystemClock> {
    metadata: MetricMetadata,
    label_names: Vec<String>,
    targets: Arc<[TargetQuantile]>,
    max_age_seconds: u64,
    age_buckets: u32,
    exemplars_enabled: bool,
    sampler_factory: Option<Arc<ExemplarSamplerFactory>>,
    clock: Arc<C>,
    data_points: HashMap<Vec<String>, Arc<SummaryDataPoint<C>>>,
    /// The single data point of a label-less summary, created eagerly so it
    /// is exposed before the first observation.
    no_labels: Option<Arc<SummaryDataPoint<C>>>,
}

impl Summary<SystemClock> {
    /// Starts building a summary with the given name.
    pub fn builder<S: Into<String>>(name: S) -> SummaryBuilder<SystemClock> {
        SummaryBuilder::new(name)
    }
}

impl<C: Clock> Summary<C> {
    /// Returns the data point for the given label values, creating it if
    /// this tuple has not been observed before.
    ///
    /// # Errors
    ///
    /// If the number of values does not match the label schema, an error is
    /// returned.
    pub fn with_label_values<S: AsRef<str>>(&self, values: &[S]) -> Result<Arc<SummaryDataPoint<C>>, SummaryError> {
        ensure!(
            values.len() == self.label_names.len(),
            LabelValuesMismatchSnafu {
                expected: self.label_names.len(),
                actual: values.len(),
            }
        );

        let key = values.iter().map(|v| v.as_ref().to_string()).collect::<Vec<_>>();

        let data_points = self.data_points.pin();
        if let Some(data_point) = data_points.get(&key) {
            return Ok(Arc::clone(data_point));
        }

        let data_point = data_points.get_or_insert_with(key, || {
            debug!(metric = self.metadata.name(), "Creating data point for new label set.");
            Arc::new(self.new_data_point())
        });
        Ok(Arc::clone(data_point))
    }

    /// Observes a value on the label-less fast path.
    ///
    /// `NaN` values are silently dropped.
    ///
    /// # Errors
    ///
    /// If the summary was built with label names, an error is returned; use
    /// [`with_label_values`][Self::with_label_values] instead.
    pub fn observe(&self, value: f64) -> Result<(), SummaryError> {
        self.no_labels()?.observe(value);
        Ok(())
    }

    /// Observes a value with exemplar labels on the label-less fast path.
    ///
    /// `NaN` values are silently dropped.
    ///
    /// # Errors
    ///
    /// If the summary was built with label names, an error is returned; use
    /// [`with_label_values`][Self::with_label_values] instead.
    pub fn observe_with_exemplar(&self, value: f64, exemplar_labels: Labels) -> Result<(), SummaryError> {
        self.no_labels()?.observe_with_exemplar(value, exemplar_labels);
        Ok(())
    }

    /// Collects a snapshot of every data point.
    ///
    /// Data points are emitted in label order. The scrape timestamp is left
    /// unset; the exposition collaborator fills it in when relevant.
    pub fn collect(&self) -> SummarySnapshot {
        let data_points = self.data_points.pin();
        let mut data = Vec::with_capacity(data_points.len());
        for (values, data_point) in data_points.iter() {
            let labels = Labels::of(&self.label_names, values).expect("label names were validated at construction");
            data.push(data_point.collect(labels));
        }

        SummarySnapshot::new(self.metadata.clone(), data)
    }

    fn no_labels(&self) -> Result<&Arc<SummaryDataPoint<C>>, SummaryError> {
        self.no_labels.as_ref().context(MissingLabelValuesSnafu)
    }

    fn new_data_point(&self) -> SummaryDataPoint<C> {
        let quantile_values = if self.targets.is_empty() {
            None
        } else {
            let targets = Arc::clone(&self.targets);
            let window = SlidingWindow::new(
                move || CkmsQuantiles::new(&targets),
                self.max_age_seconds,
                self.age_buckets,
                self.clock.now_millis(),
            );
            Some(Mutex::new(window))
        };

        let exemplar_sampler = if self.exemplars_enabled {
            self.sampler_factory.as_ref().map(|factory| factory())
        } else {
            None
        };

        SummaryDataPoint {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0.0f64.to_bits()),
            quantile_values,
            buffer: ObservationBuffer::new(),
            exemplar_sampler,
            targets: Arc::clone(&self.targets),
            clock: Arc::clone(&self.clock),
            created_time_ms: self.clock.now_millis(),
        }
    }
}

/// The per-label-set aggregate state of a summary: running count and sum,
/// windowed quantile estimators, and an optional exemplar sampler.
pub struct SummaryDataPoint<C: Clock = SystemClock> {
    count: AtomicU64,
    /// Bit pattern of the running sum, maintained with a CAS loop.
    sum: AtomicU64,
    quantile_values: Option<Mutex<SlidingWindow<CkmsQuantiles>>>,
    buffer: ObservationBuffer,
    exemplar_sampler: Option<Box<dyn ExemplarSampler>>,
    targets: Arc<[TargetQuantile]>,
    clock: Arc<C>,
    created_time_ms: u64,
}

impl<C: Clock> SummaryDataPoint<C> {
    /// Observes a value.
    ///
    /// `NaN` values are silently dropped. Never blocks on a concurrent
    /// collection.
    pub fn observe(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        if !self.buffer.append(value) {
            self.do_observe(value);
        }
        if let Some(sampler) = &self.exemplar_sampler {
            sampler.observe(value);
        }
    }

    /// Observes a value together with exemplar labels, typically trace and
    /// span identifiers.
    ///
    /// `NaN` values are silently dropped.
    pub fn observe_with_exemplar(&self, value: f64, exemplar_labels: Labels) {
        if value.is_nan() {
            return;
        }
        if !self.buffer.append(value) {
            self.do_observe(value);
        }
        if let Some(sampler) = &self.exemplar_sampler {
            sampler.observe_with_exemplar(value, &exemplar_labels);
        }
    }

    fn do_observe(&self, value: f64) {
        self.add_to_sum(value);
        if let Some(window) = &self.quantile_values {
            let mut window = window.lock().unwrap();
            window.observe(self.clock.now_millis(), value);
        }
        // The count is incremented last: a reader that observes the new
        // count also observes the sum and estimator updates above, which is
        // what lets collect() treat the count as a completion marker.
        self.count.fetch_add(1, Release);
    }

    fn add_to_sum(&self, value: f64) {
        let mut current = self.sum.load(Relaxed);
        loop {
            let updated = f64::from_bits(current) + value;
            match self.sum.compare_exchange_weak(current, updated.to_bits(), Relaxed, Relaxed) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Builds a consistent snapshot of this data point via the buffer's
    /// collection protocol.
    pub(crate) fn collect(&self, labels: Labels) -> SummaryDataPointSnapshot {
        self.buffer.run(
            |inline_observations| self.count.load(Acquire) == inline_observations,
            || {
                let count = self.count.load(Acquire);
                let sum = f64::from_bits(self.sum.load(Acquire));
                let quantiles = self.current_quantiles();
                let exemplars = match &self.exemplar_sampler {
                    Some(sampler) => sampler.collect(),
                    None => Exemplars::EMPTY,
                };
                SummaryDataPointSnapshot::new(count, sum, quantiles, labels, exemplars, self.created_time_ms as i64)
            },
            |value| self.do_observe(value),
        )
    }

    fn current_quantiles(&self) -> Quantiles {
        let Some(window) = &self.quantile_values else {
            return Quantiles::EMPTY;
        };

        let mut window = window.lock().unwrap();
        let estimator = window.current(self.clock.now_millis());
        Quantiles::of(
            self.targets
                .iter()
                .map(|target| Quantile::new(target.quantile(), estimator.get(target.quantile()))),
        )
    }
}

/// Builder for [`Summary`].
pub struct SummaryBuilder<C: Clock = SystemClock> {
    name: String,
    help: Option<String>,
    unit: Option<Unit>,
    label_names: Vec<String>,
    quantiles: Vec<(f64, f64)>,
    max_age_seconds: Option<u64>,
    age_buckets: Option<u32>,
    exemplars_enabled: Option<bool>,
    sampler_factory: Option<Arc<ExemplarSamplerFactory>>,
    defaults: SummaryDefaults,
    clock: C,
}

impl SummaryBuilder<SystemClock> {
    fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            help: None,
            unit: None,
            label_names: Vec::new(),
            quantiles: Vec::new(),
            max_age_seconds: None,
            age_buckets: None,
            exemplars_enabled: None,
            sampler_factory: None,
            defaults: SummaryDefaults::default(),
            clock: SystemClock,
        }
    }
}

impl<C: Clock> SummaryBuilder<C> {
    /// Sets the help text.
    pub fn help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Sets the unit.
    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the label schema.
    pub fn label_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a target quantile with a default error margin.
    ///
    /// Default errors are:
    ///
    /// - `0.001` if `quantile <= 0.01` or `quantile >= 0.99`
    /// - `0.005` if `quantile <= 0.02` or `quantile >= 0.98`
    /// - `0.01` otherwise
    pub fn quantile(self, quantile: f64) -> Self {
        let error = Self::default_error(quantile);
        self.quantile_with_error(quantile, error)
    }

    /// Adds a target quantile with an explicit error margin.
    ///
    /// The error is on rank: with `quantile_with_error(0.95, 0.001)` the
    /// reported value lies between the 0.949 and 0.951 quantiles.
    ///
    /// Two special cases are supported: `(0.0, 0.0)` tracks the exact
    /// minimum and `(1.0, 0.0)` the exact maximum.
    pub fn quantile_with_error(mut self, quantile: f64, error: f64) -> Self {
        self.quantiles.push((quantile, error));
        self
    }

    /// Sets the size of the moving time window the quantiles are computed
    /// over. Default is 300 seconds.
    pub fn max_age_seconds(mut self, max_age_seconds: u64) -> Self {
        self.max_age_seconds = Some(max_age_seconds);
        self
    }

    /// Sets the number of age buckets, which defines how smoothly the time
    /// window moves forward. For example, a 5 minute window with 5 age
    /// buckets moves forward by one minute every minute. Default is 5.
    pub fn age_buckets(mut self, age_buckets: u32) -> Self {
        self.age_buckets = Some(age_buckets);
        self
    }

    /// Enables or disables exemplar sampling. Default is enabled.
    pub fn exemplars_enabled(mut self, exemplars_enabled: bool) -> Self {
        self.exemplars_enabled = Some(exemplars_enabled);
        self
    }

    /// Sets the factory used to create one exemplar sampler per data point.
    ///
    /// Without a factory no exemplars are sampled, regardless of whether
    /// exemplars are enabled.
    pub fn exemplar_sampler<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ExemplarSampler> + Send + Sync + 'static,
    {
        self.sampler_factory = Some(Arc::new(factory));
        self
    }

    /// Sets the configuration defaults to fall back to for settings not
    /// given explicitly.
    pub fn defaults(mut self, defaults: SummaryDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the wall-clock source. Primarily useful in tests, to drive
    /// window rotation deterministically.
    pub fn clock<C2: Clock>(self, clock: C2) -> SummaryBuilder<C2> {
        SummaryBuilder {
            name: self.name,
            help: self.help,
            unit: self.unit,
            label_names: self.label_names,
            quantiles: self.quantiles,
            max_age_seconds: self.max_age_seconds,
            age_buckets: self.age_buckets,
            exemplars_enabled: self.exemplars_enabled,
            sampler_factory: self.sampler_factory,
            defaults: self.defaults,
            clock,
        }
    }

    /// Builds the summary.
    ///
    /// # Errors
    ///
    /// If the metric name, a label name, a quantile target, the window size,
    /// or the bucket count is invalid, an error is returned.
    pub fn build(self) -> Result<Summary<C>, SummaryError> {
        let mut metadata = MetricMetadata::new(self.name).context(MetadataSnafu)?;
        if let Some(help) = self.help {
            metadata = metadata.with_help(help);
        }
        if let Some(unit) = self.unit {
            metadata = metadata.with_unit(unit);
        }

        for name in &self.label_names {
            ensure!(
                name != RESERVED_QUANTILE_LABEL,
                ReservedLabelNameSnafu { name: name.clone() }
            );
        }
        validate_label_names(&self.label_names).context(MetadataSnafu)?;

        let targets = self
            .quantiles
            .iter()
            .map(|(quantile, error)| TargetQuantile::new(*quantile, *error))
            .collect::<Result<Vec<_>, _>>()
            .context(QuantileTargetSnafu)?;

        let max_age_seconds = self.max_age_seconds.unwrap_or(self.defaults.max_age_seconds);
        ensure!(max_age_seconds > 0, InvalidMaxAgeSecondsSnafu { value: max_age_seconds });

        let age_buckets = self.age_buckets.unwrap_or(self.defaults.age_buckets);
        ensure!(age_buckets > 0, InvalidAgeBucketsSnafu { value: age_buckets });

        let mut summary = Summary {
            metadata,
            label_names: self.label_names,
            targets: targets.into(),
            max_age_seconds,
            age_buckets,
            exemplars_enabled: self.exemplars_enabled.unwrap_or(self.defaults.exemplars_enabled),
            sampler_factory: self.sampler_factory,
            clock: Arc::new(self.clock),
            data_points: HashMap::new(),
            no_labels: None,
        };

        // A label-less summary always exposes its single data point, even
        // before the first observation.
        if summary.label_names.is_empty() {
            let data_point = Arc::new(summary.new_data_point());
            summary.data_points.pin().insert(Vec::new(), Arc::clone(&data_point));
            summary.no_labels = Some(data_point);
        }

        Ok(summary)
    }

    fn default_error(quantile: f64) -> f64 {
        if quantile <= 0.01 || quantile >= 0.99 {
            0.001
        } else if quantile <= 0.02 || quantile >= 0.98 {
            0.005
        } else {
            0.01
        }
    }
}

fn validate_label_names(names: &[String]) -> Result<(), MetadataError> {
    for (idx, name) in names.iter().enumerate() {
        if !is_valid_label_name(name) {
            return Err(MetadataError::InvalidLabelName { name: name.clone() });
        }
        if names[..idx].contains(name) {
            return Err(MetadataError::DuplicateLabelName { name: name.clone() });
        }
    }
    Ok(())
}
