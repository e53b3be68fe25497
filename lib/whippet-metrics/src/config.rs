//! Summary configuration defaults.

/// Process-wide defaults for summary construction.
///
/// A builder falls back to these values for any setting it was not given
/// explicitly. The `Default` implementation carries the canonical values; a
/// deployment that wants different defaults constructs its own
/// `SummaryDefaults` and passes it to builders at the edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryDefaults {
    /// Size of the moving time window quantiles are computed over, in
    /// seconds.
    pub max_age_seconds: u64,

    /// Number of age buckets the time window is divided into, which controls
    /// how smoothly the window moves forward.
    pub age_buckets: u32,

    /// Whether exemplar sampling is enabled.
    pub exemplars_enabled: bool,
}

impl Default for SummaryDefaults {
    fn default() -> Self {
        Self {
            max_age_seconds: 300,
            age_buckets: 5,
            exemplars_enabled: true,
        }
    }
}
