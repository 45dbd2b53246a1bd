//! Normalized status - the format-independent view of one status observation.

/// Server-wide license usage, as reported by one status observation.
///
/// Produced by the status parsers regardless of whether the upstream output
/// was structured data or a free-text report.
///
/// # Example
///
/// ```rust
/// use olicense_types::NormalizedStatus;
///
/// let status = NormalizedStatus::builder()
///     .total(20)
///     .in_use(5)
///     .heartbeat(1_700_000_000.0)
///     .build();
///
/// assert_eq!(status.licenses_available, 15);
/// assert!(status.features.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizedStatus {
    /// Whether the source reported any server-wide count. When false the
    /// four count fields below are zero placeholders, not readings.
    #[cfg_attr(feature = "serde", serde(default))]
    pub server_totals_reported: bool,

    /// Total license seats configured on the server.
    pub total_licenses: u64,

    /// Seats currently checked out.
    pub licenses_in_use: u64,

    /// Seats reported (or derived) as available.
    pub licenses_available: u64,

    /// Denied checkout requests. Counter-like, but may reset when the
    /// upstream server restarts.
    pub denials_total: u64,

    /// Last heartbeat reported by the server, in Unix seconds.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub heartbeat_timestamp: Option<f64>,

    /// Per-feature usage, in the order first seen in the source.
    pub features: Vec<FeatureStatus>,
}

impl NormalizedStatus {
    /// Create an empty status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for a status.
    pub fn builder() -> NormalizedStatusBuilder {
        NormalizedStatusBuilder::new()
    }

    /// Look up a feature by name.
    pub fn feature(&self, name: &str) -> Option<&FeatureStatus> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Insert a feature, replacing the values of an existing feature with
    /// the same name in place.
    ///
    /// Returns `true` if an existing entry was replaced.
    pub fn upsert_feature(&mut self, feature: FeatureStatus) -> bool {
        match self.features.iter_mut().find(|f| f.name == feature.name) {
            Some(existing) => {
                *existing = feature;
                true
            }
            None => {
                self.features.push(feature);
                false
            }
        }
    }
}

/// License usage for a single feature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureStatus {
    /// Feature name, already sanitized for use as a label value.
    pub name: String,

    /// Configured capacity for this feature.
    pub total_licenses: u64,

    /// Seats currently checked out for this feature.
    pub licenses_in_use: u64,

    /// Seats borrowed for offline use. Not included in `licenses_in_use`.
    pub licenses_borrowed: u64,

    /// Denied checkouts for this feature.
    pub denials_total: u64,
}

impl FeatureStatus {
    /// Create a feature with all counts at zero.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a builder for a feature.
    pub fn builder(name: impl Into<String>) -> FeatureStatusBuilder {
        FeatureStatusBuilder::new(name)
    }
}

/// Builder for constructing `NormalizedStatus` instances.
#[derive(Debug, Default)]
pub struct NormalizedStatusBuilder {
    reported: bool,
    total: u64,
    in_use: u64,
    available: Option<u64>,
    denials: u64,
    heartbeat: Option<f64>,
    features: Vec<FeatureStatus>,
}

impl NormalizedStatusBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(mut self, total: u64) -> Self {
        self.reported = true;
        self.total = total;
        self
    }

    pub fn in_use(mut self, in_use: u64) -> Self {
        self.reported = true;
        self.in_use = in_use;
        self
    }

    /// Set available seats explicitly. When unset, `total - in_use` is used.
    pub fn available(mut self, available: u64) -> Self {
        self.reported = true;
        self.available = Some(available);
        self
    }

    pub fn denials(mut self, denials: u64) -> Self {
        self.reported = true;
        self.denials = denials;
        self
    }

    pub fn heartbeat(mut self, unix_seconds: f64) -> Self {
        self.heartbeat = Some(unix_seconds);
        self
    }

    /// Add a feature using a builder function. A repeated name replaces the
    /// earlier entry.
    pub fn feature<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnOnce(FeatureStatusBuilder) -> FeatureStatusBuilder,
    {
        let feature = f(FeatureStatusBuilder::new(name)).build();
        match self.features.iter_mut().find(|e| e.name == feature.name) {
            Some(existing) => *existing = feature,
            None => self.features.push(feature),
        }
        self
    }

    /// Build the status.
    pub fn build(self) -> NormalizedStatus {
        NormalizedStatus {
            server_totals_reported: self.reported,
            total_licenses: self.total,
            licenses_in_use: self.in_use,
            licenses_available: self
                .available
                .unwrap_or_else(|| self.total.saturating_sub(self.in_use)),
            denials_total: self.denials,
            heartbeat_timestamp: self.heartbeat,
            features: self.features,
        }
    }
}

/// Builder for constructing `FeatureStatus` instances.
#[derive(Debug)]
pub struct FeatureStatusBuilder {
    feature: FeatureStatus,
}

impl FeatureStatusBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            feature: FeatureStatus::new(name),
        }
    }

    pub fn total(mut self, total: u64) -> Self {
        self.feature.total_licenses = total;
        self
    }

    pub fn in_use(mut self, in_use: u64) -> Self {
        self.feature.licenses_in_use = in_use;
        self
    }

    pub fn borrowed(mut self, borrowed: u64) -> Self {
        self.feature.licenses_borrowed = borrowed;
        self
    }

    pub fn denials(mut self, denials: u64) -> Self {
        self.feature.denials_total = denials;
        self
    }

    pub fn build(self) -> FeatureStatus {
        self.feature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_derives_available() {
        let status = NormalizedStatus::builder().total(100).in_use(40).build();
        assert_eq!(status.licenses_available, 60);
    }

    #[test]
    fn builder_keeps_explicit_available() {
        let status = NormalizedStatus::builder()
            .total(100)
            .in_use(40)
            .available(55)
            .build();
        assert_eq!(status.licenses_available, 55);
    }

    #[test]
    fn available_saturates_when_overcommitted() {
        let status = NormalizedStatus::builder().total(5).in_use(8).build();
        assert_eq!(status.licenses_available, 0);
    }

    #[test]
    fn builder_feature_last_one_wins() {
        let status = NormalizedStatus::builder()
            .feature("cad", |f| f.total(10).in_use(3))
            .feature("cam", |f| f.total(4))
            .feature("cad", |f| f.total(12).in_use(7))
            .build();

        assert_eq!(status.features.len(), 2);
        assert_eq!(status.features[0].name, "cad");
        assert_eq!(status.features[0].total_licenses, 12);
        assert_eq!(status.features[0].licenses_in_use, 7);
    }

    #[test]
    fn upsert_reports_replacement() {
        let mut status = NormalizedStatus::new();
        assert!(!status.upsert_feature(FeatureStatus::new("cad")));
        assert!(status.upsert_feature(FeatureStatus::builder("cad").total(3).build()));
        assert_eq!(status.feature("cad").map(|f| f.total_licenses), Some(3));
        assert!(status.feature("missing").is_none());
    }

    #[test]
    fn builder_tracks_whether_server_counts_were_set() {
        let features_only = NormalizedStatus::builder()
            .feature("cad", |f| f.total(10))
            .build();
        assert!(!features_only.server_totals_reported);
        assert!(!NormalizedStatus::new().server_totals_reported);

        let with_denials = NormalizedStatus::builder().denials(3).build();
        assert!(with_denials.server_totals_reported);
    }
}
