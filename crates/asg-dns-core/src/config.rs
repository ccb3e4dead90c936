//! Configuration types for the reconciler
//!
//! The configuration is an explicit value handed to
//! [`crate::Reconciler::new`]; nothing is process-wide.
//!
//! ```json
//! {
//!   "hostedzone": "Z123EXAMPLE",
//!   "environment_name": "prod",
//!   "domain": "example.com",
//!   "create_ip_records": true,
//!   "patterns": {
//!     "az": "{{.Role}}.{{.AvailabilityZone}}.example.com",
//!     "region": "{{.Role}}.{{.Region}}.example.com",
//!     "ip": "ip-{{.IP}}.{{.Region}}.example.com"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pattern::{NamePattern, Placeholder};

/// Config file read when no other location is given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Record granularities a pattern can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// One record per availability zone
    Zone,
    /// One record for the whole region
    Region,
    /// One record per launched instance
    Instance,
}

impl PatternKind {
    /// Every pattern kind
    pub const ALL: [PatternKind; 3] = [
        PatternKind::Zone,
        PatternKind::Region,
        PatternKind::Instance,
    ];

    /// Key under `patterns` in the config file
    pub fn key(&self) -> &'static str {
        match self {
            PatternKind::Zone => "az",
            PatternKind::Region => "region",
            PatternKind::Instance => "ip",
        }
    }

    /// Look a kind up by config key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Placeholders the reconciler supplies when rendering this kind
    ///
    /// `EnvironmentName` and `Domain` are only supplied when configured.
    pub fn provided_placeholders(&self, config: &ReconcilerConfig) -> Vec<Placeholder> {
        let mut provided = vec![
            Placeholder::AutoScalingGroup,
            Placeholder::Role,
            Placeholder::Region,
        ];
        match self {
            PatternKind::Zone => provided.push(Placeholder::AvailabilityZone),
            PatternKind::Region => {}
            PatternKind::Instance => {
                provided.push(Placeholder::AvailabilityZone);
                provided.push(Placeholder::Ip);
            }
        }
        if !config.environment_name.is_empty() {
            provided.push(Placeholder::EnvironmentName);
        }
        if !config.domain.is_empty() {
            provided.push(Placeholder::Domain);
        }
        provided
    }
}

/// Main reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Hosted zone the records live in
    #[serde(rename = "hostedzone")]
    pub hosted_zone_id: String,

    /// Name templates keyed by granularity ("az", "region", "ip")
    ///
    /// A missing "az" or "region" entry skips that granularity.
    #[serde(default)]
    pub patterns: BTreeMap<String, NamePattern>,

    /// Environment suffix stripped from group names to derive the role
    #[serde(default)]
    pub environment_name: String,

    /// Domain ownership markers are published under
    #[serde(default)]
    pub domain: String,

    /// Create per-instance records and their ownership markers
    #[serde(default)]
    pub create_ip_records: bool,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ReconcilerConfig {
    /// Create a configuration for a hosted zone with no patterns
    pub fn new(hosted_zone_id: impl Into<String>) -> Self {
        Self {
            hosted_zone_id: hosted_zone_id.into(),
            patterns: BTreeMap::new(),
            environment_name: String::new(),
            domain: String::new(),
            create_ip_records: false,
            engine: EngineConfig::default(),
        }
    }

    /// Set a pattern, builder style
    pub fn with_pattern(mut self, kind: PatternKind, pattern: NamePattern) -> Self {
        self.patterns.insert(kind.key().to_string(), pattern);
        self
    }

    /// Set the environment name
    pub fn with_environment(mut self, environment_name: impl Into<String>) -> Self {
        self.environment_name = environment_name.into();
        self
    }

    /// Enable per-instance records under `domain`
    pub fn with_ip_records(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self.create_ip_records = true;
        self
    }

    /// Pattern configured for a granularity
    pub fn pattern(&self, kind: PatternKind) -> Option<&NamePattern> {
        self.patterns.get(kind.key())
    }

    /// Parse and fully validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        config.validate_patterns()?;
        Ok(config)
    }

    /// Load and fully validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Validate the structural configuration
    pub fn validate(&self) -> Result<()> {
        if self.hosted_zone_id.trim().is_empty() {
            return Err(Error::config("hostedzone cannot be empty"));
        }

        for key in self.patterns.keys() {
            if PatternKind::from_key(key).is_none() {
                return Err(Error::config(format!(
                    "unknown pattern key {:?} (expected az, region or ip)",
                    key
                )));
            }
        }

        if self.create_ip_records && self.domain.trim().is_empty() {
            return Err(Error::config(
                "create_ip_records requires a domain for ownership markers",
            ));
        }

        if self.engine.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }

        Ok(())
    }

    /// Check every pattern only uses placeholders its granularity supplies
    ///
    /// Run at load time so a template/context mismatch is caught before the
    /// first event instead of surfacing as `UnresolvedPlaceholder` later.
    pub fn validate_patterns(&self) -> Result<()> {
        for kind in PatternKind::ALL {
            let Some(pattern) = self.pattern(kind) else {
                continue;
            };
            let provided = kind.provided_placeholders(self);
            if let Some(missing) = pattern.placeholders().find(|p| !provided.contains(p)) {
                return Err(Error::UnresolvedPlaceholder {
                    pattern: pattern.as_str().to_string(),
                    placeholder: missing.name().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the monitoring event channel
    ///
    /// When full, events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}
