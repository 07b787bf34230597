//! Engine Configuration

use std::path::Path;
use std::time::Duration;

use formguard_a11y::RuleConfig;
use formguard_forms::ResolverConfig;
use serde::Deserialize;

use crate::PlanLimits;

/// Engine configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plan tier passed to the limits service
    pub plan_tier: String,

    /// How long fetched plan limits stay valid (seconds)
    pub limits_ttl_secs: u64,

    /// Annotation rules
    pub rules: RuleConfig,

    /// Field resolution
    pub resolver: ResolverConfig,

    /// Limits used while the limits service is unavailable
    pub default_limits: PlanLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plan_tier: "free".to_string(),
            limits_ttl_secs: 300,
            rules: RuleConfig::default(),
            resolver: ResolverConfig::default(),
            default_limits: PlanLimits::default(),
        }
    }
}

impl Config {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(std::io::Error::from)
    }

    pub fn limits_ttl(&self) -> Duration {
        Duration::from_secs(self.limits_ttl_secs)
    }
}
