//! Plan Limits
//!
//! Quotas from the remote configuration service, held in a caller-owned
//! cache with a validity window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use formguard_forms::FieldType;
use serde::{Deserialize, Serialize};

/// Quotas for one plan tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_forms: usize,
    pub max_required_fields_per_form: usize,
    pub supported_field_types: Vec<FieldType>,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_forms: 1,
            max_required_fields_per_form: 5,
            supported_field_types: FieldType::ALL
                .into_iter()
                .filter(|t| *t != FieldType::Unsupported)
                .collect(),
        }
    }
}

impl PlanLimits {
    pub fn supports(&self, field_type: FieldType) -> bool {
        self.supported_field_types.contains(&field_type)
    }
}

/// Limits lookup error
#[derive(Debug, thiserror::Error)]
pub enum LimitsError {
    #[error("Limits service unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown plan tier: {0}")]
    UnknownTier(String),
}

/// Remote configuration service
#[async_trait]
pub trait LimitsService: Send + Sync {
    async fn get_limits(&self, plan_tier: &str) -> Result<PlanLimits, LimitsError>;
}

/// Fixed tier table
#[derive(Debug, Clone, Default)]
pub struct StaticLimits {
    tiers: HashMap<String, PlanLimits>,
}

impl StaticLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tier
    pub fn with_tier(mut self, tier: &str, limits: PlanLimits) -> Self {
        self.tiers.insert(tier.to_string(), limits);
        self
    }
}

#[async_trait]
impl LimitsService for StaticLimits {
    async fn get_limits(&self, plan_tier: &str) -> Result<PlanLimits, LimitsError> {
        self.tiers
            .get(plan_tier)
            .cloned()
            .ok_or_else(|| LimitsError::UnknownTier(plan_tier.to_string()))
    }
}

/// Cached limits entry
#[derive(Debug, Clone)]
struct CacheEntry {
    limits: PlanLimits,
    cached_at: Instant,
}

/// Limits cache with a validity window. Owned by the caller and passed to
/// each operation; failed lookups fall back to the default limits and are
/// not cached.
#[derive(Debug, Clone)]
pub struct LimitsCache {
    entries: HashMap<String, CacheEntry>,
    max_age: Duration,
    fallback: PlanLimits,
}

impl LimitsCache {
    pub fn new(max_age: Duration, fallback: PlanLimits) -> Self {
        Self {
            entries: HashMap::new(),
            max_age,
            fallback,
        }
    }

    /// Check if a tier is cached and fresh
    pub fn contains(&self, tier: &str) -> bool {
        self.entries
            .get(tier)
            .is_some_and(|e| e.cached_at.elapsed() <= self.max_age)
    }

    /// Limits for `tier`, from the cache while fresh
    pub async fn get<S>(&mut self, service: &S, tier: &str) -> PlanLimits
    where
        S: LimitsService + ?Sized,
    {
        let fresh = self
            .entries
            .get(tier)
            .filter(|e| e.cached_at.elapsed() <= self.max_age)
            .map(|e| e.limits.clone());
        if let Some(limits) = fresh {
            return limits;
        }
        if self.entries.remove(tier).is_some() {
            tracing::debug!("Limits for {} expired", tier);
        }

        match service.get_limits(tier).await {
            Ok(limits) => {
                self.entries.insert(
                    tier.to_string(),
                    CacheEntry {
                        limits: limits.clone(),
                        cached_at: Instant::now(),
                    },
                );
                limits
            }
            Err(e) => {
                tracing::warn!("Using default limits for {}: {}", tier, e);
                self.fallback.clone()
            }
        }
    }

    /// Drop a cached tier
    pub fn invalidate(&mut self, tier: &str) {
        self.entries.remove(tier);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLimits {
        calls: AtomicUsize,
        limits: Option<PlanLimits>,
    }

    #[async_trait]
    impl LimitsService for CountingLimits {
        async fn get_limits(&self, _plan_tier: &str) -> Result<PlanLimits, LimitsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.limits
                .clone()
                .ok_or_else(|| LimitsError::Unavailable("offline".to_string()))
        }
    }

    fn pro() -> PlanLimits {
        PlanLimits {
            max_forms: 10,
            max_required_fields_per_form: 50,
            supported_field_types: vec![FieldType::Email],
        }
    }

    #[test]
    fn test_cache_hit_within_window() {
        let service = CountingLimits { calls: AtomicUsize::new(0), limits: Some(pro()) };
        let mut cache = LimitsCache::new(Duration::from_secs(60), PlanLimits::default());

        assert_eq!(smol::block_on(cache.get(&service, "pro")), pro());
        assert_eq!(smol::block_on(cache.get(&service, "pro")), pro());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("pro"));

        cache.invalidate("pro");
        smol::block_on(cache.get(&service, "pro"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_expiry() {
        let service = CountingLimits { calls: AtomicUsize::new(0), limits: Some(pro()) };
        let mut cache = LimitsCache::new(Duration::ZERO, PlanLimits::default());
        smol::block_on(cache.get(&service, "pro"));
        std::thread::sleep(Duration::from_millis(2));
        smol::block_on(cache.get(&service, "pro"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unavailable_falls_back_uncached() {
        let service = CountingLimits { calls: AtomicUsize::new(0), limits: None };
        let mut cache = LimitsCache::new(Duration::from_secs(60), PlanLimits::default());
        assert_eq!(smol::block_on(cache.get(&service, "free")), PlanLimits::default());
        assert!(!cache.contains("free"));
        smol::block_on(cache.get(&service, "free"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_static_limits() {
        let service = StaticLimits::new().with_tier("pro", pro());
        assert_eq!(smol::block_on(service.get_limits("pro")).unwrap(), pro());
        assert!(matches!(
            smol::block_on(service.get_limits("gold")),
            Err(LimitsError::UnknownTier(_))
        ));
        assert!(PlanLimits::default().supports(FieldType::Message));
        assert!(!PlanLimits::default().supports(FieldType::Unsupported));
    }
}
