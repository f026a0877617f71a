//! Engine metrics
//!
//! Atomic counters plus a bounded latency sample buffer. Recording is
//! cheap enough to leave on in production; percentile computation only
//! happens on snapshot.

use super::decision::Tier;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Total checks processed
    pub total_checks: u64,

    /// Per-action Allow outcomes
    pub allowed_actions: u64,

    /// Per-action Deny outcomes
    pub denied_actions: u64,

    /// Deny outcomes that came from the default-deny terminal rule
    pub default_denies: u64,

    /// Rules that matched during evaluation
    pub rule_matches: u64,

    /// Condition evaluation errors (rules treated as non-matching)
    pub condition_errors: u64,

    /// Decision-cache hits / misses (external cache adapter)
    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Definitive effects produced per tier (T1..T4)
    pub tier_hits: [u64; 4],

    /// Latency percentiles over the recent sample window
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    /// Mean latency over the sample window
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Fraction of per-action outcomes that were Allow
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_actions + self.denied_actions;
        if total == 0 {
            0.0
        } else {
            self.allowed_actions as f64 / total as f64
        }
    }

    /// Decision-cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Metrics collector shared by all checks on an engine
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_checks: AtomicU64,
    allowed_actions: AtomicU64,
    denied_actions: AtomicU64,
    default_denies: AtomicU64,
    rule_matches: AtomicU64,
    condition_errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    tier_hits: [AtomicU64; 4],
    latencies_ms: Mutex<Vec<f64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&self) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_effect(&self, allowed: bool) {
        if allowed {
            self.allowed_actions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied_actions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_default_deny(&self) {
        self.default_denies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rule_match(&self) {
        self.rule_matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_condition_error(&self) {
        self.condition_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier_hit(&self, tier: Tier) {
        let idx = match tier {
            Tier::PrincipalId => 0,
            Tier::PrincipalRole => 1,
            Tier::ResourceScoped => 2,
            Tier::ResourceGlobal => 3,
        };
        self.tier_hits[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency: Duration) {
        let ms = latency.as_secs_f64() * 1000.0;
        let mut samples = self.latencies_ms.lock();
        samples.push(ms);
        if samples.len() > MAX_LATENCY_SAMPLES {
            let excess = samples.len() - MAX_LATENCY_SAMPLES;
            samples.drain(0..excess);
        }
    }

    /// Produce a point-in-time snapshot
    pub fn snapshot(&self) -> EngineMetrics {
        let mut samples = self.latencies_ms.lock().clone();
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let percentile = |p: f64| -> f64 {
            if samples.is_empty() {
                return 0.0;
            }
            let idx = ((samples.len() as f64 - 1.0) * p).round() as usize;
            samples[idx.min(samples.len() - 1)]
        };
        let avg = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };

        EngineMetrics {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            allowed_actions: self.allowed_actions.load(Ordering::Relaxed),
            denied_actions: self.denied_actions.load(Ordering::Relaxed),
            default_denies: self.default_denies.load(Ordering::Relaxed),
            rule_matches: self.rule_matches.load(Ordering::Relaxed),
            condition_errors: self.condition_errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            tier_hits: [
                self.tier_hits[0].load(Ordering::Relaxed),
                self.tier_hits[1].load(Ordering::Relaxed),
                self.tier_hits[2].load(Ordering::Relaxed),
                self.tier_hits[3].load(Ordering::Relaxed),
            ],
            latency_p50_ms: percentile(0.50),
            latency_p90_ms: percentile(0.90),
            latency_p99_ms: percentile(0.99),
            avg_latency_ms: avg,
        }
    }
}
