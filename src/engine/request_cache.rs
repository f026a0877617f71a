//! Per-request memoization
//!
//! One cache is created at the start of every check and dropped with
//! it. It is owned by a single thread and never shared, so no
//! synchronization is needed, and results can never leak between
//! requests whose principal attributes differ.

use std::collections::{BTreeSet, HashMap};

/// Memoized condition outcome; `None` records an evaluation error so
/// the error is neither retried nor double-counted
type CondResult = Option<bool>;

/// Per-request memoization of condition and role-resolution results
#[derive(Debug, Default)]
pub(crate) struct RequestCache {
    conditions: HashMap<u64, CondResult>,
    effective_roles: Option<(u64, BTreeSet<String>)>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoize a condition result keyed by the expression fingerprint
    pub fn condition<F>(&mut self, key: u64, compute: F) -> CondResult
    where
        F: FnOnce() -> CondResult,
    {
        if let Some(result) = self.conditions.get(&key) {
            return *result;
        }
        let result = compute();
        self.conditions.insert(key, result);
        result
    }

    /// Previously resolved effective role set for this base-role hash
    pub fn effective_roles(&self, base_hash: u64) -> Option<&BTreeSet<String>> {
        match &self.effective_roles {
            Some((hash, roles)) if *hash == base_hash => Some(roles),
            _ => None,
        }
    }

    /// Record the resolved effective role set
    pub fn store_effective_roles(&mut self, base_hash: u64, roles: BTreeSet<String>) {
        self.effective_roles = Some((base_hash, roles));
    }

    /// Number of memoized condition results
    #[cfg(test)]
    pub fn condition_entries(&self) -> usize {
        self.conditions.len()
    }
}
