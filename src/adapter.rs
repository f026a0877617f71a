//! Adapter interfaces consumed by the engine
//!
//! The core ships trait definitions only. Policy loading (filesystem
//! YAML trees, database rows, protobuf streams), distributed decision
//! caches, and external expression engines all live behind these seams.

use crate::cel::EvalContext;
use crate::engine::Decision;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::policy::Policy;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of policy definitions
///
/// Parsing is the adapter's job; the engine only requires that yielded
/// policies satisfy the structural invariants checked by
/// [`Policy::validate`]. Loading happens at the request boundary, never
/// inside the evaluation hot path.
#[async_trait]
pub trait PolicyLoader: Send + Sync {
    /// Load the full policy set from the backing source
    async fn load(&self) -> Result<Vec<Policy>>;
}

/// Optional read-through decision cache
///
/// The engine queries the cache before evaluating and populates it
/// afterwards. Keys already include the store generation counter, so a
/// policy mutation invalidates every previously cached decision without
/// the adapter's involvement; the adapter owns eviction and TTL.
pub trait DecisionCache: Send + Sync {
    /// Look up a previously cached decision
    fn get(&self, key: &Fingerprint) -> Option<Decision>;

    /// Store a decision under the given key
    fn put(&self, key: Fingerprint, decision: &Decision);
}

/// Optional external expression engine
///
/// When installed, condition sources are handed to the host instead of
/// the built-in evaluator. Host-compiled expressions are pooled by
/// source string exactly like built-in ones.
pub trait ExpressionHost: Send + Sync {
    /// Compile an expression source
    fn compile(&self, src: &str) -> Result<Arc<dyn HostExpr>>;
}

/// A host-compiled expression
pub trait HostExpr: Send + Sync {
    /// Evaluate against a request context
    fn eval(&self, ctx: &EvalContext<'_>) -> Result<bool>;
}
