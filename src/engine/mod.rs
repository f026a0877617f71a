//! Decision engine
//!
//! Orchestrates role resolution, the four-tier policy walk, condition
//! evaluation, and the deny-overrides combinator into a single
//! synchronous `check`. The hot path performs no I/O and takes no lock
//! across evaluation; store lookups hand back immutable snapshots.
//!
//! # Tier contract
//!
//! Tiers run in strict priority order: principal-ID policies, then
//! role-based principal policies, then scoped resource policies, then
//! global (root-scope) resource policies. Within a tier a matching Deny
//! always defeats any number of Allows. Across tiers, the first tier to
//! produce a definitive effect for an action settles that action;
//! lower tiers are not consulted. A tier-1 Allow therefore beats a
//! tier-2 Deny. Actions that fall through every tier resolve to Deny.

pub mod decision;
pub mod metrics;
pub(crate) mod request_cache;

pub use decision::{ActionDecision, Decision, DerivationTrace, Tier, TraceEvent};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::adapter::DecisionCache;
use crate::cel::{CompiledExpr, EvalContext};
use crate::derived_roles::resolver;
use crate::error::{AdeError, Result};
use crate::fingerprint;
use crate::policy::Policy;
use crate::store::{CompiledPrincipalPolicy, CompiledRule, PolicyStore, StoreStats};
use crate::types::{CheckRequest, Effect};
use crate::value::AttrValue;
use request_cache::RequestCache;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Engine configuration
#[derive(Clone)]
pub struct EngineConfig {
    /// Hard cap on evaluation time; exceeded checks return `Cancelled`
    pub default_deadline: Duration,

    /// Record per-decision trace events (diagnostics are always kept)
    pub enable_trace: bool,

    /// Maintain counters and latency samples
    pub enable_metrics: bool,

    /// Optional external read-through decision cache
    pub decision_cache: Option<Arc<dyn DecisionCache>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_millis(10),
            enable_trace: false,
            enable_metrics: true,
            decision_cache: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("default_deadline", &self.default_deadline)
            .field("enable_trace", &self.enable_trace)
            .field("enable_metrics", &self.enable_metrics)
            .field("decision_cache", &self.decision_cache.is_some())
            .finish()
    }
}

/// Aggregate engine state summary
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Store sizes and generation
    pub store: StoreStats,

    /// Pooled compiled expressions
    pub expr_pool_entries: usize,

    /// Counter and latency snapshot
    pub metrics: EngineMetrics,
}

/// The authorization decision engine
///
/// Many concurrent `check` calls may run against one engine; policy
/// mutations go through the single-writer admin path on the store.
pub struct Engine {
    store: Arc<PolicyStore>,
    config: EngineConfig,
    metrics: MetricsCollector,
}

impl Engine {
    /// Create an engine with default configuration and its own store
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with the given configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_store(Arc::new(PolicyStore::new()), config)
    }

    /// Create an engine over an existing store
    pub fn with_store(store: Arc<PolicyStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    /// The backing policy store
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Add or replace a policy (admin path)
    pub fn add_policy(&self, policy: Policy) -> Result<()> {
        self.store.add(policy)
    }

    /// Remove a policy by name (admin path)
    pub fn remove_policy(&self, name: &str) -> bool {
        self.store.remove(name)
    }

    /// Evaluate a request
    pub fn check(&self, request: &CheckRequest) -> Result<Decision> {
        self.check_cancellable(request, &CancellationToken::new())
    }

    /// Evaluate a request under an external cancellation token
    pub fn check_cancellable(
        &self,
        request: &CheckRequest,
        token: &CancellationToken,
    ) -> Result<Decision> {
        let start = Instant::now();

        if request.principal.id.is_empty() {
            return Err(AdeError::InvalidRequest("principal id is empty".to_string()));
        }
        if request.resource.kind.is_empty() {
            return Err(AdeError::InvalidRequest("resource kind is empty".to_string()));
        }
        if request.actions.is_empty() {
            return Err(AdeError::InvalidRequest("no actions requested".to_string()));
        }

        if self.config.enable_metrics {
            self.metrics.record_check();
        }

        let cache_key = fingerprint::of_request(request, self.store.generation());
        if let Some(cache) = &self.config.decision_cache {
            if let Some(cached) = cache.get(&cache_key) {
                if self.config.enable_metrics {
                    self.metrics.record_cache_hit();
                    self.metrics.record_latency(start.elapsed());
                }
                debug!(decision = cached.id.as_str(), "decision cache hit");
                return Ok(cached);
            }
            if self.config.enable_metrics {
                self.metrics.record_cache_miss();
            }
        }

        let mut evaluation = Evaluation {
            config: &self.config,
            metrics: &self.metrics,
            ctx: EvalContext::new(request),
            cache: RequestCache::new(),
            trace: DerivationTrace::default(),
            effective_roles: BTreeSet::new(),
            token,
            deadline: start + self.config.default_deadline,
        };

        let per_action = match evaluation.run(&self.store, request) {
            Ok(per_action) => per_action,
            Err(AdeError::Internal(msg)) => {
                // Fail closed: every requested action resolves to Deny
                // and the inconsistency is recorded for debugging.
                warn!(error = msg.as_str(), "internal error during evaluation; failing closed");
                evaluation
                    .trace
                    .diagnostics
                    .push(format!("internal error, failing closed: {}", msg));
                request
                    .actions
                    .iter()
                    .map(|action| (action.clone(), ActionDecision::default_deny()))
                    .collect()
            }
            Err(other) => return Err(other),
        };

        let decision = Decision::new(per_action, evaluation.trace);

        if let Some(cache) = &self.config.decision_cache {
            cache.put(cache_key, &decision);
        }
        if self.config.enable_metrics {
            self.metrics.record_latency(start.elapsed());
        }

        debug!(
            decision = decision.id.as_str(),
            effect = ?decision.overall_effect,
            elapsed_us = start.elapsed().as_micros() as u64,
            "decision"
        );
        Ok(decision)
    }

    /// Counters, store sizes, and derived-role graph summary
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            store: self.store.stats(),
            expr_pool_entries: self.store.pool().len(),
            metrics: self.metrics.snapshot(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// State for one in-flight check
struct Evaluation<'a> {
    config: &'a EngineConfig,
    metrics: &'a MetricsCollector,
    ctx: EvalContext<'a>,
    cache: RequestCache,
    trace: DerivationTrace,
    effective_roles: BTreeSet<String>,
    token: &'a CancellationToken,
    deadline: Instant,
}

impl<'a> Evaluation<'a> {
    fn run(
        &mut self,
        store: &PolicyStore,
        request: &CheckRequest,
    ) -> Result<BTreeMap<String, ActionDecision>> {
        let order = store.derived_order();
        self.effective_roles = resolver::resolve_effective_roles(
            &order,
            &self.ctx,
            &mut self.cache,
            &mut self.trace.diagnostics,
        );
        debug!(roles = ?self.effective_roles, "effective role set");

        let mut pending: Vec<String> = Vec::with_capacity(request.actions.len());
        for action in &request.actions {
            if !pending.contains(action) {
                pending.push(action.clone());
            }
        }
        let mut decided: BTreeMap<String, ActionDecision> = BTreeMap::new();

        let kind = request.resource.kind.as_str();
        let scope = request.resource.scope.as_str();

        // T1: principal-ID-specific policies
        let t1 = store.lookup_principal_by_id(&request.principal.id, kind);
        let t1_candidates = principal_candidates(&t1, kind, scope);
        self.run_tier(Tier::PrincipalId, &t1_candidates, &mut pending, &mut decided)?;

        // T2: role-based principal policies, unioned over the effective
        // role set
        if !pending.is_empty() {
            let mut t2: Vec<Arc<CompiledPrincipalPolicy>> = Vec::new();
            for role in &self.effective_roles {
                for policy in store.lookup_principal_by_role(role, kind) {
                    if !t2.iter().any(|p| p.name == policy.name) {
                        t2.push(policy);
                    }
                }
            }
            t2.sort_by(|a, b| a.name.cmp(&b.name));
            let t2_candidates = principal_candidates(&t2, kind, scope);
            self.run_tier(Tier::PrincipalRole, &t2_candidates, &mut pending, &mut decided)?;
        }

        // T3/T4: resource policies from the scope-tree walk, split into
        // scoped and root attachments
        if !pending.is_empty() {
            let resource_policies = store.lookup_resource(kind, scope);
            let scoped: Vec<(&str, &[CompiledRule])> = resource_policies
                .iter()
                .filter(|(_, specificity)| *specificity > 0)
                .map(|(policy, _)| (policy.name.as_str(), policy.rules.as_slice()))
                .collect();
            self.run_tier(Tier::ResourceScoped, &scoped, &mut pending, &mut decided)?;

            let global: Vec<(&str, &[CompiledRule])> = resource_policies
                .iter()
                .filter(|(_, specificity)| *specificity == 0)
                .map(|(policy, _)| (policy.name.as_str(), policy.rules.as_slice()))
                .collect();
            self.run_tier(Tier::ResourceGlobal, &global, &mut pending, &mut decided)?;
        }

        // Default-deny for everything that fell through all four tiers
        for action in pending.drain(..) {
            if self.config.enable_metrics {
                self.metrics.record_action_effect(false);
                self.metrics.record_default_deny();
            }
            if self.config.enable_trace {
                self.trace.events.push(TraceEvent {
                    action: action.clone(),
                    tier: None,
                    policy: None,
                    rule: None,
                    effect: Effect::Deny,
                    note: Some("default-deny".to_string()),
                });
            }
            decided.insert(action, ActionDecision::default_deny());
        }

        Ok(decided)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() || Instant::now() > self.deadline {
            return Err(AdeError::Cancelled);
        }
        Ok(())
    }

    /// Run one tier for every still-pending action
    fn run_tier(
        &mut self,
        tier: Tier,
        policies: &[(&str, &[CompiledRule])],
        pending: &mut Vec<String>,
        decided: &mut BTreeMap<String, ActionDecision>,
    ) -> Result<()> {
        if policies.is_empty() || pending.is_empty() {
            return Ok(());
        }

        let mut still_pending = Vec::with_capacity(pending.len());
        for action in pending.drain(..) {
            self.checkpoint()?;
            match self.combine_for_action(tier, &action, policies)? {
                Some(outcome) => {
                    if self.config.enable_metrics {
                        self.metrics.record_action_effect(outcome.effect == Effect::Allow);
                        self.metrics.record_tier_hit(tier);
                    }
                    if self.config.enable_trace {
                        self.trace.events.push(TraceEvent {
                            action: action.clone(),
                            tier: Some(tier),
                            policy: outcome.policy.clone(),
                            rule: outcome.rule.clone(),
                            effect: outcome.effect,
                            note: outcome.output.as_ref().map(|v| v.to_string()),
                        });
                    }
                    decided.insert(action, outcome);
                }
                None => still_pending.push(action),
            }
        }
        *pending = still_pending;
        Ok(())
    }

    /// Deny-overrides combinator for one action within one tier
    ///
    /// A matching Deny settles the action immediately; a matching Allow
    /// is tentative until the whole tier has been scanned for a Deny.
    fn combine_for_action(
        &mut self,
        tier: Tier,
        action: &str,
        policies: &[(&str, &[CompiledRule])],
    ) -> Result<Option<ActionDecision>> {
        let mut tentative_allow: Option<(&str, &CompiledRule)> = None;

        for (policy_name, rules) in policies.iter().copied() {
            for rule in rules {
                if !rule.actions.matches(action) {
                    continue;
                }
                if !self.role_constraints_met(rule) {
                    continue;
                }
                if let Some(condition) = &rule.condition {
                    match self.eval_condition(condition) {
                        Some(true) => {}
                        Some(false) | None => continue,
                    }
                }

                if self.config.enable_metrics {
                    self.metrics.record_rule_match();
                }

                match rule.effect {
                    Effect::Deny => {
                        let output = self.eval_output(rule);
                        return Ok(Some(ActionDecision {
                            effect: Effect::Deny,
                            policy: Some(policy_name.to_string()),
                            rule: Some(rule.name.clone()),
                            tier: Some(tier),
                            output,
                        }));
                    }
                    Effect::Allow => {
                        if tentative_allow.is_none() {
                            tentative_allow = Some((policy_name, rule));
                        }
                    }
                    Effect::NoMatch => {}
                }
            }
        }

        Ok(tentative_allow.map(|(policy_name, rule)| {
            let output = self.eval_output(rule);
            ActionDecision {
                effect: Effect::Allow,
                policy: Some(policy_name.to_string()),
                rule: Some(rule.name.clone()),
                tier: Some(tier),
                output,
            }
        }))
    }

    /// Role constraints: when a rule names roles or derived roles, the
    /// effective set must satisfy at least one of them
    fn role_constraints_met(&self, rule: &CompiledRule) -> bool {
        if rule.roles.is_empty() && rule.derived_roles.is_empty() {
            return true;
        }
        let role_match = !rule.roles.is_empty()
            && rule
                .roles
                .matches_any(self.effective_roles.iter().map(String::as_str));
        let derived_match = rule
            .derived_roles
            .iter()
            .any(|name| self.effective_roles.contains(name));
        role_match || derived_match
    }

    /// Evaluate a rule condition, memoized per request
    ///
    /// `None` records an evaluation error: the rule is treated as
    /// non-matching and a diagnostic lands in the trace.
    fn eval_condition(&mut self, expr: &CompiledExpr) -> Option<bool> {
        let key = expr.fingerprint().short();
        let Evaluation {
            config,
            metrics,
            ctx,
            cache,
            trace,
            ..
        } = self;
        let diags = &mut trace.diagnostics;

        cache.condition(key, || match expr.eval(ctx, diags) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(expr = expr.source(), error = %e, "condition evaluation failed");
                diags.push(format!("condition '{}': {}", expr.source(), e));
                if config.enable_metrics {
                    metrics.record_condition_error();
                }
                None
            }
        })
    }

    /// Best-effort output evaluation for the winning rule
    fn eval_output(&mut self, rule: &CompiledRule) -> Option<AttrValue> {
        let expr = rule.output.as_ref()?;
        let Evaluation { ctx, trace, .. } = self;
        match expr.eval_value(ctx, &mut trace.diagnostics) {
            Ok(value) => value,
            Err(e) => {
                trace
                    .diagnostics
                    .push(format!("rule '{}': output: {}", rule.name, e));
                None
            }
        }
    }
}

/// Filter principal policies down to those covering the resource
fn principal_candidates<'p>(
    policies: &'p [Arc<CompiledPrincipalPolicy>],
    kind: &str,
    scope: &str,
) -> Vec<(&'p str, &'p [CompiledRule])> {
    policies
        .iter()
        .filter(|policy| policy.covers(kind, scope))
        .map(|policy| (policy.name.as_str(), policy.rules.as_slice()))
        .collect()
}
