//! Policy store and multi-axis indexes
//!
//! The store holds every policy and serves four lookup paths: by
//! principal ID, by role, by resource kind (through the scope tree),
//! and derived-role definitions by name. Writers (add/remove) are
//! serialized behind an exclusive lock; readers take the shared lock
//! only long enough to clone `Arc` references, so evaluation itself
//! runs lock-free over immutable snapshots.

pub mod scope_tree;

use crate::cel::{CompiledExpr, ExprPool};
use crate::derived_roles::graph;
use crate::derived_roles::{CompiledDerivedRole, DerivedRoleDef};
use crate::error::{AdeError, Result};
use crate::glob::{GlobPattern, GlobSet};
use crate::policy::{Policy, PolicySpec, PrincipalSelector, ResourceSelector, Rule};
use crate::types::Effect;
use parking_lot::RwLock;
use scope_tree::ScopeTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// A rule with compiled globs and conditions
#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub name: String,
    pub effect: Effect,
    pub actions: GlobSet,
    /// Empty set means unconstrained
    pub roles: GlobSet,
    pub derived_roles: Vec<String>,
    pub condition: Option<Arc<CompiledExpr>>,
    pub output: Option<Arc<CompiledExpr>>,
}

/// A compiled resource selector
#[derive(Debug)]
pub(crate) struct CompiledSelector {
    pub kind: GlobPattern,
    pub scope: String,
}

impl CompiledSelector {
    fn compile(selector: &ResourceSelector) -> Result<Self> {
        let kind = GlobPattern::compile(&selector.kind).map_err(AdeError::Validation)?;
        Ok(Self {
            kind,
            scope: selector.scope.clone(),
        })
    }

    pub fn matches(&self, kind: &str, scope: &str) -> bool {
        self.kind.matches(kind) && scope_tree::scope_pattern_matches(&self.scope, scope)
    }
}

/// A resource policy in evaluable form
#[derive(Debug)]
pub(crate) struct CompiledResourcePolicy {
    pub name: String,
    pub kind: GlobPattern,
    pub scope: String,
    pub rules: Vec<CompiledRule>,
}

/// A principal policy in evaluable form
#[derive(Debug)]
pub(crate) struct CompiledPrincipalPolicy {
    pub name: String,
    pub resource_selectors: Vec<CompiledSelector>,
    pub rules: Vec<CompiledRule>,
}

impl CompiledPrincipalPolicy {
    /// True when any selector covers the requested resource
    pub fn covers(&self, kind: &str, scope: &str) -> bool {
        self.resource_selectors
            .iter()
            .any(|selector| selector.matches(kind, scope))
    }
}

/// Per-kind index of principal policies, with a side bucket for
/// non-literal kind selectors
#[derive(Debug, Default)]
struct KindIndex {
    by_kind: HashMap<String, Vec<Arc<CompiledPrincipalPolicy>>>,
    wildcard: Vec<Arc<CompiledPrincipalPolicy>>,
}

impl KindIndex {
    fn insert(&mut self, policy: &Arc<CompiledPrincipalPolicy>) {
        let mut literal_kinds: Vec<&str> = Vec::new();
        let mut has_pattern = false;
        for selector in &policy.resource_selectors {
            match selector.kind.as_literal() {
                Some(kind) => {
                    if !literal_kinds.contains(&kind) {
                        literal_kinds.push(kind);
                    }
                }
                None => has_pattern = true,
            }
        }
        for kind in literal_kinds {
            self.by_kind
                .entry(kind.to_string())
                .or_default()
                .push(policy.clone());
        }
        if has_pattern {
            self.wildcard.push(policy.clone());
        }
    }

    fn remove(&mut self, name: &str) {
        for bucket in self.by_kind.values_mut() {
            bucket.retain(|p| p.name != name);
        }
        self.by_kind.retain(|_, bucket| !bucket.is_empty());
        self.wildcard.retain(|p| p.name != name);
    }

    fn is_empty(&self) -> bool {
        self.by_kind.is_empty() && self.wildcard.is_empty()
    }

    /// Kind-specific entries plus pattern entries matching the kind,
    /// name-sorted for deterministic evaluation
    fn lookup(&self, kind: &str) -> Vec<Arc<CompiledPrincipalPolicy>> {
        let mut found: Vec<Arc<CompiledPrincipalPolicy>> = self
            .by_kind
            .get(kind)
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default();

        for policy in &self.wildcard {
            let pattern_match = policy
                .resource_selectors
                .iter()
                .any(|s| !s.kind.is_literal() && s.kind.matches(kind));
            if pattern_match && !found.iter().any(|p| p.name == policy.name) {
                found.push(policy.clone());
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

/// Resource policies indexed by kind, each kind holding a scope tree
#[derive(Debug)]
struct ResourceIndex {
    by_kind: HashMap<String, ScopeTree<Arc<CompiledResourcePolicy>>>,
    wildcard: ScopeTree<Arc<CompiledResourcePolicy>>,
}

impl ResourceIndex {
    fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
            wildcard: ScopeTree::new(),
        }
    }

    fn insert(&mut self, policy: Arc<CompiledResourcePolicy>) {
        let scope = policy.scope.clone();
        let literal_kind = policy.kind.as_literal().map(str::to_string);
        match literal_kind {
            Some(kind) => {
                self.by_kind
                    .entry(kind)
                    .or_insert_with(ScopeTree::new)
                    .insert(&scope, policy);
            }
            None => self.wildcard.insert(&scope, policy),
        }
    }

    fn remove(&mut self, name: &str) {
        for tree in self.by_kind.values_mut() {
            tree.retain(|p| p.name != name);
        }
        self.by_kind.retain(|_, tree| !tree.is_empty());
        self.wildcard.retain(|p| p.name != name);
    }

    /// Policies covering `(kind, scope)`, ordered by scope specificity
    /// descending, then policy name ascending
    fn lookup(&self, kind: &str, scope: &str) -> Vec<(Arc<CompiledResourcePolicy>, usize)> {
        let mut found = self
            .by_kind
            .get(kind)
            .map(|tree| tree.lookup(scope))
            .unwrap_or_default();

        for (policy, specificity) in self.wildcard.lookup(scope) {
            if policy.kind.matches(kind) {
                found.push((policy, specificity));
            }
        }

        found.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));
        found.dedup_by(|(a, _), (b, _)| a.name == b.name);
        found
    }
}

struct StoreInner {
    policies: HashMap<String, Policy>,
    by_principal_id: HashMap<String, KindIndex>,
    by_role: HashMap<String, KindIndex>,
    resources: ResourceIndex,
    derived: BTreeMap<String, Arc<CompiledDerivedRole>>,
    /// set-policy name -> definition names it contributed
    derived_sets: HashMap<String, Vec<String>>,
    /// dependency-ordered snapshot, rebuilt on every mutation
    derived_order: Arc<Vec<Arc<CompiledDerivedRole>>>,
}

/// Store size summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total policies held
    pub policies: usize,
    /// Resource policies
    pub resource_policies: usize,
    /// Principal policies
    pub principal_policies: usize,
    /// Derived-role set policies
    pub derived_role_sets: usize,
    /// Individual derived role definitions
    pub derived_roles: usize,
    /// Mutation counter; bumps on every successful add/remove
    pub generation: u64,
}

/// The policy store
///
/// Single-writer, many-reader. Policies are immutable once published;
/// an add with an existing name replaces atomically.
pub struct PolicyStore {
    inner: RwLock<StoreInner>,
    generation: AtomicU64,
    pool: Arc<ExprPool>,
}

impl PolicyStore {
    /// Create an empty store with its own expression pool
    pub fn new() -> Self {
        Self::with_pool(Arc::new(ExprPool::new()))
    }

    /// Create an empty store sharing an existing expression pool
    pub fn with_pool(pool: Arc<ExprPool>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                policies: HashMap::new(),
                by_principal_id: HashMap::new(),
                by_role: HashMap::new(),
                resources: ResourceIndex::new(),
                derived: BTreeMap::new(),
                derived_sets: HashMap::new(),
                derived_order: Arc::new(Vec::new()),
            }),
            generation: AtomicU64::new(0),
            pool,
        }
    }

    /// Add a policy, replacing any existing policy of the same name
    ///
    /// Validation, condition compilation, derived-role reference
    /// linking, and cycle detection all happen before anything is
    /// published; a failed add leaves the store untouched.
    pub fn add(&self, policy: Policy) -> Result<()> {
        policy.validate()?;
        let compiled = self.compile_policy(&policy)?;

        let mut inner = self.inner.write();

        // Definitions contributed by the policy being replaced (if any)
        // are not part of the reference universe for this add.
        let replaced_defs: Vec<String> = inner
            .derived_sets
            .get(&policy.name)
            .cloned()
            .unwrap_or_default();
        let def_live = |inner: &StoreInner, name: &str| {
            inner.derived.contains_key(name) && !replaced_defs.iter().any(|d| d == name)
        };

        match &compiled {
            CompiledPolicy::DerivedRoles(defs) => {
                let mut candidate = inner.derived.clone();
                for name in &replaced_defs {
                    candidate.remove(name);
                }
                for def in defs {
                    graph::register(&mut candidate, def.clone())
                        .map_err(|e| AdeError::Validation(e.to_string()))?;
                }
                let order = graph::evaluation_order(&candidate)
                    .map_err(|e| AdeError::Validation(e.to_string()))?;

                // No interim rebuild: the order computed above is
                // installed directly.
                remove_from_indexes(&mut inner, &policy.name);
                inner.derived = candidate;
                inner.derived_order = Arc::new(order);
                inner.derived_sets.insert(
                    policy.name.clone(),
                    defs.iter().map(|d| d.def.name.clone()).collect(),
                );
            }
            CompiledPolicy::Resource(resource) => {
                check_derived_refs(&inner, &policy, &def_live)?;
                if remove_from_indexes(&mut inner, &policy.name) {
                    rebuild_derived_order(&mut inner);
                }
                inner.resources.insert(resource.clone());
            }
            CompiledPolicy::Principal { selector, policy: principal } => {
                check_derived_refs(&inner, &policy, &def_live)?;
                if remove_from_indexes(&mut inner, &policy.name) {
                    rebuild_derived_order(&mut inner);
                }
                match selector {
                    PrincipalSelector::ById(id) => {
                        inner
                            .by_principal_id
                            .entry(id.clone())
                            .or_default()
                            .insert(principal);
                    }
                    PrincipalSelector::ByRoles(roles) => {
                        for role in roles {
                            inner.by_role.entry(role.clone()).or_default().insert(principal);
                        }
                    }
                }
            }
        }

        let name = policy.name.clone();
        let replaced = inner.policies.insert(name.clone(), policy).is_some();
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(inner);

        info!(policy = name.as_str(), replaced, "policy published");
        Ok(())
    }

    /// Remove a policy by name; returns whether anything was removed
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.policies.remove(name).is_none() {
            return false;
        }
        if remove_from_indexes(&mut inner, name) {
            rebuild_derived_order(&mut inner);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(inner);

        info!(policy = name, "policy removed");
        true
    }

    /// Number of policies held
    pub fn len(&self) -> usize {
        self.inner.read().policies.len()
    }

    /// Returns true when the store holds no policies
    pub fn is_empty(&self) -> bool {
        self.inner.read().policies.is_empty()
    }

    /// Whether a policy with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().policies.contains_key(name)
    }

    /// Fetch a policy definition by name
    pub fn get(&self, name: &str) -> Option<Policy> {
        self.inner.read().policies.get(name).cloned()
    }

    /// Current mutation generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Look up a derived role definition by name
    pub fn lookup_derived_role(&self, name: &str) -> Option<DerivedRoleDef> {
        self.inner.read().derived.get(name).map(|d| d.def.clone())
    }

    /// Store size summary
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let mut stats = StoreStats {
            policies: inner.policies.len(),
            derived_roles: inner.derived.len(),
            generation: self.generation(),
            ..StoreStats::default()
        };
        for policy in inner.policies.values() {
            match &policy.spec {
                PolicySpec::Resource(_) => stats.resource_policies += 1,
                PolicySpec::Principal(_) => stats.principal_policies += 1,
                PolicySpec::DerivedRoles(_) => stats.derived_role_sets += 1,
            }
        }
        stats
    }

    /// ID-specific principal policies for `(id, kind)`
    pub(crate) fn lookup_principal_by_id(
        &self,
        id: &str,
        kind: &str,
    ) -> Vec<Arc<CompiledPrincipalPolicy>> {
        let inner = self.inner.read();
        inner
            .by_principal_id
            .get(id)
            .map(|index| index.lookup(kind))
            .unwrap_or_default()
    }

    /// Role-based principal policies for `(role, kind)`
    pub(crate) fn lookup_principal_by_role(
        &self,
        role: &str,
        kind: &str,
    ) -> Vec<Arc<CompiledPrincipalPolicy>> {
        let inner = self.inner.read();
        inner
            .by_role
            .get(role)
            .map(|index| index.lookup(kind))
            .unwrap_or_default()
    }

    /// Resource policies covering `(kind, scope)`, most specific first
    pub(crate) fn lookup_resource(
        &self,
        kind: &str,
        scope: &str,
    ) -> Vec<(Arc<CompiledResourcePolicy>, usize)> {
        self.inner.read().resources.lookup(kind, scope)
    }

    /// Dependency-ordered derived role snapshot
    pub(crate) fn derived_order(&self) -> Arc<Vec<Arc<CompiledDerivedRole>>> {
        self.inner.read().derived_order.clone()
    }

    /// The expression pool backing this store
    pub fn pool(&self) -> &Arc<ExprPool> {
        &self.pool
    }

    fn compile_policy(&self, policy: &Policy) -> Result<CompiledPolicy> {
        match &policy.spec {
            PolicySpec::Resource(rp) => {
                let selector = CompiledSelector::compile(&rp.selector)
                    .map_err(|e| prefix_policy(&policy.name, e))?;
                let rules = self
                    .compile_rules(&rp.rules)
                    .map_err(|e| prefix_policy(&policy.name, e))?;
                Ok(CompiledPolicy::Resource(Arc::new(CompiledResourcePolicy {
                    name: policy.name.clone(),
                    kind: selector.kind,
                    scope: selector.scope,
                    rules,
                })))
            }
            PolicySpec::Principal(pp) => {
                let resource_selectors = pp
                    .resource_selectors
                    .iter()
                    .map(CompiledSelector::compile)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| prefix_policy(&policy.name, e))?;
                let rules = self
                    .compile_rules(&pp.rules)
                    .map_err(|e| prefix_policy(&policy.name, e))?;
                Ok(CompiledPolicy::Principal {
                    selector: pp.selector.clone(),
                    policy: Arc::new(CompiledPrincipalPolicy {
                        name: policy.name.clone(),
                        resource_selectors,
                        rules,
                    }),
                })
            }
            PolicySpec::DerivedRoles(set) => {
                let mut defs = Vec::with_capacity(set.definitions.len());
                for def in &set.definitions {
                    let parents = def
                        .parent_roles
                        .iter()
                        .map(|p| GlobPattern::compile(p))
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(AdeError::Validation)
                        .map_err(|e| prefix_policy(&policy.name, e))?;
                    let condition = match &def.condition {
                        Some(src) => Some(self.pool.compile(src).map_err(|e| {
                            AdeError::Validation(format!(
                                "policy '{}': derived role '{}': {}",
                                policy.name, def.name, e
                            ))
                        })?),
                        None => None,
                    };
                    defs.push(Arc::new(CompiledDerivedRole {
                        def: def.clone(),
                        parents,
                        condition,
                    }));
                }
                Ok(CompiledPolicy::DerivedRoles(defs))
            }
        }
    }

    fn compile_rules(&self, rules: &[Rule]) -> Result<Vec<CompiledRule>> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (idx, rule) in rules.iter().enumerate() {
            let name = if rule.name.is_empty() {
                format!("rule-{:03}", idx + 1)
            } else {
                rule.name.clone()
            };

            let actions = GlobSet::compile(&rule.actions).map_err(AdeError::Validation)?;
            let roles = GlobSet::compile(&rule.roles).map_err(AdeError::Validation)?;
            let condition = match &rule.condition {
                Some(src) => Some(self.pool.compile(src).map_err(|e| {
                    AdeError::Validation(format!("rule '{}': {}", name, e))
                })?),
                None => None,
            };
            let output = match &rule.output {
                Some(src) => Some(Arc::new(CompiledExpr::compile_value(src).map_err(|e| {
                    AdeError::Validation(format!("rule '{}': output: {}", name, e))
                })?)),
                None => None,
            };

            compiled.push(CompiledRule {
                name,
                effect: rule.effect,
                actions,
                roles,
                derived_roles: rule.derived_roles.clone(),
                condition,
                output,
            });
        }
        Ok(compiled)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

enum CompiledPolicy {
    Resource(Arc<CompiledResourcePolicy>),
    Principal {
        selector: PrincipalSelector,
        policy: Arc<CompiledPrincipalPolicy>,
    },
    DerivedRoles(Vec<Arc<CompiledDerivedRole>>),
}

fn prefix_policy(name: &str, err: AdeError) -> AdeError {
    match err {
        AdeError::Validation(msg) => AdeError::Validation(format!("policy '{}': {}", name, msg)),
        other => other,
    }
}

/// Every derived-role name referenced by the policy's rules must
/// resolve to a live definition, and every import must name an
/// existing derived-role set.
fn check_derived_refs(
    inner: &StoreInner,
    policy: &Policy,
    def_live: &dyn Fn(&StoreInner, &str) -> bool,
) -> Result<()> {
    let (rules, imports): (&[Rule], &[String]) = match &policy.spec {
        PolicySpec::Resource(rp) => (&rp.rules, &rp.imports),
        PolicySpec::Principal(pp) => (&pp.rules, &[]),
        PolicySpec::DerivedRoles(_) => return Ok(()),
    };

    for import in imports {
        match inner.policies.get(import) {
            Some(p) if matches!(p.spec, PolicySpec::DerivedRoles(_)) => {}
            _ => {
                return Err(AdeError::Validation(format!(
                    "policy '{}': import '{}' does not name a derived role set",
                    policy.name, import
                )));
            }
        }
    }

    for rule in rules {
        for reference in &rule.derived_roles {
            if !def_live(inner, reference) {
                return Err(AdeError::Validation(format!(
                    "policy '{}': unresolved derived role reference '{}'",
                    policy.name, reference
                )));
            }
        }
    }

    Ok(())
}

/// Strip a policy from every index and drop any derived-role
/// definitions it contributed. Returns true when definitions were
/// dropped; the caller decides whether `derived_order` needs a
/// rebuild, since callers that are about to install a fresh order
/// would otherwise pay for a second topological sort.
fn remove_from_indexes(inner: &mut StoreInner, name: &str) -> bool {
    for index in inner.by_principal_id.values_mut() {
        index.remove(name);
    }
    inner.by_principal_id.retain(|_, index| !index.is_empty());

    for index in inner.by_role.values_mut() {
        index.remove(name);
    }
    inner.by_role.retain(|_, index| !index.is_empty());

    inner.resources.remove(name);

    match inner.derived_sets.remove(name) {
        Some(def_names) => {
            for def_name in &def_names {
                inner.derived.remove(def_name);
            }
            true
        }
        None => false,
    }
}

fn rebuild_derived_order(inner: &mut StoreInner) {
    // Removing nodes from an acyclic graph cannot introduce a cycle;
    // the rebuild only fails if an invariant is broken.
    match graph::evaluation_order(&inner.derived) {
        Ok(order) => inner.derived_order = Arc::new(order),
        Err(e) => {
            error!(error = %e, "derived role graph rebuild failed after removal");
            inner.derived_order = Arc::new(Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ResourceSelector;
    use crate::types::Effect;

    fn allow_rule(role: &str, action: &str) -> Rule {
        Rule::new(format!("allow-{}", action), vec![action], Effect::Allow).for_role(role)
    }

    #[test]
    fn test_add_and_lookup_resource_policy() {
        let store = PolicyStore::new();
        store
            .add(Policy::resource(
                "doc-base",
                ResourceSelector::kind("document").with_scope("acme"),
                vec![allow_rule("editor", "write")],
            ))
            .unwrap();

        let found = store.lookup_resource("document", "acme.eu");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.name, "doc-base");
        assert_eq!(found[0].1, 1);

        assert!(store.lookup_resource("ticket", "acme.eu").is_empty());
    }

    #[test]
    fn test_scope_ordering_and_name_tiebreak() {
        let store = PolicyStore::new();
        for (name, scope) in [
            ("p-root", ""),
            ("p-acme", "acme"),
            ("p-eu-b", "acme.eu"),
            ("p-eu-a", "acme.eu"),
        ] {
            store
                .add(Policy::resource(
                    name,
                    ResourceSelector::kind("document").with_scope(scope),
                    vec![allow_rule("editor", "write")],
                ))
                .unwrap();
        }

        let found = store.lookup_resource("document", "acme.eu.sales");
        let names: Vec<&str> = found.iter().map(|(p, _)| p.name.as_str()).collect();
        assert_eq!(names, vec!["p-eu-a", "p-eu-b", "p-acme", "p-root"]);
    }

    #[test]
    fn test_wildcard_kind_merged_into_lookup() {
        let store = PolicyStore::new();
        store
            .add(Policy::resource(
                "any-kind",
                ResourceSelector::any(),
                vec![allow_rule("auditor", "read")],
            ))
            .unwrap();
        store
            .add(Policy::resource(
                "doc-only",
                ResourceSelector::kind("document"),
                vec![allow_rule("editor", "write")],
            ))
            .unwrap();

        let found = store.lookup_resource("document", "");
        assert_eq!(found.len(), 2);

        let found = store.lookup_resource("ticket", "");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.name, "any-kind");
    }

    #[test]
    fn test_principal_id_index() {
        let store = PolicyStore::new();
        store
            .add(Policy::principal(
                "alice-vip",
                PrincipalSelector::ById("user:alice".to_string()),
                vec![ResourceSelector::any()],
                vec![Rule::new("allow-all", vec!["*"], Effect::Allow)],
            ))
            .unwrap();

        assert_eq!(store.lookup_principal_by_id("user:alice", "document").len(), 1);
        assert!(store.lookup_principal_by_id("user:bob", "document").is_empty());
    }

    #[test]
    fn test_role_index_with_kind_filter() {
        let store = PolicyStore::new();
        store
            .add(Policy::principal(
                "viewer-docs",
                PrincipalSelector::ByRoles(vec!["viewer".to_string()]),
                vec![ResourceSelector::kind("document")],
                vec![allow_rule("viewer", "read")],
            ))
            .unwrap();

        assert_eq!(store.lookup_principal_by_role("viewer", "document").len(), 1);
        assert!(store.lookup_principal_by_role("viewer", "ticket").is_empty());
        assert!(store.lookup_principal_by_role("editor", "document").is_empty());
    }

    #[test]
    fn test_duplicate_name_replaces_atomically() {
        let store = PolicyStore::new();
        let before = store.generation();

        store
            .add(Policy::resource(
                "doc",
                ResourceSelector::kind("document"),
                vec![allow_rule("editor", "write")],
            ))
            .unwrap();
        store
            .add(Policy::resource(
                "doc",
                ResourceSelector::kind("document"),
                vec![allow_rule("editor", "read")],
            ))
            .unwrap();

        assert_eq!(store.len(), 1);
        let found = store.lookup_resource("document", "");
        assert_eq!(found.len(), 1);
        assert!(found[0].0.rules[0].actions.matches("read"));
        assert_eq!(store.generation(), before + 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = PolicyStore::new();
        store
            .add(Policy::resource(
                "doc",
                ResourceSelector::kind("document"),
                vec![allow_rule("editor", "write")],
            ))
            .unwrap();

        assert!(store.remove("doc"));
        assert!(!store.remove("doc"));
        assert!(store.is_empty());
        assert!(store.lookup_resource("document", "").is_empty());
    }

    #[test]
    fn test_bad_condition_rejected_at_add() {
        let store = PolicyStore::new();
        let result = store.add(Policy::resource(
            "bad-cond",
            ResourceSelector::kind("document"),
            vec![Rule::new("r", vec!["read"], Effect::Allow).when("1 == 'one'")],
        ));

        assert!(matches!(result, Err(AdeError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unresolved_derived_role_reference_rejected() {
        let store = PolicyStore::new();
        let result = store.add(Policy::resource(
            "needs-owner",
            ResourceSelector::kind("document"),
            vec![Rule::new("r", vec!["delete"], Effect::Allow).for_derived_role("document_owner")],
        ));

        assert!(matches!(result, Err(AdeError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_cyclic_derived_roles_rejected_store_unchanged() {
        let store = PolicyStore::new();
        store
            .add(Policy::derived_roles(
                "set-a",
                vec![DerivedRoleDef::new("role_a", vec!["role_b"])],
            ))
            .unwrap();

        let generation = store.generation();
        let result = store.add(Policy::derived_roles(
            "set-b",
            vec![DerivedRoleDef::new("role_b", vec!["role_a"])],
        ));

        let Err(AdeError::Validation(msg)) = result else {
            panic!("expected validation error");
        };
        assert!(msg.contains("cyclic derived role"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.generation(), generation);
        assert!(store.lookup_derived_role("role_b").is_none());
    }

    #[test]
    fn test_derived_set_replacement_swaps_definitions() {
        let store = PolicyStore::new();
        store
            .add(Policy::derived_roles(
                "ownership",
                vec![DerivedRoleDef::new("document_owner", vec!["*"])],
            ))
            .unwrap();
        assert!(store.lookup_derived_role("document_owner").is_some());

        store
            .add(Policy::derived_roles(
                "ownership",
                vec![DerivedRoleDef::new("record_owner", vec!["*"])],
            ))
            .unwrap();

        assert!(store.lookup_derived_role("document_owner").is_none());
        assert!(store.lookup_derived_role("record_owner").is_some());
        assert_eq!(store.derived_order().len(), 1);
    }

    #[test]
    fn test_stats() {
        let store = PolicyStore::new();
        store
            .add(Policy::resource(
                "doc",
                ResourceSelector::kind("document"),
                vec![allow_rule("editor", "write")],
            ))
            .unwrap();
        store
            .add(Policy::derived_roles(
                "ownership",
                vec![DerivedRoleDef::new("document_owner", vec!["*"])],
            ))
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.policies, 2);
        assert_eq!(stats.resource_policies, 1);
        assert_eq!(stats.derived_role_sets, 1);
        assert_eq!(stats.derived_roles, 1);
        assert_eq!(stats.generation, 2);
    }
}
