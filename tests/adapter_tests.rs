//! Adapter seam tests: policy loading and expression-host delegation

use async_trait::async_trait;
use cretoai_ade::cel::{EvalContext, ExprPool};
use cretoai_ade::{
    AdeError, CheckRequest, Effect, Engine, EngineConfig, ExpressionHost, HostExpr, Policy,
    PolicyLoader, PolicyStore, Principal, PrincipalSelector, Resource, ResourceSelector, Rule,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct StaticLoader {
    policies: Vec<Policy>,
}

#[async_trait]
impl PolicyLoader for StaticLoader {
    async fn load(&self) -> Result<Vec<Policy>, AdeError> {
        Ok(self.policies.clone())
    }
}

#[tokio::test]
async fn engine_can_be_seeded_from_a_loader() {
    let loader = StaticLoader {
        policies: vec![
            Policy::resource(
                "readers",
                ResourceSelector::kind("document"),
                vec![Rule::new("allow-read", vec!["read"], Effect::Allow).for_role("viewer")],
            ),
            Policy::principal(
                "bob-blocked",
                PrincipalSelector::ById("user:bob".to_string()),
                vec![ResourceSelector::any()],
                vec![Rule::new("deny-all", vec!["*"], Effect::Deny)],
            ),
        ],
    };

    let engine = Engine::new();
    for policy in loader.load().await.unwrap() {
        engine.add_policy(policy).unwrap();
    }

    let request = CheckRequest::new(
        Principal::new("user:alice").with_role("viewer"),
        Resource::new("document", "doc-1"),
        vec!["read".to_string()],
    );
    assert!(engine.check(&request).unwrap().is_allowed("read"));

    let blocked = CheckRequest::new(
        Principal::new("user:bob").with_role("viewer"),
        Resource::new("document", "doc-1"),
        vec!["read".to_string()],
    );
    assert!(!engine.check(&blocked).unwrap().is_allowed("read"));
}

/// A host that "compiles" every expression to a constant and counts
/// compilations, standing in for an external CEL implementation
struct ConstHost {
    result: bool,
    compilations: AtomicUsize,
}

struct ConstExpr {
    result: bool,
}

impl HostExpr for ConstExpr {
    fn eval(&self, _ctx: &EvalContext<'_>) -> Result<bool, AdeError> {
        Ok(self.result)
    }
}

impl ExpressionHost for ConstHost {
    fn compile(&self, _src: &str) -> Result<Arc<dyn HostExpr>, AdeError> {
        self.compilations.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ConstExpr {
            result: self.result,
        }))
    }
}

#[test]
fn expression_host_replaces_builtin_evaluator() {
    let host = Arc::new(ConstHost {
        result: true,
        compilations: AtomicUsize::new(0),
    });
    let pool = Arc::new(ExprPool::with_host(host.clone()));
    let store = Arc::new(PolicyStore::with_pool(pool));
    let engine = Engine::with_store(store, EngineConfig::default());

    engine
        .add_policy(Policy::resource(
            "host-gated",
            ResourceSelector::kind("document"),
            vec![
                Rule::new("allow-read", vec!["read"], Effect::Allow)
                    // Not valid in the built-in subset; only the host
                    // accepts it
                    .when("custom_host_predicate(principal)"),
            ],
        ))
        .unwrap();

    let request = CheckRequest::new(
        Principal::new("user:alice"),
        Resource::new("document", "doc-1"),
        vec!["read".to_string()],
    );

    assert!(engine.check(&request).unwrap().is_allowed("read"));
    assert_eq!(host.compilations.load(Ordering::SeqCst), 1);

    // The pooled program is reused; re-adding does not recompile
    engine
        .add_policy(Policy::resource(
            "host-gated-2",
            ResourceSelector::kind("document"),
            vec![
                Rule::new("allow-write", vec!["write"], Effect::Allow)
                    .when("custom_host_predicate(principal)"),
            ],
        ))
        .unwrap();
    assert_eq!(host.compilations.load(Ordering::SeqCst), 1);
}
