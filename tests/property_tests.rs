//! Property-based tests for the universal engine invariants

use cretoai_ade::cel::{CompiledExpr, EvalContext};
use cretoai_ade::glob::GlobPattern;
use cretoai_ade::{
    CheckRequest, Effect, Engine, Policy, Principal, PrincipalSelector, Resource,
    ResourceSelector, Rule,
};
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    "[a-z]{1,10}"
}

fn scope() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,6}", 0..4).prop_map(|parts| parts.join("."))
}

proptest! {
    /// Repeated checks over the same store and request yield identical
    /// decisions
    #[test]
    fn check_is_deterministic(
        role in ident(),
        action in ident(),
        kind in ident(),
        scope in scope(),
        has_deny in any::<bool>(),
    ) {
        let engine = Engine::new();
        engine.add_policy(Policy::resource(
            "grant",
            ResourceSelector::kind(kind.as_str()).with_scope(scope.as_str()),
            vec![Rule::new("allow", vec![action.as_str()], Effect::Allow).for_role(role.as_str())],
        )).unwrap();
        if has_deny {
            engine.add_policy(Policy::resource(
                "block",
                ResourceSelector::kind(kind.as_str()),
                vec![Rule::new("deny", vec![action.as_str()], Effect::Deny).for_role(role.as_str())],
            )).unwrap();
        }

        let request = CheckRequest::new(
            Principal::new("user:p").with_role(role.as_str()),
            Resource::new(kind.as_str(), "r-1").with_scope(scope.as_str()),
            vec![action.clone()],
        );

        let first = engine.check(&request).unwrap();
        let second = engine.check(&request).unwrap();

        let a = first.action(action.as_str()).unwrap();
        let b = second.action(action.as_str()).unwrap();
        prop_assert_eq!(a.effect, b.effect);
        prop_assert_eq!(&a.policy, &b.policy);
        prop_assert_eq!(&a.rule, &b.rule);
        prop_assert_eq!(first.overall_effect, second.overall_effect);
    }

    /// Every action is denied against an empty store
    #[test]
    fn empty_store_denies_everything(
        id in ident(),
        kind in ident(),
        scope in scope(),
        actions in prop::collection::vec(ident(), 1..4),
    ) {
        let engine = Engine::new();
        let request = CheckRequest::new(
            Principal::new(format!("user:{}", id)),
            Resource::new(kind, "r-1").with_scope(scope),
            actions.clone(),
        );

        let decision = engine.check(&request).unwrap();
        prop_assert_eq!(decision.overall_effect, Effect::Deny);
        for action in &actions {
            prop_assert!(decision.action(action).unwrap().is_default_deny());
        }
    }

    /// A role grant allows the action unless a higher-priority
    /// ID-specific Deny exists
    #[test]
    fn role_grant_allows_unless_id_deny(
        role in ident(),
        action in ident(),
        kind in ident(),
        scope in scope(),
        id_deny in any::<bool>(),
    ) {
        let engine = Engine::new();
        engine.add_policy(Policy::resource(
            "grant",
            ResourceSelector::kind(kind.as_str()),
            vec![Rule::new("allow", vec![action.as_str()], Effect::Allow).for_role(role.as_str())],
        )).unwrap();
        if id_deny {
            engine.add_policy(Policy::principal(
                "lockdown",
                PrincipalSelector::ById("user:p".to_string()),
                vec![ResourceSelector::any()],
                vec![Rule::new("deny", vec!["*"], Effect::Deny)],
            )).unwrap();
        }

        let request = CheckRequest::new(
            Principal::new("user:p").with_role(role.as_str()),
            Resource::new(kind.as_str(), "r-1").with_scope(scope.as_str()),
            vec![action.clone()],
        );

        let decision = engine.check(&request).unwrap();
        let expected = if id_deny { Effect::Deny } else { Effect::Allow };
        prop_assert_eq!(decision.action(action.as_str()).unwrap().effect, expected);
    }

    /// add_policy followed by remove_policy returns the store to its
    /// prior decisions
    #[test]
    fn add_remove_restores_decisions(
        role in ident(),
        action in ident(),
        other_action in ident(),
        kind in ident(),
    ) {
        let engine = Engine::new();
        engine.add_policy(Policy::resource(
            "base",
            ResourceSelector::kind(kind.as_str()),
            vec![Rule::new("allow", vec![action.as_str()], Effect::Allow).for_role(role.as_str())],
        )).unwrap();

        let request = CheckRequest::new(
            Principal::new("user:p").with_role(role.as_str()),
            Resource::new(kind.as_str(), "r-1"),
            vec![action.clone(), other_action.clone()],
        );

        let before = engine.check(&request).unwrap();

        engine.add_policy(Policy::resource(
            "transient",
            ResourceSelector::kind(kind.as_str()),
            vec![Rule::new("allow-all", vec!["*"], Effect::Allow).for_role(role.as_str())],
        )).unwrap();
        prop_assert!(engine.remove_policy("transient"));

        let after = engine.check(&request).unwrap();
        for action in [&action, &other_action] {
            prop_assert_eq!(
                before.action(action).unwrap().effect,
                after.action(action).unwrap().effect
            );
        }
    }

    /// `*` matches any non-empty string and nothing else
    #[test]
    fn full_wildcard_matches_non_empty(value in "[a-zA-Z0-9:_.-]{1,20}") {
        let pattern = GlobPattern::compile("*").unwrap();
        prop_assert!(pattern.matches(&value));
        prop_assert!(!pattern.matches(""));
    }

    /// `prefix:*` requires a non-empty remainder after the prefix
    #[test]
    fn prefix_wildcard_requires_remainder(stem in "[a-z]{1,8}", rest in "[a-z0-9:]{1,8}") {
        let pattern = GlobPattern::compile(&format!("{}:*", stem)).unwrap();
        let full = format!("{}:{}", stem, rest);
        prop_assert!(pattern.matches(&full));
        prop_assert!(!pattern.matches(&stem));
        let stem_only = format!("{}:", stem);
        prop_assert!(!pattern.matches(&stem_only));
    }

    /// Compiling an expression twice yields matchers that agree
    #[test]
    fn compile_twice_agrees(age in 0i64..100, dept in ident()) {
        let src = "principal.attr.age >= 21 && principal.attr.dept == 'sales'";
        let a = CompiledExpr::compile(src).unwrap();
        let b = CompiledExpr::compile(src).unwrap();

        let request = CheckRequest::new(
            Principal::new("user:p")
                .with_attribute("age", age)
                .with_attribute("dept", dept),
            Resource::new("document", "r-1"),
            vec!["read".to_string()],
        );
        let ctx = EvalContext::new(&request);

        let mut diags_a = Vec::new();
        let mut diags_b = Vec::new();
        prop_assert_eq!(
            a.eval(&ctx, &mut diags_a).unwrap(),
            b.eval(&ctx, &mut diags_b).unwrap()
        );
    }

    /// Serializing and reloading a policy preserves decisions
    #[test]
    fn policy_serde_round_trip_preserves_decisions(
        role in ident(),
        action in ident(),
        kind in ident(),
        scope in scope(),
    ) {
        let policy = Policy::resource(
            "grant",
            ResourceSelector::kind(kind.as_str()).with_scope(scope.as_str()),
            vec![
                Rule::new("allow", vec![action.as_str()], Effect::Allow)
                    .for_role(role.as_str())
                    .when("principal.attr.active == true"),
            ],
        );

        let reloaded: Policy =
            serde_json::from_str(&serde_json::to_string(&policy).unwrap()).unwrap();

        let original_engine = Engine::new();
        original_engine.add_policy(policy).unwrap();
        let reloaded_engine = Engine::new();
        reloaded_engine.add_policy(reloaded).unwrap();

        let request = CheckRequest::new(
            Principal::new("user:p")
                .with_role(role.as_str())
                .with_attribute("active", true),
            Resource::new(kind.as_str(), "r-1").with_scope(scope.as_str()),
            vec![action.clone()],
        );

        let a = original_engine.check(&request).unwrap();
        let b = reloaded_engine.check(&request).unwrap();
        prop_assert_eq!(
            a.action(action.as_str()).unwrap().effect,
            b.action(action.as_str()).unwrap().effect
        );
    }
}
