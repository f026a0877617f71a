//! Policy definitions and structural validation
//!
//! A policy is an immutable, named unit of authorization. Three kinds
//! exist: resource policies (rules attached to a resource kind and
//! scope), principal policies (rules attached to a principal ID or to
//! roles), and derived-role sets (importable bundles of derived role
//! definitions).

use crate::derived_roles::DerivedRoleDef;
use crate::error::{AdeError, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::glob::GlobSet;
use crate::store::scope_tree;
use crate::types::Effect;
use serde::{Deserialize, Serialize};

/// Policy kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Rules attached to a resource kind and scope
    Resource,
    /// Rules attached to a principal ID or roles
    Principal,
    /// A bundle of derived role definitions
    DerivedRole,
}

/// An immutable, named unit of authorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique name within the store; adding a duplicate replaces atomically
    pub name: String,

    /// Free-form version string, part of the fingerprint
    #[serde(default)]
    pub version: String,

    /// Kind-specific body
    #[serde(flatten)]
    pub spec: PolicySpec,
}

/// Kind-specific policy body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicySpec {
    /// Resource policy body
    #[serde(rename = "resourcePolicy")]
    Resource(ResourcePolicy),

    /// Principal policy body
    #[serde(rename = "principalPolicy")]
    Principal(PrincipalPolicy),

    /// Derived role definitions
    #[serde(rename = "derivedRoles")]
    DerivedRoles(DerivedRoleSet),
}

/// Selects the resources a policy applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelector {
    /// Resource kind, glob-or-literal (`document`, `doc:*`, `*`)
    pub kind: String,

    /// Hierarchical scope pattern; `*` matches one segment, `**` zero or
    /// more, the empty string is the root
    #[serde(default)]
    pub scope: String,
}

impl ResourceSelector {
    /// Selector for one literal kind at the root scope
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            scope: String::new(),
        }
    }

    /// Set the scope pattern
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Selector matching every resource everywhere (`kind=*`, `scope=**`)
    pub fn any() -> Self {
        Self {
            kind: "*".to_string(),
            scope: "**".to_string(),
        }
    }
}

/// A resource policy: rules for one resource kind within a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePolicy {
    /// Which resources this policy covers
    pub selector: ResourceSelector,

    /// Ordered rule list
    pub rules: Vec<Rule>,

    /// Names of derived-role set policies whose definitions the rules use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

/// Selects the principals a principal policy applies to
///
/// Exactly one of the two forms; the enum shape makes "both" and
/// "neither" unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalSelector {
    /// A single principal by ID
    #[serde(rename = "id")]
    ById(String),

    /// Principals holding any of the listed roles
    #[serde(rename = "roles")]
    ByRoles(Vec<String>),
}

/// A principal policy: rules attached to a principal ID or to roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalPolicy {
    /// Which principals this policy covers
    pub selector: PrincipalSelector,

    /// Which resources the rules apply to
    pub resource_selectors: Vec<ResourceSelector>,

    /// Ordered rule list
    pub rules: Vec<Rule>,
}

/// An importable bundle of derived role definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRoleSet {
    /// The definitions in this set
    pub definitions: Vec<DerivedRoleDef>,
}

/// A single authorization rule
///
/// Rules are order-insensitive for the deny-overrides combinator but
/// keep their listed order for tie-breaking diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Rule name, used in decision traces
    #[serde(default)]
    pub name: String,

    /// Action glob set this rule covers
    pub actions: Vec<String>,

    /// Allow or Deny
    pub effect: Effect,

    /// Role patterns that must match the effective role set (any-of);
    /// empty means unconstrained
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Derived role names that must be active (any-of); empty means
    /// unconstrained
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_roles: Vec<String>,

    /// Optional condition expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Optional output expression, evaluated for the winning rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Rule {
    /// Create an unconditional rule over a set of action globs
    pub fn new<S: Into<String>>(name: impl Into<String>, actions: Vec<S>, effect: Effect) -> Self {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            effect,
            roles: Vec::new(),
            derived_roles: Vec::new(),
            condition: None,
            output: None,
        }
    }

    /// Constrain the rule to principals holding a matching role
    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Constrain the rule to an active derived role
    pub fn for_derived_role(mut self, name: impl Into<String>) -> Self {
        self.derived_roles.push(name.into());
        self
    }

    /// Attach a condition expression
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Attach an output expression
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

impl Policy {
    /// Build a resource policy
    pub fn resource(name: impl Into<String>, selector: ResourceSelector, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            spec: PolicySpec::Resource(ResourcePolicy {
                selector,
                rules,
                imports: Vec::new(),
            }),
        }
    }

    /// Build a principal policy
    pub fn principal(
        name: impl Into<String>,
        selector: PrincipalSelector,
        resource_selectors: Vec<ResourceSelector>,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            spec: PolicySpec::Principal(PrincipalPolicy {
                selector,
                resource_selectors,
                rules,
            }),
        }
    }

    /// Build a derived-role set policy
    pub fn derived_roles(name: impl Into<String>, definitions: Vec<DerivedRoleDef>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            spec: PolicySpec::DerivedRoles(DerivedRoleSet { definitions }),
        }
    }

    /// Set the policy version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Declare derived-role set imports (resource policies only; ignored
    /// for other kinds)
    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let PolicySpec::Resource(rp) = &mut self.spec {
            rp.imports = imports.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Policy kind discriminant
    pub fn kind(&self) -> PolicyKind {
        match &self.spec {
            PolicySpec::Resource(_) => PolicyKind::Resource,
            PolicySpec::Principal(_) => PolicyKind::Principal,
            PolicySpec::DerivedRoles(_) => PolicyKind::DerivedRole,
        }
    }

    /// Stable content fingerprint (name + version + body)
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint::of_serializable(self)
    }

    /// Structural validation, independent of store state
    ///
    /// Checks names, selectors, glob syntax, and scope-pattern syntax.
    /// Condition sources are compiled later by the store, against the
    /// shared expression pool.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AdeError::Validation("policy name cannot be empty".to_string()));
        }

        match &self.spec {
            PolicySpec::Resource(rp) => {
                validate_selector(&self.name, &rp.selector)?;
                validate_rules(&self.name, &rp.rules)?;
                for import in &rp.imports {
                    if import.is_empty() {
                        return Err(AdeError::Validation(format!(
                            "policy '{}': import name cannot be empty",
                            self.name
                        )));
                    }
                }
            }
            PolicySpec::Principal(pp) => {
                match &pp.selector {
                    PrincipalSelector::ById(id) if id.is_empty() => {
                        return Err(AdeError::Validation(format!(
                            "policy '{}': principal id selector cannot be empty",
                            self.name
                        )));
                    }
                    PrincipalSelector::ByRoles(roles) if roles.is_empty() => {
                        return Err(AdeError::Validation(format!(
                            "policy '{}': principal roles selector cannot be empty",
                            self.name
                        )));
                    }
                    PrincipalSelector::ByRoles(roles) => {
                        if roles.iter().any(String::is_empty) {
                            return Err(AdeError::Validation(format!(
                                "policy '{}': principal selector has an empty role",
                                self.name
                            )));
                        }
                    }
                    _ => {}
                }
                if pp.resource_selectors.is_empty() {
                    return Err(AdeError::Validation(format!(
                        "policy '{}': principal policy needs at least one resource selector",
                        self.name
                    )));
                }
                for selector in &pp.resource_selectors {
                    validate_selector(&self.name, selector)?;
                }
                validate_rules(&self.name, &pp.rules)?;
            }
            PolicySpec::DerivedRoles(set) => {
                if set.definitions.is_empty() {
                    return Err(AdeError::Validation(format!(
                        "policy '{}': derived role set has no definitions",
                        self.name
                    )));
                }
                for def in &set.definitions {
                    def.validate()?;
                }
            }
        }

        Ok(())
    }
}

fn validate_selector(policy: &str, selector: &ResourceSelector) -> Result<()> {
    GlobSet::compile(&[selector.kind.as_str()])
        .map_err(|e| AdeError::Validation(format!("policy '{}': kind selector: {}", policy, e)))?;
    scope_tree::validate_scope_pattern(&selector.scope)
        .map_err(|e| AdeError::Validation(format!("policy '{}': scope selector: {}", policy, e)))?;
    Ok(())
}

fn validate_rules(policy: &str, rules: &[Rule]) -> Result<()> {
    for (idx, rule) in rules.iter().enumerate() {
        let label = if rule.name.is_empty() {
            format!("rule #{}", idx + 1)
        } else {
            format!("rule '{}'", rule.name)
        };

        if rule.actions.is_empty() {
            return Err(AdeError::Validation(format!(
                "policy '{}': {} has no actions",
                policy, label
            )));
        }
        GlobSet::compile(&rule.actions)
            .map_err(|e| AdeError::Validation(format!("policy '{}': {}: {}", policy, label, e)))?;
        if !rule.effect.is_definitive() {
            return Err(AdeError::Validation(format!(
                "policy '{}': {} must have effect ALLOW or DENY",
                policy, label
            )));
        }
        if !rule.roles.is_empty() {
            GlobSet::compile(&rule.roles).map_err(|e| {
                AdeError::Validation(format!("policy '{}': {}: role pattern: {}", policy, label, e))
            })?;
        }
        if rule.derived_roles.iter().any(String::is_empty) {
            return Err(AdeError::Validation(format!(
                "policy '{}': {} references an empty derived role name",
                policy, label
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_rule() -> Rule {
        Rule::new("allow-read", vec!["read"], Effect::Allow).for_role("viewer")
    }

    #[test]
    fn test_resource_policy_validates() {
        let policy = Policy::resource(
            "document-base",
            ResourceSelector::kind("document").with_scope("acme.**"),
            vec![read_rule()],
        );
        assert!(policy.validate().is_ok());
        assert_eq!(policy.kind(), PolicyKind::Resource);
    }

    #[test]
    fn test_principal_selector_one_of() {
        let by_id = Policy::principal(
            "alice-override",
            PrincipalSelector::ById("user:alice".to_string()),
            vec![ResourceSelector::any()],
            vec![Rule::new("allow-all", vec!["*"], Effect::Allow)],
        );
        assert!(by_id.validate().is_ok());

        let empty_roles = Policy::principal(
            "broken",
            PrincipalSelector::ByRoles(vec![]),
            vec![ResourceSelector::any()],
            vec![read_rule()],
        );
        assert!(empty_roles.validate().is_err());
    }

    #[test]
    fn test_rule_without_actions_rejected() {
        let policy = Policy::resource(
            "no-actions",
            ResourceSelector::kind("document"),
            vec![Rule::new("r", Vec::<String>::new(), Effect::Allow)],
        );
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_nomatch_effect_rejected() {
        let policy = Policy::resource(
            "sentinel",
            ResourceSelector::kind("document"),
            vec![Rule::new("r", vec!["read"], Effect::NoMatch)],
        );
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_bad_glob_rejected() {
        let policy = Policy::resource(
            "bad-glob",
            ResourceSelector::kind("doc*ment"),
            vec![read_rule()],
        );
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Policy::resource(
            "p",
            ResourceSelector::kind("document"),
            vec![read_rule()],
        );
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.version = "2".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = Policy::principal(
            "bob-block",
            PrincipalSelector::ById("user:bob".to_string()),
            vec![ResourceSelector::any()],
            vec![Rule::new("deny-all", vec!["*"], Effect::Deny)],
        )
        .with_version("1");

        let encoded = serde_json::to_string(&policy).unwrap();
        let decoded: Policy = serde_json::from_str(&encoded).unwrap();
        assert_eq!(policy, decoded);
        assert_eq!(policy.fingerprint(), decoded.fingerprint());
    }
}
