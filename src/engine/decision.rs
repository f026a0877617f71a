//! Decision types and derivation traces

use crate::types::Effect;
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The priority tier that produced an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// T1: principal-ID-specific policies
    PrincipalId,
    /// T2: role-based principal policies
    PrincipalRole,
    /// T3: scoped resource policies
    ResourceScoped,
    /// T4: global resource policies (root scope)
    ResourceGlobal,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Tier::PrincipalId => "T1",
            Tier::PrincipalRole => "T2",
            Tier::ResourceScoped => "T3",
            Tier::ResourceGlobal => "T4",
        };
        write!(f, "{}", label)
    }
}

/// Outcome for a single requested action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDecision {
    /// Allow or Deny; the internal NoMatch sentinel never appears here
    pub effect: Effect,

    /// Winning policy name, absent for a default deny
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// Winning rule name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Tier the effect came from, absent for a default deny
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    /// Result of the winning rule's output expression, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<AttrValue>,
}

impl ActionDecision {
    /// The terminal default-deny outcome for an unmatched action
    pub fn default_deny() -> Self {
        Self {
            effect: Effect::Deny,
            policy: None,
            rule: None,
            tier: None,
            output: None,
        }
    }

    /// True when no rule matched and the default applied
    pub fn is_default_deny(&self) -> bool {
        self.effect == Effect::Deny && self.policy.is_none()
    }
}

/// One step in the derivation trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Requested action this event concerns
    pub action: String,

    /// Tier under evaluation, absent for default-deny events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    /// Policy involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// Rule involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Effect recorded by this event
    pub effect: Effect,

    /// Free-form note ("default-deny", deny reason text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Explanation of how a decision was reached
///
/// Events are populated only when tracing is enabled on the engine;
/// diagnostics (condition evaluation problems) are always collected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivationTrace {
    /// Ordered trace events
    pub events: Vec<TraceEvent>,

    /// Non-fatal condition diagnostics gathered during evaluation
    pub diagnostics: Vec<String>,
}

/// The result of one authorization check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision identifier
    pub id: String,

    /// Per-action outcomes; duplicate requested actions appear once
    pub per_action: BTreeMap<String, ActionDecision>,

    /// Allow only when every requested action is allowed
    pub overall_effect: Effect,

    /// Derivation trace and diagnostics
    pub trace: DerivationTrace,

    /// Decision timestamp (milliseconds since epoch)
    pub timestamp: u64,
}

impl Decision {
    pub(crate) fn new(per_action: BTreeMap<String, ActionDecision>, trace: DerivationTrace) -> Self {
        let overall_effect = if per_action.values().all(|d| d.effect == Effect::Allow) {
            Effect::Allow
        } else {
            Effect::Deny
        };
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4().to_string(),
            per_action,
            overall_effect,
            trace,
            timestamp,
        }
    }

    /// Whether the given action was allowed
    pub fn is_allowed(&self, action: &str) -> bool {
        self.per_action
            .get(action)
            .map(|d| d.effect == Effect::Allow)
            .unwrap_or(false)
    }

    /// The per-action outcome, if the action was requested
    pub fn action(&self, action: &str) -> Option<&ActionDecision> {
        self.per_action.get(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_effect_requires_all_allows() {
        let mut per_action = BTreeMap::new();
        per_action.insert(
            "read".to_string(),
            ActionDecision {
                effect: Effect::Allow,
                policy: Some("p".to_string()),
                rule: Some("r".to_string()),
                tier: Some(Tier::PrincipalId),
                output: None,
            },
        );
        per_action.insert("write".to_string(), ActionDecision::default_deny());

        let decision = Decision::new(per_action, DerivationTrace::default());
        assert_eq!(decision.overall_effect, Effect::Deny);
        assert!(decision.is_allowed("read"));
        assert!(!decision.is_allowed("write"));
        assert!(decision.action("write").unwrap().is_default_deny());
        assert!(!decision.id.is_empty());
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::PrincipalId.to_string(), "T1");
        assert_eq!(Tier::ResourceGlobal.to_string(), "T4");
    }
}
