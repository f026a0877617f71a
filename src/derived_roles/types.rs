//! Derived role definitions

use crate::error::{AdeError, Result};
use crate::glob::GlobPattern;
use serde::{Deserialize, Serialize};

/// A derived role definition
///
/// A derived role is activated for a single request when every parent
/// role pattern matches at least one role in the principal's effective
/// set, and the optional condition evaluates true against the request
/// context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRoleDef {
    /// Unique derived role name (e.g., "document_owner")
    pub name: String,

    /// Parent role patterns; all must be satisfied (AND logic).
    /// Supports wildcards: `*`, `prefix:*`, `*:suffix`.
    pub parent_roles: Vec<String>,

    /// Optional condition expression for conditional activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DerivedRoleDef {
    /// Create a new derived role definition
    pub fn new<S: Into<String>>(name: impl Into<String>, parent_roles: Vec<S>) -> Self {
        Self {
            name: name.into(),
            parent_roles: parent_roles.into_iter().map(Into::into).collect(),
            condition: None,
        }
    }

    /// Attach an activation condition
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Validate the definition structurally
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when the name is empty, the parent
    /// list is empty, a parent pattern does not compile, or the role
    /// names itself as a parent.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AdeError::Validation(
                "derived role name cannot be empty".to_string(),
            ));
        }

        if self.parent_roles.is_empty() {
            return Err(AdeError::Validation(format!(
                "derived role '{}' must have at least one parent role",
                self.name
            )));
        }

        for parent in &self.parent_roles {
            GlobPattern::compile(parent).map_err(|e| {
                AdeError::Validation(format!("derived role '{}': {}", self.name, e))
            })?;
            if parent == &self.name {
                return Err(AdeError::Validation(format!(
                    "derived role '{}' cannot reference itself as a parent",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// A derived role definition with compiled parent patterns
#[derive(Debug, Clone)]
pub(crate) struct CompiledDerivedRole {
    pub def: DerivedRoleDef,
    pub parents: Vec<GlobPattern>,
    pub condition: Option<std::sync::Arc<crate::cel::CompiledExpr>>,
}

impl CompiledDerivedRole {
    /// Check whether every parent pattern matches some effective role
    pub fn parents_satisfied<'a, I>(&self, effective: I) -> bool
    where
        I: Iterator<Item = &'a str> + Clone,
    {
        self.parents
            .iter()
            .all(|parent| effective.clone().any(|role| parent.matches(role)))
    }
}
