//! Core request types
//!
//! A check evaluates a `(principal, resource, actions)` triple plus
//! request-time context. All of these types are immutable once built;
//! the engine never mutates a request.

use crate::value::AttrValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Effect of a rule or a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
    /// Internal sentinel for "no rule matched"; never surfaced to callers
    NoMatch,
}

impl Effect {
    /// Returns true for `Allow` or `Deny`
    pub fn is_definitive(&self) -> bool {
        !matches!(self, Effect::NoMatch)
    }
}

/// Principal (user, service account, agent) making a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (e.g., "user:alice@example.com")
    pub id: String,

    /// Base roles held by the principal
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Additional attributes (e.g., department, seniority)
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Principal {
    /// Create a new principal from an ID string
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add a base role to the principal
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add several base roles at once
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add an attribute to the principal
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Resource being accessed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource kind (document, api, database, ...)
    pub kind: String,

    /// Resource identifier within its kind
    pub id: String,

    /// Dotted hierarchical scope (e.g., "acme.eu.sales"); empty = root
    #[serde(default)]
    pub scope: String,

    /// Additional attributes (owner, sensitivity, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Resource {
    /// Create a new resource
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            scope: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set the resource scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Add an attribute to the resource
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// An authorization check request
///
/// Immutable once created. A fresh per-request cache is attached by the
/// engine for the duration of one decision and dropped on return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Who is making the request
    pub principal: Principal,

    /// What is being accessed
    pub resource: Resource,

    /// Actions to decide; duplicates are collapsed in the decision
    pub actions: Vec<String>,

    /// Auxiliary request context (IP, channel, ...)
    #[serde(default)]
    pub aux: BTreeMap<String, AttrValue>,

    /// Evaluation timestamp, available to conditions as `request.now`
    pub now: DateTime<Utc>,
}

impl CheckRequest {
    /// Create a request stamped with the current time
    pub fn new(principal: Principal, resource: Resource, actions: Vec<String>) -> Self {
        Self {
            principal,
            resource,
            actions,
            aux: BTreeMap::new(),
            now: Utc::now(),
        }
    }

    /// Override the evaluation timestamp
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Add an auxiliary context value
    pub fn with_aux(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.aux.insert(key.into(), value.into());
        self
    }
}
