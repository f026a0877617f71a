//! # Authorization Decision Engine
//!
//! Policy-driven access control core: given a `(principal, resource,
//! actions)` triple and request-time context, decide whether each
//! action is permitted.
//!
//! ## Features
//!
//! - **Four-tier evaluation** with deny-overrides and short-circuiting
//!   (principal-ID, role-based, scoped resource, global resource)
//! - **Indexed policy store** with principal, role, kind, and
//!   scope-tree lookup paths; single-writer, many-reader
//! - **Derived roles** with conditional activation, wildcard parents,
//!   and cycle detection at policy-add time
//! - **Typed condition expressions** compiled once, pooled by source,
//!   evaluated without side effects
//! - **Per-request memoization** of condition and role-resolution
//!   results
//! - **Fail-closed** semantics: every ambiguity resolves to Deny
//!
//! ## Example
//!
//! ```rust
//! use cretoai_ade::{
//!     CheckRequest, Effect, Engine, Policy, Principal, PrincipalSelector,
//!     Resource, ResourceSelector, Rule,
//! };
//!
//! let engine = Engine::new();
//!
//! engine.add_policy(Policy::resource(
//!     "document-readers",
//!     ResourceSelector::kind("document").with_scope("acme.**"),
//!     vec![Rule::new("allow-read", vec!["read"], Effect::Allow).for_role("viewer")],
//! ))?;
//!
//! let request = CheckRequest::new(
//!     Principal::new("user:alice").with_role("viewer"),
//!     Resource::new("document", "doc-123").with_scope("acme.eu"),
//!     vec!["read".to_string(), "delete".to_string()],
//! );
//!
//! let decision = engine.check(&request)?;
//! assert!(decision.is_allowed("read"));
//! assert!(!decision.is_allowed("delete")); // default-deny
//! # Ok::<(), cretoai_ade::AdeError>(())
//! ```

pub mod adapter;
pub mod cel;
pub mod derived_roles;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod glob;
pub mod policy;
pub mod store;
pub mod types;
pub mod value;

// Re-export the primary API surface
pub use adapter::{DecisionCache, ExpressionHost, HostExpr, PolicyLoader};
pub use derived_roles::DerivedRoleDef;
pub use engine::{
    ActionDecision, Decision, DerivationTrace, Engine, EngineConfig, EngineMetrics, EngineStats,
    Tier, TraceEvent,
};
pub use error::{AdeError, Result};
pub use fingerprint::Fingerprint;
pub use policy::{
    DerivedRoleSet, Policy, PolicyKind, PolicySpec, PrincipalPolicy, PrincipalSelector,
    ResourcePolicy, ResourceSelector, Rule,
};
pub use store::{PolicyStore, StoreStats};
pub use types::{CheckRequest, Effect, Principal, Resource};
pub use value::AttrValue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
