//! Effective role resolution
//!
//! Given a principal's base roles and the request context, produce the
//! effective role set: base roles plus every derived role whose parent
//! patterns and condition hold. Definitions are walked once, in the
//! dependency order computed at policy-add time, so resolution is a
//! single linear pass with no recursion.

use super::types::CompiledDerivedRole;
use crate::cel::EvalContext;
use crate::engine::request_cache::RequestCache;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Hash of a base role set, used as the memoization key
pub(crate) fn base_roles_hash(roles: &BTreeSet<String>) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for role in roles {
        hasher.update(role.as_bytes());
        hasher.update(b",");
    }
    u64::from_le_bytes(
        hasher.finalize().as_bytes()[..8]
            .try_into()
            .expect("digest is 32 bytes"),
    )
}

/// Resolve the effective role set for one request
///
/// Condition failures deactivate the affected definition and append a
/// diagnostic; they never fail the request. Results are memoized in the
/// per-request cache.
pub(crate) fn resolve_effective_roles(
    order: &[Arc<CompiledDerivedRole>],
    ctx: &EvalContext<'_>,
    cache: &mut RequestCache,
    diags: &mut Vec<String>,
) -> BTreeSet<String> {
    let base_hash = base_roles_hash(&ctx.principal.roles);
    if let Some(cached) = cache.effective_roles(base_hash) {
        return cached.clone();
    }

    let mut effective: BTreeSet<String> = ctx.principal.roles.clone();

    for def in order {
        if !def.parents_satisfied(effective.iter().map(String::as_str)) {
            continue;
        }

        let active = match &def.condition {
            None => true,
            Some(expr) => {
                let key = expr.fingerprint().short();
                cache
                    .condition(key, || match expr.eval(ctx, diags) {
                        Ok(result) => Some(result),
                        Err(e) => {
                            warn!(
                                derived_role = def.def.name.as_str(),
                                error = %e,
                                "derived role condition failed to evaluate"
                            );
                            diags.push(format!("derived role '{}': {}", def.def.name, e));
                            None
                        }
                    })
                    .unwrap_or(false)
            }
        };

        if active {
            effective.insert(def.def.name.clone());
        }
    }

    cache.store_effective_roles(base_hash, effective.clone());
    effective
}
