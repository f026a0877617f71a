//! Content fingerprints for policies and requests
//!
//! Fingerprints are BLAKE3 hashes used as stable identities for cache
//! keying and invalidation. A policy's fingerprint covers its name,
//! version, and rule content; a request fingerprint covers everything a
//! decision depends on except the evaluation timestamp.

use crate::types::{CheckRequest, Principal, Resource};
use crate::value::AttrValue;
use blake3::Hasher;
use std::collections::BTreeMap;
use std::fmt;

/// A 256-bit content fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// The raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// A short identity suitable for hash-map keys on the hot path
    pub fn short(&self) -> u64 {
        u64::from_le_bytes(self.0[..8].try_into().expect("digest is 32 bytes"))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

/// Fingerprint an arbitrary serializable value via its canonical JSON form
///
/// `serde_json` keeps struct fields in declaration order and `BTreeMap`
/// keys sorted, so the encoding is deterministic for our types.
pub fn of_serializable<T: serde::Serialize>(value: &T) -> Fingerprint {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&encoded).into()
}

/// Fingerprint a bare string (expression sources, names)
pub fn of_str(s: &str) -> Fingerprint {
    blake3::hash(s.as_bytes()).into()
}

/// Feed a typed attribute map into a hasher in a deterministic order
pub(crate) fn hash_attrs(attrs: &BTreeMap<String, AttrValue>, hasher: &mut Hasher) {
    for (key, value) in attrs {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hash_value(value, hasher);
        hasher.update(b";");
    }
}

fn hash_value(value: &AttrValue, hasher: &mut Hasher) {
    match value {
        AttrValue::Bool(b) => {
            hasher.update(b"b");
            hasher.update(&[*b as u8]);
        }
        AttrValue::Int(i) => {
            hasher.update(b"i");
            hasher.update(&i.to_le_bytes());
        }
        AttrValue::Double(d) => {
            hasher.update(b"d");
            hasher.update(&d.to_le_bytes());
        }
        AttrValue::String(s) => {
            hasher.update(b"s");
            hasher.update(s.as_bytes());
        }
        AttrValue::Timestamp(t) => {
            hasher.update(b"t");
            hasher.update(&t.timestamp_micros().to_le_bytes());
        }
        AttrValue::List(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(item, hasher);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        AttrValue::Map(map) => {
            hasher.update(b"{");
            hash_attrs(map, hasher);
            hasher.update(b"}");
        }
    }
}

fn hash_principal(principal: &Principal, hasher: &mut Hasher) {
    hasher.update(principal.id.as_bytes());
    hasher.update(b"|");
    for role in &principal.roles {
        hasher.update(role.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"|");
    hash_attrs(&principal.attributes, hasher);
}

fn hash_resource(resource: &Resource, hasher: &mut Hasher) {
    hasher.update(resource.kind.as_bytes());
    hasher.update(b"|");
    hasher.update(resource.id.as_bytes());
    hasher.update(b"|");
    hasher.update(resource.scope.as_bytes());
    hasher.update(b"|");
    hash_attrs(&resource.attributes, hasher);
}

/// Fingerprint a request for external decision caching
///
/// The store generation is mixed in so that any policy mutation
/// invalidates every previously cached decision. `request.now` is
/// deliberately excluded; time-sensitive caching policy belongs to the
/// cache adapter's TTL.
pub fn of_request(request: &CheckRequest, generation: u64) -> Fingerprint {
    let mut hasher = Hasher::new();
    hasher.update(&generation.to_le_bytes());
    hasher.update(b"\x1f");
    hash_principal(&request.principal, &mut hasher);
    hasher.update(b"\x1f");
    hash_resource(&request.resource, &mut hasher);
    hasher.update(b"\x1f");
    let mut actions: Vec<&str> = request.actions.iter().map(String::as_str).collect();
    actions.sort_unstable();
    actions.dedup();
    for action in actions {
        hasher.update(action.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"\x1f");
    hash_attrs(&request.aux, &mut hasher);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckRequest, Principal, Resource};

    fn request() -> CheckRequest {
        CheckRequest::new(
            Principal::new("user:alice").with_role("editor"),
            Resource::new("document", "doc-1").with_scope("acme.eu"),
            vec!["read".to_string(), "write".to_string()],
        )
    }

    #[test]
    fn test_request_fingerprint_is_stable() {
        let a = of_request(&request(), 7);
        let b = of_request(&request(), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_request_fingerprint_ignores_now() {
        let mut late = request();
        late.now = late.now + chrono::Duration::seconds(90);
        assert_eq!(of_request(&request(), 1), of_request(&late, 1));
    }

    #[test]
    fn test_generation_changes_fingerprint() {
        assert_ne!(of_request(&request(), 1), of_request(&request(), 2));
    }

    #[test]
    fn test_action_order_is_canonical() {
        let mut swapped = request();
        swapped.actions = vec!["write".to_string(), "read".to_string()];
        assert_eq!(of_request(&request(), 3), of_request(&swapped, 3));
    }

    #[test]
    fn test_attribute_changes_fingerprint() {
        let mut tagged = request();
        tagged.principal = tagged.principal.with_attribute("dept", "sales");
        assert_ne!(of_request(&request(), 1), of_request(&tagged, 1));
    }
}
