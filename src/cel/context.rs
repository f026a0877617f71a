//! Evaluation context for condition expressions

use crate::types::{CheckRequest, Principal, Resource};
use crate::value::AttrValue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Borrowed view of one request, handed to the evaluator
///
/// The context never outlives the request it was built from, and the
/// evaluator never mutates it.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Principal making the request
    pub principal: &'a Principal,

    /// Resource being accessed
    pub resource: &'a Resource,

    /// Auxiliary request context, visible as `request.aux`
    pub aux: &'a BTreeMap<String, AttrValue>,

    /// Evaluation timestamp, visible as `request.now`
    pub now: DateTime<Utc>,
}

impl<'a> EvalContext<'a> {
    /// Build a context from a check request
    pub fn new(request: &'a CheckRequest) -> Self {
        Self {
            principal: &request.principal,
            resource: &request.resource,
            aux: &request.aux,
            now: request.now,
        }
    }
}
