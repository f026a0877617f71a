//! Condition evaluator
//!
//! A typed, CEL-like expression subset over the request context.
//! Expressions are compiled once (lex, parse, type-check) and pooled by
//! source string; evaluation is side-effect-free and synchronous.
//!
//! ```
//! use cretoai_ade::cel::{EvalContext, ExprPool};
//! use cretoai_ade::{CheckRequest, Principal, Resource};
//!
//! let pool = ExprPool::new();
//! let expr = pool.compile("resource.attr.owner == principal.id").unwrap();
//!
//! let request = CheckRequest::new(
//!     Principal::new("user:carol"),
//!     Resource::new("document", "doc-1").with_attribute("owner", "user:carol"),
//!     vec!["delete".to_string()],
//! );
//! let mut diags = Vec::new();
//! assert!(expr.eval(&EvalContext::new(&request), &mut diags).unwrap());
//! ```

mod ast;
mod compile;
mod context;
mod error;
mod eval;
mod functions;
mod lexer;
mod parser;

pub use compile::CompiledExpr;
pub use context::EvalContext;
pub use error::{CelError, Result};

use crate::adapter::ExpressionHost;
use dashmap::DashMap;
use std::sync::Arc;

impl CompiledExpr {
    /// Evaluate the expression to a boolean
    ///
    /// Non-fatal diagnostics (undefined-attribute comparisons) are
    /// appended to `diags`; hard failures are returned as `Eval` errors
    /// and make the enclosing rule non-matching.
    pub fn eval(&self, ctx: &EvalContext<'_>, diags: &mut Vec<String>) -> Result<bool> {
        match self.kind() {
            compile::ExprKind::Builtin(ast) => eval::eval_bool(ast, ctx, diags),
            compile::ExprKind::Host(host) => host
                .eval(ctx)
                .map_err(|e| CelError::Eval(e.to_string())),
        }
    }

    /// Evaluate the expression to a value
    ///
    /// `None` means the expression was undefined for this request.
    /// Host-compiled expressions surface their boolean result.
    pub fn eval_value(
        &self,
        ctx: &EvalContext<'_>,
        diags: &mut Vec<String>,
    ) -> Result<Option<crate::value::AttrValue>> {
        match self.kind() {
            compile::ExprKind::Builtin(ast) => {
                let value = eval::eval(ast, ctx, diags)?;
                Ok(value.attr().cloned())
            }
            compile::ExprKind::Host(host) => host
                .eval(ctx)
                .map(|b| Some(crate::value::AttrValue::Bool(b)))
                .map_err(|e| CelError::Eval(e.to_string())),
        }
    }
}

/// Pool of compiled expressions, keyed by source string
///
/// Compilation is stateless and idempotent, so the pool can be shared
/// freely across threads; `DashMap` keeps lookups lock-free on the hot
/// path.
pub struct ExprPool {
    programs: DashMap<String, Arc<CompiledExpr>>,
    host: Option<Arc<dyn ExpressionHost>>,
}

impl ExprPool {
    /// Create a pool backed by the built-in evaluator
    pub fn new() -> Self {
        Self {
            programs: DashMap::new(),
            host: None,
        }
    }

    /// Create a pool that delegates compilation to an external host
    pub fn with_host(host: Arc<dyn ExpressionHost>) -> Self {
        Self {
            programs: DashMap::new(),
            host: Some(host),
        }
    }

    /// Compile a source string, reusing the pooled form when available
    pub fn compile(&self, src: &str) -> Result<Arc<CompiledExpr>> {
        if let Some(program) = self.programs.get(src) {
            return Ok(program.clone());
        }

        let compiled = match &self.host {
            Some(host) => {
                let expr = host
                    .compile(src)
                    .map_err(|e| CelError::Compile(e.to_string()))?;
                CompiledExpr::from_host(src, expr)
            }
            None => CompiledExpr::compile(src)?,
        };

        let program = Arc::new(compiled);
        self.programs.insert(src.to_string(), program.clone());
        Ok(program)
    }

    /// Number of pooled programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Returns true when no programs are pooled
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Drop all pooled programs
    pub fn clear(&self) {
        self.programs.clear();
    }
}

impl Default for ExprPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckRequest, Principal, Resource};
    use chrono::TimeZone;

    fn request() -> CheckRequest {
        CheckRequest::new(
            Principal::new("user:alice")
                .with_roles(["admin", "editor"])
                .with_attribute("age", 34i64)
                .with_attribute("dept", "engineering"),
            Resource::new("document", "doc-1")
                .with_scope("acme.eu")
                .with_attribute("owner", "user:alice")
                .with_attribute("confidential", true),
            vec!["read".to_string()],
        )
        .with_aux("channel", "web")
    }

    fn eval(src: &str) -> bool {
        let request = request();
        let pool = ExprPool::new();
        let expr = pool.compile(src).unwrap();
        let mut diags = Vec::new();
        expr.eval(&EvalContext::new(&request), &mut diags).unwrap()
    }

    #[test]
    fn test_literals() {
        assert!(eval("true"));
        assert!(!eval("false"));
    }

    #[test]
    fn test_attribute_access() {
        assert!(eval("principal.id == 'user:alice'"));
        assert!(eval("resource.attr.owner == principal.id"));
        assert!(eval("resource.scope == 'acme.eu'"));
        assert!(eval("principal.attr.age >= 21"));
        assert!(eval("request.aux.channel == 'web'"));
    }

    #[test]
    fn test_role_membership() {
        assert!(eval("'admin' in principal.roles"));
        assert!(!eval("'viewer' in principal.roles"));
    }

    #[test]
    fn test_boolean_logic() {
        assert!(eval("principal.attr.age > 30 && resource.attr.confidential == true"));
        assert!(eval("principal.attr.age > 99 || 'editor' in principal.roles"));
        assert!(eval("!('owner' in principal.roles)"));
    }

    #[test]
    fn test_builtins() {
        assert!(eval("startsWith(principal.id, 'user:')"));
        assert!(eval("endsWith(principal.id, ':alice')"));
        assert!(eval("contains(principal.attr.dept, 'engineer')"));
        assert!(eval("size(principal.roles) == 2"));
        assert!(eval("matches(principal.id, 'user:*')"));
        assert!(eval("int('42') == 42"));
        assert!(eval("double(principal.attr.age) > 33.5"));
    }

    #[test]
    fn test_timestamp_comparison() {
        let mut request = request();
        request.now = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let pool = ExprPool::new();
        let expr = pool
            .compile("request.now < timestamp('2026-06-01T00:00:00Z')")
            .unwrap();
        let mut diags = Vec::new();
        assert!(expr.eval(&EvalContext::new(&request), &mut diags).unwrap());
    }

    #[test]
    fn test_undefined_comparison_is_false_with_diagnostic() {
        let request = request();
        let pool = ExprPool::new();
        let expr = pool.compile("principal.attr.clearance == 'top'").unwrap();
        let mut diags = Vec::new();
        assert!(!expr.eval(&EvalContext::new(&request), &mut diags).unwrap());
        assert_eq!(diags.len(), 1);

        // Both sides of != also collapse to false
        let expr = pool.compile("principal.attr.clearance != 'top'").unwrap();
        let mut diags = Vec::new();
        assert!(!expr.eval(&EvalContext::new(&request), &mut diags).unwrap());
        assert!(!diags.is_empty());
    }

    #[test]
    fn test_has_probes_presence() {
        assert!(eval("has(principal.attr.dept)"));
        assert!(!eval("has(principal.attr.clearance)"));
    }

    #[test]
    fn test_runtime_type_mismatch_is_eval_error() {
        let request = request();
        let pool = ExprPool::new();
        // dept is a string; comparing against a number passes the
        // compile-time check (dyn) but fails at evaluation
        let expr = pool.compile("principal.attr.dept == 3").unwrap();
        let mut diags = Vec::new();
        let result = expr.eval(&EvalContext::new(&request), &mut diags);
        assert!(matches!(result, Err(CelError::Eval(_))));
    }

    #[test]
    fn test_pool_reuses_programs() {
        let pool = ExprPool::new();
        let a = pool.compile("true").unwrap();
        let b = pool.compile("true").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);

        pool.compile("false").unwrap();
        assert_eq!(pool.len(), 2);

        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_compile_twice_agrees() {
        let src = "principal.attr.age >= 21 && startsWith(resource.kind, 'doc')";
        let a = CompiledExpr::compile(src).unwrap();
        let b = CompiledExpr::compile(src).unwrap();
        let request = request();
        let ctx = EvalContext::new(&request);
        let mut diags = Vec::new();
        assert_eq!(
            a.eval(&ctx, &mut diags).unwrap(),
            b.eval(&ctx, &mut diags).unwrap()
        );
    }

    #[test]
    fn test_arithmetic() {
        assert!(eval("principal.attr.age + 6 == 40"));
        assert!(eval("principal.attr.age % 2 == 0"));
        assert!(eval("10 / 2 == 5"));
    }

    #[test]
    fn test_division_by_zero_is_eval_error() {
        let request = request();
        let pool = ExprPool::new();
        let expr = pool.compile("1 / 0 == 1").unwrap();
        let mut diags = Vec::new();
        assert!(expr.eval(&EvalContext::new(&request), &mut diags).is_err());
    }

    #[test]
    fn test_list_indexing() {
        assert!(eval("[1, 2, 3][1] == 2"));
        // Out-of-bounds indexing is undefined, so comparisons collapse to false
        let request = request();
        let pool = ExprPool::new();
        let expr = pool.compile("[1][5] == 1").unwrap();
        let mut diags = Vec::new();
        assert!(!expr.eval(&EvalContext::new(&request), &mut diags).unwrap());
        assert!(!diags.is_empty());
    }
}
