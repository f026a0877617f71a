//! Static type checking and compiled expression form
//!
//! Compilation is where the type rules live: numeric operands agree
//! under promotion (int promotes to double), mixed string/number
//! comparisons are rejected outright, and attribute lookups type as
//! dynamic and are re-checked at evaluation time.

use super::ast::{BinOp, Expr, Literal, UnaryOp};
use super::error::{CelError, Result};
use super::parser;
use crate::adapter::HostExpr;
use crate::fingerprint::{self, Fingerprint};
use crate::glob::GlobPattern;
use std::fmt;
use std::sync::Arc;

/// Static type of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ty {
    Bool,
    Int,
    Double,
    Str,
    Timestamp,
    List,
    Map,
    /// Attribute lookups; concrete type known only at evaluation time
    Dyn,
    /// Context roots, only valid as member-access bases
    CtxPrincipal,
    CtxResource,
    CtxRequest,
    /// An attribute map (`principal.attr`, `request.aux`)
    AttrMap,
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ty::Bool => "bool",
            Ty::Int => "int",
            Ty::Double => "double",
            Ty::Str => "string",
            Ty::Timestamp => "timestamp",
            Ty::List => "list",
            Ty::Map => "map",
            Ty::Dyn => "dyn",
            Ty::CtxPrincipal => "principal",
            Ty::CtxResource => "resource",
            Ty::CtxRequest => "request",
            Ty::AttrMap => "attribute map",
        };
        write!(f, "{}", name)
    }
}

impl Ty {
    fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Double | Ty::Dyn)
    }

    fn is_bool(&self) -> bool {
        matches!(self, Ty::Bool | Ty::Dyn)
    }

    /// Comparison class; values compare only within one class
    fn class(&self) -> &'static str {
        match self {
            Ty::Int | Ty::Double => "number",
            Ty::Str => "string",
            Ty::Bool => "bool",
            Ty::Timestamp => "timestamp",
            Ty::List => "list",
            Ty::Map | Ty::AttrMap => "map",
            Ty::Dyn => "dyn",
            Ty::CtxPrincipal | Ty::CtxResource | Ty::CtxRequest => "context",
        }
    }

    /// Reject context roots where a value is required
    fn value(self) -> Result<Ty> {
        match self {
            Ty::CtxPrincipal | Ty::CtxResource | Ty::CtxRequest => Err(CelError::Compile(
                format!("'{}' is a context root, not a value", self),
            )),
            Ty::AttrMap => Ok(Ty::Map),
            other => Ok(other),
        }
    }
}

/// A compiled, immutable condition expression
pub struct CompiledExpr {
    src: String,
    fingerprint: Fingerprint,
    kind: ExprKind,
}

pub(crate) enum ExprKind {
    /// Built-in evaluator over a type-checked AST
    Builtin(Expr),
    /// Delegated to an external expression host
    Host(Arc<dyn HostExpr>),
}

impl fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpr")
            .field("src", &self.src)
            .field("fingerprint", &self.fingerprint.to_string())
            .finish()
    }
}

impl CompiledExpr {
    /// Compile a source string with the built-in evaluator
    pub fn compile(src: &str) -> Result<Self> {
        let ast = parser::parse(src)?;
        let ty = infer(&ast)?;
        if !matches!(ty, Ty::Bool | Ty::Dyn) {
            return Err(CelError::Compile(format!(
                "condition must produce a boolean, found {}",
                ty
            )));
        }
        Ok(Self {
            src: src.to_string(),
            fingerprint: fingerprint::of_str(src),
            kind: ExprKind::Builtin(ast),
        })
    }

    /// Compile a source string without the boolean-result requirement
    ///
    /// Used for rule output expressions, which may produce any value.
    pub fn compile_value(src: &str) -> Result<Self> {
        let ast = parser::parse(src)?;
        infer(&ast)?.value()?;
        Ok(Self {
            src: src.to_string(),
            fingerprint: fingerprint::of_str(src),
            kind: ExprKind::Builtin(ast),
        })
    }

    /// Wrap an expression compiled by an external host
    pub(crate) fn from_host(src: &str, expr: Arc<dyn HostExpr>) -> Self {
        Self {
            src: src.to_string(),
            fingerprint: fingerprint::of_str(src),
            kind: ExprKind::Host(expr),
        }
    }

    /// The original source string
    pub fn source(&self) -> &str {
        &self.src
    }

    /// Content fingerprint of the source, used for cache keys
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub(crate) fn kind(&self) -> &ExprKind {
        &self.kind
    }
}

/// Infer the static type of an expression, rejecting ill-typed forms
pub(crate) fn infer(expr: &Expr) -> Result<Ty> {
    match expr {
        Expr::Lit(lit) => Ok(match lit {
            Literal::Bool(_) => Ty::Bool,
            Literal::Int(_) => Ty::Int,
            Literal::Double(_) => Ty::Double,
            Literal::Str(_) => Ty::Str,
        }),

        Expr::Ident(name) => match name.as_str() {
            "principal" | "P" => Ok(Ty::CtxPrincipal),
            "resource" | "R" => Ok(Ty::CtxResource),
            "request" => Ok(Ty::CtxRequest),
            other => Err(CelError::Compile(format!("unknown identifier '{}'", other))),
        },

        Expr::Member(base, field) => {
            let base_ty = infer(base)?;
            member_type(base_ty, field)
        }

        Expr::Index(base, index) => {
            let base_ty = infer(base)?.value()?;
            let index_ty = infer(index)?.value()?;
            match base_ty {
                Ty::List => {
                    if !matches!(index_ty, Ty::Int | Ty::Dyn) {
                        return Err(CelError::Compile(format!(
                            "list index must be int, found {}",
                            index_ty
                        )));
                    }
                    Ok(Ty::Dyn)
                }
                Ty::Map => {
                    if !matches!(index_ty, Ty::Str | Ty::Dyn) {
                        return Err(CelError::Compile(format!(
                            "map index must be string, found {}",
                            index_ty
                        )));
                    }
                    Ok(Ty::Dyn)
                }
                Ty::Dyn => Ok(Ty::Dyn),
                other => Err(CelError::Compile(format!("cannot index into {}", other))),
            }
        }

        Expr::Unary(op, operand) => {
            let ty = infer(operand)?.value()?;
            match op {
                UnaryOp::Not => {
                    if !ty.is_bool() {
                        return Err(CelError::Compile(format!("'!' requires bool, found {}", ty)));
                    }
                    Ok(Ty::Bool)
                }
                UnaryOp::Neg => match ty {
                    Ty::Int => Ok(Ty::Int),
                    Ty::Double => Ok(Ty::Double),
                    Ty::Dyn => Ok(Ty::Dyn),
                    other => Err(CelError::Compile(format!(
                        "'-' requires a number, found {}",
                        other
                    ))),
                },
            }
        }

        Expr::Binary(op, lhs, rhs) => {
            let lt = infer(lhs)?.value()?;
            let rt = infer(rhs)?.value()?;
            match op {
                BinOp::Or | BinOp::And => {
                    if !lt.is_bool() || !rt.is_bool() {
                        return Err(CelError::Compile(format!(
                            "logical operator requires booleans, found {} and {}",
                            lt, rt
                        )));
                    }
                    Ok(Ty::Bool)
                }
                BinOp::Eq | BinOp::Ne => {
                    check_comparable(lt, rt)?;
                    Ok(Ty::Bool)
                }
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    check_comparable(lt, rt)?;
                    let ordered = |ty: Ty| {
                        matches!(ty, Ty::Int | Ty::Double | Ty::Str | Ty::Timestamp | Ty::Dyn)
                    };
                    if !ordered(lt) || !ordered(rt) {
                        return Err(CelError::Compile(format!(
                            "ordering is not defined for {} and {}",
                            lt, rt
                        )));
                    }
                    Ok(Ty::Bool)
                }
                BinOp::In => {
                    if !matches!(rt, Ty::List | Ty::Map | Ty::Dyn) {
                        return Err(CelError::Compile(format!(
                            "'in' requires a list or map on the right, found {}",
                            rt
                        )));
                    }
                    Ok(Ty::Bool)
                }
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                    if !lt.is_numeric() || !rt.is_numeric() {
                        return Err(CelError::Compile(format!(
                            "arithmetic requires numbers, found {} and {}",
                            lt, rt
                        )));
                    }
                    Ok(match (lt, rt) {
                        (Ty::Int, Ty::Int) => Ty::Int,
                        (Ty::Dyn, _) | (_, Ty::Dyn) => Ty::Dyn,
                        _ => Ty::Double,
                    })
                }
            }
        }

        Expr::Call(name, args) => check_call(name, args),

        Expr::List(items) => {
            for item in items {
                infer(item)?.value()?;
            }
            Ok(Ty::List)
        }

        Expr::Map(fields) => {
            for (_, value) in fields {
                infer(value)?.value()?;
            }
            Ok(Ty::Map)
        }
    }
}

fn member_type(base: Ty, field: &str) -> Result<Ty> {
    match base {
        Ty::CtxPrincipal => match field {
            "id" => Ok(Ty::Str),
            "roles" => Ok(Ty::List),
            "attr" | "attributes" => Ok(Ty::AttrMap),
            other => Err(CelError::Compile(format!(
                "principal has no field '{}'",
                other
            ))),
        },
        Ty::CtxResource => match field {
            "kind" | "id" | "scope" => Ok(Ty::Str),
            "attr" | "attributes" => Ok(Ty::AttrMap),
            other => Err(CelError::Compile(format!(
                "resource has no field '{}'",
                other
            ))),
        },
        Ty::CtxRequest => match field {
            "now" => Ok(Ty::Timestamp),
            "aux" => Ok(Ty::AttrMap),
            "principal" => Ok(Ty::CtxPrincipal),
            "resource" => Ok(Ty::CtxResource),
            other => Err(CelError::Compile(format!(
                "request has no field '{}'",
                other
            ))),
        },
        Ty::AttrMap | Ty::Map | Ty::Dyn => Ok(Ty::Dyn),
        other => Err(CelError::Compile(format!(
            "cannot access field '{}' on {}",
            field, other
        ))),
    }
}

fn check_comparable(lt: Ty, rt: Ty) -> Result<()> {
    if lt == Ty::Dyn || rt == Ty::Dyn {
        return Ok(());
    }
    if lt.class() != rt.class() {
        return Err(CelError::Compile(format!(
            "cannot compare {} and {}",
            lt.class(),
            rt.class()
        )));
    }
    Ok(())
}

fn check_call(name: &str, args: &[Expr]) -> Result<Ty> {
    let arity = |expected: usize| -> Result<()> {
        if args.len() != expected {
            return Err(CelError::Compile(format!(
                "{}() takes {} argument(s), found {}",
                name,
                expected,
                args.len()
            )));
        }
        Ok(())
    };

    match name {
        "size" => {
            arity(1)?;
            let ty = infer(&args[0])?.value()?;
            if !matches!(ty, Ty::Str | Ty::List | Ty::Map | Ty::Dyn) {
                return Err(CelError::Compile(format!(
                    "size() requires a string, list, or map, found {}",
                    ty
                )));
            }
            Ok(Ty::Int)
        }
        "startsWith" | "endsWith" => {
            arity(2)?;
            for arg in args {
                let ty = infer(arg)?.value()?;
                if !matches!(ty, Ty::Str | Ty::Dyn) {
                    return Err(CelError::Compile(format!(
                        "{}() requires strings, found {}",
                        name, ty
                    )));
                }
            }
            Ok(Ty::Bool)
        }
        "contains" => {
            arity(2)?;
            let container = infer(&args[0])?.value()?;
            if !matches!(container, Ty::Str | Ty::List | Ty::Dyn) {
                return Err(CelError::Compile(format!(
                    "contains() requires a string or list, found {}",
                    container
                )));
            }
            infer(&args[1])?.value()?;
            Ok(Ty::Bool)
        }
        "matches" => {
            arity(2)?;
            let value = infer(&args[0])?.value()?;
            let pattern = infer(&args[1])?.value()?;
            if !matches!(value, Ty::Str | Ty::Dyn) || !matches!(pattern, Ty::Str | Ty::Dyn) {
                return Err(CelError::Compile(
                    "matches() requires string arguments".to_string(),
                ));
            }
            // Literal patterns are validated now instead of at request time
            if let Expr::Lit(Literal::Str(pat)) = &args[1] {
                GlobPattern::compile(pat).map_err(CelError::Compile)?;
            }
            Ok(Ty::Bool)
        }
        "timestamp" => {
            arity(1)?;
            let ty = infer(&args[0])?.value()?;
            if !matches!(ty, Ty::Str | Ty::Timestamp | Ty::Dyn) {
                return Err(CelError::Compile(format!(
                    "timestamp() requires a string, found {}",
                    ty
                )));
            }
            Ok(Ty::Timestamp)
        }
        "int" => {
            arity(1)?;
            let ty = infer(&args[0])?.value()?;
            if !matches!(ty, Ty::Int | Ty::Double | Ty::Str | Ty::Timestamp | Ty::Dyn) {
                return Err(CelError::Compile(format!("int() cannot cast {}", ty)));
            }
            Ok(Ty::Int)
        }
        "double" => {
            arity(1)?;
            let ty = infer(&args[0])?.value()?;
            if !matches!(ty, Ty::Int | Ty::Double | Ty::Str | Ty::Dyn) {
                return Err(CelError::Compile(format!("double() cannot cast {}", ty)));
            }
            Ok(Ty::Double)
        }
        "has" => {
            arity(1)?;
            if !matches!(&args[0], Expr::Member(_, _) | Expr::Index(_, _)) {
                return Err(CelError::Compile(
                    "has() requires an attribute path".to_string(),
                ));
            }
            infer(&args[0])?;
            Ok(Ty::Bool)
        }
        other => Err(CelError::Compile(format!("unknown function '{}'", other))),
    }
}
