//! Expression evaluation
//!
//! Evaluation is side-effect-free. Missing attributes surface as a
//! distinguished `Undefined` value; any comparison touching `Undefined`
//! yields `false` and records a non-fatal diagnostic instead of failing
//! the rule outright. Genuine type mismatches between concrete runtime
//! values are `Eval` errors and make the rule non-matching.

use super::ast::{BinOp, Expr, Literal, UnaryOp};
use super::context::EvalContext;
use super::error::{CelError, Result};
use super::functions;
use crate::value::AttrValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A value produced during evaluation
pub(crate) enum V<'a> {
    /// Borrowed attribute value
    Attr(&'a AttrValue),
    /// Computed value
    Owned(AttrValue),
    /// The `principal` context root
    Principal,
    /// The `resource` context root
    Resource,
    /// The `request` context root
    Request,
    /// An attribute map root (`principal.attr`, `request.aux`)
    AttrMap(&'a BTreeMap<String, AttrValue>),
    /// A missing attribute
    Undefined,
}

impl<'a> V<'a> {
    pub(crate) fn attr(&self) -> Option<&AttrValue> {
        match self {
            V::Attr(value) => Some(value),
            V::Owned(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn is_undefined(&self) -> bool {
        matches!(self, V::Undefined)
    }

    fn describe(&self) -> &'static str {
        match self {
            V::Attr(value) => value.type_name(),
            V::Owned(value) => value.type_name(),
            V::Principal => "principal",
            V::Resource => "resource",
            V::Request => "request",
            V::AttrMap(_) => "attribute map",
            V::Undefined => "undefined",
        }
    }
}

/// Evaluate an expression to a boolean
///
/// An `Undefined` result is reported as `false` with a diagnostic.
pub(crate) fn eval_bool(
    expr: &Expr,
    ctx: &EvalContext<'_>,
    diags: &mut Vec<String>,
) -> Result<bool> {
    match eval(expr, ctx, diags)? {
        V::Undefined => {
            diags.push("condition evaluated to undefined; treated as false".to_string());
            Ok(false)
        }
        value => match value.attr() {
            Some(AttrValue::Bool(b)) => Ok(*b),
            _ => Err(CelError::NonBooleanResult),
        },
    }
}

pub(crate) fn eval<'a>(
    expr: &'a Expr,
    ctx: &EvalContext<'a>,
    diags: &mut Vec<String>,
) -> Result<V<'a>> {
    match expr {
        Expr::Lit(lit) => Ok(V::Owned(match lit {
            Literal::Bool(b) => AttrValue::Bool(*b),
            Literal::Int(i) => AttrValue::Int(*i),
            Literal::Double(d) => AttrValue::Double(*d),
            Literal::Str(s) => AttrValue::String(s.clone()),
        })),

        Expr::Ident(name) => match name.as_str() {
            "principal" | "P" => Ok(V::Principal),
            "resource" | "R" => Ok(V::Resource),
            "request" => Ok(V::Request),
            other => Err(CelError::Eval(format!("unknown identifier '{}'", other))),
        },

        Expr::Member(base, field) => {
            let base_value = eval(base, ctx, diags)?;
            member(base_value, field, ctx)
        }

        Expr::Index(base, index) => {
            let base_value = eval(base, ctx, diags)?;
            let index_value = eval(index, ctx, diags)?;
            index_into(base_value, index_value)
        }

        Expr::Unary(op, operand) => {
            let value = eval(operand, ctx, diags)?;
            match op {
                UnaryOp::Not => {
                    let b = to_bool(&value, diags)?;
                    Ok(V::Owned(AttrValue::Bool(!b)))
                }
                UnaryOp::Neg => match value.attr() {
                    Some(AttrValue::Int(i)) => Ok(V::Owned(AttrValue::Int(-i))),
                    Some(AttrValue::Double(d)) => Ok(V::Owned(AttrValue::Double(-d))),
                    None if value.is_undefined() => Ok(V::Undefined),
                    _ => Err(CelError::Eval(format!(
                        "'-' requires a number, found {}",
                        value.describe()
                    ))),
                },
            }
        }

        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx, diags),

        Expr::Call(name, args) => {
            if name == "has" {
                // has() probes the path leniently: errors and undefined
                // both mean "not present".
                let mut probe_diags = Vec::new();
                let present = match eval(&args[0], ctx, &mut probe_diags) {
                    Ok(value) => !value.is_undefined(),
                    Err(_) => false,
                };
                return Ok(V::Owned(AttrValue::Bool(present)));
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, ctx, diags)?);
            }
            functions::call(name, &values, diags)
        }

        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match eval(item, ctx, diags)? {
                    V::Undefined => return Ok(V::Undefined),
                    value => match value.attr() {
                        Some(attr) => values.push(attr.clone()),
                        None => {
                            return Err(CelError::Eval(format!(
                                "{} cannot be used inside a list",
                                value.describe()
                            )));
                        }
                    },
                }
            }
            Ok(V::Owned(AttrValue::List(values)))
        }

        Expr::Map(fields) => {
            let mut map = BTreeMap::new();
            for (key, field) in fields {
                match eval(field, ctx, diags)? {
                    V::Undefined => return Ok(V::Undefined),
                    value => match value.attr() {
                        Some(attr) => {
                            map.insert(key.clone(), attr.clone());
                        }
                        None => {
                            return Err(CelError::Eval(format!(
                                "{} cannot be used inside a map",
                                value.describe()
                            )));
                        }
                    },
                }
            }
            Ok(V::Owned(AttrValue::Map(map)))
        }
    }
}

fn member<'a>(base: V<'a>, field: &str, ctx: &EvalContext<'a>) -> Result<V<'a>> {
    match base {
        V::Principal => match field {
            "id" => Ok(V::Owned(AttrValue::String(ctx.principal.id.clone()))),
            "roles" => Ok(V::Owned(AttrValue::List(
                ctx.principal
                    .roles
                    .iter()
                    .map(|r| AttrValue::String(r.clone()))
                    .collect(),
            ))),
            "attr" | "attributes" => Ok(V::AttrMap(&ctx.principal.attributes)),
            other => Err(CelError::Eval(format!("principal has no field '{}'", other))),
        },
        V::Resource => match field {
            "kind" => Ok(V::Owned(AttrValue::String(ctx.resource.kind.clone()))),
            "id" => Ok(V::Owned(AttrValue::String(ctx.resource.id.clone()))),
            "scope" => Ok(V::Owned(AttrValue::String(ctx.resource.scope.clone()))),
            "attr" | "attributes" => Ok(V::AttrMap(&ctx.resource.attributes)),
            other => Err(CelError::Eval(format!("resource has no field '{}'", other))),
        },
        V::Request => match field {
            "now" => Ok(V::Owned(AttrValue::Timestamp(ctx.now))),
            "aux" => Ok(V::AttrMap(ctx.aux)),
            "principal" => Ok(V::Principal),
            "resource" => Ok(V::Resource),
            other => Err(CelError::Eval(format!("request has no field '{}'", other))),
        },
        V::AttrMap(map) => Ok(map.get(field).map(V::Attr).unwrap_or(V::Undefined)),
        V::Attr(AttrValue::Map(map)) => {
            Ok(map.get(field).map(V::Attr).unwrap_or(V::Undefined))
        }
        V::Owned(AttrValue::Map(map)) => Ok(map
            .get(field)
            .cloned()
            .map(V::Owned)
            .unwrap_or(V::Undefined)),
        V::Undefined => Ok(V::Undefined),
        other => Err(CelError::Eval(format!(
            "cannot access field '{}' on {}",
            field,
            other.describe()
        ))),
    }
}

fn index_into<'a>(base: V<'a>, index: V<'a>) -> Result<V<'a>> {
    if base.is_undefined() || index.is_undefined() {
        return Ok(V::Undefined);
    }

    if let V::AttrMap(map) = &base {
        let key = index
            .attr()
            .and_then(AttrValue::as_str)
            .ok_or_else(|| CelError::Eval("map index must be a string".to_string()))?;
        return Ok(map.get(key).map(V::Attr).unwrap_or(V::Undefined));
    }

    match base {
        V::Attr(AttrValue::List(items)) => {
            let i = list_index(&index, items.len())?;
            Ok(i.map(|i| V::Attr(&items[i])).unwrap_or(V::Undefined))
        }
        V::Owned(AttrValue::List(items)) => {
            let i = list_index(&index, items.len())?;
            Ok(i.map(|i| V::Owned(items[i].clone())).unwrap_or(V::Undefined))
        }
        V::Attr(AttrValue::Map(map)) => {
            let key = index
                .attr()
                .and_then(AttrValue::as_str)
                .ok_or_else(|| CelError::Eval("map index must be a string".to_string()))?;
            Ok(map.get(key).map(V::Attr).unwrap_or(V::Undefined))
        }
        V::Owned(AttrValue::Map(map)) => {
            let key = index
                .attr()
                .and_then(AttrValue::as_str)
                .ok_or_else(|| CelError::Eval("map index must be a string".to_string()))?
                .to_string();
            Ok(map.get(&key).cloned().map(V::Owned).unwrap_or(V::Undefined))
        }
        other => Err(CelError::Eval(format!(
            "cannot index into {}",
            other.describe()
        ))),
    }
}

fn list_index(index: &V<'_>, len: usize) -> Result<Option<usize>> {
    let i = index
        .attr()
        .and_then(AttrValue::as_int)
        .ok_or_else(|| CelError::Eval("list index must be an int".to_string()))?;
    if i < 0 || i as usize >= len {
        return Ok(None);
    }
    Ok(Some(i as usize))
}

fn eval_binary<'a>(
    op: BinOp,
    lhs: &'a Expr,
    rhs: &'a Expr,
    ctx: &EvalContext<'a>,
    diags: &mut Vec<String>,
) -> Result<V<'a>> {
    // Short-circuiting logical operators
    if matches!(op, BinOp::And | BinOp::Or) {
        let left = to_bool(&eval(lhs, ctx, diags)?, diags)?;
        let result = match op {
            BinOp::And => left && to_bool(&eval(rhs, ctx, diags)?, diags)?,
            BinOp::Or => left || to_bool(&eval(rhs, ctx, diags)?, diags)?,
            _ => unreachable!(),
        };
        return Ok(V::Owned(AttrValue::Bool(result)));
    }

    let left = eval(lhs, ctx, diags)?;
    let right = eval(rhs, ctx, diags)?;

    if op.is_comparison() || op == BinOp::In {
        if left.is_undefined() || right.is_undefined() {
            diags.push("comparison involves an undefined attribute; treated as false".to_string());
            return Ok(V::Owned(AttrValue::Bool(false)));
        }
    }

    match op {
        BinOp::Eq | BinOp::Ne => {
            let (a, b) = value_pair(&left, &right)?;
            let eq = eq_values(a, b)?;
            let result = if op == BinOp::Eq { eq } else { !eq };
            Ok(V::Owned(AttrValue::Bool(result)))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let (a, b) = value_pair(&left, &right)?;
            let ordering = cmp_values(a, b)?;
            let result = match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                BinOp::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(V::Owned(AttrValue::Bool(result)))
        }
        BinOp::In => {
            let item = left
                .attr()
                .ok_or_else(|| CelError::Eval("'in' requires a value operand".to_string()))?;
            let contained = match &right {
                V::AttrMap(map) => item
                    .as_str()
                    .map(|key| map.contains_key(key))
                    .unwrap_or(false),
                other => match other.attr() {
                    Some(AttrValue::List(items)) => {
                        items.iter().any(|entry| eq_values(item, entry).unwrap_or(false))
                    }
                    Some(AttrValue::Map(map)) => item
                        .as_str()
                        .map(|key| map.contains_key(key))
                        .unwrap_or(false),
                    _ => {
                        return Err(CelError::Eval(
                            "'in' requires a list or map on the right".to_string(),
                        ));
                    }
                },
            };
            Ok(V::Owned(AttrValue::Bool(contained)))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            if left.is_undefined() || right.is_undefined() {
                return Ok(V::Undefined);
            }
            let (a, b) = value_pair(&left, &right)?;
            arithmetic(op, a, b).map(V::Owned)
        }
        BinOp::Or | BinOp::And => unreachable!("handled by short-circuit branch above"),
    }
}

fn value_pair<'v>(left: &'v V<'_>, right: &'v V<'_>) -> Result<(&'v AttrValue, &'v AttrValue)> {
    match (left.attr(), right.attr()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(CelError::Eval(format!(
            "operands must be values, found {} and {}",
            left.describe(),
            right.describe()
        ))),
    }
}

fn to_bool(value: &V<'_>, diags: &mut Vec<String>) -> Result<bool> {
    match value {
        V::Undefined => {
            diags.push("boolean operand is undefined; treated as false".to_string());
            Ok(false)
        }
        other => match other.attr() {
            Some(AttrValue::Bool(b)) => Ok(*b),
            Some(v) => Err(CelError::Eval(format!(
                "expected a boolean operand, found {}",
                v.type_name()
            ))),
            None => Err(CelError::Eval(format!(
                "expected a boolean operand, found {}",
                other.describe()
            ))),
        },
    }
}

/// Structural equality with int/double promotion on scalars
pub(crate) fn eq_values(a: &AttrValue, b: &AttrValue) -> Result<bool> {
    match (a, b) {
        (AttrValue::Int(x), AttrValue::Int(y)) => Ok(x == y),
        (AttrValue::Double(x), AttrValue::Double(y)) => Ok(x == y),
        (AttrValue::Int(x), AttrValue::Double(y)) | (AttrValue::Double(y), AttrValue::Int(x)) => {
            Ok((*x as f64) == *y)
        }
        (AttrValue::String(x), AttrValue::String(y)) => Ok(x == y),
        (AttrValue::Bool(x), AttrValue::Bool(y)) => Ok(x == y),
        (AttrValue::Timestamp(x), AttrValue::Timestamp(y)) => Ok(x == y),
        (AttrValue::List(_), AttrValue::List(_)) | (AttrValue::Map(_), AttrValue::Map(_)) => {
            Ok(a == b)
        }
        _ => Err(CelError::Eval(format!(
            "cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn cmp_values(a: &AttrValue, b: &AttrValue) -> Result<Ordering> {
    match (a, b) {
        (AttrValue::Int(x), AttrValue::Int(y)) => Ok(x.cmp(y)),
        (AttrValue::String(x), AttrValue::String(y)) => Ok(x.cmp(y)),
        (AttrValue::Timestamp(x), AttrValue::Timestamp(y)) => Ok(x.cmp(y)),
        (AttrValue::Int(_), AttrValue::Double(_))
        | (AttrValue::Double(_), AttrValue::Int(_))
        | (AttrValue::Double(_), AttrValue::Double(_)) => {
            let x = promote(a);
            let y = promote(b);
            x.partial_cmp(&y).ok_or_else(|| {
                CelError::Eval("cannot order NaN".to_string())
            })
        }
        _ => Err(CelError::Eval(format!(
            "ordering is not defined for {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn promote(value: &AttrValue) -> f64 {
    match value {
        AttrValue::Int(i) => *i as f64,
        AttrValue::Double(d) => *d,
        _ => f64::NAN,
    }
}

fn arithmetic(op: BinOp, a: &AttrValue, b: &AttrValue) -> Result<AttrValue> {
    match (a, b) {
        (AttrValue::Int(x), AttrValue::Int(y)) => {
            let result = match op {
                BinOp::Add => x.checked_add(*y),
                BinOp::Sub => x.checked_sub(*y),
                BinOp::Mul => x.checked_mul(*y),
                BinOp::Div => {
                    if *y == 0 {
                        return Err(CelError::Eval("division by zero".to_string()));
                    }
                    x.checked_div(*y)
                }
                BinOp::Mod => {
                    if *y == 0 {
                        return Err(CelError::Eval("modulo by zero".to_string()));
                    }
                    x.checked_rem(*y)
                }
                _ => unreachable!(),
            };
            result
                .map(AttrValue::Int)
                .ok_or_else(|| CelError::Eval("integer overflow".to_string()))
        }
        (AttrValue::Int(_) | AttrValue::Double(_), AttrValue::Int(_) | AttrValue::Double(_)) => {
            let x = promote(a);
            let y = promote(b);
            let result = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => {
                    if y == 0.0 {
                        return Err(CelError::Eval("division by zero".to_string()));
                    }
                    x / y
                }
                BinOp::Mod => {
                    return Err(CelError::Eval(
                        "modulo is not defined for doubles".to_string(),
                    ));
                }
                _ => unreachable!(),
            };
            Ok(AttrValue::Double(result))
        }
        _ => Err(CelError::Eval(format!(
            "arithmetic requires numbers, found {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}
