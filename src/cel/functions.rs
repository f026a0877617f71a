//! Built-in function library for condition expressions

use super::error::{CelError, Result};
use super::eval::{eq_values, V};
use crate::glob::GlobPattern;
use crate::value::AttrValue;
use chrono::{DateTime, Utc};

/// Dispatch a built-in function call
///
/// `has()` is handled by the evaluator itself (it needs lenient path
/// evaluation); everything else lands here with evaluated arguments.
pub(crate) fn call<'a>(name: &str, args: &[V<'a>], diags: &mut Vec<String>) -> Result<V<'a>> {
    match name {
        "size" => size(&args[0]),
        "startsWith" => string_test(name, args, diags, |s, p| s.starts_with(p)),
        "endsWith" => string_test(name, args, diags, |s, p| s.ends_with(p)),
        "contains" => contains(args, diags),
        "matches" => matches_glob(args, diags),
        "timestamp" => timestamp(&args[0]),
        "int" => cast_int(&args[0]),
        "double" => cast_double(&args[0]),
        other => Err(CelError::Eval(format!("unknown function '{}'", other))),
    }
}

fn size(arg: &V<'_>) -> Result<V<'static>> {
    if arg.is_undefined() {
        return Ok(V::Undefined);
    }
    let len = match arg {
        V::AttrMap(map) => map.len(),
        other => match other.attr() {
            Some(AttrValue::String(s)) => s.chars().count(),
            Some(AttrValue::List(items)) => items.len(),
            Some(AttrValue::Map(map)) => map.len(),
            Some(v) => {
                return Err(CelError::Eval(format!(
                    "size() requires a string, list, or map, found {}",
                    v.type_name()
                )));
            }
            None => return Err(CelError::Eval("size() requires a value".to_string())),
        },
    };
    Ok(V::Owned(AttrValue::Int(len as i64)))
}

fn string_test<'a>(
    name: &str,
    args: &[V<'a>],
    diags: &mut Vec<String>,
    test: impl Fn(&str, &str) -> bool,
) -> Result<V<'a>> {
    let Some((s, p)) = two_strings(name, args, diags)? else {
        return Ok(V::Owned(AttrValue::Bool(false)));
    };
    Ok(V::Owned(AttrValue::Bool(test(s, p))))
}

fn contains<'a>(args: &[V<'a>], diags: &mut Vec<String>) -> Result<V<'a>> {
    if args[0].is_undefined() || args[1].is_undefined() {
        diags.push("contains() involves an undefined attribute; treated as false".to_string());
        return Ok(V::Owned(AttrValue::Bool(false)));
    }
    let container = args[0]
        .attr()
        .ok_or_else(|| CelError::Eval("contains() requires a value".to_string()))?;
    let item = args[1]
        .attr()
        .ok_or_else(|| CelError::Eval("contains() requires a value".to_string()))?;

    let result = match container {
        AttrValue::String(s) => {
            let needle = item.as_str().ok_or_else(|| {
                CelError::Eval("contains() on a string requires a string argument".to_string())
            })?;
            s.contains(needle)
        }
        AttrValue::List(items) => items.iter().any(|entry| eq_values(item, entry).unwrap_or(false)),
        other => {
            return Err(CelError::Eval(format!(
                "contains() requires a string or list, found {}",
                other.type_name()
            )));
        }
    };
    Ok(V::Owned(AttrValue::Bool(result)))
}

fn matches_glob<'a>(args: &[V<'a>], diags: &mut Vec<String>) -> Result<V<'a>> {
    let Some((value, pattern)) = two_strings("matches", args, diags)? else {
        return Ok(V::Owned(AttrValue::Bool(false)));
    };
    let compiled = GlobPattern::compile(pattern).map_err(CelError::Eval)?;
    Ok(V::Owned(AttrValue::Bool(compiled.matches(value))))
}

fn two_strings<'v>(
    name: &str,
    args: &'v [V<'_>],
    diags: &mut Vec<String>,
) -> Result<Option<(&'v str, &'v str)>> {
    if args[0].is_undefined() || args[1].is_undefined() {
        diags.push(format!(
            "{}() involves an undefined attribute; treated as false",
            name
        ));
        return Ok(None);
    }
    let a = args[0].attr().and_then(AttrValue::as_str);
    let b = args[1].attr().and_then(AttrValue::as_str);
    match (a, b) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        _ => Err(CelError::Eval(format!("{}() requires string arguments", name))),
    }
}

fn timestamp(arg: &V<'_>) -> Result<V<'static>> {
    if arg.is_undefined() {
        return Ok(V::Undefined);
    }
    match arg.attr() {
        Some(AttrValue::Timestamp(t)) => Ok(V::Owned(AttrValue::Timestamp(*t))),
        Some(AttrValue::String(s)) => {
            let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(s)
                .map_err(|e| CelError::Eval(format!("timestamp('{}') is not RFC 3339: {}", s, e)))?
                .with_timezone(&Utc);
            Ok(V::Owned(AttrValue::Timestamp(parsed)))
        }
        Some(v) => Err(CelError::Eval(format!(
            "timestamp() requires a string, found {}",
            v.type_name()
        ))),
        None => Err(CelError::Eval("timestamp() requires a value".to_string())),
    }
}

fn cast_int(arg: &V<'_>) -> Result<V<'static>> {
    if arg.is_undefined() {
        return Ok(V::Undefined);
    }
    match arg.attr() {
        Some(AttrValue::Int(i)) => Ok(V::Owned(AttrValue::Int(*i))),
        Some(AttrValue::Double(d)) => {
            if !d.is_finite() {
                return Err(CelError::Eval("int() of a non-finite double".to_string()));
            }
            Ok(V::Owned(AttrValue::Int(d.trunc() as i64)))
        }
        Some(AttrValue::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|i| V::Owned(AttrValue::Int(i)))
            .map_err(|_| CelError::Eval(format!("int('{}') is not an integer", s))),
        Some(AttrValue::Timestamp(t)) => Ok(V::Owned(AttrValue::Int(t.timestamp()))),
        Some(v) => Err(CelError::Eval(format!("int() cannot cast {}", v.type_name()))),
        None => Err(CelError::Eval("int() requires a value".to_string())),
    }
}

fn cast_double(arg: &V<'_>) -> Result<V<'static>> {
    if arg.is_undefined() {
        return Ok(V::Undefined);
    }
    match arg.attr() {
        Some(AttrValue::Double(d)) => Ok(V::Owned(AttrValue::Double(*d))),
        Some(AttrValue::Int(i)) => Ok(V::Owned(AttrValue::Double(*i as f64))),
        Some(AttrValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|d| V::Owned(AttrValue::Double(d)))
            .map_err(|_| CelError::Eval(format!("double('{}') is not a number", s))),
        Some(v) => Err(CelError::Eval(format!(
            "double() cannot cast {}",
            v.type_name()
        ))),
        None => Err(CelError::Eval("double() requires a value".to_string())),
    }
}
