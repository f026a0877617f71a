//! Scope tree: a trie over dotted scope segments
//!
//! Resource scopes are dotted paths (`acme.eu.sales`); the empty string
//! is the root. Policies attach at a scope *pattern*, where `*` matches
//! exactly one segment and a trailing `**` matches zero or more. A
//! policy attached at a scope applies to that scope and everything
//! below it, so a lookup for `a.b.c` yields attachments at `a.b.c`,
//! `a.b`, `a`, and the root, in descending-specificity order.

use std::collections::HashMap;

/// Split a dotted scope into segments; the empty scope has none
pub fn segments(scope: &str) -> impl Iterator<Item = &str> {
    scope.split('.').filter(|s| !s.is_empty())
}

/// Validate a scope pattern
///
/// Segments must be non-empty; `*` must be a standalone segment; `**`
/// may only appear as the final segment. The empty pattern is the root.
pub fn validate_scope_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Ok(());
    }

    let parts: Vec<&str> = pattern.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            return Err(format!("scope pattern '{}' has an empty segment", pattern));
        }
        if part.contains('*') && *part != "*" && *part != "**" {
            return Err(format!(
                "scope pattern '{}': wildcards must be standalone segments",
                pattern
            ));
        }
        if *part == "**" && idx != parts.len() - 1 {
            return Err(format!(
                "scope pattern '{}': '**' may only appear at the end",
                pattern
            ));
        }
    }

    Ok(())
}

/// Check whether a scope pattern covers a concrete scope
///
/// Coverage is prefix-inclusive: the pattern's segments must match a
/// leading portion of the scope. A trailing `**` consumes any
/// remainder, and is equivalent to attaching at its prefix.
pub fn scope_pattern_matches(pattern: &str, scope: &str) -> bool {
    let pattern_parts: Vec<&str> = segments(pattern).collect();
    let scope_parts: Vec<&str> = segments(scope).collect();

    let concrete: &[&str] = match pattern_parts.last() {
        Some(&"**") => &pattern_parts[..pattern_parts.len() - 1],
        _ => &pattern_parts,
    };

    if concrete.len() > scope_parts.len() {
        return false;
    }

    concrete
        .iter()
        .zip(scope_parts.iter())
        .all(|(p, s)| *p == "*" || p == s)
}

/// A trie of policy attachments over scope segments
#[derive(Debug)]
pub(crate) struct ScopeTree<T> {
    root: Node<T>,
    len: usize,
}

#[derive(Debug)]
struct Node<T> {
    children: HashMap<String, Node<T>>,
    /// `*` branch, walked alongside literal children
    star: Option<Box<Node<T>>>,
    entries: Vec<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            star: None,
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> ScopeTree<T> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }

    /// Attach a value at a scope pattern
    ///
    /// The pattern must already be validated. A trailing `**` attaches
    /// at its concrete prefix (attachment semantics are descendants-
    /// inclusive either way).
    pub fn insert(&mut self, pattern: &str, value: T) {
        let mut node = &mut self.root;
        for segment in segments(pattern) {
            if segment == "**" {
                break;
            }
            node = if segment == "*" {
                &mut **node.star.get_or_insert_with(Box::default)
            } else {
                node.children.entry(segment.to_string()).or_default()
            };
        }
        node.entries.push(value);
        self.len += 1;
    }

    /// Remove every attachment the predicate rejects
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let removed = retain_node(&mut self.root, &mut keep);
        self.len -= removed;
    }

    /// Collect attachments covering `scope`, with their specificity
    ///
    /// Specificity is the number of scope segments the attachment
    /// point matched; the root is 0. The caller owns ordering.
    pub fn lookup(&self, scope: &str) -> Vec<(T, usize)> {
        let mut results = Vec::new();
        let mut frontier: Vec<&Node<T>> = vec![&self.root];

        for node in &frontier {
            for entry in &node.entries {
                results.push((entry.clone(), 0));
            }
        }

        for (depth, segment) in segments(scope).enumerate() {
            let mut next: Vec<&Node<T>> = Vec::with_capacity(frontier.len());
            for node in &frontier {
                if let Some(child) = node.children.get(segment) {
                    next.push(child);
                }
                if let Some(star) = &node.star {
                    next.push(star);
                }
            }
            for node in &next {
                for entry in &node.entries {
                    results.push((entry.clone(), depth + 1));
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        results
    }

    /// Total number of attachments
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn retain_node<T>(node: &mut Node<T>, keep: &mut impl FnMut(&T) -> bool) -> usize {
    let before = node.entries.len();
    node.entries.retain(|entry| keep(entry));
    let mut removed = before - node.entries.len();

    for child in node.children.values_mut() {
        removed += retain_node(child, keep);
    }
    if let Some(star) = &mut node.star {
        removed += retain_node(star, keep);
    }

    node.children
        .retain(|_, child| !child.entries.is_empty() || !child.children.is_empty() || child.star.is_some());
    let prune_star = node
        .star
        .as_ref()
        .map(|star| star.entries.is_empty() && star.children.is_empty() && star.star.is_none())
        .unwrap_or(false);
    if prune_star {
        node.star = None;
    }

    removed
}
