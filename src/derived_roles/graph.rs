//! Dependency graph over derived role definitions
//!
//! Built at policy-add time, under the store's writer lock. Kahn's
//! algorithm yields the evaluation order; a DFS reconstructs the cycle
//! path for the error message. A literal parent that names another
//! derived role is a real edge; a wildcard parent contributes an edge
//! to every other known derived role its pattern matches (conservative
//! over-approximation).

use super::types::CompiledDerivedRole;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

/// Graph construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A dependency cycle between derived roles
    #[error("cyclic derived role: {0}")]
    CircularDependency(String),

    /// Two definitions share a name
    #[error("duplicate derived role: {0}")]
    DuplicateRole(String),
}

/// Register a definition into a candidate set, rejecting name collisions
pub(crate) fn register(
    defs: &mut BTreeMap<String, Arc<CompiledDerivedRole>>,
    def: Arc<CompiledDerivedRole>,
) -> Result<(), GraphError> {
    if defs.contains_key(&def.def.name) {
        return Err(GraphError::DuplicateRole(def.def.name.clone()));
    }
    defs.insert(def.def.name.clone(), def);
    Ok(())
}

/// Compute a dependency-respecting evaluation order
///
/// Definitions with no derived-role parents come first; every
/// definition appears after all definitions that can feed its parent
/// set. Ties break on name so the order is deterministic.
pub(crate) fn evaluation_order(
    defs: &BTreeMap<String, Arc<CompiledDerivedRole>>,
) -> Result<Vec<Arc<CompiledDerivedRole>>, GraphError> {
    if defs.is_empty() {
        return Ok(Vec::new());
    }

    // dependencies[name] = derived roles that must be evaluated first
    let mut dependencies: HashMap<&str, Vec<&str>> = HashMap::with_capacity(defs.len());
    for (name, def) in defs {
        let mut deps: Vec<&str> = Vec::new();
        for parent in &def.parents {
            match parent.as_literal() {
                Some(literal) => {
                    if let Some((dep, _)) = defs.get_key_value(literal) {
                        push_unique(&mut deps, dep);
                    }
                }
                None => {
                    for candidate in defs.keys() {
                        if candidate != name && parent.matches(candidate) {
                            push_unique(&mut deps, candidate);
                        }
                    }
                }
            }
        }
        dependencies.insert(name, deps);
    }

    // Kahn's algorithm over reverse edges
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for name in defs.keys() {
        in_degree.insert(name, 0);
    }
    for (name, deps) in &dependencies {
        for dep in deps {
            dependents.entry(dep).or_default().push(name);
            *in_degree.get_mut(name).expect("all nodes registered") += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(defs.len());
    while let Some(current) = queue.pop_front() {
        order.push(defs[current].clone());
        if let Some(deps) = dependents.get(current) {
            let mut unlocked: Vec<&str> = Vec::new();
            for dependent in deps {
                let degree = in_degree.get_mut(dependent).expect("all nodes registered");
                *degree -= 1;
                if *degree == 0 {
                    unlocked.push(dependent);
                }
            }
            unlocked.sort_unstable();
            queue.extend(unlocked);
        }
    }

    if order.len() != defs.len() {
        let cycle = find_cycle(&dependencies)
            .unwrap_or_else(|| "unresolved dependency cycle".to_string());
        return Err(GraphError::CircularDependency(cycle));
    }

    Ok(order)
}

fn push_unique<'a>(deps: &mut Vec<&'a str>, dep: &'a str) {
    if !deps.contains(&dep) {
        deps.push(dep);
    }
}

/// DFS with white/gray/black coloring to reconstruct one cycle path
fn find_cycle(dependencies: &HashMap<&str, Vec<&str>>) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn visit<'a>(
        node: &'a str,
        dependencies: &HashMap<&'a str, Vec<&'a str>>,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> Option<String> {
        colors.insert(node, Color::Gray);
        stack.push(node);

        if let Some(deps) = dependencies.get(node) {
            for dep in deps {
                match colors.get(dep).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                        let mut path: Vec<&str> = stack[start..].to_vec();
                        path.push(dep);
                        return Some(path.join(" -> "));
                    }
                    Color::White => {
                        if let Some(cycle) = visit(dep, dependencies, colors, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        colors.insert(node, Color::Black);
        None
    }

    let mut colors: HashMap<&str, Color> = HashMap::new();
    let mut nodes: Vec<&str> = dependencies.keys().copied().collect();
    nodes.sort_unstable();

    for node in nodes {
        if colors.get(node).copied().unwrap_or(Color::White) == Color::White {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(node, dependencies, &mut colors, &mut stack) {
                return Some(cycle);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived_roles::types::DerivedRoleDef;
    use crate::glob::GlobPattern;

    fn compiled(name: &str, parents: Vec<&str>) -> Arc<CompiledDerivedRole> {
        let def = DerivedRoleDef::new(name, parents.clone());
        Arc::new(CompiledDerivedRole {
            def,
            parents: parents
                .iter()
                .map(|p| GlobPattern::compile(p).unwrap())
                .collect(),
            condition: None,
        })
    }

    fn defs(list: Vec<Arc<CompiledDerivedRole>>) -> BTreeMap<String, Arc<CompiledDerivedRole>> {
        list.into_iter().map(|d| (d.def.name.clone(), d)).collect()
    }

    #[test]
    fn test_chain_ordering() {
        let map = defs(vec![
            compiled("senior_manager", vec!["manager"]),
            compiled("manager", vec!["employee"]),
        ]);

        let order = evaluation_order(&map).unwrap();
        let names: Vec<&str> = order.iter().map(|d| d.def.name.as_str()).collect();
        assert_eq!(names, vec!["manager", "senior_manager"]);
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let map = defs(vec![
            compiled("role_a", vec!["role_b"]),
            compiled("role_b", vec!["role_a"]),
        ]);

        let err = evaluation_order(&map).unwrap_err();
        let GraphError::CircularDependency(path) = err else {
            panic!("expected a cycle");
        };
        assert!(path.contains("role_a"));
        assert!(path.contains("role_b"));
    }

    #[test]
    fn test_wildcard_contributes_conservative_edges() {
        // power_user depends (conservatively) on admin_backup because
        // "admin:*" could match it
        let map = defs(vec![
            compiled("power_user", vec!["admin:*"]),
            compiled("admin:backup", vec!["operator"]),
        ]);

        let order = evaluation_order(&map).unwrap();
        let names: Vec<&str> = order.iter().map(|d| d.def.name.as_str()).collect();
        assert_eq!(names, vec!["admin:backup", "power_user"]);
    }

    #[test]
    fn test_wildcard_cycle_rejected() {
        let map = defs(vec![
            compiled("alpha", vec!["*"]),
            compiled("beta", vec!["*"]),
        ]);

        assert!(matches!(
            evaluation_order(&map),
            Err(GraphError::CircularDependency(_))
        ));
    }

    #[test]
    fn test_bare_wildcard_alone_is_fine() {
        let map = defs(vec![compiled("document_owner", vec!["*"])]);
        let order = evaluation_order(&map).unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn test_deterministic_order() {
        let map = defs(vec![
            compiled("c", vec!["base"]),
            compiled("a", vec!["base"]),
            compiled("b", vec!["base"]),
        ]);

        let order = evaluation_order(&map).unwrap();
        let names: Vec<&str> = order.iter().map(|d| d.def.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
