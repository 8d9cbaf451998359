//! Dependency graph engine: cycle detection and activation checks.
//!
//! Everything here is pure and works on a [`GraphSnapshot`] taken from the
//! store. The snapshot treats each flag as a node and each dependency as a
//! directed edge (flag → dependency). Mutating code re-reads the store and
//! rebuilds the snapshot under its write lock; the cache is never an input.

use std::collections::{HashMap, HashSet};

use crate::models::Flag;

struct Node {
    enabled: bool,
    dependencies: Vec<String>,
}

/// A point-in-time view of every flag's dependency list and enabled state.
pub struct GraphSnapshot {
    nodes: HashMap<String, Node>,
}

impl GraphSnapshot {
    pub fn new(flags: &[Flag]) -> Self {
        let nodes = flags
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    Node {
                        enabled: f.enabled,
                        dependencies: f.dependencies.clone(),
                    },
                )
            })
            .collect();
        Self { nodes }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Would replacing `candidate`'s dependency list with `proposed`
    /// introduce a directed cycle?
    ///
    /// Iterative three-color DFS with an explicit stack: nodes currently on
    /// the traversal path live in `on_stack`, fully explored nodes in `done`.
    /// Revisiting a stack member is a cycle; `done` nodes are never
    /// re-descended, so shared subgraphs are walked once. A flag listing
    /// itself is a 1-node cycle. Names with no existing flag have no outgoing
    /// edges and are not themselves cycles (existence is a separate check).
    pub fn would_create_cycle(&self, candidate: &str, proposed: &[String]) -> bool {
        let deps_of = |name: &str| -> &[String] {
            if name == candidate {
                proposed
            } else {
                self.nodes
                    .get(name)
                    .map(|n| n.dependencies.as_slice())
                    .unwrap_or(&[])
            }
        };

        let mut done: HashSet<&str> = HashSet::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        // Frames carry the index of the next dependency to explore.
        let mut stack: Vec<(&str, usize)> = vec![(candidate, 0)];
        on_stack.insert(candidate);

        loop {
            let Some(&(node, idx)) = stack.last() else {
                break;
            };
            let deps = deps_of(node);
            if idx < deps.len() {
                stack.last_mut().expect("frame just read").1 += 1;
                let dep = deps[idx].as_str();
                if on_stack.contains(dep) {
                    return true;
                }
                if !done.contains(dep) {
                    on_stack.insert(dep);
                    stack.push((dep, 0));
                }
            } else {
                stack.pop();
                on_stack.remove(node);
                done.insert(node);
            }
        }
        false
    }

    /// Every entry in `proposed` that does not name an existing flag, in
    /// declared order. Callers surface the whole list at once.
    pub fn unresolved_dependencies(&self, proposed: &[String]) -> Vec<String> {
        proposed
            .iter()
            .filter(|dep| !self.nodes.contains_key(dep.as_str()))
            .cloned()
            .collect()
    }

    /// Every entry of `deps` that is missing or currently disabled, in
    /// declared order. Gates activation: a non-empty result blocks enabling.
    pub fn inactive_dependencies(&self, deps: &[String]) -> Vec<String> {
        deps.iter()
            .filter(|dep| !matches!(self.nodes.get(dep.as_str()), Some(n) if n.enabled))
            .cloned()
            .collect()
    }
}
