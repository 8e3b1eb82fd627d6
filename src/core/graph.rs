//! Dependency graph index for a sheet
//!
//! Two mirrored adjacency maps: `dependents` (cell -> cells that reference it)
//! and `dependees` (cell -> cells it references). Every edge lives in both
//! maps or in neither, and empty sets are pruned.

use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    dependents: HashMap<String, HashSet<String>>,
    dependees: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` references `dependee`.
    pub fn add_edge(&mut self, dependee: &str, dependent: &str) {
        self.dependents
            .entry(dependee.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.dependees
            .entry(dependent.to_string())
            .or_default()
            .insert(dependee.to_string());
    }

    pub fn remove_edge(&mut self, dependee: &str, dependent: &str) {
        prune_remove(&mut self.dependents, dependee, dependent);
        prune_remove(&mut self.dependees, dependent, dependee);
    }

    /// Would making `cell` depend on `dependee` close a cycle?
    ///
    /// True when `dependee` already depends on `cell`, directly or
    /// transitively, i.e. when `dependee` is reachable from `cell` following
    /// dependents. Every reachable node is explored once.
    pub fn would_create_cycle(&self, dependee: &str, cell: &str) -> bool {
        if dependee == cell {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![cell];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(next) = self.dependents.get(current) else {
                continue;
            };
            for dependent in next {
                if dependent == dependee {
                    return true;
                }
                if !visited.contains(dependent.as_str()) {
                    stack.push(dependent);
                }
            }
        }

        false
    }

    /// Is at least one other cell referencing `cell`?
    pub fn has_dependents(&self, cell: &str) -> bool {
        self.dependents.contains_key(cell)
    }

    /// Cells that reference `cell`, sorted.
    pub fn dependents_of(&self, cell: &str) -> Vec<&str> {
        sorted(self.dependents.get(cell))
    }

    /// Cells that `cell` references, sorted.
    pub fn dependees_of(&self, cell: &str) -> Vec<&str> {
        sorted(self.dependees.get(cell))
    }

    pub fn edge_count(&self) -> usize {
        self.dependents.values().map(HashSet::len).sum()
    }

    /// Both maps describe the same edge set and hold no empty sets.
    pub fn is_consistent(&self) -> bool {
        let mirrored = |from: &HashMap<String, HashSet<String>>,
                        to: &HashMap<String, HashSet<String>>| {
            from.iter().all(|(node, targets)| {
                !targets.is_empty()
                    && targets
                        .iter()
                        .all(|target| to.get(target).is_some_and(|back| back.contains(node)))
            })
        };
        mirrored(&self.dependents, &self.dependees) && mirrored(&self.dependees, &self.dependents)
    }

    /// Full acyclicity audit over every edge.
    pub fn is_acyclic(&self) -> bool {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (dependee, dependents) in &self.dependents {
            for dependent in dependents {
                graph.add_edge(dependee.as_str(), dependent.as_str(), ());
            }
        }
        !is_cyclic_directed(&graph)
    }
}

fn prune_remove(map: &mut HashMap<String, HashSet<String>>, key: &str, value: &str) {
    if let Some(set) = map.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

fn sorted(set: Option<&HashSet<String>>) -> Vec<&str> {
    let mut names: Vec<&str> = set
        .map(|set| set.iter().map(String::as_str).collect())
        .unwrap_or_default();
    names.sort_unstable();
    names
}
