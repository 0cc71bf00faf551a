//! A small directed acyclic graph over hashable keys.
//!
//! Both planner graphs are tiny (hundreds of nodes), so the implementation
//! favors determinism over asymptotics: adjacency is kept in insertion
//! order and the topological sort is stable as long as nodes and edges are
//! inserted in a stable order.

use std::error;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;

/// Rejected edge: inserting it would have closed a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<K> {
    pub from: K,
    pub to: K,
}

impl<K: fmt::Debug> error::Error for CycleError<K> {}

impl<K: fmt::Debug> fmt::Display for CycleError<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "edge {:?} -> {:?} would close a cycle", self.from, self.to)
    }
}

#[derive(Debug, Clone)]
pub struct Dag<K, E> {
    successors: IndexMap<K, Vec<(K, E)>>,
    predecessors: IndexMap<K, Vec<K>>,
}

impl<K, E> Default for Dag<K, E> {
    fn default() -> Self {
        Self {
            successors: IndexMap::new(),
            predecessors: IndexMap::new(),
        }
    }
}

impl<K, E> Dag<K, E>
where
    K: Clone + Eq + Hash,
    E: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node; re-insertion keeps the existing adjacency.
    pub fn add_node(&mut self, key: K) {
        self.successors.entry(key.clone()).or_default();
        self.predecessors.entry(key).or_default();
    }

    pub fn contains(&self, key: &K) -> bool {
        self.successors.contains_key(key)
    }

    pub fn has_edge(&self, from: &K, to: &K) -> bool {
        self.edge_kind(from, to).is_some()
    }

    pub fn edge_kind(&self, from: &K, to: &K) -> Option<&E> {
        self.successors
            .get(from)?
            .iter()
            .find(|(key, _)| key == to)
            .map(|(_, kind)| kind)
    }

    /// Inserts an edge, creating missing endpoints. Re-inserting an existing
    /// edge is a no-op. An edge that would close a cycle (including a self
    /// loop) is refused.
    pub fn add_edge(&mut self, from: K, to: K, kind: E) -> Result<(), CycleError<K>> {
        self.add_node(from.clone());
        self.add_node(to.clone());
        if self.has_edge(&from, &to) {
            return Ok(());
        }
        if from == to || self.reaches(&to, &from) {
            return Err(CycleError { from, to });
        }
        self.successors.get_mut(&from).unwrap().push((to.clone(), kind));
        self.predecessors.get_mut(&to).unwrap().push(from);
        Ok(())
    }

    /// Depth-first search: is `goal` reachable from `start`?
    fn reaches(&self, start: &K, goal: &K) -> bool {
        let mut stack = vec![start.clone()];
        let mut seen = Vec::new();
        while let Some(key) = stack.pop() {
            if key == *goal {
                return true;
            }
            if seen.contains(&key) {
                continue;
            }
            seen.push(key.clone());
            if let Some(next) = self.successors.get(&key) {
                stack.extend(next.iter().map(|(successor, _)| successor.clone()));
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn predecessors(&self, key: &K) -> impl Iterator<Item = &K> {
        self.predecessors.get(key).into_iter().flatten()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&K, &K, &E)> {
        self.successors.iter().flat_map(|(from, next)| {
            next.iter().map(move |(to, kind)| (from, to, kind))
        })
    }

    /// Kahn's algorithm. Since every insertion is cycle-checked the order
    /// always covers all nodes, and it is stable in insertion order.
    pub fn topological_order(&self) -> Vec<K> {
        let mut indegree: IndexMap<&K, usize> = self
            .successors
            .keys()
            .map(|key| (key, self.predecessors[key].len()))
            .collect();
        let mut ready: Vec<&K> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut order = Vec::with_capacity(indegree.len());
        let mut cursor = 0;
        while cursor < ready.len() {
            let key = ready[cursor];
            cursor += 1;
            order.push(key.clone());
            for (successor, _) in self.successors[key].iter() {
                let degree = indegree.get_mut(successor).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.push(successor);
                }
            }
        }
        order
    }

    /// Connected components of the undirected closure, in insertion order.
    pub fn components(&self) -> Vec<Vec<K>> {
        let mut assigned: Vec<&K> = Vec::new();
        let mut components = Vec::new();
        for start in self.successors.keys() {
            if assigned.contains(&start) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            while let Some(key) = stack.pop() {
                if assigned.contains(&key) {
                    continue;
                }
                assigned.push(key);
                component.push(key.clone());
                stack.extend(self.successors[key].iter().map(|(successor, _)| successor));
                stack.extend(self.predecessors[key].iter());
            }
            components.push(component);
        }
        components
    }
}
