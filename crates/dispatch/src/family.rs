//! The train-family graph.
//!
//! Trains are nodes; a directed edge points from a train to the train it
//! turns into (replacement), couples onto, or splits off. The undirected
//! closure groups trains into families, and the topological order
//! guarantees that follow-up trains are processed after their parents.

use schemars::JsonSchema;
use serde::Serialize;

use crate::graph::Dag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    Replace,
    Couple,
    Split,
}

/// Edge payload: what kind of hand-over, and at which row of the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub kind: LinkKind,
    pub at_seq_no: i32,
}

#[derive(Debug, Clone, Default)]
pub struct FamilyGraph {
    graph: Dag<i32, Link>,
}

impl FamilyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_train(&mut self, zid: i32) {
        self.graph.add_node(zid);
    }

    pub fn contains(&self, zid: i32) -> bool {
        self.graph.contains(&zid)
    }

    /// Links `parent` to `child`. A link that would close a cycle is
    /// refused and logged; the graph stays acyclic.
    pub fn add_link(&mut self, parent: i32, child: i32, kind: LinkKind, at_seq_no: i32) -> bool {
        match self.graph.add_edge(parent, child, Link { kind, at_seq_no }) {
            Ok(()) => true,
            Err(why) => {
                log::error!("train link refused: {why}");
                false
            }
        }
    }

    /// All trains reachable from `zid` through links in either direction,
    /// `zid` itself included. Empty if the train is unknown.
    pub fn family_of(&self, zid: i32) -> Vec<i32> {
        self.graph
            .components()
            .into_iter()
            .find(|component| component.contains(&zid))
            .unwrap_or_default()
    }

    /// Stable topological order over all trains; parents before follow-ups.
    pub fn topological_order(&self) -> Vec<i32> {
        self.graph.topological_order()
    }

    pub fn links(&self) -> impl Iterator<Item = (i32, i32, &Link)> {
        self.graph.edges().map(|(from, to, link)| (*from, *to, link))
    }
}
