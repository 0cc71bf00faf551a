//! The target graph: every scheduled stop of every train as a node.
//!
//! Edges order the targets for the propagation sweep: sequence edges
//! between consecutive rows of one train, hand-over edges towards peer
//! trains, and dependency edges for dispatcher-set await rules. The graph
//! is rebuilt additively after every ingestion and must stay acyclic; an
//! edge that would close a cycle is refused and logged, never accepted.

use indexmap::IndexMap;
use itertools::Itertools;
use stellwerksim::clock::opt_time_to_minutes;

use crate::family::{FamilyGraph, LinkKind};
use crate::graph::Dag;
use crate::train::{RowKey, RowKind, TimetableRow, Train};

/// Node key of the target graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub kind: RowKind,
    pub zid: i32,
    pub plan_track: String,
}

impl TargetKey {
    pub fn of(row: &TimetableRow) -> Self {
        Self {
            kind: row.kind(),
            zid: row.zid,
            plan_track: row.plan_track.clone(),
        }
    }

    /// Key of a peer-train target; hand-over rows are regular holds.
    fn hold(zid: i32, plan_track: &str) -> Self {
        Self {
            kind: RowKind::Hold,
            zid,
            plan_track: plan_track.to_owned(),
        }
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} {} ({})", self.kind, self.zid, self.plan_track)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Consecutive rows of the same train.
    Sequence,
    Replace,
    Split,
    Couple,
    /// Planned movement within the same station. Declared for completeness;
    /// the rebuild does not detect these.
    Shunt,
    /// Dispatcher-set await dependency.
    AwaitDep,
    /// Dropped connection. Declared for completeness; the rebuild does not
    /// produce these.
    DropConn,
}

impl EdgeKind {
    /// Whether the predecessor's departure delay pushes into the
    /// successor's arrival estimate.
    ///
    /// Coupling partners, split-off trains and await targets arrive on
    /// their own schedule; their waiting is expressed by the correction on
    /// the row itself. Feeding their arrival from the hand-over row would
    /// couple both sides of the separation rule and the estimates would
    /// never settle.
    pub fn constrains_arrival(self) -> bool {
        matches!(self, EdgeKind::Sequence | EdgeKind::Replace | EdgeKind::Shunt)
    }
}

/// Node payload: the owning row plus the estimates of the last sweep.
#[derive(Debug, Clone)]
pub struct TargetNode {
    pub row: RowKey,
    pub planned_arrival_min: Option<i32>,
    pub planned_departure_min: Option<i32>,
    pub v_arr: i32,
    pub v_dep: i32,
}

#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    graph: Dag<TargetKey, EdgeKind>,
    nodes: IndexMap<TargetKey, TargetNode>,
    /// `(zid, plan_track)` to the rows stopping there, by node kind.
    plan_index: IndexMap<(i32, String), IndexMap<RowKind, RowKey>>,
    order: Vec<TargetKey>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the current train list into the graph. Existing nodes keep
    /// their identity; planned times and default estimates are refreshed.
    /// Family links discovered from row flags are mirrored into `families`.
    pub fn rebuild(&mut self, trains: &IndexMap<i32, Train>, families: &mut FamilyGraph) {
        for train in trains.values() {
            for row in &train.rows {
                let key = TargetKey::of(row);
                self.upsert_node(key.clone(), row, train.delay_min);
                self.plan_index
                    .entry((row.zid, row.plan_track.clone()))
                    .or_default()
                    .insert(key.kind, row.key());
            }

            for (earlier, later) in train.rows.iter().tuple_windows() {
                self.connect(
                    TargetKey::of(earlier),
                    TargetKey::of(later),
                    EdgeKind::Sequence,
                );
            }

            for row in &train.rows {
                let key = TargetKey::of(row);
                if let Some(zid) = row.replacement_zid() {
                    self.connect(
                        key.clone(),
                        TargetKey::hold(zid, &row.plan_track),
                        EdgeKind::Replace,
                    );
                    families.add_link(row.zid, zid, LinkKind::Replace, row.seq_no);
                }
                if let Some(zid) = row.coupling_zid() {
                    self.connect(
                        key.clone(),
                        TargetKey::hold(zid, &row.plan_track),
                        EdgeKind::Couple,
                    );
                    families.add_link(row.zid, zid, LinkKind::Couple, row.seq_no);
                }
                if let Some(zid) = row.split_zid() {
                    self.connect(
                        key.clone(),
                        TargetKey::hold(zid, &row.plan_track),
                        EdgeKind::Split,
                    );
                    families.add_link(row.zid, zid, LinkKind::Split, row.seq_no);
                }
                if let Some(origin) = row
                    .manual_correction
                    .as_ref()
                    .and_then(|correction| correction.origin())
                {
                    if let Some(origin_row) = trains
                        .get(&origin.zid)
                        .and_then(|peer| peer.row_by_seq(origin.seq_no))
                    {
                        self.connect(TargetKey::of(origin_row), key, EdgeKind::AwaitDep);
                    }
                }
            }
        }

        self.order = self.graph.topological_order();
    }

    fn upsert_node(&mut self, key: TargetKey, row: &TimetableRow, train_delay: i32) {
        let plan_arr = opt_time_to_minutes(row.planned_arrival);
        let plan_dep = opt_time_to_minutes(row.planned_departure).or(plan_arr);
        let plan_arr = plan_arr.or(plan_dep);

        self.graph.add_node(key.clone());
        // v_arr/v_dep are defaults only; every sweep overwrites them
        let node = self.nodes.entry(key).or_insert_with(|| TargetNode {
            row: row.key(),
            planned_arrival_min: None,
            planned_departure_min: None,
            v_arr: train_delay,
            v_dep: train_delay,
        });
        node.row = row.key();
        node.planned_arrival_min = plan_arr;
        node.planned_departure_min = plan_dep;
    }

    fn connect(&mut self, from: TargetKey, to: TargetKey, kind: EdgeKind) {
        if let Err(why) = self.graph.add_edge(from, to, kind) {
            log::error!("target graph edge refused: {why}");
        }
    }

    /// Topological order of the last rebuild.
    pub fn order(&self) -> &[TargetKey] {
        &self.order
    }

    pub fn node(&self, key: &TargetKey) -> Option<&TargetNode> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &TargetKey) -> Option<&mut TargetNode> {
        self.nodes.get_mut(key)
    }

    /// Predecessors whose departure constrains this target's arrival.
    pub fn arrival_predecessors<'a>(
        &'a self,
        key: &'a TargetKey,
    ) -> impl Iterator<Item = &'a TargetKey> {
        self.graph.predecessors(key).filter(move |predecessor| {
            self.graph
                .edge_kind(predecessor, key)
                .is_some_and(|kind| kind.constrains_arrival())
        })
    }

    pub fn edges(&self) -> impl Iterator<Item = (&TargetKey, &TargetKey, &EdgeKind)> {
        self.graph.edges()
    }

    /// Rows targeting the given track of the given train, by node kind.
    pub fn rows_at(&self, zid: i32, plan_track: &str) -> Option<&IndexMap<RowKind, RowKey>> {
        self.plan_index.get(&(zid, plan_track.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
