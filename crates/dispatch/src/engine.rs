//! The planner: train list, graphs, ingestion and the propagation sweep.

use indexmap::IndexMap;
use stellwerksim::clock::{seconds_to_time, time_to_seconds};
use stellwerksim::estimate::TravelTimeEstimator;
use stellwerksim::flags;
use stellwerksim::model::TrainSnapshot;

use crate::correction::Correction;
use crate::family::FamilyGraph;
use crate::targets::TargetGraph;
use crate::train::{RowKey, Train};

/// Upper bound on propagation sweeps per [`Planner::propagate_all`] call.
/// Peer corrections normally settle after the second sweep.
const MAX_SWEEPS: usize = 8;

/// Plans and continuously re-dispatches the trains of one signal box.
///
/// The planner keeps every train it has ever seen; trains are never
/// removed, only marked as departed. All mutation happens through
/// [`Planner::ingest`], [`Planner::apply_event`] and the dispatcher
/// override API; consumers read the published state in between.
///
/// [`Planner::apply_event`]: crate::events
#[derive(Debug, Default)]
pub struct Planner {
    trains: IndexMap<i32, Train>,
    families: FamilyGraph,
    targets: TargetGraph,
    /// Topological order of the family graph, parents first.
    train_order: Vec<i32>,
    sim_clock_min: i32,
    /// Trains queued for another sweep by peer corrections.
    repropagate: Vec<i32>,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sim_clock_min(&self) -> i32 {
        self.sim_clock_min
    }

    /// Updates the simulator clock, minutes since midnight. Written only
    /// from the snapshot path; the entry-time rule reads it.
    pub fn set_sim_clock(&mut self, minutes: i32) {
        if minutes < self.sim_clock_min {
            log::warn!(
                "simulator clock moved backwards: {} -> {}",
                self.sim_clock_min,
                minutes
            );
        }
        self.sim_clock_min = minutes;
    }

    pub fn train(&self, zid: i32) -> Option<&Train> {
        self.trains.get(&zid)
    }

    pub(crate) fn train_mut(&mut self, zid: i32) -> Option<&mut Train> {
        self.trains.get_mut(&zid)
    }

    /// All known trains in family order: parents before follow-up trains.
    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.train_order
            .iter()
            .filter_map(|zid| self.trains.get(zid))
    }

    pub fn families(&self) -> &FamilyGraph {
        &self.families
    }

    pub fn targets(&self) -> &TargetGraph {
        &self.targets
    }

    pub(crate) fn row(&self, key: &RowKey) -> Option<&crate::train::TimetableRow> {
        self.trains.get(&key.zid)?.row_by_seq(key.seq_no)
    }

    pub(crate) fn row_mut(&mut self, key: &RowKey) -> Option<&mut crate::train::TimetableRow> {
        self.trains.get_mut(&key.zid)?.row_by_seq_mut(key.seq_no)
    }

    pub(crate) fn request_propagation(&mut self, zid: i32) {
        if !self.repropagate.contains(&zid) {
            self.repropagate.push(zid);
        }
    }

    /// Merges a fresh roster snapshot into the planner.
    ///
    /// New trains are hydrated, known trains get their volatile fields
    /// updated, and trains that disappeared from the roster are marked as
    /// departed from the controlled area. Afterwards the target graph is
    /// rebuilt, peer references are resolved, the family order is
    /// recomputed and corrections are (re)defined.
    pub fn ingest(&mut self, snapshots: &[TrainSnapshot]) {
        let mut missing: Vec<i32> = self.trains.keys().copied().collect();

        for snapshot in snapshots {
            missing.retain(|zid| *zid != snapshot.zid);
            match self.trains.get_mut(&snapshot.zid) {
                Some(train) => train.update_from_snapshot(snapshot),
                None => {
                    let train = Train::from_snapshot(snapshot);
                    self.families.add_train(train.zid);
                    self.trains.insert(train.zid, train);
                }
            }
        }

        for zid in missing {
            let Some(train) = self.trains.get_mut(&zid) else { continue };
            if train.visible {
                log::info!("train {} left the controlled area", train.name);
                train.visible = false;
                train.at_platform = false;
                train.current_track.clear();
                train.plan_track.clear();
                train.departed_system = true;
                for row in &mut train.rows {
                    row.departed_at.mark();
                }
            }
        }

        self.targets.rebuild(&self.trains, &mut self.families);
        self.resolve_peers();
        self.train_order = self.families.topological_order();
        self.define_corrections();
    }

    /// A train's peers are resolved when every train referenced by its row
    /// flags is known to the planner.
    fn resolve_peers(&mut self) {
        let known: Vec<i32> = self.trains.keys().copied().collect();
        for train in self.trains.values_mut() {
            train.peers_resolved = train
                .rows
                .iter()
                .flat_map(|row| row.peer_zids())
                .all(|zid| known.contains(&zid));
        }
    }

    /// Attaches automatic corrections and minimum dwell times to every row
    /// of every train that is not fully defined yet. Trains whose peer
    /// links could not all be wired are retried on the next ingestion.
    pub fn define_corrections(&mut self) {
        let order = self.train_order.clone();
        for zid in order {
            let Some(train) = self.trains.get(&zid) else { continue };
            if train.corrections_defined {
                continue;
            }
            let peers_resolved = train.peers_resolved;
            let row_count = train.rows.len();
            let mut all_wired = true;
            for index in 0..row_count {
                all_wired &= self.define_row_correction(zid, index);
            }
            if let Some(train) = self.trains.get_mut(&zid) {
                train.corrections_defined = peers_resolved && all_wired;
            }
        }
    }

    /// Returns false when a peer link implied by the row could not be
    /// wired yet.
    fn define_row_correction(&mut self, zid: i32, index: usize) -> bool {
        let Some(row) = self.trains.get(&zid).and_then(|t| t.rows.get(index)) else {
            return true;
        };
        let key = row.key();
        let is_entry = row.is_entry;
        let is_exit = row.is_exit;
        let pass_through = row.pass_through();
        let replacement = row.replacement_zid();
        let coupling = row.coupling_zid();
        let split = row.split_zid();
        let reversal = flags::direction_reversal(&row.flags);
        let loco_move = flags::loco_move(&row.flags);
        let loco_change = flags::loco_change(&row.flags);
        let has_auto = row.auto_correction.is_some();
        let plan_track = row.plan_track.clone();

        {
            let row = &mut self.trains.get_mut(&zid).unwrap().rows[index];
            if reversal {
                row.min_dwell_min = 2;
            } else if loco_move {
                row.min_dwell_min = 2;
            } else if loco_change {
                row.min_dwell_min = 5;
            }
        }

        let mut wired = true;
        if is_entry {
            self.set_auto(zid, index, Correction::EntryTime);
        } else if is_exit || pass_through {
            // nothing to correct, the delay passes through
        } else if let Some(peer) = replacement {
            self.set_auto(zid, index, Correction::Replacement);
            self.raise_min_dwell(zid, index, 1);
            wired = self.wire_first_row(
                peer,
                Correction::AwaitArrival { origin: key, wait_min: 0 },
            );
        } else if let Some(peer) = coupling {
            self.set_auto(zid, index, Correction::Coupling);
            self.raise_min_dwell(zid, index, 1);
            wired = self.wire_partner_row(
                peer,
                &plan_track,
                Correction::AwaitArrival { origin: key, wait_min: 0 },
            );
        } else if let Some(peer) = split {
            self.set_auto(zid, index, Correction::Split);
            self.raise_min_dwell(zid, index, 1);
            wired = self.wire_first_row(
                peer,
                Correction::AwaitDeparture { origin: key, wait_min: 2 },
            );
        } else if !has_auto {
            self.set_auto(zid, index, Correction::ScheduledDeparture);
        }
        wired
    }

    fn set_auto(&mut self, zid: i32, index: usize, correction: Correction) {
        if let Some(row) = self.trains.get_mut(&zid).and_then(|t| t.rows.get_mut(index)) {
            row.auto_correction = Some(correction);
        }
    }

    fn raise_min_dwell(&mut self, zid: i32, index: usize, minutes: i32) {
        if let Some(row) = self.trains.get_mut(&zid).and_then(|t| t.rows.get_mut(index)) {
            row.min_dwell_min = row.min_dwell_min.max(minutes);
        }
    }

    /// Hand-over trains wait for their parent at their first row.
    fn wire_first_row(&mut self, zid: i32, correction: Correction) -> bool {
        match self.trains.get_mut(&zid).and_then(|t| t.rows.first_mut()) {
            Some(row) => {
                row.auto_correction = Some(correction);
                true
            }
            None => false,
        }
    }

    /// The coupling partner waits at the shared track.
    fn wire_partner_row(&mut self, zid: i32, plan_track: &str, correction: Correction) -> bool {
        match self
            .trains
            .get_mut(&zid)
            .and_then(|t| t.row_by_plan_mut(plan_track))
        {
            Some(row) => {
                row.auto_correction = Some(correction);
                true
            }
            None => false,
        }
    }

    /// Recomputes all delay estimates.
    ///
    /// One sweep walks the target graph in topological order: the arrival
    /// delay of a row that has not arrived is the maximum over the
    /// departure delays of its predecessors (the train-level delay is
    /// included for entries, the current target and rows without
    /// predecessors); the departure delay is then derived by the row's
    /// correction rule. Peer corrections may queue further sweeps; the
    /// loop stops once nothing changes, so repeated calls are idempotent.
    pub fn propagate_all(&mut self) {
        for _ in 0..MAX_SWEEPS {
            self.repropagate.clear();
            let changed = self.sweep();
            if self.repropagate.is_empty() || !changed {
                return;
            }
        }
        log::warn!("delay propagation did not settle after {MAX_SWEEPS} sweeps");
    }

    /// Recomputes the delay estimates of one train's family.
    ///
    /// Currently equivalent to [`Planner::propagate_all`]: partitioning
    /// the sweep would require per-family bookkeeping that has not been
    /// worth its cost so far.
    pub fn propagate_train(&mut self, _zid: i32) {
        self.propagate_all();
    }

    fn sweep(&mut self) -> bool {
        let order = self.targets.order().to_vec();
        let mut changed = false;

        for key in order {
            // edge endpoints without a backing row (e.g. links to trains
            // that never materialized) carry no estimates
            let Some(node) = self.targets.node(&key) else { continue };
            let row_key = node.row.clone();
            let Some(row) = self.row(&row_key) else { continue };
            let Some(train) = self.train(row_key.zid) else { continue };

            let before = (row.arrival_delay_min, row.departure_delay_min);
            let arrived = row.arrived_at.is_set();
            let departed = row.departed_at.is_set();
            let is_entry = row.is_entry;
            let is_current = train.plan_track == row.plan_track;
            let train_delay = train.delay_min;

            let v_arr = if arrived {
                row.arrival_delay_min
            } else {
                let mut candidates: Vec<i32> = self
                    .targets
                    .arrival_predecessors(&key)
                    .filter_map(|predecessor| self.targets.node(predecessor))
                    .map(|node| node.v_dep)
                    .collect();
                if is_entry || is_current || candidates.is_empty() {
                    candidates.push(train_delay);
                }
                let v_arr = candidates.into_iter().max().unwrap();
                if let Some(row) = self.row_mut(&row_key) {
                    row.arrival_delay_min = v_arr;
                }
                v_arr
            };
            if let Some(node) = self.targets.node_mut(&key) {
                node.v_arr = v_arr;
            }

            if !departed {
                self.apply_correction(&row_key);
            }

            let Some(row) = self.row(&row_key) else { continue };
            let after = (row.arrival_delay_min, row.departure_delay_min);
            let v_dep = row.departure_delay_min;
            if let Some(node) = self.targets.node_mut(&key) {
                node.v_dep = v_dep;
            }
            changed |= after != before;
        }

        changed
    }

    /// Sets or clears the dispatcher correction of a row.
    ///
    /// Setting a correction clears every manual correction on later rows
    /// of the same train; new manual intent invalidates downstream manual
    /// intent. Clearing does not cascade.
    pub fn set_manual_correction(&mut self, key: &RowKey, correction: Option<Correction>) {
        let Some(train) = self.trains.get_mut(&key.zid) else {
            log::warn!("manual correction for unknown train {}", key.zid);
            return;
        };
        let Some(index) = train.rows.iter().position(|row| row.seq_no == key.seq_no) else {
            log::warn!("manual correction for unknown row {key}");
            return;
        };
        let clear_later = correction.is_some();
        train.rows[index].manual_correction = correction;
        if clear_later {
            for row in &mut train.rows[index + 1..] {
                row.manual_correction = None;
            }
        }
    }

    /// Estimates the planned times of synthetic entry and exit rows from
    /// the neighbouring scheduled stop and the travel-time oracle. Rows
    /// keep their copied times when the oracle has no estimate (NaN).
    pub fn fill_boundary_times(&mut self, estimator: &dyn TravelTimeEstimator) {
        for train in self.trains.values_mut() {
            if train.rows.len() < 2 {
                continue;
            }
            let name = train.name.clone();

            let next_arrival = train.rows[1].planned_arrival;
            let next_track = train.rows[1].actual_track.clone();
            let entry = &mut train.rows[0];
            if entry.is_entry && !entry.actual_track.is_empty() && !next_track.is_empty() {
                let seconds =
                    estimator.estimate_seconds(&name, &entry.actual_track, &next_track);
                if !seconds.is_nan() {
                    if let Some(arrival) = next_arrival {
                        let estimated =
                            seconds_to_time(time_to_seconds(arrival) - seconds as i32);
                        entry.planned_arrival = Some(estimated);
                        entry.planned_departure = Some(estimated);
                        log::debug!(
                            "entry {} - {} estimated at {}",
                            entry.actual_track,
                            next_track,
                            estimated
                        );
                    }
                }
            }

            let last = train.rows.len() - 1;
            let previous_departure = train.rows[last - 1].planned_departure;
            let previous_track = train.rows[last - 1].actual_track.clone();
            let exit = &mut train.rows[last];
            if exit.is_exit && !previous_track.is_empty() && !exit.actual_track.is_empty() {
                let seconds =
                    estimator.estimate_seconds(&name, &previous_track, &exit.actual_track);
                if !seconds.is_nan() {
                    if let Some(departure) = previous_departure {
                        let estimated =
                            seconds_to_time(time_to_seconds(departure) + seconds as i32);
                        exit.planned_arrival = Some(estimated);
                        exit.planned_departure = Some(estimated);
                        log::debug!(
                            "exit {} - {} estimated at {}",
                            previous_track,
                            exit.actual_track,
                            estimated
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::Correction;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;
    use stellwerksim::model::RowSnapshot;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn snapshot(zid: i32, rows: Vec<RowSnapshot>) -> TrainSnapshot {
        TrainSnapshot {
            zid,
            name: format!("RB {zid}"),
            origin: "Aussen".to_owned(),
            destination: "Weiter".to_owned(),
            timetable: rows,
            ..TrainSnapshot::default()
        }
    }

    #[test]
    fn corrections_stay_incomplete_until_the_peer_shows_up() {
        let mut planner = Planner::new();
        planner.ingest(&[snapshot(
            1,
            vec![RowSnapshot {
                flags: "E(2)".to_owned(),
                ..RowSnapshot::new("3", Some(hm(10, 0)), Some(hm(10, 5)))
            }],
        )]);
        assert!(!planner.train(1).unwrap().corrections_defined);

        // the replacement train appears in the next snapshot, starting
        // where its parent ends
        let mut replacement = snapshot(
            2,
            vec![RowSnapshot::new("3", Some(hm(10, 10)), Some(hm(10, 12)))],
        );
        replacement.origin = "Gleis 3".to_owned();
        planner.ingest(&[
            snapshot(
                1,
                vec![RowSnapshot {
                    flags: "E(2)".to_owned(),
                    ..RowSnapshot::new("3", Some(hm(10, 0)), Some(hm(10, 5)))
                }],
            ),
            replacement,
        ]);
        let parent = planner.train(1).unwrap();
        assert!(parent.corrections_defined);
        let peer_first = &planner.train(2).unwrap().rows[0];
        assert!(matches!(
            peer_first.auto_correction,
            Some(Correction::AwaitArrival { .. })
        ));
    }

    #[test]
    fn dwell_policy_follows_the_row_flags() {
        let mut planner = Planner::new();
        planner.ingest(&[snapshot(
            5,
            vec![
                RowSnapshot {
                    flags: "R".to_owned(),
                    ..RowSnapshot::new("1", Some(hm(9, 0)), Some(hm(9, 5)))
                },
                RowSnapshot {
                    flags: "L".to_owned(),
                    ..RowSnapshot::new("2", Some(hm(9, 10)), Some(hm(9, 15)))
                },
                RowSnapshot {
                    flags: "W[2][4]".to_owned(),
                    ..RowSnapshot::new("3", Some(hm(9, 20)), Some(hm(9, 30)))
                },
            ],
        )]);
        let train = planner.train(5).unwrap();
        assert_eq!(train.row_by_plan("1").unwrap().min_dwell_min, 2);
        assert_eq!(train.row_by_plan("2").unwrap().min_dwell_min, 2);
        assert_eq!(train.row_by_plan("3").unwrap().min_dwell_min, 5);
    }

    #[test]
    fn entry_exit_and_holds_get_their_rules() {
        let mut planner = Planner::new();
        planner.ingest(&[snapshot(
            6,
            vec![
                RowSnapshot::new("1", Some(hm(9, 0)), Some(hm(9, 2))),
                RowSnapshot {
                    flags: "D".to_owned(),
                    ..RowSnapshot::new("2", Some(hm(9, 10)), None)
                },
            ],
        )]);
        let train = planner.train(6).unwrap();
        assert_eq!(train.rows[0].auto_correction, Some(Correction::EntryTime));
        assert_eq!(
            train.row_by_plan("1").unwrap().auto_correction,
            Some(Correction::ScheduledDeparture)
        );
        // pass-throughs and exits have nothing to correct
        assert_eq!(train.row_by_plan("2").unwrap().auto_correction, None);
        assert_eq!(train.rows.last().unwrap().auto_correction, None);
    }

    #[test]
    fn boundary_times_come_from_the_estimator() {
        struct FlatMinute;
        impl TravelTimeEstimator for FlatMinute {
            fn estimate_seconds(&self, _: &str, _: &str, _: &str) -> f64 {
                60.0
            }
        }

        let mut planner = Planner::new();
        planner.ingest(&[snapshot(
            8,
            vec![RowSnapshot::new("2", Some(hm(10, 0)), Some(hm(10, 5)))],
        )]);
        planner.fill_boundary_times(&FlatMinute);
        let train = planner.train(8).unwrap();
        assert_eq!(train.rows[0].planned_departure, Some(hm(9, 59)));
        assert_eq!(train.rows.last().unwrap().planned_arrival, Some(hm(10, 6)));

        // without an estimate the copied neighbour times are kept
        let mut bare = Planner::new();
        bare.ingest(&[snapshot(
            9,
            vec![RowSnapshot::new("2", Some(hm(10, 0)), Some(hm(10, 5)))],
        )]);
        bare.fill_boundary_times(&stellwerksim::estimate::NoEstimate);
        assert_eq!(
            bare.train(9).unwrap().rows[0].planned_departure,
            Some(hm(10, 0))
        );
    }
}
