//! Departure-delay correction rules.
//!
//! Every timetable row derives its departure delay from its arrival delay
//! through exactly one rule: the dispatcher-set manual correction if
//! present, else the automatic correction attached by the planner, else
//! plain pass-through. Rules that involve a peer train (replacement,
//! coupling, split, await) read the peer's current estimates and may queue
//! the peer for another propagation sweep.

use stellwerksim::clock::{minutes_to_time, opt_time_to_minutes};

use crate::engine::Planner;
use crate::train::{RowKey, RowKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    /// Departure delay equals arrival delay. Default for exits and rows
    /// without any attached rule.
    PassThrough,

    /// Fixed departure delay, may be negative. Dispatcher override.
    FixedDelay(i32),

    /// Same effect as [`Correction::FixedDelay`], but marks a delay caused
    /// by waiting at a signal; installed from departure events.
    SignalHold(i32),

    /// The reported entry time can lie before the current simulator clock;
    /// this rule pushes the entry departure up to the clock.
    EntryTime,

    /// Regular dispatch: reduce the delay as far as the minimum dwell
    /// allows.
    ScheduledDeparture,

    /// Depart no earlier than `wait_min` minutes after the origin row's
    /// corrected arrival.
    AwaitArrival { origin: RowKey, wait_min: i32 },

    /// Depart no earlier than `wait_min` minutes after the origin row's
    /// corrected departure.
    AwaitDeparture { origin: RowKey, wait_min: i32 },

    /// The train ends here and continues under a new number; the departure
    /// tracks the replacement train's first scheduled arrival.
    Replacement,

    /// The train ends here by coupling onto a partner train; departure
    /// waits for both arrivals, which are kept at least two minutes apart.
    Coupling,

    /// A new train splits off here and inherits the arrival delay.
    Split,
}

impl Correction {
    /// Origin row of an await-style dependency, if the rule has one.
    pub fn origin(&self) -> Option<&RowKey> {
        match self {
            Correction::AwaitArrival { origin, .. }
            | Correction::AwaitDeparture { origin, .. } => Some(origin),
            _ => None,
        }
    }
}

enum AwaitKind {
    Arrival,
    Departure,
}

/// Bound for the coupling separation loop; the loop cannot run away as long
/// as only one of the two arrivals moves, but that asymmetry is easy to
/// break by accident.
const MAX_SEPARATION_BUMPS: i32 = 30;

impl Planner {
    /// Applies the row's effective correction rule, writing
    /// `departure_delay_min` (and, for coupling, possibly
    /// `arrival_delay_min`). Manual wins over automatic.
    pub(crate) fn apply_correction(&mut self, key: &RowKey) {
        let Some(row) = self.row(key) else { return };
        let correction = row
            .manual_correction
            .clone()
            .or_else(|| row.auto_correction.clone())
            .unwrap_or(Correction::PassThrough);

        match correction {
            Correction::PassThrough => self.pass_through(key),
            Correction::FixedDelay(delay) | Correction::SignalHold(delay) => {
                if let Some(row) = self.row_mut(key) {
                    row.departure_delay_min = delay;
                }
            }
            Correction::EntryTime => self.apply_entry_time(key),
            Correction::ScheduledDeparture => self.apply_scheduled_departure(key),
            Correction::AwaitArrival { origin, wait_min } => {
                self.apply_await(key, &origin, wait_min, AwaitKind::Arrival);
            }
            Correction::AwaitDeparture { origin, wait_min } => {
                self.apply_await(key, &origin, wait_min, AwaitKind::Departure);
            }
            Correction::Replacement => self.apply_replacement(key),
            Correction::Coupling => self.apply_coupling(key),
            Correction::Split => self.apply_split(key),
        }
    }

    fn pass_through(&mut self, key: &RowKey) {
        if let Some(row) = self.row_mut(key) {
            row.departure_delay_min = row.arrival_delay_min;
        }
    }

    /// Fallback when a rule needs a planned time the row does not have.
    fn missing_time_fallback(&mut self, key: &RowKey) {
        log::debug!("row {key} has no planned arrival, passing the delay through");
        self.pass_through(key);
    }

    fn apply_entry_time(&mut self, key: &RowKey) {
        let Some(row) = self.row(key) else { return };
        let arrival_delay = row.arrival_delay_min;
        let Some(plan_arr) = opt_time_to_minutes(row.planned_arrival) else {
            self.missing_time_fallback(key);
            return;
        };
        let plan_dep = opt_time_to_minutes(row.planned_departure).unwrap_or(plan_arr);

        let arrival = plan_arr + arrival_delay;
        let departure = arrival.max(self.sim_clock_min());
        if let Some(row) = self.row_mut(key) {
            row.departure_delay_min = departure - plan_dep;
        }
    }

    fn apply_scheduled_departure(&mut self, key: &RowKey) {
        let Some(row) = self.row(key) else { return };
        let arrival_delay = row.arrival_delay_min;
        let min_dwell = row.min_dwell_min;
        let Some(plan_arr) = opt_time_to_minutes(row.planned_arrival) else {
            self.missing_time_fallback(key);
            return;
        };
        let plan_dep =
            opt_time_to_minutes(row.planned_departure).unwrap_or(plan_arr + min_dwell);

        let arrival = plan_arr + arrival_delay;
        let dwell = (plan_dep - arrival).max(min_dwell);
        if let Some(row) = self.row_mut(key) {
            row.departure_delay_min = arrival + dwell - plan_dep;
        }
    }

    fn apply_await(&mut self, key: &RowKey, origin: &RowKey, wait_min: i32, kind: AwaitKind) {
        let Some(row) = self.row(key) else { return };
        let arrival_delay = row.arrival_delay_min;
        let min_dwell = row.min_dwell_min;
        let plan_arr = opt_time_to_minutes(row.planned_arrival);
        let plan_dep = opt_time_to_minutes(row.planned_departure);
        // await rules also apply to rows that only have one of the two
        // planned times, e.g. first rows of split trains
        let (plan_arr, plan_dep) = match (plan_arr, plan_dep) {
            (Some(arr), Some(dep)) => (arr, dep),
            (Some(arr), None) => (arr, arr + min_dwell),
            (None, Some(dep)) => (dep, dep),
            (None, None) => {
                self.missing_time_fallback(key);
                return;
            }
        };

        let arrival = plan_arr + arrival_delay;
        let dwell = (plan_dep - arrival).max(min_dwell);

        let connection = self.row(origin).and_then(|origin_row| match kind {
            AwaitKind::Arrival => opt_time_to_minutes(origin_row.planned_arrival)
                .map(|minute| minute + origin_row.arrival_delay_min),
            AwaitKind::Departure => opt_time_to_minutes(origin_row.planned_departure)
                .map(|minute| minute + origin_row.departure_delay_min),
        });
        let departure = match connection {
            Some(connection) => (arrival + dwell).max(connection + wait_min),
            None => {
                log::debug!("await origin {origin} of row {key} has no usable time");
                arrival + dwell
            }
        };
        if let Some(row) = self.row_mut(key) {
            row.departure_delay_min = departure - plan_dep;
        }
    }

    fn apply_replacement(&mut self, key: &RowKey) {
        let Some(row) = self.row(key) else { return };
        let arrival_delay = row.arrival_delay_min;
        let min_dwell = row.min_dwell_min;
        let peer_zid = row.replacement_zid();
        let Some(plan_arr) = opt_time_to_minutes(row.planned_arrival) else {
            self.missing_time_fallback(key);
            return;
        };
        let own_dep = opt_time_to_minutes(row.planned_departure);

        // the number change finishes when the replacement is due to start
        let peer_start = peer_zid
            .and_then(|zid| self.train(zid))
            .and_then(|peer| peer.rows.first())
            .and_then(|first| opt_time_to_minutes(first.planned_arrival));
        let plan_dep = peer_start.or(own_dep).unwrap_or(plan_arr + min_dwell);

        let arrival = plan_arr + arrival_delay;
        let dwell = (plan_dep - arrival).max(min_dwell);
        let departure = arrival + dwell;
        let delay = departure - plan_dep;
        if let Some(row) = self.row_mut(key) {
            row.departure_delay_min = delay;
            row.planned_departure = Some(minutes_to_time(departure - delay));
        }

        if let Some(zid) = peer_zid {
            if let Some(peer) = self.train_mut(zid) {
                peer.delay_min = delay;
                self.request_propagation(zid);
            }
        }
    }

    fn apply_coupling(&mut self, key: &RowKey) {
        let Some(row) = self.row(key) else { return };
        let mut arrival_delay = row.arrival_delay_min;
        let min_dwell = row.min_dwell_min;
        let partner_zid = row.coupling_zid();
        let Some(plan_arr) = opt_time_to_minutes(row.planned_arrival) else {
            log::warn!("coupling row {key} has no planned arrival");
            self.pass_through(key);
            return;
        };
        let plan_dep =
            opt_time_to_minutes(row.planned_departure).unwrap_or(plan_arr + min_dwell);

        // corrected arrival of the partner at the coupling track
        let partner_arrival = partner_zid
            .and_then(|zid| self.targets().rows_at(zid, &key.plan_track))
            .and_then(|kinds| {
                kinds.get(&RowKind::Hold).or_else(|| kinds.values().next())
            })
            .cloned()
            .and_then(|partner_key| self.row(&partner_key))
            .and_then(|partner| {
                opt_time_to_minutes(partner.planned_arrival)
                    .map(|minute| minute + partner.arrival_delay_min)
            })
            .unwrap_or(0);

        // push the own arrival until both arrivals are clearly separated;
        // only this row's delay moves, the partner is left alone
        let mut bumps = 0;
        while (partner_arrival - (plan_arr + arrival_delay)).abs() < 2 {
            arrival_delay += 1;
            bumps += 1;
            if bumps > MAX_SEPARATION_BUMPS {
                log::error!("coupling separation at {key} does not converge");
                break;
            }
        }

        let arrival = plan_arr + arrival_delay;
        let dwell = (plan_dep - arrival).max(min_dwell);
        let departure = (arrival + dwell).max(partner_arrival);
        if let Some(row) = self.row_mut(key) {
            row.arrival_delay_min = arrival_delay;
            row.departure_delay_min = departure - plan_dep;
        }

        if let Some(zid) = partner_zid {
            if self.train(zid).is_some() {
                self.request_propagation(zid);
            }
        }
    }

    fn apply_split(&mut self, key: &RowKey) {
        let Some(row) = self.row(key) else { return };
        let arrival_delay = row.arrival_delay_min;
        let min_dwell = row.min_dwell_min;
        let peer_zid = row.split_zid();
        let Some(plan_arr) = opt_time_to_minutes(row.planned_arrival) else {
            log::warn!("split row {key} has no planned arrival");
            self.pass_through(key);
            return;
        };
        let plan_dep =
            opt_time_to_minutes(row.planned_departure).unwrap_or(plan_arr + min_dwell);

        let arrival = plan_arr + arrival_delay;
        let dwell = (plan_dep - arrival).max(min_dwell);
        if let Some(row) = self.row_mut(key) {
            row.departure_delay_min = arrival + dwell - plan_dep;
        }

        // the split-off train starts with this row's arrival delay
        if let Some(zid) = peer_zid {
            if let Some(peer) = self.train_mut(zid) {
                peer.delay_min = arrival_delay;
                if let Some(first) = peer.rows.first_mut() {
                    first.arrival_delay_min = arrival_delay;
                }
                self.request_propagation(zid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;
    use stellwerksim::model::{RowSnapshot, TrainSnapshot};

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn planner_with_row(
        arrival: Option<NaiveTime>,
        departure: Option<NaiveTime>,
    ) -> (Planner, RowKey) {
        let snapshot = TrainSnapshot {
            zid: 1,
            name: "RB 1".to_owned(),
            origin: "Gleis 2".to_owned(),
            destination: "Gleis 2".to_owned(),
            timetable: vec![RowSnapshot::new("2", arrival, departure)],
            ..TrainSnapshot::default()
        };
        let mut planner = Planner::new();
        planner.ingest(&[snapshot]);
        let key = planner.train(1).unwrap().rows[0].key();
        (planner, key)
    }

    #[test]
    fn scheduled_departure_respects_the_dwell_floor() {
        let (mut planner, key) = planner_with_row(Some(hm(10, 0)), Some(hm(10, 3)));
        {
            let row = planner.row_mut(&key).unwrap();
            row.arrival_delay_min = 5;
            row.min_dwell_min = 2;
        }
        planner.apply_correction(&key);
        // 10:05 arrival, two minutes dwell, 10:07 against a 10:03 plan
        assert_eq!(planner.row(&key).unwrap().departure_delay_min, 4);
    }

    #[test]
    fn scheduled_departure_recovers_down_to_the_plan() {
        let (mut planner, key) = planner_with_row(Some(hm(10, 0)), Some(hm(10, 10)));
        planner.row_mut(&key).unwrap().arrival_delay_min = 3;
        planner.apply_correction(&key);
        assert_eq!(planner.row(&key).unwrap().departure_delay_min, 0);
    }

    #[test]
    fn missing_planned_arrival_passes_the_delay_through() {
        let (mut planner, key) = planner_with_row(None, None);
        planner.row_mut(&key).unwrap().arrival_delay_min = 7;
        planner.apply_correction(&key);
        assert_eq!(planner.row(&key).unwrap().departure_delay_min, 7);
    }

    #[test]
    fn fixed_delay_may_be_negative() {
        let (mut planner, key) = planner_with_row(Some(hm(10, 0)), Some(hm(10, 3)));
        planner.row_mut(&key).unwrap().manual_correction =
            Some(Correction::FixedDelay(-2));
        planner.apply_correction(&key);
        assert_eq!(planner.row(&key).unwrap().departure_delay_min, -2);
    }

    #[test]
    fn entry_time_waits_for_the_clock() {
        let (mut planner, key) = planner_with_row(Some(hm(10, 0)), Some(hm(10, 0)));
        planner.set_sim_clock(10 * 60 + 5);
        {
            let row = planner.row_mut(&key).unwrap();
            row.manual_correction = Some(Correction::EntryTime);
        }
        planner.apply_correction(&key);
        assert_eq!(planner.row(&key).unwrap().departure_delay_min, 5);
    }

    #[test]
    fn entry_time_on_a_late_train_does_not_hold_it_further() {
        let (mut planner, key) = planner_with_row(Some(hm(10, 0)), Some(hm(10, 0)));
        planner.set_sim_clock(10 * 60 + 5);
        {
            let row = planner.row_mut(&key).unwrap();
            row.manual_correction = Some(Correction::EntryTime);
            row.arrival_delay_min = 9;
        }
        planner.apply_correction(&key);
        assert_eq!(planner.row(&key).unwrap().departure_delay_min, 9);
    }
}
