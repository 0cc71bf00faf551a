//! Planner-side train and timetable row objects.
//!
//! Trains are copied from snapshots on first sighting and then kept for the
//! whole run: served rows are never dropped, and synthetic entry/exit rows
//! frame the timetable when the train crosses the boundary of the
//! controlled area. Later snapshots only touch the volatile attributes.

use std::hash::{Hash, Hasher};

use chrono::NaiveTime;
use schemars::JsonSchema;
use serde::Serialize;
use stellwerksim::clock::opt_time_to_minutes;
use stellwerksim::model::{RowSnapshot, TrainSnapshot};
use stellwerksim::flags;

use crate::correction::Correction;

/// Primary key of a timetable row. Stable over the lifetime of the train;
/// the planner graphs store keys instead of references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, JsonSchema)]
pub struct RowKey {
    pub zid: i32,
    pub seq_no: i32,
    pub plan_track: String,
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{} ({})", self.zid, self.seq_no, self.plan_track)
    }
}

/// Classification of a row, also the node discriminator of the target graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RowKind {
    Entry,
    Exit,
    /// Scheduled passenger stop.
    Hold,
    /// Pass-through without stopping.
    Pass,
    /// Dispatcher-inserted operational stop (`seq_no` not divisible by 1000).
    Operational,
    /// Unscheduled hold between two targets. Reserved; rows never classify
    /// as this, but graph nodes may.
    SignalHold,
}

/// Arrival/departure marker of a row: either still open, known to have
/// happened (backfilled when an event was missed), or realized at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stamp {
    #[default]
    Pending,
    Marked,
    At(NaiveTime),
}

impl Stamp {
    pub fn is_set(&self) -> bool {
        !matches!(self, Stamp::Pending)
    }

    /// Backfill: mark without a time, keeping a realized time if present.
    pub fn mark(&mut self) {
        if let Stamp::Pending = self {
            *self = Stamp::Marked;
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            Stamp::At(time) => Some(*time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimetableRow {
    pub zid: i32,

    /// Ordering key. Original rows carry `index * 1000`; dispatcher-inserted
    /// operational stops get values in between.
    pub seq_no: i32,

    pub plan_track: String,
    pub actual_track: String,

    pub planned_arrival: Option<NaiveTime>,
    pub planned_departure: Option<NaiveTime>,

    pub flags: String,
    pub note: String,

    pub is_entry: bool,
    pub is_exit: bool,

    pub min_dwell_min: i32,

    pub auto_correction: Option<Correction>,
    pub manual_correction: Option<Correction>,

    pub arrival_delay_min: i32,
    pub departure_delay_min: i32,

    pub arrived_at: Stamp,
    pub departed_at: Stamp,
}

impl TimetableRow {
    fn new(zid: i32, plan_track: &str) -> Self {
        Self {
            zid,
            seq_no: 0,
            plan_track: plan_track.to_owned(),
            actual_track: plan_track.to_owned(),
            planned_arrival: None,
            planned_departure: None,
            flags: String::new(),
            note: String::new(),
            is_entry: false,
            is_exit: false,
            min_dwell_min: 0,
            auto_correction: None,
            manual_correction: None,
            arrival_delay_min: 0,
            departure_delay_min: 0,
            arrived_at: Stamp::Pending,
            departed_at: Stamp::Pending,
        }
    }

    fn from_snapshot(zid: i32, row: &RowSnapshot) -> Self {
        Self {
            actual_track: row.track.clone(),
            planned_arrival: row.arrival,
            planned_departure: row.departure,
            flags: row.flags.clone(),
            note: row.note.clone(),
            ..Self::new(zid, &row.plan_track)
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey {
            zid: self.zid,
            seq_no: self.seq_no,
            plan_track: self.plan_track.clone(),
        }
    }

    pub fn kind(&self) -> RowKind {
        if self.is_entry {
            RowKind::Entry
        } else if self.is_exit {
            RowKind::Exit
        } else if self.seq_no % 1000 != 0 {
            RowKind::Operational
        } else if self.pass_through() {
            RowKind::Pass
        } else {
            RowKind::Hold
        }
    }

    pub fn pass_through(&self) -> bool {
        flags::pass_through(&self.flags)
    }

    pub fn replacement_zid(&self) -> Option<i32> {
        flags::replacement_zid(&self.flags)
    }

    pub fn coupling_zid(&self) -> Option<i32> {
        flags::coupling_zid(&self.flags)
    }

    pub fn split_zid(&self) -> Option<i32> {
        flags::split_zid(&self.flags)
    }

    /// All peer trains this row links to.
    pub fn peer_zids(&self) -> impl Iterator<Item = i32> {
        self.replacement_zid()
            .into_iter()
            .chain(self.coupling_zid())
            .chain(self.split_zid())
    }

    /// Arrival including the current delay estimate, minutes since midnight.
    pub fn arrival_minute(&self) -> Option<i32> {
        opt_time_to_minutes(self.planned_arrival).map(|m| m + self.arrival_delay_min)
    }

    /// Departure including the current delay estimate, minutes since midnight.
    pub fn departure_minute(&self) -> Option<i32> {
        opt_time_to_minutes(self.planned_departure).map(|m| m + self.departure_delay_min)
    }
}

/// Row identity is the `(zid, seq_no, plan_track)` triple; every plan track
/// occurs at most once per train timetable.
impl PartialEq for TimetableRow {
    fn eq(&self, other: &Self) -> bool {
        self.zid == other.zid
            && self.seq_no == other.seq_no
            && self.plan_track == other.plan_track
    }
}

impl Eq for TimetableRow {}

impl Hash for TimetableRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.zid.hash(state);
        self.seq_no.hash(state);
        self.plan_track.hash(state);
    }
}

#[derive(Debug, Clone)]
pub struct Train {
    pub zid: i32,
    pub name: String,

    /// Origin text, `"Gleis "` prefix stripped.
    pub origin: String,
    /// Destination text, `"Gleis "` prefix stripped.
    pub destination: String,
    pub note: String,

    pub current_track: String,
    pub plan_track: String,

    pub visible: bool,
    pub at_platform: bool,
    pub delay_min: i32,

    /// The train has left the controlled area.
    pub departed_system: bool,

    /// All peer trains referenced by row flags are known to the planner.
    pub peers_resolved: bool,
    /// Every row has its correction attached and peer links wired.
    pub corrections_defined: bool,

    /// Index of the row the train is currently headed for (or holding at).
    pub position: usize,

    pub rows: Vec<TimetableRow>,
}

impl Train {
    /// Hydrates a planner train from its first snapshot.
    ///
    /// A synthetic entry row is prepended when the train comes from outside
    /// the controlled area, a synthetic exit row is appended when it leaves
    /// it; their times are copied from the neighbouring row until the
    /// travel-time estimator fills them in. A train that is already under
    /// way on first sighting gets every row before its current plan track
    /// marked as served with the train-level delay.
    pub fn from_snapshot(snapshot: &TrainSnapshot) -> Self {
        let mut train = Self {
            zid: snapshot.zid,
            name: snapshot.name.clone(),
            origin: snapshot.origin.replace("Gleis ", ""),
            destination: snapshot.destination.replace("Gleis ", ""),
            note: snapshot.note.clone(),
            current_track: String::new(),
            plan_track: String::new(),
            visible: false,
            at_platform: false,
            delay_min: 0,
            departed_system: false,
            peers_resolved: false,
            corrections_defined: false,
            position: 0,
            rows: Vec::new(),
        };

        if !snapshot.visible
            && !train.origin.is_empty()
            && !snapshot.origin.starts_with("Gleis")
        {
            let mut entry = TimetableRow::new(snapshot.zid, &train.origin);
            entry.is_entry = true;
            if let Some(first) = snapshot.timetable.first() {
                entry.planned_arrival = first.arrival;
                entry.planned_departure = first.arrival;
            }
            train.rows.push(entry);
        }
        for row in &snapshot.timetable {
            train.rows.push(TimetableRow::from_snapshot(snapshot.zid, row));
        }
        if !train.destination.is_empty() && !snapshot.destination.starts_with("Gleis") {
            let mut exit = TimetableRow::new(snapshot.zid, &train.destination);
            exit.is_exit = true;
            if let Some(last) = snapshot.timetable.last() {
                exit.planned_arrival = last.departure;
                exit.planned_departure = last.departure;
            }
            train.rows.push(exit);
        }
        for (index, row) in train.rows.iter_mut().enumerate() {
            row.seq_no = index as i32 * 1000;
        }

        // start lineup: the train is already moving on first sighting
        if snapshot.visible && !train.rows.is_empty() {
            let target = train
                .row_index_by_plan(&snapshot.plan_track)
                .unwrap_or(train.rows.len() - 1);
            for row in &mut train.rows[..target] {
                row.arrived_at.mark();
                row.departed_at.mark();
                row.arrival_delay_min = snapshot.delay_min;
                row.departure_delay_min = snapshot.delay_min;
            }
            if snapshot.at_platform {
                let row = &mut train.rows[target];
                row.arrived_at.mark();
                row.arrival_delay_min = snapshot.delay_min;
            }
        }

        train.update_from_snapshot(snapshot);
        train
    }

    /// Updates the volatile attributes from a follow-up snapshot. The
    /// timetable structure (row count, `seq_no`, plan tracks, planned
    /// times, flags) is frozen after the first ingestion; only the
    /// effective track of a row may change.
    pub fn update_from_snapshot(&mut self, snapshot: &TrainSnapshot) {
        if !snapshot.track.is_empty() {
            self.current_track = snapshot.track.clone();
            self.plan_track = snapshot.plan_track.clone();
        } else {
            // the train is leaving the controlled area
            self.current_track = self.destination.clone();
            self.plan_track = self.destination.clone();
        }

        self.delay_min = snapshot.delay_min;
        self.at_platform = snapshot.at_platform;
        self.visible = snapshot.visible;
        self.note = snapshot.note.clone();

        for row in &snapshot.timetable {
            if let Some(known) = self.row_by_plan_mut(&row.plan_track) {
                known.actual_track = row.track.clone();
            }
        }

        if let Some(index) = self.row_index_by_plan(&snapshot.plan_track) {
            self.position = index;
        } else if snapshot.plan_track.is_empty() && !self.rows.is_empty() {
            self.position = self.rows.len() - 1;
        }
    }

    pub fn row_by_seq(&self, seq_no: i32) -> Option<&TimetableRow> {
        self.rows.iter().find(|row| row.seq_no == seq_no)
    }

    pub fn row_by_seq_mut(&mut self, seq_no: i32) -> Option<&mut TimetableRow> {
        self.rows.iter_mut().find(|row| row.seq_no == seq_no)
    }

    pub fn row_index_by_plan(&self, plan_track: &str) -> Option<usize> {
        if plan_track.is_empty() {
            return None;
        }
        self.rows.iter().position(|row| row.plan_track == plan_track)
    }

    pub fn row_by_plan(&self, plan_track: &str) -> Option<&TimetableRow> {
        self.row_index_by_plan(plan_track).map(|index| &self.rows[index])
    }

    pub fn row_by_plan_mut(&mut self, plan_track: &str) -> Option<&mut TimetableRow> {
        self.row_index_by_plan(plan_track)
            .map(|index| &mut self.rows[index])
    }

    /// Plan tracks in timetable order, entry and exit included.
    pub fn route(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.plan_track.as_str())
    }

    /// Scheduled entry time: the departure of the entry row, if any.
    pub fn planned_entry_time(&self) -> Option<NaiveTime> {
        self.rows
            .first()
            .filter(|row| row.is_entry)
            .and_then(|row| row.planned_departure)
    }

    /// Scheduled exit time: the arrival of the exit row, if any.
    pub fn planned_exit_time(&self) -> Option<NaiveTime> {
        self.rows
            .last()
            .filter(|row| row.is_exit)
            .and_then(|row| row.planned_arrival)
    }
}
