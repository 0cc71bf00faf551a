//! Consumer-facing view of the planner state.
//!
//! Consumers (table windows, diagrams) only ever see these snapshot
//! values; they never reach into the planner's own structures.

use chrono::NaiveTime;
use schemars::JsonSchema;
use serde::Serialize;

use crate::correction::Correction;
use crate::engine::Planner;
use crate::train::{RowKind, TimetableRow, Train};

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRow {
    pub seq_no: i32,
    pub plan_track: String,

    /// Effective track, only present when it deviates from the plan.
    pub actual_track: Option<String>,

    pub kind: RowKind,

    pub planned_arrival: Option<NaiveTime>,
    pub planned_departure: Option<NaiveTime>,

    pub arrival_delay_min: i32,
    pub departure_delay_min: i32,

    /// Arrival including delay, minutes since midnight.
    pub arrival_minute: Option<i32>,
    /// Departure including delay, minutes since midnight.
    pub departure_minute: Option<i32>,

    pub arrived: bool,
    pub departed: bool,
    pub arrived_at: Option<NaiveTime>,
    pub departed_at: Option<NaiveTime>,

    pub auto_correction: Option<String>,
    pub manual_correction: Option<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishedTrain {
    pub zid: i32,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub note: Option<String>,

    pub visible: bool,
    pub at_platform: bool,
    pub delay_min: i32,
    pub departed_system: bool,

    /// Scheduled boundary crossings, when the train has entry/exit rows.
    pub planned_entry: Option<NaiveTime>,
    pub planned_exit: Option<NaiveTime>,

    /// All trains linked to this one through replacement, coupling or
    /// split, this one included.
    pub family: Vec<i32>,

    pub rows: Vec<PublishedRow>,
}

impl Planner {
    /// Publishes all trains in family order.
    pub fn published(&self) -> Vec<PublishedTrain> {
        self.trains().map(|train| self.publish_train(train)).collect()
    }

    fn publish_train(&self, train: &Train) -> PublishedTrain {
        let mut family = self.families().family_of(train.zid);
        family.sort_unstable();
        PublishedTrain {
            zid: train.zid,
            name: train.name.clone(),
            origin: train.origin.clone(),
            destination: train.destination.clone(),
            note: (!train.note.is_empty()).then(|| train.note.clone()),
            visible: train.visible,
            at_platform: train.at_platform,
            delay_min: train.delay_min,
            departed_system: train.departed_system,
            planned_entry: train.planned_entry_time(),
            planned_exit: train.planned_exit_time(),
            family,
            rows: train.rows.iter().map(|row| self.publish_row(row)).collect(),
        }
    }

    fn publish_row(&self, row: &TimetableRow) -> PublishedRow {
        PublishedRow {
            seq_no: row.seq_no,
            plan_track: row.plan_track.clone(),
            actual_track: (row.actual_track != row.plan_track)
                .then(|| row.actual_track.clone()),
            kind: row.kind(),
            planned_arrival: row.planned_arrival,
            planned_departure: row.planned_departure,
            arrival_delay_min: row.arrival_delay_min,
            departure_delay_min: row.departure_delay_min,
            arrival_minute: row.arrival_minute(),
            departure_minute: row.departure_minute(),
            arrived: row.arrived_at.is_set(),
            departed: row.departed_at.is_set(),
            arrived_at: row.arrived_at.time(),
            departed_at: row.departed_at.time(),
            auto_correction: row
                .auto_correction
                .as_ref()
                .map(|correction| self.correction_label(correction)),
            manual_correction: row
                .manual_correction
                .as_ref()
                .map(|correction| self.correction_label(correction)),
        }
    }

    /// Stable display string of a correction; peer rows are shown by the
    /// peer train's name.
    pub fn correction_label(&self, correction: &Correction) -> String {
        match correction {
            Correction::PassThrough => "Pass".to_owned(),
            Correction::FixedDelay(delay) => format!("Fix({delay})"),
            Correction::SignalHold(delay) => format!("Signal({delay})"),
            Correction::EntryTime => "Entry".to_owned(),
            Correction::ScheduledDeparture => "Plan".to_owned(),
            Correction::AwaitArrival { origin, wait_min } => {
                format!("Arrival({}, {})", self.peer_name(origin.zid), wait_min)
            }
            Correction::AwaitDeparture { origin, wait_min } => {
                format!("Departure({}, {})", self.peer_name(origin.zid), wait_min)
            }
            Correction::Replacement => "Replace".to_owned(),
            Correction::Coupling => "Couple".to_owned(),
            Correction::Split => "Split".to_owned(),
        }
    }

    fn peer_name(&self, zid: i32) -> String {
        match self.train(zid) {
            Some(train) => train.name.clone(),
            None => zid.to_string(),
        }
    }
}
