//! Snapshot and event objects as delivered by the plugin interface.
//!
//! Field names follow the crate conventions; the serde aliases carry the
//! German wire names of the simulator protocol.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::serde::time_of_day;

/// One train as reported by a roster snapshot.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainSnapshot {
    pub zid: i32, /* zid*: integer, immutable train id */

    pub name: String,

    /// Origin as free text; either a neighbouring signal box or
    /// `"Gleis <track>"` when the train starts inside the controlled area.
    #[serde(alias = "von")]
    pub origin: String,

    /// Destination, same convention as `origin`.
    #[serde(alias = "nach")]
    pub destination: String,

    #[serde(default, alias = "hinweistext")]
    pub note: String,

    #[serde(alias = "sichtbar")]
    pub visible: bool,

    #[serde(alias = "amgleis")]
    pub at_platform: bool,

    /// Train-level delay in minutes, may be negative.
    #[serde(alias = "verspaetung")]
    pub delay_min: i32,

    #[serde(alias = "gleis")]
    pub track: String,

    #[serde(alias = "plangleis")]
    pub plan_track: String,

    #[serde(default, alias = "fahrplan")]
    pub timetable: Vec<RowSnapshot>,
}

/// One timetable row of a snapshot train.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowSnapshot {
    #[serde(alias = "plan")]
    pub plan_track: String,

    /// Effective track; deviates from `plan_track` after a track change.
    #[serde(alias = "gleis")]
    pub track: String,

    #[serde(
        default,
        alias = "an",
        serialize_with = "time_of_day::serialize_option",
        deserialize_with = "time_of_day::deserialize_option"
    )]
    pub arrival: Option<NaiveTime>,

    #[serde(
        default,
        alias = "ab",
        serialize_with = "time_of_day::serialize_option",
        deserialize_with = "time_of_day::deserialize_option"
    )]
    pub departure: Option<NaiveTime>,

    /// Raw markers, see [`crate::flags`].
    #[serde(default)]
    pub flags: String,

    #[serde(default, alias = "hinweistext")]
    pub note: String,
}

impl RowSnapshot {
    pub fn new(plan_track: &str, arrival: Option<NaiveTime>, departure: Option<NaiveTime>) -> Self {
        Self {
            plan_track: plan_track.to_owned(),
            track: plan_track.to_owned(),
            arrival,
            departure,
            ..Self::default()
        }
    }
}

/// Realized occurrence reported by the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(alias = "einfahrt")]
    Entry,

    #[serde(alias = "ankunft")]
    Arrival,

    #[serde(alias = "abfahrt")]
    Departure,

    #[serde(alias = "ausfahrt")]
    Exit,

    #[serde(alias = "rothalt")]
    RedSignal,

    #[serde(alias = "wurdegruen")]
    GreenSignal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "art")]
    pub kind: EventKind,

    pub zid: i32,

    /// Plan track the event refers to; empty on exit events.
    #[serde(default, alias = "plangleis")]
    pub plan_track: String,

    #[serde(
        alias = "zeit",
        serialize_with = "time_of_day::serialize",
        deserialize_with = "time_of_day::deserialize"
    )]
    pub time: NaiveTime,

    #[serde(alias = "verspaetung")]
    pub delay_min: i32,

    #[serde(alias = "amgleis")]
    pub at_platform: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_from_wire_names() {
        let json = r#"{
            "zid": 2764,
            "name": "RE 2764",
            "von": "Aussen",
            "nach": "Gleis 3",
            "sichtbar": false,
            "amgleis": false,
            "verspaetung": 2,
            "gleis": "",
            "plangleis": "",
            "fahrplan": [
                {"plan": "2", "gleis": "2", "an": "10:00:00", "ab": "10:02:00", "flags": "E(2765)"}
            ]
        }"#;
        let snapshot: TrainSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.zid, 2764);
        assert_eq!(snapshot.origin, "Aussen");
        assert_eq!(snapshot.delay_min, 2);
        assert_eq!(snapshot.timetable.len(), 1);
        assert_eq!(
            snapshot.timetable[0].arrival,
            Some(NaiveTime::from_hms_opt(10, 0, 0).unwrap())
        );
        assert_eq!(snapshot.timetable[0].flags, "E(2765)");
    }

    #[test]
    fn event_from_wire_names() {
        let json = r#"{
            "art": "ankunft",
            "zid": 2764,
            "plangleis": "2",
            "zeit": "10:04:30",
            "verspaetung": 4,
            "amgleis": true
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind, EventKind::Arrival);
        assert_eq!(event.delay_min, 4);
    }

    #[test]
    fn missing_stop_time_is_absent() {
        let json = r#"{"plan": "1", "gleis": "1", "an": "", "flags": "D"}"#;
        let row: RowSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(row.arrival, None);
        assert_eq!(row.departure, None);
    }
}
