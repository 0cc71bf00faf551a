//! Applying realized simulator events to the planner state.

use stellwerksim::clock::time_to_minutes;
use stellwerksim::model::{Event, EventKind};

use crate::correction::Correction;
use crate::engine::Planner;
use crate::train::Stamp;

impl Planner {
    /// Applies one realized event: updates delays and arrival/departure
    /// markers of the affected rows. Events for unknown trains, unknown
    /// plan tracks or positions the train has already passed are dropped
    /// with a warning; the propagation sweep is not run here.
    pub fn apply_event(&mut self, event: &Event) {
        log::debug!("{:?} {} ({:+})", event.kind, event.zid, event.delay_min);

        let Some(train) = self.train_mut(event.zid) else {
            log::warn!("event for unknown train {}", event.zid);
            return;
        };
        if train.rows.is_empty() {
            log::warn!("event for train {} without timetable", event.zid);
            return;
        }

        let current = train.position.min(train.rows.len() - 1);
        let target = if event.plan_track.is_empty() {
            // exit events carry no plan track
            train.rows.len() - 1
        } else {
            match train.row_index_by_plan(&event.plan_track) {
                Some(index) => index,
                None => {
                    log::warn!(
                        "event track {} not in timetable of train {}",
                        event.plan_track,
                        event.zid
                    );
                    return;
                }
            }
        };
        if target < current {
            log::warn!("discarding stale event for train {}", event.zid);
            return;
        }

        match event.kind {
            EventKind::Entry => {
                let row = &mut train.rows[0];
                if !row.is_entry {
                    return;
                }
                let Some(planned) = row.planned_departure else {
                    log::debug!("entry of train {} has no planned departure", event.zid);
                    return;
                };
                row.departure_delay_min =
                    time_to_minutes(event.time) - time_to_minutes(planned);
                row.arrived_at = Stamp::At(event.time);
                row.departed_at = Stamp::At(event.time);
            }

            EventKind::Exit => {
                let last = train.rows.len() - 1;
                let row = &mut train.rows[last];
                if !row.is_exit {
                    log::warn!("exit event but train {} has no exit row", event.zid);
                    return;
                }
                row.arrival_delay_min = event.delay_min;
                row.departure_delay_min = event.delay_min;
                row.arrived_at = Stamp::At(event.time);
                row.departed_at = Stamp::At(event.time);
                train.departed_system = true;
            }

            EventKind::Arrival => {
                let row = &mut train.rows[current];
                if let Some(planned) = row.planned_arrival {
                    row.arrival_delay_min =
                        time_to_minutes(event.time) - time_to_minutes(planned);
                } else {
                    log::debug!("arrival at row without planned time, keeping estimate");
                }
                row.arrived_at = Stamp::At(event.time);
                if row.pass_through() {
                    row.departure_delay_min = row.arrival_delay_min;
                    row.departed_at = Stamp::At(event.time);
                }
                // an earlier event may have been lost; close the gap
                for row in &mut train.rows[..current] {
                    row.arrived_at.mark();
                    row.departed_at.mark();
                }
            }

            EventKind::Departure => {
                if event.at_platform {
                    // still standing, held at a signal
                    if event.delay_min > 0 {
                        train.rows[current].auto_correction =
                            Some(Correction::SignalHold(event.delay_min));
                    }
                } else {
                    let row = &mut train.rows[current];
                    row.departure_delay_min = event.delay_min;
                    row.departed_at = Stamp::At(event.time);
                }
            }

            EventKind::RedSignal | EventKind::GreenSignal => {
                train.delay_min = event.delay_min;
                train.rows[target].arrival_delay_min = event.delay_min;
            }
        }
    }
}
