//! The single consuming task.
//!
//! All planner mutation happens on this task, one message at a time. Each
//! snapshot or event is folded in and propagated under one write lock, so
//! readers of the shared planner always observe a fully propagated state,
//! never a half-finished sweep.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use chrono::NaiveTime;
use stellwerksim::clock::time_to_minutes;
use stellwerksim::estimate::TravelTimeEstimator;
use stellwerksim::model::{Event, TrainSnapshot};

use crate::engine::Planner;

/// One unit of input from the simulator connection.
#[derive(Debug)]
pub enum Feed {
    /// Full roster snapshot plus the simulator clock at request time.
    Snapshot {
        trains: Vec<TrainSnapshot>,
        clock: NaiveTime,
    },
    Event(Event),
}

/// Consumes the feed until the channel closes.
pub async fn run(
    planner: Arc<RwLock<Planner>>,
    estimator: Arc<dyn TravelTimeEstimator + Send + Sync>,
    mut feed: mpsc::Receiver<Feed>,
) {
    while let Some(message) = feed.recv().await {
        let mut planner = planner.write().await;
        match message {
            Feed::Snapshot { trains, clock } => {
                log::info!("snapshot with {} trains", trains.len());
                planner.set_sim_clock(time_to_minutes(clock));
                planner.ingest(&trains);
                planner.fill_boundary_times(estimator.as_ref());
                planner.propagate_all();
            }
            Feed::Event(event) => {
                planner.apply_event(&event);
                planner.propagate_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use stellwerksim::estimate::NoEstimate;
    use stellwerksim::model::RowSnapshot;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn snapshots_are_propagated_before_readers_see_them() {
        let planner = Arc::new(RwLock::new(Planner::new()));
        let (tx, rx) = mpsc::channel(4);
        let worker = tokio::spawn(run(planner.clone(), Arc::new(NoEstimate), rx));

        let snapshot = TrainSnapshot {
            zid: 100,
            name: "RB 100".to_owned(),
            origin: "Aussen".to_owned(),
            destination: "Drüben".to_owned(),
            timetable: vec![RowSnapshot::new("2", Some(hm(10, 0)), Some(hm(10, 2)))],
            ..TrainSnapshot::default()
        };
        tx.send(Feed::Snapshot {
            trains: vec![snapshot],
            clock: hm(10, 5),
        })
        .await
        .unwrap();
        drop(tx);
        worker.await.unwrap();

        let planner = planner.read().await;
        assert_eq!(planner.sim_clock_min(), 605);
        let train = planner.train(100).unwrap();
        // entry in the past: held back to the simulator clock
        assert_eq!(train.rows[0].departure_delay_min, 5);
    }
}
