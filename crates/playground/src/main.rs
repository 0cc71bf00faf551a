use std::sync::Arc;

use chrono::NaiveTime;
use tokio::sync::{mpsc, RwLock};

use dispatch::engine::Planner;
use dispatch::runner::{self, Feed};
use stellwerksim::estimate::NoEstimate;
use stellwerksim::model::{Event, EventKind, RowSnapshot, TrainSnapshot};

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// A small scene: RE 4711 comes in late and ends on track 3, where it is
/// replaced by RB 4712.
fn snapshot(re_visible: bool) -> Vec<TrainSnapshot> {
    let re = TrainSnapshot {
        zid: 4711,
        name: "RE 4711".to_owned(),
        origin: "Aussen".to_owned(),
        destination: "Gleis 3".to_owned(),
        delay_min: 4,
        visible: re_visible,
        track: if re_visible { "1".to_owned() } else { String::new() },
        plan_track: if re_visible { "1".to_owned() } else { String::new() },
        timetable: vec![
            RowSnapshot::new("1", Some(hm(10, 0)), Some(hm(10, 1))),
            RowSnapshot {
                flags: "E(4712)".to_owned(),
                ..RowSnapshot::new("3", Some(hm(10, 10)), Some(hm(10, 20)))
            },
        ],
        ..TrainSnapshot::default()
    };
    let rb = TrainSnapshot {
        zid: 4712,
        name: "RB 4712".to_owned(),
        origin: "Gleis 3".to_owned(),
        destination: "Aussen".to_owned(),
        timetable: vec![RowSnapshot::new("3", Some(hm(10, 20)), Some(hm(10, 25)))],
        ..TrainSnapshot::default()
    };
    vec![re, rb]
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let planner = Arc::new(RwLock::new(Planner::new()));
    let (tx, rx) = mpsc::channel(16);
    let worker = tokio::spawn(runner::run(planner.clone(), Arc::new(NoEstimate), rx));

    tx.send(Feed::Snapshot {
        trains: snapshot(false),
        clock: hm(9, 55),
    })
    .await
    .unwrap();
    tx.send(Feed::Snapshot {
        trains: snapshot(true),
        clock: hm(10, 2),
    })
    .await
    .unwrap();
    tx.send(Feed::Event(Event {
        kind: EventKind::Arrival,
        zid: 4711,
        plan_track: "1".to_owned(),
        time: hm(10, 4),
        delay_min: 4,
        at_platform: true,
    }))
    .await
    .unwrap();
    drop(tx);
    worker.await.unwrap();

    let planner = planner.read().await;
    let published = planner.published();
    log::info!("publishing {} trains", published.len());
    let json = serde_json::to_string_pretty(&published).unwrap();
    println!("{}", json);
}
