//! Wire-level model of the StellwerkSim plugin feed.
//!
//! This crate only describes what the simulator reports: train snapshots,
//! timetable rows with their flag sub-language, and realized events.
//! Interpretation of the data (delay propagation, disposition) lives in the
//! `dispatch` crate.

pub mod clock;
pub mod estimate;
pub mod flags;
pub mod model;
pub mod serde;
