//! Delay propagation and disposition for a StellwerkSim signal box.
//!
//! The [`engine::Planner`] keeps its own copy of every train ever sighted,
//! including synthetic entry/exit rows and rows that have already been
//! served. Two graphs are derived from that list: the train-family graph
//! (replacement, coupling and split links between trains) and the target
//! graph (every scheduled stop of every train). A topologically ordered
//! sweep over the target graph recomputes arrival and departure delay
//! estimates from realized events, automatic correction rules and
//! dispatcher overrides.

pub mod correction;
pub mod engine;
pub mod events;
pub mod family;
pub mod graph;
pub mod publish;
pub mod runner;
pub mod targets;
pub mod train;
