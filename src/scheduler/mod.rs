pub mod activity;
pub mod orchestrator;

pub use activity::{Activity, ActivityKind, ActivityState};
pub use orchestrator::{Destinations, Intervals, Orchestrator, TickOutcome};
