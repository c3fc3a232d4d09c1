/// Cycle outcomes, timing settings and the cycle timer
pub mod schedule;

/// The polling loop and the state it owns
pub mod polling_loop;

pub use polling_loop::LoopContext;
pub use schedule::{CycleOutcome, CycleTimer, PollSettings, PollState};
