//! # Adapters
//!
//! Concrete hosts: the journalled in-memory state for embedded execution
//! and the driver-fed partial state for step mode.

pub mod journal;
pub mod step_state;

pub use journal::{ChangedAccount, JournaledState};
pub use step_state::StepState;
