//! Farmer controller with clean module layout.
//!
//! This module provides:
//! - `machine`: round state and the pure decision logic (`evaluate` / `apply`)
//! - `clock`: latest plant time shared by plant and boot tasks
//! - `executor`: plant/work contract calls and protocol error classification
//! - `core`: Farmer struct and wiring
//! - `tasks`: poll loop, plant and boot tasks
//! - `tests`: state machine unit tests

pub mod clock;
pub mod core;
pub mod executor;
pub mod machine;
pub mod tasks;

pub use self::core::Farmer;
pub use clock::PlantClock;
pub use executor::{ActionExecutor, PlantOutcome, WorkOutcome};
pub use machine::{
    Action, BootPlan, EventKind, MachinePolicy, PlantRequest, RoundEvent, RoundState, RoundStateMachine,
};
pub use tasks::{boot_cycle, now_millis, plant_step, BootTools, PlantStep};
