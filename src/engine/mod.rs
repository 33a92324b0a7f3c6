//! Core engine: the per-cycle controller and the lifecycle supervisor
//! that schedules it.

pub mod controller;
pub mod supervisor;

pub use controller::{ControllerSettings, CycleOutcome, CycleReport, UpdateController};
pub use supervisor::{ServiceStatus, Supervisor, SupervisorConfig};
