// Cache prewarming module
// Author: kelexine (https://github.com/kelexine)

pub mod scheduler;

pub use scheduler::{CycleReport, PrewarmScheduler, SchedulerHandle, Warmer};
