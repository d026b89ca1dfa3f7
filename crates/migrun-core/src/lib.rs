pub mod config;
pub mod logging;

pub mod assemble;
pub mod control;
pub mod daemon;
pub mod device;
pub mod job;
pub mod partition;
pub mod queue;
pub mod resubmit;
pub mod scheduler;
pub mod signal;
pub mod supervisor;
