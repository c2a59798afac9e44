//! The parallel scheduler (components E+F, §4.E/§4.F): partitions the
//! manifest's files into per-target job queues and drains them across a
//! worker pool with a home-partition dispatch bias.

pub mod protocol;
pub mod queues;
pub mod scheduler;

pub use queues::{build_queues, owning_target, pop_next, JobQueues, Partition};
pub use scheduler::{run, RestoreProgress, SchedulerConfig};
