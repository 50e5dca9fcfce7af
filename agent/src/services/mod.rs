pub mod executor;
pub mod script_tasks;
pub mod workloads;
