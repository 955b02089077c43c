//! Scheduler client: renders job scripts, submits them through a transport, records the
//! task -> job mapping, and reconciles scheduler status with worker progress.

mod client;
mod config;
mod script;
mod trait_;

pub use client::SchedulerClient;
pub use config::{ConfigError, MappingBackend, SchedulerConfig, TransportKind};
pub use hpc_types::{SchedulerError, TaskSpec, TaskStatusReport};
pub use script::{JobScriptGenerator, ScriptConfig};
pub use trait_::Scheduler;
