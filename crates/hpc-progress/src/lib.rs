//! Progress records written by the analysis worker and read by the scheduler client.

mod file_store;
mod memory;
mod reporter;

pub use file_store::FileProgressStore;
pub use hpc_types::{ProgressError, ProgressRecord, ProgressState, ProgressStore};
pub use memory::InMemoryProgressStore;
pub use reporter::ProgressReporter;
