//! Task mapping store trait and implementations.

mod json_file;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use hpc_types::{MappingStore, MappingStoreError};
pub use json_file::JsonFileMappingStore;
pub use memory::InMemoryMappingStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMappingStore;
