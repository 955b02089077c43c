//! Core types and traits for the HPC job submission and status-tracking layer.
//!
//! Wire DTOs match the batch scheduler's HTTP API and the analysis worker's
//! progress file format.

mod dto;
mod error;
mod fsutil;
mod progress;
mod status;
mod traits;
mod validate;

pub use dto::*;
pub use error::*;
pub use fsutil::write_atomic;
pub use progress::*;
pub use status::*;
pub use traits::*;
pub use validate::validate_identifier;
