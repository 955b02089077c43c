//! Transports to the cluster batch scheduler.
//!
//! `HttpTransport` talks to the scheduler's REST API with a cached bearer token;
//! `LocalCommandTransport` shells out to the cluster's submission tool.

mod http;
mod local;
#[cfg(feature = "test-util")]
pub mod mock;
mod token;

pub use hpc_types::{JobTransport, NativeJobState, TransportError};
pub use http::{HttpTransport, HttpTransportConfig};
pub use local::{parse_job_id, LocalCommandConfig, LocalCommandTransport};
pub use token::{AuthToken, Clock, ManualClock, SystemClock, TokenCache};

#[cfg(feature = "test-util")]
pub use mock::MockTransport;
