// Session engine for Courier: registry, workers, retrying delivery and the
// boundary service used by the server and CLI.

pub mod config;
pub mod delivery;
pub mod pacing;
pub mod service;
pub mod session;
pub mod submission;
pub mod test_utils;
pub mod utils;
pub mod validation;
pub mod worker;

pub use config::EngineConfig;
pub use service::{ServiceError, SessionDetails, SessionService};
