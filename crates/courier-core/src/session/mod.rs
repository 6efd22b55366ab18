pub mod control;
pub mod log;
pub mod registry;
pub mod types;

pub use control::ControlSignal;
pub use log::{DEFAULT_LOG_CAPACITY, LogEntry, LogSink};
pub use registry::{RegistryError, Session, SessionRegistry};
pub use types::{
    ControlAction, SessionConfig, SessionKey, SessionMode, SessionStatus, SessionSummary,
};
