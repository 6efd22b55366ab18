pub mod outcome;
pub mod retry;
pub mod simulated;

pub use outcome::{DeliveryResult, OutcomeProvider, Payload, mask_token};
pub use retry::{RetryExecutor, RetryPolicy, SendOutcome};
pub use simulated::SimulatedOutcome;
