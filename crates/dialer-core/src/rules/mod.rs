pub mod outcome;
pub mod retry;

pub use outcome::{lead_effect, LeadEffect};
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_MAX_ATTEMPTS, MAX_ATTEMPTS_LIMIT};
