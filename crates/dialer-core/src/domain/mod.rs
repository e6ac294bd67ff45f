pub mod agent;
pub mod call_attempt;
pub mod ids;
pub mod lead;
pub mod phone;

pub use agent::Agent;
pub use call_attempt::{CallAttempt, CallStatus};
pub use ids::{AgentId, CallAttemptId, LeadId};
pub use lead::{AttemptRecord, Lead, LeadPriority, LeadStatus};
pub use phone::normalize_phone;
