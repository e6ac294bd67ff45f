use crate::error::invalid_input;
use anyhow::Result;
use dialer_core::domain::{AgentId, LeadId};
use std::str::FromStr;

pub use dialer_core::time::{format_timestamp_datetime, now_utc, parse_local_timestamp};

pub fn parse_lead_id(raw: &str) -> Result<LeadId> {
    parse_id(raw, "lead")
}

pub fn parse_agent_id(raw: &str) -> Result<AgentId> {
    parse_id(raw, "agent")
}

fn parse_id<T: FromStr>(raw: &str, label: &str) -> Result<T> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid_input(format!("{label} id cannot be empty")));
    }
    T::from_str(trimmed).map_err(|_| invalid_input(format!("invalid {label} id: {trimmed}")))
}

pub fn format_optional_timestamp(ts: Option<i64>) -> String {
    match ts {
        Some(ts) => format_timestamp_datetime(ts),
        None => "-".to_string(),
    }
}
