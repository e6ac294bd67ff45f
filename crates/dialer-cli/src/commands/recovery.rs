use crate::commands::{print_json, Context};
use crate::error::invalid_input;
use crate::util::now_utc;
use anyhow::Result;
use clap::Args;
use dialer_core::domain::{AgentId, CallAttemptId, LeadId, LeadStatus};
use dialer_engine::reset_stuck_leads;
use dialer_store::repo::StuckThresholds;
use serde::Serialize;

#[derive(Debug, Args)]
pub struct ResetStuckArgs {
    /// Override dispatcher.stuck_threshold_secs
    #[arg(long)]
    pub threshold_secs: Option<i64>,
    /// Override dispatcher.answered_stuck_threshold_secs
    #[arg(long)]
    pub answered_threshold_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RecoveredItem {
    lead_id: LeadId,
    previous_status: LeadStatus,
    agent_id: Option<AgentId>,
    canceled_attempts: Vec<CallAttemptId>,
}

pub fn reset_stuck(ctx: &Context<'_>, args: ResetStuckArgs) -> Result<()> {
    let thresholds = StuckThresholds {
        calling_secs: args
            .threshold_secs
            .unwrap_or(ctx.config.dispatcher.stuck_threshold_secs),
        answered_secs: args
            .answered_threshold_secs
            .unwrap_or(ctx.config.dispatcher.answered_stuck_threshold_secs),
    };
    if thresholds.calling_secs <= 0 || thresholds.answered_secs <= 0 {
        return Err(invalid_input("thresholds must be positive"));
    }

    let recovered = reset_stuck_leads(ctx.store, now_utc(), thresholds)?;
    if ctx.json {
        let items: Vec<RecoveredItem> = recovered
            .into_iter()
            .map(|lead| RecoveredItem {
                lead_id: lead.lead_id,
                previous_status: lead.previous_status,
                agent_id: lead.agent_id,
                canceled_attempts: lead.canceled_attempts,
            })
            .collect();
        return print_json(&items);
    }

    if recovered.is_empty() {
        println!("no stuck leads");
    }
    for lead in &recovered {
        println!("reset {} (was {})", lead.lead_id, lead.previous_status);
    }
    Ok(())
}
