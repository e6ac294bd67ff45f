use crate::commands::{print_json, Context};
use crate::util::now_utc;
use anyhow::Result;
use clap::Args;
use dialer_core::domain::{CallAttemptId, CallStatus, LeadId, LeadStatus};
use dialer_engine::Reconciler;
use dialer_store::repo::StatusUpdateResult;
use serde::Serialize;

#[derive(Debug, Args)]
pub struct OutcomeArgs {
    pub provider_call_id: String,
    /// Provider status such as ringing, in-progress, completed, busy or no-answer
    pub status: String,
    /// Talk time in seconds
    #[arg(long)]
    pub duration: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OutcomeReport {
    provider_call_id: String,
    attempt_id: CallAttemptId,
    lead_id: LeadId,
    received: CallStatus,
    result: &'static str,
    call_status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    lead_status: Option<LeadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_eligible_at: Option<i64>,
}

pub fn apply_outcome(ctx: &Context<'_>, args: OutcomeArgs) -> Result<()> {
    let reconciled = Reconciler::new(ctx.store, ctx.config.retry).apply(
        now_utc(),
        args.provider_call_id.trim(),
        &args.status,
        args.duration,
    )?;

    let mut report = OutcomeReport {
        provider_call_id: reconciled.provider_call_id,
        attempt_id: reconciled.attempt_id,
        lead_id: reconciled.lead_id,
        received: reconciled.received,
        result: "rejected",
        call_status: reconciled.received,
        lead_status: None,
        attempt_count: None,
        next_eligible_at: None,
    };
    match reconciled.update {
        StatusUpdateResult::Applied(applied) => {
            report.result = "applied";
            report.call_status = applied.attempt.status;
            report.lead_status = Some(applied.lead.status);
            report.attempt_count = Some(applied.lead.attempt_count);
            report.next_eligible_at = applied.lead.next_eligible_at;
        }
        StatusUpdateResult::Corrected(attempt) => {
            report.result = "corrected";
            report.call_status = attempt.status;
        }
        StatusUpdateResult::Rejected { current } => {
            report.call_status = current;
        }
    }

    if ctx.json {
        return print_json(&report);
    }
    match report.lead_status {
        Some(lead_status) => println!(
            "{} {} call={} lead={} attempts={}",
            report.result,
            report.provider_call_id,
            report.call_status,
            lead_status,
            report.attempt_count.unwrap_or_default()
        ),
        None => println!(
            "{} {} call={}",
            report.result, report.provider_call_id, report.call_status
        ),
    }
    Ok(())
}
