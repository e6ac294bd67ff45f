use crate::commands::{print_json, Context};
use crate::error::{invalid_input, not_found};
use crate::util::{
    format_optional_timestamp, format_timestamp_datetime, now_utc, parse_lead_id,
    parse_local_timestamp,
};
use anyhow::Result;
use clap::{ArgAction, Args, Subcommand};
use dialer_core::domain::{CallAttempt, Lead, LeadPriority, LeadStatus};
use dialer_store::repo::{LeadFilter, LeadNew, LeadUpdate};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Subcommand)]
pub enum LeadCommand {
    Add(AddLeadArgs),
    List(ListLeadsArgs),
    Show(ShowLeadArgs),
    Edit(EditLeadArgs),
    Retire(RetireLeadArgs),
}

#[derive(Debug, Args)]
pub struct AddLeadArgs {
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub name: Option<String>,
    /// low, medium, high or urgent
    #[arg(long, default_value = "medium")]
    pub priority: String,
    #[arg(long)]
    pub notes: Option<String>,
    /// Earliest local time the lead may be dialed
    #[arg(long)]
    pub not_before: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListLeadsArgs {
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    pub include_retired: bool,
    #[arg(long)]
    pub limit: Option<i64>,
}

#[derive(Debug, Args)]
pub struct ShowLeadArgs {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct EditLeadArgs {
    pub id: String,
    /// Empty clears the name
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    /// Empty clears the notes
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, conflicts_with = "clear_not_before")]
    pub not_before: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    pub clear_not_before: bool,
}

#[derive(Debug, Args)]
pub struct RetireLeadArgs {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct LeadDetail {
    #[serde(flatten)]
    lead: Lead,
    call_attempts: Vec<CallAttempt>,
}

pub fn add_lead(ctx: &Context<'_>, args: AddLeadArgs) -> Result<()> {
    let next_eligible_at = match args.not_before {
        Some(value) => Some(parse_local_timestamp(&value)?),
        None => None,
    };
    let lead = ctx.store.leads().create(
        now_utc(),
        LeadNew {
            phone: args.phone,
            name: args.name,
            priority: LeadPriority::from_str(&args.priority)?,
            notes: args.notes,
            next_eligible_at,
        },
    )?;

    if ctx.json {
        print_json(&lead)?;
    } else {
        println!("created {} {}", lead.id, lead.phone);
    }
    Ok(())
}

pub fn list_leads(ctx: &Context<'_>, args: ListLeadsArgs) -> Result<()> {
    if matches!(args.limit, Some(limit) if limit <= 0) {
        return Err(invalid_input("limit must be positive"));
    }
    let status = match args.status {
        Some(raw) => Some(LeadStatus::from_str(&raw)?),
        None => None,
    };
    let leads = ctx.store.leads().list(&LeadFilter {
        status,
        include_retired: args.include_retired,
        limit: args.limit,
    })?;

    if ctx.json {
        return print_json(&leads);
    }
    for lead in &leads {
        println!(
            "{}  {:<6}  {:<9}  {}  attempts={}  next={}{}{}",
            lead.id,
            lead.priority.as_str(),
            lead.status.as_str(),
            lead.phone,
            lead.attempt_count,
            format_optional_timestamp(lead.next_eligible_at),
            lead.name
                .as_deref()
                .map(|name| format!("  {name}"))
                .unwrap_or_default(),
            if lead.active { "" } else { "  (retired)" },
        );
    }
    Ok(())
}

pub fn show_lead(ctx: &Context<'_>, args: ShowLeadArgs) -> Result<()> {
    let id = parse_lead_id(&args.id)?;
    let lead = ctx
        .store
        .leads()
        .get(id)?
        .ok_or_else(|| not_found("lead not found"))?;
    let call_attempts = ctx.store.call_attempts().list_for_lead(id)?;

    if ctx.json {
        return print_json(&LeadDetail {
            lead,
            call_attempts,
        });
    }

    println!("id: {}", lead.id);
    println!("phone: {}", lead.phone);
    if let Some(name) = &lead.name {
        println!("name: {name}");
    }
    println!("priority: {}", lead.priority);
    println!("status: {}", lead.status);
    println!("active: {}", lead.active);
    println!("attempts: {}", lead.attempt_count);
    println!(
        "next eligible: {}",
        format_optional_timestamp(lead.next_eligible_at)
    );
    if let Some(agent_id) = lead.assigned_agent_id {
        println!("agent: {agent_id}");
    }
    if let Some(notes) = &lead.notes {
        println!("notes: {notes}");
    }
    if !lead.attempt_history.is_empty() {
        println!("history:");
        for record in &lead.attempt_history {
            println!(
                "  #{} {} {}{}",
                record.attempt_number,
                format_timestamp_datetime(record.occurred_at),
                record.outcome,
                record
                    .duration_secs
                    .map(|secs| format!(" {secs}s"))
                    .unwrap_or_default(),
            );
        }
    }
    Ok(())
}

pub fn edit_lead(ctx: &Context<'_>, args: EditLeadArgs) -> Result<()> {
    let id = parse_lead_id(&args.id)?;

    let mut update = LeadUpdate::default();
    if let Some(name) = args.name {
        update.name = Some(Some(name));
    }
    if let Some(priority) = args.priority {
        update.priority = Some(LeadPriority::from_str(&priority)?);
    }
    if let Some(notes) = args.notes {
        update.notes = Some(Some(notes));
    }
    if let Some(value) = args.not_before {
        update.next_eligible_at = Some(Some(parse_local_timestamp(&value)?));
    } else if args.clear_not_before {
        update.next_eligible_at = Some(None);
    }

    if update.name.is_none()
        && update.priority.is_none()
        && update.notes.is_none()
        && update.next_eligible_at.is_none()
    {
        return Err(invalid_input("no updates provided"));
    }

    let lead = ctx.store.leads().update(now_utc(), id, update)?;
    if ctx.json {
        print_json(&lead)?;
    } else {
        println!("updated {} {}", lead.id, lead.phone);
    }
    Ok(())
}

pub fn retire_lead(ctx: &Context<'_>, args: RetireLeadArgs) -> Result<()> {
    let id = parse_lead_id(&args.id)?;
    let lead = ctx.store.leads().retire(now_utc(), id)?;
    if ctx.json {
        print_json(&lead)?;
    } else {
        println!("retired {} {}", lead.id, lead.phone);
    }
    Ok(())
}
