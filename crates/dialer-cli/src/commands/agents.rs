use crate::commands::{print_json, Context};
use crate::util::{now_utc, parse_agent_id};
use anyhow::Result;
use clap::{ArgAction, Args, Subcommand};
use dialer_core::domain::Agent;
use dialer_store::repo::AgentNew;

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    Add(AddAgentArgs),
    List(ListAgentsArgs),
    /// Mark an agent as ready to take calls
    Available(AgentIdArgs),
    /// Stop routing new calls to an agent
    Unavailable(AgentIdArgs),
    Deactivate(AgentIdArgs),
}

#[derive(Debug, Args)]
pub struct AddAgentArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub phone: String,
    #[arg(long, action = ArgAction::SetTrue)]
    pub unavailable: bool,
}

#[derive(Debug, Args)]
pub struct ListAgentsArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    pub include_inactive: bool,
}

#[derive(Debug, Args)]
pub struct AgentIdArgs {
    pub id: String,
}

pub fn add_agent(ctx: &Context<'_>, args: AddAgentArgs) -> Result<()> {
    let agent = ctx.store.agents().create(
        now_utc(),
        AgentNew {
            name: args.name,
            phone: args.phone,
            available: !args.unavailable,
        },
    )?;
    if ctx.json {
        print_json(&agent)?;
    } else {
        println!("created {} {}", agent.id, agent.name);
    }
    Ok(())
}

pub fn list_agents(ctx: &Context<'_>, args: ListAgentsArgs) -> Result<()> {
    let agents = ctx.store.agents().list(args.include_inactive)?;
    if ctx.json {
        return print_json(&agents);
    }
    for agent in &agents {
        println!(
            "{}  {:<11}  {}  calls={} ok={} talk={}s  {}",
            agent.id,
            state_label(agent),
            agent.phone,
            agent.total_calls,
            agent.successful_calls,
            agent.total_talk_secs,
            agent.name
        );
    }
    Ok(())
}

pub fn set_available(ctx: &Context<'_>, args: AgentIdArgs, available: bool) -> Result<()> {
    let id = parse_agent_id(&args.id)?;
    let agent = ctx.store.agents().set_availability(now_utc(), id, available)?;
    if ctx.json {
        print_json(&agent)?;
    } else {
        println!("{} {} {}", state_label(&agent), agent.id, agent.name);
    }
    Ok(())
}

pub fn deactivate_agent(ctx: &Context<'_>, args: AgentIdArgs) -> Result<()> {
    let id = parse_agent_id(&args.id)?;
    let agent = ctx.store.agents().set_active(now_utc(), id, false)?;
    if ctx.json {
        print_json(&agent)?;
    } else {
        println!("deactivated {} {}", agent.id, agent.name);
    }
    Ok(())
}

fn state_label(agent: &Agent) -> &'static str {
    if !agent.active {
        "inactive"
    } else if agent.on_call {
        "on-call"
    } else if agent.available {
        "available"
    } else {
        "unavailable"
    }
}
