use crate::commands::{print_json, Context};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct StatsReport {
    leads: BTreeMap<&'static str, i64>,
    calls: CallsReport,
    selectable_agents: i64,
}

#[derive(Debug, Serialize)]
struct CallsReport {
    total: i64,
    by_status: BTreeMap<&'static str, i64>,
    average_talk_secs: Option<f64>,
}

pub fn show_stats(ctx: &Context<'_>) -> Result<()> {
    let leads = ctx
        .store
        .leads()
        .count_by_status()?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();
    let calls = ctx.store.call_attempts().stats()?;
    let report = StatsReport {
        leads,
        calls: CallsReport {
            total: calls.total,
            by_status: calls
                .by_status
                .into_iter()
                .map(|(status, count)| (status.as_str(), count))
                .collect(),
            average_talk_secs: calls.average_talk_secs,
        },
        selectable_agents: ctx.store.agents().count_selectable()?,
    };

    if ctx.json {
        return print_json(&report);
    }

    println!("leads:");
    for (status, count) in &report.leads {
        println!("  {status}: {count}");
    }
    println!("calls: {}", report.calls.total);
    for (status, count) in &report.calls.by_status {
        println!("  {status}: {count}");
    }
    if let Some(average) = report.calls.average_talk_secs {
        println!("average talk time: {average:.1}s");
    }
    println!("selectable agents: {}", report.selectable_agents);
    Ok(())
}
