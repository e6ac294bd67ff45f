use crate::error::invalid_input;
use anyhow::{Context as _, Result};
use clap::{ArgAction, Args};
use dialer_config::AppConfig;
use dialer_core::time::SystemClock;
use dialer_engine::{
    spawn, CallbackTargets, Dispatcher, DispatcherHandle, DispatcherSettings, HttpGateway,
    LifecycleEvent, RuntimeSettings,
};
use dialer_store::repo::StuckThresholds;
use dialer_store::Store;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Start without placing calls until resumed
    #[arg(long, action = ArgAction::SetTrue)]
    pub paused: bool,
    /// Read provider status callbacks as JSON lines from stdin
    #[arg(long, action = ArgAction::SetTrue)]
    pub callbacks_from_stdin: bool,
}

/// One status callback line, e.g.
/// `{"provider_call_id":"CA123","status":"completed","duration":42}`.
#[derive(Debug, Deserialize)]
struct CallbackLine {
    #[serde(alias = "call_id", alias = "sid")]
    provider_call_id: String,
    #[serde(alias = "call_status")]
    status: String,
    #[serde(default, alias = "duration_secs")]
    duration: Option<i64>,
}

pub fn run(store: Store, config: &AppConfig, json: bool, args: RunArgs) -> Result<()> {
    let gateway = build_gateway(config)?;
    let callbacks = match &config.telephony.callback_base_url {
        Some(base) => CallbackTargets::from_base(base)
            .with_context(|| format!("derive callback urls from {base}"))?,
        None => {
            warn!("telephony.callback_base_url is not set; providers will not report call status");
            CallbackTargets::default()
        }
    };
    let settings = DispatcherSettings {
        concurrency_limit: config.dispatcher.concurrency_limit,
        stuck: StuckThresholds {
            calling_secs: config.dispatcher.stuck_threshold_secs,
            answered_secs: config.dispatcher.answered_stuck_threshold_secs,
        },
        retry: config.retry,
        from_number: config.telephony.from_number.clone(),
        callbacks,
        ring_timeout_secs: config.telephony.ring_timeout_secs,
    };
    let runtime_settings = RuntimeSettings {
        tick_interval: Duration::from_secs(config.dispatcher.tick_interval_secs),
        recovery_interval: config
            .dispatcher
            .recovery_interval_secs
            .map(Duration::from_secs),
        recover_on_start: true,
    };

    let runtime = Runtime::new().with_context(|| "start async runtime")?;
    runtime.block_on(async move {
        let mut dispatcher = Dispatcher::new(
            store,
            Arc::new(gateway),
            Arc::new(SystemClock),
            settings,
        );
        if args.paused {
            dispatcher.pause();
        }

        let cancel = CancellationToken::new();
        let (handle, task) = spawn(dispatcher, runtime_settings, cancel.clone());
        let printer = tokio::spawn(print_events(handle.subscribe(), json));
        let reader = args
            .callbacks_from_stdin
            .then(|| tokio::spawn(read_callbacks(handle.clone())));

        tokio::signal::ctrl_c()
            .await
            .with_context(|| "wait for interrupt")?;
        info!("interrupt received, stopping dispatcher");
        handle.shutdown();

        let dispatcher = task.await.with_context(|| "join dispatcher task")?;
        printer.abort();
        if let Some(reader) = reader {
            reader.abort();
        }
        let status = dispatcher.status();
        if status.active_count > 0 {
            warn!(
                active_count = status.active_count,
                "calls still in flight; they reconcile on the next run or via reset-stuck"
            );
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn build_gateway(config: &AppConfig) -> Result<HttpGateway> {
    let endpoint = config
        .telephony
        .endpoint
        .clone()
        .ok_or_else(|| invalid_input("telephony.endpoint must be set to run the dispatcher"))?;
    let token = std::env::var(&config.telephony.auth_token_env)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if token.is_none() {
        warn!(
            env = %config.telephony.auth_token_env,
            "no telephony token set; placing calls without authorization"
        );
    }
    Ok(HttpGateway::new(endpoint, token)?)
}

async fn print_events(mut events: broadcast::Receiver<LifecycleEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(err) => warn!(error = %err, "failed to encode event"),
                    }
                } else {
                    println!(
                        "{:?} lead={} attempt={} status={}",
                        event.kind, event.lead_id, event.call_attempt_id, event.status
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn read_callbacks(handle: DispatcherHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read callbacks from stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let callback: CallbackLine = match serde_json::from_str(&line) {
            Ok(callback) => callback,
            Err(err) => {
                warn!(error = %err, "skipping malformed callback line");
                continue;
            }
        };
        // Failures are logged by the dispatcher.
        if let Err(err) = handle
            .apply_outcome(callback.provider_call_id, callback.status, callback.duration)
            .await
        {
            if matches!(err, dialer_engine::EngineError::Stopped) {
                break;
            }
        }
    }
    info!("callback input closed");
}
