use crate::dispatcher::{Dispatcher, DispatcherStatus, TickOutcome};
use crate::error::{EngineError, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::reconciler::{ConnectInstructions, Reconciled};
use dialer_store::repo::RecoveredLead;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub tick_interval: Duration,
    /// `None` limits recovery to startup and explicit requests.
    pub recovery_interval: Option<Duration>,
    pub recover_on_start: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            recovery_interval: Some(Duration::from_secs(60)),
            recover_on_start: true,
        }
    }
}

enum Command {
    Pause(oneshot::Sender<DispatcherStatus>),
    Resume(oneshot::Sender<DispatcherStatus>),
    Status(oneshot::Sender<DispatcherStatus>),
    ResetStuck(oneshot::Sender<Result<Vec<RecoveredLead>>>),
    ApplyOutcome {
        provider_call_id: String,
        provider_status: String,
        duration_secs: Option<i64>,
        reply: oneshot::Sender<Result<Reconciled>>,
    },
    ConnectInstructions {
        provider_call_id: String,
        reply: oneshot::Sender<Result<ConnectInstructions>>,
    },
}

/// Cloneable front door to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::Sender<Command>,
    events: EventBus,
    cancel: CancellationToken,
}

impl DispatcherHandle {
    pub async fn pause(&self) -> Result<DispatcherStatus> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<DispatcherStatus> {
        self.request(Command::Resume).await
    }

    pub async fn status(&self) -> Result<DispatcherStatus> {
        self.request(Command::Status).await
    }

    pub async fn reset_stuck_leads(&self) -> Result<Vec<RecoveredLead>> {
        self.request(Command::ResetStuck).await?
    }

    pub async fn apply_outcome(
        &self,
        provider_call_id: impl Into<String>,
        provider_status: impl Into<String>,
        duration_secs: Option<i64>,
    ) -> Result<Reconciled> {
        let provider_call_id = provider_call_id.into();
        let provider_status = provider_status.into();
        self.request(|reply| Command::ApplyOutcome {
            provider_call_id,
            provider_status,
            duration_secs,
            reply,
        })
        .await?
    }

    pub async fn connect_instructions(
        &self,
        provider_call_id: impl Into<String>,
    ) -> Result<ConnectInstructions> {
        let provider_call_id = provider_call_id.into();
        self.request(|reply| Command::ConnectInstructions {
            provider_call_id,
            reply,
        })
        .await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, receive) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| EngineError::Stopped)?;
        receive.await.map_err(|_| EngineError::Stopped)
    }
}

/// Runs the dispatcher on its own task until `cancel` fires. The task hands
/// the dispatcher back when it stops.
pub fn spawn(
    dispatcher: Dispatcher,
    settings: RuntimeSettings,
    cancel: CancellationToken,
) -> (DispatcherHandle, JoinHandle<Dispatcher>) {
    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let handle = DispatcherHandle {
        commands,
        events: dispatcher.events().clone(),
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(run(dispatcher, settings, receiver, cancel));
    (handle, task)
}

async fn run(
    mut dispatcher: Dispatcher,
    settings: RuntimeSettings,
    mut commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) -> Dispatcher {
    if settings.recover_on_start {
        recover(&mut dispatcher);
    }

    let mut ticker = time::interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut recovery = settings.recovery_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    info!(
        tick_interval_ms = settings.tick_interval.as_millis() as u64,
        concurrency_limit = dispatcher.status().concurrency_limit,
        "dispatcher started"
    );

    loop {
        // Control and callbacks go ahead of new placements.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut dispatcher, command),
                None => break,
            },
            _ = next_recovery(&mut recovery) => recover(&mut dispatcher),
            _ = ticker.tick() => {
                if dispatcher.is_running() {
                    log_tick(dispatcher.tick().await);
                }
            }
        }
    }

    info!(
        active_count = dispatcher.status().active_count,
        "dispatcher stopped"
    );
    dispatcher
}

fn handle_command(dispatcher: &mut Dispatcher, command: Command) {
    // A dropped reply receiver only means the caller went away.
    match command {
        Command::Pause(reply) => {
            let _ = reply.send(dispatcher.pause());
        }
        Command::Resume(reply) => {
            let _ = reply.send(dispatcher.resume());
        }
        Command::Status(reply) => {
            let _ = reply.send(dispatcher.status());
        }
        Command::ResetStuck(reply) => {
            let _ = reply.send(dispatcher.reset_stuck_leads());
        }
        Command::ApplyOutcome {
            provider_call_id,
            provider_status,
            duration_secs,
            reply,
        } => {
            let result =
                dispatcher.apply_outcome(&provider_call_id, &provider_status, duration_secs);
            if let Err(err) = &result {
                warn!(provider_call_id = %provider_call_id, error = %err, "call status rejected");
            }
            let _ = reply.send(result);
        }
        Command::ConnectInstructions {
            provider_call_id,
            reply,
        } => {
            let _ = reply.send(dispatcher.connect_instructions(&provider_call_id));
        }
    }
}

async fn next_recovery(recovery: &mut Option<Interval>) {
    match recovery {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn recover(dispatcher: &mut Dispatcher) {
    match dispatcher.reset_stuck_leads() {
        Ok(recovered) if !recovered.is_empty() => {
            info!(count = recovered.len(), "recovered stuck leads");
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "stuck-lead recovery failed"),
    }
}

fn log_tick(outcome: Result<TickOutcome>) {
    match outcome {
        Ok(TickOutcome::Placed { .. }) | Ok(TickOutcome::PlacementFailed { .. }) => {}
        Ok(other) => debug!(outcome = ?other, "tick idle"),
        Err(err) => error!(error = %err, "dispatch tick failed"),
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
