//! Poll loop and spawned plant/boot tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use kanal::{unbounded_async, AsyncReceiver, AsyncSender};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, span, warn, Instrument, Level};

use super::clock::PlantClock;
use super::core::Farmer;
use super::executor::{ActionExecutor, PlantOutcome, WorkOutcome};
use super::machine::{Action, BootPlan, EventKind, PlantRequest, RoundEvent};
use crate::error::FarmError;
use crate::pow::{ProcessSlot, ProofOfWorkRunner, RunOutcome};
use crate::traits::{ChainStateReader, HarvestLauncher};
use crate::types::{Millis, RoundSnapshot};

pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or_default()
}

impl Farmer {
    /// Run until Ctrl-C or a fatal error.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the poll loop until `shutdown` resolves or the error ceiling is hit.
    /// Any running pow process is terminated on the way out.
    ///
    /// Task results are drained at the start of each tick rather than raced
    /// in the `select!`, since an abandoned kanal receive drops its value.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let span = span!(Level::INFO, "farmer_run");
        let (events_tx, events_rx) = unbounded_async::<RoundEvent>();

        let result = async {
            info!(
                "Farming as {} (poll every {}ms)",
                self.config.farmer_pk, self.config.timings.poll_interval_ms
            );

            let mut ticker = tokio::time::interval(self.config.timings.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown requested");
                        break Ok(());
                    }
                    _ = ticker.tick() => {
                        self.drain_events(&events_rx);
                        if let Err(e) = self.tick(&events_tx).await {
                            break Err(e);
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;

        self.slot.terminate();
        result
    }

    /// Apply every task result queued so far. Returns how many were applied.
    pub fn drain_events(&mut self, events: &AsyncReceiver<RoundEvent>) -> usize {
        let mut applied = 0;
        loop {
            match events.try_recv() {
                Ok(Some(event)) => {
                    self.machine.apply(event);
                    applied += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Event channel closed: {}", e);
                    break;
                }
            }
        }
        applied
    }

    /// One poll tick: refresh chain state, evaluate, dispatch.
    pub async fn tick(&mut self, events: &AsyncSender<RoundEvent>) -> Result<()> {
        let data = match self.chain.contract_data(&self.config.farmer_pk).await {
            Ok(data) => data,
            Err(e) => {
                self.machine.record_error(&format!("contract data unavailable: {}", e));
                self.machine.check_ceiling()?;
                return Ok(());
            }
        };

        let snapshot = RoundSnapshot::from(data);
        let actions = self
            .machine
            .evaluate(&snapshot, now_millis(), self.slot.is_running());

        for action in actions {
            self.dispatch(action, events)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, action: Action, events: &AsyncSender<RoundEvent>) -> Result<()> {
        match action {
            Action::Abort { errors, ceiling } => {
                return Err(FarmError::TooManyErrors { errors, ceiling }.into());
            }
            Action::BindRound { index } => {
                if self.slot.bind(index) {
                    debug!("Previous pow process terminated for round {}", index);
                }
            }
            Action::LaunchHarvest { index } => {
                if let Err(e) = self.harvester.launch(index) {
                    warn!("Harvest launch failed: {}", e);
                }
            }
            Action::PreemptivePlant(request) => {
                let executor = Arc::clone(&self.executor);
                let clock = self.clock.clone();
                let events = events.clone();
                let span = span!(Level::INFO, "plant_task", index = request.index);
                tokio::spawn(
                    async move {
                        plant_step(&executor, &clock, request, &events).await;
                    }
                    .instrument(span),
                );
            }
            Action::Boot(plan) => {
                let executor = Arc::clone(&self.executor);
                let runner = Arc::clone(&self.runner);
                let slot = self.slot.clone();
                let clock = self.clock.clone();
                let work_delay = self.config.timings.work_delay();
                let events = events.clone();
                let span = span!(Level::INFO, "boot_task", index = plan.index);
                tokio::spawn(
                    async move {
                        let tools = BootTools {
                            executor: &executor,
                            runner: &runner,
                            slot: &slot,
                            clock: &clock,
                        };
                        if let Err(e) = boot_cycle(tools, plan, work_delay, &events).await {
                            error!("Boot error: {}", e);
                            report(&events, RoundEvent::failed(plan.index, format!("boot error: {}", e))).await;
                        }
                        report(&events, RoundEvent::new(plan.index, EventKind::BootSettled)).await;
                    }
                    .instrument(span),
                );
            }
        }
        Ok(())
    }
}

async fn report(events: &AsyncSender<RoundEvent>, event: RoundEvent) {
    if let Err(e) = events.send(event).await {
        debug!("Farmer loop is gone, result dropped: {}", e);
    }
}

/// How a plant step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantStep {
    /// `at` is empty when the chain reported the round as already planted.
    Planted { at: Option<Millis> },
    Failed,
}

/// Plant once and report the outcome, always releasing the planting guard.
pub async fn plant_step(
    executor: &ActionExecutor,
    clock: &PlantClock,
    request: PlantRequest,
    events: &AsyncSender<RoundEvent>,
) -> PlantStep {
    let index = request.index;
    let (step, event) = match executor.plant(request.amount).await {
        Ok(PlantOutcome::Planted) => {
            let at = now_millis();
            clock.record(index, at);
            (
                PlantStep::Planted { at: Some(at) },
                RoundEvent::new(index, EventKind::Planted { at: Some(at) }),
            )
        }
        Ok(PlantOutcome::AlreadyPlanted) => (
            PlantStep::Planted { at: None },
            RoundEvent::new(index, EventKind::Planted { at: None }),
        ),
        Ok(PlantOutcome::Rejected(err)) => (
            PlantStep::Failed,
            RoundEvent::failed(index, format!("plant rejected: {}", err)),
        ),
        Ok(PlantOutcome::NotAccepted(reason)) => (
            PlantStep::Failed,
            RoundEvent::failed(index, format!("plant not accepted: {}", reason)),
        ),
        Err(e) => {
            error!("Plant error: {}", e);
            (PlantStep::Failed, RoundEvent::failed(index, format!("plant failed: {}", e)))
        }
    };

    report(events, event).await;
    report(events, RoundEvent::new(index, EventKind::PlantSettled)).await;
    step
}

/// Collaborators a boot cycle borrows from the farmer.
#[derive(Clone, Copy)]
pub struct BootTools<'a> {
    pub executor: &'a ActionExecutor,
    pub runner: &'a ProofOfWorkRunner,
    pub slot: &'a ProcessSlot,
    pub clock: &'a PlantClock,
}

/// Plant if needed, run the pow program, hold the solution until the work
/// delay has passed since the latest plant, then submit it.
///
/// Empty or malformed pow output ends the cycle quietly. Spawn and read
/// failures are returned to the caller.
pub async fn boot_cycle(
    tools: BootTools<'_>,
    plan: BootPlan,
    work_delay: Duration,
    events: &AsyncSender<RoundEvent>,
) -> Result<()> {
    let BootTools {
        executor,
        runner,
        slot,
        clock,
    } = tools;
    let index = plan.index;
    let boot_started = now_millis();

    if let Some(amount) = plan.plant {
        if plant_step(executor, clock, PlantRequest { index, amount }, events).await == PlantStep::Failed {
            debug!("Plant failed, not booting pow for round {}", index);
            return Ok(());
        }
    }

    if slot.is_running() || plan.worked {
        return Ok(());
    }

    info!("Booting pow for round {}", index);
    let solution = match runner.run(index, &plan.entropy, slot).await? {
        RunOutcome::Solved(solution) => solution,
        RunOutcome::NoOutput => {
            info!("No value from pow process");
            return Ok(());
        }
        RunOutcome::Unparsable(line) => {
            info!("No value from pow process, last line: {}", line);
            return Ok(());
        }
        RunOutcome::Cancelled | RunOutcome::Superseded => return Ok(()),
    };

    info!(
        "Found nonce {} hash {} ({} zeros)",
        solution.nonce,
        solution.hash_hex(),
        solution.zeros
    );

    // a plant landing during the wait moves the window, so re-read until stable
    let anchor = || clock.latest(index).max(plan.planted_at).unwrap_or(boot_started);
    let mut waited_for = anchor();
    loop {
        wait_for_work_window(waited_for, work_delay).await;
        let latest = anchor();
        if latest == waited_for {
            break;
        }
        waited_for = latest;
    }

    if slot.bound_index() != Some(index) {
        info!("Round {} is over, dropping solution", index);
        return Ok(());
    }

    let event = match executor.work(&solution).await {
        Ok(WorkOutcome::Worked) | Ok(WorkOutcome::AlreadyWorked) => RoundEvent::new(index, EventKind::Worked),
        Ok(WorkOutcome::GapTooLow(err)) => {
            RoundEvent::failed(index, format!("gap too low, raise the work delay: {}", err))
        }
        Ok(WorkOutcome::Rejected(err)) => RoundEvent::failed(index, format!("work rejected: {}", err)),
        Ok(WorkOutcome::NotAccepted(reason)) => RoundEvent::failed(index, format!("work not accepted: {}", reason)),
        Err(e) => {
            error!("Work error: {}", e);
            RoundEvent::failed(index, format!("work failed: {}", e))
        }
    };
    report(events, event).await;

    Ok(())
}

/// Sleep until `anchor + delay` (wall clock).
async fn wait_for_work_window(anchor: Millis, delay: Duration) {
    let ready_at = anchor.saturating_add(delay.as_millis() as Millis);
    let now = now_millis();
    if ready_at > now {
        let wait = Duration::from_millis(ready_at - now);
        debug!("Holding work for {}ms after plant", wait.as_millis());
        tokio::time::sleep(wait).await;
    }
}
