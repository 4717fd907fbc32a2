//! Round synchronization state machine.
//!
//! Pure decision logic: `evaluate` turns a chain snapshot into actions and
//! `apply` folds task results back in. No IO happens here.

use tracing::{debug, info, warn};

use crate::config::{FarmerConfig, Timings};
use crate::error::FarmError;
use crate::types::{Hash32, Millis, RoundIndex, RoundSnapshot};

/// Per-round flags. One instance lives for the whole process and is reset on
/// every round-index change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundState {
    pub current_index: Option<RoundIndex>,
    pub planted: bool,
    pub worked: bool,
    pub harvested: bool,
    /// Set only by a plant this process saw accepted in the current round.
    pub planted_at: Option<Millis>,
    pub error_count: u32,
    /// Round a plant is in flight for.
    pub planting: Option<RoundIndex>,
    /// Round a boot cycle is running for.
    pub booting: Option<RoundIndex>,
}

impl RoundState {
    pub fn is_planting(&self) -> bool {
        self.planting.is_some()
    }

    pub fn is_booting(&self) -> bool {
        self.booting.is_some()
    }
}

/// Knobs the state machine decides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachinePolicy {
    pub timings: Timings,
    pub stake_amount: i128,
    pub preemptive_fall_through: bool,
}

impl Default for MachinePolicy {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            stake_amount: 0,
            preemptive_fall_through: false,
        }
    }
}

impl From<&FarmerConfig> for MachinePolicy {
    fn from(config: &FarmerConfig) -> Self {
        Self {
            timings: config.timings,
            stake_amount: config.stake_amount,
            preemptive_fall_through: config.preemptive_fall_through,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlantRequest {
    pub index: RoundIndex,
    pub amount: i128,
}

/// Everything a boot cycle needs, captured when the cycle is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootPlan {
    pub index: RoundIndex,
    pub entropy: Hash32,
    /// Stake to plant first; `None` when the round is already planted.
    pub plant: Option<i128>,
    pub worked: bool,
    pub planted_at: Option<Millis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Error ceiling exceeded; the process must exit.
    Abort { errors: u32, ceiling: u32 },
    PreemptivePlant(PlantRequest),
    /// New round: terminate the pow process and bind the slot to `index`.
    BindRound { index: RoundIndex },
    LaunchHarvest { index: RoundIndex },
    Boot(BootPlan),
}

/// Result reported by a plant or boot task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundEvent {
    pub index: RoundIndex,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Plant accepted (`at` set) or already planted (`at` empty).
    Planted { at: Option<Millis> },
    Worked,
    Failed { reason: String },
    /// The plant step finished, whatever its outcome.
    PlantSettled,
    /// The boot cycle finished, whatever its outcome.
    BootSettled,
}

impl RoundEvent {
    pub fn new(index: RoundIndex, kind: EventKind) -> Self {
        Self { index, kind }
    }

    pub fn failed(index: RoundIndex, reason: impl Into<String>) -> Self {
        Self::new(
            index,
            EventKind::Failed {
                reason: reason.into(),
            },
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoundStateMachine {
    policy: MachinePolicy,
    state: RoundState,
}

impl RoundStateMachine {
    pub fn new(policy: MachinePolicy) -> Self {
        Self {
            policy,
            state: RoundState::default(),
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// No stake while the round has seen errors.
    pub fn stake_amount(&self) -> i128 {
        if self.state.error_count > 0 {
            0
        } else {
            self.policy.stake_amount
        }
    }

    /// Decide what to do for one poll tick.
    ///
    /// At most one of pre-emptive plant, round transition, harvest is chosen,
    /// then the boot check runs unless a pre-emptive plant ended the tick.
    pub fn evaluate(&mut self, snapshot: &RoundSnapshot, now: Millis, process_running: bool) -> Vec<Action> {
        let timings = self.policy.timings;
        let mut actions = Vec::new();
        let mut process_running = process_running;

        if self.state.error_count > timings.max_errors {
            warn!("Too many errors ({}), exiting", self.state.error_count);
            actions.push(Action::Abort {
                errors: self.state.error_count,
                ceiling: timings.max_errors,
            });
            return actions;
        }

        let elapsed = snapshot.elapsed(now);

        if !self.state.is_planting() && elapsed >= timings.preemptive_plant_after_ms {
            info!("Preemptive planting in round {}", snapshot.index);
            self.state.planting = Some(snapshot.index);
            actions.push(Action::PreemptivePlant(PlantRequest {
                index: snapshot.index,
                amount: self.stake_amount(),
            }));
            if !self.policy.preemptive_fall_through {
                return actions;
            }
        } else if self.state.current_index != Some(snapshot.index) {
            self.transition(snapshot);
            process_running = false;
            actions.push(Action::BindRound {
                index: snapshot.index,
            });
        } else if !self.state.harvested && elapsed >= timings.harvest_after_ms {
            self.state.harvested = true;
            actions.push(Action::LaunchHarvest {
                index: snapshot.index,
            });
        } else {
            let minutes = elapsed / 60_000;
            let seconds = (elapsed % 60_000) / 1_000;
            info!("Running... {}m {}s", minutes, seconds);
        }

        if let Some(plan) = self.boot_plan(snapshot, process_running) {
            self.state.booting = Some(plan.index);
            if plan.plant.is_some() {
                self.state.planting = Some(plan.index);
            }
            actions.push(Action::Boot(plan));
        }

        actions
    }

    fn boot_plan(&self, snapshot: &RoundSnapshot, process_running: bool) -> Option<BootPlan> {
        let state = &self.state;
        if state.is_booting() || process_running || (state.planted && state.worked) {
            return None;
        }
        // a boot that must plant waits for any plant already in flight
        if !state.planted && state.is_planting() {
            return None;
        }

        Some(BootPlan {
            index: snapshot.index,
            entropy: snapshot.entropy,
            plant: (!state.planted).then(|| self.stake_amount()),
            worked: state.worked,
            planted_at: state.planted_at,
        })
    }

    fn transition(&mut self, snapshot: &RoundSnapshot) {
        info!(
            "Round {} started at {} (entropy {})",
            snapshot.index,
            snapshot.round_started_at,
            snapshot.entropy_hex()
        );

        let state = &mut self.state;
        state.current_index = Some(snapshot.index);
        state.planted = snapshot.pail_planted();
        state.worked = snapshot.pail_worked();
        state.harvested = false;
        state.error_count = 0;
        state.planted_at = None;

        // guards taken for a past round are void, whether or not their
        // settle event ever arrives
        if state.planting.map_or(false, |i| i != snapshot.index) {
            debug!("Releasing plant guard of round {:?}", state.planting);
            state.planting = None;
        }
        if state.booting.map_or(false, |i| i != snapshot.index) {
            debug!("Releasing boot guard of round {:?}", state.booting);
            state.booting = None;
        }
    }

    /// Fold a task result into the round state. A settle event releases the
    /// guard only if it was taken for the same round; anything else from a
    /// past round is dropped.
    pub fn apply(&mut self, event: RoundEvent) {
        match event.kind {
            EventKind::PlantSettled => {
                if self.state.planting == Some(event.index) {
                    self.state.planting = None;
                }
                return;
            }
            EventKind::BootSettled => {
                if self.state.booting == Some(event.index) {
                    self.state.booting = None;
                }
                return;
            }
            _ => {}
        }

        if self.state.current_index != Some(event.index) {
            debug!("Dropping result for past round {}: {:?}", event.index, event.kind);
            return;
        }

        match event.kind {
            EventKind::Planted { at } => {
                self.state.planted = true;
                if at.is_some() {
                    self.state.planted_at = at;
                }
            }
            EventKind::Worked => self.state.worked = true,
            EventKind::Failed { reason } => self.record_error(&reason),
            EventKind::PlantSettled | EventKind::BootSettled => {}
        }
    }

    /// Count a recoverable error against the current round.
    pub fn record_error(&mut self, reason: &str) {
        self.state.error_count = self.state.error_count.saturating_add(1);
        warn!("Error {} this round: {}", self.state.error_count, reason);
    }

    pub fn check_ceiling(&self) -> Result<(), FarmError> {
        let ceiling = self.policy.timings.max_errors;
        if self.state.error_count > ceiling {
            return Err(FarmError::TooManyErrors {
                errors: self.state.error_count,
                ceiling,
            });
        }
        Ok(())
    }
}
