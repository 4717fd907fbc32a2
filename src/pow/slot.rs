use std::sync::{Arc, Mutex, MutexGuard};

use tokio::process::Child;
use tracing::{info, warn};

use crate::types::RoundIndex;

#[derive(Default)]
struct SlotState {
    bound: Option<RoundIndex>,
    running: Option<(RoundIndex, Child)>,
}

/// The single proof-of-work process handle.
///
/// The slot is bound to one round index at a time. Rebinding kills whatever
/// is running, and a process can only be installed for the bound index, so a
/// handle never outlives its round.
#[derive(Clone, Default)]
pub struct ProcessSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl ProcessSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind the slot to `index`, terminating any running process.
    /// Returns true when a process was terminated.
    pub fn bind(&self, index: RoundIndex) -> bool {
        let mut state = self.lock();
        state.bound = Some(index);
        match state.running.take() {
            Some((old, child)) => {
                kill(old, child);
                true
            }
            None => false,
        }
    }

    pub fn bound_index(&self) -> Option<RoundIndex> {
        self.lock().bound
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Hand a freshly spawned process to the slot. Refused (and the child
    /// handed back) when the slot is bound to another round or already busy.
    pub fn install(&self, index: RoundIndex, child: Child) -> Result<(), Child> {
        let mut state = self.lock();
        if state.bound != Some(index) || state.running.is_some() {
            return Err(child);
        }
        state.running = Some((index, child));
        Ok(())
    }

    /// Take the process back after its output ended. `None` means it was
    /// terminated by a rebind in the meantime.
    pub fn release(&self, index: RoundIndex) -> Option<Child> {
        let mut state = self.lock();
        match &state.running {
            Some((running, _)) if *running == index => state.running.take().map(|(_, child)| child),
            _ => None,
        }
    }

    /// Kill any running process without rebinding. Used on shutdown.
    pub fn terminate(&self) -> bool {
        match self.lock().running.take() {
            Some((index, child)) => {
                kill(index, child);
                true
            }
            None => false,
        }
    }
}

fn kill(index: RoundIndex, mut child: Child) {
    match child.start_kill() {
        Ok(()) => info!("Terminated pow process for round {}", index),
        Err(e) => warn!("Failed to terminate pow process for round {}: {}", index, e),
    }
}
