use anyhow::Result;

use crate::types::RoundIndex;

/// Fire-and-forget launcher for the harvest sub-task.
///
/// `launch` only starts the work; its outcome never feeds back into the
/// caller. Must be called from within a tokio runtime.
pub trait HarvestLauncher: Send + Sync {
    /// Human-readable launcher name for logging.
    fn name(&self) -> &'static str;

    /// Start harvesting, triggered during `round`.
    fn launch(&self, round: RoundIndex) -> Result<()>;
}
