use anyhow::Result;

use crate::traits::HarvestLauncher;
use crate::types::RoundIndex;

/// Harvester used when no harvest program is configured.
pub struct NoopHarvester;

impl HarvestLauncher for NoopHarvester {
    fn name(&self) -> &'static str {
        "noop-harvester"
    }

    fn launch(&self, round: RoundIndex) -> Result<()> {
        tracing::debug!("NoopHarvester: skipping harvest for round {}", round);
        Ok(())
    }
}
