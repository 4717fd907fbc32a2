use anyhow::Result;

use super::mock::MockHarvester;
use super::noop::NoopHarvester;
use super::process::ProcessHarvester;
use crate::traits::HarvestLauncher;
use crate::types::RoundIndex;

/// Enum representing all harvest launcher implementations.
pub enum HarvestVariant {
    Process(ProcessHarvester),
    Noop(NoopHarvester),
    Mock(MockHarvester),
}

impl HarvestVariant {
    /// Process harvester for a configured command line, noop otherwise.
    pub fn from_argv(argv: Option<Vec<String>>) -> Result<Self> {
        match argv {
            Some(argv) => Ok(HarvestVariant::Process(ProcessHarvester::new(argv)?)),
            None => Ok(HarvestVariant::Noop(NoopHarvester)),
        }
    }
}

impl HarvestLauncher for HarvestVariant {
    fn name(&self) -> &'static str {
        match self {
            HarvestVariant::Process(inner) => inner.name(),
            HarvestVariant::Noop(inner) => inner.name(),
            HarvestVariant::Mock(inner) => inner.name(),
        }
    }

    fn launch(&self, round: RoundIndex) -> Result<()> {
        match self {
            HarvestVariant::Process(inner) => inner.launch(round),
            HarvestVariant::Noop(inner) => inner.launch(round),
            HarvestVariant::Mock(inner) => inner.launch(round),
        }
    }
}
