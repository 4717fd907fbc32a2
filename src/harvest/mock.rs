use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::traits::HarvestLauncher;
use crate::types::RoundIndex;

/// Mock harvester for testing. Records the rounds it was launched in.
#[derive(Clone, Default)]
pub struct MockHarvester {
    pub launched: Arc<Mutex<Vec<RoundIndex>>>,
}

impl MockHarvester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_launched(&self) -> Vec<RoundIndex> {
        self.launched.lock().unwrap().clone()
    }
}

impl HarvestLauncher for MockHarvester {
    fn name(&self) -> &'static str {
        "mock-harvester"
    }

    fn launch(&self, round: RoundIndex) -> Result<()> {
        self.launched.lock().unwrap().push(round);
        Ok(())
    }
}
