use anyhow::Result;
use async_trait::async_trait;

use crate::types::ContractData;

/// Pull source for the farm contract's current state.
///
/// Called once per poll tick. Missing `block`/`pail` data is reported as
/// `None` fields, not as an error.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Human-readable source name for logging.
    fn name(&self) -> &'static str;

    /// Current round index, block and this farmer's pail.
    async fn contract_data(&self, farmer: &str) -> Result<ContractData>;
}
