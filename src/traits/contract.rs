use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Hash32, SimulatedCall, Submission};

/// Builds, simulates, signs and submits farm contract calls.
///
/// Simulation never commits anything; a failed simulation comes back as
/// `Ok` with `Simulation::Error` so the caller can inspect the protocol error.
/// `Err` is reserved for transport failures.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Human-readable caller name for logging.
    fn name(&self) -> &'static str;

    async fn plant(&self, farmer: &str, amount: i128) -> Result<SimulatedCall>;

    async fn work(&self, farmer: &str, hash: &Hash32, nonce: u64) -> Result<SimulatedCall>;

    /// Attach the farmer's authorization signatures to a simulated call.
    async fn sign_auth_entries(&self, farmer: &str, call: SimulatedCall) -> Result<SimulatedCall>;

    async fn send(&self, call: &SimulatedCall) -> Result<Submission>;
}
