//! Farmer struct and initialization - no decision logic.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::clock::PlantClock;
use super::executor::ActionExecutor;
use super::machine::{MachinePolicy, RoundStateMachine};
use crate::chain::ChainVariant;
use crate::config::FarmerConfig;
use crate::harvest::HarvestVariant;
use crate::pow::{ProcessSlot, ProofOfWorkRunner};
use crate::traits::{ChainStateReader, HarvestLauncher};

/// Controller: owns the round state and drives one tick at a time.
pub struct Farmer {
    /// Global configuration.
    pub config: FarmerConfig,

    /// Chain state source and contract caller.
    pub chain: Arc<ChainVariant>,

    /// Harvest sub-task launcher.
    pub harvester: HarvestVariant,

    /// Plant/work calls.
    pub executor: Arc<ActionExecutor>,

    /// Pow program launcher.
    pub runner: Arc<ProofOfWorkRunner>,

    /// The single pow process handle.
    pub slot: ProcessSlot,

    /// Latest accepted plant, read by boot tasks before submitting work.
    pub clock: PlantClock,

    /// Round state, mutated only by the controller.
    pub machine: RoundStateMachine,
}

impl Farmer {
    pub fn new(config: FarmerConfig, chain: ChainVariant, harvester: HarvestVariant) -> Result<Self> {
        let farmer_hex = config.resolve_farmer_hex()?;
        let chain = Arc::new(chain);

        let executor = ActionExecutor::new(Arc::clone(&chain), config.farmer_pk.clone(), config.codes.clone());
        let runner = ProofOfWorkRunner::new(config.pow_binary.clone(), farmer_hex, config.nonce_count);
        let machine = RoundStateMachine::new(MachinePolicy::from(&config));

        Ok(Self {
            config,
            chain,
            harvester,
            executor: Arc::new(executor),
            runner: Arc::new(runner),
            slot: ProcessSlot::new(),
            clock: PlantClock::new(),
            machine,
        })
    }

    /// Farmer wired to the HTTP bridge and the configured harvest program.
    pub fn initialize(config: FarmerConfig) -> Result<Self> {
        let chain = ChainVariant::http(config.bridge_url.clone());
        let harvester = HarvestVariant::from_argv(config.harvest_argv())?;

        info!(
            "Farmer {} using chain={} harvester={}",
            config.farmer_pk,
            ChainStateReader::name(&chain),
            harvester.name()
        );

        Self::new(config, chain, harvester)
    }
}
