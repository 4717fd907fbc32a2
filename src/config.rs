use std::time::Duration;

use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

use crate::error::FarmError;

/// Farmer configuration, read from CLI flags or the environment.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "farmhand", about = "Plants, works and harvests farm rounds")]
pub struct FarmerConfig {
    /// Farmer public key (G... strkey).
    #[arg(long, env = "FARMER_PK")]
    pub farmer_pk: String,

    /// Raw ed25519 public key hex passed to the pow program.
    /// Derived from `farmer_pk` when not given.
    #[arg(long, env = "FARMER_HEX")]
    pub farmer_hex: Option<String>,

    /// Stake in base units.
    #[arg(long, env = "STAKE_AMOUNT", default_value_t = 0)]
    pub stake_amount: i128,

    /// Nonces the pow program searches per run.
    #[arg(long, env = "NONCE_COUNT", default_value_t = 10_000_000)]
    pub nonce_count: u64,

    /// Proof-of-work program.
    #[arg(long, env = "POW_BINARY", default_value = "../target/release/kale-farmer")]
    pub pow_binary: String,

    /// Harvest program and its arguments, whitespace separated.
    #[arg(long, env = "HARVEST_COMMAND")]
    pub harvest_command: Option<String>,

    /// Base URL of the chain/contract sidecar.
    #[arg(long, env = "BRIDGE_URL", default_value = "http://127.0.0.1:8787")]
    pub bridge_url: String,

    /// Keep evaluating the boot path on a tick that already planted pre-emptively.
    #[arg(long, env = "PREEMPTIVE_FALL_THROUGH", default_value_t = false)]
    pub preemptive_fall_through: bool,

    #[command(flatten)]
    #[serde(default)]
    pub timings: Timings,

    #[command(flatten)]
    #[serde(default)]
    pub codes: ProtocolErrorCodes,
}

impl FarmerConfig {
    /// Config with default timings and codes for the given farmer.
    pub fn for_farmer(farmer_pk: impl Into<String>) -> Self {
        Self {
            farmer_pk: farmer_pk.into(),
            farmer_hex: None,
            stake_amount: 0,
            nonce_count: 10_000_000,
            pow_binary: "../target/release/kale-farmer".to_string(),
            harvest_command: None,
            bridge_url: "http://127.0.0.1:8787".to_string(),
            preemptive_fall_through: false,
            timings: Timings::default(),
            codes: ProtocolErrorCodes::default(),
        }
    }

    /// Raw public key hex for the pow program.
    pub fn resolve_farmer_hex(&self) -> Result<String, FarmError> {
        if let Some(hex) = &self.farmer_hex {
            let bytes = hex::decode(hex).map_err(|e| FarmError::InvalidFarmerKey(e.to_string()))?;
            if bytes.len() != 32 {
                return Err(FarmError::InvalidFarmerKey(format!(
                    "expected 32 bytes, got {}",
                    bytes.len()
                )));
            }
            return Ok(hex.to_lowercase());
        }

        let key = stellar_strkey::ed25519::PublicKey::from_string(&self.farmer_pk)
            .map_err(|e| FarmError::InvalidFarmerKey(format!("{}: {:?}", self.farmer_pk, e)))?;
        Ok(hex::encode(key.0))
    }

    /// Harvest program split into argv, if configured.
    pub fn harvest_argv(&self) -> Option<Vec<String>> {
        self.harvest_command
            .as_deref()
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty())
    }
}

/// Protocol timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct Timings {
    /// Poll period.
    #[arg(long, default_value_t = 5_000)]
    pub poll_interval_ms: u64,

    /// Round age after which the farmer plants regardless of state.
    #[arg(long, default_value_t = 300_000)]
    pub preemptive_plant_after_ms: u64,

    /// Round age after which the harvest task is launched.
    #[arg(long, default_value_t = 60_000)]
    pub harvest_after_ms: u64,

    /// Minimum time between plant and work submission.
    #[arg(long, default_value_t = 10_000)]
    pub work_delay_ms: u64,

    /// Errors tolerated per round; one more is fatal.
    #[arg(long, default_value_t = 12)]
    pub max_errors: u32,
}

impl Timings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn work_delay(&self) -> Duration {
        Duration::from_millis(self.work_delay_ms)
    }
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            poll_interval_ms: 5_000,
            preemptive_plant_after_ms: 300_000,
            harvest_after_ms: 60_000,
            work_delay_ms: 10_000,
            max_errors: 12,
        }
    }
}

/// Contract error codes the farmer recognizes. The contract may add codes
/// over time, so each signal is a set.
#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct ProtocolErrorCodes {
    #[arg(long, value_delimiter = ',', default_values_t = [8u32])]
    pub already_planted_codes: Vec<u32>,

    #[arg(long, value_delimiter = ',', default_values_t = [7u32])]
    pub already_worked_codes: Vec<u32>,

    #[arg(long, value_delimiter = ',', default_values_t = [14u32])]
    pub gap_too_low_codes: Vec<u32>,
}

impl Default for ProtocolErrorCodes {
    fn default() -> Self {
        ProtocolErrorCodes {
            already_planted_codes: vec![8],
            already_worked_codes: vec![7],
            gap_too_low_codes: vec![14],
        }
    }
}
