use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::chain::ChainVariant;
use crate::config::ProtocolErrorCodes;
use crate::traits::ContractCaller;
use crate::types::{ProtocolError, Solution, Submission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlantOutcome {
    Planted,
    AlreadyPlanted,
    Rejected(ProtocolError),
    NotAccepted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Worked,
    AlreadyWorked,
    /// Work landed too close to the plant; the work delay needs raising.
    GapTooLow(ProtocolError),
    Rejected(ProtocolError),
    NotAccepted(String),
}

/// Issues plant and work calls and classifies simulation errors.
pub struct ActionExecutor {
    contract: Arc<ChainVariant>,
    farmer: String,
    codes: ProtocolErrorCodes,
}

impl ActionExecutor {
    pub fn new(contract: Arc<ChainVariant>, farmer: impl Into<String>, codes: ProtocolErrorCodes) -> Self {
        Self {
            contract,
            farmer: farmer.into(),
            codes,
        }
    }

    /// Simulate, sign and submit a plant of `amount`.
    pub async fn plant(&self, amount: i128) -> Result<PlantOutcome> {
        let call = self.contract.plant(&self.farmer, amount).await?;

        if let Some(err) = call.protocol_error() {
            if err.is_one_of(&self.codes.already_planted_codes) {
                info!("Already planted");
                return Ok(PlantOutcome::AlreadyPlanted);
            }
            error!("Plant error: {}", err);
            return Ok(PlantOutcome::Rejected(err));
        }

        let signed = self.contract.sign_auth_entries(&self.farmer, call).await?;
        let submission = self.contract.send(&signed).await?;
        if !submission.is_accepted() {
            return Ok(PlantOutcome::NotAccepted(describe(&submission)));
        }

        info!("Successfully planted {}", amount);
        Ok(PlantOutcome::Planted)
    }

    /// Simulate and submit a work solution.
    pub async fn work(&self, solution: &Solution) -> Result<WorkOutcome> {
        let call = self
            .contract
            .work(&self.farmer, &solution.hash, solution.nonce)
            .await?;

        if let Some(err) = call.protocol_error() {
            if err.is_one_of(&self.codes.already_worked_codes) {
                info!("Already worked");
                return Ok(WorkOutcome::AlreadyWorked);
            }
            if err.is_one_of(&self.codes.gap_too_low_codes) {
                error!("Work submitted too soon after plant: {}", err);
                return Ok(WorkOutcome::GapTooLow(err));
            }
            error!("Work error: {}", err);
            return Ok(WorkOutcome::Rejected(err));
        }

        let submission = self.contract.send(&call).await?;
        if !submission.is_accepted() {
            return Ok(WorkOutcome::NotAccepted(describe(&submission)));
        }

        info!(
            "Successfully worked nonce {} with {} zeros",
            solution.nonce, solution.zeros
        );
        Ok(WorkOutcome::Worked)
    }
}

fn describe(submission: &Submission) -> String {
    format!(
        "submission {} ({})",
        submission.status,
        submission.hash.as_deref().unwrap_or("no hash")
    )
}
