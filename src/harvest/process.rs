use std::process::Stdio;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, span, warn, Instrument, Level};

use crate::error::FarmError;
use crate::traits::HarvestLauncher;
use crate::types::RoundIndex;

/// Runs the harvest program as an independent process per launch.
///
/// Its stdout is a message stream that is only logged. Nothing is ever read
/// back for control.
pub struct ProcessHarvester {
    argv: Vec<String>,
}

impl ProcessHarvester {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(FarmError::EmptyCommand.into());
        }
        Ok(Self { argv })
    }
}

impl HarvestLauncher for ProcessHarvester {
    fn name(&self) -> &'static str {
        "process-harvester"
    }

    fn launch(&self, round: RoundIndex) -> Result<()> {
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdout = child.stdout.take().ok_or(FarmError::MissingStdout)?;

        info!("Harvest launched during round {}", round);

        let span = span!(Level::INFO, "harvest_task", round);
        tokio::spawn(
            async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => info!("harvest: {}", line),
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Harvest output unreadable: {}", e);
                            break;
                        }
                    }
                }

                match child.wait().await {
                    Ok(status) => info!("Harvest exited with {}", status),
                    Err(e) => warn!("Harvest wait failed: {}", e),
                }
            }
            .instrument(span),
        );

        Ok(())
    }
}
