use std::process::Stdio;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::output::parse_solution;
use super::slot::ProcessSlot;
use crate::error::FarmError;
use crate::types::{Hash32, RoundIndex, Solution};

/// How a pow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Solved(Solution),
    /// The process exited without writing anything.
    NoOutput,
    /// The last line was not a `[nonce, hash]` pair.
    Unparsable(String),
    /// The round moved on and the process was terminated.
    Cancelled,
    /// The slot was bound to another round before the process could be installed.
    Superseded,
}

/// Output summary. Only the last non-empty line is kept.
#[derive(Debug, Default)]
struct Capture {
    bytes: usize,
    lines: usize,
    last_line: Option<String>,
}

/// Spawns the external proof-of-work program and reads its result.
#[derive(Debug, Clone)]
pub struct ProofOfWorkRunner {
    program: String,
    farmer_hex: String,
    nonce_count: u64,
}

impl ProofOfWorkRunner {
    pub fn new(program: impl Into<String>, farmer_hex: impl Into<String>, nonce_count: u64) -> Self {
        Self {
            program: program.into(),
            farmer_hex: farmer_hex.into(),
            nonce_count,
        }
    }

    pub fn command(&self, index: RoundIndex, entropy: &Hash32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--farmer-hex")
            .arg(&self.farmer_hex)
            .arg("--index")
            .arg(index.to_string())
            .arg("--entropy-hex")
            .arg(hex::encode(entropy))
            .arg("--nonce-count")
            .arg(self.nonce_count.to_string());

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn the program for `index`, register it in `slot`, and read its
    /// output to the end.
    ///
    /// Spawn and read failures are errors. Empty or malformed output is not.
    pub async fn run(&self, index: RoundIndex, entropy: &Hash32, slot: &ProcessSlot) -> Result<RunOutcome> {
        let mut child = self.command(index, entropy).spawn()?;
        let stdout = child.stdout.take().ok_or(FarmError::MissingStdout)?;

        if let Err(mut stale) = slot.install(index, child) {
            let _ = stale.start_kill();
            debug!("Slot no longer bound to round {}, dropping pow process", index);
            return Ok(RunOutcome::Superseded);
        }
        info!("Pow process booted for round {}", index);

        let capture = match read_output(stdout).await {
            Ok(capture) => capture,
            Err(e) => {
                if let Some(mut child) = slot.release(index) {
                    let _ = child.start_kill();
                }
                return Err(e);
            }
        };

        let mut child = match slot.release(index) {
            Some(child) => child,
            None => {
                info!("Pow process for round {} was terminated", index);
                return Ok(RunOutcome::Cancelled);
            }
        };
        let status = child.wait().await?;
        debug!(
            "Pow process exited with {} after {} lines ({} bytes)",
            status, capture.lines, capture.bytes
        );

        if capture.bytes == 0 {
            return Ok(RunOutcome::NoOutput);
        }

        let last = capture.last_line.unwrap_or_default();
        match parse_solution(&last) {
            Some(solution) => Ok(RunOutcome::Solved(solution)),
            None => Ok(RunOutcome::Unparsable(last)),
        }
    }
}

async fn read_output<R>(stdout: R) -> Result<Capture>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut capture = Capture::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }
        capture.bytes += n;
        capture.lines += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if !line.is_empty() {
            debug!("pow: {}", line);
            capture.last_line = Some(line.to_string());
        }
    }

    Ok(capture)
}
