use serde::{Deserialize, Deserializer, Serialize};

/// Round identifier as stored by the farm contract.
pub type RoundIndex = u32;

/// 32 byte round entropy / hash values.
pub type Hash32 = [u8; 32];

/// Unix timestamp in milliseconds.
pub type Millis = u64;

// ==================== WIRE TYPES ====================

/// Raw contract state as returned by the chain collaborator.
///
/// `block` and `pail` are absent until the round has data for this farmer;
/// absence is "no data yet", never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractData {
    pub index: RoundIndex,
    #[serde(default)]
    pub block: Option<BlockInfo>,
    #[serde(default)]
    pub pail: Option<Pail>,
}

/// Round block summary. Only the fields the farmer acts on are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Hex encoded 32 byte entropy.
    #[serde(default)]
    pub entropy: Option<String>,
    /// Round start, unix seconds.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// This farmer's on-chain record for a round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pail {
    #[serde(default, rename = "stake", deserialize_with = "lenient_i128")]
    pub stake_amount: Option<i128>,
    #[serde(default)]
    pub sequence: Option<u32>,
    #[serde(default)]
    pub gap: Option<u32>,
    #[serde(default, rename = "zeros")]
    pub zero_count: Option<u32>,
}

impl Pail {
    /// A pail with a non-zero plant sequence or stake has been planted.
    pub fn planted(&self) -> bool {
        self.sequence.map_or(false, |s| s != 0) || self.stake_amount.map_or(false, |s| s != 0)
    }

    /// A pail with a non-zero gap or zero count has been worked.
    pub fn worked(&self) -> bool {
        self.gap.map_or(false, |g| g != 0) || self.zero_count.map_or(false, |z| z != 0)
    }
}

/// Accepts stake as a JSON number or a decimal string (bridges serializing
/// big integers usually emit strings).
fn lenient_i128<'de, D>(deserializer: D) -> Result<Option<i128>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => s.parse::<i128>().map(Some).map_err(D::Error::custom),
        Some(serde_json::Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                Ok(Some(v as i128))
            } else if let Some(v) = n.as_u64() {
                Ok(Some(v as i128))
            } else {
                Err(D::Error::custom(format!("stake is not an integer: {}", n)))
            }
        }
        Some(other) => Err(D::Error::custom(format!("unexpected stake value: {}", other))),
    }
}

// ==================== ROUND SNAPSHOT ====================

/// Chain view for one poll tick. Replaced wholesale every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSnapshot {
    pub index: RoundIndex,
    /// All zero when the block carries no entropy.
    pub entropy: Hash32,
    /// Epoch zero when the block carries no timestamp.
    pub round_started_at: Millis,
    pub pail: Option<Pail>,
}

impl RoundSnapshot {
    pub fn new(index: RoundIndex, entropy: Hash32, round_started_at: Millis, pail: Option<Pail>) -> Self {
        Self {
            index,
            entropy,
            round_started_at,
            pail,
        }
    }

    pub fn entropy_hex(&self) -> String {
        hex::encode(self.entropy)
    }

    /// Milliseconds elapsed since the round started.
    pub fn elapsed(&self, now: Millis) -> Millis {
        now.saturating_sub(self.round_started_at)
    }

    pub fn pail_planted(&self) -> bool {
        self.pail.as_ref().map_or(false, Pail::planted)
    }

    pub fn pail_worked(&self) -> bool {
        self.pail.as_ref().map_or(false, Pail::worked)
    }
}

impl From<ContractData> for RoundSnapshot {
    fn from(data: ContractData) -> Self {
        let block = data.block.unwrap_or_default();

        let entropy = block
            .entropy
            .as_deref()
            .and_then(|h| hex::decode(h).ok())
            .and_then(|bytes| Hash32::try_from(bytes.as_slice()).ok())
            .unwrap_or([0u8; 32]);

        let round_started_at = block.timestamp.map_or(0, |secs| secs.saturating_mul(1000));

        Self {
            index: data.index,
            entropy,
            round_started_at,
            pail: data.pail,
        }
    }
}

// ==================== PROOF OF WORK ====================

/// A solution read from the proof-of-work program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub hash: Hash32,
    /// Leading `'0'` hex characters of the hash, informational only.
    pub zeros: u32,
}

impl Solution {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

// ==================== CONTRACT CALLS ====================

/// Result of simulating a contract call: an opaque transaction envelope plus
/// the simulation verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCall {
    /// Opaque transaction envelope (base64 XDR on Stellar).
    pub envelope: String,
    pub simulation: Simulation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Simulation {
    Ok(serde_json::Value),
    Error(String),
}

impl SimulatedCall {
    pub fn ok(envelope: impl Into<String>) -> Self {
        Self {
            envelope: envelope.into(),
            simulation: Simulation::Ok(serde_json::Value::Null),
        }
    }

    pub fn error(envelope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            envelope: envelope.into(),
            simulation: Simulation::Error(message.into()),
        }
    }

    /// The structured protocol error, if the simulation failed.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match &self.simulation {
            Simulation::Ok(_) => None,
            Simulation::Error(raw) => Some(ProtocolError::parse(raw)),
        }
    }
}

/// Simulation failure with the contract error code when one could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: Option<u32>,
    pub raw: String,
}

impl ProtocolError {
    const MARKER: &'static str = "Error(Contract, #";

    /// Extracts `N` from the first `Error(Contract, #N)` fragment.
    pub fn parse(raw: &str) -> Self {
        let code = raw.find(Self::MARKER).and_then(|start| {
            let rest = &raw[start + Self::MARKER.len()..];
            let end = rest.find(')')?;
            rest[..end].trim().parse::<u32>().ok()
        });

        Self {
            code,
            raw: raw.to_string(),
        }
    }

    pub fn is_one_of(&self, codes: &[u32]) -> bool {
        self.code.map_or(false, |c| codes.contains(&c))
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Outcome of submitting a signed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub status: String,
    #[serde(default)]
    pub hash: Option<String>,
}

impl Submission {
    pub fn accepted(hash: impl Into<String>) -> Self {
        Self {
            status: "SUCCESS".to_string(),
            hash: Some(hash.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}
