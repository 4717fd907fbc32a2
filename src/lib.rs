// Library exports for testing and external use

pub mod chain;
pub mod config;
pub mod error;
pub mod farmer;
pub mod harvest;
pub mod pow;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use config::{FarmerConfig, ProtocolErrorCodes, Timings};
pub use error::FarmError;
pub use farmer::{Farmer, RoundStateMachine};
pub use traits::{ChainStateReader, ContractCaller, HarvestLauncher};
pub use types::{ContractData, Pail, RoundIndex, RoundSnapshot, SimulatedCall, Solution, Submission};

// Re-export variant enums for convenience
pub use chain::{ChainVariant, MockChain};
pub use harvest::{HarvestVariant, MockHarvester};
