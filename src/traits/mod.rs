pub mod chain_state;
pub mod contract;
pub mod harvest;

pub use chain_state::ChainStateReader;
pub use contract::ContractCaller;
pub use harvest::HarvestLauncher;
