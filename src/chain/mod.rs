pub mod http;
pub mod mock;
pub mod variant;

pub use http::HttpBridge;
pub use mock::{ContractCall, MockChain};
pub use variant::ChainVariant;
