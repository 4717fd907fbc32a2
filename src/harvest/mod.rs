pub mod mock;
pub mod noop;
pub mod process;
pub mod variant;

pub use mock::MockHarvester;
pub use noop::NoopHarvester;
pub use process::ProcessHarvester;
pub use variant::HarvestVariant;
