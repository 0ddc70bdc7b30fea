pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod types;

pub use provider::DecisionPort;
pub use registry::{ProviderRegistry, Role};
pub use types::Prediction;
