pub mod capabilities;
pub mod config;
pub mod types;

pub use capabilities::Capabilities;
pub use config::{ConfigError, HubConfig, HubSettings, NodeConfig, PolicyKind};
pub use types::*;
