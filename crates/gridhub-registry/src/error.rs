//! Registry error types.

use gridhub_core::{Capabilities, NodeId};
use thiserror::Error;

/// Errors reported by the proxy registry.
///
/// A scheduling miss is not an error: `ProxyRegistry::new_session`
/// returns `None` for it.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `remove` was called for a node that is not registered.
    #[error("registry does not contain node {0}")]
    NotAMember(NodeId),

    /// No nodes are registered at all.
    #[error("empty pool of nodes for {requested}")]
    PoolEmpty { requested: Capabilities },

    /// Nodes are registered but none advertises the request.
    #[error("grid doesn't contain {requested} at the moment")]
    CapabilityNotPresent { requested: Capabilities },
}

impl RegistryError {
    /// Capabilities carried by a pool-empty or capability-absent failure.
    pub fn requested(&self) -> Option<&Capabilities> {
        match self {
            RegistryError::PoolEmpty { requested }
            | RegistryError::CapabilityNotPresent { requested } => Some(requested),
            RegistryError::NotAMember(_) => None,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
