//! gridhub-registry — fleet membership and session scheduling for the hub.
//!
//! The [`ProxyRegistry`] keeps the set of registered worker nodes and is
//! shared by every client thread. It:
//!
//! - Adds and removes nodes keyed by their [`NodeId`](gridhub_core::NodeId)
//! - Answers capability questions without granting anything
//! - Hands out sessions first-fit over a [`SelectionPolicy`] ordering
//! - Reports an empty pool or a missing capability as an error (strict
//!   mode) or a warning (advisory mode)
//!
//! # Architecture
//!
//! ```text
//! ProxyRegistry<N: Node>
//!   ├── RwLock<HashMap<NodeId, Arc<N>>>   (fair; writers never starve)
//!   ├── strict flag                       (AtomicBool, settable at runtime)
//!   └── Box<dyn SelectionPolicy<N>>
//!       ├── LeastLoaded  (load %, then oldest session start)
//!       └── RoundRobin   (lock-free rotating offset)
//! ```

pub mod error;
pub mod node;
pub mod policy;
pub mod registry;
pub mod sim;

pub use error::{RegistryError, RegistryResult};
pub use node::Node;
pub use policy::{LeastLoaded, LoadKey, RoundRobin, SelectionPolicy, load_order};
pub use registry::{ProxyRegistry, Snapshot};
pub use sim::{SimNode, SimSession};
