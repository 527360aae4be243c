//! The contract a worker node must satisfy to be scheduled by the registry.

use std::time::Instant;

use gridhub_core::{Capabilities, NodeId};

/// A worker node that can run sessions.
///
/// Implementations own their capability matching, load accounting and
/// session bookkeeping. The registry only reads these answers and calls
/// [`Node::try_grant`]; concurrent grants racing for the same slot must be
/// resolved inside the node.
pub trait Node: Send + Sync {
    /// Handle returned for a granted session.
    type Session;

    /// Stable identity of this node. Membership is keyed on it.
    fn id(&self) -> &NodeId;

    /// Whether the node advertises something that satisfies `requested`,
    /// regardless of current load.
    fn has_capability(&self, requested: &Capabilities) -> bool;

    /// Whether every session slot is taken.
    fn is_fully_loaded(&self) -> bool;

    /// Resource usage normalized to `0.0..=100.0`.
    fn load_percent(&self) -> f64;

    /// When the most recent session started. `None` if it never ran one.
    fn last_session_start(&self) -> Option<Instant>;

    /// Grant a session right now, or `None` if the node cannot.
    fn try_grant(&self, requested: &Capabilities) -> Option<Self::Session>;

    /// Stop the node's background activity. Called by registry teardown.
    fn shutdown(&self);
}
