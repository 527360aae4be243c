//! Proxy registry — the hub's view of the node fleet.
//!
//! The `ProxyRegistry` holds every registered node and answers:
//! - capability questions ("can anything in the fleet run this?")
//! - load questions (sorted snapshots, busy nodes)
//! - scheduling requests ("give me a session on the best node now")
//!
//! Membership sits behind a fair `parking_lot::RwLock`. Adds and removes
//! take the write lock; every query takes the read lock only long enough
//! to copy what it needs. Calls into nodes during scheduling happen with
//! no registry lock held.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gridhub_core::{Capabilities, HubConfig, NodeId};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::node::Node;
use crate::policy::{self, LeastLoaded, SelectionPolicy};

/// Thread-safe set of registered nodes, keyed by node id.
pub struct ProxyRegistry<N: Node> {
    members: RwLock<HashMap<NodeId, Arc<N>>>,
    /// Strict mode: raise instead of warn in `verify_ability_to_handle`.
    strict: AtomicBool,
    policy: Box<dyn SelectionPolicy<N>>,
}

impl<N: Node> ProxyRegistry<N> {
    /// Create an empty registry using the least-loaded policy.
    pub fn new(strict: bool) -> Self {
        Self::with_policy(strict, Box::new(LeastLoaded))
    }

    pub fn with_policy(strict: bool, policy: Box<dyn SelectionPolicy<N>>) -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            strict: AtomicBool::new(strict),
            policy,
        }
    }

    /// Create an empty registry from the `[hub]` section of a config.
    pub fn from_config(config: &HubConfig) -> Self {
        Self::with_policy(
            config.hub.throw_on_capability_not_present,
            policy::from_kind(config.hub.policy),
        )
    }

    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::Acquire)
    }

    pub fn set_strict(&self, strict: bool) {
        self.strict.store(strict, Ordering::Release);
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Register a node.
    ///
    /// A node whose id is already registered is ignored, and the stored
    /// handle with its live sessions stays in place. Returns whether the
    /// node was inserted.
    pub fn add(&self, node: Arc<N>) -> bool {
        let mut members = self.members.write();
        if members.contains_key(node.id()) {
            warn!(node_id = %node.id(), "node already registered, ignoring add");
            return false;
        }
        let node_id = node.id().clone();
        members.insert(node_id.clone(), node);
        let size = members.len();
        drop(members);

        info!(%node_id, size, "node added to registry");
        true
    }

    /// Unregister the stored node that has the same id as `node`.
    ///
    /// Returns the stored handle, not the one passed in.
    pub fn remove(&self, node: &N) -> RegistryResult<Arc<N>> {
        self.remove_by_id(node.id())
    }

    pub fn remove_by_id(&self, node_id: &NodeId) -> RegistryResult<Arc<N>> {
        let removed = self.members.write().remove(node_id);
        match removed {
            Some(stored) => {
                info!(%node_id, "node removed from registry");
                Ok(stored)
            }
            None => {
                warn!(%node_id, "remove called for unregistered node");
                Err(RegistryError::NotAMember(node_id.clone()))
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn contains(&self, node: &N) -> bool {
        self.contains_id(node.id().as_str())
    }

    pub fn contains_id(&self, node_id: &str) -> bool {
        self.members.read().contains_key(node_id)
    }

    /// Look up a node by id. `None` ids are never found.
    pub fn get_by_id(&self, node_id: Option<&str>) -> Option<Arc<N>> {
        let node_id = node_id?;
        self.members.read().get(node_id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Whether any node advertises `requested`.
    ///
    /// A `true` answer does not mean a session can be granted right now;
    /// the matching node may be fully loaded.
    pub fn has_capability(&self, requested: &Capabilities) -> bool {
        self.members
            .read()
            .values()
            .any(|node| node.has_capability(requested))
    }

    /// Check that the fleet could ever serve `requested`.
    ///
    /// An empty pool and a missing capability are checked independently.
    /// In strict mode the first failing check is returned as an error; in
    /// advisory mode each failing check is logged and the call succeeds.
    pub fn verify_ability_to_handle(&self, requested: &Capabilities) -> RegistryResult<()> {
        let strict = self.is_strict();

        if self.is_empty() {
            if strict {
                return Err(RegistryError::PoolEmpty {
                    requested: requested.clone(),
                });
            }
            warn!(%requested, "empty pool of nodes");
        }

        if !self.has_capability(requested) {
            if strict {
                return Err(RegistryError::CapabilityNotPresent {
                    requested: requested.clone(),
                });
            }
            warn!(%requested, "grid doesn't contain requested capabilities at the moment");
        }

        Ok(())
    }

    /// Point-in-time copy of all members, best candidate first.
    pub fn sorted(&self) -> Vec<Arc<N>> {
        let mut nodes = self.snapshot();
        self.policy.arrange(&mut nodes);
        nodes
    }

    /// Members that report every slot taken.
    pub fn busy_nodes(&self) -> Vec<Arc<N>> {
        self.members
            .read()
            .values()
            .filter(|node| node.is_fully_loaded())
            .cloned()
            .collect()
    }

    // ── Scheduling ──────────────────────────────────────────────────

    /// Ask nodes in policy order for a session; the first grant wins.
    ///
    /// `None` is a scheduling miss: nothing could grant a session right
    /// now. Callers retry; use `has_capability` to tell a miss from a
    /// capability that no node has.
    pub fn new_session(&self, requested: &Capabilities) -> Option<N::Session> {
        let candidates = self.sorted();
        for node in &candidates {
            if let Some(session) = node.try_grant(requested) {
                debug!(node_id = %node.id(), %requested, "session granted");
                return Some(session);
            }
        }
        debug!(%requested, candidates = candidates.len(), "no node could grant a session");
        None
    }

    /// Snapshot-consistent traversal of the current members.
    ///
    /// Later adds and removes do not affect an iterator already returned.
    pub fn iter(&self) -> Snapshot<N> {
        Snapshot {
            inner: self.snapshot().into_iter(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Call the shutdown hook of every current member.
    ///
    /// Holds the read lock for the sweep, so adds and removes wait until
    /// it finishes.
    pub fn teardown(&self) {
        let members = self.members.read();
        for node in members.values() {
            node.shutdown();
        }
        info!(count = members.len(), "registry torn down");
    }

    fn snapshot(&self) -> Vec<Arc<N>> {
        self.members.read().values().cloned().collect()
    }
}

impl<N: Node> fmt::Debug for ProxyRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRegistry")
            .field("members", &self.len())
            .field("strict", &self.is_strict())
            .field("policy", &self.policy.name())
            .finish()
    }
}

/// Iterator over a copy of the membership taken at creation time.
pub struct Snapshot<N> {
    inner: std::vec::IntoIter<Arc<N>>,
}

impl<N> Iterator for Snapshot<N> {
    type Item = Arc<N>;

    fn next(&mut self) -> Option<Arc<N>> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<N> ExactSizeIterator for Snapshot<N> {}

impl<'a, N: Node> IntoIterator for &'a ProxyRegistry<N> {
    type Item = Arc<N>;
    type IntoIter = Snapshot<N>;

    fn into_iter(self) -> Snapshot<N> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimNode;
    use tracing_test::traced_test;

    fn chrome() -> Capabilities {
        Capabilities::new().with("browserName", "chrome")
    }

    fn firefox() -> Capabilities {
        Capabilities::new().with("browserName", "firefox")
    }

    fn node(id: &str, max: u32) -> Arc<SimNode> {
        Arc::new(SimNode::new(id, max, vec![chrome()]))
    }

    #[test]
    fn registry_starts_empty() {
        let registry: ProxyRegistry<SimNode> = ProxyRegistry::new(true);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.sorted().is_empty());
        assert!(registry.new_session(&chrome()).is_none());
    }

    #[test]
    fn add_and_lookup() {
        let registry = ProxyRegistry::new(true);
        assert!(registry.add(node("http://a:5555", 1)));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains_id("http://a:5555"));
        assert!(registry.contains(&SimNode::new("http://a:5555", 9, vec![])));
        assert!(registry.get_by_id(Some("http://a:5555")).is_some());
        assert!(registry.get_by_id(Some("http://b:5555")).is_none());
        assert!(registry.get_by_id(None).is_none());
    }

    #[test]
    fn duplicate_add_keeps_stored_handle() {
        let registry = ProxyRegistry::new(true);
        let original = node("a", 1);
        let _session = original.try_grant(&chrome()).unwrap();
        registry.add(original.clone());

        let duplicate = node("a", 1);
        assert!(!registry.add(duplicate));
        assert_eq!(registry.len(), 1);

        let stored = registry.get_by_id(Some("a")).unwrap();
        assert!(Arc::ptr_eq(&stored, &original));
        assert_eq!(stored.active_sessions(), 1);
    }

    #[test]
    fn remove_returns_stored_handle_for_transient_equal() {
        let registry = ProxyRegistry::new(true);
        let original = node("a", 2);
        original.try_grant(&chrome()).unwrap();
        registry.add(original.clone());

        let transient = SimNode::new("a", 2, vec![]);
        let removed = registry.remove(&transient).unwrap();
        assert!(Arc::ptr_eq(&removed, &original));
        assert_eq!(removed.active_sessions(), 1);
        assert!(registry.is_empty());

        let again = registry.remove(&transient);
        assert!(matches!(again, Err(RegistryError::NotAMember(id)) if id.as_str() == "a"));
    }

    #[test]
    fn removed_node_is_not_scheduled() {
        let registry = ProxyRegistry::new(true);
        registry.add(node("a", 5));
        registry.remove_by_id(&NodeId::new("a")).unwrap();
        assert!(!registry.has_capability(&chrome()));
        assert!(registry.new_session(&chrome()).is_none());
    }

    #[test]
    fn capability_exists_but_node_is_full() {
        let registry = ProxyRegistry::new(true);
        let full = node("a", 1);
        full.try_grant(&chrome()).unwrap();
        registry.add(full);

        assert!(registry.has_capability(&chrome()));
        assert!(registry.new_session(&chrome()).is_none());
        assert_eq!(registry.busy_nodes().len(), 1);
    }

    #[test]
    fn chrome_node_serves_chrome_only() {
        let registry = ProxyRegistry::new(true);
        registry.add(node("a", 5));

        let session = registry.new_session(&chrome()).unwrap();
        assert_eq!(session.node_id.as_str(), "a");
        assert!(registry.new_session(&firefox()).is_none());
        assert!(!registry.has_capability(&firefox()));
    }

    #[test]
    fn new_session_prefers_least_loaded() {
        let registry = ProxyRegistry::new(true);
        let a = node("a", 4);
        let b = node("b", 4);
        a.try_grant(&chrome()).unwrap();
        registry.add(a);
        registry.add(b);

        let session = registry.new_session(&chrome()).unwrap();
        assert_eq!(session.node_id.as_str(), "b");
    }

    #[test]
    fn new_session_falls_through_to_next_candidate() {
        let registry = ProxyRegistry::new(true);
        // Least loaded, but cannot run firefox.
        registry.add(node("a", 10));
        let b = Arc::new(SimNode::new("b", 2, vec![firefox()]));
        b.try_grant(&firefox()).unwrap();
        registry.add(b);

        let session = registry.new_session(&firefox()).unwrap();
        assert_eq!(session.node_id.as_str(), "b");
    }

    #[test]
    fn strict_empty_pool_fails() {
        let registry: ProxyRegistry<SimNode> = ProxyRegistry::new(true);
        let requested = Capabilities::new().with("browser", "x");
        let err = registry.verify_ability_to_handle(&requested).unwrap_err();
        assert!(matches!(err, RegistryError::PoolEmpty { .. }));
        assert_eq!(err.requested(), Some(&requested));
        assert!(err.to_string().contains(r#""browser":"x""#));
    }

    #[test]
    fn strict_missing_capability_fails() {
        let registry = ProxyRegistry::new(true);
        registry.add(node("a", 1));
        let err = registry.verify_ability_to_handle(&firefox()).unwrap_err();
        assert!(matches!(err, RegistryError::CapabilityNotPresent { .. }));
        assert!(registry.verify_ability_to_handle(&chrome()).is_ok());
    }

    #[test]
    #[traced_test]
    fn advisory_empty_pool_logs_both_conditions() {
        let registry: ProxyRegistry<SimNode> = ProxyRegistry::new(false);
        let requested = Capabilities::new().with("browser", "x");
        assert!(registry.verify_ability_to_handle(&requested).is_ok());

        assert!(logs_contain("empty pool of nodes"));
        assert!(logs_contain("grid doesn't contain"));
        assert!(logs_contain(r#"requested={"browser":"x"}"#));
    }

    #[test]
    #[traced_test]
    fn advisory_missing_capability_logs_without_pool_warning() {
        let registry = ProxyRegistry::new(false);
        registry.add(node("a", 1));
        assert!(registry.verify_ability_to_handle(&firefox()).is_ok());

        assert!(logs_contain("grid doesn't contain"));
        assert!(!logs_contain("empty pool of nodes"));
    }

    #[test]
    #[traced_test]
    fn strict_failure_is_returned_not_logged() {
        let registry: ProxyRegistry<SimNode> = ProxyRegistry::new(true);
        assert!(registry.verify_ability_to_handle(&chrome()).is_err());
        assert!(!logs_contain("empty pool of nodes"));
    }

    #[test]
    fn strict_flag_can_be_toggled() {
        let registry: ProxyRegistry<SimNode> = ProxyRegistry::new(false);
        assert!(registry.verify_ability_to_handle(&chrome()).is_ok());
        registry.set_strict(true);
        assert!(registry.is_strict());
        assert!(registry.verify_ability_to_handle(&chrome()).is_err());
    }

    #[test]
    fn iterator_is_a_snapshot() {
        let registry = ProxyRegistry::new(true);
        registry.add(node("a", 1));
        registry.add(node("b", 1));

        let mut iter = registry.iter();
        assert_eq!(iter.len(), 2);
        registry.remove_by_id(&NodeId::new("a")).unwrap();
        registry.add(node("c", 1));

        let first = iter.next().unwrap();
        let second = iter.next().unwrap();
        assert!(iter.next().is_none());
        let mut seen = vec![first.id().to_string(), second.id().to_string()];
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);

        let mut now: Vec<String> = (&registry).into_iter().map(|n| n.id().to_string()).collect();
        now.sort();
        assert_eq!(now, vec!["b", "c"]);
    }

    #[test]
    fn teardown_reaches_every_member_once() {
        let registry = ProxyRegistry::new(true);
        let a = node("a", 1);
        let b = node("b", 1);
        registry.add(a.clone());
        registry.add(b.clone());

        registry.teardown();
        assert_eq!(a.shutdown_count(), 1);
        assert_eq!(b.shutdown_count(), 1);

        let late = node("c", 1);
        registry.add(late.clone());
        assert_eq!(late.shutdown_count(), 0);
    }

    #[test]
    fn from_config_applies_hub_settings() {
        let config = HubConfig::from_toml_str(
            r#"
[hub]
throw_on_capability_not_present = false
policy = "round-robin"
"#,
        )
        .unwrap();
        let registry: ProxyRegistry<SimNode> = ProxyRegistry::from_config(&config);
        assert!(!registry.is_strict());
        assert_eq!(registry.policy_name(), "round-robin");
        assert!(format!("{registry:?}").contains("round-robin"));
    }
}
