//! Selection policies — the order in which candidate nodes are asked for a
//! session.
//!
//! The registry snapshots its members and hands them to a
//! [`SelectionPolicy`], then walks the arranged list first-fit. Swapping the
//! policy changes scheduling without touching membership or locking.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Instant;

use gridhub_core::PolicyKind;

use crate::node::Node;

/// Orders a snapshot of candidate nodes, best candidate first.
pub trait SelectionPolicy<N: Node>: Send + Sync {
    fn arrange(&self, nodes: &mut [Arc<N>]);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the policy named in configuration.
pub fn from_kind<N: Node>(kind: PolicyKind) -> Box<dyn SelectionPolicy<N>> {
    match kind {
        PolicyKind::LeastLoaded => Box::new(LeastLoaded),
        PolicyKind::RoundRobin => Box::new(RoundRobin::new()),
    }
}

/// Sort key of the least-loaded comparator.
#[derive(Debug, Clone, Copy)]
pub struct LoadKey {
    pub load_percent: f64,
    pub last_session_start: Option<Instant>,
}

impl LoadKey {
    pub fn of<N: Node + ?Sized>(node: &N) -> Self {
        Self {
            load_percent: node.load_percent(),
            last_session_start: node.last_session_start(),
        }
    }
}

impl PartialEq for LoadKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LoadKey {}

impl PartialOrd for LoadKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadKey {
    /// Ascending load, then ascending last session start. A node that never
    /// started a session sorts before any node that has.
    fn cmp(&self, other: &Self) -> Ordering {
        self.load_percent
            .total_cmp(&other.load_percent)
            .then_with(|| self.last_session_start.cmp(&other.last_session_start))
    }
}

/// Compare two nodes by current load, longest idle first on ties.
pub fn load_order<N: Node + ?Sized>(a: &N, b: &N) -> Ordering {
    LoadKey::of(a).cmp(&LoadKey::of(b))
}

/// Least-loaded-first ordering. The default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl<N: Node> SelectionPolicy<N> for LeastLoaded {
    fn arrange(&self, nodes: &mut [Arc<N>]) {
        // Nodes keep granting sessions while we sort, so sample each key once.
        nodes.sort_by_cached_key(|n| LoadKey::of(n.as_ref()));
    }

    fn name(&self) -> &'static str {
        "least-loaded"
    }
}

/// Rotates the starting node on every call, ignoring load.
///
/// Candidates are put in id order, then rotated by a shared atomic
/// offset, so consecutive requests start at consecutive nodes.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next_start: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<N: Node> SelectionPolicy<N> for RoundRobin {
    fn arrange(&self, nodes: &mut [Arc<N>]) {
        if nodes.is_empty() {
            return;
        }
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        let start = self.next_start.fetch_add(1, AtomicOrdering::Relaxed) % nodes.len();
        nodes.rotate_left(start);
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}
