//! In-memory reference node.
//!
//! `SimNode` has a fixed number of session slots and a list of advertised
//! capability sets. It backs the fleet simulator and the registry tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use gridhub_core::{Capabilities, NodeConfig, NodeId};
use parking_lot::Mutex;
use tracing::debug;

use crate::node::Node;

/// A session granted by a [`SimNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSession {
    pub id: String,
    pub node_id: NodeId,
}

#[derive(Debug, Default)]
struct Slots {
    active: u32,
    last_session_start: Option<Instant>,
}

/// A node with a fixed session limit, held entirely in memory.
#[derive(Debug)]
pub struct SimNode {
    id: NodeId,
    max_sessions: u32,
    capabilities: Vec<Capabilities>,
    slots: Mutex<Slots>,
    next_session: AtomicU64,
    granted_total: AtomicU64,
    shutdown_calls: AtomicUsize,
}

impl SimNode {
    pub fn new(id: impl Into<NodeId>, max_sessions: u32, capabilities: Vec<Capabilities>) -> Self {
        Self {
            id: id.into(),
            max_sessions,
            capabilities,
            slots: Mutex::new(Slots::default()),
            next_session: AtomicU64::new(0),
            granted_total: AtomicU64::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.id.clone(), config.max_sessions, config.capabilities.clone())
    }

    pub fn max_sessions(&self) -> u32 {
        self.max_sessions
    }

    /// Sessions currently running.
    pub fn active_sessions(&self) -> u32 {
        self.slots.lock().active
    }

    /// Sessions granted over the node's lifetime.
    pub fn granted_total(&self) -> u64 {
        self.granted_total.load(Ordering::Relaxed)
    }

    /// How many times the shutdown hook ran.
    pub fn shutdown_count(&self) -> usize {
        self.shutdown_calls.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_count() > 0
    }

    /// Free the slot held by `session`.
    ///
    /// Returns `false` if the session belongs to another node or no slot
    /// is held.
    pub fn release(&self, session: &SimSession) -> bool {
        if session.node_id != self.id {
            return false;
        }
        let mut slots = self.slots.lock();
        if slots.active == 0 {
            return false;
        }
        slots.active -= 1;
        debug!(node_id = %self.id, session = %session.id, "session released");
        true
    }
}

impl Node for SimNode {
    type Session = SimSession;

    fn id(&self) -> &NodeId {
        &self.id
    }

    fn has_capability(&self, requested: &Capabilities) -> bool {
        self.capabilities.iter().any(|offered| requested.satisfied_by(offered))
    }

    fn is_fully_loaded(&self) -> bool {
        self.slots.lock().active >= self.max_sessions
    }

    fn load_percent(&self) -> f64 {
        if self.max_sessions == 0 {
            return 100.0;
        }
        let active = self.slots.lock().active;
        f64::from(active) / f64::from(self.max_sessions) * 100.0
    }

    fn last_session_start(&self) -> Option<Instant> {
        self.slots.lock().last_session_start
    }

    fn try_grant(&self, requested: &Capabilities) -> Option<SimSession> {
        if self.is_shut_down() || !self.has_capability(requested) {
            return None;
        }

        let mut slots = self.slots.lock();
        if slots.active >= self.max_sessions {
            return None;
        }
        slots.active += 1;
        slots.last_session_start = Some(Instant::now());
        drop(slots);

        self.granted_total.fetch_add(1, Ordering::Relaxed);
        let seq = self.next_session.fetch_add(1, Ordering::Relaxed);
        let session = SimSession {
            id: format!("{}#{seq}", self.id),
            node_id: self.id.clone(),
        };
        debug!(node_id = %self.id, session = %session.id, "session granted");
        Some(session)
    }

    fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::AcqRel);
    }
}
