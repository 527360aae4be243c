//! Fleet simulation — drives a registry of `SimNode`s with concurrent clients.
//!
//! Every client task repeatedly verifies that the fleet can serve the
//! requested capabilities, asks for a session, holds it for a while and
//! releases it. Scheduling misses are retried with linear backoff.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gridhub_core::{Capabilities, HubConfig};
use gridhub_registry::{Node, ProxyRegistry, SimNode};

/// Knobs for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub clients: usize,
    pub requests: usize,
    pub requested: Capabilities,
    pub hold: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            clients: 4,
            requests: 10,
            requested: Capabilities::new(),
            hold: Duration::from_millis(20),
            max_attempts: 50,
            backoff: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub policy: String,
    pub strict: bool,
    pub requested: Capabilities,
    pub granted: u64,
    pub misses: u64,
    pub rejected: u64,
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: String,
    pub max_sessions: u32,
    pub granted: u64,
    pub shut_down: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    granted: u64,
    misses: u64,
    rejected: u64,
}

pub async fn simulate(
    path: &str,
    options: SimulationOptions,
    format: &str,
) -> anyhow::Result<()> {
    let config = HubConfig::from_file(Path::new(path))?;
    let report = run(&config, options).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{}", format_report(&report)),
    }
    Ok(())
}

/// Build the fleet from `config` and run the clients to completion.
pub async fn run(config: &HubConfig, options: SimulationOptions) -> anyhow::Result<SimulationReport> {
    let registry: Arc<ProxyRegistry<SimNode>> = Arc::new(ProxyRegistry::from_config(config));
    let fleet: Vec<Arc<SimNode>> = config
        .nodes
        .iter()
        .map(|n| Arc::new(SimNode::from_config(n)))
        .collect();
    for node in &fleet {
        registry.add(node.clone());
    }

    info!(
        nodes = fleet.len(),
        clients = options.clients,
        requests = options.requests,
        policy = registry.policy_name(),
        requested = %options.requested,
        "starting simulation"
    );

    let options = Arc::new(options);
    let handles: Vec<JoinHandle<Tally>> = (0..options.clients)
        .map(|client| {
            let registry = registry.clone();
            let options = options.clone();
            tokio::spawn(async move { client_loop(client, &registry, &options).await })
        })
        .collect();

    let mut total = Tally::default();
    for handle in handles {
        let tally = handle.await?;
        total.granted += tally.granted;
        total.misses += tally.misses;
        total.rejected += tally.rejected;
    }

    registry.teardown();

    let nodes = fleet
        .iter()
        .map(|n| NodeReport {
            id: n.id().to_string(),
            max_sessions: n.max_sessions(),
            granted: n.granted_total(),
            shut_down: n.is_shut_down(),
        })
        .collect();

    Ok(SimulationReport {
        policy: registry.policy_name().to_string(),
        strict: registry.is_strict(),
        requested: options.requested.clone(),
        granted: total.granted,
        misses: total.misses,
        rejected: total.rejected,
        nodes,
    })
}

async fn client_loop(
    client: usize,
    registry: &ProxyRegistry<SimNode>,
    options: &SimulationOptions,
) -> Tally {
    let mut tally = Tally::default();

    for request in 0..options.requests {
        if let Err(e) = registry.verify_ability_to_handle(&options.requested) {
            warn!(client, request, error = %e, "request rejected");
            tally.rejected += 1;
            continue;
        }

        let mut attempt = 0;
        loop {
            if let Some(session) = registry.new_session(&options.requested) {
                tally.granted += 1;
                tokio::time::sleep(options.hold).await;
                if let Some(node) = registry.get_by_id(Some(session.node_id.as_str())) {
                    node.release(&session);
                }
                break;
            }

            attempt += 1;
            if attempt >= options.max_attempts {
                debug!(client, request, attempt, "giving up after repeated misses");
                tally.misses += 1;
                break;
            }
            tokio::time::sleep(options.backoff * attempt).await;
        }
    }

    tally
}

fn format_report(report: &SimulationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Simulation ({} policy, {} mode) for {}\n",
        report.policy,
        if report.strict { "strict" } else { "advisory" },
        report.requested
    ));
    out.push_str(&format!(
        "  granted: {}  misses: {}  rejected: {}\n",
        report.granted, report.misses, report.rejected
    ));
    for node in &report.nodes {
        out.push_str(&format!(
            "  - {:<32} {:>6} sessions (max {}){}\n",
            node.id,
            node.granted,
            node.max_sessions,
            if node.shut_down { "" } else { "  [still running]" }
        ));
    }
    out
}
