use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::AgentStatus;
use crate::store::Store;

/// Periodically recomputes derived agent liveness and logs transitions.
/// Status itself is never persisted — [`crate::domain::Agent::status`] is
/// computed from `last_heartbeat_at` wherever an agent is read — so this
/// task performs no writes, only observation.
pub struct LivenessSweeper {
    store: Arc<Store>,
    interval: Duration,
    t_stale_secs: i64,
    t_offline_secs: i64,
}

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

impl LivenessSweeper {
    pub fn new(store: Arc<Store>, interval: Duration, t_stale_secs: i64, t_offline_secs: i64) -> Self {
        Self {
            store,
            interval,
            t_stale_secs,
            t_offline_secs,
        }
    }

    /// Spawns the sweep loop on the current tokio runtime, running until
    /// the process shuts down.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_status: HashMap<String, AgentStatus> = HashMap::new();
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.sweep_once(&mut last_status);
            }
        })
    }

    /// One sweep pass: recomputes every agent's derived status and logs any
    /// transition from the previous pass. Split out from `spawn`'s loop so
    /// it can be driven directly in tests without mocking the tick timer.
    fn sweep_once(&self, last_status: &mut HashMap<String, AgentStatus>) {
        match self.store.list_agents() {
            Ok(agents) => {
                let now = chrono::Utc::now();
                for agent in agents {
                    let status = agent.status(now, self.t_stale_secs, self.t_offline_secs);
                    if let Some(prev) = last_status.insert(agent.id.clone(), status) {
                        if prev != status {
                            debug!(agent_id = %agent.id, hostname = %agent.hostname, from = %prev, to = %status, "agent liveness changed");
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "liveness sweep could not list agents, retrying next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Agent;
    use serde_json::json;
    use tempfile::TempDir;

    fn agent(id: &str, hostname: &str, last_heartbeat_at: chrono::DateTime<chrono::Utc>) -> Agent {
        Agent {
            id: id.to_string(),
            hostname: hostname.to_string(),
            capabilities: json!({}),
            registered_at: last_heartbeat_at,
            last_heartbeat_at,
            token: None,
        }
    }

    #[test]
    fn sweep_tracks_status_transitions_without_writing_to_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        store.upsert_agent(&agent("agent-1", "web-01", chrono::Utc::now())).unwrap();

        let sweeper = LivenessSweeper::new(store.clone(), Duration::from_secs(10), 30, 120);
        let mut last_status = HashMap::new();

        sweeper.sweep_once(&mut last_status);
        assert_eq!(last_status.get("agent-1"), Some(&AgentStatus::Online));

        store.upsert_agent(&agent("agent-1", "web-01", chrono::Utc::now() - chrono::Duration::seconds(200))).unwrap();
        sweeper.sweep_once(&mut last_status);
        assert_eq!(last_status.get("agent-1"), Some(&AgentStatus::Offline));

        let persisted = store.get_agent("agent-1").unwrap().unwrap();
        assert_eq!(persisted.hostname, "web-01");
    }
}
