use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::HeartbeatLoop;

/// Owns the running heartbeat loops and stops them together.
#[derive(Default)]
pub struct HeartbeatSupervisor {
    token: CancellationToken,
    loops: Vec<(String, JoinHandle<()>)>,
}

impl HeartbeatSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `heartbeat` on its own task.
    pub fn start(&mut self, heartbeat: Arc<HeartbeatLoop>) {
        let name = heartbeat.source_name().to_string();
        let handle = heartbeat.spawn(self.token.child_token());
        self.loops.push((name, handle));
    }

    /// Number of loops started so far.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Cancel every loop and wait for each to exit.
    pub async fn shutdown(self) {
        info!("Stopping {} heartbeat loop(s)", self.loops.len());
        self.token.cancel();

        for (name, handle) in self.loops {
            if let Err(e) = handle.await {
                warn!("Heartbeat '{}' did not stop cleanly: {}", name, e);
            }
        }
    }
}
