//! Top-level task supervision.
//!
//! Runs the listener and the rendezvous probe as a unit under a shared
//! cancellation token. Shutdown is cooperative: [`Supervisor::shutdown`]
//! signals the token, and [`Supervisor::join`] waits until both tasks
//! have wound down (the listener drains its live sessions first).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::AgentConfig;
use crate::{listener, probe};

pub struct Supervisor {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn the listener and the probe on the current runtime.
    pub fn start(cfg: AgentConfig) -> Self {
        let cfg = Arc::new(cfg);
        let cancel = CancellationToken::new();
        info!(port = cfg.port, "agent starting");

        let tasks = vec![
            tokio::spawn(
                listener::run(cfg.clone(), cancel.child_token()).instrument(info_span!("listener")),
            ),
            tokio::spawn(
                probe::run(cfg.clone(), cancel.child_token()).instrument(info_span!("probe")),
            ),
        ];
        Self { cancel, tasks }
    }

    /// Request shutdown without waiting for it to complete.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for both tasks to finish. Without a prior [`shutdown`] call
    /// this waits forever.
    ///
    /// [`shutdown`]: Supervisor::shutdown
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(%err, "supervised task panicked");
            }
        }
        info!("agent stopped");
    }

    /// Request shutdown and wait for it to complete.
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}
