//! Rendezvous probe scheduler.
//!
//! Periodically resolves a DNS TXT record as a liveness beacon, with
//! random jitter so a fleet of agents does not thunder in step. The
//! probe is observational only: record contents are never acted on here
//! and never logged, and lookup failures just wait for the next cycle.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::config::{AgentConfig, Timing};

pub(crate) async fn run(cfg: Arc<AgentConfig>, cancel: CancellationToken) {
    loop {
        probe_once(&cfg).await;
        let wait = next_interval(&cfg.timing);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = time::sleep(wait) => {}
        }
    }
    trace!("probe stopped");
}

/// Base interval plus uniform jitter below `probe_jitter`.
fn next_interval(timing: &Timing) -> Duration {
    let var = timing.probe_jitter.as_millis() as u64;
    let jitter = if var == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..var)
    };
    timing.probe_base + Duration::from_millis(jitter)
}

async fn probe_once(cfg: &AgentConfig) {
    let name = match cfg.txt_name.txt_name() {
        Some(name) => Zeroizing::new(name),
        None => {
            trace!("no rendezvous name, skipping cycle");
            return;
        }
    };
    match cfg.resolver.lookup_txt(&name).await {
        Ok(records) => {
            // Wipe record contents on drop; only the count is reported.
            let records: Vec<Zeroizing<Vec<u8>>> =
                records.into_iter().map(Zeroizing::new).collect();
            debug!(records = records.len(), "rendezvous probe answered");
        }
        Err(err) => {
            debug!(%err, "rendezvous probe failed");
        }
    }
}
