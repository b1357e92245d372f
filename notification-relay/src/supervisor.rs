//! Recovery supervisor.
//!
//! Runs the relay startup sequence and restarts it after every fault,
//! following an explicit [`RestartPolicy`]: a fixed delay between attempts
//! and an optional cap on the number of restarts. There is no exponential
//! back-off; every fault gets exactly one restart after the delay.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How the supervisor reacts to a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Wait between a fault and the next startup.
    pub delay: Duration,
    /// Restarts allowed before giving up; `None` never gives up.
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(30),
            max_restarts: None,
        }
    }
}

impl RestartPolicy {
    fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }
}

/// Run `start` until it returns `Ok` or `shutdown` fires.
///
/// `start` receives the attempt number, starting at 1. An `Err` is a fault:
/// it is logged, the supervisor waits `policy.delay` and calls `start`
/// again. Returns `Err` only when the restart cap is exhausted.
pub async fn supervise<F, Fut>(
    policy: &RestartPolicy,
    shutdown: &CancellationToken,
    mut start: F,
) -> Result<()>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut restarts = 0u32;

    loop {
        let attempt = restarts + 1;
        info!(attempt, "relay_starting");

        let err = match start(attempt).await {
            Ok(()) => {
                info!(attempt, "relay_stopped");
                return Ok(());
            }
            Err(err) => err,
        };

        if shutdown.is_cancelled() {
            warn!(attempt, error = %err, "relay_fault_during_shutdown");
            return Ok(());
        }

        error!(attempt, error = %format_args!("{err:#}"), "relay_fault");

        if !policy.allows(restarts) {
            error!(restarts, "relay_restart_limit_reached");
            return Err(err.context(format!("giving up after {restarts} restarts")));
        }

        info!(delay_secs = policy.delay.as_secs_f64(), "relay_restart_scheduled");

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("relay_restart_cancelled");
                return Ok(());
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }

        restarts += 1;
    }
}
