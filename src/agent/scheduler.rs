use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;

/// Fixed-interval tick schedule for the agent loops
pub struct TickScheduler {
    interval: Duration,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Sleep one interval. Returns true if shutdown was requested meanwhile.
    pub async fn sleep_until_next_tick(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tracing::debug!(
            "Next check at: {}",
            self.next_tick_time().format("%Y-%m-%d %H:%M:%S %Z")
        );
        sleep_or_shutdown(self.interval, shutdown).await
    }

    pub fn next_tick_time(&self) -> DateTime<Utc> {
        let step = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_add_signed(step)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Sleep for `duration` unless `shutdown` flips to true first.
///
/// Returns true when interrupted by shutdown. A dropped sender cannot request
/// shutdown any more, so the full delay is served in that case.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    let stop_requested = tokio::select! {
        _ = &mut sleep => return false,
        result = shutdown.wait_for(|stop| *stop) => result.is_ok(),
    };

    if !stop_requested {
        sleep.await;
    }
    stop_requested
}

/// Resolve once shutdown is requested; never resolves if the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
