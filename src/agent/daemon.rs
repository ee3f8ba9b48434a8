use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::monitor::ComplianceMonitor;
use super::scheduler::sleep_or_shutdown;
use super::{AgentConfig, StateStore};
use crate::authority::{HttpAuthority, RemoteAuthority};
use crate::platform::{self, DevicePlatform};
use crate::restriction::RestrictionController;

/// How often the supervisor re-checks management privilege
const PRIVILEGE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Why the supervisor stopped a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    PrivilegeRevoked,
    Shutdown,
}

/// Shared handles the daemon hands to its tasks
pub struct AgentContext {
    pub config: AgentConfig,
    pub platform: Arc<dyn DevicePlatform>,
    pub authority: Arc<dyn RemoteAuthority>,
    pub controller: Arc<RestrictionController>,
    pub store: Arc<StateStore>,
}

impl AgentContext {
    /// Wire up the real platform, HTTP authority and on-disk state
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let platform = platform::current();
        let authority: Arc<dyn RemoteAuthority> = Arc::new(HttpAuthority::new(&config.authority)?);
        let controller = Arc::new(RestrictionController::new(platform.clone()));
        let store = Arc::new(StateStore::open_default()?);

        Ok(Self {
            config,
            platform,
            authority,
            controller,
            store,
        })
    }

    pub fn monitor(&self) -> ComplianceMonitor {
        ComplianceMonitor::new(
            &self.config,
            self.authority.clone(),
            self.controller.clone(),
            self.store.clone(),
        )
    }
}

/// Run the agent daemon until SIGINT/SIGTERM
pub async fn run_agent_daemon(config: AgentConfig) -> Result<()> {
    tracing::info!("Starting agent daemon");
    tracing::info!("Authority: {}", config.authority.base_url);
    tracing::info!("Device id: {}", config.authority.device_id);
    tracing::info!(
        "Check interval: {} seconds",
        config.monitor.check_interval
    );

    let context = AgentContext::from_config(config)?;
    tracing::info!("Platform provider: {}", context.platform.name());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    supervise(&context, shutdown_rx).await;

    tracing::info!("Agent daemon stopped");
    Ok(())
}

/// Start the monitor whenever management privilege is active and stop it
/// (with level-0 cleanup) when privilege goes away or shutdown is requested.
pub async fn supervise(context: &AgentContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        if !wait_for_privilege(context.platform.as_ref(), &mut shutdown).await {
            return;
        }

        tracing::info!("Management privilege active; starting compliance monitor");
        let (monitor_tx, monitor_rx) = watch::channel(false);
        let handle = tokio::spawn(context.monitor().run(monitor_rx));

        let reason = watch_privilege(context.platform.as_ref(), &mut shutdown).await;
        match reason {
            StopReason::PrivilegeRevoked => {
                tracing::warn!("Management privilege revoked; stopping compliance monitor")
            }
            StopReason::Shutdown => tracing::info!("Shutdown requested; stopping compliance monitor"),
        }

        let _ = monitor_tx.send(true);
        if let Err(e) = handle.await {
            tracing::error!("Compliance monitor task failed: {}", e);
        }

        if reason == StopReason::Shutdown {
            return;
        }
    }
}

/// Returns false if shutdown was requested before privilege became active
async fn wait_for_privilege(
    platform: &dyn DevicePlatform,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut logged = false;

    loop {
        if platform.is_management_privilege_active() {
            return true;
        }
        if !logged {
            tracing::info!("Waiting for management privilege (run `curfew-agent enroll`)");
            logged = true;
        }
        if sleep_or_shutdown(PRIVILEGE_CHECK_INTERVAL, shutdown).await {
            return false;
        }
    }
}

async fn watch_privilege(
    platform: &dyn DevicePlatform,
    shutdown: &mut watch::Receiver<bool>,
) -> StopReason {
    loop {
        if sleep_or_shutdown(PRIVILEGE_CHECK_INTERVAL, shutdown).await {
            return StopReason::Shutdown;
        }
        if !platform.is_management_privilege_active() {
            return StopReason::PrivilegeRevoked;
        }
    }
}

/// Flip `shutdown` on SIGINT or SIGTERM
pub fn spawn_signal_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown.send(true);
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => tracing::info!("Received SIGINT, initiating shutdown..."),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating shutdown..."),
                }
                return;
            }
            _ => tracing::warn!("Could not install SIGTERM handler; only Ctrl+C will stop the agent"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
