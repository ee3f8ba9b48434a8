//! Compliance monitor.
//!
//! One cycle: guard on management privilege, fetch schedules, evaluate them
//! against (server-anchored) local time, drive the locked/unlocked state
//! machine through the restriction layer, then heartbeat. Any remote failure
//! degrades only the cycle it happened in.

use chrono::{DateTime, Local, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::clock::ServerAnchoredClock;
use super::config::AgentConfig;
use super::scheduler::TickScheduler;
use super::state::{ComplianceState, StateStore};
use crate::authority::{HeartbeatRecord, RemoteAuthority, StatusReport};
use crate::error::with_deadline;
use crate::restriction::{RestrictionController, RestrictionLevel};
use crate::schedule::{LocalInstant, Schedule, ScheduleEvaluator};

type DeviceClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PrivilegeInactive,
    FetchFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Locked,
    Unlocked,
    LevelChanged,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed {
        transition: Transition,
        level: RestrictionLevel,
    },
}

pub struct ComplianceMonitor {
    authority: Arc<dyn RemoteAuthority>,
    controller: Arc<RestrictionController>,
    store: Arc<StateStore>,
    device_id: String,
    interval: Duration,
    request_timeout: Duration,
    clock: ServerAnchoredClock,
    device_clock: DeviceClock,
    compliance: ComplianceState,
    status_tx: watch::Sender<String>,
}

impl ComplianceMonitor {
    pub fn new(
        config: &AgentConfig,
        authority: Arc<dyn RemoteAuthority>,
        controller: Arc<RestrictionController>,
        store: Arc<StateStore>,
    ) -> Self {
        let saved = store.snapshot();
        let clock = ServerAnchoredClock::restore(
            saved.clock_offset_ms,
            saved.server_time_preferred,
            config.monitor.clock_drift_tolerance(),
        );
        let (status_tx, _) = watch::channel(initial_status_line(&saved.compliance));

        Self {
            authority,
            controller,
            store,
            device_id: config.authority.device_id.clone(),
            interval: config.monitor.check_interval(),
            request_timeout: config.authority.request_timeout(),
            clock,
            device_clock: Arc::new(Utc::now),
            compliance: saved.compliance,
            status_tx,
        }
    }

    #[cfg(test)]
    fn with_device_clock(mut self, clock: DeviceClock) -> Self {
        self.device_clock = clock;
        self
    }

    /// User-visible one-line status, updated every cycle
    pub fn status_line(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    pub fn compliance(&self) -> &ComplianceState {
        &self.compliance
    }

    /// Run cycles until `shutdown` turns true, then lift all restrictions
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Compliance monitor started (every {} seconds)",
            self.interval.as_secs()
        );
        let scheduler = TickScheduler::new(self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle().await {
                CycleOutcome::Skipped(reason) => tracing::debug!("Cycle skipped: {:?}", reason),
                CycleOutcome::Completed { transition, level } => {
                    tracing::debug!("Cycle complete: {:?} at {}", transition, level)
                }
            }

            if scheduler.sleep_until_next_tick(&mut shutdown).await {
                break;
            }
        }

        self.shutdown().await;
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if !self.controller.platform().is_management_privilege_active() {
            tracing::debug!("Management privilege inactive; skipping cycle");
            return CycleOutcome::Skipped(SkipReason::PrivilegeInactive);
        }

        let schedules = match with_deadline(
            self.request_timeout,
            self.authority.fetch_schedules(&self.device_id),
        )
        .await
        {
            Ok(schedules) => schedules,
            Err(e) => {
                tracing::warn!("Failed to fetch schedules: {}", e);
                return CycleOutcome::Skipped(SkipReason::FetchFailed);
            }
        };

        let now = self.clock.anchored((self.device_clock)()).with_timezone(&Local);
        let evaluation = ScheduleEvaluator::evaluate(LocalInstant::from_datetime(&now), &schedules);
        let target = evaluation.level;
        let active = evaluation.active_names().join(", ");
        let should_lock = evaluation.should_lock();

        let transition = match (self.compliance.locked, should_lock) {
            (false, true) => {
                tracing::info!("Schedule active ({}); locking device at {}", active, target);
                if let Err(e) = self.controller.lock_device_now() {
                    tracing::warn!("Device lock failed: {}", e);
                }
                self.controller.apply_level(target).await;
                self.set_compliance(true, target);
                self.report_status(true).await;
                Transition::Locked
            }
            (true, false) => {
                tracing::info!("No schedule active; unlocking device");
                if self.controller.apply_level(RestrictionLevel::None).await {
                    self.set_compliance(false, RestrictionLevel::None);
                    self.report_status(false).await;
                    Transition::Unlocked
                } else {
                    // Stay locked so the next cycle retries the lift
                    tracing::warn!("Restrictions not fully lifted; retrying next cycle");
                    Transition::Unchanged
                }
            }
            (true, true) if target != self.compliance.applied_level => {
                tracing::info!(
                    "Restriction changed from {} to {} ({})",
                    self.compliance.applied_level,
                    target,
                    active
                );
                self.controller.apply_level(target).await;
                self.set_compliance(true, target);
                Transition::LevelChanged
            }
            (true, true) => {
                // Restart or earlier partial failure: enforce again
                if self.controller.applied_level().await != Some(target) {
                    tracing::debug!("Re-asserting {}", target);
                    self.controller.apply_level(target).await;
                }
                Transition::Unchanged
            }
            (false, false) => Transition::Unchanged,
        };

        self.publish_status(&active);
        self.record_cycle(&schedules);
        self.heartbeat().await;

        CycleOutcome::Completed {
            transition,
            level: self.compliance.applied_level,
        }
    }

    /// Lift every restriction; runs however the monitor stops
    pub async fn shutdown(&mut self) {
        tracing::info!("Compliance monitor stopping; clearing restrictions");

        if self.controller.apply_level(RestrictionLevel::None).await {
            self.set_compliance(false, RestrictionLevel::None);
            self.publish_status("");
        } else {
            tracing::warn!("Could not fully clear restrictions on shutdown");
        }
    }

    fn set_compliance(&mut self, locked: bool, level: RestrictionLevel) {
        let mut state = ComplianceState {
            locked,
            applied_level: level,
            last_applied_at: Some(Utc::now()),
        };
        if self.compliance.locked == locked && self.compliance.applied_level == level {
            state.last_applied_at = self.compliance.last_applied_at;
        }
        self.compliance = state;

        let snapshot = self.compliance.clone();
        if let Err(e) = self.store.update(|s| s.compliance = snapshot) {
            tracing::warn!("Failed to persist compliance state: {:#}", e);
        }
    }

    fn record_cycle(&self, schedules: &[Schedule]) {
        let hash = schedules_fingerprint(schedules);
        let result = self.store.update(|s| {
            let changed = s.schedules_hash.as_deref() != Some(hash.as_str());
            s.update_checked(hash.clone());
            changed
        });

        match result {
            Ok(true) => tracing::info!(
                "Schedule set changed ({} schedule(s), {})",
                schedules.len(),
                &hash[..19]
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to persist check time: {:#}", e),
        }
    }

    fn publish_status(&self, active: &str) {
        let line = if self.compliance.locked && !active.is_empty() {
            format!(
                "Restricted by {}: {}",
                active,
                self.compliance.applied_level.describe()
            )
        } else if self.compliance.locked {
            format!("Restricted: {}", self.compliance.applied_level.describe())
        } else {
            "No active schedule".to_string()
        };

        self.status_tx.send_if_modified(|current| {
            if *current == line {
                return false;
            }
            tracing::info!("Status: {}", line);
            *current = line;
            true
        });
    }

    async fn report_status(&self, locked: bool) {
        let report = StatusReport {
            imei: self.device_id.clone(),
            is_locked: locked,
            last_checked: Utc::now().timestamp_millis(),
            battery_level: self.controller.platform().battery_level().unwrap_or(100),
            is_online: true,
        };

        match with_deadline(
            self.request_timeout,
            self.authority.report_status(&self.device_id, &report),
        )
        .await
        {
            Ok(()) => tracing::debug!("Reported status locked={}", locked),
            Err(e) => tracing::warn!("Failed to report device status: {}", e),
        }
    }

    async fn heartbeat(&mut self) {
        let sent_at = (self.device_clock)();
        let record = HeartbeatRecord::new(&self.device_id, sent_at);

        let ack = match with_deadline(self.request_timeout, self.authority.heartbeat(&record)).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!("Failed to send heartbeat: {}", e);
                return;
            }
        };
        let received_at = (self.device_clock)();

        if self.clock.observe(sent_at, received_at, &ack) {
            let (offset, preferred) = (self.clock.offset_ms(), self.clock.is_server_preferred());
            if let Err(e) = self.store.update(|s| {
                s.clock_offset_ms = offset;
                s.server_time_preferred = preferred;
            }) {
                tracing::warn!("Failed to persist clock offset: {:#}", e);
            }
        }

        self.report_timezone_if_changed().await;
    }

    async fn report_timezone_if_changed(&self) {
        let timezone = self.controller.platform().timezone();
        if self.store.snapshot().last_reported_timezone.as_deref() == Some(timezone.as_str()) {
            return;
        }

        match with_deadline(
            self.request_timeout,
            self.authority.update_timezone(&self.device_id, &timezone),
        )
        .await
        {
            Ok(()) => {
                tracing::info!("Device timezone reported: {}", timezone);
                if let Err(e) = self
                    .store
                    .update(|s| s.last_reported_timezone = Some(timezone.clone()))
                {
                    tracing::warn!("Failed to persist timezone: {:#}", e);
                }
            }
            Err(e) => tracing::warn!("Timezone update failed: {}", e),
        }
    }
}

fn initial_status_line(compliance: &ComplianceState) -> String {
    if compliance.locked {
        format!("Restricted: {}", compliance.applied_level.describe())
    } else {
        "No active schedule".to_string()
    }
}

/// SHA-256 fingerprint of a schedule list
pub fn schedules_fingerprint(schedules: &[Schedule]) -> String {
    let encoded = serde_json::to_vec(schedules).unwrap_or_default();
    format!("sha256:{:x}", Sha256::digest(&encoded))
}
