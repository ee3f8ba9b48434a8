//! Restriction capability layer.
//!
//! Turns a graduated [`RestrictionLevel`] into per-class toggles on the
//! platform. All mutations (level changes, emergency access, privilege
//! release) share one async critical section so concurrent callers cannot
//! interleave half-applied Wi-Fi/mobile-data changes.

pub mod level;
pub mod methods;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::PlatformError;
use crate::platform::{DevicePlatform, NetworkClass, NetworkState, RestrictionKind};

pub use level::RestrictionLevel;
pub use methods::{EnforcementMethod, ToggleReport, set_network_enabled};

/// Read-only snapshot of what the agent can see and control
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub wifi_state: NetworkState,
    pub mobile_state: NetworkState,
    pub management_active: bool,
    pub can_control_wifi: bool,
    pub can_control_mobile_data: bool,
}

pub struct RestrictionController {
    platform: Arc<dyn DevicePlatform>,
    /// Last level fully applied by this process; `None` until the first
    /// successful application
    applied: Mutex<Option<RestrictionLevel>>,
}

impl RestrictionController {
    pub fn new(platform: Arc<dyn DevicePlatform>) -> Self {
        Self {
            platform,
            applied: Mutex::new(None),
        }
    }

    pub fn platform(&self) -> &Arc<dyn DevicePlatform> {
        &self.platform
    }

    /// Probe current state. Capabilities are asked fresh on every call.
    pub fn current_status(&self) -> NetworkStatus {
        let controllable = |class| {
            let caps = self.platform.capabilities(class);
            EnforcementMethod::AUTOMATIC
                .iter()
                .any(|m| m.is_viable(&caps))
        };

        NetworkStatus {
            wifi_state: self.platform.network_state(NetworkClass::Wifi),
            mobile_state: self.platform.network_state(NetworkClass::MobileData),
            management_active: self.platform.is_management_privilege_active(),
            can_control_wifi: controllable(NetworkClass::Wifi),
            can_control_mobile_data: controllable(NetworkClass::MobileData),
        }
    }

    pub async fn applied_level(&self) -> Option<RestrictionLevel> {
        *self.applied.lock().await
    }

    /// Bring the device to `level`.
    ///
    /// Re-applying the recorded level returns true without touching the
    /// platform. The level is recorded only when every toggle succeeded.
    pub async fn apply_level(&self, level: RestrictionLevel) -> bool {
        let mut applied = self.applied.lock().await;

        if *applied == Some(level) {
            tracing::debug!("{} already applied", level);
            return true;
        }

        self.emergency_access();

        let reports = self.enforce(level, *applied);
        let success = reports.iter().all(|r| r.success);

        if success {
            tracing::info!("Applied {}", level);
            *applied = Some(level);
        } else {
            let failed: Vec<String> = reports
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.class.to_string())
                .collect();
            tracing::warn!(
                "Partially applied {}; could not change {}",
                level,
                failed.join(", ")
            );
        }

        success
    }

    /// Make sure outgoing and emergency calls stay possible
    pub async fn ensure_emergency_access(&self) -> bool {
        let _guard = self.applied.lock().await;
        self.emergency_access()
    }

    /// Give up management privilege. Serialised with level changes.
    pub async fn release_management_privilege(&self) -> Result<(), PlatformError> {
        let mut applied = self.applied.lock().await;
        self.platform.release_management_privilege()?;
        *applied = None;
        Ok(())
    }

    pub fn lock_device_now(&self) -> Result<(), PlatformError> {
        self.platform.lock_device_now()
    }

    fn emergency_access(&self) -> bool {
        match self.platform.clear_restriction(RestrictionKind::OutgoingCalls) {
            Ok(()) => true,
            Err(e) if e.is_capability_gap() => {
                tracing::debug!("No call restriction to clear: {}", e);
                true
            }
            Err(e) => {
                // Levels never restrict calls, so a failed clear cannot deny them
                tracing::warn!("Clearing call restriction failed: {}", e);
                true
            }
        }
    }

    fn enforce(
        &self,
        level: RestrictionLevel,
        previous: Option<RestrictionLevel>,
    ) -> Vec<ToggleReport> {
        let platform = self.platform.as_ref();

        NetworkClass::ALL
            .into_iter()
            .filter_map(|class| {
                let blocked = |l: RestrictionLevel| match class {
                    NetworkClass::Wifi => l.blocks_wifi(),
                    NetworkClass::MobileData => l.blocks_mobile_data(),
                };

                let want_enabled = if level.touches_network() {
                    !blocked(level)
                } else if previous.is_some_and(blocked) {
                    // App-only level: only lift what the previous level imposed
                    true
                } else {
                    return None;
                };

                Some(set_network_enabled(platform, class, want_enabled))
            })
            .collect()
    }
}
