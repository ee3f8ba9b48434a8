//! In-memory platform for tests. Records every primitive invoked and lets the
//! test decide which mechanisms exist and which of them fail.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ClassCapabilities, DevicePlatform, NetworkClass, NetworkState, RestrictionKind};
use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    Activate,
    Release,
    Lock,
    Toggle(NetworkClass, bool),
    AddRestriction(RestrictionKind),
    ClearRestriction(RestrictionKind),
    OpenSettings(NetworkClass),
}

pub struct FakePlatform {
    privileged: AtomicBool,
    capabilities: Mutex<ClassCapabilities>,
    fail_toggles: AtomicBool,
    fail_restrictions: AtomicBool,
    calls_supported: AtomicBool,
    states: Mutex<HashMap<NetworkClass, NetworkState>>,
    calls: Mutex<Vec<PlatformCall>>,
}

impl FakePlatform {
    /// Privileged, every mechanism available and succeeding
    pub fn new() -> Self {
        Self {
            privileged: AtomicBool::new(true),
            capabilities: Mutex::new(ClassCapabilities {
                direct_toggle: true,
                policy_restriction: true,
                settings_redirect: true,
            }),
            fail_toggles: AtomicBool::new(false),
            fail_restrictions: AtomicBool::new(false),
            calls_supported: AtomicBool::new(false),
            states: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_privileged(&self, active: bool) {
        self.privileged.store(active, Ordering::SeqCst);
    }

    pub fn set_capabilities(&self, caps: ClassCapabilities) {
        *self.capabilities.lock().unwrap() = caps;
    }

    pub fn fail_toggles(&self, fail: bool) {
        self.fail_toggles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restrictions(&self, fail: bool) {
        self.fail_restrictions.store(fail, Ordering::SeqCst);
    }

    pub fn support_calls(&self, supported: bool) {
        self.calls_supported.store(supported, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that change network state (toggles and network restrictions)
    pub fn network_changes(&self) -> Vec<PlatformCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    PlatformCall::Toggle(..)
                        | PlatformCall::AddRestriction(
                            RestrictionKind::ConfigWifi | RestrictionKind::ConfigMobileNetworks
                        )
                        | PlatformCall::ClearRestriction(
                            RestrictionKind::ConfigWifi | RestrictionKind::ConfigMobileNetworks
                        )
                )
            })
            .collect()
    }

    pub fn state_of(&self, class: NetworkClass) -> NetworkState {
        self.network_state(class)
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn set_state(&self, class: NetworkClass, state: NetworkState) {
        self.states.lock().unwrap().insert(class, state);
    }
}

fn class_for(kind: RestrictionKind) -> Option<NetworkClass> {
    match kind {
        RestrictionKind::ConfigWifi => Some(NetworkClass::Wifi),
        RestrictionKind::ConfigMobileNetworks => Some(NetworkClass::MobileData),
        RestrictionKind::OutgoingCalls => None,
    }
}

impl DevicePlatform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_management_privilege_active(&self) -> bool {
        self.privileged.load(Ordering::SeqCst)
    }

    fn activate_management_privilege(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::Activate);
        self.set_privileged(true);
        Ok(())
    }

    fn release_management_privilege(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::Release);
        self.set_privileged(false);
        Ok(())
    }

    fn lock_device_now(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::Lock);
        Ok(())
    }

    fn network_state(&self, class: NetworkClass) -> NetworkState {
        self.states
            .lock()
            .unwrap()
            .get(&class)
            .copied()
            .unwrap_or(NetworkState::Enabled)
    }

    fn capabilities(&self, _class: NetworkClass) -> ClassCapabilities {
        *self.capabilities.lock().unwrap()
    }

    fn toggle_network(&self, class: NetworkClass, enabled: bool) -> Result<(), PlatformError> {
        self.record(PlatformCall::Toggle(class, enabled));
        if self.fail_toggles.load(Ordering::SeqCst) {
            return Err(PlatformError::CommandFailed("toggle rejected".into()));
        }
        let state = if enabled {
            NetworkState::Enabled
        } else {
            NetworkState::Disabled
        };
        self.set_state(class, state);
        Ok(())
    }

    fn add_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError> {
        self.record(PlatformCall::AddRestriction(kind));
        let Some(class) = class_for(kind) else {
            return Ok(());
        };
        if self.fail_restrictions.load(Ordering::SeqCst) {
            return Err(PlatformError::CommandFailed("restriction rejected".into()));
        }
        self.set_state(class, NetworkState::Restricted);
        Ok(())
    }

    fn clear_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError> {
        self.record(PlatformCall::ClearRestriction(kind));
        let Some(class) = class_for(kind) else {
            if self.calls_supported.load(Ordering::SeqCst) {
                return Ok(());
            }
            return Err(PlatformError::CapabilityUnavailable("outgoing calls".into()));
        };
        if self.fail_restrictions.load(Ordering::SeqCst) {
            return Err(PlatformError::CommandFailed("restriction rejected".into()));
        }
        self.set_state(class, NetworkState::Enabled);
        Ok(())
    }

    fn open_network_settings(&self, class: NetworkClass) -> Result<(), PlatformError> {
        self.record(PlatformCall::OpenSettings(class));
        Ok(())
    }

    fn battery_level(&self) -> Option<u8> {
        Some(80)
    }

    fn timezone(&self) -> String {
        "Europe/Berlin".to_string()
    }
}
