//! Provider for targets without an enforcement backend. Every primitive
//! reports itself unavailable, so the agent runs but enforces nothing.

use super::{ClassCapabilities, DevicePlatform, NetworkClass, NetworkState, RestrictionKind};
use crate::error::PlatformError;

pub struct UnsupportedPlatform;

fn unavailable(what: &str) -> PlatformError {
    PlatformError::CapabilityUnavailable(format!("{} on {}", what, std::env::consts::OS))
}

impl DevicePlatform for UnsupportedPlatform {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn is_management_privilege_active(&self) -> bool {
        false
    }

    fn activate_management_privilege(&self) -> Result<(), PlatformError> {
        Err(unavailable("enrollment"))
    }

    fn release_management_privilege(&self) -> Result<(), PlatformError> {
        Err(unavailable("management privilege"))
    }

    fn lock_device_now(&self) -> Result<(), PlatformError> {
        Err(unavailable("screen locking"))
    }

    fn network_state(&self, _class: NetworkClass) -> NetworkState {
        NetworkState::Unknown
    }

    fn capabilities(&self, _class: NetworkClass) -> ClassCapabilities {
        ClassCapabilities::default()
    }

    fn toggle_network(&self, class: NetworkClass, _enabled: bool) -> Result<(), PlatformError> {
        Err(unavailable(&format!("{} toggling", class)))
    }

    fn add_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError> {
        Err(unavailable(kind.slug()))
    }

    fn clear_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError> {
        Err(unavailable(kind.slug()))
    }

    fn open_network_settings(&self, class: NetworkClass) -> Result<(), PlatformError> {
        Err(unavailable(&format!("{} settings", class)))
    }

    fn battery_level(&self) -> Option<u8> {
        None
    }

    fn timezone(&self) -> String {
        std::env::var("TZ")
            .ok()
            .filter(|tz| !tz.is_empty())
            .unwrap_or_else(|| "UTC".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_controllable() {
        let platform = UnsupportedPlatform;
        for class in NetworkClass::ALL {
            assert_eq!(platform.capabilities(class), ClassCapabilities::default());
            assert!(platform.toggle_network(class, false).unwrap_err().is_capability_gap());
        }
        assert!(!platform.is_management_privilege_active());
    }
}
