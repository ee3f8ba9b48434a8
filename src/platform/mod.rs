//! Platform integration for the enforcement core.
//!
//! Everything the agent does to the device goes through [`DevicePlatform`].
//! The implementation is chosen at build time for the target OS; there is no
//! runtime discovery of private platform APIs. Each primitive is fallible and
//! the core never assumes one succeeded.

pub mod common;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod unsupported;

#[cfg(test)]
pub mod fake;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::PlatformError;

pub use common::ensure_admin_privileges;

/// A network class the agent can enable or disable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    Wifi,
    MobileData,
}

impl NetworkClass {
    pub const ALL: [NetworkClass; 2] = [Self::Wifi, Self::MobileData];

    /// Policy restriction that stops the user from reconfiguring this class
    pub fn restriction(self) -> RestrictionKind {
        match self {
            Self::Wifi => RestrictionKind::ConfigWifi,
            Self::MobileData => RestrictionKind::ConfigMobileNetworks,
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wifi => write!(f, "Wi-Fi"),
            Self::MobileData => write!(f, "mobile data"),
        }
    }
}

/// Management-policy restriction flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionKind {
    ConfigWifi,
    ConfigMobileNetworks,
    OutgoingCalls,
}

impl RestrictionKind {
    pub fn slug(self) -> &'static str {
        match self {
            Self::ConfigWifi => "wifi",
            Self::ConfigMobileNetworks => "mobile-networks",
            Self::OutgoingCalls => "outgoing-calls",
        }
    }
}

/// Observed state of a network class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Enabled,
    Disabled,
    Restricted,
    Unknown,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Restricted => "restricted",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Which enforcement mechanisms are usable for one class right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassCapabilities {
    pub direct_toggle: bool,
    pub policy_restriction: bool,
    pub settings_redirect: bool,
}

/// Platform primitives consumed by the enforcement core
pub trait DevicePlatform: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_management_privilege_active(&self) -> bool;

    /// Grant management privilege to the agent (enrollment)
    fn activate_management_privilege(&self) -> Result<(), PlatformError>;

    fn release_management_privilege(&self) -> Result<(), PlatformError>;

    fn lock_device_now(&self) -> Result<(), PlatformError>;

    fn network_state(&self, class: NetworkClass) -> NetworkState;

    /// Recomputed on every call from platform version and privilege state
    fn capabilities(&self, class: NetworkClass) -> ClassCapabilities;

    /// Privileged direct on/off switch for a network class
    fn toggle_network(&self, class: NetworkClass, enabled: bool) -> Result<(), PlatformError>;

    fn add_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError>;

    fn clear_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError>;

    /// Bring up the settings screen so the user can change the class by hand
    fn open_network_settings(&self, class: NetworkClass) -> Result<(), PlatformError>;

    fn battery_level(&self) -> Option<u8>;

    /// IANA timezone name of the device
    fn timezone(&self) -> String;
}

/// The platform provider for the target this binary was built for
pub fn current() -> Arc<dyn DevicePlatform> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::LinuxPlatform::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(unsupported::UnsupportedPlatform)
    }
}
