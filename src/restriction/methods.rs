use serde::Serialize;
use std::fmt;

use crate::error::PlatformError;
use crate::platform::{ClassCapabilities, DevicePlatform, NetworkClass};

/// Ways of switching a network class, most capable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMethod {
    /// Privileged on/off switch
    DirectToggle,
    /// Management-policy restriction flag
    PolicyRestriction,
    /// Send the user to the settings screen; never counts as success
    ManualSettings,
}

impl EnforcementMethod {
    pub const AUTOMATIC: [EnforcementMethod; 2] = [Self::DirectToggle, Self::PolicyRestriction];

    pub fn is_viable(self, caps: &ClassCapabilities) -> bool {
        match self {
            Self::DirectToggle => caps.direct_toggle,
            Self::PolicyRestriction => caps.policy_restriction,
            Self::ManualSettings => caps.settings_redirect,
        }
    }

    fn attempt(
        self,
        platform: &dyn DevicePlatform,
        class: NetworkClass,
        enabled: bool,
    ) -> Result<(), PlatformError> {
        let restriction = class.restriction();
        match (self, enabled) {
            (Self::DirectToggle, _) => platform.toggle_network(class, enabled),
            (Self::PolicyRestriction, true) => platform.clear_restriction(restriction),
            (Self::PolicyRestriction, false) => platform.add_restriction(restriction),
            (Self::ManualSettings, _) => platform.open_network_settings(class),
        }
    }
}

impl fmt::Display for EnforcementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DirectToggle => "direct toggle",
            Self::PolicyRestriction => "policy restriction",
            Self::ManualSettings => "manual settings",
        };
        f.write_str(s)
    }
}

/// Result of one toggle. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReport {
    pub class: NetworkClass,
    pub enabled: bool,
    /// Methods that took effect, in the order they were tried
    pub applied_by: Vec<EnforcementMethod>,
    pub success: bool,
}

/// Switch `class` on or off through the viable methods.
///
/// Blocking stops at the first method that works. Lifting runs every viable
/// automatic method, since a leftover policy flag would keep the class off
/// even after a successful direct toggle. The settings redirect is only used
/// for lifting, and only when nothing automatic worked.
pub fn set_network_enabled(
    platform: &dyn DevicePlatform,
    class: NetworkClass,
    enabled: bool,
) -> ToggleReport {
    let caps = platform.capabilities(class);
    let mut applied_by = Vec::new();

    for method in EnforcementMethod::AUTOMATIC {
        if !method.is_viable(&caps) {
            tracing::debug!("{} not viable for {}", method, class);
            continue;
        }

        match method.attempt(platform, class, enabled) {
            Ok(()) => {
                tracing::debug!("{} {} via {}", verb(enabled), class, method);
                applied_by.push(method);
                if !enabled {
                    break;
                }
            }
            Err(e) => tracing::debug!("{} failed for {}: {}", method, class, e),
        }
    }

    if let Some(winner) = applied_by.first() {
        tracing::info!("{} {} ({})", verb(enabled), class, winner);
        return ToggleReport {
            class,
            enabled,
            applied_by,
            success: true,
        };
    }

    if enabled && EnforcementMethod::ManualSettings.is_viable(&caps) {
        match EnforcementMethod::ManualSettings.attempt(platform, class, enabled) {
            Ok(()) => tracing::warn!(
                "Could not enable {} automatically; opened settings for the user",
                class
            ),
            Err(e) => tracing::warn!("Could not enable {}; settings redirect failed: {}", class, e),
        }
    } else {
        tracing::warn!("No enforcement method could {} {}", verb(enabled).to_lowercase(), class);
    }

    ToggleReport {
        class,
        enabled,
        applied_by,
        success: false,
    }
}

fn verb(enabled: bool) -> &'static str {
    if enabled { "Enabled" } else { "Disabled" }
}
