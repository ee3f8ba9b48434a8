//! Linux provider.
//!
//! Management privilege is modelled as "running as root with the enrollment
//! marker present". Network classes are driven through NetworkManager
//! (`nmcli`) and `rfkill`; the policy restriction additionally drops a polkit
//! rule so unprivileged users cannot flip the radio back on.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::common;
use super::{ClassCapabilities, DevicePlatform, NetworkClass, NetworkState, RestrictionKind};
use crate::error::PlatformError;

const DEFAULT_ENROLLMENT_MARKER: &str = "/var/lib/curfew-agent/enrolled";
const DEFAULT_POLKIT_RULES_DIR: &str = "/etc/polkit-1/rules.d";
const DEFAULT_POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Screen lockers in order of preference
const LOCK_COMMANDS: &[(&str, &[&str])] = &[
    ("loginctl", &["lock-sessions"]),
    ("xdg-screensaver", &["lock"]),
    ("gnome-screensaver-command", &["--lock"]),
    ("cinnamon-screensaver-command", &["--lock"]),
    ("mate-screensaver-command", &["--lock"]),
    ("xscreensaver-command", &["-lock"]),
    ("light-locker-command", &["--lock"]),
];

pub struct LinuxPlatform {
    enrollment_marker: PathBuf,
    polkit_rules_dir: PathBuf,
    power_supply_dir: PathBuf,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self::with_paths(
            PathBuf::from(DEFAULT_ENROLLMENT_MARKER),
            PathBuf::from(DEFAULT_POLKIT_RULES_DIR),
            PathBuf::from(DEFAULT_POWER_SUPPLY_DIR),
        )
    }

    pub fn with_paths(
        enrollment_marker: PathBuf,
        polkit_rules_dir: PathBuf,
        power_supply_dir: PathBuf,
    ) -> Self {
        Self {
            enrollment_marker,
            polkit_rules_dir,
            power_supply_dir,
        }
    }

    fn rule_path(&self, kind: RestrictionKind) -> PathBuf {
        self.polkit_rules_dir
            .join(format!("60-curfew-agent-{}.rules", kind.slug()))
    }

    fn require_root(&self, what: &str) -> Result<(), PlatformError> {
        if common::is_root() {
            Ok(())
        } else {
            Err(PlatformError::PermissionDenied(format!(
                "{} requires root",
                what
            )))
        }
    }
}

impl DevicePlatform for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn is_management_privilege_active(&self) -> bool {
        common::is_root() && self.enrollment_marker.exists()
    }

    fn activate_management_privilege(&self) -> Result<(), PlatformError> {
        self.require_root("enrollment")?;

        let stamp = chrono::Utc::now().to_rfc3339();
        common::atomic_write(&self.enrollment_marker, stamp.as_bytes(), 0o600)
            .map_err(|e| PlatformError::CommandFailed(format!("{:#}", e)))?;

        tracing::info!(
            "Enrollment marker written to {}",
            self.enrollment_marker.display()
        );
        Ok(())
    }

    fn release_management_privilege(&self) -> Result<(), PlatformError> {
        self.require_root("releasing management privilege")?;

        common::remove_file_if_exists(&self.enrollment_marker)
            .map_err(|e| PlatformError::CommandFailed(format!("{:#}", e)))?;

        tracing::info!(
            "Enrollment marker removed from {}",
            self.enrollment_marker.display()
        );
        Ok(())
    }

    fn lock_device_now(&self) -> Result<(), PlatformError> {
        for (cmd, args) in LOCK_COMMANDS {
            match try_command(cmd, args) {
                Ok(()) => {
                    tracing::debug!("Screen locked with {}", cmd);
                    return Ok(());
                }
                Err(e) => tracing::debug!("Lock via {} failed: {}", cmd, e),
            }
        }

        Err(PlatformError::CapabilityUnavailable(
            "screen locking".to_string(),
        ))
    }

    fn network_state(&self, class: NetworkClass) -> NetworkState {
        let restricted = self.rule_path(class.restriction()).exists();

        let radio = command_output("nmcli", &["radio", radio_name(class)])
            .ok()
            .and_then(|out| parse_radio_state(&out));

        match (radio, restricted) {
            (Some(false), true) | (None, true) => NetworkState::Restricted,
            (Some(true), _) => NetworkState::Enabled,
            (Some(false), false) => NetworkState::Disabled,
            (None, false) => NetworkState::Unknown,
        }
    }

    fn capabilities(&self, _class: NetworkClass) -> ClassCapabilities {
        let root = common::is_root();
        ClassCapabilities {
            direct_toggle: root && find_in_path("nmcli").is_some(),
            policy_restriction: root && find_in_path("rfkill").is_some(),
            settings_redirect: find_in_path("gnome-control-center").is_some(),
        }
    }

    fn toggle_network(&self, class: NetworkClass, enabled: bool) -> Result<(), PlatformError> {
        self.require_root("toggling radios")?;

        let state = if enabled { "on" } else { "off" };
        try_command("nmcli", &["radio", radio_name(class), state])
    }

    fn add_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError> {
        let Some(device) = rfkill_type(kind) else {
            return Err(PlatformError::CapabilityUnavailable(format!(
                "{} restriction",
                kind.slug()
            )));
        };
        self.require_root("rfkill")?;

        write_rule_file(&self.rule_path(kind), kind)?;
        try_command("rfkill", &["block", device])
    }

    fn clear_restriction(&self, kind: RestrictionKind) -> Result<(), PlatformError> {
        let Some(device) = rfkill_type(kind) else {
            // No telephony stack here; only stale rule files can exist
            remove_rule_file(&self.rule_path(kind))?;
            return Ok(());
        };
        self.require_root("rfkill")?;

        remove_rule_file(&self.rule_path(kind))?;
        try_command("rfkill", &["unblock", device])
    }

    fn open_network_settings(&self, class: NetworkClass) -> Result<(), PlatformError> {
        let panel = match class {
            NetworkClass::Wifi => "wifi",
            NetworkClass::MobileData => "wwan",
        };

        Command::new("gnome-control-center")
            .arg(panel)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| spawn_error("gnome-control-center", e))
    }

    fn battery_level(&self) -> Option<u8> {
        read_battery_capacity(&self.power_supply_dir)
    }

    fn timezone(&self) -> String {
        detect_timezone()
    }
}

fn radio_name(class: NetworkClass) -> &'static str {
    match class {
        NetworkClass::Wifi => "wifi",
        NetworkClass::MobileData => "wwan",
    }
}

fn rfkill_type(kind: RestrictionKind) -> Option<&'static str> {
    match kind {
        RestrictionKind::ConfigWifi => Some("wlan"),
        RestrictionKind::ConfigMobileNetworks => Some("wwan"),
        RestrictionKind::OutgoingCalls => None,
    }
}

fn polkit_action(kind: RestrictionKind) -> &'static str {
    match kind {
        RestrictionKind::ConfigWifi => "org.freedesktop.NetworkManager.enable-disable-wifi",
        RestrictionKind::ConfigMobileNetworks => "org.freedesktop.NetworkManager.enable-disable-wwan",
        RestrictionKind::OutgoingCalls => "org.freedesktop.ModemManager1.Voice",
    }
}

/// Polkit rule refusing the radio action to everyone but root
fn rule_contents(kind: RestrictionKind) -> String {
    format!(
        "// Managed by curfew-agent. Removed automatically when restrictions lift.\n\
         polkit.addRule(function(action, subject) {{\n\
         \x20   if (action.id == \"{}\" && subject.user != \"root\") {{\n\
         \x20       return polkit.Result.NO;\n\
         \x20   }}\n\
         }});\n",
        polkit_action(kind)
    )
}

fn write_rule_file(path: &Path, kind: RestrictionKind) -> Result<(), PlatformError> {
    common::atomic_write(path, rule_contents(kind).as_bytes(), 0o644)
        .map_err(|e| PlatformError::CommandFailed(format!("{:#}", e)))
}

fn remove_rule_file(path: &Path) -> Result<(), PlatformError> {
    common::remove_file_if_exists(path)
        .map(|_| ())
        .map_err(|e| PlatformError::CommandFailed(format!("{:#}", e)))
}

fn parse_radio_state(output: &str) -> Option<bool> {
    match output.trim() {
        "enabled" => Some(true),
        "disabled" => Some(false),
        _ => None,
    }
}

fn spawn_error(cmd: &str, err: std::io::Error) -> PlatformError {
    if err.kind() == ErrorKind::NotFound {
        PlatformError::CapabilityUnavailable(cmd.to_string())
    } else {
        PlatformError::CommandFailed(format!("{}: {}", cmd, err))
    }
}

/// Run a command, succeeding only on exit status 0
fn try_command(cmd: &str, args: &[&str]) -> Result<(), PlatformError> {
    command_output(cmd, args).map(|_| ())
}

fn command_output(cmd: &str, args: &[&str]) -> Result<String, PlatformError> {
    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PlatformError::CommandFailed(format!(
            "{} {} exited with {}: {}",
            cmd,
            args.join(" "),
            output.status,
            stderr.trim()
        )))
    }
}

fn find_in_path(cmd: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

/// First readable `BAT*/capacity` under the power-supply class directory
fn read_battery_capacity(power_supply_dir: &Path) -> Option<u8> {
    let mut batteries: Vec<PathBuf> = std::fs::read_dir(power_supply_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("BAT"))
        .map(|entry| entry.path())
        .collect();
    batteries.sort();

    batteries.iter().find_map(|dir| {
        let raw = std::fs::read_to_string(dir.join("capacity")).ok()?;
        let value: u32 = raw.trim().parse().ok()?;
        Some(value.min(100) as u8)
    })
}

fn detect_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }

    if let Ok(contents) = std::fs::read_to_string("/etc/timezone") {
        let tz = contents.trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }

    std::fs::read_link("/etc/localtime")
        .ok()
        .and_then(|target| timezone_from_zoneinfo_path(&target))
        .unwrap_or_else(|| "UTC".to_string())
}

/// "/usr/share/zoneinfo/Europe/Berlin" -> "Europe/Berlin"
fn timezone_from_zoneinfo_path(path: &Path) -> Option<String> {
    let text = path.to_str()?;
    let (_, name) = text.split_once("zoneinfo/")?;
    let name = name.trim_start_matches("posix/").trim_start_matches("right/");
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
