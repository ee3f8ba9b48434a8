use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::restriction::RestrictionLevel;

const STATE_VERSION: &str = "1.0";

/// Lock state as last reached by the compliance monitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComplianceState {
    pub locked: bool,
    pub applied_level: RestrictionLevel,
    pub last_applied_at: Option<DateTime<Utc>>,
}

/// Lifecycle of an uninstall (privilege revocation) request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    TimedOut,
    /// Approved, code accepted and privilege given up
    Released,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Approved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UninstallRecord {
    pub request_id: String,
    pub status: RequestStatus,
    pub updated_at: DateTime<Utc>,
}

/// Everything the agent persists between runs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentState {
    pub version: String,

    /// Random per-install identifier
    pub install_id: String,

    /// Device id recorded at enrollment
    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub enrolled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub compliance: ComplianceState,

    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,

    /// Fingerprint of the last fetched schedule list
    #[serde(default)]
    pub schedules_hash: Option<String>,

    /// Server minus device clock, milliseconds
    #[serde(default)]
    pub clock_offset_ms: i64,

    #[serde(default)]
    pub server_time_preferred: bool,

    #[serde(default)]
    pub last_reported_timezone: Option<String>,

    #[serde(default)]
    pub uninstall_request: Option<UninstallRecord>,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            install_id: Uuid::new_v4().to_string(),
            device_id: None,
            enrolled_at: None,
            compliance: ComplianceState::default(),
            last_checked: None,
            schedules_hash: None,
            clock_offset_ms: 0,
            server_time_preferred: false,
            last_reported_timezone: None,
            uninstall_request: None,
        }
    }

    /// Load state from `path`; a missing file or unknown version yields `None`
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: AgentState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version != STATE_VERSION {
            tracing::warn!(
                "State file version mismatch (expected {}, got {}). Treating as new state.",
                STATE_VERSION,
                state.version
            );
            return Ok(None);
        }

        Ok(Some(state))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;

        crate::platform::common::atomic_write(path, content.as_bytes(), 0o600)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        Ok(())
    }

    pub fn update_checked(&mut self, schedules_hash: String) {
        self.last_checked = Some(Utc::now());
        self.schedules_hash = Some(schedules_hash);
    }

    pub fn update_compliance(&mut self, locked: bool, level: RestrictionLevel) {
        self.compliance = ComplianceState {
            locked,
            applied_level: level,
            last_applied_at: Some(Utc::now()),
        };
    }

    pub fn record_request(&mut self, request_id: &str, status: RequestStatus) {
        self.uninstall_request = Some(UninstallRecord {
            request_id: request_id.to_string(),
            status,
            updated_at: Utc::now(),
        });
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, file-backed agent state.
///
/// Each [`update`](StateStore::update) mutates the in-memory copy and writes
/// the whole file atomically before releasing the lock.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<AgentState>,
}

impl StateStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = AgentState::load(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(get_agent_state_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> AgentState {
        self.guard().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> Result<R> {
        let mut state = self.guard();
        let result = f(&mut state);
        state.save(&self.path)?;
        Ok(result)
    }

    fn guard(&self) -> MutexGuard<'_, AgentState> {
        // State is plain data; a panic mid-update cannot leave it unusable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Get the agent state file path
pub fn get_agent_state_path() -> Result<PathBuf> {
    // Try system location first, fall back to user location
    let system_path = PathBuf::from("/var/lib/curfew-agent/state.json");
    if system_path.parent().map(|p| p.exists()).unwrap_or(false) {
        return Ok(system_path);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "curfew-agent") {
        return Ok(dirs.data_local_dir().join("state.json"));
    }

    anyhow::bail!("Could not determine state file location")
}
