// Agent runtime: configuration, persisted state, the compliance monitor and
// the daemon that supervises it.
//
// The daemon waits for management privilege, runs the monitor on a fixed
// interval against the remote authority, and tears it down (lifting all
// restrictions) when privilege is revoked or the process is stopped.

pub mod clock;
pub mod config;
pub mod daemon;
pub mod monitor;
pub mod scheduler;
pub mod state;

pub use config::{AgentConfig, get_agent_config_path};
pub use daemon::{AgentContext, run_agent_daemon};
pub use monitor::{ComplianceMonitor, CycleOutcome};
pub use state::{AgentState, RequestStatus, StateStore};
