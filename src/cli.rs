use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Curfew Agent
///
/// Enforces the bedtime and study-time schedules a parent sets on the
/// dashboard: locks the session and cuts network access while a schedule
/// is active, and guards its own removal behind parental approval.
#[derive(Parser, Debug)]
#[command(name = "curfew-agent")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the agent configuration file
    #[arg(long, global = true)]
    pub agent_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the agent configuration
    Setup {
        /// Base URL of the parent dashboard API (https)
        #[arg(long)]
        url: String,

        /// Device identifier registered on the dashboard
        #[arg(long)]
        device_id: String,

        /// Bearer token for the dashboard API
        #[arg(long)]
        token: Option<String>,

        /// Seconds between compliance checks
        #[arg(long, default_value = "30")]
        check_interval: u64,
    },
    /// Run the agent in the foreground until stopped
    Start,
    /// Run a single compliance check now
    CheckNow,
    /// Show agent status
    Status,
    /// Grant the agent device management privilege
    Enroll,
    /// Ask a parent for permission to remove device management
    Unenroll,
}
