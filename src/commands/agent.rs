use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use crate::agent::monitor::{CycleOutcome, SkipReason, Transition};
use crate::agent::scheduler::TickScheduler;
use crate::agent::{self, AgentConfig, AgentContext, StateStore};
use crate::authority::{HttpAuthority, RemoteAuthority};
use crate::platform;
use crate::restriction::RestrictionController;

use super::utils::{format_duration, init_logging, require_admin};

pub fn load_config(config_path: &Path) -> Result<AgentConfig> {
    AgentConfig::load(config_path).with_context(|| {
        format!(
            "Failed to load agent configuration from {}. Run 'curfew-agent setup' first.",
            config_path.display()
        )
    })
}

/// Write the agent configuration after checking the dashboard answers
pub fn setup(
    config_path: &Path,
    url: String,
    device_id: String,
    token: Option<String>,
    check_interval: u64,
    verbose: bool,
) -> Result<()> {
    init_logging(verbose, None);
    require_admin();

    println!("Curfew Agent - Setup");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let mut config = AgentConfig::new(url, device_id);
    config.authority.access_token = token;
    config.monitor.check_interval = check_interval;
    config.validate().context("Invalid configuration")?;

    println!("Testing connection to the parent dashboard...");

    let runtime = tokio::runtime::Runtime::new()?;
    let schedules = runtime.block_on(async {
        let authority = HttpAuthority::new(&config.authority)?;
        authority
            .fetch_schedules(&config.authority.device_id)
            .await
            .context("Failed to fetch schedules from the dashboard")
    })?;
    println!("✓ Dashboard reachable ({} schedules)", schedules.len());

    config.save(config_path)?;
    println!("✓ Configuration saved to: {}", config_path.display());

    println!();
    println!("Agent configured successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Grant device management:");
    println!("     sudo curfew-agent enroll");
    println!("  2. Start the agent:");
    println!("     sudo curfew-agent start");
    println!();
    println!(
        "The agent will check schedules every {} seconds.",
        check_interval
    );

    Ok(())
}

/// Run the daemon in the foreground
pub fn start(config_path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(verbose, Some(&config.logging.level));
    require_admin();

    println!("Starting agent in foreground mode...");
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(agent::run_agent_daemon(config))
}

/// Run one compliance cycle and report what happened
pub fn check_now(config_path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(verbose, Some(&config.logging.level));
    require_admin();

    println!("Checking schedules...");

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        let context = AgentContext::from_config(config)?;
        let mut monitor = context.monitor();
        Ok::<_, anyhow::Error>(monitor.run_cycle().await)
    })?;

    match outcome {
        CycleOutcome::Skipped(SkipReason::PrivilegeInactive) => {
            println!("✗ Device management is not active. Run 'curfew-agent enroll' first.");
        }
        CycleOutcome::Skipped(SkipReason::FetchFailed) => {
            anyhow::bail!("Could not fetch schedules from the dashboard");
        }
        CycleOutcome::Completed { transition, level } => {
            let verb = match transition {
                Transition::Locked => "Device locked",
                Transition::Unlocked => "Device unlocked",
                Transition::LevelChanged => "Restriction changed",
                Transition::Unchanged => "No change",
            };
            println!("✓ {}: {}", verb, level);
        }
    }

    Ok(())
}

/// Show configuration, persisted state and what the platform reports
pub fn status(config_path: &Path, verbose: bool) -> Result<()> {
    init_logging(verbose, None);
    println!("Curfew Agent Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = load_config(config_path)?;
    println!("Dashboard:      {}", config.authority.base_url);
    println!("Device id:      {}", config.authority.device_id);
    println!("Check interval: {} seconds", config.monitor.check_interval);

    let store = StateStore::open_default()?;
    let state = store.snapshot();
    println!("State file:     {}", store.path().display());
    println!("Install id:     {}", state.install_id);
    println!();

    match state.last_checked {
        Some(last_checked) => {
            let ago = Utc::now() - last_checked;
            println!(
                "Last checked:   {} ({} ago)",
                last_checked.format("%Y-%m-%d %H:%M:%S %Z"),
                format_duration(ago)
            );
            let scheduler = TickScheduler::new(config.monitor.check_interval());
            println!(
                "Next check:     ~{}",
                scheduler.next_tick_time().format("%Y-%m-%d %H:%M:%S %Z")
            );
        }
        None => println!("Status:         Not yet run"),
    }

    let compliance = &state.compliance;
    println!(
        "Schedule state: {}",
        if compliance.locked { "LOCKED" } else { "unlocked" }
    );
    println!("Applied:        {}", compliance.applied_level);
    if let Some(at) = compliance.last_applied_at {
        println!("Applied at:     {}", at.format("%Y-%m-%d %H:%M:%S %Z"));
    }
    if let Some(hash) = &state.schedules_hash {
        println!("Schedules hash: {}", hash);
    }
    if state.server_time_preferred {
        println!(
            "Clock:          server time (offset {} ms)",
            state.clock_offset_ms
        );
    }
    if let Some(request) = &state.uninstall_request {
        println!(
            "Uninstall req:  {} ({:?}, {})",
            request.request_id,
            request.status,
            request.updated_at.format("%Y-%m-%d %H:%M:%S %Z")
        );
    }

    let controller = RestrictionController::new(platform::current());
    let network = controller.current_status();
    println!();
    println!("Platform:       {}", controller.platform().name());
    println!(
        "Management:     {}",
        if network.management_active { "active" } else { "inactive" }
    );
    println!(
        "Wi-Fi:          {}{}",
        network.wifi_state,
        if network.can_control_wifi { "" } else { " (not controllable)" }
    );
    println!(
        "Mobile data:    {}{}",
        network.mobile_state,
        if network.can_control_mobile_data { "" } else { " (not controllable)" }
    );

    Ok(())
}
