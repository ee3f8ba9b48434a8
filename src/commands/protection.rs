use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tokio::sync::watch;

use crate::agent::daemon::spawn_signal_handler;
use crate::agent::{AgentContext, StateStore};
use crate::platform;
use crate::protection::prompt::spawn_stdin_codes;
use crate::protection::{AdminProtection, ProtectionState, TerminalPrompt};

use super::agent::load_config;
use super::utils::{init_logging, require_admin};

/// Grant the agent management privilege and remember the enrollment
pub fn enroll(config_path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(verbose, Some(&config.logging.level));
    require_admin();

    let platform = platform::current();
    if platform.is_management_privilege_active() {
        println!("✓ Device management is already active");
        return Ok(());
    }

    platform
        .activate_management_privilege()
        .context("Failed to activate device management")?;

    let store = StateStore::open_default()?;
    let device_id = config.authority.device_id.clone();
    store.update(|state| {
        state.device_id = Some(device_id);
        state.enrolled_at = Some(Utc::now());
    })?;

    println!("✓ Device management activated");
    println!();
    println!("Removing it later requires a parent's approval and secret code:");
    println!("  sudo curfew-agent unenroll");

    Ok(())
}

/// Revoke intent: run the parental-approval handshake in the terminal
pub fn unenroll(config_path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(verbose, Some(&config.logging.level));
    require_admin();

    if !platform::current().is_management_privilege_active() {
        println!("Device management is not active; nothing to remove.");
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        let context = AgentContext::from_config(config)?;
        let protection = AdminProtection::new(
            &context.config,
            context.authority.clone(),
            context.controller.clone(),
            context.store.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_signal_handler(shutdown_tx);
        let mut codes = spawn_stdin_codes();

        Ok::<_, anyhow::Error>(
            protection
                .on_revoke_intent(&TerminalPrompt, &mut codes, shutdown_rx)
                .await,
        )
    });
    // The stdin reader may still be blocked on a read
    runtime.shutdown_background();

    match outcome? {
        ProtectionState::Released { .. } => {
            let store = StateStore::open_default()?;
            store.update(|state| state.enrolled_at = None)?;
            Ok(())
        }
        ProtectionState::Idle => anyhow::bail!("Uninstall request was not completed"),
        other => {
            tracing::debug!("Unenroll finished in state {:?}", other);
            std::process::exit(2);
        }
    }
}
