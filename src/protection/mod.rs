//! Uninstall protection.
//!
//! A revoke attempt does not release management privilege directly. It opens
//! a request with the remote authority, waits for a parent to approve or deny
//! it, and on approval still requires the parent's secret code. Denial,
//! timeout and cancellation all leave privilege in place.

pub mod prompt;

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::agent::config::{AgentConfig, ProtectionSettings};
use crate::agent::scheduler::{sleep_or_shutdown, wait_for_shutdown};
use crate::agent::state::{RequestStatus, StateStore, UninstallRecord};
use crate::authority::{RemoteAuthority, UninstallStatus};
use crate::error::with_deadline;
use crate::restriction::RestrictionController;

pub use prompt::{ProtectionPrompt, TerminalPrompt};

/// Where the handshake stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionState {
    Idle,
    RequestSent { request_id: String },
    Approved { request_id: String },
    Denied { request_id: String },
    TimedOut { request_id: String },
    Released { request_id: String },
}

impl ProtectionState {
    /// A request is outstanding (waiting for a verdict or a code)
    pub fn is_live(&self) -> bool {
        matches!(self, Self::RequestSent { .. } | Self::Approved { .. })
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::RequestSent { request_id }
            | Self::Approved { request_id }
            | Self::Denied { request_id }
            | Self::TimedOut { request_id }
            | Self::Released { request_id } => Some(request_id),
        }
    }
}

/// Poll cadence for the approval wait
#[derive(Debug, Clone, Copy)]
pub struct HandshakeTiming {
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub denied_grace_period: Duration,
}

impl From<&ProtectionSettings> for HandshakeTiming {
    fn from(settings: &ProtectionSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            max_polls: settings.max_polls,
            denied_grace_period: settings.denied_grace_period(),
        }
    }
}

enum Verdict {
    Approved,
    Denied,
    TimedOut,
    Cancelled,
}

pub struct AdminProtection {
    authority: Arc<dyn RemoteAuthority>,
    controller: Arc<RestrictionController>,
    store: Arc<StateStore>,
    device_id: String,
    timing: HandshakeTiming,
    request_timeout: Duration,
    live: AtomicBool,
    state: Mutex<ProtectionState>,
}

impl AdminProtection {
    pub fn new(
        config: &AgentConfig,
        authority: Arc<dyn RemoteAuthority>,
        controller: Arc<RestrictionController>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            authority,
            controller,
            store,
            device_id: config.authority.device_id.clone(),
            timing: HandshakeTiming::from(&config.protection),
            request_timeout: config.authority.request_timeout(),
            live: AtomicBool::new(false),
            state: Mutex::new(ProtectionState::Idle),
        }
    }

    pub fn with_timing(mut self, timing: HandshakeTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> ProtectionState {
        self.state_guard().clone()
    }

    /// Handle a revoke intent and run the handshake to its end.
    ///
    /// A second intent while a request is outstanding in this process is
    /// ignored and returns the current state. A request left pending or
    /// approved by an earlier run is resumed instead of opening a new one.
    /// Codes are read from `codes` once approved.
    pub async fn on_revoke_intent(
        &self,
        prompt: &dyn ProtectionPrompt,
        codes: &mut mpsc::Receiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ProtectionState {
        if self.live.swap(true, Ordering::SeqCst) {
            tracing::info!("Revoke intent ignored; a request is already outstanding");
            return self.state();
        }

        let outcome = self.handshake(prompt, codes, &mut shutdown).await;
        self.live.store(false, Ordering::SeqCst);
        outcome
    }

    async fn handshake(
        &self,
        prompt: &dyn ProtectionPrompt,
        codes: &mut mpsc::Receiver<String>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ProtectionState {
        let (request_id, resumed) = match self.outstanding_request() {
            Some(record) => {
                tracing::info!(
                    "Resuming uninstall request {} ({:?})",
                    record.request_id,
                    record.status
                );
                (record.request_id, Some(record.status))
            }
            None => match with_deadline(
                self.request_timeout,
                self.authority.create_uninstall_request(&self.device_id),
            )
            .await
            {
                Ok(id) => {
                    tracing::info!("Uninstall request {} sent; waiting for parent", id);
                    (id, None)
                }
                Err(e) => {
                    tracing::warn!("Could not create uninstall request: {}", e);
                    prompt.request_failed(&e.to_string());
                    return self.transition(ProtectionState::Idle, None);
                }
            },
        };

        if resumed == Some(RequestStatus::Approved) {
            self.transition(
                ProtectionState::Approved {
                    request_id: request_id.clone(),
                },
                None,
            );
            return self.collect_code(request_id, prompt, codes, shutdown).await;
        }

        // A resumed request keeps its original timestamp so it still expires
        self.transition(
            ProtectionState::RequestSent {
                request_id: request_id.clone(),
            },
            resumed.is_none().then_some(RequestStatus::Pending),
        );
        prompt.waiting(&request_id);

        match self.await_verdict(&request_id, prompt, shutdown).await {
            Verdict::Approved => {
                tracing::info!("Uninstall request {} approved", request_id);
                self.transition(
                    ProtectionState::Approved {
                        request_id: request_id.clone(),
                    },
                    Some(RequestStatus::Approved),
                );
                self.collect_code(request_id, prompt, codes, shutdown).await
            }
            Verdict::Denied => {
                tracing::info!("Uninstall request {} denied", request_id);
                let state = self.transition(
                    ProtectionState::Denied { request_id },
                    Some(RequestStatus::Denied),
                );
                prompt.denied();
                sleep_or_shutdown(self.timing.denied_grace_period, shutdown).await;
                prompt.dismissed();
                state
            }
            Verdict::TimedOut => {
                tracing::warn!(
                    "Uninstall request {} unanswered after {} polls",
                    request_id,
                    self.timing.max_polls
                );
                let state = self.transition(
                    ProtectionState::TimedOut { request_id },
                    Some(RequestStatus::TimedOut),
                );
                prompt.timed_out();
                state
            }
            Verdict::Cancelled => {
                tracing::info!("Uninstall handshake cancelled; privilege kept");
                self.transition(ProtectionState::Idle, None)
            }
        }
    }

    /// Persisted request that is still pending or approved and younger than
    /// one full approval wait
    fn outstanding_request(&self) -> Option<UninstallRecord> {
        let record = self.store.snapshot().uninstall_request?;
        if record.status.is_terminal() {
            return None;
        }

        let window = self.timing.poll_interval * self.timing.max_polls;
        let age = (Utc::now() - record.updated_at).to_std().unwrap_or_default();
        if age >= window {
            tracing::debug!("Uninstall request {} expired", record.request_id);
            return None;
        }
        Some(record)
    }

    async fn await_verdict(
        &self,
        request_id: &str,
        prompt: &dyn ProtectionPrompt,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Verdict {
        for attempt in 1..=self.timing.max_polls {
            if sleep_or_shutdown(self.timing.poll_interval, shutdown).await {
                return Verdict::Cancelled;
            }

            match with_deadline(
                self.request_timeout,
                self.authority.poll_uninstall_status(request_id),
            )
            .await
            {
                Ok(UninstallStatus::Approved) => return Verdict::Approved,
                Ok(UninstallStatus::Denied) => return Verdict::Denied,
                Ok(UninstallStatus::Pending) => {
                    tracing::debug!("Poll {}/{}: pending", attempt, self.timing.max_polls);
                }
                Err(e) => {
                    tracing::debug!("Poll {}/{} failed: {}", attempt, self.timing.max_polls, e);
                }
            }

            let remaining = self.timing.poll_interval * (self.timing.max_polls - attempt);
            prompt.still_waiting(remaining);
        }

        Verdict::TimedOut
    }

    async fn collect_code(
        &self,
        request_id: String,
        prompt: &dyn ProtectionPrompt,
        codes: &mut mpsc::Receiver<String>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ProtectionState {
        // Anything typed before approval does not count as a submission
        while codes.try_recv().is_ok() {}
        prompt.approved();

        loop {
            let code = tokio::select! {
                code = codes.recv() => code,
                _ = wait_for_shutdown(shutdown) => None,
            };

            let Some(code) = code else {
                tracing::info!("Code entry closed; privilege kept");
                return self.state();
            };

            let code = code.trim();
            if code.is_empty() {
                prompt.code_rejected("Please enter the secret code");
                continue;
            }

            let accepted = match with_deadline(
                self.request_timeout,
                self.authority.validate_secret_code(&self.device_id, code),
            )
            .await
            {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Secret code validation failed: {}", e);
                    false
                }
            };

            if !accepted {
                prompt.code_rejected("Invalid secret code");
                continue;
            }

            match self.controller.release_management_privilege().await {
                Ok(()) => {
                    tracing::info!("Secret code accepted; management privilege released");
                    let state = self.transition(
                        ProtectionState::Released { request_id },
                        Some(RequestStatus::Released),
                    );
                    prompt.released();
                    return state;
                }
                Err(e) => {
                    tracing::error!("Releasing management privilege failed: {}", e);
                    prompt.code_rejected(&format!("Could not release device management: {}", e));
                }
            }
        }
    }

    fn transition(&self, next: ProtectionState, persist: Option<RequestStatus>) -> ProtectionState {
        if let (Some(status), Some(request_id)) = (persist, next.request_id()) {
            let request_id = request_id.to_string();
            if let Err(e) = self.store.update(|s| s.record_request(&request_id, status)) {
                tracing::warn!("Failed to persist uninstall request: {:#}", e);
            }
        }

        *self.state_guard() = next.clone();
        next
    }

    fn state_guard(&self) -> std::sync::MutexGuard<'_, ProtectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
