//! Scripted remote authority for tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{HeartbeatAck, HeartbeatRecord, RemoteAuthority, StatusReport, UninstallStatus};
use crate::error::RemoteError;
use crate::schedule::Schedule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    FetchSchedules,
    ReportStatus { locked: bool },
    Heartbeat,
    UpdateTimezone(String),
    CreateUninstallRequest,
    PollUninstallStatus(String),
    ValidateSecretCode(String),
}

#[derive(Default)]
pub struct FakeAuthority {
    schedules: Mutex<Option<Vec<Schedule>>>,
    heartbeat_ack: Mutex<HeartbeatAck>,
    request_id: Mutex<Option<String>>,
    /// Consumed front to back; empty means pending
    poll_script: Mutex<VecDeque<Result<UninstallStatus, ()>>>,
    valid_code: Mutex<Option<String>>,
    calls: Mutex<Vec<AuthorityCall>>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            schedules: Mutex::new(Some(Vec::new())),
            heartbeat_ack: Mutex::new(HeartbeatAck {
                success: true,
                ..Default::default()
            }),
            request_id: Mutex::new(Some("req-1".to_string())),
            ..Default::default()
        }
    }

    pub fn with_schedules(schedules: Vec<Schedule>) -> Self {
        let fake = Self::new();
        fake.set_schedules(Some(schedules));
        fake
    }

    /// `None` makes every fetch fail
    pub fn set_schedules(&self, schedules: Option<Vec<Schedule>>) {
        *self.schedules.lock().unwrap() = schedules;
    }

    pub fn set_heartbeat_ack(&self, ack: HeartbeatAck) {
        *self.heartbeat_ack.lock().unwrap() = ack;
    }

    /// `None` makes request creation fail
    pub fn set_request_id(&self, id: Option<&str>) {
        *self.request_id.lock().unwrap() = id.map(str::to_string);
    }

    /// Queue poll answers; `Err(())` is a network failure
    pub fn script_polls(&self, answers: impl IntoIterator<Item = Result<UninstallStatus, ()>>) {
        self.poll_script.lock().unwrap().extend(answers);
    }

    pub fn set_valid_code(&self, code: &str) {
        *self.valid_code.lock().unwrap() = Some(code.to_string());
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&AuthorityCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn status_reports(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AuthorityCall::ReportStatus { locked } => Some(locked),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: AuthorityCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn offline() -> RemoteError {
    RemoteError::Transport("connection refused".to_string())
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn fetch_schedules(&self, _device_id: &str) -> Result<Vec<Schedule>, RemoteError> {
        self.record(AuthorityCall::FetchSchedules);
        self.schedules.lock().unwrap().clone().ok_or_else(offline)
    }

    async fn report_status(&self, _device_id: &str, report: &StatusReport) -> Result<(), RemoteError> {
        self.record(AuthorityCall::ReportStatus {
            locked: report.is_locked,
        });
        Ok(())
    }

    async fn heartbeat(&self, _record: &HeartbeatRecord) -> Result<HeartbeatAck, RemoteError> {
        self.record(AuthorityCall::Heartbeat);
        Ok(self.heartbeat_ack.lock().unwrap().clone())
    }

    async fn update_timezone(&self, _device_id: &str, timezone: &str) -> Result<(), RemoteError> {
        self.record(AuthorityCall::UpdateTimezone(timezone.to_string()));
        Ok(())
    }

    async fn create_uninstall_request(&self, _device_id: &str) -> Result<String, RemoteError> {
        self.record(AuthorityCall::CreateUninstallRequest);
        self.request_id.lock().unwrap().clone().ok_or_else(offline)
    }

    async fn poll_uninstall_status(&self, request_id: &str) -> Result<UninstallStatus, RemoteError> {
        self.record(AuthorityCall::PollUninstallStatus(request_id.to_string()));
        match self.poll_script.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(())) => Err(offline()),
            None => Ok(UninstallStatus::Pending),
        }
    }

    async fn validate_secret_code(&self, _device_id: &str, code: &str) -> Result<bool, RemoteError> {
        self.record(AuthorityCall::ValidateSecretCode(code.to_string()));
        let valid = self.valid_code.lock().unwrap();
        Ok(valid.as_deref() == Some(code))
    }
}
