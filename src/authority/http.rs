use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::{HeartbeatAck, HeartbeatRecord, RemoteAuthority, StatusReport, UninstallStatus};
use crate::agent::config::AuthorityConfig;
use crate::error::RemoteError;
use crate::schedule::Schedule;

/// Generic `{success, message}` envelope used by the mutation endpoints
#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UninstallRequestAck {
    /// Some servers send a number, others a string
    #[serde(default)]
    request_id: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl UninstallRequestAck {
    fn request_id(&self) -> Option<String> {
        let id = match self.request_id.as_ref()? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Debug, Deserialize)]
struct UninstallStatusBody {
    #[serde(default)]
    status: Option<String>,
}

/// Remote authority over HTTPS + JSON
pub struct HttpAuthority {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpAuthority {
    pub fn new(config: &AuthorityConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).context("Invalid authority URL")?;

        if base_url.scheme() != "https" {
            anyhow::bail!(
                "Authority URL must use HTTPS for security (got: {})",
                base_url.scheme()
            );
        }

        // Relative joins replace the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(format!("curfew-agent/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout))
            .https_only(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
        })
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::Transport(format!("base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorized(request).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(
                    "Authority refused access ({}); check access_token and device_id",
                    response.status()
                );
                Err(RemoteError::Status {
                    status: response.status().as_u16(),
                })
            }
            status => Err(RemoteError::Status {
                status: status.as_u16(),
            }),
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Accept any 2xx body; log a `success: false` envelope without failing
    async fn expect_ack(response: Response, what: &str) -> Result<(), RemoteError> {
        let body = response.bytes().await?;
        if let Ok(ack) = serde_json::from_slice::<Ack>(&body) {
            if !ack.success {
                tracing::debug!(
                    "Authority did not confirm {}: {}",
                    what,
                    ack.message.as_deref().unwrap_or("no message")
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn fetch_schedules(&self, device_id: &str) -> Result<Vec<Schedule>, RemoteError> {
        let url = self.endpoint(&["api", "companion", "schedules", device_id])?;
        tracing::debug!("Fetching schedules from: {}", url);

        let response = self.send(self.client.get(url)).await?;
        let schedules: Vec<Schedule> = Self::json(response).await?;

        tracing::debug!("Fetched {} schedule(s)", schedules.len());
        Ok(schedules)
    }

    async fn report_status(&self, device_id: &str, report: &StatusReport) -> Result<(), RemoteError> {
        let url = self.endpoint(&["api", "companion", "status", device_id])?;
        let response = self.send(self.client.put(url).json(report)).await?;
        Self::expect_ack(response, "status report").await
    }

    async fn heartbeat(&self, record: &HeartbeatRecord) -> Result<HeartbeatAck, RemoteError> {
        let url = self.endpoint(&["api", "companion", "heartbeat"])?;
        let response = self.send(self.client.post(url).json(record)).await?;
        Self::json(response).await
    }

    async fn update_timezone(&self, device_id: &str, timezone: &str) -> Result<(), RemoteError> {
        let url = self.endpoint(&["api", "companion", "timezone", device_id])?;
        let body = serde_json::json!({ "timezone": timezone });
        let response = self.send(self.client.put(url).json(&body)).await?;
        Self::expect_ack(response, "timezone update").await
    }

    async fn create_uninstall_request(&self, device_id: &str) -> Result<String, RemoteError> {
        let url = self.endpoint(&["api", "companion", "request-uninstall"])?;
        let body = serde_json::json!({
            "deviceImei": device_id,
            "requestType": "device_admin_disable",
        });

        let response = self.send(self.client.post(url).json(&body)).await?;
        let ack: UninstallRequestAck = Self::json(response).await?;

        // A request id is enough; `success` is informational here
        match ack.request_id() {
            Some(id) => Ok(id),
            None => Err(RemoteError::Decode(format!(
                "uninstall request not accepted: {}",
                ack.message.as_deref().unwrap_or("no request id returned")
            ))),
        }
    }

    async fn poll_uninstall_status(&self, request_id: &str) -> Result<UninstallStatus, RemoteError> {
        let url = self.endpoint(&["api", "companion", "uninstall-status", request_id])?;
        let response = self.send(self.client.get(url)).await?;
        let body: UninstallStatusBody = Self::json(response).await?;

        Ok(body
            .status
            .as_deref()
            .map(UninstallStatus::parse)
            .unwrap_or(UninstallStatus::Pending))
    }

    async fn validate_secret_code(&self, device_id: &str, code: &str) -> Result<bool, RemoteError> {
        let url = self.endpoint(&["api", "companion", "validate-secret-code"])?;
        let body = serde_json::json!({ "imei": device_id, "secretCode": code });

        let response = self.client.post(url).json(&body);
        let response = self.authorized(response).send().await?;

        // A rejected code may come back as 4xx with a JSON envelope
        let status = response.status();
        if status.is_server_error() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<Ack>(&body) {
            Ok(ack) => Ok(status.is_success() && ack.success),
            Err(_) if status.is_client_error() => Ok(false),
            Err(e) => Err(RemoteError::Decode(e.to_string())),
        }
    }
}
