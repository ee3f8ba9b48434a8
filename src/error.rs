//! Typed errors for the enforcement core.
//!
//! Remote and platform failures are status for the agent loops, never reasons
//! to stop them. Callers log these and move on to the next cycle, poll or
//! enforcement method.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the remote authority.
///
/// Every variant is transient: the owning loop retries on its next cycle.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, DNS or TLS failure before a response arrived.
    #[error("request to remote authority failed: {0}")]
    Transport(String),

    /// The authority answered with a non-success HTTP status.
    #[error("remote authority returned HTTP {status}")]
    Status { status: u16 },

    /// The response body could not be decoded.
    #[error("invalid response from remote authority: {0}")]
    Decode(String),

    /// The call did not complete within the per-request deadline.
    #[error("remote authority did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Failure of a single platform primitive.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The mechanism does not exist on this platform or build.
    #[error("{0} is not available on this platform")]
    CapabilityUnavailable(String),

    /// The mechanism exists but the agent lacks the privilege to use it.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The mechanism was attempted and failed.
    #[error("platform command failed: {0}")]
    CommandFailed(String),
}

impl PlatformError {
    /// Whether the failure means "this method can never work here right now",
    /// as opposed to a one-off failure of a viable method.
    pub fn is_capability_gap(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable(_) | Self::PermissionDenied(_))
    }
}

/// Bound a remote call by `limit`, folding the elapsed deadline into
/// [`RemoteError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_gaps_are_classified() {
        assert!(PlatformError::CapabilityUnavailable("nmcli".into()).is_capability_gap());
        assert!(PlatformError::PermissionDenied("not root".into()).is_capability_gap());
        assert!(!PlatformError::CommandFailed("exit 1".into()).is_capability_gap());
    }

    #[test]
    fn remote_error_messages_are_descriptive() {
        let err = RemoteError::Status { status: 503 };
        assert!(err.to_string().contains("503"));

        let err = RemoteError::Timeout(Duration::from_secs(10));
        assert!(err.to_string().contains("10s"));
    }

    #[tokio::test]
    async fn with_deadline_passes_through_results() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok::<_, RemoteError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn with_deadline_times_out_stalled_calls() {
        let stalled = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RemoteError>(())
        })
        .await;

        assert!(matches!(stalled, Err(RemoteError::Timeout(_))));
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RemoteError>();
        assert_send_sync::<PlatformError>();
    }
}
