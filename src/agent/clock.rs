use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::authority::HeartbeatAck;

/// Device clock corrected by the offset learned from heartbeat replies.
///
/// The offset is the server time minus the midpoint of the heartbeat round
/// trip. It is only applied once the server has flagged drift or the offset
/// exceeded the tolerance; from then on it stays applied.
#[derive(Debug, Clone)]
pub struct ServerAnchoredClock {
    offset: ChronoDuration,
    server_preferred: bool,
    tolerance: ChronoDuration,
}

impl ServerAnchoredClock {
    pub fn restore(offset_ms: i64, server_preferred: bool, tolerance: Duration) -> Self {
        Self {
            offset: ChronoDuration::milliseconds(offset_ms),
            server_preferred,
            tolerance: ChronoDuration::from_std(tolerance).unwrap_or(ChronoDuration::MAX),
        }
    }

    pub fn anchored(&self, device_time: DateTime<Utc>) -> DateTime<Utc> {
        if self.server_preferred {
            device_time + self.offset
        } else {
            device_time
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset.num_milliseconds()
    }

    pub fn is_server_preferred(&self) -> bool {
        self.server_preferred
    }

    /// Fold a heartbeat reply into the offset. Returns true when anything changed.
    pub fn observe(
        &mut self,
        sent_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
        ack: &HeartbeatAck,
    ) -> bool {
        let before = (self.offset, self.server_preferred);

        if let Some(server_time) = ack.server_time {
            let midpoint = sent_at + (received_at - sent_at) / 2;
            self.offset = server_time - midpoint;
        }

        let beyond_tolerance = self.offset.abs() > self.tolerance;
        if !self.server_preferred && (ack.drift_warning || beyond_tolerance) {
            tracing::warn!(
                "Device clock differs from server by {}s; using server-anchored time",
                self.offset.num_seconds()
            );
            self.server_preferred = true;
        }

        (self.offset, self.server_preferred) != before
    }
}
