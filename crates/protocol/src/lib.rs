//! Shared data model for the tutor-relay pipeline.
//!
//! Everything the crates exchange lives here: the captured message record,
//! the queue status answered to callers, command acknowledgements, drain
//! cycle reports, and the delay-tier table that maps queue size to a
//! processing delay.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sentinel sender used when no author element can be located.
pub const DEFAULT_SENDER: &str = "Student";

/// Status label reported while the queue is empty.
pub const EMPTY_QUEUE_LABEL: &str = "no messages";

/// Minimum trimmed body length (exclusive) for a message to be captured.
pub const MIN_BODY_LEN: usize = 10;

/// Current time as unix epoch milliseconds, saturating at zero on a
/// pre-epoch clock.
#[must_use]
pub fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}

/// A message captured from a course page, waiting in the queue.
///
/// Immutable once created; owned exclusively by the queue from enqueue
/// until drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PendingMessage {
    pub sender_name: String,
    pub body_text: String,
    /// Capture time, unix epoch milliseconds.
    pub captured_at: u64,
    pub origin_url: String,
}

/// Point-in-time queue status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueueStatus {
    pub queue_size: usize,
    pub processing: bool,
    /// Live estimate from the tier table applied to `queue_size`. This is
    /// independent of any already-armed delay and jumps discontinuously as
    /// the size crosses a tier boundary.
    pub estimated_delay_label: String,
}

impl QueueStatus {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            queue_size: 0,
            processing: false,
            estimated_delay_label: EMPTY_QUEUE_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnqueueAck {
    pub accepted: bool,
    pub queue_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessNowAck {
    /// An immediate drain was started (any pending delay was cancelled).
    Started,
    /// A drain cycle is already running; single-flight makes this a no-op.
    AlreadyDraining,
    /// Nothing queued; no-op.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClearAck {
    pub cleared: usize,
}

/// Summary of one completed drain cycle, broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct DrainReport {
    pub completed_at_unix_ms: u64,
    pub duration_ms: u64,
    /// Messages taken from the queue when the cycle started.
    pub batch_size: usize,
    /// Messages that received a generated reply.
    pub delivered: usize,
    /// Messages answered with the canned fallback.
    pub fallbacks: usize,
    /// Messages dropped by a mid-drain clear before being attempted.
    pub cleared_midway: usize,
}

/// One queue-size bracket: sizes up to `max_size` (inclusive) wait `delay`.
/// `max_size: None` marks the open-ended top bracket.
#[derive(Debug, Clone)]
pub struct DelayTier {
    pub max_size: Option<usize>,
    pub delay: Duration,
    pub label: String,
}

impl DelayTier {
    #[must_use]
    pub fn new(max_size: Option<usize>, delay: Duration, label: &str) -> Self {
        Self {
            max_size,
            delay,
            label: label.to_string(),
        }
    }
}

/// Ordered size-bracket table mapping queue size to processing delay.
///
/// Consulted read-only at arm time and by the status reporter; both the
/// committed delay and the live estimate label derive from the same rows,
/// so they can never disagree on tiering.
#[derive(Debug, Clone)]
pub struct DelayTable {
    tiers: Vec<DelayTier>,
}

impl Default for DelayTable {
    fn default() -> Self {
        Self::new(vec![
            DelayTier::new(Some(10), Duration::from_secs(15 * 60), "15 minutes"),
            DelayTier::new(Some(20), Duration::from_secs(60 * 60), "1 hour"),
            DelayTier::new(Some(50), Duration::from_secs(120 * 60), "2 hours"),
            DelayTier::new(None, Duration::from_secs(300 * 60), "5 hours"),
        ])
    }
}

impl DelayTable {
    /// Rows must be sorted by ascending `max_size`, with at most one
    /// open-ended row last.
    #[must_use]
    pub fn new(tiers: Vec<DelayTier>) -> Self {
        debug_assert!(
            tiers
                .windows(2)
                .all(|pair| match (pair[0].max_size, pair[1].max_size) {
                    (Some(a), Some(b)) => a < b,
                    (Some(_), None) => true,
                    (None, _) => false,
                }),
            "delay tiers must be sorted by ascending max_size"
        );
        Self { tiers }
    }

    fn tier_for(&self, queue_size: usize) -> Option<&DelayTier> {
        self.tiers
            .iter()
            .find(|tier| tier.max_size.map_or(true, |max| queue_size <= max))
            .or_else(|| self.tiers.last())
    }

    /// Processing delay for a non-empty queue of `queue_size` messages.
    /// `None` when the queue is empty (nothing to schedule).
    #[must_use]
    pub fn delay_for(&self, queue_size: usize) -> Option<Duration> {
        if queue_size == 0 {
            return None;
        }
        self.tier_for(queue_size).map(|tier| tier.delay)
    }

    /// Human-readable estimate for `queue_size`, with a sentinel at zero.
    #[must_use]
    pub fn label_for(&self, queue_size: usize) -> String {
        if queue_size == 0 {
            return EMPTY_QUEUE_LABEL.to_string();
        }
        self.tier_for(queue_size)
            .map_or_else(|| EMPTY_QUEUE_LABEL.to_string(), |tier| tier.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn delay_tiers_match_queue_sizes() {
        let table = DelayTable::default();
        assert_eq!(table.delay_for(5), Some(Duration::from_secs(15 * 60)));
        assert_eq!(table.delay_for(25), Some(Duration::from_secs(120 * 60)));
        assert_eq!(table.delay_for(60), Some(Duration::from_secs(300 * 60)));
    }

    #[test]
    fn delay_is_monotonic_across_boundaries() {
        let table = DelayTable::default();
        let mut previous = Duration::ZERO;
        for size in 1..=60 {
            let delay = table.delay_for(size).expect("non-empty queue has a delay");
            assert!(
                delay >= previous,
                "delay shrank at size {size}: {delay:?} < {previous:?}"
            );
            previous = delay;
        }
    }

    #[test]
    fn boundary_sizes_land_in_the_lower_tier() {
        let table = DelayTable::default();
        assert_eq!(table.delay_for(10), Some(Duration::from_secs(15 * 60)));
        assert_eq!(table.delay_for(11), Some(Duration::from_secs(60 * 60)));
        assert_eq!(table.delay_for(20), Some(Duration::from_secs(60 * 60)));
        assert_eq!(table.delay_for(21), Some(Duration::from_secs(120 * 60)));
        assert_eq!(table.delay_for(50), Some(Duration::from_secs(120 * 60)));
        assert_eq!(table.delay_for(51), Some(Duration::from_secs(300 * 60)));
    }

    #[test]
    fn empty_queue_has_no_delay_and_a_sentinel_label() {
        let table = DelayTable::default();
        assert_eq!(table.delay_for(0), None);
        assert_eq!(table.label_for(0), EMPTY_QUEUE_LABEL);
    }

    #[test]
    fn labels_follow_the_same_rows_as_delays() {
        let table = DelayTable::default();
        assert_eq!(table.label_for(5), "15 minutes");
        assert_eq!(table.label_for(15), "1 hour");
        assert_eq!(table.label_for(25), "2 hours");
        assert_eq!(table.label_for(60), "5 hours");
    }

    #[test]
    fn process_now_ack_serializes_snake_case() {
        let raw = serde_json::to_string(&ProcessNowAck::AlreadyDraining).expect("serialize");
        assert_eq!(raw, "\"already_draining\"");
    }
}
