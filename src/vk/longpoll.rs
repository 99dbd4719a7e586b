//! Long-poll event source.
//!
//! Obtains a polling session from `groups.getLongPollServer`, fetches event
//! batches with a bounded wait, and maps every possible response into a
//! [`PollOutcome`]. The retry/backoff policy itself is a pure function
//! ([`next_action`]) so it can be tested without a network.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::BotError;
use crate::vk::types::{LongPollResponse, RawUpdate};

/// Extra read-timeout slack on top of the server-side wait window, so a
/// normal wait expiry comes back as an empty batch instead of a client error.
const READ_TIMEOUT_SLACK_SECS: u64 = 10;

/// Polling session handed out by `groups.getLongPollServer`.
#[derive(Debug, Clone, Deserialize)]
pub struct LongPollSession {
    pub server: String,
    pub key: String,
    /// Starting cursor.
    pub ts: String,
}

/// Everything one poll attempt can produce.
#[derive(Debug)]
pub enum PollOutcome {
    /// A batch arrived (possibly empty, which is how a wait expiry looks).
    Updates {
        cursor: String,
        updates: Vec<RawUpdate>,
    },
    /// The cursor fell out of server retention; resume from the returned one.
    CursorStale { cursor: String },
    /// The session key is no longer valid; bootstrap a new session.
    SessionInvalid,
    /// Network-level failure; back off and bootstrap a new session.
    TransportError(BotError),
}

/// What the ingestion loop should do next.
#[derive(Debug)]
pub enum LoopAction {
    /// Advance the cursor and handle the batch in arrival order.
    Handle {
        cursor: String,
        updates: Vec<RawUpdate>,
    },
    /// Advance the cursor and poll again immediately.
    Resume { cursor: String },
    /// Re-bootstrap the session without delay.
    Resession,
    /// Back off briefly, then re-bootstrap.
    Backoff(BotError),
}

/// Map a poll outcome onto the loop's next step.
#[must_use]
pub fn next_action(outcome: PollOutcome) -> LoopAction {
    match outcome {
        PollOutcome::Updates { cursor, updates } => LoopAction::Handle { cursor, updates },
        PollOutcome::CursorStale { cursor } => LoopAction::Resume { cursor },
        PollOutcome::SessionInvalid => LoopAction::Resession,
        PollOutcome::TransportError(err) => LoopAction::Backoff(err),
    }
}

/// Classify a decoded long-poll body.
#[must_use]
pub fn classify_response(resp: LongPollResponse) -> PollOutcome {
    match (resp.failed, resp.ts) {
        (Some(1), Some(ts)) => PollOutcome::CursorStale { cursor: ts },
        (Some(_), _) => PollOutcome::SessionInvalid,
        (None, Some(ts)) => PollOutcome::Updates {
            cursor: ts,
            updates: resp.updates.unwrap_or_default(),
        },
        // A body with neither `failed` nor `ts` is unusable; treat it like a
        // dead session.
        (None, None) => PollOutcome::SessionInvalid,
    }
}

/// HTTP client for the long-poll endpoint.
pub struct LongPoller {
    http: Client,
    wait_secs: u64,
}

impl LongPoller {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(wait_secs: u64) -> Result<Self, BotError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(wait_secs + READ_TIMEOUT_SLACK_SECS))
            .build()?;
        Ok(Self { http, wait_secs })
    }

    /// One poll attempt. Never returns an error: every failure mode is a
    /// [`PollOutcome`] variant for the loop to act on.
    pub async fn poll(&self, session: &LongPollSession, cursor: &str) -> PollOutcome {
        match self.fetch(session, cursor).await {
            Ok(resp) => classify_response(resp),
            Err(err) => PollOutcome::TransportError(err),
        }
    }

    async fn fetch(
        &self,
        session: &LongPollSession,
        cursor: &str,
    ) -> Result<LongPollResponse, BotError> {
        let wait = self.wait_secs.to_string();
        let response = self
            .http
            .get(&session.server)
            .query(&[
                ("act", "a_check"),
                ("key", session.key.as_str()),
                ("ts", cursor),
                ("wait", wait.as_str()),
                ("mode", "2"),
                ("version", "3"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<LongPollResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> LongPollResponse {
        serde_json::from_value(json).expect("valid long poll body")
    }

    #[test]
    fn updates_advance_cursor() {
        let outcome = classify_response(body(serde_json::json!({
            "ts": "42",
            "updates": [{"type": "message_new", "object": {"message": {"from_id": 1, "peer_id": 1}}}]
        })));
        match next_action(outcome) {
            LoopAction::Handle { cursor, updates } => {
                assert_eq!(cursor, "42");
                assert_eq!(updates.len(), 1);
            }
            other => panic!("expected Handle, got {other:?}"),
        }
    }

    #[test]
    fn empty_batch_is_not_an_error() {
        let outcome = classify_response(body(serde_json::json!({"ts": "43"})));
        match next_action(outcome) {
            LoopAction::Handle { cursor, updates } => {
                assert_eq!(cursor, "43");
                assert!(updates.is_empty());
            }
            other => panic!("expected Handle, got {other:?}"),
        }
    }

    #[test]
    fn stale_cursor_resumes_with_returned_ts() {
        let outcome = classify_response(body(serde_json::json!({"failed": 1, "ts": "99"})));
        match next_action(outcome) {
            LoopAction::Resume { cursor } => assert_eq!(cursor, "99"),
            other => panic!("expected Resume, got {other:?}"),
        }
    }

    #[test]
    fn failed_key_forces_resession() {
        for failed in [2, 3] {
            let outcome = classify_response(body(serde_json::json!({"failed": failed})));
            assert!(matches!(next_action(outcome), LoopAction::Resession));
        }
    }

    #[test]
    fn transport_error_backs_off() {
        let outcome = PollOutcome::TransportError(BotError::Api {
            code: 0,
            message: "poll endpoint unreachable".to_string(),
        });
        assert!(matches!(next_action(outcome), LoopAction::Backoff(_)));
    }

    #[test]
    fn poller_builds_with_bounded_timeout() {
        assert!(LongPoller::new(25).is_ok());
    }
}
