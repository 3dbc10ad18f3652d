//! Polling fallback
//!
//! When no push channel is available the session status is polled on a
//! fixed interval until it turns terminal. A completed session has its result
//! fetched exactly once.
//!
//! ```text
//! Idle -> Polling -> FetchingResult -> Done
//!            |             |
//!            +-> Failed <--+
//! any non-terminal phase -> Cancelled
//! ```

use crate::source::SessionSource;
use agentview_core::{AnalysisSession, ClientError, SessionStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Phase of the polling state machine
#[derive(Debug, Clone, PartialEq)]
pub enum PollPhase {
    /// Not started
    Idle,
    /// Checking status on every tick
    Polling,
    /// Session completed; result fetch in flight
    FetchingResult,
    /// Result captured
    Done(Value),
    /// Session failed or a request failed
    Failed(ClientError),
    /// Stopped by the caller
    Cancelled,
}

impl PollPhase {
    /// Check if the state machine has stopped
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_) | Self::Cancelled)
    }
}

/// Observable polling state
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// Current phase
    pub phase: PollPhase,
    /// Latest status snapshot
    pub session: Option<AnalysisSession>,
    /// Status checks issued so far
    pub ticks: u32,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            phase: PollPhase::Idle,
            session: None,
            ticks: 0,
        }
    }
}

struct Shared {
    session_id: String,
    source: Arc<dyn SessionSource>,
    interval: Duration,
    state: watch::Sender<PollState>,
    cancel: CancellationToken,
}

impl Shared {
    /// Apply `f` unless the machine already stopped; false if rejected
    fn advance(&self, f: impl FnOnce(&mut PollState)) -> bool {
        self.state.send_if_modified(|state| {
            if state.phase.is_finished() || self.cancel.is_cancelled() {
                return false;
            }
            f(state);
            true
        })
    }

    fn cancel(&self) {
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            if state.phase.is_finished() {
                return false;
            }
            state.phase = PollPhase::Cancelled;
            true
        });
    }

    async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let ticking = self.advance(|state| {
                state.ticks += 1;
                state.phase = PollPhase::Polling;
            });
            if !ticking {
                return;
            }

            let session = match self.source.status(&self.session_id).await {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!(session = %self.session_id, error = %err, "status check failed");
                    self.advance(|state| state.phase = PollPhase::Failed(err));
                    return;
                }
            };
            tracing::debug!(session = %self.session_id, status = %session.status, "polled");

            match session.status {
                SessionStatus::Completed => {
                    if !self.advance(|state| {
                        state.session = Some(session);
                        state.phase = PollPhase::FetchingResult;
                    }) {
                        return;
                    }
                    let phase = match self.source.result(&self.session_id).await {
                        Ok(result) => PollPhase::Done(result),
                        Err(err) => PollPhase::Failed(err),
                    };
                    self.advance(|state| state.phase = phase);
                    return;
                }
                SessionStatus::Failed => {
                    let error = session
                        .error
                        .clone()
                        .unwrap_or_else(|| "analysis failed".to_string());
                    tracing::error!(session = %self.session_id, %error, "session failed");
                    self.advance(|state| {
                        state.session = Some(session);
                        state.phase = PollPhase::Failed(ClientError::Session(error));
                    });
                    return;
                }
                SessionStatus::Pending | SessionStatus::Running => {
                    self.advance(|state| state.session = Some(session));
                }
            }
        }
    }
}

/// Polls a session's status until it turns terminal
pub struct PollingFallbackController {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingFallbackController {
    /// Create a controller; nothing runs until [`start`](Self::start)
    pub fn new(session_id: impl Into<String>, source: Arc<dyn SessionSource>, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                source,
                interval: interval.max(Duration::from_millis(1)),
                state,
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Start the tick loop; the first status check is immediate
    ///
    /// Calling it again while running does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() || self.shared.state.borrow().phase.is_finished() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(async move {
            tokio::select! {
                () = shared.cancel.cancelled() => {}
                () = shared.run() => {}
            }
        }));
    }

    /// Wait until the machine stops and return its final phase
    pub async fn wait(&self) -> PollPhase {
        let mut rx = self.shared.state.subscribe();
        let phase = match rx.wait_for(|state| state.phase.is_finished()).await {
            Ok(state) => state.phase.clone(),
            Err(_) => PollPhase::Cancelled,
        };
        phase
    }

    /// Stop polling
    ///
    /// No state change happens after this returns, even if a status check
    /// is in flight.
    pub fn cancel(&self) {
        self.shared.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Handle that cancels this controller from elsewhere
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> PollState {
        self.shared.state.borrow().clone()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> PollPhase {
        self.shared.state.borrow().phase.clone()
    }

    /// Receive every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.shared.state.subscribe()
    }
}

impl Drop for PollingFallbackController {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for PollingFallbackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFallbackController")
            .field("session_id", &self.shared.session_id)
            .field("interval", &self.shared.interval)
            .field("phase", &self.shared.state.borrow().phase)
            .finish_non_exhaustive()
    }
}

/// Cancels a [`PollingFallbackController`]
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Stop polling; safe while a status check is in flight
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Check if cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("session_id", &self.shared.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FnSource;
    use agentview_core::ClientResult;
    use agentview_test_utils::ScriptedResponses;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(status: SessionStatus, error: Option<&str>) -> AnalysisSession {
        AnalysisSession {
            status,
            error: error.map(str::to_string),
            ..AnalysisSession::new("s1")
        }
    }

    fn source(
        statuses: &ScriptedResponses<AnalysisSession>,
        results: &ScriptedResponses<Value>,
    ) -> Arc<dyn SessionSource> {
        let statuses = statuses.clone();
        let results = results.clone();
        Arc::new(FnSource::new(
            move |_| statuses.call(),
            move |_| results.call(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_surfaces_session_error() {
        let statuses = ScriptedResponses::new([
            Ok(snapshot(SessionStatus::Running, None)),
            Ok(snapshot(SessionStatus::Failed, Some("quota exceeded"))),
        ]);
        let results: ScriptedResponses<Value> = ScriptedResponses::new([]);
        let controller = PollingFallbackController::new("s1", source(&statuses, &results), DEFAULT_POLL_INTERVAL);

        controller.start();

        assert_eq!(
            controller.wait().await,
            PollPhase::Failed(ClientError::Session("quota exceeded".to_string()))
        );
        assert_eq!(results.calls(), 0);
        assert_eq!(controller.state().ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_fails_immediately() {
        let statuses: ScriptedResponses<AnalysisSession> =
            ScriptedResponses::new([Err(ClientError::Network("refused".to_string()))]);
        let results: ScriptedResponses<Value> = ScriptedResponses::new([]);
        let controller = PollingFallbackController::new("s1", source(&statuses, &results), DEFAULT_POLL_INTERVAL);

        controller.start();

        assert!(matches!(controller.wait().await, PollPhase::Failed(ClientError::Network(_))));
        assert_eq!(statuses.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn result_fetch_error_is_failure() {
        let statuses = ScriptedResponses::new([Ok(snapshot(SessionStatus::Completed, None))]);
        let results: ScriptedResponses<Value> =
            ScriptedResponses::new([Err(ClientError::http(404, None))]);
        let controller = PollingFallbackController::new("s1", source(&statuses, &results), DEFAULT_POLL_INTERVAL);

        controller.start();

        let phase = controller.wait().await;
        assert_eq!(phase, PollPhase::Failed(ClientError::http(404, None)));
        assert_eq!(
            controller.state().session.map(|s| s.status),
            Some(SessionStatus::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_start_prevents_polling() {
        let statuses: ScriptedResponses<AnalysisSession> = ScriptedResponses::new([]);
        let results: ScriptedResponses<Value> = ScriptedResponses::new([]);
        let controller = PollingFallbackController::new("s1", source(&statuses, &results), DEFAULT_POLL_INTERVAL);

        controller.cancel();
        controller.start();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(controller.phase(), PollPhase::Cancelled);
        assert_eq!(statuses.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_done_keeps_result() {
        let statuses = ScriptedResponses::new([Ok(snapshot(SessionStatus::Completed, None))]);
        let results = ScriptedResponses::new([ClientResult::Ok(json!({"ok": true}))]);
        let controller = PollingFallbackController::new("s1", source(&statuses, &results), DEFAULT_POLL_INTERVAL);

        controller.start();
        controller.wait().await;
        controller.cancel();

        assert_eq!(controller.phase(), PollPhase::Done(json!({"ok": true})));
    }
}
