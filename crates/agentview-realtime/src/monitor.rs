//! Session monitor
//!
//! Follows one session through the push channel and falls back to polling
//! when the channel cannot be opened or drops before the session ends.
//! Either way observers see the same [`SessionView`].

use crate::events::{EventFrame, SessionEvent};
use crate::polling::{PollPhase, PollState, PollingFallbackController};
use crate::processor::{RealtimeEventProcessor, StreamEnd};
use crate::reducer::{absorb_poll, apply_result, reduce, ReduceContext, SessionView};
use crate::source::SessionSource;
use crate::transport::PushTransport;
use agentview_core::{ClientConfig, ClientError};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How the monitor is currently following the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Opening the push channel
    Connecting,
    /// Applying push frames
    Push,
    /// Polling status
    Polling,
    /// Session ended or the monitor was stopped
    Finished,
}

struct Shared {
    session_id: String,
    root_agent_id: String,
    poll_interval: Duration,
    transport: Arc<dyn PushTransport>,
    source: Arc<dyn SessionSource>,
    view: watch::Sender<SessionView>,
    mode: watch::Sender<MonitorMode>,
    cancel: CancellationToken,
}

impl Shared {
    fn publish(&self, next: SessionView) {
        self.view.send_if_modified(|view| {
            if view.closed || *view == next {
                return false;
            }
            *view = SessionView {
                closed: false,
                ..next
            };
            true
        });
    }

    async fn drive(&self) {
        match self.transport.connect(&self.session_id).await {
            Ok(frames) => {
                self.mode.send_replace(MonitorMode::Push);
                let processor = RealtimeEventProcessor::new(
                    self.session_id.clone(),
                    self.root_agent_id.clone(),
                    Arc::clone(&self.source),
                );
                processor.start(frames);
                let end = self.follow(&processor).await;
                if end != StreamEnd::Disconnected {
                    return;
                }
                tracing::warn!(session = %self.session_id, "push channel lost, polling instead");
            }
            Err(err) => {
                tracing::warn!(session = %self.session_id, error = %err, "push channel unavailable, polling instead");
            }
        }
        if self.view.borrow().accepts_events() {
            self.poll().await;
        }
    }

    async fn follow(&self, processor: &RealtimeEventProcessor) -> StreamEnd {
        let mut rx = processor.subscribe();
        let forward = async {
            loop {
                let next = rx.borrow_and_update().clone();
                self.publish(next);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        let end = tokio::select! {
            end = processor.finished() => end,
            () = forward => StreamEnd::Stopped,
        };
        self.publish(processor.view());
        end
    }

    async fn poll(&self) {
        self.mode.send_replace(MonitorMode::Polling);
        let poller = PollingFallbackController::new(
            self.session_id.clone(),
            Arc::clone(&self.source),
            self.poll_interval,
        );
        poller.start();
        let mut rx = poller.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            self.view
                .send_if_modified(|view| fold_poll(view, &state, &self.root_agent_id));
            if state.phase.is_finished() || rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn close(&self) {
        self.view.send_if_modified(|view| {
            let was_open = !view.closed;
            view.closed = true;
            was_open
        });
    }
}

/// Fold one polling state into the view
fn fold_poll(view: &mut SessionView, state: &PollState, root_agent_id: &str) -> bool {
    let now = Utc::now();
    let mut changed = state
        .session
        .as_ref()
        .is_some_and(|session| absorb_poll(view, session, now));

    match &state.phase {
        PollPhase::Done(result) if view.result.is_none() => {
            changed |= apply_result(view, Ok(result.clone()), now);
        }
        PollPhase::Failed(ClientError::Session(_)) => {}
        PollPhase::Failed(err) if view.is_terminal() => {
            if view.result.is_none() {
                changed |= apply_result(view, Err(err.clone()), now);
            }
        }
        PollPhase::Failed(err) => {
            let frame = EventFrame::new(SessionEvent::SessionFailed {
                error: err.to_string(),
            });
            let transition = reduce(std::mem::take(view), &frame, &ReduceContext::new(root_agent_id).at(now));
            *view = transition.view;
            changed |= transition.applied;
        }
        _ => {}
    }
    changed
}

/// Follows one session, push first, polling as fallback
pub struct SessionMonitor {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionMonitor {
    /// Start following a session
    ///
    /// Must run inside a Tokio runtime.
    pub fn start(
        session_id: impl Into<String>,
        transport: Arc<dyn PushTransport>,
        source: Arc<dyn SessionSource>,
        config: &ClientConfig,
    ) -> Self {
        let session_id = session_id.into();
        let (view, _) = watch::channel(SessionView::new(session_id.clone()));
        let (mode, _) = watch::channel(MonitorMode::Connecting);
        let shared = Arc::new(Shared {
            session_id,
            root_agent_id: config.root_agent_id.clone(),
            poll_interval: config.poll_interval,
            transport,
            source,
            view,
            mode,
            cancel: CancellationToken::new(),
        });

        let driver = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::select! {
                    () = shared.cancel.cancelled() => {}
                    () = shared.drive() => {}
                }
                shared.mode.send_replace(MonitorMode::Finished);
                tracing::info!(session = %shared.session_id, "monitor finished");
            })
        };

        Self {
            shared,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> MonitorMode {
        *self.shared.mode.borrow()
    }

    /// Snapshot of the current view
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.shared.view.borrow().clone()
    }

    /// Receive every view change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared.view.subscribe()
    }

    /// Wait until the session ends or the monitor stops, then return the view
    pub async fn wait(&self) -> SessionView {
        let mut mode = self.shared.mode.subscribe();
        let _ = mode.wait_for(|m| *m == MonitorMode::Finished).await;
        self.view()
    }

    /// Stop following; the view is frozen once this returns
    pub fn stop(&self) {
        self.shared.close();
        self.shared.cancel.cancel();
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        self.shared.mode.send_replace(MonitorMode::Finished);
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("session_id", &self.shared.session_id)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}
