//! Realtime event processor
//!
//! Applies push frames for one session, in delivery order, to a
//! [`SessionView`] published through a `watch` channel. The only network call
//! it makes is the single result fetch after the session completes.

use crate::events::{decode, Decoded, EventFrame};
use crate::reducer::{apply_result, reduce, Effect, ReduceContext, SessionView};
use crate::source::SessionSource;
use crate::transport::FrameStream;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Longest payload excerpt logged for a dropped frame
const EXCERPT_LEN: usize = 120;

/// Why the frame reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Session reached a terminal status
    Terminal,
    /// Channel closed or failed before the session ended
    Disconnected,
    /// Processor was stopped
    Stopped,
}

struct Inner {
    root_agent_id: String,
    source: Arc<dyn SessionSource>,
    view: watch::Sender<SessionView>,
    end: watch::Sender<Option<StreamEnd>>,
    result_requested: AtomicBool,
    result_settled: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Inner {
    fn apply(self: &Arc<Self>, frame: &EventFrame) -> bool {
        let ctx = ReduceContext::new(&self.root_agent_id);
        let mut effects = Vec::new();
        let applied = self.view.send_if_modified(|view| {
            let transition = reduce(std::mem::take(view), frame, &ctx);
            *view = transition.view;
            effects = transition.effects;
            transition.applied
        });
        for effect in effects {
            self.perform(effect);
        }
        applied
    }

    fn perform(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::FetchResult { session_id } => {
                if self.result_requested.swap(true, Ordering::SeqCst) {
                    return;
                }
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    let result = tokio::select! {
                        () = inner.cancel.cancelled() => None,
                        result = inner.source.result(&session_id) => Some(result),
                    };
                    if let Some(result) = result {
                        inner
                            .view
                            .send_if_modified(|view| apply_result(view, result, Utc::now()));
                    }
                    inner.result_settled.send_replace(true);
                });
            }
        }
    }

    fn handle_text(self: &Arc<Self>, text: &str) -> bool {
        match decode(text) {
            Ok(Decoded::Event(frame)) => self.apply(&frame),
            Ok(Decoded::Ignored(kind)) => {
                tracing::debug!(%kind, "unknown push frame ignored");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, payload = excerpt(text), "malformed push frame dropped");
                false
            }
        }
    }

    async fn pump(self: &Arc<Self>, mut frames: FrameStream) -> StreamEnd {
        while let Some(item) = frames.next().await {
            match item {
                Ok(text) => {
                    self.handle_text(&text);
                    if self.view.borrow().is_terminal() {
                        return StreamEnd::Terminal;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "push channel failed");
                    return StreamEnd::Disconnected;
                }
            }
        }
        if self.view.borrow().is_terminal() {
            StreamEnd::Terminal
        } else {
            tracing::warn!(session = %self.view.borrow().session_id(), "push channel closed early");
            StreamEnd::Disconnected
        }
    }

    fn finish(&self, end: StreamEnd) {
        self.end.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(end);
            true
        });
    }
}

/// Applies push frames for exactly one session
pub struct RealtimeEventProcessor {
    inner: Arc<Inner>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeEventProcessor {
    /// Create a processor for a session
    ///
    /// `source` serves the post-completion result fetch.
    pub fn new(
        session_id: impl Into<String>,
        root_agent_id: impl Into<String>,
        source: Arc<dyn SessionSource>,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::new(session_id));
        let (end, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                root_agent_id: root_agent_id.into(),
                source,
                view,
                end,
                result_requested: AtomicBool::new(false),
                result_settled: watch::channel(false).0,
                cancel: CancellationToken::new(),
            }),
            reader: Mutex::new(None),
        }
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> String {
        self.inner.view.borrow().session_id().to_string()
    }

    /// Apply one typed event; false if it changed nothing
    ///
    /// Must run inside a Tokio runtime: a completion event spawns the result
    /// fetch.
    pub fn apply_event(&self, frame: &EventFrame) -> bool {
        self.inner.apply(frame)
    }

    /// Decode and apply one text frame
    ///
    /// Malformed frames are dropped with a warning; unknown types are
    /// ignored. Returns whether the view changed.
    pub fn handle_text(&self, text: &str) -> bool {
        self.inner.handle_text(text)
    }

    /// Read frames from a stream in the background
    ///
    /// Replaces any reader started earlier.
    pub fn start(&self, frames: FrameStream) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let end = tokio::select! {
                () = inner.cancel.cancelled() => StreamEnd::Stopped,
                end = inner.pump(frames) => end,
            };
            tracing::debug!(?end, "push reader finished");
            inner.finish(end);
        });
        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop applying events
    ///
    /// Once this returns no queued frame and no pending result fetch changes
    /// the view.
    pub fn stop(&self) {
        self.inner.view.send_if_modified(|view| {
            let was_open = !view.closed;
            view.closed = true;
            was_open
        });
        self.inner.cancel.cancel();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.inner.finish(StreamEnd::Stopped);
    }

    /// Stop and release the processor
    pub fn dispose(self) {
        self.stop();
    }

    /// Wait for the reader to finish
    ///
    /// After a terminal event this also waits for the result fetch, so the
    /// view is final once it returns.
    pub async fn finished(&self) -> StreamEnd {
        let mut rx = self.inner.end.subscribe();
        let end = match rx.wait_for(Option::is_some).await {
            Ok(end) => end.unwrap_or(StreamEnd::Stopped),
            Err(_) => StreamEnd::Stopped,
        };
        if end == StreamEnd::Terminal && self.result_requested() {
            let mut settled = self.inner.result_settled.subscribe();
            let _ = settled.wait_for(|done| *done).await;
        }
        end
    }

    /// Snapshot of the current view
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.inner.view.borrow().clone()
    }

    /// Receive every view change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.inner.view.subscribe()
    }

    /// Check if the post-completion result fetch was issued
    #[must_use]
    pub fn result_requested(&self) -> bool {
        self.inner.result_requested.load(Ordering::SeqCst)
    }
}

impl Drop for RealtimeEventProcessor {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

impl std::fmt::Debug for RealtimeEventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEventProcessor")
            .field("session_id", &self.session_id())
            .field("root_agent_id", &self.inner.root_agent_id)
            .finish_non_exhaustive()
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FnSource;
    use crate::transport::{ChannelTransport, PushTransport};
    use agentview_core::{AgentStatus, ClientError, SessionStatus};
    use agentview_test_utils::{frames, CallCounter};
    use serde_json::json;

    fn source(counter: &CallCounter) -> Arc<dyn SessionSource> {
        let counter = counter.clone();
        Arc::new(FnSource::new(
            |id| async move { Err(ClientError::Network(format!("no status for {id}"))) },
            move |_| {
                counter.hit();
                async { Ok(json!({"ok": true})) }
            },
        ))
    }

    #[tokio::test]
    async fn malformed_frames_do_not_stop_the_fold() {
        let counter = CallCounter::new();
        let processor = RealtimeEventProcessor::new("s1", "orchestrator", source(&counter));

        assert!(!processor.handle_text("{broken"));
        assert!(!processor.handle_text(r#"{"type":"heartbeat"}"#));
        assert!(processor.handle_text(&frames::agent_started("icp_agent")));

        let view = processor.view();
        assert_eq!(
            view.activity("icp_agent").map(|a| a.status),
            Some(AgentStatus::Thinking)
        );
    }

    #[tokio::test]
    async fn completion_fetches_result_once() {
        let counter = CallCounter::new();
        let processor = RealtimeEventProcessor::new("s1", "orchestrator", source(&counter));
        let mut rx = processor.subscribe();

        processor.handle_text(&frames::analysis_completed());
        processor.handle_text(&frames::analysis_completed());
        rx.wait_for(|v| v.result.is_some()).await.unwrap();

        assert_eq!(counter.count(), 1);
        assert!(processor.result_requested());
        assert_eq!(processor.view().session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn reader_stops_at_terminal_event() {
        let counter = CallCounter::new();
        let processor = RealtimeEventProcessor::new("s1", "orchestrator", source(&counter));
        let transport = ChannelTransport::new();
        let sender = transport.open("s1");
        sender.send(frames::agent_started("a"));
        sender.send(frames::error("boom"));
        sender.send(frames::agent_started("b"));

        processor.start(transport.connect("s1").await.unwrap());

        assert_eq!(processor.finished().await, StreamEnd::Terminal);
        let view = processor.view();
        assert_eq!(view.session.error.as_deref(), Some("boom"));
        assert!(view.activity("b").is_none());
    }

    #[tokio::test]
    async fn early_close_is_a_disconnect() {
        let counter = CallCounter::new();
        let processor = RealtimeEventProcessor::new("s1", "orchestrator", source(&counter));
        let transport = ChannelTransport::new();
        let sender = transport.open("s1");
        sender.send(frames::agent_started("a"));
        drop(sender);

        processor.start(transport.connect("s1").await.unwrap());

        assert_eq!(processor.finished().await, StreamEnd::Disconnected);
    }

    #[tokio::test]
    async fn stop_discards_queued_frames() {
        let counter = CallCounter::new();
        let processor = RealtimeEventProcessor::new("s1", "orchestrator", source(&counter));
        let transport = ChannelTransport::new();
        let sender = transport.open("s1");

        processor.start(transport.connect("s1").await.unwrap());
        processor.stop();
        sender.send(frames::agent_started("late"));
        tokio::task::yield_now().await;

        assert!(!processor.handle_text(&frames::agent_started("manual")));
        assert_eq!(processor.finished().await, StreamEnd::Stopped);
        let view = processor.view();
        assert!(view.closed);
        assert!(view.activities.is_empty());
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        assert_eq!(excerpt(&long).chars().count(), EXCERPT_LEN);
        assert_eq!(excerpt("short"), "short");
    }
}
