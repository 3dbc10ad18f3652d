//! Pure session state transitions
//!
//! [`reduce`] folds one [`EventFrame`] into a [`SessionView`] and reports the
//! side effects the caller must perform. It never touches the network.
//!
//! Rules shared by every event kind:
//! - a closed or terminal view ignores further events
//! - frames addressed to another session are ignored
//! - messages are only ever appended

use crate::events::{AgentRef, EventFrame, SessionEvent};
use agentview_core::{
    ActiveEdge, AgentActivity, AgentStatus, AnalysisSession, ClientError, Message, MessageRole,
    SessionStatus,
};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;

/// Renderable snapshot of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session record
    pub session: AnalysisSession,
    /// Conversation log, append-only
    pub messages: Vec<Message>,
    /// Latest activity per agent, in first-seen order
    pub activities: IndexMap<String, AgentActivity>,
    /// Active agent-to-agent edges, in insertion order
    pub edges: IndexSet<ActiveEdge>,
    /// Full result, once fetched
    pub result: Option<Value>,
    /// No further changes are accepted
    pub closed: bool,
}

impl SessionView {
    /// Empty view for a pending session
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session: AnalysisSession::new(session_id),
            ..Self::default()
        }
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Check if the session reached a terminal status
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.session.is_terminal()
    }

    /// Check if events would still change this view
    #[inline]
    #[must_use]
    pub fn accepts_events(&self) -> bool {
        !self.closed && !self.is_terminal()
    }

    /// Activity record for an agent
    #[must_use]
    pub fn activity(&self, agent_id: &str) -> Option<&AgentActivity> {
        self.activities.get(agent_id)
    }

    fn push_message(
        &mut self,
        role: MessageRole,
        agent: Option<&AgentRef>,
        content: String,
        discovery_kind: Option<String>,
        timestamp: DateTime<Utc>,
    ) {
        let id = format!("{}-{}", self.session.id, self.messages.len() + 1);
        self.messages.push(Message {
            id,
            role,
            agent_id: agent.map(|a| a.id.clone()),
            agent_name: agent.and_then(|a| a.name.clone()),
            content,
            discovery_kind,
            timestamp,
        });
    }

    fn mark_running(&mut self) {
        if self.session.status == SessionStatus::Pending {
            self.session.status = SessionStatus::Running;
        }
    }
}

/// Inputs a transition needs besides the view and the event
#[derive(Debug, Clone, Copy)]
pub struct ReduceContext<'a> {
    /// Agent that fans work out to the others; edges start here
    pub root_agent_id: &'a str,
    /// Timestamp for frames that carry none
    pub now: DateTime<Utc>,
}

impl<'a> ReduceContext<'a> {
    /// Context stamped with the current time
    #[must_use]
    pub fn new(root_agent_id: &'a str) -> Self {
        Self {
            root_agent_id,
            now: Utc::now(),
        }
    }

    /// With a fixed timestamp
    #[inline]
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the full result of a completed session
    FetchResult {
        /// Session to fetch
        session_id: String,
    },
}

/// Result of folding one event
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// View after the event
    pub view: SessionView,
    /// Side effects to perform, in order
    pub effects: Vec<Effect>,
    /// Event changed the view
    pub applied: bool,
}

impl Transition {
    fn ignored(view: SessionView) -> Self {
        Self {
            view,
            effects: Vec::new(),
            applied: false,
        }
    }

    fn applied(view: SessionView, effects: Vec<Effect>) -> Self {
        Self {
            view,
            effects,
            applied: true,
        }
    }
}

/// Fold one event into a view
#[must_use]
pub fn reduce(mut view: SessionView, frame: &EventFrame, ctx: &ReduceContext<'_>) -> Transition {
    if !view.accepts_events() {
        tracing::debug!(
            session = %view.session.id,
            kind = frame.event.kind(),
            "event after session end ignored"
        );
        return Transition::ignored(view);
    }
    if let Some(target) = frame.session_id.as_deref() {
        if target != view.session.id {
            tracing::debug!(session = %view.session.id, target, "event for another session ignored");
            return Transition::ignored(view);
        }
    }

    let at = frame.timestamp.unwrap_or(ctx.now);
    let mut effects = Vec::new();

    match &frame.event {
        SessionEvent::SessionStarted { message } => {
            let content = message
                .clone()
                .unwrap_or_else(|| "Analysis started".to_string());
            view.push_message(MessageRole::System, None, content, None, at);
        }
        SessionEvent::AgentStarted {
            agent,
            message,
            progress,
        } => {
            view.activities.insert(
                agent.id.clone(),
                AgentActivity::new(agent.id.clone(), AgentStatus::Thinking, 0)
                    .with_name(agent.name.clone())
                    .with_message(message.clone()),
            );
            if agent.id != ctx.root_agent_id {
                view.edges
                    .insert(ActiveEdge::new(ctx.root_agent_id, agent.id.clone()));
            }
            view.mark_running();
            view.session.current_agent = Some(agent.id.clone());
            if let Some(progress) = progress {
                view.session.progress = *progress;
            }
            let content = message
                .clone()
                .unwrap_or_else(|| format!("{} started", display(agent)));
            view.push_message(MessageRole::Agent, Some(agent), content, None, at);
        }
        SessionEvent::AgentCompleted {
            agent,
            message,
            progress,
        } => {
            view.activities.insert(
                agent.id.clone(),
                AgentActivity::new(agent.id.clone(), AgentStatus::Complete, 100)
                    .with_name(agent.name.clone())
                    .with_message(message.clone()),
            );
            view.mark_running();
            view.session.completed_agents.insert(agent.id.clone());
            if view.session.current_agent.as_deref() == Some(agent.id.as_str()) {
                view.session.current_agent = None;
            }
            if let Some(progress) = progress {
                view.session.progress = *progress;
            }
            let content = message
                .clone()
                .unwrap_or_else(|| format!("{} completed", display(agent)));
            view.push_message(MessageRole::Agent, Some(agent), content, None, at);
        }
        SessionEvent::SessionCompleted { message, .. } => {
            view.session.status = SessionStatus::Completed;
            view.session.progress = 100;
            view.session.current_agent = None;
            view.edges.clear();
            effects.push(Effect::FetchResult {
                session_id: view.session.id.clone(),
            });
            let content = message
                .clone()
                .unwrap_or_else(|| completion_summary(&view));
            view.push_message(MessageRole::System, None, content, None, at);
            tracing::info!(session = %view.session.id, "session completed");
        }
        SessionEvent::SessionFailed { error } => {
            view.session.status = SessionStatus::Failed;
            view.session.error = Some(error.clone());
            view.push_message(
                MessageRole::System,
                None,
                format!("Analysis failed: {error}"),
                None,
                at,
            );
            tracing::error!(session = %view.session.id, %error, "session failed");
        }
        SessionEvent::AgentToAgent {
            from,
            to,
            discovery_kind,
            message,
        } => {
            view.edges.insert(ActiveEdge::new(from.id.clone(), to.clone()));
            view.mark_running();
            let content = message
                .clone()
                .unwrap_or_else(|| format!("{} shared a {discovery_kind} with {to}", display(from)));
            view.push_message(
                MessageRole::Agent,
                Some(from),
                content,
                Some(discovery_kind.clone()),
                at,
            );
        }
    }

    Transition::applied(view, effects)
}

/// Fold a polled session snapshot into a view
///
/// Used when the push channel is unavailable. Returns `false` if the view is
/// closed, already terminal, or the snapshot belongs to another session.
pub fn absorb_poll(view: &mut SessionView, snapshot: &AnalysisSession, now: DateTime<Utc>) -> bool {
    if !view.accepts_events() || snapshot.id != view.session.id {
        return false;
    }
    if *snapshot == view.session {
        return false;
    }

    for agent_id in &snapshot.completed_agents {
        let done = view
            .activities
            .get(agent_id)
            .is_some_and(|a| a.status == AgentStatus::Complete);
        if !done {
            let name = view.activities.get(agent_id).and_then(|a| a.agent_name.clone());
            view.activities.insert(
                agent_id.clone(),
                AgentActivity::new(agent_id.clone(), AgentStatus::Complete, 100).with_name(name),
            );
        }
    }
    if let Some(current) = &snapshot.current_agent {
        if !snapshot.completed_agents.contains(current) {
            view.activities
                .entry(current.clone())
                .or_insert_with(|| AgentActivity::new(current.clone(), AgentStatus::Thinking, 0));
        }
    }

    let was = view.session.status;
    view.session = snapshot.clone();

    if was != snapshot.status {
        match snapshot.status {
            SessionStatus::Completed => {
                view.edges.clear();
                let content = completion_summary(view);
                view.push_message(MessageRole::System, None, content, None, now);
            }
            SessionStatus::Failed => {
                let error = snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                view.push_message(
                    MessageRole::System,
                    None,
                    format!("Analysis failed: {error}"),
                    None,
                    now,
                );
            }
            SessionStatus::Pending | SessionStatus::Running => {}
        }
    }
    true
}

/// Record the outcome of the post-completion result fetch
///
/// A failed fetch is logged in the conversation; the session stays
/// completed. Returns `false` if the view is closed.
pub fn apply_result(
    view: &mut SessionView,
    result: Result<Value, ClientError>,
    now: DateTime<Utc>,
) -> bool {
    if view.closed {
        return false;
    }
    match result {
        Ok(value) => view.result = Some(value),
        Err(err) => {
            tracing::warn!(session = %view.session.id, error = %err, "result fetch failed");
            view.push_message(
                MessageRole::System,
                None,
                format!("Could not load analysis result: {err}"),
                None,
                now,
            );
        }
    }
    true
}

fn display(agent: &AgentRef) -> &str {
    agent.name.as_deref().unwrap_or(&agent.id)
}

fn completion_summary(view: &SessionView) -> String {
    match view.session.completed_agents.len() {
        0 => "Analysis complete".to_string(),
        1 => "Analysis complete: 1 agent finished".to_string(),
        n => format!("Analysis complete: {n} agents finished"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROOT: &str = "orchestrator";

    fn agent(id: &str) -> AgentRef {
        AgentRef {
            id: id.to_string(),
            name: None,
        }
    }

    fn started(id: &str) -> EventFrame {
        EventFrame::new(SessionEvent::AgentStarted {
            agent: agent(id),
            message: None,
            progress: None,
        })
    }

    fn completed(id: &str) -> EventFrame {
        EventFrame::new(SessionEvent::AgentCompleted {
            agent: agent(id),
            message: None,
            progress: Some(50),
        })
    }

    fn fold(view: SessionView, frames: &[EventFrame]) -> (SessionView, Vec<Effect>) {
        let ctx = ReduceContext::new(ROOT);
        frames.iter().fold((view, Vec::new()), |(view, mut effects), frame| {
            let t = reduce(view, frame, &ctx);
            effects.extend(t.effects);
            (t.view, effects)
        })
    }

    #[test]
    fn agent_started_creates_thinking_activity_and_root_edge() {
        let (view, effects) = fold(SessionView::new("s1"), &[started("icp_agent")]);

        assert_eq!(
            view.activity("icp_agent"),
            Some(&AgentActivity::new("icp_agent", AgentStatus::Thinking, 0))
        );
        assert!(view.edges.contains(&ActiveEdge::new(ROOT, "icp_agent")));
        assert_eq!(view.session.status, SessionStatus::Running);
        assert_eq!(view.session.current_agent.as_deref(), Some("icp_agent"));
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].agent_id.as_deref(), Some("icp_agent"));
        assert!(effects.is_empty());
    }

    #[test]
    fn root_agent_gets_no_edge() {
        let (view, _) = fold(SessionView::new("s1"), &[started(ROOT)]);
        assert!(view.edges.is_empty());
        assert!(view.activity(ROOT).is_some());
    }

    #[test]
    fn agent_completed_replaces_activity() {
        let (view, _) = fold(
            SessionView::new("s1"),
            &[started("lead_agent"), completed("lead_agent")],
        );

        let activity = view.activity("lead_agent").unwrap();
        assert_eq!(activity.status, AgentStatus::Complete);
        assert_eq!(activity.progress, 100);
        assert_eq!(view.activities.len(), 1);
        assert!(view.session.completed_agents.contains("lead_agent"));
        assert_eq!(view.session.current_agent, None);
        assert_eq!(view.session.progress, 50);
        assert_eq!(view.edges.len(), 1);
    }

    #[test]
    fn completion_clears_edges_and_requests_result() {
        let (view, effects) = fold(
            SessionView::new("s1"),
            &[
                started("a"),
                EventFrame::new(SessionEvent::SessionCompleted {
                    result: None,
                    message: None,
                }),
            ],
        );

        assert_eq!(view.session.status, SessionStatus::Completed);
        assert!(view.edges.is_empty());
        assert_eq!(
            effects,
            vec![Effect::FetchResult {
                session_id: "s1".to_string()
            }]
        );
        assert_eq!(view.messages.last().unwrap().role, MessageRole::System);
    }

    #[test]
    fn failure_keeps_edges_and_freezes_session() {
        let (view, _) = fold(
            SessionView::new("s1"),
            &[
                started("a"),
                EventFrame::new(SessionEvent::SessionFailed {
                    error: "boom".to_string(),
                }),
            ],
        );
        assert_eq!(view.session.status, SessionStatus::Failed);
        assert_eq!(view.session.error.as_deref(), Some("boom"));
        assert_eq!(view.edges.len(), 1);

        let ctx = ReduceContext::new(ROOT);
        let t = reduce(view.clone(), &started("b"), &ctx);
        assert!(!t.applied);
        assert_eq!(t.view, view);
    }

    #[test]
    fn a2a_edges_are_idempotent_and_directed() {
        let a2a = |from: &str, to: &str| {
            EventFrame::new(SessionEvent::AgentToAgent {
                from: agent(from),
                to: to.to_string(),
                discovery_kind: "lead".to_string(),
                message: None,
            })
        };
        let (view, _) = fold(
            SessionView::new("s1"),
            &[a2a("x", "y"), a2a("x", "y"), a2a("y", "x")],
        );

        assert_eq!(
            view.edges.iter().cloned().collect::<Vec<_>>(),
            vec![ActiveEdge::new("x", "y"), ActiveEdge::new("y", "x")]
        );
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[0].discovery_kind.as_deref(), Some("lead"));
    }

    #[test]
    fn other_session_frames_are_ignored() {
        let ctx = ReduceContext::new(ROOT);
        let t = reduce(SessionView::new("s1"), &started("a").for_session("s2"), &ctx);
        assert!(!t.applied);
        assert!(t.view.messages.is_empty());
    }

    #[test]
    fn message_ids_are_sequential() {
        let (view, _) = fold(SessionView::new("s1"), &[started("a"), completed("a")]);
        let ids: Vec<_> = view.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["s1-1", "s1-2"]);
    }

    #[test]
    fn closed_view_ignores_everything() {
        let mut view = SessionView::new("s1");
        view.closed = true;
        let ctx = ReduceContext::new(ROOT);
        assert!(!reduce(view, &started("a"), &ctx).applied);
    }

    #[test]
    fn poll_snapshot_fills_activities() {
        let mut view = SessionView::new("s1");
        let mut snapshot = AnalysisSession::new("s1");
        snapshot.status = SessionStatus::Running;
        snapshot.current_agent = Some("b".to_string());
        snapshot.completed_agents.insert("a".to_string());

        assert!(absorb_poll(&mut view, &snapshot, Utc::now()));
        assert_eq!(view.activity("a").unwrap().status, AgentStatus::Complete);
        assert_eq!(view.activity("b").unwrap().status, AgentStatus::Thinking);
        assert!(!absorb_poll(&mut view, &snapshot, Utc::now()));
    }

    #[test]
    fn poll_failure_logs_error_once() {
        let mut view = SessionView::new("s1");
        let mut snapshot = AnalysisSession::new("s1");
        snapshot.status = SessionStatus::Failed;
        snapshot.error = Some("quota".to_string());

        assert!(absorb_poll(&mut view, &snapshot, Utc::now()));
        assert_eq!(view.messages.len(), 1);
        assert!(view.messages[0].content.contains("quota"));
        assert!(!absorb_poll(&mut view, &snapshot, Utc::now()));
    }

    #[test]
    fn failed_result_fetch_is_a_system_message() {
        let mut view = SessionView::new("s1");
        view.session.status = SessionStatus::Completed;
        assert!(apply_result(
            &mut view,
            Err(ClientError::http(500, None)),
            Utc::now()
        ));
        assert_eq!(view.session.status, SessionStatus::Completed);
        assert_eq!(view.result, None);
        assert_eq!(view.messages[0].role, MessageRole::System);
    }
}
