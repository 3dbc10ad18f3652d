//! Terminal rendering of session views

use agentview_core::{AgentActivity, AgentStatus, Message, MessageRole};
use agentview_realtime::SessionView;
use std::fmt::Write as _;

/// One line for a conversation message
pub(crate) fn message_line(message: &Message) -> String {
    let author = match message.role {
        MessageRole::System => "system".to_string(),
        MessageRole::User => "you".to_string(),
        MessageRole::Agent => message
            .agent_name
            .clone()
            .or_else(|| message.agent_id.clone())
            .unwrap_or_else(|| "agent".to_string()),
    };
    let time = message.timestamp.format("%H:%M:%S");
    match &message.discovery_kind {
        Some(kind) => format!("[{time}] {author} ({kind}): {}", message.content),
        None => format!("[{time}] {author}: {}", message.content),
    }
}

/// Lines for messages after the first `printed`; returns the new count
pub(crate) fn new_message_lines(view: &SessionView, printed: usize) -> (Vec<String>, usize) {
    let lines = view
        .messages
        .iter()
        .skip(printed)
        .map(message_line)
        .collect();
    (lines, view.messages.len())
}

fn status_label(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => "idle",
        AgentStatus::Thinking => "thinking",
        AgentStatus::Active => "active",
        AgentStatus::Complete => "complete",
        AgentStatus::Error => "error",
    }
}

fn activity_line(activity: &AgentActivity) -> String {
    let name = activity.agent_name.as_deref().unwrap_or(&activity.agent_id);
    format!(
        "  {name:<24} {:<9} {:>3}%",
        status_label(activity.status),
        activity.progress
    )
}

/// Final summary block
pub(crate) fn summary(view: &SessionView) -> String {
    let mut out = format!(
        "analysis {}: {} ({}%)\n",
        view.session.id, view.session.status, view.session.progress
    );
    if let Some(error) = &view.session.error {
        let _ = writeln!(out, "  error: {error}");
    }
    for activity in view.activities.values() {
        out.push_str(&activity_line(activity));
        out.push('\n');
    }
    if !view.edges.is_empty() {
        let edges: Vec<String> = view.edges.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "  active edges: {}", edges.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentview_core::SessionStatus;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn message(role: MessageRole, agent: Option<&str>, kind: Option<&str>) -> Message {
        Message {
            id: "s1-1".to_string(),
            role,
            agent_id: agent.map(str::to_string),
            agent_name: None,
            content: "hello".to_string(),
            discovery_kind: kind.map(str::to_string),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn message_lines_name_their_author() {
        assert_eq!(
            message_line(&message(MessageRole::System, None, None)),
            "[09:30:00] system: hello"
        );
        assert_eq!(
            message_line(&message(MessageRole::Agent, Some("lead_agent"), Some("lead"))),
            "[09:30:00] lead_agent (lead): hello"
        );
    }

    #[test]
    fn only_unprinted_messages_are_returned() {
        let mut view = SessionView::new("s1");
        view.messages.push(message(MessageRole::System, None, None));
        view.messages.push(message(MessageRole::User, None, None));

        let (lines, printed) = new_message_lines(&view, 1);
        assert_eq!(lines, vec!["[09:30:00] you: hello".to_string()]);
        assert_eq!(printed, 2);
    }

    #[test]
    fn summary_lists_activities_and_error() {
        let mut view = SessionView::new("s1");
        view.session.status = SessionStatus::Failed;
        view.session.error = Some("boom".to_string());
        view.activities.insert(
            "icp_agent".to_string(),
            AgentActivity::new("icp_agent", AgentStatus::Complete, 100),
        );

        let text = summary(&view);
        assert!(text.starts_with("analysis s1: failed (0%)\n"));
        assert!(text.contains("  error: boom\n"));
        assert!(text.contains("icp_agent"));
        assert!(text.contains("complete"));
        assert!(text.contains("100%"));
    }
}
