//! Push channel envelope and typed session events
//!
//! Frames arrive as JSON objects discriminated by `type`. Known types decode
//! into [`SessionEvent`]; unknown types decode to [`Decoded::Ignored`] and
//! malformed frames are a `ClientError::Parse`.

use agentview_core::lenient::{clamp_progress, error_text};
use agentview_core::{ClientError, ClientResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discovery kind used when an agent-to-agent frame does not name one
pub const DEFAULT_DISCOVERY_KIND: &str = "insight";

/// Raw push channel frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    /// Frame discriminator
    #[serde(rename = "type")]
    pub kind: String,
    /// Session the frame belongs to
    #[serde(default, alias = "analysis_id")]
    pub analysis_id: Option<String>,
    /// Subject agent
    #[serde(default, alias = "agent_id")]
    pub agent_id: Option<String>,
    /// Subject agent display name
    #[serde(default, alias = "agent_name")]
    pub agent_name: Option<String>,
    /// Sender of an agent-to-agent message
    #[serde(default, alias = "from_agent")]
    pub from_agent: Option<String>,
    /// Receiver of an agent-to-agent message
    #[serde(default, alias = "to_agent")]
    pub to_agent: Option<String>,
    /// Discovery kind of an agent-to-agent message
    #[serde(default, alias = "discovery_type")]
    pub discovery_type: Option<String>,
    /// Free-form status
    #[serde(default)]
    pub status: Option<String>,
    /// Progress (0-100, integer or float)
    #[serde(default)]
    pub progress: Option<f64>,
    /// Human-readable text
    #[serde(default)]
    pub message: Option<String>,
    /// Result payload or reference
    #[serde(default)]
    pub result: Option<Value>,
    /// Error text or object
    #[serde(default)]
    pub error: Option<Value>,
    /// Server timestamp (RFC 3339)
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Agent named by an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRef {
    /// Agent id
    pub id: String,
    /// Display name
    pub name: Option<String>,
}

/// One typed session event
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Pipeline accepted the session
    SessionStarted {
        /// Announcement text
        message: Option<String>,
    },
    /// An agent began working
    AgentStarted {
        /// Agent
        agent: AgentRef,
        /// Status line
        message: Option<String>,
        /// Overall session progress
        progress: Option<u8>,
    },
    /// An agent finished
    AgentCompleted {
        /// Agent
        agent: AgentRef,
        /// Completion text
        message: Option<String>,
        /// Overall session progress
        progress: Option<u8>,
    },
    /// Pipeline finished successfully
    SessionCompleted {
        /// Result payload or reference, if pushed
        result: Option<Value>,
        /// Summary text
        message: Option<String>,
    },
    /// Pipeline failed
    SessionFailed {
        /// Server-reported error
        error: String,
    },
    /// One agent handed a discovery to another
    AgentToAgent {
        /// Sender
        from: AgentRef,
        /// Receiver
        to: String,
        /// Discovery kind (insight, lead, competitor, ...)
        discovery_kind: String,
        /// Message text
        message: Option<String>,
    },
}

impl SessionEvent {
    /// Wire name of the event kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "analysis_started",
            Self::AgentStarted { .. } => "agent_started",
            Self::AgentCompleted { .. } => "agent_completed",
            Self::SessionCompleted { .. } => "analysis_completed",
            Self::SessionFailed { .. } => "error",
            Self::AgentToAgent { .. } => "a2a_message",
        }
    }
}

/// A typed event plus frame metadata
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    /// Session named by the frame, if any
    pub session_id: Option<String>,
    /// Server timestamp, if present and valid
    pub timestamp: Option<DateTime<Utc>>,
    /// The event
    pub event: SessionEvent,
}

impl EventFrame {
    /// Frame with no metadata
    #[inline]
    #[must_use]
    pub fn new(event: SessionEvent) -> Self {
        Self {
            session_id: None,
            timestamp: None,
            event,
        }
    }

    /// Frame addressed to a session
    #[inline]
    #[must_use]
    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Outcome of decoding one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Known event
    Event(EventFrame),
    /// Well-formed frame of an unknown type
    Ignored(String),
}

/// Decode a text frame
///
/// # Errors
/// - `ClientError::Parse` if the frame is not a JSON object with a `type`,
///   or a known type lacks a required field
pub fn decode(text: &str) -> ClientResult<Decoded> {
    let envelope: PushEnvelope = serde_json::from_str(text)?;
    envelope.into_decoded()
}

impl PushEnvelope {
    /// Convert into a typed event
    ///
    /// # Errors
    /// - `ClientError::Parse` if a known type lacks a required field
    pub fn into_decoded(self) -> ClientResult<Decoded> {
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));
        let progress = self.progress.map(clamp_progress);

        let event = match self.kind.as_str() {
            "analysis_started" => SessionEvent::SessionStarted {
                message: self.message,
            },
            "agent_started" => SessionEvent::AgentStarted {
                agent: required_agent(self.agent_id, self.agent_name, "agent_started")?,
                message: self.message,
                progress,
            },
            "agent_completed" => SessionEvent::AgentCompleted {
                agent: required_agent(self.agent_id, self.agent_name, "agent_completed")?,
                message: self.message,
                progress,
            },
            "analysis_completed" => SessionEvent::SessionCompleted {
                result: self.result,
                message: self.message,
            },
            "error" => SessionEvent::SessionFailed {
                error: self
                    .error
                    .map(error_text)
                    .or(self.message)
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            "a2a_message" => {
                let from = self.from_agent.or(self.agent_id);
                let from = required_agent(from, self.agent_name, "a2a_message")?;
                let to = self
                    .to_agent
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ClientError::Parse("a2a_message without toAgent".to_string()))?;
                SessionEvent::AgentToAgent {
                    from,
                    to,
                    discovery_kind: self
                        .discovery_type
                        .unwrap_or_else(|| DEFAULT_DISCOVERY_KIND.to_string()),
                    message: self.message,
                }
            }
            _ => return Ok(Decoded::Ignored(self.kind)),
        };

        Ok(Decoded::Event(EventFrame {
            session_id: self.analysis_id,
            timestamp,
            event,
        }))
    }
}

fn required_agent(id: Option<String>, name: Option<String>, kind: &str) -> ClientResult<AgentRef> {
    match id {
        Some(id) if !id.is_empty() => Ok(AgentRef { id, name }),
        _ => Err(ClientError::Parse(format!("{kind} without agentId"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(text: &str) -> SessionEvent {
        match decode(text).unwrap() {
            Decoded::Event(frame) => frame.event,
            Decoded::Ignored(kind) => panic!("unexpectedly ignored {kind}"),
        }
    }

    #[test]
    fn decodes_agent_started() {
        let ev = event(r#"{"type":"agent_started","agentId":"icp_agent","agentName":"ICP Agent","progress":12.6}"#);
        assert_eq!(
            ev,
            SessionEvent::AgentStarted {
                agent: AgentRef {
                    id: "icp_agent".to_string(),
                    name: Some("ICP Agent".to_string()),
                },
                message: None,
                progress: Some(13),
            }
        );
    }

    #[test]
    fn decodes_snake_case_fields() {
        let ev = event(r#"{"type":"agent_completed","agent_id":"lead_agent"}"#);
        assert!(matches!(ev, SessionEvent::AgentCompleted { agent, .. } if agent.id == "lead_agent"));
    }

    #[test]
    fn decodes_a2a_with_default_kind() {
        let ev = event(r#"{"type":"a2a_message","fromAgent":"a","toAgent":"b"}"#);
        assert_eq!(
            ev,
            SessionEvent::AgentToAgent {
                from: AgentRef {
                    id: "a".to_string(),
                    name: None
                },
                to: "b".to_string(),
                discovery_kind: DEFAULT_DISCOVERY_KIND.to_string(),
                message: None,
            }
        );
    }

    #[test]
    fn a2a_falls_back_to_agent_id_as_sender() {
        let ev = event(r#"{"type":"a2a_message","agentId":"a","toAgent":"b","discoveryType":"lead"}"#);
        assert!(matches!(ev, SessionEvent::AgentToAgent { from, discovery_kind, .. }
            if from.id == "a" && discovery_kind == "lead"));
    }

    #[test]
    fn error_frame_text_sources() {
        assert_eq!(
            event(r#"{"type":"error","error":"boom"}"#),
            SessionEvent::SessionFailed {
                error: "boom".to_string()
            }
        );
        assert_eq!(
            event(r#"{"type":"error","error":{"message":"quota"}}"#),
            SessionEvent::SessionFailed {
                error: "quota".to_string()
            }
        );
        assert_eq!(
            event(r#"{"type":"error","message":"fallback"}"#),
            SessionEvent::SessionFailed {
                error: "fallback".to_string()
            }
        );
    }

    #[test]
    fn unknown_type_is_ignored() {
        let decoded = decode(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(decoded, Decoded::Ignored("heartbeat".to_string()));
    }

    #[test]
    fn malformed_frames_are_parse_errors() {
        assert!(matches!(decode("not json"), Err(ClientError::Parse(_))));
        assert!(matches!(decode(r#"{"agentId":"x"}"#), Err(ClientError::Parse(_))));
        assert!(matches!(
            decode(r#"{"type":"agent_started"}"#),
            Err(ClientError::Parse(_))
        ));
        assert!(matches!(
            decode(r#"{"type":"a2a_message","fromAgent":"a"}"#),
            Err(ClientError::Parse(_))
        ));
    }

    #[test]
    fn frame_metadata_is_kept() {
        let decoded = decode(
            r#"{"type":"analysis_started","analysisId":"s1","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        let Decoded::Event(frame) = decoded else {
            panic!("expected event");
        };
        assert_eq!(frame.session_id.as_deref(), Some("s1"));
        assert_eq!(
            frame.timestamp.map(|ts| ts.to_rfc3339()),
            Some("2024-05-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(-3.0), 0);
        assert_eq!(clamp_progress(140.0), 100);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }
}
