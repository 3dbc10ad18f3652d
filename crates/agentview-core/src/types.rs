//! Core types for agentview
//!
//! Defines the renderable data model shared by the realtime and polling paths:
//! - Analysis sessions and their lifecycle status
//! - Per-agent activity records
//! - Conversation messages
//! - Active agent-to-agent edges

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepted, not yet running
    #[default]
    Pending,
    /// Agents are working
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl SessionStatus {
    /// Check if no further events are expected
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of the multi-agent analysis pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    /// Analysis id
    #[serde(alias = "analysis_id", alias = "analysisId")]
    pub id: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: SessionStatus,
    /// Overall progress (0-100)
    #[serde(default, deserialize_with = "crate::lenient::progress")]
    pub progress: u8,
    /// Agent currently working, if any
    #[serde(default, alias = "current_agent")]
    pub current_agent: Option<String>,
    /// Agents that have finished
    #[serde(default, alias = "completed_agents")]
    pub completed_agents: IndexSet<String>,
    /// Server-reported failure
    #[serde(default, deserialize_with = "crate::lenient::error")]
    pub error: Option<String>,
}

impl AnalysisSession {
    /// Create a pending session
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Check if the session reached a terminal status
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// What an agent is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Not started
    #[default]
    Idle,
    /// Started, reasoning
    Thinking,
    /// Producing output
    Active,
    /// Finished
    Complete,
    /// Failed
    Error,
}

/// Activity record for one agent; at most one per agent per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActivity {
    /// Agent id
    pub agent_id: String,
    /// Display name
    pub agent_name: Option<String>,
    /// Current status
    pub status: AgentStatus,
    /// Progress (0-100)
    pub progress: u8,
    /// Latest status line
    pub message: Option<String>,
}

impl AgentActivity {
    /// Create an activity record
    #[inline]
    #[must_use]
    pub fn new(agent_id: impl Into<String>, status: AgentStatus, progress: u8) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: None,
            status,
            progress: progress.min(100),
            message: None,
        }
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.agent_name = name;
        self
    }

    /// With status line
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Human user
    User,
    /// An analysis agent
    Agent,
    /// The pipeline itself
    System,
}

/// Conversation log entry; never mutated once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id within the session
    pub id: String,
    /// Author role
    pub role: MessageRole,
    /// Authoring agent
    pub agent_id: Option<String>,
    /// Authoring agent display name
    pub agent_name: Option<String>,
    /// Text content
    pub content: String,
    /// Discovery kind for agent-to-agent messages
    pub discovery_kind: Option<String>,
    /// When the message was produced
    pub timestamp: DateTime<Utc>,
}

/// Directed in-flight communication between two agents
///
/// `(a, b)` and `(b, a)` are distinct edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEdge {
    /// Sending agent
    pub from_agent_id: String,
    /// Receiving agent
    pub to_agent_id: String,
}

impl ActiveEdge {
    /// Create an edge
    #[inline]
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_agent_id: from.into(),
            to_agent_id: to.into(),
        }
    }
}

impl std::fmt::Display for ActiveEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from_agent_id, self.to_agent_id)
    }
}

/// Body of `POST /analysis/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisRequest {
    /// Company being analysed
    pub company_id: String,
    /// Free-form pipeline options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl StartAnalysisRequest {
    /// Create a request for a company
    #[inline]
    #[must_use]
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            options: None,
        }
    }

    /// With pipeline options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// Response of `POST /analysis/start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisResponse {
    /// Id of the created session
    #[serde(alias = "analysis_id")]
    pub analysis_id: String,
    /// Initial status
    #[serde(default)]
    pub status: SessionStatus,
}
