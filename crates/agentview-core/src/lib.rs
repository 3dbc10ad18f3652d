//! agentview core
//!
//! Shared vocabulary for the dashboard synchronization core:
//! - The renderable data model (sessions, activities, messages, edges)
//! - The client error taxonomy
//! - Client configuration
//! - Lenient decoding of server-reported fields
//!
//! # Example
//!
//! ```rust
//! use agentview_core::{ClientConfig, SessionStatus};
//!
//! let config = ClientConfig::from_env();
//! assert!(SessionStatus::Completed.is_terminal());
//! # let _ = config;
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod lenient;
pub mod types;

// Re-exports for convenience
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use types::{
    ActiveEdge, AgentActivity, AgentStatus, AnalysisSession, Message, MessageRole,
    SessionStatus, StartAnalysisRequest, StartAnalysisResponse,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with agentview
    pub use crate::{
        ActiveEdge, AgentActivity, AgentStatus, AnalysisSession, ClientConfig, ClientError,
        ClientResult, Message, MessageRole, SessionStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
