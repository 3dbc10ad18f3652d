//! agentview realtime layer
//!
//! Turns the push channel of an analysis session into a renderable
//! [`SessionView`]:
//! - [`events`]: push envelope decoding into typed [`SessionEvent`]s
//! - [`reducer`]: pure `(view, event) -> view` transitions
//! - [`RealtimeEventProcessor`]: ordered application of a frame stream
//! - [`PollingFallbackController`]: status polling when no push channel exists
//! - [`SessionMonitor`]: push first, polling as fallback, one view either way
//!
//! # Example
//!
//! ```rust
//! use agentview_realtime::prelude::*;
//! use agentview_realtime::events::{AgentRef, EventFrame, SessionEvent};
//!
//! let ctx = ReduceContext::new("orchestrator");
//! let frame = EventFrame::new(SessionEvent::AgentStarted {
//!     agent: AgentRef { id: "icp_agent".into(), name: None },
//!     message: None,
//!     progress: None,
//! });
//!
//! let transition = reduce(SessionView::new("a-1"), &frame, &ctx);
//! assert!(transition.applied);
//! assert_eq!(transition.view.edges.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod events;
pub mod monitor;
pub mod polling;
pub mod processor;
pub mod reducer;
pub mod source;
pub mod transport;

// Re-exports for convenience
pub use events::{decode, Decoded, EventFrame, PushEnvelope, SessionEvent};
pub use monitor::{MonitorMode, SessionMonitor};
pub use polling::{CancelHandle, PollPhase, PollState, PollingFallbackController, DEFAULT_POLL_INTERVAL};
pub use processor::{RealtimeEventProcessor, StreamEnd};
pub use reducer::{reduce, Effect, ReduceContext, SessionView, Transition};
pub use source::{FnSource, SessionSource};
pub use transport::{ChannelTransport, FrameSender, FrameStream, PushTransport, WebSocketTransport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for following sessions
    pub use crate::{
        reduce, PollPhase, PollingFallbackController, PushTransport, RealtimeEventProcessor,
        ReduceContext, SessionMonitor, SessionSource, SessionView, WebSocketTransport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
