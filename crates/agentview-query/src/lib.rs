//! agentview query layer
//!
//! Generic request/response data layer over a shared [`CacheStore`]:
//! - [`FetchController`]: cached reads with stale-while-revalidate, focus /
//!   reconnect / interval revalidation and out-of-order protection
//! - [`MutationController`]: writes that invalidate cache key patterns
//!
//! # Example
//!
//! ```rust,ignore
//! use agentview_query::prelude::*;
//!
//! let context = QueryContext::default();
//! let leads = FetchController::new(
//!     &context,
//!     Some("leads"),
//!     loader(|| async { api.list_leads().await }),
//!     FetchOptions::new().refresh_interval(Duration::from_secs(60)),
//! );
//! leads.start();
//!
//! let create = MutationController::new(
//!     &context,
//!     mutator(|lead| async move { api.create_lead(lead).await }),
//!     MutationOptions::new().invalidate_keys(["leads"]),
//! );
//! if create.execute(new_lead).await.is_some() {
//!     leads.revalidate_if_stale().await;
//! }
//! ```
//!
//! [`CacheStore`]: agentview_cache::CacheStore

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod context;
pub mod fetch;
pub mod mutation;
pub mod signals;

// Re-exports for convenience
pub use context::QueryContext;
pub use fetch::{
    keyed_loader, loader, ErrorCallback, FetchController, FetchOptions, FetchState, Loader,
    SuccessCallback,
};
pub use mutation::{mutator, MutationController, MutationOptions, MutationState, Mutator};
pub use signals::{RevalidationSignals, Signal};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the query layer
    pub use crate::{
        keyed_loader, loader, mutator, FetchController, FetchOptions, FetchState, MutationController,
        MutationOptions, MutationState, QueryContext, RevalidationSignals,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
