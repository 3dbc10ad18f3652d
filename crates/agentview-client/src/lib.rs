//! agentview REST client
//!
//! - [`ApiClient`]: typed calls for the analysis and resource endpoints
//! - [`Resources`]: cached fetch/mutation controllers per [`ResourceKind`]
//!
//! [`ApiClient`] also implements [`SessionSource`], so it can back the
//! realtime processor and the polling fallback directly.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentview_client::{ApiClient, ResourceKind, Resources};
//! use agentview_core::ClientConfig;
//! use agentview_query::{FetchOptions, QueryContext};
//!
//! # async fn run() -> agentview_core::ClientResult<()> {
//! let config = ClientConfig::from_env();
//! let resources = Resources::new(ApiClient::new(&config)?, QueryContext::from_config(&config));
//!
//! let leads = resources.list::<serde_json::Value>(ResourceKind::Leads, FetchOptions::new());
//! leads.refresh().await;
//! println!("{:?}", leads.data());
//! # Ok(())
//! # }
//! ```
//!
//! [`SessionSource`]: agentview_realtime::SessionSource

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod api;
pub mod resources;

// Re-exports for convenience
pub use api::ApiClient;
pub use resources::{ResourceKind, Resources};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
