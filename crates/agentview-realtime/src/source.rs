//! Session status and result lookups
//!
//! The processor and the polling controller never talk to the REST layer
//! directly; they go through [`SessionSource`].

use agentview_core::{AnalysisSession, ClientResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Read access to a session's server-side state
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Current status snapshot
    async fn status(&self, session_id: &str) -> ClientResult<AnalysisSession>;

    /// Full result of a completed session
    async fn result(&self, session_id: &str) -> ClientResult<Value>;
}

type StatusFn = Arc<dyn Fn(String) -> BoxFuture<'static, ClientResult<AnalysisSession>> + Send + Sync>;
type ResultFn = Arc<dyn Fn(String) -> BoxFuture<'static, ClientResult<Value>> + Send + Sync>;

/// [`SessionSource`] built from a status-check and a result-fetch closure
#[derive(Clone)]
pub struct FnSource {
    status: StatusFn,
    result: ResultFn,
}

impl FnSource {
    /// Create from two async closures taking the session id
    pub fn new<S, SFut, R, RFut>(status: S, result: R) -> Self
    where
        S: Fn(String) -> SFut + Send + Sync + 'static,
        SFut: Future<Output = ClientResult<AnalysisSession>> + Send + 'static,
        R: Fn(String) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = ClientResult<Value>> + Send + 'static,
    {
        Self {
            status: Arc::new(move |id| status(id).boxed()),
            result: Arc::new(move |id| result(id).boxed()),
        }
    }
}

impl std::fmt::Debug for FnSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionSource for FnSource {
    async fn status(&self, session_id: &str) -> ClientResult<AnalysisSession> {
        (self.status)(session_id.to_string()).await
    }

    async fn result(&self, session_id: &str) -> ClientResult<Value> {
        (self.result)(session_id.to_string()).await
    }
}

#[async_trait]
impl<T: SessionSource + ?Sized> SessionSource for Arc<T> {
    async fn status(&self, session_id: &str) -> ClientResult<AnalysisSession> {
        (**self).status(session_id).await
    }

    async fn result(&self, session_id: &str) -> ClientResult<Value> {
        (**self).result(session_id).await
    }
}
