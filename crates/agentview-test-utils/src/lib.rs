//! Testing utilities for agentview workspace
//!
//! Shared fakes, fixtures, and push-frame builders.

#![allow(missing_docs)]

use agentview_core::{ClientError, ClientResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Replays a fixed list of responses, one per call
///
/// Once the script runs out every further call fails with a network error.
#[derive(Debug)]
pub struct ScriptedResponses<T> {
    responses: Arc<Mutex<VecDeque<ClientResult<T>>>>,
    calls: Arc<AtomicUsize>,
}

impl<T> Clone for ScriptedResponses<T> {
    fn clone(&self) -> Self {
        Self {
            responses: Arc::clone(&self.responses),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T: Send + 'static> ScriptedResponses<T> {
    pub fn new(responses: impl IntoIterator<Item = ClientResult<T>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call(&self) -> BoxFuture<'static, ClientResult<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Network("script exhausted".to_string())));
        async move { next }.boxed()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

/// Responses resolved by hand, in any order
///
/// Each call parks until the test resolves it by call index. Dropping the
/// handle without resolving makes the call fail with `Cancelled`.
#[derive(Debug)]
pub struct PendingResponses<T> {
    senders: Arc<Mutex<Vec<Option<oneshot::Sender<ClientResult<T>>>>>>,
}

impl<T> Clone for PendingResponses<T> {
    fn clone(&self) -> Self {
        Self {
            senders: Arc::clone(&self.senders),
        }
    }
}

impl<T> Default for PendingResponses<T> {
    fn default() -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Send + 'static> PendingResponses<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call(&self) -> BoxFuture<'static, ClientResult<T>> {
        let (tx, rx) = oneshot::channel();
        self.senders.lock().push(Some(tx));
        async move { rx.await.unwrap_or(Err(ClientError::Cancelled)) }.boxed()
    }

    /// Resolve call `index` (0-based); false if unknown or already resolved
    pub fn resolve(&self, index: usize, result: ClientResult<T>) -> bool {
        let sender = self
            .senders
            .lock()
            .get_mut(index)
            .and_then(Option::take);
        match sender {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.senders.lock().len()
    }

    /// Number of calls not yet resolved
    pub fn unresolved(&self) -> usize {
        self.senders.lock().iter().filter(|s| s.is_some()).count()
    }
}

/// Shared invocation counter for callbacks
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Push channel frame builders
pub mod frames {
    use super::{json, Value};

    pub fn analysis_started(analysis_id: &str) -> String {
        json!({"type": "analysis_started", "analysisId": analysis_id}).to_string()
    }

    pub fn agent_started(agent_id: &str) -> String {
        json!({
            "type": "agent_started",
            "agentId": agent_id,
            "agentName": display_name(agent_id),
            "message": format!("{} started", display_name(agent_id)),
        })
        .to_string()
    }

    pub fn agent_completed(agent_id: &str) -> String {
        json!({
            "type": "agent_completed",
            "agentId": agent_id,
            "agentName": display_name(agent_id),
            "message": format!("{} finished", display_name(agent_id)),
        })
        .to_string()
    }

    pub fn a2a(from: &str, to: &str, discovery: &str) -> String {
        json!({
            "type": "a2a_message",
            "fromAgent": from,
            "toAgent": to,
            "discoveryType": discovery,
            "message": format!("{from} shared a {discovery} with {to}"),
        })
        .to_string()
    }

    pub fn analysis_completed() -> String {
        json!({"type": "analysis_completed", "result": {"ref": "final"}}).to_string()
    }

    pub fn error(text: &str) -> String {
        json!({"type": "error", "error": text}).to_string()
    }

    pub fn custom(value: Value) -> String {
        value.to_string()
    }

    fn display_name(agent_id: &str) -> String {
        agent_id
            .split('_')
            .map(|part| {
                let mut chars = part.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Status payload as served by `GET /analysis/{id}/status`
pub fn status_payload(analysis_id: &str, status: &str, progress: u8) -> Value {
    json!({
        "analysis_id": analysis_id,
        "status": status,
        "progress": progress,
        "completed_agents": [],
    })
}
