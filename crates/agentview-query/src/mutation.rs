//! Write operations with cache invalidation
//!
//! A `MutationController` wraps one asynchronous write. On success it
//! invalidates the configured key patterns before `execute` returns, so the
//! next read of any matching fetch controller refetches.

use crate::context::QueryContext;
use crate::fetch::{ErrorCallback, SuccessCallback};
use agentview_cache::CacheStore;
use agentview_core::{ClientError, ClientResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Single-argument asynchronous write operation
pub type Mutator<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, ClientResult<R>> + Send + Sync>;

/// Wrap an async closure as a [`Mutator`]
pub fn mutator<A, R, F, Fut>(f: F) -> Mutator<A, R>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ClientResult<R>> + Send + 'static,
{
    Arc::new(move |arg| f(arg).boxed())
}

/// Observable state of one mutation controller
#[derive(Debug, Clone, PartialEq)]
pub struct MutationState<R> {
    /// Result of the last successful execution
    pub data: Option<R>,
    /// Execution in progress
    pub is_loading: bool,
    /// Error of the last failed execution
    pub error: Option<ClientError>,
}

impl<R> MutationState<R> {
    /// Empty state
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }
}

impl<R> Default for MutationState<R> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Mutation controller options
pub struct MutationOptions<R> {
    /// Called with the result of every current successful execution
    pub on_success: Option<SuccessCallback<R>>,
    /// Called with the error of every current failed execution
    pub on_error: Option<ErrorCallback>,
    /// Cache key patterns removed after every successful execution
    pub invalidate_keys: Vec<String>,
}

impl<R> MutationOptions<R> {
    /// Default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With success callback
    #[must_use]
    pub fn on_success(mut self, f: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// With error callback
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// With cache key patterns to invalidate on success
    #[must_use]
    pub fn invalidate_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

impl<R> Default for MutationOptions<R> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            invalidate_keys: Vec::new(),
        }
    }
}

impl<R> std::fmt::Debug for MutationOptions<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationOptions")
            .field("invalidate_keys", &self.invalidate_keys)
            .finish_non_exhaustive()
    }
}

/// Controller for one asynchronous write operation
pub struct MutationController<A, R> {
    cache: CacheStore,
    mutator: Mutator<A, R>,
    options: MutationOptions<R>,
    state: watch::Sender<MutationState<R>>,
    generation: AtomicU64,
}

impl<A, R> MutationController<A, R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Create controller
    #[must_use]
    pub fn new(context: &QueryContext, mutator: Mutator<A, R>, options: MutationOptions<R>) -> Self {
        let (state, _) = watch::channel(MutationState::empty());
        Self {
            cache: context.cache.clone(),
            mutator,
            options,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Run the write
    ///
    /// Returns `None` on failure; the error is in [`state`](Self::state) and
    /// was passed to `on_error`. Errors never propagate past this call.
    ///
    /// Callbacks only fire if no later `execute` or `reset` superseded this
    /// call. Invalidation always happens.
    pub async fn execute(&self, arg: A) -> Option<R> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(MutationState {
            is_loading: true,
            ..MutationState::empty()
        });

        let result = (self.mutator)(arg).await;
        let current = self.generation.load(Ordering::SeqCst) == generation;

        match result {
            Ok(value) => {
                for pattern in &self.options.invalidate_keys {
                    self.cache.invalidate(Some(pattern));
                }
                if current {
                    self.state.send_replace(MutationState {
                        data: Some(value.clone()),
                        ..MutationState::empty()
                    });
                    if let Some(on_success) = &self.options.on_success {
                        on_success(&value);
                    }
                }
                tracing::debug!(invalidated = ?self.options.invalidate_keys, "mutation succeeded");
                Some(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "mutation failed");
                if current {
                    self.state.send_replace(MutationState {
                        error: Some(err.clone()),
                        ..MutationState::empty()
                    });
                    if let Some(on_error) = &self.options.on_error {
                        on_error(&err);
                    }
                }
                None
            }
        }
    }

    /// Return to the empty state; the cache is untouched
    ///
    /// An execution still in flight will not overwrite the reset state or
    /// fire its callbacks.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(MutationState::empty());
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> MutationState<R> {
        self.state.borrow().clone()
    }

    /// Receive every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MutationState<R>> {
        self.state.subscribe()
    }
}

impl<A, R> std::fmt::Debug for MutationController<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationController")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicU32;

    fn create_lead() -> Mutator<String, String> {
        mutator(|name: String| async move {
            if name.is_empty() {
                Err(ClientError::http(422, Some("name required".to_string())))
            } else {
                Ok(format!("lead:{name}"))
            }
        })
    }

    #[tokio::test]
    async fn success_stores_result_and_invalidates() {
        let context = QueryContext::default();
        context.cache.set("leads", 1_u32);
        context.cache.set("leads/9", 2_u32);
        context.cache.set("campaigns", 3_u32);

        let controller = MutationController::new(
            &context,
            create_lead(),
            MutationOptions::new().invalidate_keys(["leads"]),
        );

        let result = controller.execute("acme".to_string()).await;

        assert_eq!(result.as_deref(), Some("lead:acme"));
        assert_eq!(controller.state().data.as_deref(), Some("lead:acme"));
        assert!(!controller.state().is_loading);
        assert!(!context.cache.contains("leads"));
        assert!(!context.cache.contains("leads/9"));
        assert!(context.cache.contains("campaigns"));
    }

    #[tokio::test]
    async fn failure_returns_none_and_keeps_cache() {
        let context = QueryContext::default();
        context.cache.set("leads", 1_u32);
        let errors = Arc::new(AtomicU32::new(0));
        let options = {
            let errors = Arc::clone(&errors);
            MutationOptions::new()
                .invalidate_keys(["leads"])
                .on_error(move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
        };
        let controller = MutationController::new(&context, create_lead(), options);

        let result = controller.execute(String::new()).await;

        assert_eq!(result, None);
        let state = controller.state();
        assert_eq!(state.data, None);
        assert_eq!(state.error.and_then(|e| e.status()), Some(422));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(context.cache.contains("leads"));
    }

    #[tokio::test]
    async fn new_execution_clears_previous_outcome() {
        let context = QueryContext::default();
        let controller = MutationController::new(&context, create_lead(), MutationOptions::new());

        controller.execute(String::new()).await;
        assert!(controller.state().error.is_some());

        controller.execute("b".to_string()).await;
        let state = controller.state();
        assert_eq!(state.error, None);
        assert_eq!(state.data.as_deref(), Some("lead:b"));
    }

    #[tokio::test]
    async fn reset_returns_to_empty_state() {
        let context = QueryContext::default();
        context.cache.set("leads", 1_u32);
        let controller = MutationController::new(&context, create_lead(), MutationOptions::new());

        controller.execute("a".to_string()).await;
        controller.reset();

        assert_eq!(controller.state(), MutationState::empty());
        assert!(context.cache.contains("leads"));
    }

    #[tokio::test]
    async fn reset_suppresses_callbacks_of_in_flight_execution() {
        let context = QueryContext::default();
        context.cache.set("leads", 1_u32);
        let gate = Arc::new(tokio::sync::Notify::new());
        let calls = Arc::new(AtomicU32::new(0));
        let gated = {
            let gate = Arc::clone(&gate);
            mutator(move |fail: bool| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    if fail {
                        Err(ClientError::Network("offline".to_string()))
                    } else {
                        Ok(7_u32)
                    }
                }
            })
        };
        let options = {
            let on_success = Arc::clone(&calls);
            let on_error = Arc::clone(&calls);
            MutationOptions::new()
                .invalidate_keys(["leads"])
                .on_success(move |_: &u32| {
                    on_success.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    on_error.fetch_add(1, Ordering::SeqCst);
                })
        };
        let controller = MutationController::new(&context, gated, options);

        for fail in [false, true] {
            let resetter = async {
                while !controller.state().is_loading {
                    tokio::task::yield_now().await;
                }
                controller.reset();
                gate.notify_one();
            };
            let (outcome, ()) = tokio::join!(controller.execute(fail), resetter);
            assert_eq!(outcome.is_some(), !fail);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.state(), MutationState::empty());
        assert!(!context.cache.contains("leads"));
    }

    #[tokio::test]
    async fn success_callback_sees_invalidated_cache() {
        let context = QueryContext::default();
        context.cache.set("campaigns", 1_u32);
        let cache = context.cache.clone();
        let saw_entry = Arc::new(AtomicU32::new(u32::MAX));
        let options = {
            let saw_entry = Arc::clone(&saw_entry);
            MutationOptions::new()
                .invalidate_keys(["campaigns"])
                .on_success(move |_: &String| {
                    saw_entry.store(u32::from(cache.contains("campaigns")), Ordering::SeqCst);
                })
        };
        let controller = MutationController::new(&context, create_lead(), options);

        controller.execute("x".to_string()).await;

        assert_eq!(saw_entry.load(Ordering::SeqCst), 0);
    }
}
