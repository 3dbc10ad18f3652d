//! Cached resource fetching with stale-while-revalidate semantics
//!
//! A `FetchController` owns the observable state of one resource key:
//! - Mount seeds from the cache or performs the initial load
//! - Focus, reconnect and interval triggers revalidate in the background
//! - Failures keep the last good data visible
//! - Out-of-order resolutions never regress data (per-key request sequence)

use crate::context::QueryContext;
use crate::signals::{RevalidationSignals, Signal};
use agentview_cache::CacheStore;
use agentview_core::{ClientError, ClientResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Asynchronous resource loader, called with the controller's current key
pub type Loader<T> = Arc<dyn Fn(&str) -> BoxFuture<'static, ClientResult<T>> + Send + Sync>;

/// Success callback
pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Error callback
pub type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Wrap a zero-argument async closure as a [`Loader`] that ignores the key
pub fn loader<T, F, Fut>(f: F) -> Loader<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ClientResult<T>> + Send + 'static,
{
    Arc::new(move |_key: &str| f().boxed())
}

/// Wrap an async closure that fetches whatever key it is given
///
/// Use this when the controller may switch keys with
/// [`FetchController::set_key`].
pub fn keyed_loader<T, F, Fut>(f: F) -> Loader<T>
where
    F: Fn(&str) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ClientResult<T>> + Send + 'static,
{
    Arc::new(move |key: &str| f(key).boxed())
}

/// Observable state of one fetch controller
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    /// Last good value
    pub data: Option<T>,
    /// First load in progress with nothing to show
    pub is_loading: bool,
    /// Background revalidation in progress
    pub is_validating: bool,
    /// Error of the most recent accepted request
    pub error: Option<ClientError>,
}

impl<T> FetchState<T> {
    /// Empty state
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_validating: false,
            error: None,
        }
    }

    /// State seeded from a cached value
    #[inline]
    #[must_use]
    pub fn seeded(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::empty()
        }
    }

    /// State of a first load with nothing cached
    #[inline]
    #[must_use]
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::empty()
        }
    }
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fetch controller options
pub struct FetchOptions<T> {
    /// Refetch when the host regains focus
    pub revalidate_on_focus: bool,
    /// Refetch when connectivity is restored
    pub revalidate_on_reconnect: bool,
    /// Refetch on a fixed cadence
    pub refresh_interval: Option<Duration>,
    /// Called after every accepted successful resolution
    pub on_success: Option<SuccessCallback<T>>,
    /// Called after every accepted failed resolution
    pub on_error: Option<ErrorCallback>,
}

impl<T> FetchOptions<T> {
    /// Default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With focus revalidation toggled
    #[inline]
    #[must_use]
    pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = enabled;
        self
    }

    /// With reconnect revalidation toggled
    #[inline]
    #[must_use]
    pub fn revalidate_on_reconnect(mut self, enabled: bool) -> Self {
        self.revalidate_on_reconnect = enabled;
        self
    }

    /// With fixed refresh interval
    #[inline]
    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// With success callback
    #[must_use]
    pub fn on_success(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// With error callback
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl<T> Default for FetchOptions<T> {
    fn default() -> Self {
        Self {
            revalidate_on_focus: true,
            revalidate_on_reconnect: true,
            refresh_interval: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> Clone for FetchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            revalidate_on_focus: self.revalidate_on_focus,
            revalidate_on_reconnect: self.revalidate_on_reconnect,
            refresh_interval: self.refresh_interval,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> std::fmt::Debug for FetchOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("revalidate_on_focus", &self.revalidate_on_focus)
            .field("revalidate_on_reconnect", &self.revalidate_on_reconnect)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

/// Tracks one outstanding request, even if its future is dropped
///
/// The last request to leave clears the loading flags, unless the key
/// changed in the meantime.
struct InFlight<'a, T> {
    shared: &'a Shared<T>,
    generation: u64,
}

impl<'a, T> InFlight<'a, T> {
    fn enter(shared: &'a Shared<T>, generation: u64) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { shared, generation }
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        let remaining = self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 || self.shared.generation.load(Ordering::SeqCst) != self.generation {
            return;
        }
        self.shared.state.send_if_modified(|state| {
            let busy = state.is_loading || state.is_validating;
            state.is_loading = false;
            state.is_validating = false;
            busy
        });
    }
}

struct Shared<T> {
    key: RwLock<Option<String>>,
    generation: AtomicU64,
    loader: Loader<T>,
    cache: CacheStore,
    options: FetchOptions<T>,
    state: watch::Sender<FetchState<T>>,
    in_flight: AtomicUsize,
    disposed: AtomicBool,
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn initial_state(&self, key: Option<&str>) -> FetchState<T> {
        match key {
            None => FetchState::empty(),
            Some(key) => match self.cache.get::<T>(key) {
                Some(cached) => FetchState::seeded(cached),
                None => FetchState::loading(),
            },
        }
    }

    fn current_key(&self) -> Option<String> {
        self.key.read().clone()
    }

    async fn revalidate(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Some(key) = self.current_key() else {
            return;
        };
        let generation = self.generation.load(Ordering::SeqCst);
        let seq = self.cache.begin_request(&key);

        let _guard = InFlight::enter(self, generation);
        self.state.send_modify(|state| {
            if state.data.is_some() {
                state.is_validating = true;
            } else {
                state.is_loading = true;
            }
        });
        tracing::debug!(key = %key, seq, "fetch started");
        let result = (self.loader)(&key).await;

        if self.disposed.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
        {
            tracing::debug!(key = %key, seq, "discarding resolution for retired key");
            return;
        }

        // This request is still counted
        let idle = self.in_flight.load(Ordering::SeqCst) == 1;
        match result {
            Ok(value) => {
                let accepted = self.cache.commit(&key, seq, value.clone());
                let for_callback = accepted.then(|| value.clone());
                self.state.send_modify(|state| {
                    if accepted {
                        state.data = Some(value);
                        state.error = None;
                    }
                    if idle {
                        state.is_loading = false;
                        state.is_validating = false;
                    }
                });
                match (for_callback, &self.options.on_success) {
                    (Some(value), Some(on_success)) => on_success(&value),
                    (None, _) => {
                        tracing::debug!(key = %key, seq, "stale resolution discarded");
                    }
                    _ => {}
                }
            }
            Err(err) => {
                let current = self.cache.accept(&key, seq);
                if current {
                    tracing::warn!(key = %key, seq, error = %err, "fetch failed");
                }
                self.state.send_modify(|state| {
                    if current {
                        state.error = Some(err.clone());
                    }
                    if idle {
                        state.is_loading = false;
                        state.is_validating = false;
                    }
                });
                if current {
                    if let Some(on_error) = &self.options.on_error {
                        on_error(&err);
                    }
                }
            }
        }
    }

    async fn listen(self: Arc<Self>, mut signals: broadcast::Receiver<Signal>) {
        loop {
            match signals.recv().await {
                Ok(Signal::Focus) if self.options.revalidate_on_focus => self.revalidate().await,
                Ok(Signal::Reconnect) if self.options.revalidate_on_reconnect => {
                    self.revalidate().await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "revalidation signals lagged");
                    self.revalidate().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn poll_interval(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.revalidate().await;
        }
    }
}

/// Cached fetch controller for one resource key
///
/// Lifecycle is explicit: `start()` mounts, `stop()` unsubscribes from
/// triggers, `dispose()` additionally discards any in-flight resolution.
/// A `None` key disables the controller entirely.
pub struct FetchController<T> {
    shared: Arc<Shared<T>>,
    signals: RevalidationSignals,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
    started: AtomicBool,
}

impl<T> FetchController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create controller; state is seeded immediately from the cache
    ///
    /// With no fresh cache entry for `key` the state starts with
    /// `is_loading = true`.
    #[must_use]
    pub fn new(
        context: &QueryContext,
        key: Option<impl Into<String>>,
        loader: Loader<T>,
        options: FetchOptions<T>,
    ) -> Self {
        let key: Option<String> = key.map(Into::into);
        let (state, _) = watch::channel(FetchState::empty());
        let shared = Arc::new(Shared {
            key: RwLock::new(key.clone()),
            generation: AtomicU64::new(0),
            loader,
            cache: context.cache.clone(),
            options,
            state,
            in_flight: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        });
        shared
            .state
            .send_replace(shared.initial_state(key.as_deref()));

        Self {
            shared,
            signals: context.signals.clone(),
            tasks: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Mount: initial load (unless seeded) and trigger subscriptions
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.stop();
        self.started.store(true, Ordering::SeqCst);

        if self.shared.current_key().is_none() {
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        let mut tasks = self.tasks.lock();

        if self.shared.state.borrow().data.is_none() {
            let shared = Arc::clone(&self.shared);
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = shared.revalidate() => {}
                }
            }));
        }

        let options = &self.shared.options;
        if options.revalidate_on_focus || options.revalidate_on_reconnect {
            let shared = Arc::clone(&self.shared);
            let signals = self.signals.subscribe();
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = shared.listen(signals) => {}
                }
            }));
        }

        if let Some(period) = options.refresh_interval.filter(|p| !p.is_zero()) {
            let shared = Arc::clone(&self.shared);
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = shared.poll_interval(period) => {}
                }
            }));
        }
    }

    /// Unsubscribe from all triggers; returns once no listener can fire again
    ///
    /// An aborted mount or revalidation clears the loading flags once its
    /// task is torn down.
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Stop and discard any in-flight resolution; the controller is inert afterwards
    pub fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        self.stop();
        self.shared.state.send_modify(|state| {
            state.is_loading = false;
            state.is_validating = false;
        });
    }

    /// Switch to another key (or disable with `None`)
    ///
    /// Resolutions for the previous key are discarded. A started controller
    /// re-mounts immediately, and the loader is called with the new key.
    pub fn set_key(&self, key: Option<impl Into<String>>) {
        let key: Option<String> = key.map(Into::into);
        let was_started = self.started.load(Ordering::SeqCst);
        self.stop();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        *self.shared.key.write() = key.clone();
        self.shared
            .state
            .send_replace(self.shared.initial_state(key.as_deref()));
        if was_started {
            self.start();
        }
    }

    /// Force an unconditional revalidation and wait for it to settle
    pub async fn refresh(&self) {
        self.shared.revalidate().await;
    }

    /// Revalidate only if the cache no longer holds a live entry for the key
    ///
    /// Returns whether a fetch was performed.
    pub async fn revalidate_if_stale(&self) -> bool {
        let Some(key) = self.shared.current_key() else {
            return false;
        };
        if self.shared.cache.contains(&key) {
            return false;
        }
        self.shared.revalidate().await;
        true
    }

    /// Write a value to local state and cache without a network call
    ///
    /// Any request issued before this call resolves as stale.
    pub fn mutate(&self, value: T) {
        if let Some(key) = self.shared.current_key() {
            let seq = self.shared.cache.begin_request(&key);
            self.shared.cache.commit(&key, seq, value.clone());
        }
        self.shared.state.send_modify(|state| {
            state.data = Some(value);
            state.error = None;
        });
    }

    /// Like [`mutate`](Self::mutate), computing the value from the current data
    pub fn mutate_with(&self, update: impl FnOnce(Option<&T>) -> T) {
        let next = update(self.shared.state.borrow().data.as_ref());
        self.mutate(next);
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> FetchState<T> {
        self.shared.state.borrow().clone()
    }

    /// Current data, if any
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.shared.state.borrow().data.clone()
    }

    /// Receive every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.shared.state.subscribe()
    }

    /// Current key
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.shared.current_key()
    }

    /// Check if the controller was disposed
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl<T> Drop for FetchController<T> {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl<T> std::fmt::Debug for FetchController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchController")
            .field("key", &*self.shared.key.read())
            .field("options", &self.shared.options)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
