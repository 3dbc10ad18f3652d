//! Fetch/mutation flow tests
//!
//! Revalidation triggers, ordering guarantees and cache propagation between
//! controllers sharing one context.

use agentview_core::ClientError;
use agentview_query::prelude::*;
use agentview_test_utils::{CallCounter, PendingResponses, ScriptedResponses};
use std::time::Duration;

fn pending_loader(pending: &PendingResponses<u32>) -> agentview_query::Loader<u32> {
    let pending = pending.clone();
    loader(move || pending.call())
}

fn scripted_loader(script: &ScriptedResponses<u32>) -> agentview_query::Loader<u32> {
    let script = script.clone();
    loader(move || script.call())
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn newer_resolution_wins_over_older_one() {
    let context = QueryContext::default();
    let pending = PendingResponses::new();
    let controller = FetchController::new(
        &context,
        Some("leads"),
        pending_loader(&pending),
        FetchOptions::new(),
    );

    let resolver = async {
        while pending.calls() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(pending.resolve(1, Ok(2)));
        settle().await;
        assert!(pending.resolve(0, Ok(1)));
    };

    tokio::join!(controller.refresh(), controller.refresh(), resolver);

    assert_eq!(controller.data(), Some(2));
    assert_eq!(context.cache.get::<u32>("leads"), Some(2));
    let state = controller.state();
    assert!(!state.is_loading);
    assert!(!state.is_validating);
}

#[tokio::test]
async fn stale_error_does_not_mask_newer_data() {
    let context = QueryContext::default();
    let pending = PendingResponses::new();
    let controller = FetchController::new(
        &context,
        Some("leads"),
        pending_loader(&pending),
        FetchOptions::new(),
    );

    let resolver = async {
        while pending.calls() < 2 {
            tokio::task::yield_now().await;
        }
        pending.resolve(1, Ok(9));
        settle().await;
        pending.resolve(0, Err(ClientError::Network("late".to_string())));
    };

    tokio::join!(controller.refresh(), controller.refresh(), resolver);

    assert_eq!(controller.data(), Some(9));
    assert_eq!(controller.state().error, None);
}

#[tokio::test]
async fn older_success_does_not_overwrite_newer_error() {
    let context = QueryContext::default();
    let pending = PendingResponses::new();
    let controller = FetchController::new(
        &context,
        Some("leads"),
        pending_loader(&pending),
        FetchOptions::new(),
    );

    let resolver = async {
        while pending.calls() < 2 {
            tokio::task::yield_now().await;
        }
        pending.resolve(1, Err(ClientError::Network("newer failed".to_string())));
        settle().await;
        pending.resolve(0, Ok(1));
    };

    tokio::join!(controller.refresh(), controller.refresh(), resolver);

    let state = controller.state();
    assert_eq!(state.data, None);
    assert_eq!(state.error, Some(ClientError::Network("newer failed".to_string())));
    assert!(!state.is_loading);
    assert!(!context.cache.contains("leads"));
}

#[tokio::test]
async fn revalidation_keeps_stale_data_visible() {
    let context = QueryContext::default();
    context.cache.set("campaigns", 1_u32);
    let pending = PendingResponses::new();
    let controller = FetchController::new(
        &context,
        Some("campaigns"),
        pending_loader(&pending),
        FetchOptions::new(),
    );
    let mut rx = controller.subscribe();

    let observer = async {
        rx.wait_for(|s| s.is_validating).await.unwrap();
        let during = controller.state();
        assert_eq!(during.data, Some(1));
        assert!(!during.is_loading);
        pending.resolve(0, Ok(2));
    };

    tokio::join!(controller.refresh(), observer);

    assert_eq!(controller.state(), FetchState::seeded(2));
}

#[tokio::test]
async fn focus_and_reconnect_signals_revalidate() {
    let context = QueryContext::default();
    context.cache.set("icps", 0_u32);
    let script = ScriptedResponses::new([Ok(1), Ok(2)]);
    let controller = FetchController::new(
        &context,
        Some("icps"),
        scripted_loader(&script),
        FetchOptions::new(),
    );
    controller.start();
    settle().await;
    assert_eq!(script.calls(), 0);

    let mut rx = controller.subscribe();
    context.signals.notify_focus();
    rx.wait_for(|s| s.data == Some(1)).await.unwrap();

    context.signals.notify_reconnect();
    rx.wait_for(|s| s.data == Some(2)).await.unwrap();
    assert_eq!(script.calls(), 2);
}

#[tokio::test]
async fn disabled_triggers_are_ignored() {
    let context = QueryContext::default();
    context.cache.set("icps", 0_u32);
    let script = ScriptedResponses::new([Ok(1)]);
    let controller = FetchController::new(
        &context,
        Some("icps"),
        scripted_loader(&script),
        FetchOptions::new()
            .revalidate_on_focus(false)
            .revalidate_on_reconnect(false),
    );
    controller.start();

    context.signals.notify_focus();
    context.signals.notify_reconnect();
    settle().await;

    assert_eq!(script.calls(), 0);
    assert_eq!(context.signals.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_interval_refetches_on_cadence() {
    let context = QueryContext::default();
    let script = ScriptedResponses::new([Ok(1), Ok(2), Ok(3)]);
    let controller = FetchController::new(
        &context,
        Some("insights"),
        scripted_loader(&script),
        FetchOptions::new().refresh_interval(Duration::from_secs(10)),
    );
    let mut rx = controller.subscribe();

    controller.start();
    rx.wait_for(|s| s.data == Some(1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    rx.wait_for(|s| s.data == Some(2)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    rx.wait_for(|s| s.data == Some(3)).await.unwrap();

    controller.stop();
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(script.calls(), 3);
}

#[tokio::test]
async fn dispose_discards_in_flight_resolution() {
    let context = QueryContext::default();
    context.cache.set("leads", 1_u32);
    let pending = PendingResponses::new();
    let controller = FetchController::new(
        &context,
        Some("leads"),
        pending_loader(&pending),
        FetchOptions::new(),
    );

    let disposer = async {
        while pending.calls() < 1 {
            tokio::task::yield_now().await;
        }
        controller.dispose();
        pending.resolve(0, Ok(5));
    };
    tokio::join!(controller.refresh(), disposer);

    assert!(controller.is_disposed());
    assert_eq!(controller.state(), FetchState::seeded(1));
    assert_eq!(context.cache.get::<u32>("leads"), Some(1));
    assert_eq!(context.signals.subscriber_count(), 0);
}

#[tokio::test]
async fn stop_unsubscribes_before_returning() {
    let context = QueryContext::default();
    context.cache.set("leads", 1_u32);
    let script = ScriptedResponses::new([Ok(2)]);
    let controller = FetchController::new(
        &context,
        Some("leads"),
        scripted_loader(&script),
        FetchOptions::new(),
    );

    controller.start();
    controller.stop();
    context.signals.notify_focus();
    settle().await;

    assert_eq!(script.calls(), 0);
}

#[tokio::test]
async fn stop_during_initial_load_clears_loading_flag() {
    let context = QueryContext::default();
    let pending = PendingResponses::new();
    let controller = FetchController::new(
        &context,
        Some("leads"),
        pending_loader(&pending),
        FetchOptions::new(),
    );
    let mut rx = controller.subscribe();

    controller.start();
    while pending.calls() < 1 {
        tokio::task::yield_now().await;
    }
    assert!(controller.state().is_loading);

    controller.stop();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| !s.is_loading))
        .await
        .expect("loading flag cleared")
        .unwrap();

    assert_eq!(controller.state(), FetchState::empty());
    assert!(!pending.resolve(0, Ok(1)));
    assert!(!context.cache.contains("leads"));
}

#[tokio::test]
async fn mutation_invalidation_triggers_refetch_on_next_read() {
    let context = QueryContext::default();
    let script = ScriptedResponses::new([Ok(10), Ok(11)]);
    let leads = FetchController::new(
        &context,
        Some("leads"),
        scripted_loader(&script),
        FetchOptions::new(),
    );
    leads.refresh().await;
    assert_eq!(leads.data(), Some(10));

    let successes = CallCounter::new();
    let create = MutationController::new(
        &context,
        mutator(|n: u32| async move { Ok(n) }),
        MutationOptions::new().invalidate_keys(["leads"]).on_success({
            let successes = successes.clone();
            move |_: &u32| successes.hit()
        }),
    );

    assert_eq!(create.execute(3).await, Some(3));
    assert!(!context.cache.contains("leads"));
    assert_eq!(leads.data(), Some(10));

    assert!(leads.revalidate_if_stale().await);
    assert_eq!(leads.data(), Some(11));
    assert_eq!(successes.count(), 1);
}

#[tokio::test]
async fn second_controller_on_same_key_is_seeded_by_first() {
    let context = QueryContext::default();
    let first_script = ScriptedResponses::new([Ok(4)]);
    let first = FetchController::new(
        &context,
        Some("competitors"),
        scripted_loader(&first_script),
        FetchOptions::new(),
    );
    first.refresh().await;

    let second_script = ScriptedResponses::new([Ok(5)]);
    let second = FetchController::new(
        &context,
        Some("competitors"),
        scripted_loader(&second_script),
        FetchOptions::new(),
    );
    second.start();
    settle().await;

    assert_eq!(second.state(), FetchState::seeded(4));
    assert_eq!(second_script.calls(), 0);
}
