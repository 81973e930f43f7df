mod helpers;

use chrono::Duration as ChronoDuration;
use guessr_backend::models::Outcome;
use guessr_backend::services::{Backoff, ResolutionScheduler};
use helpers::*;
use std::sync::Arc;
use std::time::Duration;

fn quick_backoff() -> Backoff {
    Backoff {
        base: Duration::from_millis(1),
        factor: 2,
        cap: Duration::from_millis(5),
        max_attempts: 3,
    }
}

#[tokio::test]
async fn test_scheduled_resolution_publishes_notice() {
    let ctx = TestContext::new();
    let player = ctx.engine.create_player().await.unwrap();
    let pending = ctx
        .engine
        .make_guess(&player.player_id.to_string(), "down")
        .await
        .unwrap();

    let scheduler = Arc::new(ResolutionScheduler::new(ctx.engine.clone()).with_backoff(quick_backoff()));
    let mut notices = scheduler.subscribe();

    // Already due, so the task fires without sleeping
    ctx.wait_cooldown();
    ctx.prices.set(price(45000));
    scheduler
        .schedule(player.player_id, pending.resolvable_at())
        .await
        .unwrap();

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.player_id, player.player_id);
    assert_eq!(notice.guess.guess, pending);
    assert_eq!(notice.guess.outcome, Outcome::Win);

    assert!(!ctx.stored(player.player_id).await.has_pending_guess());
}

#[tokio::test]
async fn test_retry_gives_up_while_cooling_down() {
    let ctx = TestContext::new();
    let player = ctx.engine.create_player().await.unwrap();
    ctx.engine
        .make_guess(&player.player_id.to_string(), "up")
        .await
        .unwrap();

    ctx.clock.advance(ChronoDuration::seconds(30));
    let scheduler = ResolutionScheduler::new(ctx.engine.clone()).with_backoff(quick_backoff());

    assert!(scheduler.resolve_with_retry(player.player_id).await.is_none());
    assert!(ctx.stored(player.player_id).await.has_pending_guess());
}

#[tokio::test]
async fn test_retry_stops_when_nothing_pending() {
    let ctx = TestContext::new();
    let player = ctx.engine.create_player().await.unwrap();
    let scheduler = ResolutionScheduler::new(ctx.engine.clone()).with_backoff(quick_backoff());

    assert!(scheduler.resolve_with_retry(player.player_id).await.is_none());
    // One attempt, no retries: the price source was never asked
    assert_eq!(ctx.prices.calls(), 0);
}

#[tokio::test]
async fn test_retry_on_price_failure() {
    let ctx = TestContext::new();
    let player = ctx.engine.create_player().await.unwrap();
    ctx.engine
        .make_guess(&player.player_id.to_string(), "up")
        .await
        .unwrap();
    ctx.wait_cooldown();

    ctx.prices.set_failing(true);
    let before = ctx.prices.calls();
    let scheduler = ResolutionScheduler::new(ctx.engine.clone()).with_backoff(quick_backoff());

    assert!(scheduler.resolve_with_retry(player.player_id).await.is_none());
    assert_eq!(ctx.prices.calls() - before, 3);
    assert!(ctx.stored(player.player_id).await.has_pending_guess());

    ctx.prices.set_failing(false);
    let resolved = scheduler.resolve_with_retry(player.player_id).await.unwrap();
    assert_eq!(resolved.outcome, Outcome::Lose);
}

#[tokio::test]
async fn test_no_sleep_after_final_attempt() {
    let ctx = TestContext::new();
    let player = ctx.engine.create_player().await.unwrap();
    ctx.engine
        .make_guess(&player.player_id.to_string(), "up")
        .await
        .unwrap();
    ctx.wait_cooldown();
    ctx.prices.set_failing(true);
    let before = ctx.prices.calls();

    let slow = Backoff {
        base: Duration::from_secs(30),
        factor: 2,
        cap: Duration::from_secs(30),
        max_attempts: 1,
    };
    let scheduler = ResolutionScheduler::new(ctx.engine.clone()).with_backoff(slow);

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        scheduler.resolve_with_retry(player.player_id),
    )
    .await
    .expect("final attempt should not be followed by a backoff sleep");
    assert!(result.is_none());
    assert_eq!(ctx.prices.calls() - before, 1);
}
