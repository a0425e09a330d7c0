mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::TestApp;
use neurocom_core::access::{AccessChain, QuotaTable};
use neurocom_core::domain::{BookingStatus, ContentKind, NewBooking, Resource, Tier};
use neurocom_core::memory::Failure;
use neurocom_core::{CoreError, InboxLimits};

fn slot(hours_from_now: i64) -> NewBooking {
    let starts_at = Utc::now() + ChronoDuration::hours(hours_from_now);
    NewBooking {
        starts_at,
        ends_at: starts_at + ChronoDuration::minutes(50),
        notes: Some("primeira conversa".to_string()),
    }
}

#[tokio::test]
async fn free_user_cannot_schedule() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);

    let err = app
        .access
        .enforce(&app.schedule_chain(), app.ctx(&user), None)
        .await
        .unwrap_err();

    match err {
        CoreError::InsufficientTier { current, allowed } => {
            assert_eq!(current, Tier::Free);
            assert_eq!(allowed, vec![Tier::Intermediate, Tier::Full]);
        }
        other => panic!("expected InsufficientTier, got {other:?}"),
    }
}

#[tokio::test]
async fn intermediate_user_at_message_limit_is_refused() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    app.store.set_usage(user.id, Resource::Messages, 5);

    let err = app
        .access
        .enforce(&app.messages_chain(), app.ctx(&user), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::QuotaExceeded {
            resource: Resource::Messages,
            limit: 5,
            used: 5,
            current: Tier::Intermediate,
        }
    ));
}

#[tokio::test]
async fn usage_counts_each_successful_action_until_the_limit() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    let chain = app.schedule_chain();

    for n in 1..=2 {
        let ctx = app.access.enforce(&chain, app.ctx(&user), None).await.unwrap();
        app.inbox.book_consultation(ctx.user_id, slot(n)).await.unwrap();
        assert_eq!(app.usage(&user, Resource::Consultations), n as u32);
    }

    let err = app
        .access
        .enforce(&chain, app.ctx(&user), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QuotaExceeded { used: 2, limit: 2, .. }));
    assert_eq!(app.usage(&user, Resource::Consultations), 2);
}

#[tokio::test]
async fn full_tier_is_never_quota_limited() {
    let app = TestApp::new();
    let user = app.user(Tier::Full);
    let chain = app.messages_chain();

    for _ in 0..20 {
        let ctx = app.access.enforce(&chain, app.ctx(&user), None).await.unwrap();
        app.inbox.send_message(ctx.user_id, "olá", None).await.unwrap();
    }
    assert_eq!(app.usage(&user, Resource::Messages), 20);
}

#[tokio::test]
async fn failed_booking_does_not_consume_quota() {
    let app = TestApp::with_limits(InboxLimits {
        consultations: QuotaTable::intermediate_only(3),
        ..InboxLimits::default()
    });
    let user = app.user(Tier::Intermediate);
    app.store.set_usage(user.id, Resource::Consultations, 2);
    app.store.inject(Failure::BookingWrite);

    let ctx = app
        .access
        .enforce(&app.schedule_chain(), app.ctx(&user), None)
        .await
        .unwrap();
    let err = app.inbox.book_consultation(ctx.user_id, slot(1)).await.unwrap_err();

    assert!(matches!(err, CoreError::Port(_)));
    assert_eq!(app.usage(&user, Resource::Consultations), 2);
}

#[tokio::test]
async fn failed_message_does_not_consume_quota() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    app.store.inject(Failure::MessageWrite);

    assert!(app.inbox.send_message(user.id, "olá", None).await.is_err());
    assert_eq!(app.usage(&user, Resource::Messages), 0);
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_writing() {
    let app = TestApp::new();
    let user = app.user(Tier::Full);

    let err = app.inbox.send_message(user.id, "   ", None).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let mut backwards = slot(2);
    backwards.ends_at = backwards.starts_at - ChronoDuration::minutes(1);
    let err = app.inbox.book_consultation(user.id, backwards).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    assert_eq!(app.usage(&user, Resource::Messages), 0);
    assert_eq!(app.usage(&user, Resource::Consultations), 0);
}

#[tokio::test]
async fn cancel_only_touches_own_bookings_and_keeps_quota() {
    let app = TestApp::new();
    let owner = app.user(Tier::Intermediate);
    let other = app.user(Tier::Full);
    let booking = app.inbox.book_consultation(owner.id, slot(3)).await.unwrap();

    let err = app.inbox.cancel_booking(other.id, booking.id).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let canceled = app.inbox.cancel_booking(owner.id, booking.id).await.unwrap();
    assert_eq!(canceled.status, BookingStatus::Canceled);
    assert!(canceled.canceled_at.is_some());
    assert_eq!(app.usage(&owner, Resource::Consultations), 1);
}

#[tokio::test]
async fn content_gate_compares_tier_with_item_level() {
    let app = TestApp::new();
    app.store.add_video("sono-profundo", "Sono profundo", Tier::Intermediate);
    let chain = AccessChain::new().content_level(ContentKind::Video);

    let free = app.user(Tier::Free);
    let err = app
        .access
        .enforce(&chain, app.ctx(&free), Some("sono-profundo"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InsufficientTier { current: Tier::Free, ref allowed }
            if allowed == &vec![Tier::Intermediate, Tier::Full]
    ));

    let intermediate = app.user(Tier::Intermediate);
    assert!(app
        .access
        .enforce(&chain, app.ctx(&intermediate), Some("sono-profundo"))
        .await
        .is_ok());

    // Unknown content is left for the handler to report.
    assert!(app
        .access
        .enforce(&chain, app.ctx(&free), Some("nao-existe"))
        .await
        .is_ok());
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let app = TestApp::new();
    let ghost = neurocom_core::RequestContext::authenticated(uuid::Uuid::new_v4());

    let err = app
        .access
        .enforce(&app.messages_chain(), ghost, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UserNotFound(_)));
}

#[tokio::test]
async fn resolved_context_carries_the_user_record() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);

    let ctx = app
        .access
        .enforce(&AccessChain::new(), app.ctx(&user), None)
        .await
        .unwrap();
    assert_eq!(ctx.user().map(|u| u.tier), Some(Tier::Intermediate));

    let status = app.inbox.status(ctx.user().unwrap(), Resource::Messages);
    assert!(status.can_use());
    assert_eq!(status.used, 0);
}
