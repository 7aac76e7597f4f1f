// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the thread messaging session over the full in-memory stack.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use concord_bus::{BusEvent, EventKind};
use concord_core::types::{
    CloseRequestState, Message, MessageKind, ThreadKind, ThreadStatus, TopicVerdict, UserId,
};
use concord_core::ConcordError;
use concord_session::{SendOutcome, SessionEvent};
use concord_test_utils::{drain_events, MockModerationProvider, TestHarness};

async fn harness() -> TestHarness {
    TestHarness::builder().build().await.expect("harness builds")
}

#[tokio::test]
async fn direct_send_persists_once_despite_feed_echo() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    let (session, mut events) = h.open_session("t1").await.unwrap();

    let outcome = session.send_message("Hello").await.unwrap();
    h.settle().await;

    let SendOutcome::Sent(message) = outcome else {
        panic!("expected a sent message, got {outcome:?}");
    };
    assert_eq!(message.kind, MessageKind::UserMessage);
    assert_eq!(message.text, "Hello");
    assert!(message.details.is_none());
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.store.messages("t1").len(), 1);
    assert_eq!(session.messages().len(), 1);
    assert!(drain_events(&mut events).contains(&SessionEvent::MessagesChanged));
}

#[tokio::test]
async fn blank_draft_is_refused() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    let (session, _events) = h.open_session("t1").await.unwrap();

    let err = session.send_message("   ").await.unwrap_err();
    assert!(matches!(err, ConcordError::Validation(_)));
    assert_eq!(h.store.insert_calls(), 0);
}

#[tokio::test]
async fn off_topic_draft_is_rejected_and_refocuses_compose() {
    let h = TestHarness::builder()
        .with_provider(
            MockModerationProvider::new()
                .with_verdict(TopicVerdict::off_topic("Keep this thread about pickups.")),
        )
        .build()
        .await
        .unwrap();
    h.store
        .seed_thread_with("t1", ThreadKind::Standard, true, Some("pickups"));
    let (session, mut events) = h.open_session("t1").await.unwrap();

    let outcome = session.send_message("Did you watch the game?").await.unwrap();

    assert_eq!(
        outcome,
        SendOutcome::Rejected {
            reason: "Keep this thread about pickups.".to_string()
        }
    );
    assert_eq!(h.store.insert_calls(), 0);
    assert_eq!(
        drain_events(&mut events),
        vec![
            SessionEvent::ReviewRejected {
                reason: "Keep this thread about pickups.".to_string()
            },
            SessionEvent::FocusCompose,
        ]
    );
}

#[tokio::test]
async fn provider_failure_never_sends_unmoderated_text() {
    let h = TestHarness::builder()
        .with_provider(MockModerationProvider::new().failing_classify())
        .with_auto_accept(true)
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, _events) = h.open_session("t1").await.unwrap();

    let outcome = session.send_message("hello").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Rejected { .. }));
    assert_eq!(h.store.insert_calls(), 0);
}

#[tokio::test]
async fn auto_accept_persists_suggestion_with_provenance() {
    let h = TestHarness::builder()
        .with_provider(MockModerationProvider::new().with_rephrase("Could you be on time, please?"))
        .with_auto_accept(true)
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, _events) = h.open_session("t1").await.unwrap();

    let outcome = session.send_message("Be on time for once.").await.unwrap();

    let SendOutcome::Sent(message) = outcome else {
        panic!("expected auto-accepted send, got {outcome:?}");
    };
    assert_eq!(message.kind, MessageKind::UserMessage);
    assert_eq!(message.text, "Could you be on time, please?");
    let details = message.details.expect("provenance");
    assert_eq!(details.ai_response.as_deref(), Some("Could you be on time, please?"));
    assert_eq!(details.original_message.as_deref(), Some("Be on time for once."));
    assert!(session.pending_review().is_none());
}

#[tokio::test]
async fn manual_review_waits_for_accept() {
    let h = TestHarness::builder()
        .with_provider(MockModerationProvider::new().with_rephrase("Softer words"))
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, mut events) = h.open_session("t1").await.unwrap();

    let outcome = session.send_message("Harsh words").await.unwrap();
    let SendOutcome::AwaitingReview(review) = outcome else {
        panic!("expected a pending review, got {outcome:?}");
    };
    assert_eq!(review.original, "Harsh words");
    assert_eq!(review.suggested, "Softer words");
    assert_eq!(h.store.insert_calls(), 0);
    assert_eq!(
        drain_events(&mut events),
        vec![SessionEvent::ReviewReady(review.clone())]
    );

    let message = session.accept_suggestion().await.unwrap();
    assert_eq!(message.text, "Softer words");
    assert_eq!(
        message.details.and_then(|d| d.original_message).as_deref(),
        Some("Harsh words")
    );

    let again = session.accept_suggestion().await.unwrap_err();
    assert!(matches!(again, ConcordError::Validation(_)));
    assert_eq!(h.store.insert_calls(), 1);
}

#[tokio::test]
async fn send_original_keeps_the_draft_text() {
    let h = TestHarness::builder()
        .with_provider(MockModerationProvider::new().with_rephrase("Softer words"))
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, _events) = h.open_session("t1").await.unwrap();

    session.send_message("My words").await.unwrap();
    let message = session.send_original().await.unwrap();

    assert_eq!(message.text, "My words");
    let details = message.details.expect("provenance");
    assert_eq!(details.ai_response.as_deref(), Some("Softer words"));
    assert_eq!(details.original_message.as_deref(), Some("My words"));
}

#[tokio::test]
async fn rejecting_a_suggestion_sends_nothing() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, mut events) = h.open_session("t1").await.unwrap();

    session.send_message("draft").await.unwrap();
    drain_events(&mut events);

    let review = session.reject_suggestion().unwrap();
    assert_eq!(review.original, "draft");
    assert_eq!(drain_events(&mut events), vec![SessionEvent::FocusCompose]);
    assert_eq!(h.store.insert_calls(), 0);
    assert!(session.reject_suggestion().is_err());
}

#[tokio::test]
async fn thread_kind_selects_message_kind_without_moderation() {
    let h = harness().await;
    h.store.seed_thread_with("ai", ThreadKind::AiAssistant, true, None);
    h.store.seed_thread_with("support", ThreadKind::CustomerSupport, true, None);
    let (ai, _ai_events) = h.open_session("ai").await.unwrap();
    let (support, _support_events) = h.open_session("support").await.unwrap();

    let SendOutcome::Sent(a) = ai.send_message("What should I pack?").await.unwrap() else {
        panic!("ai thread must send directly");
    };
    let SendOutcome::Sent(s) = support.send_message("The app crashed").await.unwrap() else {
        panic!("support thread must send directly");
    };

    assert_eq!(a.kind, MessageKind::AiMessage);
    assert_eq!(s.kind, MessageKind::CustomerSupport);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.store.insert_calls(), 2);
}

#[tokio::test]
async fn duplicate_message_events_are_kept_once() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    let (session, _events) = h.open_session("t1").await.unwrap();

    let message = Message {
        id: "m-dup".into(),
        thread_id: "t1".into(),
        sender_id: "other".into(),
        text: "again and again".to_string(),
        kind: MessageKind::UserMessage,
        timestamp: Utc::now(),
        details: None,
    };
    for _ in 0..4 {
        h.bus.dispatch(BusEvent::MessageReceived(message.clone()));
    }
    h.bus.dispatch(BusEvent::MessageReceived(Message {
        thread_id: "t2".into(),
        id: "m-elsewhere".into(),
        ..message.clone()
    }));

    let ids: Vec<String> = session.messages().into_iter().map(|m| m.id.0).collect();
    assert_eq!(ids, vec!["m-dup".to_string()]);
}

#[tokio::test]
async fn close_request_round_trip_between_participants() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    let (mine, mut my_events) = h.open_session("t1").await.unwrap();
    let (theirs, _their_events) = h.open_session_as("other", "t1").await.unwrap();

    mine.send_message("Can we wrap this up?").await.unwrap();
    mine.request_close().await.unwrap();
    h.settle().await;
    assert_eq!(mine.close_state(), CloseRequestState::Pending);
    assert_eq!(theirs.close_state(), CloseRequestState::Pending);
    assert!(drain_events(&mut my_events)
        .contains(&SessionEvent::CloseStateChanged(CloseRequestState::Pending)));

    let own = mine.accept_close().await.unwrap_err();
    assert!(matches!(own, ConcordError::Validation(_)));

    theirs.decline_close().await.unwrap();
    h.settle().await;
    assert_eq!(mine.close_state(), CloseRequestState::Resolved);

    let nothing_pending = theirs.decline_close().await.unwrap_err();
    assert!(matches!(nothing_pending, ConcordError::Validation(_)));

    mine.request_close().await.unwrap();
    h.settle().await;
    assert_eq!(theirs.close_state(), CloseRequestState::Pending);

    theirs.accept_close().await.unwrap();
    h.settle().await;
    assert_eq!(h.store.thread_status("t1"), Some(ThreadStatus::Closed));
    assert_eq!(mine.thread().status, ThreadStatus::Closed);

    let closed = mine.send_message("one more thing").await.unwrap_err();
    assert!(matches!(closed, ConcordError::Validation(_)));
}

#[tokio::test]
async fn mark_read_is_idempotent_and_updates_unread_counts() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    h.store.seed_participants("t1", &["me", "other"]);
    let (mine, _my_events) = h.open_session("t1").await.unwrap();
    let (theirs, _their_events) = h.open_session_as("other", "t1").await.unwrap();

    theirs.send_message("first").await.unwrap();
    theirs.send_message("second").await.unwrap();
    mine.send_message("mine").await.unwrap();
    h.settle().await;

    assert_eq!(mine.messages().len(), 3);
    assert_eq!(h.aggregator.snapshot().count_for(&"t1".into()), 2);

    assert_eq!(mine.mark_read().await.unwrap(), 2);
    assert_eq!(mine.mark_read().await.unwrap(), 0);
    h.settle().await;

    let me = UserId::from("me");
    assert!(mine
        .messages()
        .iter()
        .filter(|m| m.sender_id.0 == "other")
        .all(|m| mine.is_read_by(&m.id, &me)));
    assert_eq!(h.aggregator.snapshot().total(), 0);

    let first = &h.store.messages("t1")[0];
    let stamped = h.store.receipt(&first.id.0, "me").and_then(|r| r.read_at);
    assert!(stamped.is_some());
    theirs.mark_read().await.unwrap();
    assert_eq!(h.store.receipt(&first.id.0, "me").and_then(|r| r.read_at), stamped);
}

#[tokio::test]
async fn other_party_sees_read_receipts() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    h.store.seed_participants("t1", &["me", "other"]);
    let (mine, _my_events) = h.open_session("t1").await.unwrap();
    let (theirs, mut their_events) = h.open_session_as("other", "t1").await.unwrap();

    let SendOutcome::Sent(sent) = theirs.send_message("did you see this?").await.unwrap() else {
        panic!("direct send expected");
    };
    h.settle().await;
    drain_events(&mut their_events);

    mine.mark_read().await.unwrap();
    h.settle().await;

    assert!(theirs.is_read_by(&sent.id, &UserId::from("me")));
    assert!(drain_events(&mut their_events).contains(&SessionEvent::MessagesChanged));
}

#[tokio::test]
async fn closing_unregisters_handlers() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    let baseline = h.bus.handler_count(EventKind::MessageReceived);

    let (session, _events) = h.open_session("t1").await.unwrap();
    assert_eq!(h.bus.handler_count(EventKind::MessageReceived), baseline + 1);

    session.close();
    session.close();
    assert_eq!(h.bus.handler_count(EventKind::MessageReceived), baseline);
    assert_eq!(h.bus.handler_count(EventKind::ReadReceiptUpdated), 1);

    let err = session.send_message("hello").await.unwrap_err();
    assert!(matches!(err, ConcordError::SessionClosed));

    {
        let (_dropped, _events) = h.open_session("t1").await.unwrap();
    }
    assert_eq!(h.bus.handler_count(EventKind::MessageReceived), baseline);
}

#[tokio::test]
async fn opening_a_missing_thread_registers_no_handlers() {
    let h = harness().await;
    let messages = h.bus.handler_count(EventKind::MessageReceived);
    let receipts = h.bus.handler_count(EventKind::ReadReceiptUpdated);

    let Err(err) = h.open_session("missing").await else {
        panic!("opening a missing thread should fail");
    };

    assert!(matches!(err, ConcordError::Store { .. }));
    assert_eq!(h.bus.handler_count(EventKind::MessageReceived), messages);
    assert_eq!(h.bus.handler_count(EventKind::ReadReceiptUpdated), receipts);
}

#[tokio::test]
async fn store_write_failure_is_reported() {
    let h = harness().await;
    h.store.seed_thread_with("t1", ThreadKind::Standard, false, None);
    let (session, mut events) = h.open_session("t1").await.unwrap();
    h.store.fail_writes(true);

    let err = session.send_message("hello").await.unwrap_err();

    assert!(matches!(err, ConcordError::Store { .. }));
    assert!(session.messages().is_empty());
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [SessionEvent::SendFailed { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn closing_mid_review_discards_the_decision() {
    let h = TestHarness::builder()
        .with_provider(MockModerationProvider::new().with_delay(Duration::from_secs(5)))
        .with_auto_accept(true)
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, mut events) = h.open_session("t1").await.unwrap();
    let session = Arc::new(session);

    let sending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_message("hello").await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.close();

    let outcome = sending.await.unwrap().unwrap();
    assert_eq!(outcome, SendOutcome::Discarded);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.store.insert_calls(), 0);
    assert!(drain_events(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn newer_send_supersedes_a_slow_review() {
    let h = TestHarness::builder()
        .with_provider(
            MockModerationProvider::new().with_delay_for("old", Duration::from_secs(3)),
        )
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, mut events) = h.open_session("t1").await.unwrap();
    let session = Arc::new(session);

    let sending_old = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_message("old").await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let outcome = session.send_message("new").await.unwrap();
    let SendOutcome::AwaitingReview(review) = outcome else {
        panic!("expected a pending review, got {outcome:?}");
    };
    assert_eq!(review.original, "new");

    assert_eq!(sending_old.await.unwrap().unwrap(), SendOutcome::Discarded);
    assert_eq!(session.pending_review(), Some(review.clone()));
    assert_eq!(
        drain_events(&mut events),
        vec![SessionEvent::ReviewReady(review)]
    );
}

#[tokio::test(start_paused = true)]
async fn auto_accept_never_persists_a_superseded_draft() {
    let h = TestHarness::builder()
        .with_provider(
            MockModerationProvider::new().with_delay_for("old", Duration::from_secs(3)),
        )
        .with_auto_accept(true)
        .build()
        .await
        .unwrap();
    h.store.seed_thread_with("t1", ThreadKind::Standard, true, None);
    let (session, _events) = h.open_session("t1").await.unwrap();
    let session = Arc::new(session);

    let sending_old = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_message("old").await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let outcome = session.send_message("new").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(_)), "got {outcome:?}");
    assert_eq!(sending_old.await.unwrap().unwrap(), SendOutcome::Discarded);

    let texts: Vec<String> = h
        .store
        .messages("t1")
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["Kindly: new".to_string()]);
}
