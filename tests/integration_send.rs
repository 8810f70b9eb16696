mod common;

use common::{TestApp, settle, wait_until};
use partswap_chat::ChatError;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_empty_message_rejected_before_any_io() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    let result = client.send.send_message(thread.id, "   ", a, None).await;
    assert!(matches!(result, Err(ChatError::EmptyMessage)));
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_image_with_empty_text_is_allowed() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    let message = client
        .send
        .send_message(thread.id, "", a, Some("https://img.example/gearbox.jpg".into()))
        .await
        .expect("image-only send");
    assert_eq!(message.text, None);
    assert_eq!(message.image_url.as_deref(), Some("https://img.example/gearbox.jpg"));
}

#[tokio::test]
async fn test_unknown_thread_is_not_found() {
    let app = TestApp::new();
    let a = app.register_user("amelia");

    let client = app.client();
    app.sign_in(&client, a).await;

    let result = client.send.send_message(Uuid::new_v4(), "hello", a, None).await;
    assert!(matches!(result, Err(ChatError::ThreadNotFound)));
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_nonparticipant_sender_is_forbidden_without_insert_attempt() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");
    let outsider = app.register_user("mallory");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    let result = client.send.send_message(thread.id, "let me in", outsider, None).await;
    assert!(matches!(result, Err(ChatError::NotParticipant)));
    assert_eq!(app.store.message_count(), 0, "authorization failure must not reach the store");
}

#[tokio::test]
async fn test_send_without_session_fails() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    client.sign_out().await;
    let result = client.send.send_message(thread.id, "hello", a, None).await;
    assert!(matches!(result, Err(ChatError::NoSession)));
    assert_eq!(app.store.message_count(), 0);
}

#[tokio::test]
async fn test_hung_store_surfaces_timeout() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    // Timeout is 2s in the test config; the stalled insert holds far longer.
    app.store.set_stall_writes(true);
    let started = tokio::time::Instant::now();
    let err = client
        .send
        .send_message(thread.id, "anyone there?", a, None)
        .await
        .expect_err("a hung insert must not succeed");

    assert!(matches!(err, ChatError::Timeout));
    assert!(err.is_retryable(), "a timeout is transient and worth a manual retry");
    assert!(started.elapsed() < Duration::from_secs(10), "the send must not wait out the stall");
    assert_eq!(app.store.message_count(), 0, "the abandoned insert never reaches the store");
    assert!(client.messages_snapshot(thread.id).is_empty());
    app.store.set_stall_writes(false);
}

#[tokio::test]
async fn test_store_failure_leaves_local_state_untouched() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    app.store.set_fail_writes(true);
    let result = client.send.send_message(thread.id, "did this go through?", a, None).await;
    assert!(matches!(result, Err(ChatError::Store(_))));
    assert!(
        client.messages_snapshot(thread.id).is_empty(),
        "no optimistic mutation before the insert succeeds"
    );

    // The caller restores the draft and retries once the store recovers.
    app.store.set_fail_writes(false);
    let message =
        client.send.send_message(thread.id, "did this go through?", a, None).await.expect("retry");
    assert_eq!(client.messages_snapshot(thread.id).len(), 1);
    assert_eq!(message.text.as_deref(), Some("did this go through?"));
}

#[tokio::test]
async fn test_metadata_failure_does_not_fail_the_send() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    app.store.set_fail_metadata_writes(true);
    let message = client
        .send
        .send_message(thread.id, "the message itself is durable", a, None)
        .await
        .expect("send must survive a secondary-write failure");

    assert_eq!(client.messages_snapshot(thread.id).len(), 1);
    assert_eq!(app.store.stored_thread(thread.id).map(|t| t.unread_count), Some(0));
    assert_eq!(message.text.as_deref(), Some("the message itself is durable"));
}

#[tokio::test]
async fn test_send_response_and_event_materialize_one_row() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    let message = client.send.send_message(thread.id, "hello", a, None).await.expect("send");

    // The reconciler receives the insert event for our own send; after it
    // settles the row must still appear exactly once.
    settle().await;
    let rows = client.messages_snapshot(thread.id);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, message.id);
    // Our own message never counts against our unread counter.
    assert_eq!(client.threads.get_thread_by_id(thread.id).map(|t| t.unread_count), Some(0));
}

#[tokio::test]
async fn test_send_updates_thread_metadata_remotely() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    let thread = client.threads.create_direct_thread(a, b).await.expect("create thread");
    let message = client.send.send_message(thread.id, "ping", a, None).await.expect("send");

    assert!(
        wait_until(1000, || {
            app.store
                .stored_thread(thread.id)
                .is_some_and(|t| t.unread_count == 1 && t.last_message_at >= message.created_at)
        })
        .await,
        "last-message pointer and unread counter must be bumped in the store"
    );
}
