mod common;

use common::{TestApp, settle, wait_until};
use partswap_chat::domain::{NewMessage, NewThread};
use partswap_chat::storage::ChatStore;
use uuid::Uuid;

#[tokio::test]
async fn test_counterpart_message_increments_unread() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let sender = app.client();
    app.sign_in(&sender, a).await;
    let thread = sender.threads.create_direct_thread(a, b).await.expect("create thread");

    let receiver = app.client();
    app.sign_in(&receiver, b).await;
    assert!(wait_until(2000, || receiver.threads.get_thread_by_id(thread.id).is_some()).await);

    for text in ["one", "two", "three"] {
        sender.send.send_message(thread.id, text, a, None).await.expect("send");
    }

    assert!(
        wait_until(2000, || {
            receiver.threads.get_thread_by_id(thread.id).is_some_and(|t| t.unread_count == 3)
        })
        .await,
        "three counterpart inserts must read as unread 3"
    );
    assert_eq!(receiver.messages_snapshot(thread.id).len(), 3);

    // Receiving never inflates the sender's own counter.
    assert_eq!(sender.threads.get_thread_by_id(thread.id).map(|t| t.unread_count), Some(0));
}

#[tokio::test]
async fn test_messages_settle_in_creation_order() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let sender = app.client();
    app.sign_in(&sender, a).await;
    let thread = sender.threads.create_direct_thread(a, b).await.expect("create thread");

    let receiver = app.client();
    app.sign_in(&receiver, b).await;
    assert!(wait_until(2000, || receiver.threads.get_thread_by_id(thread.id).is_some()).await);

    let mut sent_ids = Vec::new();
    for text in ["first", "second", "third"] {
        let m = sender.send.send_message(thread.id, text, a, None).await.expect("send");
        sent_ids.push(m.id);
    }

    assert!(wait_until(2000, || receiver.messages_snapshot(thread.id).len() == 3).await);
    let received = receiver.messages_snapshot(thread.id);
    let received_ids: Vec<Uuid> = received.iter().map(|m| m.id).collect();
    assert_eq!(received_ids, sent_ids, "list order must follow creation time");
    assert!(received.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_unknown_thread_burst_coalesces_into_one_reload() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let receiver = app.client();
    app.sign_in(&receiver, b).await;
    let fetches_after_sign_in = app.store.thread_list_fetches();

    // A counterpart device writes a thread and a burst of messages straight
    // to the store before this client has ever heard of the thread.
    let thread = app
        .store
        .insert_thread(NewThread { listing_id: None, buyer_id: a, seller_id: b })
        .await
        .expect("insert thread");
    for text in ["got the swerve modules?", "team 4817 here", "we can trade a NEO"] {
        app.store
            .insert_message(NewMessage {
                thread_id: thread.id,
                sender_id: a,
                text: Some(text.to_string()),
                image_url: None,
            })
            .await
            .expect("insert message");
        app.store.increment_unread(thread.id).await.expect("increment unread");
    }

    assert!(
        wait_until(2000, || {
            receiver.threads.get_thread_by_id(thread.id).is_some_and(|t| t.unread_count == 3)
        })
        .await,
        "counterpart-created thread must appear after the debounced reload"
    );
    // Event rows were cached while the thread was unknown; the reload does
    // not discard them.
    assert_eq!(receiver.messages_snapshot(thread.id).len(), 3);

    settle().await;
    assert_eq!(
        app.store.thread_list_fetches() - fetches_after_sign_in,
        1,
        "the whole burst must coalesce into a single reload"
    );
}

#[tokio::test]
async fn test_read_receipt_event_patches_in_place() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let sender = app.client();
    app.sign_in(&sender, a).await;
    let thread = sender.threads.create_direct_thread(a, b).await.expect("create thread");

    let receiver = app.client();
    app.sign_in(&receiver, b).await;
    assert!(wait_until(2000, || receiver.threads.get_thread_by_id(thread.id).is_some()).await);

    let message = sender.send.send_message(thread.id, "hello", a, None).await.expect("send");
    assert!(wait_until(2000, || receiver.messages_snapshot(thread.id).len() == 1).await);

    receiver.threads.mark_thread_read(thread.id, b).await;

    assert!(
        wait_until(2000, || {
            sender
                .messages_snapshot(thread.id)
                .iter()
                .any(|m| m.id == message.id && m.read_at.is_some())
        })
        .await,
        "the sender's copy must pick up the read stamp from the update event"
    );
    // Identity of everything but the read stamp is preserved.
    let patched = sender.messages_snapshot(thread.id);
    assert_eq!(patched[0].text.as_deref(), Some("hello"));
    assert_eq!(patched[0].created_at, message.created_at);
}

#[tokio::test]
async fn test_sign_out_tears_down_subscription_and_state() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");

    let client = app.client();
    app.sign_in(&client, a).await;
    client.threads.create_direct_thread(a, b).await.expect("create thread");
    assert_eq!(app.store.subscriber_count(), 1);

    client.sign_out().await;
    assert!(
        wait_until(2000, || app.store.subscriber_count() == 0).await,
        "sign-out must release the change-feed subscription"
    );
    assert!(
        wait_until(2000, || client.threads_snapshot().is_empty()).await,
        "a previous identity's threads must not survive sign-out"
    );
}

#[tokio::test]
async fn test_identity_switch_rescopes_subscription() {
    let app = TestApp::new();
    let a = app.register_user("amelia");
    let b = app.register_user("bo");
    let c = app.register_user("cass");

    let client = app.client();
    app.sign_in(&client, a).await;
    let ab_thread = client.threads.create_direct_thread(a, b).await.expect("create thread");

    // Same device, different account.
    client.sign_out().await;
    assert!(wait_until(2000, || app.store.subscriber_count() == 0).await);
    app.sign_in(&client, c).await;
    assert!(client.threads.get_thread_by_id(ab_thread.id).is_none());

    // Events for the old identity's pair must no longer land here.
    app.store
        .insert_message(NewMessage {
            thread_id: ab_thread.id,
            sender_id: b,
            text: Some("for amelia only".into()),
            image_url: None,
        })
        .await
        .expect("insert message");
    common::settle().await;
    assert!(client.messages_snapshot(ab_thread.id).is_empty());
}
