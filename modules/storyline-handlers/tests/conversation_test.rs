//! Conversation meta mirroring and message pushes.

mod harness;

use harness::Harness;
use serde_json::json;
use storyline_common::{paths, ConversationKey, FileConfig, Message, MessageId, UserId};
use storyline_handlers::RecordingPush;
use storyline_store::TypedPath;

fn uid(id: &str) -> UserId {
    UserId::from(id)
}

fn key() -> ConversationKey {
    ConversationKey::between(&uid("amy"), &uid("bob"))
}

fn message(sender: &str, text: &str, timestamp: Option<i64>) -> Message {
    Message {
        sender_id: sender.into(),
        text: text.into(),
        timestamp,
    }
}

fn message_path(id: &str) -> TypedPath<Message> {
    paths::conversation_message(&key(), &MessageId::from(id))
}

fn people() -> serde_json::Value {
    json!({
        "users": {
            "profile": {
                "amy": { "username": "Amy" },
                "bob": { "username": "Bob" }
            },
            "tokens": { "amy": "tok-amy", "bob": "tok-bob" }
        }
    })
}

#[tokio::test]
async fn message_updates_meta_mirrors_and_pushes() {
    let mut h = Harness::new(people());

    let report = h.set(message_path("m1"), message("amy", "hello", Some(50))).await;
    assert!(report.is_clean(), "{report:?}");

    let meta = h.get(paths::conversation_meta(&key())).await.unwrap();
    assert_eq!(meta.latest, Some(50));
    assert_eq!(meta.last_seen(&uid("amy")), Some(50));
    assert_eq!(meta.last_seen(&uid("bob")), Some(0));

    assert_eq!(h.get(paths::mirror_seen(&uid("amy"), &uid("bob"))).await, Some(true));
    assert_eq!(h.get(paths::mirror_seen(&uid("bob"), &uid("amy"))).await, Some(false));
    assert_eq!(h.get(paths::mirror_latest(&uid("bob"), &uid("amy"))).await, Some(50));
    assert_eq!(
        h.get(paths::mirror_text(&uid("bob"), &uid("amy"))).await.as_deref(),
        Some("hello")
    );

    let sent = h.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "tok-bob");
    assert_eq!(sent[0].1.body, "Amy: hello");
}

#[tokio::test]
async fn reading_marks_the_reader_seen() {
    let mut h = Harness::new(people());
    h.set(message_path("m1"), message("amy", "hello", Some(50))).await;

    h.set(paths::conversation_last_seen(&key(), &uid("bob")), 60).await;

    assert_eq!(h.get(paths::mirror_seen(&uid("bob"), &uid("amy"))).await, Some(true));
}

#[tokio::test]
async fn blocked_conversation_gets_no_push() {
    let mut h = Harness::new(people());
    h.set(paths::block_edge(&uid("bob"), &uid("amy")), true).await;

    let report = h.set(message_path("m1"), message("amy", "hello", Some(50))).await;

    assert!(report.is_clean(), "{report:?}");
    assert!(h.push.sent().is_empty());
    assert_eq!(h.get(paths::mirror_blocked(&uid("bob"), &uid("amy"))).await, Some(true));
    assert_eq!(h.get(paths::mirror_latest(&uid("bob"), &uid("amy"))).await, Some(50));
}

#[tokio::test]
async fn message_without_timestamp_is_ignored() {
    let mut h = Harness::new(people());

    let report = h.set(message_path("m1"), message("amy", "hello", None)).await;

    assert!(report.is_clean());
    assert_eq!(h.get(paths::conversation_meta(&key())).await, None);
    assert!(h.push.sent().is_empty());
}

#[tokio::test]
async fn message_from_outsider_is_malformed() {
    let mut h = Harness::new(people());

    let report = h.set(message_path("m1"), message("eve", "hi", Some(5))).await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(h.get(paths::conversation_meta(&key())).await, None);
}

#[tokio::test]
async fn push_switched_off_in_config_sends_nothing() {
    let mut config = FileConfig::default();
    config.notifications.push_enabled = false;
    let mut h = Harness::with_config(people(), RecordingPush::new(), config);

    h.set(message_path("m1"), message("amy", "hello", Some(50))).await;

    assert!(h.push.sent().is_empty());
    assert_eq!(h.get(paths::mirror_latest(&uid("bob"), &uid("amy"))).await, Some(50));
}
