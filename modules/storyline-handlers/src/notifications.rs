//! Idempotent notification records and push delivery.
//!
//! A notification's key is derived from its type and subject ids only, so
//! replaying the event that produced it rewrites the same record instead of
//! adding another. Records live in the recipient's namespace, next to a
//! `false` unseen flag, and are indexed under the post they are about so
//! that deleting the post can find them.

use futures::future::join_all;
use storyline_common::paths;
use storyline_common::{
    trim_for_push, Notification, NotificationKey, NotificationType, PostId, UserId,
};
use storyline_store::{Batch, StoreError, StoreExt};
use tracing::{debug, warn};

use crate::deps::HandlerDeps;
use crate::error::{old_value, HandlerError};
use crate::push::PushMessage;

/// Name used in push bodies when the sender has no username.
const FALLBACK_NAME: &str = "Someone";

/// Subject and payload of a notification beyond sender and recipient.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub post: Option<PostId>,
    pub text: Option<String>,
    pub count: Option<u64>,
}

impl Payload {
    pub fn post(post: &PostId) -> Self {
        Self {
            post: Some(post.clone()),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Key for a notification of `kind`. `None` when the kind is about a post
/// and no post is given.
pub fn notification_key(
    kind: NotificationType,
    sender: &UserId,
    recipient: &UserId,
    post: Option<&PostId>,
) -> Option<NotificationKey> {
    match kind {
        NotificationType::Follow => Some(NotificationKey::follow(sender)),
        NotificationType::Comment
        | NotificationType::CommentAlso
        | NotificationType::CommentToSub => post.map(|p| NotificationKey::comment(p, recipient)),
        NotificationType::Mention => post.map(|p| NotificationKey::mention(p, recipient)),
        NotificationType::Like => post.map(NotificationKey::like),
    }
}

/// Build the keyed record. Self-notifications are suppressed (`None`).
pub fn build_notification(
    kind: NotificationType,
    sender: &UserId,
    recipient: &UserId,
    payload: Payload,
    timestamp: i64,
) -> Option<(NotificationKey, Notification)> {
    if sender == recipient {
        return None;
    }
    let key = notification_key(kind, sender, recipient, payload.post.as_ref())?;
    let record = Notification {
        kind,
        sender: sender.clone(),
        recipient: recipient.clone(),
        post: payload.post,
        text: payload.text,
        count: payload.count,
        timestamp,
    };
    Some((key, record))
}

/// Add the record, its unseen flag and its post index entry to `batch`.
pub fn stage(batch: &mut Batch, key: &NotificationKey, record: &Notification) -> Result<(), StoreError> {
    batch.set(&paths::notification(&record.recipient, key), record)?;
    batch.set(&paths::seen_flag(&record.recipient, key), &false)?;
    if let Some(post) = &record.post {
        batch.set(&paths::post_notification(post, &record.recipient, key), &true)?;
    }
    Ok(())
}

/// Add removal of a record, its flag and its index entry to `batch`.
pub fn unstage(batch: &mut Batch, recipient: &UserId, key: &NotificationKey, post: Option<&PostId>) {
    batch.remove(&paths::notification(recipient, key));
    batch.remove(&paths::seen_flag(recipient, key));
    if let Some(post) = post {
        batch.remove(&paths::post_notification(post, recipient, key));
    }
}

/// Human-readable body for a notification. Whether it is pushed at all is
/// decided by [`NotificationType::pushes`].
pub fn push_body(record: &Notification, sender_name: &str, text_limit: usize) -> String {
    let quoted = || trim_for_push(record.text.as_deref().unwrap_or_default(), text_limit);
    match record.kind {
        NotificationType::Follow => format!("{sender_name} started following you."),
        NotificationType::Comment => {
            format!("{sender_name} commented on your post: \"{}\"", quoted())
        }
        NotificationType::CommentAlso => match record.count {
            Some(n) if n > 1 => format!(
                "{sender_name} and {} others also commented: \"{}\"",
                n - 1,
                quoted()
            ),
            _ => format!("{sender_name} also commented: \"{}\"", quoted()),
        },
        NotificationType::CommentToSub => {
            format!("{sender_name} commented on a post you follow: \"{}\"", quoted())
        }
        NotificationType::Mention => {
            format!("{sender_name} mentioned you in a comment: \"{}\"", quoted())
        }
        NotificationType::Like => match record.count {
            Some(n) if n > 1 => format!("{sender_name} and {} others liked your post.", n - 1),
            _ => format!("{sender_name} liked your post."),
        },
    }
}

/// Username for push bodies. Runs after the commit, so a failed read falls
/// back to a neutral name instead of failing the handler.
pub async fn display_name(deps: &HandlerDeps, uid: &UserId) -> String {
    match deps.store.get(&paths::username(uid)).await {
        Ok(Some(name)) => name,
        Ok(None) => FALLBACK_NAME.to_string(),
        Err(e) => {
            warn!(%uid, error = %e, "Failed to read sender name");
            FALLBACK_NAME.to_string()
        }
    }
}

/// Push `message` to `recipient` if push is enabled globally and for the
/// recipient. Every failure is logged and swallowed. Returns whether a
/// message was handed to the channel successfully.
pub async fn deliver(deps: &HandlerDeps, recipient: &UserId, message: PushMessage) -> bool {
    if !deps.config.notifications.push_enabled {
        return false;
    }

    let enabled_path = paths::notifications_enabled(recipient);
    let token_path = paths::device_token(recipient);
    let lookup = tokio::try_join!(
        deps.store.get(&enabled_path),
        deps.store.get(&token_path),
    );
    let (enabled, token) = match lookup {
        Ok(found) => found,
        Err(e) => {
            warn!(recipient = %recipient, error = %e, "Failed to read push preferences");
            return false;
        }
    };

    if !enabled.unwrap_or(true) {
        debug!(recipient = %recipient, "Push disabled by recipient");
        return false;
    }
    let Some(token) = token else {
        debug!(recipient = %recipient, "No device token");
        return false;
    };

    match deps.push.send(&token, &message).await {
        Ok(()) => true,
        Err(e) => {
            warn!(recipient = %recipient, error = %e, "Push delivery failed");
            false
        }
    }
}

/// Deliver pushes for every staged notification whose type pushes.
pub async fn deliver_all(
    deps: &HandlerDeps,
    sender_name: &str,
    staged: &[(NotificationKey, Notification)],
) -> usize {
    let limit = deps.config.notifications.text_limit;
    let sends = staged
        .iter()
        .filter(|(_, record)| record.kind.pushes())
        .map(|(_, record)| {
            let body = push_body(record, sender_name, limit);
            deliver(deps, &record.recipient, PushMessage::body(body))
        });
    join_all(sends).await.into_iter().filter(|sent| *sent).count()
}

/// `notifications/{recipient}/{key}` removed: drop the unseen flag and the
/// post index entry.
pub async fn on_notification_removed(
    deps: &HandlerDeps,
    event: &storyline_store::MutationEvent,
    recipient: &UserId,
    key: &NotificationKey,
) -> Result<(), HandlerError> {
    if !event.is_removal() {
        return Ok(());
    }
    let previous: Option<Notification> = old_value(event)?;

    let mut batch = Batch::new();
    batch.remove(&paths::seen_flag(recipient, key));
    if let Some(post) = previous.and_then(|n| n.post) {
        batch.remove(&paths::post_notification(&post, recipient, key));
    }
    deps.commit("notification_removed", batch).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use storyline_store::MemoryStore;

    use super::*;
    use crate::push::RecordingPush;

    fn record(kind: NotificationType, text: Option<&str>, count: Option<u64>) -> Notification {
        Notification {
            kind,
            sender: "s".into(),
            recipient: "r".into(),
            post: Some("p1".into()),
            text: text.map(String::from),
            count,
            timestamp: 0,
        }
    }

    #[test]
    fn self_notifications_are_suppressed() {
        let me = UserId::from("me");
        assert!(build_notification(NotificationType::Follow, &me, &me, Payload::default(), 1).is_none());
    }

    #[test]
    fn repeated_follow_builds_same_key() {
        let a = UserId::from("a");
        let b = UserId::from("b");
        let (k1, _) = build_notification(NotificationType::Follow, &a, &b, Payload::default(), 1).unwrap();
        let (k2, r2) = build_notification(NotificationType::Follow, &a, &b, Payload::default(), 2).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str(), "follow:a");
        assert_eq!(r2.timestamp, 2);
    }

    #[test]
    fn comment_family_shares_one_key_per_recipient() {
        let post = PostId::from("p1");
        let s = UserId::from("s");
        let r = UserId::from("r");
        let keys: Vec<_> = [
            NotificationType::Comment,
            NotificationType::CommentAlso,
            NotificationType::CommentToSub,
        ]
        .into_iter()
        .map(|kind| notification_key(kind, &s, &r, Some(&post)).unwrap())
        .collect();
        assert!(keys.iter().all(|k| k.as_str() == "comment:p1:r"));
    }

    #[test]
    fn post_kinds_need_a_post() {
        let s = UserId::from("s");
        let r = UserId::from("r");
        assert!(notification_key(NotificationType::Like, &s, &r, None).is_none());
        assert!(notification_key(NotificationType::Mention, &s, &r, None).is_none());
    }

    #[test]
    fn push_bodies() {
        assert_eq!(
            push_body(&record(NotificationType::Follow, None, None), "ada", 32),
            "ada started following you."
        );
        assert_eq!(
            push_body(&record(NotificationType::Comment, Some("nice"), None), "ada", 32),
            "ada commented on your post: \"nice\""
        );
        assert_eq!(
            push_body(&record(NotificationType::CommentAlso, Some("x"), Some(3)), "ada", 32),
            "ada and 2 others also commented: \"x\""
        );
        assert_eq!(
            push_body(&record(NotificationType::Like, None, Some(4)), "ada", 32),
            "ada and 3 others liked your post."
        );
    }

    #[test]
    fn push_body_trims_quoted_text() {
        let long = "x".repeat(50);
        let body = push_body(&record(NotificationType::Mention, Some(&long), None), "ada", 10);
        assert_eq!(body, "ada mentioned you in a comment: \"xxxxxxx...\"");
    }

    #[tokio::test]
    async fn deliver_all_skips_types_that_never_push() {
        let push = Arc::new(RecordingPush::new());
        let deps = HandlerDeps::builder()
            .store(Arc::new(MemoryStore::from_value(json!({
                "users": { "tokens": { "r": "tok-r" } }
            }))))
            .push(push.clone())
            .build();
        let staged: Vec<_> = [
            (NotificationType::Like, Payload::post(&"p1".into()).with_count(2)),
            (NotificationType::Mention, Payload::post(&"p1".into()).with_text("hi")),
        ]
        .into_iter()
        .filter_map(|(kind, payload)| build_notification(kind, &"s".into(), &"r".into(), payload, 1))
        .collect();
        assert_eq!(staged.len(), 2);

        assert_eq!(deliver_all(&deps, "ada", &staged).await, 1);
        assert_eq!(push.bodies(), vec!["ada mentioned you in a comment: \"hi\""]);
    }

    #[test]
    fn stage_indexes_post_notifications() {
        let (key, rec) = build_notification(
            NotificationType::Comment,
            &"s".into(),
            &"r".into(),
            Payload::post(&"p1".into()).with_text("hi"),
            5,
        )
        .unwrap();
        let mut batch = Batch::new();
        stage(&mut batch, &key, &rec).unwrap();

        let paths: Vec<String> = batch.paths().map(|p| p.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "notifications/r/comment:p1:r",
                "uploads/notifications/p1/r/comment:p1:r",
                "users/notifications/r/comment:p1:r",
            ]
        );
    }
}
