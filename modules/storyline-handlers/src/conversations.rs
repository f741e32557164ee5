//! Direct-message conversations.
//!
//! A conversation's meta holds each participant's last-seen time and the
//! latest message. It is mirrored leaf by leaf into both participants'
//! conversation lists, so the `blocked` flag kept there by the block handler
//! is never overwritten.

use storyline_common::{paths, ConversationKey, ConversationMeta, Message, UserId};
use storyline_store::{Batch, MutationEvent, StoreError, StoreExt};
use tracing::{debug, info};

use crate::deps::HandlerDeps;
use crate::error::{new_value, HandlerError};
use crate::notifications;
use crate::push::PushMessage;

/// Writes bringing a meta up to date. A participant with no last-seen is
/// initialised to 0 and nothing is mirrored yet; the initialisation comes
/// back as another meta change.
pub fn meta_batch(key: &ConversationKey, meta: &ConversationMeta) -> Result<Batch, StoreError> {
    let (a, b) = key.participants();
    let mut batch = Batch::new();

    let missing: Vec<&UserId> = [a, b]
        .into_iter()
        .filter(|uid| meta.last_seen(uid).is_none())
        .collect();
    if !missing.is_empty() {
        for uid in missing {
            batch.set(&paths::conversation_last_seen(key, uid), &0)?;
        }
        return Ok(batch);
    }

    let Some(latest) = meta.latest else {
        return Ok(batch);
    };
    let text = meta.text.clone().unwrap_or_default();
    for (uid, peer) in [(a, b), (b, a)] {
        let seen = meta.last_seen(uid).is_some_and(|t| t >= latest);
        batch.set(&paths::mirror_seen(uid, peer), &seen)?;
        batch.set(&paths::mirror_latest(uid, peer), &latest)?;
        batch.set(&paths::mirror_text(uid, peer), &text)?;
    }
    Ok(batch)
}

/// `conversations/{conversation}/meta` changed.
pub async fn on_meta(
    deps: &HandlerDeps,
    event: &MutationEvent,
    key: &ConversationKey,
) -> Result<(), HandlerError> {
    let Some(meta) = new_value::<ConversationMeta>(event)? else {
        debug!(conversation = %key, "Conversation meta removed");
        return Ok(());
    };

    let batch = meta_batch(key, &meta)?;
    if batch.is_empty() {
        return Ok(());
    }
    let paths_written = deps.commit("conversation_meta", batch).await?;
    info!(conversation = %key, paths = paths_written, "Conversation meta mirrored");
    Ok(())
}

/// `conversations/{conversation}/messages/{message}` created.
pub async fn on_message(
    deps: &HandlerDeps,
    event: &MutationEvent,
    key: &ConversationKey,
) -> Result<(), HandlerError> {
    if !event.is_creation() {
        return Ok(());
    }
    let Some(message) = new_value::<Message>(event)? else {
        return Ok(());
    };
    let Some(timestamp) = message.timestamp else {
        debug!(conversation = %key, "Message without timestamp, skipping");
        return Ok(());
    };
    let sender = &message.sender_id;
    let recipient = key
        .peer_of(sender)
        .ok_or_else(|| HandlerError::malformed(&event.path, "sender is not a participant"))?
        .clone();

    let mut batch = Batch::new();
    batch.set(&paths::conversation_last_seen(key, sender), &timestamp)?;
    batch.set(&paths::conversation_latest(key), &timestamp)?;
    batch.set(&paths::conversation_text(key), &message.text)?;
    deps.commit("message_created", batch).await?;

    let blocked_path = paths::mirror_blocked(&recipient, sender);
    let (blocked, name) = tokio::join!(
        deps.store.get(&blocked_path),
        notifications::display_name(deps, sender),
    );
    if blocked?.unwrap_or(false) {
        debug!(conversation = %key, "Conversation blocked, no push");
        return Ok(());
    }

    let body = format!("{name}: {}", message.text);
    let pushed = notifications::deliver(deps, &recipient, PushMessage::body(body)).await;
    info!(conversation = %key, %sender, %recipient, pushed, "Message propagated");
    Ok(())
}
