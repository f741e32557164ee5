//! Comments: stats, subscriptions, and the comment and mention notifications.
//!
//! Every subscriber of a post (and its author) hears about a new comment,
//! worded by their relation to the thread. A subscriber who commented before
//! gets `COMMENT_ALSO` with the number of distinct people who commented
//! after them; one who never commented gets `COMMENT_TO_SUB`; the author
//! gets `COMMENT`. The commenter never hears about their own comment.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use storyline_common::{
    extract_mentions, paths, Comment, CommentId, Notification, NotificationKey, NotificationType,
    PostId, UserId,
};
use storyline_store::{MutationEvent, StoreExt};
use tracing::{debug, info, warn};

use crate::aggregates;
use crate::deps::HandlerDeps;
use crate::error::{new_value, HandlerError};
use crate::notifications::{self, Payload};

/// How one recipient relates to a new comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Author,
    /// Commented earlier; carries the distinct commenters since their last
    /// comment, the new one included.
    PriorCommenter(u64),
    Subscriber,
}

impl Relation {
    pub fn kind(self) -> NotificationType {
        match self {
            Relation::Author => NotificationType::Comment,
            Relation::PriorCommenter(_) => NotificationType::CommentAlso,
            Relation::Subscriber => NotificationType::CommentToSub,
        }
    }

    pub fn count(self) -> Option<u64> {
        match self {
            Relation::PriorCommenter(n) => Some(n),
            _ => None,
        }
    }
}

/// Classify everyone to notify about `comment_id` by `sender`.
///
/// "Before" orders comments by timestamp, then by id. `comments` must
/// contain the new comment.
pub fn classify(
    author: &UserId,
    sender: &UserId,
    comment_id: &CommentId,
    comments: &BTreeMap<CommentId, Comment>,
    subscribers: &BTreeSet<UserId>,
) -> BTreeMap<UserId, Relation> {
    let Some(current) = comments.get(comment_id) else {
        return BTreeMap::new();
    };
    let cutoff = (current.timestamp, comment_id.as_str());

    let mut earlier: Vec<(i64, &str, &UserId)> = comments
        .iter()
        .filter(|(id, c)| (c.timestamp, id.as_str()) < cutoff)
        .map(|(id, c)| (c.timestamp, id.as_str(), &c.author))
        .collect();
    earlier.sort();

    subscribers
        .iter()
        .chain(std::iter::once(author))
        .filter(|uid| *uid != sender)
        .map(|uid| {
            if uid == author {
                return (uid.clone(), Relation::Author);
            }
            let last = earlier.iter().rposition(|(_, _, a)| *a == uid);
            let relation = match last {
                Some(at) => {
                    let since: BTreeSet<&UserId> = earlier[at + 1..]
                        .iter()
                        .map(|(_, _, a)| *a)
                        .chain(std::iter::once(sender))
                        .filter(|a| *a != uid)
                        .collect();
                    Relation::PriorCommenter(since.len() as u64)
                }
                None => Relation::Subscriber,
            };
            (uid.clone(), relation)
        })
        .collect()
}

/// Resolve `@name` mentions to user ids. Names that do not resolve are
/// dropped.
pub async fn resolve_mentions(deps: &HandlerDeps, text: &str) -> BTreeSet<UserId> {
    let names = extract_mentions(text);
    let lookups = names.iter().map(|name| async move {
        match deps.store.get(&paths::username_lookup(name)).await {
            Ok(Some(uid)) => Some(uid),
            Ok(None) => {
                debug!(name = %name, "Mention does not resolve to a user");
                None
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to resolve mention");
                None
            }
        }
    });
    join_all(lookups).await.into_iter().flatten().collect()
}

/// `uploads/comments/{post}/{comment}` changed.
pub async fn on_comment(
    deps: &HandlerDeps,
    event: &MutationEvent,
    id: &PostId,
    comment_id: &CommentId,
) -> Result<(), HandlerError> {
    let mut children = aggregates::read_post(deps, id).await?;
    let now = deps.clock.now();

    let created = if event.is_creation() {
        new_value::<Comment>(event)?
    } else {
        None
    };
    if let Some(comment) = &created {
        // The read may predate the write that triggered us.
        children.comments.insert(comment_id.clone(), comment.clone());
    }

    let mut batch =
        aggregates::stats_batch(id, &children, now, deps.config.aggregates.live_window())?;

    let (Some(comment), Some(post)) = (&created, &children.meta) else {
        let paths_written = deps.commit("comment_changed", batch).await?;
        info!(post = %id, comment = %comment_id, paths = paths_written, "Comment stats recomputed");
        return Ok(());
    };

    let subscribers_path = paths::subscribers(id);
    let (subscribers, mentioned) = tokio::join!(
        deps.store.get_entries(&subscribers_path),
        resolve_mentions(deps, &comment.text),
    );
    let subscribers: BTreeSet<UserId> = subscribers?.into_keys().collect();

    let staged = comment_notifications(
        id,
        &children.comments,
        &post.author,
        comment_id,
        comment,
        &subscribers,
        &mentioned,
        now.timestamp_millis(),
    );
    for (key, record) in &staged {
        notifications::stage(&mut batch, key, record)?;
    }
    batch.set(&paths::subscriber(id, &comment.author), &true)?;

    let paths_written = deps.commit("comment_created", batch).await?;
    info!(
        post = %id,
        sender = %comment.author,
        notified = staged.len(),
        paths = paths_written,
        "Comment propagated"
    );

    let name = notifications::display_name(deps, &comment.author).await;
    let pushed = notifications::deliver_all(deps, &name, &staged).await;
    debug!(post = %id, pushed, "Comment pushes delivered");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn comment_notifications(
    post: &PostId,
    comments: &BTreeMap<CommentId, Comment>,
    author: &UserId,
    comment_id: &CommentId,
    comment: &Comment,
    subscribers: &BTreeSet<UserId>,
    mentioned: &BTreeSet<UserId>,
    timestamp: i64,
) -> Vec<(NotificationKey, Notification)> {
    let sender = &comment.author;
    let relations = classify(author, sender, comment_id, comments, subscribers);

    let by_relation = relations.into_iter().filter_map(|(recipient, relation)| {
        let mut payload = Payload::post(post).with_text(&comment.text);
        if let Some(count) = relation.count() {
            payload = payload.with_count(count);
        }
        notifications::build_notification(relation.kind(), sender, &recipient, payload, timestamp)
    });
    let by_mention = mentioned.iter().filter_map(|recipient| {
        notifications::build_notification(
            NotificationType::Mention,
            sender,
            recipient,
            Payload::post(post).with_text(&comment.text),
            timestamp,
        )
    });
    by_relation.chain(by_mention).collect()
}
