//! Per-post counters, recomputed from the full child collections on every
//! change.
//!
//! While a post is live its raw viewer and participant sets are mirrored
//! under its author's and its place's statistics, which feed popularity.
//! Outside the window, or once the post is gone, the mirrors are removed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use storyline_common::{
    paths, Comment, CommentId, NotificationKey, NotificationType, Post, PostAggregate, PostId,
    PostStats, UserId,
};
use storyline_store::{Batch, MutationEvent, StoreError, StoreExt};
use tracing::info;

use crate::deps::HandlerDeps;
use crate::error::HandlerError;
use crate::notifications::{self, Payload};

/// Everything counted for one post, as currently observed.
#[derive(Debug, Clone, Default)]
pub struct PostChildren {
    pub meta: Option<Post>,
    pub views: BTreeMap<UserId, i64>,
    pub likes: BTreeMap<UserId, i64>,
    pub comments: BTreeMap<CommentId, Comment>,
}

impl PostChildren {
    pub fn participants(&self) -> BTreeSet<UserId> {
        self.comments.values().map(|c| c.author.clone()).collect()
    }

    pub fn stats(&self) -> PostStats {
        PostStats {
            views: self.views.len() as u64,
            likes: self.likes.len() as u64,
            comments: self.comments.len() as u64,
            participants: self.participants().len() as u64,
        }
    }

    pub fn aggregate(&self) -> PostAggregate {
        PostAggregate {
            viewers: self.views.keys().cloned().collect(),
            participants: self.participants(),
        }
    }
}

pub async fn read_post(deps: &HandlerDeps, id: &PostId) -> Result<PostChildren, StoreError> {
    let meta_path = paths::post_meta(id);
    let views_path = paths::views(id);
    let likes_path = paths::likes(id);
    let comments_path = paths::comments(id);
    let (meta, views, likes, comments) = tokio::try_join!(
        deps.store.get(&meta_path),
        deps.store.get_entries(&views_path),
        deps.store.get_entries(&likes_path),
        deps.store.get_entries(&comments_path),
    )?;
    Ok(PostChildren {
        meta,
        views,
        likes,
        comments,
    })
}

/// Stats and mirror writes for the observed children. A pure function of
/// its inputs.
pub fn stats_batch(
    id: &PostId,
    children: &PostChildren,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<Batch, StoreError> {
    let mut batch = Batch::new();
    let Some(post) = &children.meta else {
        batch.remove(&paths::post_stats(id));
        return Ok(batch);
    };

    batch.set(&paths::post_stats(id), &children.stats())?;

    let story = paths::story_aggregate(&post.author, id);
    let place = post.place_id.as_ref().map(|p| paths::place_aggregate(p, id));
    if post.is_live(now, window) {
        let aggregate = children.aggregate();
        batch.set(&story, &aggregate)?;
        if let Some(place) = &place {
            batch.set(place, &aggregate)?;
        }
    } else {
        batch.remove(&story);
        if let Some(place) = &place {
            batch.remove(place);
        }
    }
    Ok(batch)
}

/// Read the post and build its stats batch.
pub async fn post_batch(deps: &HandlerDeps, id: &PostId) -> Result<Batch, StoreError> {
    let children = read_post(deps, id).await?;
    stats_batch(
        id,
        &children,
        deps.clock.now(),
        deps.config.aggregates.live_window(),
    )
}

/// `uploads/views/{post}/{uid}` changed.
pub async fn on_view(deps: &HandlerDeps, id: &PostId) -> Result<(), HandlerError> {
    let batch = post_batch(deps, id).await?;
    let paths_written = deps.commit("view_changed", batch).await?;
    info!(post = %id, paths = paths_written, "Post stats recomputed");
    Ok(())
}

/// `uploads/likes/{post}/{uid}` changed. Recomputes stats and the post
/// author's aggregated LIKE notification.
pub async fn on_like(
    deps: &HandlerDeps,
    event: &MutationEvent,
    id: &PostId,
) -> Result<(), HandlerError> {
    let children = read_post(deps, id).await?;
    let now = deps.clock.now();
    let mut batch = stats_batch(id, &children, now, deps.config.aggregates.live_window())?;

    if let Some(post) = &children.meta {
        let author = &post.author;
        let likers: BTreeMap<&UserId, i64> = children
            .likes
            .iter()
            .filter(|(uid, _)| *uid != author)
            .map(|(uid, ts)| (uid, *ts))
            .collect();
        let latest = likers
            .iter()
            .max_by_key(|(uid, ts)| (**ts, **uid))
            .map(|(uid, _)| (*uid).clone());

        match latest {
            None => notifications::unstage(&mut batch, author, &NotificationKey::like(id), Some(id)),
            Some(sender) => {
                let payload = Payload::post(id).with_count(likers.len() as u64);
                if let Some((key, record)) = notifications::build_notification(
                    NotificationType::Like,
                    &sender,
                    author,
                    payload,
                    now.timestamp_millis(),
                ) {
                    if event.is_creation() {
                        notifications::stage(&mut batch, &key, &record)?;
                    } else {
                        // A like went away: update the count, leave seen state alone.
                        batch.set(&paths::notification(author, &key), &record)?;
                        batch.set(&paths::post_notification(id, author, &key), &true)?;
                    }
                }
            }
        }
    }

    let paths_written = deps.commit("like_changed", batch).await?;
    info!(post = %id, likes = children.likes.len(), paths = paths_written, "Likes recomputed");
    Ok(())
}
