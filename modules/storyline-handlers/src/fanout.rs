//! Post fan-out: mirror a new post to every location that shows it, and
//! remove every mirror when the post is deleted.
//!
//! The audience is read as a snapshot (followers, and users near the post's
//! place) and the whole mirror set goes out as one batch. Edits to an
//! existing post do not fan out.

use std::collections::BTreeSet;

use storyline_common::{paths, PlacePost, Post, PostId, StoryEntry, UserId};
use storyline_store::{Batch, MutationEvent, StoreError, StoreExt};
use tracing::{debug, info};

use crate::aggregates;
use crate::deps::HandlerDeps;
use crate::error::{new_value, old_value, HandlerError};
use crate::relationships::block_set;

/// Everyone a post is mirrored to.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Audience {
    pub followers: BTreeSet<UserId>,
    /// Users near the post's place with their distance to it.
    pub nearby: Vec<(UserId, f64)>,
}

/// Snapshot-read the audience for a post by `post.author`.
///
/// Users in a block relationship with the author are left out of the nearby
/// audience; follow edges cannot coexist with blocks, so followers need no
/// filtering.
pub async fn audience(deps: &HandlerDeps, post: &Post) -> Result<Audience, StoreError> {
    let followers_path = paths::followers(&post.author);
    let Some(place) = &post.place_id else {
        let followers = deps.store.get_entries(&followers_path).await?;
        return Ok(Audience {
            followers: followers.into_keys().collect(),
            nearby: Vec::new(),
        });
    };

    let audience_path = paths::place_audience(place);
    let (followers, near, hidden) = tokio::try_join!(
        deps.store.get_entries(&followers_path),
        deps.store.get_entries(&audience_path),
        block_set(deps, &post.author),
    )?;

    Ok(Audience {
        followers: followers.into_keys().collect(),
        nearby: near
            .into_iter()
            .filter(|(uid, _)| !hidden.contains(uid))
            .collect(),
    })
}

/// Mirror writes for a post. With `present == false` every mirror is removed.
pub fn mirror_batch(
    id: &PostId,
    post: &Post,
    audience: &Audience,
    present: bool,
) -> Result<Batch, StoreError> {
    let mut batch = Batch::new();
    let entry = StoryEntry {
        timestamp: post.date_created,
        place: post.place_id.clone(),
    };

    let story = paths::story_entry(&post.author, id);
    if present {
        batch.set(&story, &entry)?;
    } else {
        batch.remove(&story);
    }

    for follower in &audience.followers {
        let path = paths::following_feed_entry(follower, &post.author, id);
        if present {
            batch.set(&path, &entry)?;
        } else {
            batch.remove(&path);
        }
    }

    if let Some(place) = &post.place_id {
        let mirrored = PlacePost {
            author: post.author.clone(),
            timestamp: post.date_created,
        };

        let place_post = paths::place_post(place, id);
        if present {
            batch.set(&place_post, &mirrored)?;
        } else {
            batch.remove(&place_post);
        }

        for (uid, distance) in &audience.nearby {
            let path = paths::nearby_feed_post(uid, place, id);
            if present {
                batch.set(&path, &mirrored)?;
                batch.set(&paths::nearby_bucket_distance(uid, place), distance)?;
            } else {
                batch.remove(&path);
            }
        }
    }

    Ok(batch)
}

/// `uploads/meta/{post}` changed.
pub async fn on_post_meta(
    deps: &HandlerDeps,
    event: &MutationEvent,
    id: &PostId,
) -> Result<(), HandlerError> {
    if event.is_update() {
        debug!(post = %id, "Post edited, no fan-out");
        return Ok(());
    }

    if let Some(post) = new_value::<Post>(event)? {
        return on_created(deps, id, &post).await;
    }
    match old_value::<Post>(event)? {
        Some(post) => on_deleted(deps, id, &post).await,
        None => Ok(()),
    }
}

async fn on_created(deps: &HandlerDeps, id: &PostId, post: &Post) -> Result<(), HandlerError> {
    let (audience, stats) = tokio::try_join!(
        audience(deps, post),
        aggregates::post_batch(deps, id),
    )?;

    let mut batch = mirror_batch(id, post, &audience, true)?;
    batch.merge(stats);
    batch.set(&paths::subscriber(id, &post.author), &true)?;

    let paths_written = deps.commit("post_created", batch).await?;
    info!(
        post = %id,
        author = %post.author,
        followers = audience.followers.len(),
        nearby = audience.nearby.len(),
        paths = paths_written,
        "Post fanned out"
    );
    Ok(())
}

async fn on_deleted(deps: &HandlerDeps, id: &PostId, post: &Post) -> Result<(), HandlerError> {
    let index_path = paths::post_notifications(id);
    let (audience, index) = tokio::try_join!(
        audience(deps, post),
        deps.store.get_entries(&index_path),
    )?;

    let mut batch = mirror_batch(id, post, &audience, false)?;

    // Notifications the post produced, wherever they live.
    let mut removed_notifications = 0;
    for (recipient, keys) in index {
        for key in keys.into_keys() {
            batch.remove(&paths::notification(&recipient, &key));
            batch.remove(&paths::seen_flag(&recipient, &key));
            removed_notifications += 1;
        }
    }
    batch.remove(&paths::post_notifications(id));

    // Children owned by the post.
    batch.remove(&paths::comments(id));
    batch.remove(&paths::views(id));
    batch.remove(&paths::likes(id));
    batch.remove(&paths::subscribers(id));

    batch.remove(&paths::post_stats(id));
    batch.remove(&paths::story_aggregate(&post.author, id));
    if let Some(place) = &post.place_id {
        batch.remove(&paths::place_aggregate(place, id));
    }

    let paths_written = deps.commit("post_deleted", batch).await?;
    info!(
        post = %id,
        author = %post.author,
        notifications = removed_notifications,
        paths = paths_written,
        "Post removed from every mirror"
    );
    Ok(())
}
