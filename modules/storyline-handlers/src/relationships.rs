//! Follow and block edges and the invariants between them.
//!
//! Counts are recomputed from the observed edge sets on every delivery, never
//! incremented, so duplicate deliveries converge. A block removes follows in
//! both directions; a follow clears blocks in both directions.

use std::collections::{BTreeMap, BTreeSet};

use storyline_common::{paths, NotificationType, UserId};
use storyline_store::{Batch, StoreError, StoreExt};
use tracing::{debug, info};

use crate::deps::HandlerDeps;
use crate::error::HandlerError;
use crate::notifications::{self, Payload};
use crate::proximity;

/// Users `uid` has blocked plus users who blocked `uid`. Content authored by
/// any of them is hidden from `uid`, and `uid`'s content from them.
pub async fn block_set(deps: &HandlerDeps, uid: &UserId) -> Result<BTreeSet<UserId>, StoreError> {
    let blocked_path = paths::blocked(uid);
    let blocked_by_path = paths::blocked_by(uid);
    let (blocked, blocked_by) = tokio::try_join!(
        deps.store.get_entries(&blocked_path),
        deps.store.get_entries(&blocked_by_path),
    )?;
    Ok(blocked.into_keys().chain(blocked_by.into_keys()).collect())
}

/// Child count of an observed edge set, corrected for the edge this
/// delivery is about. The read may predate or follow that edge's write.
fn count_with(edges: BTreeMap<UserId, bool>, edge: &UserId, present: bool) -> u64 {
    let mut keys: BTreeSet<UserId> = edges.into_keys().collect();
    if present {
        keys.insert(edge.clone());
    } else {
        keys.remove(edge);
    }
    keys.len() as u64
}

/// `social/followers/{followed}/{follower}` changed.
pub async fn on_follow_edge(
    deps: &HandlerDeps,
    followed: &UserId,
    follower: &UserId,
    created: bool,
) -> Result<(), HandlerError> {
    let followers_path = paths::followers(followed);
    let following_path = paths::following(follower);
    let story_path = paths::story(followed);
    let (followers, following, story) = tokio::try_join!(
        deps.store.get_entries(&followers_path),
        deps.store.get_entries(&following_path),
        deps.store.get_entries(&story_path),
    )?;

    let mut batch = Batch::new();
    batch.set(
        &paths::follower_count(followed),
        &count_with(followers, follower, created),
    )?;
    batch.set(
        &paths::following_count(follower),
        &count_with(following, followed, created),
    )?;

    if !created {
        batch.remove(&paths::following_edge(follower, followed));
        batch.remove(&paths::following_feed(follower, followed));
        let paths_written = deps.commit("follow_removed", batch).await?;
        info!(%follower, %followed, paths = paths_written, "Unfollow propagated");
        return Ok(());
    }

    batch.set(&paths::following_edge(follower, followed), &true)?;

    // A follow implicitly unblocks, in both directions.
    batch.remove(&paths::block_edge(follower, followed));
    batch.remove(&paths::block_edge(followed, follower));
    batch.remove(&paths::blocked_by_edge(followed, follower));
    batch.remove(&paths::blocked_by_edge(follower, followed));

    // Seed the follower's feed with what the followed user has posted so far.
    for (post, entry) in story {
        batch.set(&paths::following_feed_entry(follower, followed, &post), &entry)?;
    }

    let staged: Vec<_> = notifications::build_notification(
        NotificationType::Follow,
        follower,
        followed,
        Payload::default(),
        deps.now_millis(),
    )
    .into_iter()
    .collect();
    for (key, record) in &staged {
        notifications::stage(&mut batch, key, record)?;
    }

    let paths_written = deps.commit("follow_created", batch).await?;
    info!(%follower, %followed, paths = paths_written, "Follow propagated");

    if !staged.is_empty() {
        let name = notifications::display_name(deps, follower).await;
        notifications::deliver_all(deps, &name, &staged).await;
    }
    Ok(())
}

/// `social/blocked/{blocker}/{blocked}` changed.
pub async fn on_block_edge(
    deps: &HandlerDeps,
    blocker: &UserId,
    blocked: &UserId,
    created: bool,
) -> Result<(), HandlerError> {
    let mut batch = Batch::new();

    if created {
        batch.remove(&paths::follower_edge(blocked, blocker));
        batch.remove(&paths::follower_edge(blocker, blocked));
        batch.set(&paths::blocked_by_edge(blocked, blocker), &true)?;
        batch.set(&paths::mirror_blocked(blocker, blocked), &true)?;
        batch.set(&paths::mirror_blocked(blocked, blocker), &true)?;
    } else {
        batch.remove(&paths::blocked_by_edge(blocked, blocker));
        batch.remove(&paths::mirror_blocked(blocker, blocked));
        batch.remove(&paths::mirror_blocked(blocked, blocker));
    }

    let paths_written = deps.commit("block_changed", batch).await?;
    info!(%blocker, %blocked, created, paths = paths_written, "Block propagated");

    // The nearby feeds of both users are filtered by block state.
    for uid in [blocker, blocked] {
        let refreshed = proximity::refresh_nearby_feed(deps, uid).await?;
        if refreshed.is_empty() {
            debug!(%uid, "No nearby feed to refresh");
            continue;
        }
        deps.commit("nearby_feed_refresh", refreshed).await?;
    }
    Ok(())
}
