//! Story and place popularity summaries.

use std::collections::BTreeMap;

use storyline_common::scoring::summarize;
use storyline_common::{
    paths, PlaceId, PopularityCounts, PopularitySummary, PostAggregate, PostId, UserId,
};
use storyline_store::{Batch, StoreExt, TypedPath};
use tracing::info;

use crate::deps::HandlerDeps;
use crate::error::HandlerError;

/// Summary writes for the currently mirrored aggregates. No aggregates left
/// means no summary.
pub fn summary_batch(
    summary: &TypedPath<PopularitySummary>,
    aggregates: &BTreeMap<PostId, PostAggregate>,
    deps: &HandlerDeps,
) -> Result<Batch, HandlerError> {
    let mut batch = Batch::new();
    if aggregates.is_empty() {
        batch.remove(summary);
    } else {
        let counts = PopularityCounts::from_aggregates(aggregates.values());
        batch.set(summary, &summarize(counts, &deps.config.scoring))?;
    }
    Ok(batch)
}

async fn recompute(
    deps: &HandlerDeps,
    handler: &str,
    aggregates: TypedPath<BTreeMap<PostId, PostAggregate>>,
    summary: TypedPath<PopularitySummary>,
) -> Result<(), HandlerError> {
    let current = deps.store.get_entries(&aggregates).await?;
    let batch = summary_batch(&summary, &current, deps)?;
    deps.commit(handler, batch).await?;
    info!(summary = %summary, posts = current.len(), "Popularity recomputed");
    Ok(())
}

/// `stats/stories/{author}/posts/{post}` changed.
pub async fn on_story_aggregate(deps: &HandlerDeps, author: &UserId) -> Result<(), HandlerError> {
    recompute(
        deps,
        "story_popularity",
        paths::story_aggregates(author),
        paths::story_summary(author),
    )
    .await
}

/// `stats/places/{place}/posts/{post}` changed.
pub async fn on_place_aggregate(deps: &HandlerDeps, place: &PlaceId) -> Result<(), HandlerError> {
    recompute(
        deps,
        "place_popularity",
        paths::place_aggregates(place),
        paths::place_summary(place),
    )
    .await
}
