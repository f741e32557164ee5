//! Proximity index: which places and people are within a user's radius.
//!
//! Every location update recomputes the forward index from scratch against
//! all candidates, so duplicate or reordered updates converge. The reverse
//! index (`lookups/userplace`) is the read path for fan-out; it is updated by
//! diffing the forward index against its previous snapshot, touching only
//! the places whose membership or distance changed.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use storyline_common::{
    paths, LocationSample, NearbyBucket, PlaceId, PlaceInfo, PlacePost, PlaceRecord, PostId,
    UserId,
};
use storyline_store::{Batch, StoreError, StoreExt};
use tracing::info;

use crate::deps::HandlerDeps;
use crate::error::HandlerError;
use crate::relationships::block_set;

/// Places within `sample`'s radius, with distance in km.
pub fn places_within(
    sample: &LocationSample,
    places: &BTreeMap<PlaceId, PlaceRecord>,
) -> BTreeMap<PlaceId, f64> {
    places
        .iter()
        .filter_map(|(id, record)| {
            let info = record.info.as_ref()?;
            sample.reaches_place(info).map(|d| (id.clone(), d))
        })
        .collect()
}

/// Other users within `sample`'s radius, excluding `hidden`.
pub fn people_within(
    uid: &UserId,
    sample: &LocationSample,
    samples: &BTreeMap<UserId, LocationSample>,
    hidden: &BTreeSet<UserId>,
) -> BTreeMap<UserId, f64> {
    samples
        .iter()
        .filter(|(other, _)| *other != uid && !hidden.contains(*other))
        .filter_map(|(other, theirs)| sample.reaches_sample(theirs).map(|d| (other.clone(), d)))
        .collect()
}

/// The nearby feed for a set of nearby places. Every place gets a bucket,
/// posts by `hidden` authors are left out.
pub fn materialize_feed(
    nearby: &BTreeMap<PlaceId, f64>,
    posts: &BTreeMap<PlaceId, BTreeMap<PostId, PlacePost>>,
    hidden: &BTreeSet<UserId>,
) -> BTreeMap<PlaceId, NearbyBucket> {
    nearby
        .iter()
        .map(|(place, distance)| {
            let visible = posts
                .get(place)
                .into_iter()
                .flatten()
                .filter(|(_, post)| !hidden.contains(&post.author))
                .map(|(id, post)| (id.clone(), post.clone()))
                .collect();
            (
                place.clone(),
                NearbyBucket {
                    distance: *distance,
                    posts: visible,
                },
            )
        })
        .collect()
}

/// Reverse index writes for the places whose entry differs between snapshots.
pub fn reverse_index_diff(
    batch: &mut Batch,
    uid: &UserId,
    before: &BTreeMap<PlaceId, f64>,
    after: &BTreeMap<PlaceId, f64>,
) -> Result<usize, StoreError> {
    let mut touched = 0;
    for place in before.keys().filter(|p| !after.contains_key(*p)) {
        batch.remove(&paths::place_audience_entry(place, uid));
        touched += 1;
    }
    for (place, distance) in after {
        if before.get(place) != Some(distance) {
            batch.set(&paths::place_audience_entry(place, uid), distance)?;
            touched += 1;
        }
    }
    Ok(touched)
}

/// `users/location/coordinates/{uid}` changed.
pub async fn on_location(
    deps: &HandlerDeps,
    uid: &UserId,
    sample: Option<LocationSample>,
) -> Result<(), HandlerError> {
    let places_path = paths::places();
    let samples_path = paths::all_coordinates();
    let before_path = paths::nearby_places(uid);
    let (places, samples, before) = tokio::try_join!(
        deps.store.get_entries(&places_path),
        deps.store.get_entries(&samples_path),
        deps.store.get_entries(&before_path),
    )?;

    let Some(sample) = sample else {
        let batch = removal_batch(uid, &before, &samples);
        let paths_written = deps.commit("location_removed", batch).await?;
        info!(%uid, paths = paths_written, "Location removed");
        return Ok(());
    };

    let hidden = block_set(deps, uid).await?;
    let nearby = places_within(&sample, &places);
    let posts: BTreeMap<PlaceId, BTreeMap<PostId, PlacePost>> = nearby
        .keys()
        .filter_map(|id| places.get(id).map(|r| (id.clone(), r.posts.clone())))
        .collect();

    let mut batch = Batch::new();
    batch.set(&paths::nearby_places(uid), &nearby)?;
    let reverse = reverse_index_diff(&mut batch, uid, &before, &nearby)?;
    batch.set(&paths::nearby_feed(uid), &materialize_feed(&nearby, &posts, &hidden))?;

    batch.set(
        &paths::nearby_people(uid),
        &people_within(uid, &sample, &samples, &hidden),
    )?;
    for (other, theirs) in samples.iter().filter(|(other, _)| *other != uid) {
        let entry = paths::nearby_person(other, uid);
        match theirs.reaches_sample(&sample) {
            Some(d) if !hidden.contains(other) => batch.set(&entry, &d)?,
            _ => batch.remove(&entry),
        }
    }

    let paths_written = deps.commit("location_changed", batch).await?;
    info!(
        %uid,
        places = nearby.len(),
        reverse_changes = reverse,
        paths = paths_written,
        "Proximity recomputed"
    );
    Ok(())
}

fn removal_batch(
    uid: &UserId,
    before: &BTreeMap<PlaceId, f64>,
    samples: &BTreeMap<UserId, LocationSample>,
) -> Batch {
    let mut batch = Batch::new();
    batch.remove(&paths::nearby_places(uid));
    for place in before.keys() {
        batch.remove(&paths::place_audience_entry(place, uid));
    }
    batch.remove(&paths::nearby_feed(uid));
    batch.remove(&paths::nearby_people(uid));
    for other in samples.keys().filter(|other| *other != uid) {
        batch.remove(&paths::nearby_person(other, uid));
    }
    batch
}

/// `places/{place}/info` first created: index the place for every user in range.
pub async fn on_place_created(
    deps: &HandlerDeps,
    place: &PlaceId,
    info: &PlaceInfo,
) -> Result<(), HandlerError> {
    let samples_path = paths::all_coordinates();
    let samples = deps.store.get_entries(&samples_path).await?;

    let mut batch = Batch::new();
    let mut reached = 0;
    for (uid, sample) in &samples {
        if let Some(d) = sample.reaches_place(info) {
            batch.set(&paths::nearby_place(uid, place), &d)?;
            batch.set(&paths::place_audience_entry(place, uid), &d)?;
            batch.set(&paths::nearby_bucket_distance(uid, place), &d)?;
            reached += 1;
        }
    }

    let paths_written = deps.commit("place_created", batch).await?;
    info!(%place, users = reached, paths = paths_written, "New place announced");
    Ok(())
}

/// Rebuild `uid`'s nearby feed from the current forward index, place posts
/// and block state. Empty when the user has no nearby places.
pub async fn refresh_nearby_feed(deps: &HandlerDeps, uid: &UserId) -> Result<Batch, HandlerError> {
    let nearby_path = paths::nearby_places(uid);
    let nearby = deps.store.get_entries(&nearby_path).await?;
    if nearby.is_empty() {
        return Ok(Batch::new());
    }

    let post_paths: Vec<_> = nearby.keys().map(paths::place_posts).collect();
    let reads = try_join_all(post_paths.iter().map(|p| deps.store.get_entries(p)));
    let (found, hidden) = tokio::try_join!(reads, block_set(deps, uid))?;

    let posts: BTreeMap<PlaceId, BTreeMap<PostId, PlacePost>> = nearby
        .keys()
        .cloned()
        .zip(found)
        .filter(|(_, posts)| !posts.is_empty())
        .collect();

    let mut batch = Batch::new();
    batch.set(&paths::nearby_feed(uid), &materialize_feed(&nearby, &posts, &hidden))?;
    Ok(batch)
}
