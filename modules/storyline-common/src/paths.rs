//! Typed path builders for every source and derived location.
//!
//! Each builder returns a [`TypedPath`] fixing the record stored there, so a
//! handler cannot write a `StoryEntry` where a `PlacePost` belongs. Trigger
//! patterns for the same locations live in [`patterns`].

use std::collections::BTreeMap;

use storyline_store::{StorePath, TypedPath};

use crate::types::{
    Comment, CommentId, ConversationKey, ConversationMeta, LocationSample, Message, MessageId,
    NearbyBucket, Notification, NotificationKey, PlaceId, PlaceInfo, PlacePost, PlaceRecord,
    PopularitySummary, Post, PostAggregate, PostId, PostStats, StoryEntry, UserId,
};

fn at<T>(segments: &[&dyn std::fmt::Display]) -> TypedPath<T> {
    TypedPath::new(StorePath::from_segments(
        segments.iter().map(|s| s.to_string()),
    ))
}

/// Watch patterns, one per trigger. Captures are named after the ids they bind.
pub mod patterns {
    pub const FOLLOW_EDGE: &str = "social/followers/{followed}/{follower}";
    pub const BLOCK_EDGE: &str = "social/blocked/{blocker}/{blocked}";
    pub const LOCATION: &str = "users/location/coordinates/{uid}";
    pub const PLACE_INFO: &str = "places/{place}/info";
    pub const POST_META: &str = "uploads/meta/{post}";
    pub const POST_VIEW: &str = "uploads/views/{post}/{uid}";
    pub const POST_LIKE: &str = "uploads/likes/{post}/{uid}";
    pub const POST_COMMENT: &str = "uploads/comments/{post}/{comment}";
    pub const STORY_AGGREGATE: &str = "stats/stories/{author}/posts/{post}";
    pub const PLACE_AGGREGATE: &str = "stats/places/{place}/posts/{post}";
    pub const NOTIFICATION: &str = "notifications/{recipient}/{key}";
    pub const CONVERSATION_META: &str = "conversations/{conversation}/meta";
    pub const CONVERSATION_MESSAGE: &str = "conversations/{conversation}/messages/{message}";
}

// --- Social graph ---

pub fn followers(followed: &UserId) -> TypedPath<BTreeMap<UserId, bool>> {
    at(&[&"social", &"followers", followed])
}

pub fn follower_edge(followed: &UserId, follower: &UserId) -> TypedPath<bool> {
    at(&[&"social", &"followers", followed, follower])
}

pub fn following(follower: &UserId) -> TypedPath<BTreeMap<UserId, bool>> {
    at(&[&"social", &"following", follower])
}

pub fn following_edge(follower: &UserId, followed: &UserId) -> TypedPath<bool> {
    at(&[&"social", &"following", follower, followed])
}

pub fn blocked(blocker: &UserId) -> TypedPath<BTreeMap<UserId, bool>> {
    at(&[&"social", &"blocked", blocker])
}

pub fn block_edge(blocker: &UserId, blocked: &UserId) -> TypedPath<bool> {
    at(&[&"social", &"blocked", blocker, blocked])
}

pub fn blocked_by(blocked: &UserId) -> TypedPath<BTreeMap<UserId, bool>> {
    at(&[&"social", &"blockedBy", blocked])
}

pub fn blocked_by_edge(blocked: &UserId, blocker: &UserId) -> TypedPath<bool> {
    at(&[&"social", &"blockedBy", blocked, blocker])
}

// --- Profile and settings ---

pub fn username(uid: &UserId) -> TypedPath<String> {
    at(&[&"users", &"profile", uid, &"username"])
}

pub fn follower_count(uid: &UserId) -> TypedPath<u64> {
    at(&[&"users", &"profile", uid, &"followers"])
}

pub fn following_count(uid: &UserId) -> TypedPath<u64> {
    at(&[&"users", &"profile", uid, &"following"])
}

pub fn username_lookup(name: &str) -> TypedPath<UserId> {
    at(&[&"users", &"lookup", &"username", &name])
}

pub fn device_token(uid: &UserId) -> TypedPath<String> {
    at(&[&"users", &"tokens", uid])
}

pub fn notifications_enabled(uid: &UserId) -> TypedPath<bool> {
    at(&[&"users", &"settings", uid, &"notifications"])
}

// --- Stories and feeds ---

pub fn story(author: &UserId) -> TypedPath<BTreeMap<PostId, StoryEntry>> {
    at(&[&"users", &"story", author])
}

pub fn story_entry(author: &UserId, post: &PostId) -> TypedPath<StoryEntry> {
    at(&[&"users", &"story", author, post])
}

pub fn following_feed(follower: &UserId, author: &UserId) -> TypedPath<BTreeMap<PostId, StoryEntry>> {
    at(&[&"users", &"feed", &"following", follower, author])
}

pub fn following_feed_entry(follower: &UserId, author: &UserId, post: &PostId) -> TypedPath<StoryEntry> {
    at(&[&"users", &"feed", &"following", follower, author, post])
}

pub fn nearby_feed(uid: &UserId) -> TypedPath<BTreeMap<PlaceId, NearbyBucket>> {
    at(&[&"users", &"feed", &"nearby", uid])
}

pub fn nearby_bucket(uid: &UserId, place: &PlaceId) -> TypedPath<NearbyBucket> {
    at(&[&"users", &"feed", &"nearby", uid, place])
}

pub fn nearby_bucket_distance(uid: &UserId, place: &PlaceId) -> TypedPath<f64> {
    at(&[&"users", &"feed", &"nearby", uid, place, &"distance"])
}

pub fn nearby_feed_post(uid: &UserId, place: &PlaceId, post: &PostId) -> TypedPath<PlacePost> {
    at(&[&"users", &"feed", &"nearby", uid, place, &"posts", post])
}

// --- Places and proximity ---

pub fn places() -> TypedPath<BTreeMap<PlaceId, PlaceRecord>> {
    at(&[&"places"])
}

pub fn place_info(place: &PlaceId) -> TypedPath<PlaceInfo> {
    at(&[&"places", place, &"info"])
}

pub fn place_posts(place: &PlaceId) -> TypedPath<BTreeMap<PostId, PlacePost>> {
    at(&[&"places", place, &"posts"])
}

pub fn place_post(place: &PlaceId, post: &PostId) -> TypedPath<PlacePost> {
    at(&[&"places", place, &"posts", post])
}

pub fn all_coordinates() -> TypedPath<BTreeMap<UserId, LocationSample>> {
    at(&[&"users", &"location", &"coordinates"])
}

pub fn coordinates(uid: &UserId) -> TypedPath<LocationSample> {
    at(&[&"users", &"location", &"coordinates", uid])
}

/// Forward proximity index: places near a user, with distance in km.
pub fn nearby_places(uid: &UserId) -> TypedPath<BTreeMap<PlaceId, f64>> {
    at(&[&"users", &"location", &"nearby", uid])
}

pub fn nearby_place(uid: &UserId, place: &PlaceId) -> TypedPath<f64> {
    at(&[&"users", &"location", &"nearby", uid, place])
}

/// Reverse proximity index: users near a place.
pub fn place_audience(place: &PlaceId) -> TypedPath<BTreeMap<UserId, f64>> {
    at(&[&"lookups", &"userplace", place])
}

pub fn place_audience_entry(place: &PlaceId, uid: &UserId) -> TypedPath<f64> {
    at(&[&"lookups", &"userplace", place, uid])
}

pub fn nearby_people(uid: &UserId) -> TypedPath<BTreeMap<UserId, f64>> {
    at(&[&"users", &"nearby", &"people", uid])
}

pub fn nearby_person(uid: &UserId, other: &UserId) -> TypedPath<f64> {
    at(&[&"users", &"nearby", &"people", uid, other])
}

// --- Uploads ---

pub fn post_meta(post: &PostId) -> TypedPath<Post> {
    at(&[&"uploads", &"meta", post])
}

pub fn views(post: &PostId) -> TypedPath<BTreeMap<UserId, i64>> {
    at(&[&"uploads", &"views", post])
}

pub fn view(post: &PostId, uid: &UserId) -> TypedPath<i64> {
    at(&[&"uploads", &"views", post, uid])
}

pub fn likes(post: &PostId) -> TypedPath<BTreeMap<UserId, i64>> {
    at(&[&"uploads", &"likes", post])
}

pub fn like(post: &PostId, uid: &UserId) -> TypedPath<i64> {
    at(&[&"uploads", &"likes", post, uid])
}

pub fn comments(post: &PostId) -> TypedPath<BTreeMap<CommentId, Comment>> {
    at(&[&"uploads", &"comments", post])
}

pub fn comment(post: &PostId, comment: &CommentId) -> TypedPath<Comment> {
    at(&[&"uploads", &"comments", post, comment])
}

pub fn subscribers(post: &PostId) -> TypedPath<BTreeMap<UserId, bool>> {
    at(&[&"uploads", &"subscribers", post])
}

pub fn subscriber(post: &PostId, uid: &UserId) -> TypedPath<bool> {
    at(&[&"uploads", &"subscribers", post, uid])
}

pub fn post_stats(post: &PostId) -> TypedPath<PostStats> {
    at(&[&"uploads", &"stats", post])
}

/// Index of notifications a post produced, by recipient.
pub fn post_notifications(
    post: &PostId,
) -> TypedPath<BTreeMap<UserId, BTreeMap<NotificationKey, bool>>> {
    at(&[&"uploads", &"notifications", post])
}

pub fn post_notification(post: &PostId, recipient: &UserId, key: &NotificationKey) -> TypedPath<bool> {
    at(&[&"uploads", &"notifications", post, recipient, key])
}

// --- Popularity statistics ---

pub fn story_aggregates(author: &UserId) -> TypedPath<BTreeMap<PostId, PostAggregate>> {
    at(&[&"stats", &"stories", author, &"posts"])
}

pub fn story_aggregate(author: &UserId, post: &PostId) -> TypedPath<PostAggregate> {
    at(&[&"stats", &"stories", author, &"posts", post])
}

pub fn story_summary(author: &UserId) -> TypedPath<PopularitySummary> {
    at(&[&"stats", &"stories", author, &"summary"])
}

pub fn place_aggregates(place: &PlaceId) -> TypedPath<BTreeMap<PostId, PostAggregate>> {
    at(&[&"stats", &"places", place, &"posts"])
}

pub fn place_aggregate(place: &PlaceId, post: &PostId) -> TypedPath<PostAggregate> {
    at(&[&"stats", &"places", place, &"posts", post])
}

pub fn place_summary(place: &PlaceId) -> TypedPath<PopularitySummary> {
    at(&[&"stats", &"places", place, &"summary"])
}

// --- Notifications ---

pub fn notification(recipient: &UserId, key: &NotificationKey) -> TypedPath<Notification> {
    at(&[&"notifications", recipient, key])
}

pub fn notifications(recipient: &UserId) -> TypedPath<BTreeMap<NotificationKey, Notification>> {
    at(&[&"notifications", recipient])
}

/// `false` until the recipient has seen the notification.
pub fn seen_flag(recipient: &UserId, key: &NotificationKey) -> TypedPath<bool> {
    at(&[&"users", &"notifications", recipient, key])
}

// --- Conversations ---

pub fn conversation_meta(key: &ConversationKey) -> TypedPath<ConversationMeta> {
    at(&[&"conversations", key, &"meta"])
}

pub fn conversation_message(key: &ConversationKey, message: &MessageId) -> TypedPath<Message> {
    at(&[&"conversations", key, &"messages", message])
}

pub fn conversation_last_seen(key: &ConversationKey, uid: &UserId) -> TypedPath<i64> {
    at(&[&"conversations", key, &"meta", uid])
}

pub fn conversation_latest(key: &ConversationKey) -> TypedPath<i64> {
    at(&[&"conversations", key, &"meta", &"latest"])
}

pub fn conversation_text(key: &ConversationKey) -> TypedPath<String> {
    at(&[&"conversations", key, &"meta", &"text"])
}

pub fn mirror_seen(uid: &UserId, peer: &UserId) -> TypedPath<bool> {
    at(&[&"users", &"conversations", uid, peer, &"seen"])
}

pub fn mirror_latest(uid: &UserId, peer: &UserId) -> TypedPath<i64> {
    at(&[&"users", &"conversations", uid, peer, &"latest"])
}

pub fn mirror_text(uid: &UserId, peer: &UserId) -> TypedPath<String> {
    at(&[&"users", &"conversations", uid, peer, &"text"])
}

pub fn mirror_blocked(uid: &UserId, peer: &UserId) -> TypedPath<bool> {
    at(&[&"users", &"conversations", uid, peer, &"blocked"])
}
