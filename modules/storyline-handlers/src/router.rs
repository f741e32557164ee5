//! Trigger wiring: which store paths run which handler.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use storyline_common::paths::patterns;
use storyline_common::{
    CommentId, ConversationKey, FileConfig, LocationSample, NotificationKey, PlaceId, PlaceInfo,
    PostId, UserId,
};
use storyline_engine::{Engine, Reducer, RouteTable, RoutedEvent, Router};
use storyline_store::{MutationFeed, PatternError};
use tracing::debug;

use crate::deps::HandlerDeps;
use crate::error::{new_value, HandlerError};
use crate::{
    aggregates, comments, conversations, fanout, notifications, popularity, proximity,
    relationships,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Trigger {
    FollowEdge,
    BlockEdge,
    Location,
    PlaceInfo,
    PostMeta,
    PostView,
    PostLike,
    PostComment,
    StoryAggregate,
    PlaceAggregate,
    Notification,
    ConversationMeta,
    ConversationMessage,
}

/// Every watched pattern and its trigger. No two patterns overlap, so order
/// only matters for readability.
pub fn route_table() -> Result<RouteTable<Trigger>, PatternError> {
    RouteTable::new()
        .route(patterns::FOLLOW_EDGE, Trigger::FollowEdge)?
        .route(patterns::BLOCK_EDGE, Trigger::BlockEdge)?
        .route(patterns::LOCATION, Trigger::Location)?
        .route(patterns::PLACE_INFO, Trigger::PlaceInfo)?
        .route(patterns::POST_META, Trigger::PostMeta)?
        .route(patterns::POST_VIEW, Trigger::PostView)?
        .route(patterns::POST_LIKE, Trigger::PostLike)?
        .route(patterns::POST_COMMENT, Trigger::PostComment)?
        .route(patterns::STORY_AGGREGATE, Trigger::StoryAggregate)?
        .route(patterns::PLACE_AGGREGATE, Trigger::PlaceAggregate)?
        .route(patterns::NOTIFICATION, Trigger::Notification)?
        .route(patterns::CONVERSATION_META, Trigger::ConversationMeta)?
        .route(patterns::CONVERSATION_MESSAGE, Trigger::ConversationMessage)
}

/// Per-trigger delivery counts, folded in before handlers run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriggerStats {
    pub delivered: BTreeMap<Trigger, u64>,
    pub creations: u64,
    pub removals: u64,
}

impl TriggerStats {
    pub fn count(&self, trigger: Trigger) -> u64 {
        self.delivered.get(&trigger).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.delivered.values().sum()
    }
}

pub struct StatsReducer;

impl Reducer<Trigger, TriggerStats> for StatsReducer {
    fn reduce(&self, state: &mut TriggerStats, event: &RoutedEvent<'_, Trigger>) {
        *state.delivered.entry(*event.route).or_default() += 1;
        if event.event.is_creation() {
            state.creations += 1;
        } else if event.event.is_removal() {
            state.removals += 1;
        }
    }
}

fn param<'e>(event: &'e RoutedEvent<'_, Trigger>, name: &str) -> Result<&'e str, HandlerError> {
    event
        .param(name)
        .ok_or_else(|| HandlerError::malformed(&event.event.path, format!("missing {{{name}}}")))
}

fn conversation(event: &RoutedEvent<'_, Trigger>) -> Result<ConversationKey, HandlerError> {
    let raw = param(event, "conversation")?;
    ConversationKey::parse(raw)
        .ok_or_else(|| HandlerError::malformed(&event.event.path, "conversation key is not uidA:uidB"))
}

/// Dispatches each trigger to its handler.
pub struct TriggerRouter;

#[async_trait]
impl Router<Trigger, TriggerStats, HandlerDeps> for TriggerRouter {
    async fn route(
        &self,
        event: &RoutedEvent<'_, Trigger>,
        _state: &TriggerStats,
        deps: &HandlerDeps,
    ) -> Result<()> {
        let mutation = event.event;
        let present = !mutation.is_removal();

        match event.route {
            Trigger::FollowEdge => {
                let followed = UserId::from(param(event, "followed")?);
                let follower = UserId::from(param(event, "follower")?);
                relationships::on_follow_edge(deps, &followed, &follower, present).await?;
            }
            Trigger::BlockEdge => {
                let blocker = UserId::from(param(event, "blocker")?);
                let blocked = UserId::from(param(event, "blocked")?);
                relationships::on_block_edge(deps, &blocker, &blocked, present).await?;
            }
            Trigger::Location => {
                let uid = UserId::from(param(event, "uid")?);
                let sample = new_value::<LocationSample>(mutation)?;
                proximity::on_location(deps, &uid, sample).await?;
            }
            Trigger::PlaceInfo => {
                if !mutation.is_creation() {
                    debug!(path = %mutation.path, "Place info edited, not re-announced");
                    return Ok(());
                }
                let place = PlaceId::from(param(event, "place")?);
                if let Some(info) = new_value::<PlaceInfo>(mutation)? {
                    proximity::on_place_created(deps, &place, &info).await?;
                }
            }
            Trigger::PostMeta => {
                let post = PostId::from(param(event, "post")?);
                fanout::on_post_meta(deps, mutation, &post).await?;
            }
            Trigger::PostView => {
                let post = PostId::from(param(event, "post")?);
                aggregates::on_view(deps, &post).await?;
            }
            Trigger::PostLike => {
                let post = PostId::from(param(event, "post")?);
                aggregates::on_like(deps, mutation, &post).await?;
            }
            Trigger::PostComment => {
                let post = PostId::from(param(event, "post")?);
                let comment = CommentId::from(param(event, "comment")?);
                comments::on_comment(deps, mutation, &post, &comment).await?;
            }
            Trigger::StoryAggregate => {
                let author = UserId::from(param(event, "author")?);
                popularity::on_story_aggregate(deps, &author).await?;
            }
            Trigger::PlaceAggregate => {
                let place = PlaceId::from(param(event, "place")?);
                popularity::on_place_aggregate(deps, &place).await?;
            }
            Trigger::Notification => {
                let recipient = UserId::from(param(event, "recipient")?);
                let key = NotificationKey::from(param(event, "key")?);
                notifications::on_notification_removed(deps, mutation, &recipient, &key).await?;
            }
            Trigger::ConversationMeta => {
                let key = conversation(event)?;
                conversations::on_meta(deps, mutation, &key).await?;
            }
            Trigger::ConversationMessage => {
                let key = conversation(event)?;
                conversations::on_message(deps, mutation, &key).await?;
            }
        }
        Ok(())
    }
}

pub type StorylineEngine<F> =
    Engine<Trigger, TriggerStats, HandlerDeps, StatsReducer, TriggerRouter, F>;

/// Build the engine over `feed`, watching every trigger pattern.
pub fn build_engine<F: MutationFeed>(
    feed: F,
    config: &FileConfig,
) -> Result<StorylineEngine<F>, PatternError> {
    Ok(Engine::new(route_table()?, StatsReducer, TriggerRouter, feed)
        .with_max_rounds(config.engine.max_rounds))
}
