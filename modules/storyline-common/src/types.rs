use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// --- Identifiers ---

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(UserId);
string_id!(PostId);
string_id!(PlaceId);
string_id!(CommentId);
string_id!(MessageId);

/// `uidA:uidB`, one conversation per unordered pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    a: UserId,
    b: UserId,
}

impl ConversationKey {
    /// Canonical key for a pair: participants in sorted order.
    pub fn between(x: &UserId, y: &UserId) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            a: a.clone(),
            b: b.clone(),
        }
    }

    /// Parse a stored key, keeping the order it was written in.
    pub fn parse(raw: &str) -> Option<Self> {
        let (a, b) = raw.split_once(':')?;
        if a.is_empty() || b.is_empty() || b.contains(':') {
            return None;
        }
        Some(Self {
            a: a.into(),
            b: b.into(),
        })
    }

    pub fn participants(&self) -> (&UserId, &UserId) {
        (&self.a, &self.b)
    }

    /// The participant that is not `me`.
    pub fn peer_of(&self, me: &UserId) -> Option<&UserId> {
        if &self.a == me {
            Some(&self.b)
        } else if &self.b == me {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.a, self.b)
    }
}

// --- Time ---

/// Store timestamps are epoch milliseconds.
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// --- Location ---

/// Last known position of a user. `rad` is the radius of interest in km.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lon: f64,
    pub rad: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// A node under `places/{place}`: fixed info plus the posts made there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<PlaceInfo>,
    #[serde(default)]
    pub posts: BTreeMap<PostId, PlacePost>,
}

// --- Content ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub author: UserId,
    #[serde(rename = "placeId", default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<PlaceId>,
    #[serde(rename = "dateCreated")]
    pub date_created: i64,
}

impl Post {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.date_created)
    }

    /// Inside the retention window that feeds popularity statistics. Posts
    /// stamped slightly in the future (client clock skew) count as live.
    pub fn is_live(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.created_at() {
            Some(created) => now - created < window,
            None => false,
        }
    }
}

/// A post as mirrored into stories and following feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryEntry {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceId>,
}

/// A post as mirrored under a place and into nearby feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacePost {
    #[serde(rename = "a")]
    pub author: UserId,
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// One place in a user's nearby feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NearbyBucket {
    pub distance: f64,
    #[serde(default)]
    pub posts: BTreeMap<PostId, PlacePost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: UserId,
    pub text: String,
    pub timestamp: i64,
}

// --- Aggregates ---

/// Counters for one post, recomputed from its child collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub participants: u64,
}

/// Raw per-post sets mirrored into story and place statistics while the post
/// is live. Kept as sets so that unions across posts count people once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAggregate {
    #[serde(default)]
    pub viewers: BTreeSet<UserId>,
    #[serde(default)]
    pub participants: BTreeSet<UserId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PopularitySummary {
    pub posts: u64,
    pub viewers: u64,
    pub participants: u64,
    pub score: f64,
}

// --- Conversations ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "senderId")]
    pub sender_id: UserId,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// `conversations/{key}/meta`: last-seen per participant plus the latest message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub last_seen: BTreeMap<String, i64>,
}

impl ConversationMeta {
    pub fn last_seen(&self, uid: &UserId) -> Option<i64> {
        self.last_seen.get(uid.as_str()).copied()
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Follow,
    Comment,
    CommentAlso,
    CommentToSub,
    Mention,
    Like,
}

impl NotificationType {
    /// Aggregated types overwrite a running count and never push.
    pub fn pushes(self) -> bool {
        !matches!(self, Self::Like)
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Follow => "FOLLOW",
            Self::Comment => "COMMENT",
            Self::CommentAlso => "COMMENT_ALSO",
            Self::CommentToSub => "COMMENT_TO_SUB",
            Self::Mention => "MENTION",
            Self::Like => "LIKE",
        };
        f.write_str(s)
    }
}

/// Deterministic notification identity. Repeated events for the same subject
/// produce the same key, so they overwrite instead of accumulating. Keys live
/// inside the recipient's namespace, which disambiguates recipients.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn follow(sender: &UserId) -> Self {
        Self(format!("follow:{sender}"))
    }

    /// Shared by COMMENT, COMMENT_ALSO and COMMENT_TO_SUB.
    pub fn comment(post: &PostId, recipient: &UserId) -> Self {
        Self(format!("comment:{post}:{recipient}"))
    }

    pub fn mention(post: &PostId, recipient: &UserId) -> Self {
        Self(format!("mention:{post}:{recipient}"))
    }

    pub fn like(post: &PostId) -> Self {
        Self(format!("like:{post}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NotificationKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub sender: UserId,
    pub recipient: UserId,
    #[serde(rename = "postKey", default, skip_serializing_if = "Option::is_none")]
    pub post: Option<PostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub timestamp: i64,
}
