//! Location, post fan-out, comments, likes and popularity.

mod harness;

use harness::{hours_ago, post, Harness};
use serde_json::json;
use storyline_common::scoring::summarize;
use storyline_common::{
    paths, Comment, CommentId, LocationSample, NotificationKey, NotificationType, PlaceId,
    PopularityCounts, PopularityWeights, PostId, UserId,
};

fn uid(id: &str) -> UserId {
    UserId::from(id)
}

fn pid(id: &str) -> PostId {
    PostId::from(id)
}

fn cid(id: &str) -> CommentId {
    CommentId::from(id)
}

fn place(id: &str) -> PlaceId {
    PlaceId::from(id)
}

fn comment(author: &str, text: &str, timestamp: i64) -> Comment {
    Comment {
        author: author.into(),
        text: text.into(),
        timestamp,
    }
}

// ---------------------------------------------------------------------------
// Proximity
// ---------------------------------------------------------------------------

fn two_places() -> serde_json::Value {
    json!({
        "places": {
            "near": { "info": { "name": "Near", "lat": 0.0, "lon": 5.0 } },
            "far": { "info": { "name": "Far", "lat": 0.0, "lon": 20.0 } }
        }
    })
}

#[tokio::test]
async fn location_indexes_places_within_radius() {
    let mut h = Harness::new(two_places());
    let sample = LocationSample {
        lat: 0.0,
        lon: 0.0,
        rad: 1000.0,
    };

    let report = h.set(paths::coordinates(&uid("u")), sample).await;
    assert!(report.is_clean(), "{report:?}");

    let d = h.get(paths::nearby_place(&uid("u"), &place("near"))).await.unwrap();
    assert!((d - 556.0).abs() <= 1.0, "got {d}");
    assert_eq!(h.get(paths::nearby_place(&uid("u"), &place("far"))).await, None);

    assert_eq!(
        h.get(paths::place_audience_entry(&place("near"), &uid("u"))).await,
        Some(d)
    );
    assert_eq!(h.get(paths::place_audience(&place("far"))).await, None);
    assert_eq!(
        h.get(paths::nearby_bucket_distance(&uid("u"), &place("near"))).await,
        Some(d)
    );
}

#[tokio::test]
async fn moving_updates_both_indexes() {
    let mut h = Harness::new(two_places());
    let at = |lon| LocationSample {
        lat: 0.0,
        lon,
        rad: 1000.0,
    };
    h.set(paths::coordinates(&uid("u")), at(0.0)).await;

    h.set(paths::coordinates(&uid("u")), at(20.0)).await;

    let nearby = h.get(paths::nearby_places(&uid("u"))).await.unwrap();
    assert_eq!(nearby.keys().collect::<Vec<_>>(), vec![&place("far")]);
    assert_eq!(h.get(paths::place_audience(&place("near"))).await, None);
    assert!(h.get(paths::place_audience_entry(&place("far"), &uid("u"))).await.is_some());
    let feed = h.get(paths::nearby_feed(&uid("u"))).await.unwrap();
    assert!(feed.contains_key(&place("far")) && !feed.contains_key(&place("near")));
}

#[tokio::test]
async fn removing_location_clears_indexes() {
    let mut h = Harness::new(two_places());
    let sample = LocationSample {
        lat: 0.0,
        lon: 0.0,
        rad: 1000.0,
    };
    h.set(paths::coordinates(&uid("u")), sample).await;

    let report = h.remove(paths::coordinates(&uid("u"))).await;
    assert!(report.is_clean());

    assert_eq!(h.get(paths::nearby_places(&uid("u"))).await, None);
    assert_eq!(h.get(paths::place_audience(&place("near"))).await, None);
    assert_eq!(h.get(paths::nearby_feed(&uid("u"))).await, None);
}

#[tokio::test]
async fn nearby_people_are_reciprocal() {
    let seed = json!({
        "users": { "location": { "coordinates": {
            "v": { "lat": 0.0, "lon": 1.0, "rad": 500.0 }
        } } }
    });
    let mut h = Harness::new(seed);
    let sample = LocationSample {
        lat: 0.0,
        lon: 0.0,
        rad: 500.0,
    };

    h.set(paths::coordinates(&uid("u")), sample).await;

    let d = h.get(paths::nearby_person(&uid("u"), &uid("v"))).await.unwrap();
    assert!((d - 111.2).abs() < 1.0, "got {d}");
    let back = h.get(paths::nearby_person(&uid("v"), &uid("u"))).await.unwrap();
    assert!((back - d).abs() < 1e-9);
}

#[tokio::test]
async fn malformed_neighbour_sample_does_not_block_proximity() {
    let mut seed = two_places();
    seed["users"] = json!({ "location": { "coordinates": {
        "mallory": { "lat": 0.0, "lon": 1.0 },
        "v": { "lat": 0.0, "lon": 1.0, "rad": 500.0 }
    } } });
    let mut h = Harness::new(seed);
    let sample = LocationSample {
        lat: 0.0,
        lon: 0.0,
        rad: 1000.0,
    };

    let report = h.set(paths::coordinates(&uid("u")), sample).await;
    assert!(report.is_clean(), "{report:?}");

    assert!(h.get(paths::nearby_place(&uid("u"), &place("near"))).await.is_some());
    assert!(h.get(paths::nearby_person(&uid("u"), &uid("v"))).await.is_some());
    assert_eq!(h.get(paths::nearby_person(&uid("u"), &uid("mallory"))).await, None);
}

#[tokio::test]
async fn new_place_is_announced_to_users_in_range() {
    let seed = json!({
        "users": { "location": { "coordinates": {
            "u": { "lat": 0.0, "lon": 0.0, "rad": 1000.0 },
            "w": { "lat": 50.0, "lon": 50.0, "rad": 10.0 }
        } } }
    });
    let mut h = Harness::new(seed);
    let info = storyline_common::PlaceInfo {
        name: "Cafe".into(),
        lat: 0.0,
        lon: 5.0,
    };

    h.set(paths::place_info(&place("cafe")), info).await;

    assert!(h.get(paths::nearby_place(&uid("u"), &place("cafe"))).await.is_some());
    assert!(h.get(paths::nearby_bucket_distance(&uid("u"), &place("cafe"))).await.is_some());
    assert_eq!(h.get(paths::nearby_place(&uid("w"), &place("cafe"))).await, None);
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

fn audience_seed() -> serde_json::Value {
    json!({
        "social": { "followers": { "author": { "f1": true, "f2": true } } },
        "places": { "pl": { "info": { "name": "Pl", "lat": 0.0, "lon": 0.0 } } },
        "lookups": { "userplace": { "pl": { "n1": 2.5, "blocked": 1.0 } } },
        "users": { "profile": { "f1": { "username": "fay" } } }
    })
}

fn with_block(mut seed: serde_json::Value) -> serde_json::Value {
    seed["social"]["blocked"] = json!({ "author": { "blocked": true } });
    seed
}

#[tokio::test]
async fn new_post_reaches_followers_place_and_nearby_users() {
    let mut h = Harness::new(with_block(audience_seed()));

    let report = h.set(paths::post_meta(&pid("p1")), post("author", Some("pl"), 1)).await;
    assert!(report.is_clean(), "{report:?}");

    assert!(h.get(paths::story_entry(&uid("author"), &pid("p1"))).await.is_some());
    for follower in ["f1", "f2"] {
        let entry = paths::following_feed_entry(&uid(follower), &uid("author"), &pid("p1"));
        assert!(h.get(entry).await.is_some(), "{follower} feed");
    }
    assert!(h.get(paths::place_post(&place("pl"), &pid("p1"))).await.is_some());
    assert!(h
        .get(paths::nearby_feed_post(&uid("n1"), &place("pl"), &pid("p1")))
        .await
        .is_some());
    assert_eq!(
        h.get(paths::nearby_feed_post(&uid("blocked"), &place("pl"), &pid("p1"))).await,
        None
    );
    assert_eq!(h.get(paths::subscriber(&pid("p1"), &uid("author"))).await, Some(true));
    assert!(h.get(paths::story_summary(&uid("author"))).await.is_some());
}

#[tokio::test]
async fn editing_a_post_does_not_fan_out_again() {
    let mut h = Harness::new(audience_seed());
    h.set(paths::post_meta(&pid("p1")), post("author", Some("pl"), 1)).await;
    h.remove(paths::following_feed_entry(&uid("f1"), &uid("author"), &pid("p1")))
        .await;

    h.set(paths::post_meta(&pid("p1")), post("author", Some("pl"), 2)).await;

    assert_eq!(
        h.get(paths::following_feed_entry(&uid("f1"), &uid("author"), &pid("p1"))).await,
        None
    );
}

#[tokio::test]
async fn deleting_a_post_removes_every_mirror_and_notification() {
    let mut h = Harness::new(audience_seed());
    h.set(paths::post_meta(&pid("p1")), post("author", Some("pl"), 1)).await;
    h.set(paths::comment(&pid("p1"), &cid("c1")), comment("f1", "nice", hours_ago(0)))
        .await;
    let key = NotificationKey::comment(&pid("p1"), &uid("author"));
    assert!(h.get(paths::notification(&uid("author"), &key)).await.is_some());

    let report = h.remove(paths::post_meta(&pid("p1"))).await;
    assert!(report.is_clean(), "{report:?}");

    assert_eq!(h.get(paths::story_entry(&uid("author"), &pid("p1"))).await, None);
    for follower in ["f1", "f2"] {
        let entry = paths::following_feed_entry(&uid(follower), &uid("author"), &pid("p1"));
        assert_eq!(h.get(entry).await, None, "{follower} feed");
    }
    assert_eq!(h.get(paths::place_post(&place("pl"), &pid("p1"))).await, None);
    assert_eq!(
        h.get(paths::nearby_feed_post(&uid("n1"), &place("pl"), &pid("p1"))).await,
        None
    );
    assert_eq!(h.get(paths::notification(&uid("author"), &key)).await, None);
    assert_eq!(h.get(paths::seen_flag(&uid("author"), &key)).await, None);
    assert_eq!(h.get(paths::post_notifications(&pid("p1"))).await, None);
    assert_eq!(h.get(paths::comments(&pid("p1"))).await, None);
    assert_eq!(h.get(paths::post_stats(&pid("p1"))).await, None);
    assert_eq!(h.get(paths::story_summary(&uid("author"))).await, None);
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

fn thread_seed() -> serde_json::Value {
    let meta = serde_json::to_value(post("a", None, 1)).unwrap();
    json!({
        "uploads": {
            "meta": { "p1": meta },
            "subscribers": { "p1": { "a": true, "s1": true, "s2": true } },
            "comments": { "p1": { "c1": { "author": "s1", "text": "first", "timestamp": 100 } } }
        },
        "users": {
            "profile": {
                "s1": { "username": "sam" },
                "s2": { "username": "sue" }
            },
            "tokens": { "a": "tok-a", "s1": "tok-s1", "s2": "tok-s2" },
            "lookup": { "username": { "bob": "b" } }
        }
    })
}

#[tokio::test]
async fn comment_notifications_depend_on_relation_to_thread() {
    let mut h = Harness::new(thread_seed());

    let report = h.set(paths::comment(&pid("p1"), &cid("c2")), comment("s1", "again", 200)).await;
    assert!(report.is_clean(), "{report:?}");

    let of = |recipient: &str| {
        let key = NotificationKey::comment(&pid("p1"), &uid(recipient));
        paths::notification(&uid(recipient), &key)
    };
    assert_eq!(h.get(of("a")).await.unwrap().kind, NotificationType::Comment);
    assert_eq!(h.get(of("s2")).await.unwrap().kind, NotificationType::CommentToSub);
    assert_eq!(h.get(of("s1")).await, None);

    let report = h.set(paths::comment(&pid("p1"), &cid("c3")), comment("s2", "me too", 300)).await;
    assert!(report.is_clean());
    let also = h.get(of("s1")).await.unwrap();
    assert_eq!(also.kind, NotificationType::CommentAlso);
    assert_eq!(also.count, Some(1));

    let bodies = h.push.bodies();
    assert!(bodies.contains(&"sue also commented: \"me too\"".to_string()), "{bodies:?}");
    assert!(bodies.contains(&"sam commented on your post: \"again\"".to_string()));
    assert!(bodies.contains(&"sam commented on a post you follow: \"again\"".to_string()));
}

#[tokio::test]
async fn commenting_subscribes_and_updates_stats() {
    let mut h = Harness::new(thread_seed());

    h.set(paths::comment(&pid("p1"), &cid("c2")), comment("x", "hello", 200)).await;

    assert_eq!(h.get(paths::subscriber(&pid("p1"), &uid("x"))).await, Some(true));
    let stats = h.get(paths::post_stats(&pid("p1"))).await.unwrap();
    assert_eq!((stats.comments, stats.participants), (2, 2));
}

#[tokio::test]
async fn malformed_comment_does_not_block_the_thread() {
    let mut seed = thread_seed();
    seed["uploads"]["comments"]["p1"]["junk"] = json!("not a comment");
    let mut h = Harness::new(seed);

    let report = h.set(paths::comment(&pid("p1"), &cid("c2")), comment("s1", "again", 200)).await;
    assert!(report.is_clean(), "{report:?}");

    let stats = h.get(paths::post_stats(&pid("p1"))).await.unwrap();
    assert_eq!((stats.comments, stats.participants), (2, 1));
    let key = NotificationKey::comment(&pid("p1"), &uid("a"));
    assert_eq!(
        h.get(paths::notification(&uid("a"), &key)).await.unwrap().kind,
        NotificationType::Comment
    );
}

#[tokio::test]
async fn mentions_resolve_and_unknown_names_are_dropped() {
    let mut h = Harness::new(thread_seed());

    let report = h
        .set(paths::comment(&pid("p1"), &cid("c2")), comment("s2", "hey @Bob and @ghost", 200))
        .await;
    assert!(report.is_clean(), "{report:?}");

    let key = NotificationKey::mention(&pid("p1"), &uid("b"));
    let mention = h.get(paths::notification(&uid("b"), &key)).await.unwrap();
    assert_eq!(mention.kind, NotificationType::Mention);
    assert_eq!(mention.sender, uid("s2"));
    assert_eq!(
        h.get(paths::post_notification(&pid("p1"), &uid("b"), &key)).await,
        Some(true)
    );
}

// ---------------------------------------------------------------------------
// Likes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn like_notification_carries_running_count_and_latest_sender() {
    let mut h = Harness::new(thread_seed());
    let key = NotificationKey::like(&pid("p1"));
    let like_of = |liker: &str| paths::like(&pid("p1"), &uid(liker));

    h.set(like_of("x"), 100).await;
    h.set(like_of("y"), 200).await;
    h.set(like_of("a"), 300).await;

    let like = h.get(paths::notification(&uid("a"), &key)).await.unwrap();
    assert_eq!(like.kind, NotificationType::Like);
    assert_eq!(like.count, Some(2));
    assert_eq!(like.sender, uid("y"));
    assert_eq!(h.get(paths::post_stats(&pid("p1"))).await.unwrap().likes, 3);

    h.remove(like_of("y")).await;
    let like = h.get(paths::notification(&uid("a"), &key)).await.unwrap();
    assert_eq!((like.count, like.sender), (Some(1), uid("x")));

    h.remove(like_of("x")).await;
    assert_eq!(h.get(paths::notification(&uid("a"), &key)).await, None);
    assert!(h.push.sent().is_empty(), "likes never push");
}

// ---------------------------------------------------------------------------
// Popularity
// ---------------------------------------------------------------------------

fn two_posts() -> serde_json::Value {
    json!({
        "uploads": { "meta": {
            "p1": serde_json::to_value(post("a", Some("pl"), 1)).unwrap(),
            "p2": serde_json::to_value(post("a", Some("pl"), 2)).unwrap(),
            "old": serde_json::to_value(post("a", Some("pl"), 48)).unwrap()
        } }
    })
}

#[tokio::test]
async fn popularity_is_independent_of_event_order() {
    let writes = [("p1", "v1"), ("p1", "v2"), ("p2", "v1"), ("old", "v3")];

    let mut forward = Harness::new(two_posts());
    for (post, viewer) in writes {
        forward.set(paths::view(&pid(post), &uid(viewer)), 1).await;
    }
    let mut backward = Harness::new(two_posts());
    for (post, viewer) in writes.iter().rev() {
        backward.set(paths::view(&pid(post), &uid(viewer)), 2).await;
    }

    let a = forward.get(paths::story_summary(&uid("a"))).await.unwrap();
    let b = backward.get(paths::story_summary(&uid("a"))).await.unwrap();
    assert_eq!(a, b);

    let expected = summarize(
        PopularityCounts {
            posts: 2,
            viewers: 2,
            participants: 0,
        },
        &PopularityWeights::default(),
    );
    assert_eq!(a, expected);
    assert_eq!(forward.get(paths::place_summary(&place("pl"))).await, Some(expected));
    assert_eq!(forward.get(paths::story_aggregate(&uid("a"), &pid("old"))).await, None);
}
