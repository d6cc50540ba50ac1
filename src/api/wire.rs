//! Wire types and lenient decoding of server payloads

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::models::{Author, EngagementKind, Item, Media, MediaKind, PageMeta, Profile};

use super::{FollowOutcome, Page, ToggleOutcome};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireItem {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    author: Option<WireAuthor>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    media: Vec<WireMedia>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default, alias = "parentTweet")]
    reply_to: Option<String>,
    #[serde(default)]
    reply_count: Option<i64>,
    #[serde(default, alias = "retweetCount")]
    repost_count: Option<i64>,
    #[serde(default, alias = "likeCount")]
    favorite_count: Option<i64>,
    #[serde(default)]
    view_count: Option<i64>,
    #[serde(default, alias = "likes")]
    favorited_by: Option<Vec<String>>,
    #[serde(default, alias = "retweets")]
    reposted_by: Option<Vec<String>>,
    #[serde(default, alias = "liked")]
    favorited: Option<bool>,
    #[serde(default, alias = "retweeted")]
    reposted: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAuthor {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "profilePic")]
    avatar_url: Option<String>,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePagination {
    page: Option<u32>,
    total_pages: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProfile {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "profilePic")]
    avatar_url: Option<String>,
    #[serde(default)]
    follower_count: Option<i64>,
    #[serde(default)]
    following_count: Option<i64>,
    #[serde(default)]
    is_following: Option<bool>,
}

fn count(value: Option<i64>) -> u64 {
    value.map_or(0, |c| c.max(0) as u64)
}

impl WireItem {
    /// Convert into a model item. Returns `None` when the identifier is
    /// missing or empty.
    ///
    /// When the payload carries actor sets and the viewer is known, the
    /// cached booleans are rederived from set membership; explicit booleans
    /// are used otherwise.
    pub(crate) fn into_item(self, viewer_id: Option<&str>) -> Option<Item> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let author = self.author.unwrap_or_default();

        let created_at = self
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

        let has_sets = self.favorited_by.is_some() || self.reposted_by.is_some();

        let mut item = Item {
            id,
            author: Author {
                id: author.id.unwrap_or_default(),
                username: author.username,
                name: author.name,
                avatar_url: author.avatar_url,
                verified: author.verified,
            },
            text: self.text,
            media: self
                .media
                .into_iter()
                .filter_map(|m| {
                    let kind = match m.kind.as_str() {
                        "image" => MediaKind::Image,
                        "video" => MediaKind::Video,
                        _ => return None,
                    };
                    Some(Media { kind, url: m.url })
                })
                .collect(),
            created_at,
            reply_to: self.reply_to,
            reply_count: count(self.reply_count),
            repost_count: count(self.repost_count),
            favorite_count: count(self.favorite_count),
            view_count: count(self.view_count),
            favorited_by: self.favorited_by.unwrap_or_default().into_iter().collect(),
            reposted_by: self.reposted_by.unwrap_or_default().into_iter().collect(),
            favorited: self.favorited.unwrap_or(false),
            reposted: self.reposted.unwrap_or(false),
        };

        if has_sets && let Some(viewer) = viewer_id {
            item.sync_viewer_state(viewer);
        }

        Some(item)
    }
}

/// Decode one item value, dropping it if it is unreadable or has no id
pub(crate) fn decode_item(value: Value, viewer_id: Option<&str>) -> Option<Item> {
    match WireItem::deserialize(value) {
        Ok(wire) => {
            let item = wire.into_item(viewer_id);
            if item.is_none() {
                tracing::debug!("Dropping item without identifier");
            }
            item
        }
        Err(e) => {
            tracing::debug!("Dropping unreadable item: {e}");
            None
        }
    }
}

/// Decode a list of item values, skipping bad entries
pub(crate) fn decode_items(values: Vec<Value>, viewer_id: Option<&str>) -> Vec<Item> {
    let total = values.len();
    let items: Vec<Item> = values
        .into_iter()
        .filter_map(|v| decode_item(v, viewer_id))
        .collect();

    if items.len() < total {
        tracing::warn!("Skipped {} malformed item(s) in batch", total - items.len());
    }
    items
}

/// Decode a paginated list response (`items`/`replies` plus `pagination`)
pub(crate) fn decode_page(
    body: Value,
    list_key: &str,
    legacy_key: &str,
    requested_page: u32,
    viewer_id: Option<&str>,
) -> ApiResult<Page> {
    let Value::Object(mut map) = body else {
        return Err(ApiError::Malformed("expected a JSON object".to_string()));
    };

    let list = map
        .remove(list_key)
        .or_else(|| map.remove(legacy_key))
        .unwrap_or(Value::Array(Vec::new()));
    let Value::Array(values) = list else {
        return Err(ApiError::Malformed(format!("`{list_key}` is not an array")));
    };

    let pagination: WirePagination = map
        .remove("pagination")
        .filter(|v| !v.is_null())
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();

    Ok(Page {
        items: decode_items(values, viewer_id),
        meta: PageMeta::new(
            pagination.page.unwrap_or(requested_page),
            pagination.total_pages.unwrap_or(1),
        ),
    })
}

/// Decode a single-item response (`{ item }`, `{ tweet }`, or the bare item)
pub(crate) fn decode_single(body: Value, viewer_id: Option<&str>) -> ApiResult<Item> {
    let value = match body {
        Value::Object(mut map) => match map.remove("item").or_else(|| map.remove("tweet")) {
            Some(inner @ Value::Object(_)) => inner,
            Some(_) => return Err(ApiError::Malformed("item is not an object".to_string())),
            None => Value::Object(map),
        },
        _ => return Err(ApiError::Malformed("expected a JSON object".to_string())),
    };

    decode_item(value, viewer_id).ok_or_else(|| ApiError::Malformed("item has no id".to_string()))
}

/// Decode a toggle response; both the flag and the count are required
pub(crate) fn decode_toggle(body: &Value, kind: EngagementKind) -> ApiResult<ToggleOutcome> {
    let (flag_keys, count_keys): (&[&str], &[&str]) = match kind {
        EngagementKind::Favorite => (&["favorited", "liked"], &["favoriteCount", "likeCount"]),
        EngagementKind::Repost => (&["reposted", "retweeted"], &["repostCount", "retweetCount"]),
    };

    let active = flag_keys
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_bool))
        .ok_or_else(|| ApiError::Malformed(format!("{kind} response missing flag")))?;
    let count = count_keys
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_i64))
        .ok_or_else(|| ApiError::Malformed(format!("{kind} response missing count")))?;

    Ok(ToggleOutcome {
        active,
        count: count.max(0) as u64,
    })
}

/// Decode a profile response (`{ user, isFollowing }` or the bare user)
pub(crate) fn decode_profile(body: Value) -> ApiResult<Profile> {
    let Value::Object(mut map) = body else {
        return Err(ApiError::Malformed("expected a JSON object".to_string()));
    };

    let outer_following = map.remove("isFollowing").and_then(|v| v.as_bool());
    let user = match map.remove("user") {
        Some(inner @ Value::Object(_)) => inner,
        Some(_) => return Err(ApiError::Malformed("user is not an object".to_string())),
        None => Value::Object(map),
    };

    let wire: WireProfile = serde_json::from_value(user)?;
    let id = wire
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Malformed("profile has no id".to_string()))?;

    Ok(Profile {
        id,
        username: wire.username,
        name: wire.name,
        avatar_url: wire.avatar_url,
        follower_count: count(wire.follower_count),
        following_count: count(wire.following_count),
        following: outer_following.or(wire.is_following).unwrap_or(false),
    })
}

/// Decode a follow toggle response; the flag is required, the count is not
pub(crate) fn decode_follow(body: &Value) -> ApiResult<FollowOutcome> {
    let following = body
        .get("following")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::Malformed("follow response missing flag".to_string()))?;

    Ok(FollowOutcome {
        following,
        follower_count: body
            .get("followerCount")
            .and_then(Value::as_i64)
            .map(|c| c.max(0) as u64),
    })
}

/// Pull a human-readable message out of an error body
pub(crate) fn error_message(body: &Value) -> String {
    ["error", "message"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .unwrap_or("Request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_skips_items_without_id() {
        let body = json!({
            "items": [
                {"id": "a", "text": "first"},
                {"text": "no id"},
                {"_id": "b", "likeCount": 4, "likes": ["me"]},
                {"id": ""}
            ],
            "pagination": {"page": 1, "totalPages": 3}
        });

        let page = decode_page(body, "items", "tweets", 1, Some("me")).unwrap();
        let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(page.meta, PageMeta::new(1, 3));
        assert!(page.items[1].favorited);
        assert_eq!(page.items[1].favorite_count, 4);
    }

    #[test]
    fn test_page_defaults_missing_pagination() {
        let body = json!({"replies": []});
        let page = decode_page(body, "replies", "replies", 2, None).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.meta, PageMeta::new(2, 1));
        assert!(!page.meta.has_more());
    }

    #[test]
    fn test_legacy_list_key() {
        let body = json!({"tweets": [{"_id": "x"}]});
        let page = decode_page(body, "items", "tweets", 1, None).unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn test_explicit_flag_kept_without_sets() {
        let item = decode_item(json!({"id": "t", "favorited": true}), Some("me")).unwrap();
        assert!(item.favorited);
    }

    #[test]
    fn test_sets_override_stale_flag() {
        let item = decode_item(
            json!({"id": "t", "favorited": true, "favoritedBy": ["other"]}),
            Some("me"),
        )
        .unwrap();
        assert!(!item.favorited);
    }

    #[test]
    fn test_negative_counts_clamped_and_media_filtered() {
        let item = decode_item(
            json!({
                "id": "t",
                "replyCount": -2,
                "media": [
                    {"type": "image", "url": "https://img"},
                    {"type": "audio", "url": "https://snd"}
                ]
            }),
            None,
        )
        .unwrap();
        assert_eq!(item.reply_count, 0);
        assert_eq!(item.media.len(), 1);
        assert_eq!(item.media[0].kind, MediaKind::Image);
    }

    #[test]
    fn test_single_item_shapes() {
        assert_eq!(decode_single(json!({"item": {"id": "a"}}), None).unwrap().id, "a");
        assert_eq!(decode_single(json!({"tweet": {"_id": "b"}}), None).unwrap().id, "b");
        assert_eq!(decode_single(json!({"id": "c"}), None).unwrap().id, "c");
        assert!(decode_single(json!({"item": {"text": "x"}}), None).is_err());
    }

    #[test]
    fn test_toggle_requires_both_fields() {
        let ok = decode_toggle(&json!({"favorited": true, "favoriteCount": 9}), EngagementKind::Favorite)
            .unwrap();
        assert_eq!(ok, ToggleOutcome { active: true, count: 9 });

        let legacy =
            decode_toggle(&json!({"retweeted": false, "retweetCount": 2}), EngagementKind::Repost)
                .unwrap();
        assert_eq!(legacy, ToggleOutcome { active: false, count: 2 });

        let missing = decode_toggle(&json!({"favorited": true}), EngagementKind::Favorite);
        assert!(matches!(missing, Err(ApiError::Malformed(_))));
    }

    #[test]
    fn test_profile_shapes() {
        let wrapped = decode_profile(json!({
            "user": {"_id": "u1", "username": "ana", "followerCount": 3},
            "isFollowing": true
        }))
        .unwrap();
        assert_eq!(wrapped.id, "u1");
        assert_eq!(wrapped.username, "ana");
        assert_eq!(wrapped.follower_count, 3);
        assert!(wrapped.following);

        let bare = decode_profile(json!({"id": "u2", "followingCount": -1})).unwrap();
        assert!(!bare.following);
        assert_eq!(bare.following_count, 0);

        assert!(decode_profile(json!({"user": {"username": "nobody"}})).is_err());
    }

    #[test]
    fn test_follow_requires_flag() {
        assert_eq!(
            decode_follow(&json!({"following": false})).unwrap(),
            FollowOutcome {
                following: false,
                follower_count: None,
            }
        );
        assert_eq!(
            decode_follow(&json!({"following": true, "followerCount": 12}))
                .unwrap()
                .follower_count,
            Some(12)
        );
        assert!(matches!(decode_follow(&json!({})), Err(ApiError::Malformed(_))));
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(&json!({"error": "nope"})), "nope");
        assert_eq!(error_message(&json!({"message": "bad"})), "bad");
        assert_eq!(error_message(&Value::Null), "Request failed");
    }
}
