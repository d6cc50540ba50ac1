//! Item model (a single post in a feed or reply thread)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which engagement toggle an operation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    /// Favorite (like)
    Favorite,
    /// Repost (retweet/boost)
    Repost,
}

impl EngagementKind {
    /// Get all engagement kinds
    pub const fn all() -> &'static [Self] {
        &[Self::Favorite, Self::Repost]
    }

    /// Get the display name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::Repost => "repost",
        }
    }
}

impl std::fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Author reference carried on every item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Author identifier
    pub id: String,
    /// Handle without the leading `@`
    pub username: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Verified badge
    pub verified: bool,
}

/// Media attachment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video clip
    Video,
}

/// Media attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Attachment kind
    pub kind: MediaKind,
    /// Source URL
    pub url: String,
}

/// A feed item.
///
/// The actor sets are authoritative; `favorited`/`reposted` are the cached
/// per-viewer booleans used for optimistic rendering and are rederived with
/// [`Item::sync_viewer_state`] whenever a fresh copy arrives from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Stable, globally unique identifier
    pub id: String,
    /// Author of the item
    pub author: Author,
    /// Body text
    pub text: String,
    /// Ordered media attachments
    pub media: Vec<Media>,
    /// When the item was created
    pub created_at: DateTime<Utc>,
    /// Parent item identifier (if this is a reply)
    pub reply_to: Option<String>,
    /// Number of replies
    pub reply_count: u64,
    /// Number of reposts
    pub repost_count: u64,
    /// Number of favorites
    pub favorite_count: u64,
    /// Number of views
    pub view_count: u64,
    /// Users who favorited this item
    pub favorited_by: BTreeSet<String>,
    /// Users who reposted this item
    pub reposted_by: BTreeSet<String>,
    /// Whether the current user has favorited this item
    pub favorited: bool,
    /// Whether the current user has reposted this item
    pub reposted: bool,
}

impl Item {
    /// Create an empty item with the given identifier
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            author: Author::default(),
            text: String::new(),
            media: Vec::new(),
            created_at: Utc::now(),
            reply_to: None,
            reply_count: 0,
            repost_count: 0,
            favorite_count: 0,
            view_count: 0,
            favorited_by: BTreeSet::new(),
            reposted_by: BTreeSet::new(),
            favorited: false,
            reposted: false,
        }
    }

    /// Rederive the cached booleans from actor-set membership
    pub fn sync_viewer_state(&mut self, viewer_id: &str) {
        self.favorited = self.favorited_by.contains(viewer_id);
        self.reposted = self.reposted_by.contains(viewer_id);
    }

    /// Current (flag, count) pair for an engagement kind
    pub fn engagement(&self, kind: EngagementKind) -> (bool, u64) {
        match kind {
            EngagementKind::Favorite => (self.favorited, self.favorite_count),
            EngagementKind::Repost => (self.reposted, self.repost_count),
        }
    }

    /// Whether this item is a reply
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Get a short preview of the text (for list display)
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.text.replace('\n', " ");
        if text.chars().count() <= max_chars {
            text
        } else {
            let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }

    /// Get relative time string (e.g., "5m", "2h", "3d")
    pub fn relative_time(&self) -> String {
        let duration = Utc::now().signed_duration_since(self.created_at);

        if duration.num_seconds() < 60 {
            format!("{}s", duration.num_seconds().max(0))
        } else if duration.num_minutes() < 60 {
            format!("{}m", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h", duration.num_hours())
        } else if duration.num_days() < 7 {
            format!("{}d", duration.num_days())
        } else {
            self.created_at.format("%b %d").to_string()
        }
    }
}

/// Authoritative engagement values from a server response.
///
/// Only the fields that are `Some` are written; everything else on the item
/// is left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementPatch {
    /// New favorited flag
    pub favorited: Option<bool>,
    /// New favorite count
    pub favorite_count: Option<u64>,
    /// New reposted flag
    pub reposted: Option<bool>,
    /// New repost count
    pub repost_count: Option<u64>,
}

impl EngagementPatch {
    /// Patch a single (flag, count) pair for one kind
    pub const fn for_kind(kind: EngagementKind, active: bool, count: u64) -> Self {
        match kind {
            EngagementKind::Favorite => Self {
                favorited: Some(active),
                favorite_count: Some(count),
                reposted: None,
                repost_count: None,
            },
            EngagementKind::Repost => Self {
                favorited: None,
                favorite_count: None,
                reposted: Some(active),
                repost_count: Some(count),
            },
        }
    }

    /// Write the patch into an item, keeping the viewer's actor-set
    /// membership in step with the flags
    pub fn apply(&self, item: &mut Item, viewer_id: Option<&str>) {
        if let Some(favorited) = self.favorited {
            item.favorited = favorited;
            if let Some(viewer) = viewer_id {
                set_membership(&mut item.favorited_by, viewer, favorited);
            }
        }
        if let Some(count) = self.favorite_count {
            item.favorite_count = count;
        }
        if let Some(reposted) = self.reposted {
            item.reposted = reposted;
            if let Some(viewer) = viewer_id {
                set_membership(&mut item.reposted_by, viewer, reposted);
            }
        }
        if let Some(count) = self.repost_count {
            item.repost_count = count;
        }
    }
}

fn set_membership(set: &mut BTreeSet<String>, viewer: &str, present: bool) {
    if present {
        set.insert(viewer.to_string());
    } else {
        set.remove(viewer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_viewer_state() {
        let mut item = Item::new("t1");
        item.favorited_by.insert("me".to_string());
        item.reposted = true;

        item.sync_viewer_state("me");
        assert!(item.favorited);
        assert!(!item.reposted);
    }

    #[test]
    fn test_patch_touches_only_engagement() {
        let mut item = Item::new("t1");
        item.text = "hello".to_string();
        item.reply_count = 3;
        item.favorite_count = 5;

        EngagementPatch::for_kind(EngagementKind::Favorite, true, 9).apply(&mut item, Some("me"));

        assert_eq!(item.engagement(EngagementKind::Favorite), (true, 9));
        assert!(item.favorited_by.contains("me"));
        assert_eq!(item.text, "hello");
        assert_eq!(item.reply_count, 3);
        assert_eq!(item.engagement(EngagementKind::Repost), (false, 0));
    }

    #[test]
    fn test_patch_removes_viewer_from_set() {
        let mut item = Item::new("t1");
        item.reposted_by.insert("me".to_string());
        item.reposted_by.insert("other".to_string());

        EngagementPatch::for_kind(EngagementKind::Repost, false, 1).apply(&mut item, Some("me"));

        assert!(!item.reposted);
        assert_eq!(item.reposted_by.len(), 1);
        assert!(item.reposted_by.contains("other"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let mut item = Item::new("t1");
        item.text = "héllo wörld, this is long".to_string();
        assert_eq!(item.preview(8), "héllo...");
        assert_eq!(item.preview(100), "héllo wörld, this is long");
    }
}
