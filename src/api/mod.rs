//! HTTP API for the feed backend

mod client;
mod wire;

pub use client::ApiClient;
pub(crate) use wire::decode_item;

use std::future::Future;

use crate::error::ApiResult;
use crate::models::{EngagementKind, FeedType, Item, PageMeta, Profile};

/// One page of a paginated list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Items in server order (newest first)
    pub items: Vec<Item>,
    /// Pagination metadata reported by the server
    pub meta: PageMeta,
}

/// Authoritative result of an engagement toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// Whether the viewer now has the engagement set
    pub active: bool,
    /// Server-side counter after the toggle
    pub count: u64,
}

/// Authoritative result of a follow toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowOutcome {
    /// Whether the viewer now follows the user
    pub following: bool,
    /// Follower count, when the server reports it
    pub follower_count: Option<u64>,
}

/// Backend operations used by the sync core.
///
/// Implemented over HTTP by [`ApiClient`]; tests use in-memory fakes.
pub trait FeedApi: Send + Sync + 'static {
    /// Fetch one page of a feed
    fn feed_page(
        &self,
        feed: FeedType,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = ApiResult<Page>> + Send;

    /// Fetch a single item
    fn item(&self, id: &str) -> impl Future<Output = ApiResult<Item>> + Send;

    /// Fetch one page of replies to an item
    fn replies(
        &self,
        id: &str,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = ApiResult<Page>> + Send;

    /// Create a new item, optionally as a reply
    fn create_item(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> impl Future<Output = ApiResult<Item>> + Send;

    /// Toggle the favorite flag on an item
    fn toggle_favorite(&self, id: &str) -> impl Future<Output = ApiResult<ToggleOutcome>> + Send;

    /// Toggle the repost flag on an item
    fn toggle_repost(&self, id: &str) -> impl Future<Output = ApiResult<ToggleOutcome>> + Send;

    /// Fetch a user profile, including whether the viewer follows them
    fn profile(&self, user_id: &str) -> impl Future<Output = ApiResult<Profile>> + Send;

    /// Toggle following a user
    fn toggle_follow(&self, user_id: &str) -> impl Future<Output = ApiResult<FollowOutcome>> + Send;

    /// Tell the server the session is ending (best effort)
    fn logout(&self) -> impl Future<Output = ApiResult<()>> + Send;

    /// Toggle an engagement of the given kind
    fn toggle(
        &self,
        id: &str,
        kind: EngagementKind,
    ) -> impl Future<Output = ApiResult<ToggleOutcome>> + Send {
        async move {
            match kind {
                EngagementKind::Favorite => self.toggle_favorite(id).await,
                EngagementKind::Repost => self.toggle_repost(id).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl FeedApi for Recorder {
        async fn feed_page(&self, _feed: FeedType, _page: u32, _limit: u32) -> ApiResult<Page> {
            Ok(Page::default())
        }

        async fn item(&self, id: &str) -> ApiResult<Item> {
            Ok(Item::new(id))
        }

        async fn replies(&self, _id: &str, _page: u32, _limit: u32) -> ApiResult<Page> {
            Ok(Page::default())
        }

        async fn create_item(&self, text: &str, _reply_to: Option<&str>) -> ApiResult<Item> {
            Ok(Item::new(text))
        }

        async fn toggle_favorite(&self, id: &str) -> ApiResult<ToggleOutcome> {
            self.0.lock().unwrap().push(format!("favorite:{id}"));
            Ok(ToggleOutcome { active: true, count: 1 })
        }

        async fn toggle_repost(&self, id: &str) -> ApiResult<ToggleOutcome> {
            self.0.lock().unwrap().push(format!("repost:{id}"));
            Ok(ToggleOutcome { active: false, count: 0 })
        }

        async fn profile(&self, user_id: &str) -> ApiResult<Profile> {
            Ok(Profile::new(user_id))
        }

        async fn toggle_follow(&self, user_id: &str) -> ApiResult<FollowOutcome> {
            self.0.lock().unwrap().push(format!("follow:{user_id}"));
            Ok(FollowOutcome {
                following: true,
                follower_count: None,
            })
        }

        async fn logout(&self) -> ApiResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_toggle_dispatches_by_kind() {
        let api = Recorder::default();

        let fav = tokio_test::block_on(api.toggle("a", EngagementKind::Favorite)).unwrap();
        let rep = tokio_test::block_on(api.toggle("b", EngagementKind::Repost)).unwrap();

        assert!(fav.active);
        assert!(!rep.active);
        assert_eq!(*api.0.lock().unwrap(), vec!["favorite:a", "repost:b"]);
    }
}
