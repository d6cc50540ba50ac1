//! Reply thread and item detail state

use crate::models::{EngagementKind, EngagementPatch, Item, PageMeta};
use crate::mutation::EngagementTarget;
use crate::session::SessionWatch;

use super::cursor::{PageCursor, PageRequest, Rejection};
use super::list::ItemList;

/// Replies to one parent item, newest first.
///
/// Same replace/append/cursor rules as the feed window, but incoming replies
/// are always prepended immediately; there is no pending-arrivals buffer.
#[derive(Debug)]
pub struct ReplyThread {
    parent_id: String,
    replies: ItemList,
    cursor: PageCursor,
    viewer: Option<String>,
    session: Option<SessionWatch>,
}

impl ReplyThread {
    /// Empty thread for a parent
    pub fn new(parent_id: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            replies: ItemList::new(),
            cursor: PageCursor::new(),
            viewer: None,
            session: None,
        }
    }

    /// Empty thread that clears itself when the session changes
    pub fn with_session(parent_id: &str, session: SessionWatch) -> Self {
        let viewer = session.current().user_id().map(str::to_string);
        Self {
            viewer,
            session: Some(session),
            ..Self::new(parent_id)
        }
    }

    /// Clear everything if the session changed since the last operation
    pub fn sync_session(&mut self) {
        if let Some(change) = self.session.as_mut().and_then(SessionWatch::take_change) {
            self.viewer = change.user_id().map(str::to_string);
            self.replies.clear();
            self.cursor.clear();
        }
    }

    /// Identifier of the parent item
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// Loaded replies
    pub fn items(&self) -> &[Item] {
        self.replies.as_slice()
    }

    /// Look up a reply
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.replies.get(id)
    }

    /// Whether older replies remain
    pub const fn has_more(&self) -> bool {
        self.cursor.has_more()
    }

    /// Whether a load-more is outstanding
    pub const fn is_loading_more(&self) -> bool {
        self.cursor.is_loading_more()
    }

    /// Current page number
    pub const fn current_page(&self) -> u32 {
        self.cursor.page()
    }

    /// Replace all replies with page 1
    pub fn replace(&mut self, items: Vec<Item>, meta: PageMeta) {
        self.sync_session();
        self.replies.replace_all(items);
        self.cursor.reset(meta);
    }

    /// Start loading the next page of replies
    pub fn begin_append(&mut self) -> Option<PageRequest> {
        self.sync_session();
        self.cursor.begin_next()
    }

    /// Apply a load-more response
    pub fn append_page(
        &mut self,
        request: PageRequest,
        items: Vec<Item>,
        meta: PageMeta,
    ) -> Result<usize, Rejection> {
        self.sync_session();
        self.cursor.finish(request, meta)?;
        Ok(self.replies.append(items))
    }

    /// Release the load-more flag after a failed request
    pub fn append_failed(&mut self, request: PageRequest) {
        self.cursor.fail(request);
    }

    /// Prepend new replies. Items replying to a different parent are
    /// ignored. Returns how many were added.
    pub fn merge_incoming(&mut self, items: Vec<Item>) -> usize {
        self.sync_session();

        let parent = self.parent_id.as_str();
        let ours: Vec<Item> = items
            .into_iter()
            .filter(|item| item.reply_to.as_deref() == Some(parent))
            .collect();
        self.replies.prepend(ours)
    }

    /// Overwrite engagement fields on a reply
    pub fn apply_mutation_result(&mut self, id: &str, patch: EngagementPatch) -> bool {
        self.sync_session();
        match self.replies.get_mut(id) {
            Some(item) => {
                patch.apply(item, self.viewer.as_deref());
                true
            }
            None => false,
        }
    }
}

impl EngagementTarget for ReplyThread {
    fn engagement(&self, id: &str, kind: EngagementKind) -> Option<(bool, u64)> {
        self.get(id).map(|item| item.engagement(kind))
    }

    fn apply_engagement(&mut self, id: &str, patch: EngagementPatch) -> bool {
        self.apply_mutation_result(id, patch)
    }
}

/// A focused item and its reply thread
#[derive(Debug)]
pub struct ItemDetail {
    item: Option<Item>,
    viewer: Option<String>,
    session: Option<SessionWatch>,
    /// Replies to the focused item
    pub thread: ReplyThread,
}

impl ItemDetail {
    /// Detail view for an item that has not been fetched yet
    pub fn new(item_id: &str) -> Self {
        Self {
            item: None,
            viewer: None,
            session: None,
            thread: ReplyThread::new(item_id),
        }
    }

    /// Detail view bound to a session; the focused item and the thread are
    /// dropped whenever the session changes
    pub fn with_session(item_id: &str, session: SessionWatch) -> Self {
        let viewer = session.current().user_id().map(str::to_string);
        Self {
            item: None,
            viewer,
            thread: ReplyThread::with_session(item_id, session.clone()),
            session: Some(session),
        }
    }

    /// Drop the focused item and replies if the session changed
    pub fn sync_session(&mut self) {
        if let Some(change) = self.session.as_mut().and_then(SessionWatch::take_change) {
            tracing::debug!("Session changed, clearing detail of {}", self.thread.parent_id());
            self.viewer = change.user_id().map(str::to_string);
            self.item = None;
        }
        self.thread.sync_session();
    }

    /// The focused item, once loaded
    pub const fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    /// Replace the focused item with a fresh copy
    pub fn apply_item(&mut self, mut fresh: Item) {
        self.sync_session();
        if fresh.id != self.thread.parent_id() {
            tracing::debug!("Ignoring item {} for detail of {}", fresh.id, self.thread.parent_id());
            return;
        }
        if let Some(viewer) = &self.viewer
            && (!fresh.favorited_by.is_empty() || !fresh.reposted_by.is_empty())
        {
            fresh.sync_viewer_state(viewer);
        }
        self.item = Some(fresh);
    }

    /// A reply was just posted to this item: bump the visible reply count
    /// and prepend it to the thread
    pub fn add_reply(&mut self, reply: Item) {
        self.sync_session();
        if self.thread.merge_incoming(vec![reply]) > 0
            && let Some(item) = &mut self.item
        {
            item.reply_count += 1;
        }
    }
}

impl EngagementTarget for ItemDetail {
    fn engagement(&self, id: &str, kind: EngagementKind) -> Option<(bool, u64)> {
        match &self.item {
            Some(item) if item.id == id => Some(item.engagement(kind)),
            _ => self.thread.engagement(id, kind),
        }
    }

    fn apply_engagement(&mut self, id: &str, patch: EngagementPatch) -> bool {
        self.sync_session();
        match &mut self.item {
            Some(item) if item.id == id => {
                patch.apply(item, self.viewer.as_deref());
                true
            }
            _ => self.thread.apply_engagement(id, patch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ToggleOutcome;
    use crate::error::ApiError;
    use crate::mutation::MutationController;

    fn reply(id: &str, parent: &str) -> Item {
        let mut item = Item::new(id);
        item.reply_to = Some(parent.to_string());
        item
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_replies_paginate_like_feed() {
        let mut thread = ReplyThread::new("p");
        thread.replace(vec![reply("r1", "p"), reply("r2", "p")], PageMeta::new(1, 2));
        assert!(thread.has_more());

        let req = thread.begin_append().unwrap();
        assert!(thread.begin_append().is_none());
        assert_eq!(
            thread.append_page(req, vec![reply("r2", "p"), reply("r3", "p")], PageMeta::new(2, 2)),
            Ok(1)
        );
        assert_eq!(ids(thread.items()), vec!["r1", "r2", "r3"]);
        assert!(!thread.has_more());
    }

    #[test]
    fn test_wrong_page_discarded() {
        let mut thread = ReplyThread::new("p");
        thread.replace(vec![reply("r1", "p")], PageMeta::new(1, 5));
        let req = thread.begin_append().unwrap();
        assert!(thread.append_page(req, vec![reply("x", "p")], PageMeta::new(4, 5)).is_err());
        assert_eq!(ids(thread.items()), vec!["r1"]);
        assert_eq!(thread.current_page(), 1);
        assert!(thread.has_more());
    }

    #[test]
    fn test_incoming_prepends_only_own_replies() {
        let mut thread = ReplyThread::new("p");
        thread.replace(vec![reply("r1", "p")], PageMeta::single());

        let added = thread.merge_incoming(vec![
            reply("r2", "p"),
            reply("other", "q"),
            Item::new("top-level"),
            reply("r1", "p"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(ids(thread.items()), vec!["r2", "r1"]);
    }

    #[test]
    fn test_detail_toggle_on_focused_item_and_reply() {
        let mut detail = ItemDetail::new("p");
        let mut focused = Item::new("p");
        focused.repost_count = 2;
        detail.apply_item(focused);
        detail.thread.replace(vec![reply("r1", "p")], PageMeta::single());

        let mut controller = MutationController::new();
        let t1 = controller
            .begin(&mut detail, "p", EngagementKind::Repost)
            .unwrap();
        let t2 = controller
            .begin(&mut detail, "r1", EngagementKind::Favorite)
            .unwrap();
        assert_eq!(detail.engagement("p", EngagementKind::Repost), Some((true, 3)));
        assert_eq!(detail.engagement("r1", EngagementKind::Favorite), Some((true, 1)));

        controller.resolve(&mut detail, &t1, Ok(ToggleOutcome { active: true, count: 3 }));
        controller.resolve(&mut detail, &t2, Err(ApiError::Malformed("no count".to_string())));
        assert_eq!(detail.engagement("p", EngagementKind::Repost), Some((true, 3)));
        assert_eq!(detail.engagement("r1", EngagementKind::Favorite), Some((false, 0)));
    }

    #[test]
    fn test_apply_item_ignores_other_ids() {
        let mut detail = ItemDetail::new("p");
        detail.apply_item(Item::new("q"));
        assert!(detail.item().is_none());
    }

    #[test]
    fn test_session_change_clears_focused_item_and_viewer() {
        use crate::session::{Identity, Session};

        let session = Session::new();
        session.open(Identity::new("alice", "t"));
        let mut detail = ItemDetail::with_session("p", session.subscribe());

        let mut focused = Item::new("p");
        focused.favorited_by.insert("alice".to_string());
        detail.apply_item(focused.clone());
        detail.thread.replace(vec![reply("r1", "p")], PageMeta::single());
        assert!(detail.item().unwrap().favorited);

        session.open(Identity::new("bob", "t"));
        detail.sync_session();
        assert!(detail.item().is_none());
        assert!(detail.thread.items().is_empty());

        // Viewer state is now derived for the new user
        detail.apply_item(focused);
        assert!(!detail.item().unwrap().favorited);
    }

    #[test]
    fn test_add_reply_bumps_count() {
        let mut detail = ItemDetail::new("p");
        detail.apply_item(Item::new("p"));
        detail.add_reply(reply("r1", "p"));
        detail.add_reply(reply("r1", "p"));
        assert_eq!(detail.item().unwrap().reply_count, 1);
        assert_eq!(detail.thread.items().len(), 1);
    }
}
