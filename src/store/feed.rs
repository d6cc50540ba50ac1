//! Feed window store
//!
//! Owns the visible, newest-first, identifier-unique item sequence for the
//! main feed, its pagination cursor, and the pending-arrivals buffer for items
//! pushed while the user is scrolled away from the top.

use crate::models::{EngagementKind, EngagementPatch, FeedType, Item, PageMeta};
use crate::mutation::EngagementTarget;
use crate::session::SessionWatch;

use super::cursor::{PageCursor, PageRequest, Rejection};
use super::list::{ItemList, dedup_batch};

/// What a `merge_incoming` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// New items placed at the head of the window
    pub prepended: usize,
    /// New items held in the pending-arrivals buffer
    pub staged: usize,
    /// Previously staged items flushed into the window below the new ones
    pub released: usize,
    /// Already-known items overwritten with the fresher copy
    pub refreshed: usize,
}

/// The main feed's state
#[derive(Debug)]
pub struct FeedStore {
    feed_type: FeedType,
    window: ItemList,
    pending: ItemList,
    cursor: PageCursor,
    scroll_offset: f64,
    top_threshold: f64,
    viewer: Option<String>,
    session: Option<SessionWatch>,
}

impl FeedStore {
    /// Create an empty store
    pub fn new(feed_type: FeedType, top_threshold: f64) -> Self {
        Self {
            feed_type,
            window: ItemList::new(),
            pending: ItemList::new(),
            cursor: PageCursor::new(),
            scroll_offset: 0.0,
            top_threshold,
            viewer: None,
            session: None,
        }
    }

    /// Create an empty store bound to a session; it clears itself whenever
    /// the session changes
    pub fn with_session(feed_type: FeedType, top_threshold: f64, session: SessionWatch) -> Self {
        let viewer = session.current().user_id().map(str::to_string);
        Self {
            viewer,
            session: Some(session),
            ..Self::new(feed_type, top_threshold)
        }
    }

    /// Clear everything if the session changed since the last operation
    pub fn sync_session(&mut self) {
        let Some(change) = self.session.as_mut().and_then(SessionWatch::take_change) else {
            return;
        };

        tracing::debug!("Session changed, clearing {} feed", self.feed_type.as_query());
        self.viewer = change.user_id().map(str::to_string);
        self.clear();
    }

    /// Drop all items, staged arrivals and cursor state
    pub fn clear(&mut self) {
        self.window.clear();
        self.pending.clear();
        self.cursor.clear();
    }

    /// Which feed this store holds
    pub const fn feed_type(&self) -> FeedType {
        self.feed_type
    }

    /// Switch to another feed; the window is cleared
    pub fn set_feed_type(&mut self, feed_type: FeedType) {
        if self.feed_type != feed_type {
            self.feed_type = feed_type;
            self.clear();
        }
    }

    /// Visible items, newest first
    pub fn items(&self) -> &[Item] {
        self.window.as_slice()
    }

    /// Look up a visible or staged item
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.window.get(id).or_else(|| self.pending.get(id))
    }

    /// Number of staged arrivals (the "new items" counter)
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Staged arrivals, newest first
    pub fn pending_items(&self) -> &[Item] {
        self.pending.as_slice()
    }

    /// Current page number
    pub const fn current_page(&self) -> u32 {
        self.cursor.page()
    }

    /// Whether older pages remain
    pub const fn has_more(&self) -> bool {
        self.cursor.has_more()
    }

    /// Whether a load-more is outstanding
    pub const fn is_loading_more(&self) -> bool {
        self.cursor.is_loading_more()
    }

    /// Record the list's scroll offset
    pub const fn set_scroll_offset(&mut self, offset: f64) {
        self.scroll_offset = offset;
    }

    /// Whether the user is at the top of the list
    pub fn is_at_top(&self) -> bool {
        self.scroll_offset <= self.top_threshold
    }

    /// Replace the window (initial load, pull-to-refresh). Resets the cursor
    /// to page 1 and clears staged arrivals.
    pub fn replace(&mut self, items: Vec<Item>, meta: PageMeta) {
        self.sync_session();
        self.window.replace_all(items);
        self.pending.clear();
        self.cursor.reset(meta);
    }

    /// Show cached items while the first fetch is outstanding. Only applies
    /// to an empty window; pagination stays disabled until a real `replace`.
    pub fn seed(&mut self, items: Vec<Item>) -> bool {
        self.sync_session();
        if !self.window.is_empty() || items.is_empty() {
            return false;
        }
        self.window.replace_all(items);
        true
    }

    /// Start a load-more. `None` if one is already outstanding or the feed
    /// is exhausted.
    pub fn begin_append(&mut self) -> Option<PageRequest> {
        self.sync_session();
        self.cursor.begin_next()
    }

    /// Apply a load-more response. Returns how many items were appended; a
    /// stale or mismatched response is discarded entirely.
    pub fn append_page(
        &mut self,
        request: PageRequest,
        items: Vec<Item>,
        meta: PageMeta,
    ) -> Result<usize, Rejection> {
        self.sync_session();

        if let Err(rejection) = self.cursor.finish(request, meta) {
            tracing::debug!("Discarding page {}: {:?}", request.page(), rejection);
            return Err(rejection);
        }
        Ok(self.window.append(items))
    }

    /// Release the load-more flag after a failed request
    pub fn append_failed(&mut self, request: PageRequest) {
        self.cursor.fail(request);
    }

    /// Merge newest-first items from a poll or push.
    ///
    /// Known items are refreshed in place wherever they are. New items are
    /// prepended when the user is at the top, otherwise staged. Anything
    /// still staged is older than the new items, so reaching the top flushes
    /// it first to keep the window newest-first.
    pub fn merge_incoming(&mut self, items: Vec<Item>) -> MergeOutcome {
        self.sync_session();

        let mut outcome = MergeOutcome::default();
        let mut fresh = Vec::new();

        for item in dedup_batch(items) {
            let Err(item) = self.window.overwrite(item) else {
                outcome.refreshed += 1;
                continue;
            };
            match self.pending.overwrite(item) {
                Ok(()) => outcome.refreshed += 1,
                Err(item) => fresh.push(item),
            }
        }

        if fresh.is_empty() {
            return outcome;
        }

        if self.is_at_top() {
            outcome.released = self.release_pending();
            outcome.prepended = self.window.prepend(fresh);
        } else {
            outcome.staged = self.pending.prepend(fresh);
            tracing::debug!("{} new item(s) waiting above", self.pending.len());
        }
        outcome
    }

    /// Move every staged arrival to the head of the window. Returns how many
    /// were added.
    pub fn release_pending(&mut self) -> usize {
        self.sync_session();
        let staged = self.pending.take_all();
        self.window.prepend(staged)
    }

    /// Overwrite engagement fields on an item with authoritative values.
    /// No-op if the item is not loaded.
    pub fn apply_mutation_result(&mut self, id: &str, patch: EngagementPatch) -> bool {
        self.sync_session();

        let viewer = self.viewer.as_deref();
        if let Some(item) = self.window.get_mut(id) {
            patch.apply(item, viewer);
            true
        } else if let Some(item) = self.pending.get_mut(id) {
            patch.apply(item, viewer);
            true
        } else {
            false
        }
    }
}

impl EngagementTarget for FeedStore {
    fn engagement(&self, id: &str, kind: EngagementKind) -> Option<(bool, u64)> {
        self.get(id).map(|item| item.engagement(kind))
    }

    fn apply_engagement(&mut self, id: &str, patch: EngagementPatch) -> bool {
        self.apply_mutation_result(id, patch)
    }
}
