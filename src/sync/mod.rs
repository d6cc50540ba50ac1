//! Feed sync driver
//!
//! [`FeedSync`] owns the feed window and the mutation controller. Network work
//! runs on spawned tokio tasks that report back as [`SyncEvent`]s over one
//! mpsc channel; the owner applies them one at a time with [`FeedSync::step`]
//! (or [`FeedSync::handle`]), so store mutations never interleave.
//!
//! Every event carries the session generation it was started under. Events
//! from an older session are dropped, as are refresh results superseded by a
//! newer refresh. Live notifications land in a [`NotificationInbox`] that is
//! emptied with the rest of the state on session change.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{FeedApi, Page, ToggleOutcome};
use crate::cache::FeedCache;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{EngagementKind, FeedType, Item};
use crate::mutation::{MutationController, MutationState, PendingMutation, Resolution};
use crate::notifications::{Notification, NotificationInbox};
use crate::session::{Session, SessionState};
use crate::store::{FeedStore, MergeOutcome, PageRequest};

const CHANNEL_CAPACITY: usize = 64;

/// Results delivered to the driver by background tasks
#[derive(Debug)]
pub enum SyncEvent {
    /// Page 1 fetched for a full replace
    Refreshed {
        /// Session generation at request time
        session: u64,
        /// Refresh sequence number
        seq: u64,
        /// Feed requested
        feed: FeedType,
        /// Fetch result
        result: ApiResult<Page>,
    },
    /// Load-more response
    PageLoaded {
        /// Session generation at request time
        session: u64,
        /// Feed requested
        feed: FeedType,
        /// Ticket handed out by the cursor
        request: PageRequest,
        /// Fetch result
        result: ApiResult<Page>,
    },
    /// Periodic page-1 poll
    Polled {
        /// Session generation at request time
        session: u64,
        /// Feed polled
        feed: FeedType,
        /// Newest-first items
        items: Vec<Item>,
    },
    /// Items delivered by the live channel
    Pushed {
        /// Session generation the connection belongs to
        session: u64,
        /// Newest-first items
        items: Vec<Item>,
    },
    /// Server answered an engagement toggle
    MutationSettled {
        /// Session generation at request time
        session: u64,
        /// Ticket from the mutation controller
        ticket: PendingMutation,
        /// Toggle result
        result: ApiResult<ToggleOutcome>,
    },
    /// Notification delivered by the live channel
    Notified {
        /// Session generation the connection belongs to
        session: u64,
        /// Decoded notification
        notification: Notification,
    },
    /// Server answered a compose request
    Posted {
        /// Session generation at request time
        session: u64,
        /// Create result
        result: ApiResult<Item>,
    },
    /// Session opened, closed or expired
    SessionChanged(SessionState),
}

/// What applying an event changed
#[derive(Debug)]
pub enum SyncUpdate {
    /// Window replaced by a refresh
    Replaced {
        /// Items now visible
        count: usize,
    },
    /// Older page appended
    Appended {
        /// Items added
        count: usize,
    },
    /// Poll or push merged
    Merged(MergeOutcome),
    /// Engagement toggle settled
    Mutation {
        /// Target item
        item_id: String,
        /// Which toggle
        kind: EngagementKind,
        /// Outcome
        resolution: Resolution,
    },
    /// A new notification arrived
    Notified {
        /// Unread counter after the arrival
        unread: usize,
    },
    /// Compose succeeded
    Posted(Item),
    /// A read or compose failed; visible state is unchanged
    Failed(ApiError),
    /// Session changed and local state was reset
    SessionReset {
        /// Whether a user is signed in now
        signed_in: bool,
    },
}

/// Driver tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    /// Items per page
    pub page_limit: u32,
    /// Poll period, `None` to disable polling
    pub poll_interval: Option<Duration>,
    /// Age after which `on_activate` refreshes
    pub stale_after: Duration,
    /// Scroll offset counted as "at the top"
    pub top_threshold: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_limit: config.page_limit,
            poll_interval: config.poll_interval(),
            stale_after: config.stale_after(),
            top_threshold: config.top_threshold,
        }
    }
}

/// Single-owner feed sync loop
pub struct FeedSync<A: FeedApi> {
    api: Arc<A>,
    session: Session,
    store: FeedStore,
    mutations: MutationController,
    inbox: NotificationInbox,
    cache: Option<FeedCache>,
    settings: SyncSettings,
    tx: mpsc::Sender<SyncEvent>,
    rx: mpsc::Receiver<SyncEvent>,
    refresh_seq: u64,
    last_refresh: Option<Instant>,
    poller: Option<JoinHandle<()>>,
    session_task: Option<JoinHandle<()>>,
}

impl<A: FeedApi> FeedSync<A> {
    /// Create a driver for a feed
    pub fn new(api: Arc<A>, session: Session, feed: FeedType, settings: SyncSettings) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            store: FeedStore::with_session(feed, settings.top_threshold, session.subscribe()),
            mutations: MutationController::with_session(session.subscribe()),
            inbox: NotificationInbox::with_session(session.subscribe()),
            api,
            session,
            cache: None,
            settings,
            tx,
            rx,
            refresh_seq: 0,
            last_refresh: None,
            poller: None,
            session_task: None,
        }
    }

    /// Persist refreshed windows and seed cold starts from a cache
    #[must_use]
    pub fn with_cache(mut self, cache: FeedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Feed window state
    pub const fn store(&self) -> &FeedStore {
        &self.store
    }

    /// Live notifications received this session
    pub const fn inbox(&self) -> &NotificationInbox {
        &self.inbox
    }

    /// Reset the unread notification counter
    pub const fn clear_unread(&mut self) {
        self.inbox.clear_unread();
    }

    /// Empty the new-notification list
    pub fn clear_new_notifications(&mut self) {
        self.inbox.clear_new();
    }

    /// Sender for background producers such as the live channel
    pub fn sender(&self) -> mpsc::Sender<SyncEvent> {
        self.tx.clone()
    }

    /// Whether a toggle on an item is waiting for the server
    pub fn mutation_state(&mut self, item_id: &str, kind: EngagementKind) -> MutationState {
        self.mutations.state(item_id, kind)
    }

    /// Whether the poller task is running
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Fetch page 1 and replace the window when it arrives
    pub fn refresh(&mut self) {
        self.refresh_seq += 1;

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let session = self.session.generation();
        let seq = self.refresh_seq;
        let feed = self.store.feed_type();
        let limit = self.settings.page_limit;

        tokio::spawn(async move {
            let result = api.feed_page(feed, 1, limit).await;
            let _ = tx
                .send(SyncEvent::Refreshed {
                    session,
                    seq,
                    feed,
                    result,
                })
                .await;
        });
    }

    /// Fetch the next older page. Returns `false` if a load-more is already
    /// outstanding or the feed is exhausted.
    pub fn load_more(&mut self) -> bool {
        let Some(request) = self.store.begin_append() else {
            return false;
        };

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let session = self.session.generation();
        let feed = self.store.feed_type();
        let limit = self.settings.page_limit;

        tokio::spawn(async move {
            let result = api.feed_page(feed, request.page(), limit).await;
            let _ = tx
                .send(SyncEvent::PageLoaded {
                    session,
                    feed,
                    request,
                    result,
                })
                .await;
        });
        true
    }

    /// Toggle an engagement optimistically. Returns `false` if the toggle was
    /// ignored (already pending, or item not loaded).
    pub fn toggle(&mut self, item_id: &str, kind: EngagementKind) -> bool {
        let Some(ticket) = self.mutations.begin(&mut self.store, item_id, kind) else {
            return false;
        };

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let session = self.session.generation();

        tokio::spawn(async move {
            let result = api.toggle(&ticket.item_id, ticket.kind).await;
            let _ = tx
                .send(SyncEvent::MutationSettled {
                    session,
                    ticket,
                    result,
                })
                .await;
        });
        true
    }

    /// Post a new item, optionally as a reply
    pub fn compose(&mut self, text: &str, reply_to: Option<&str>) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let session = self.session.generation();
        let text = text.to_string();
        let reply_to = reply_to.map(str::to_string);

        tokio::spawn(async move {
            let result = api.create_item(&text, reply_to.as_deref()).await;
            let _ = tx.send(SyncEvent::Posted { session, result }).await;
        });
    }

    /// The feed became visible: seed from cache, refresh if stale, and make
    /// sure the poller and session watcher are running
    pub fn on_activate(&mut self) {
        self.seed_from_cache();

        let stale = self
            .last_refresh
            .is_none_or(|at| at.elapsed() >= self.settings.stale_after);
        if stale {
            tracing::debug!("Feed is stale, refreshing");
            self.refresh();
        }

        if !self.is_polling() {
            self.start_poller();
        }
        self.watch_session();
    }

    /// The feed is no longer visible. State is kept as is.
    pub fn on_deactivate(&mut self) {
        tracing::trace!("Feed deactivated");
    }

    /// Record the list's scroll offset
    pub const fn set_scroll_offset(&mut self, offset: f64) {
        self.store.set_scroll_offset(offset);
    }

    /// Show staged arrivals
    pub fn release_pending(&mut self) -> usize {
        self.store.release_pending()
    }

    /// Switch feeds: clears the window, restarts polling and refreshes
    pub fn set_feed_type(&mut self, feed: FeedType) {
        if feed == self.store.feed_type() {
            return;
        }

        self.store.set_feed_type(feed);
        self.last_refresh = None;
        if self.is_polling() {
            self.start_poller();
        }
        self.refresh();
    }

    /// Start (or restart) the fixed-interval page-1 poller
    pub fn start_poller(&mut self) {
        self.stop_poller();

        let Some(period) = self.settings.poll_interval else {
            return;
        };

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let session = self.session.clone();
        let feed = self.store.feed_type();
        let limit = self.settings.page_limit;

        self.poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let generation = session.generation();
                let items = match api.feed_page(feed, 1, limit).await {
                    Ok(page) => page.items,
                    Err(e) => {
                        tracing::warn!("Poll failed: {e}");
                        continue;
                    }
                };

                let event = SyncEvent::Polled {
                    session: generation,
                    feed,
                    items,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Stop the poller, if running
    pub fn stop_poller(&mut self) {
        if let Some(task) = self.poller.take() {
            task.abort();
        }
    }

    fn watch_session(&mut self) {
        if self.session_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut watch = self.session.subscribe();
        let tx = self.tx.clone();
        self.session_task = Some(tokio::spawn(async move {
            while let Some(state) = watch.changed().await {
                if tx.send(SyncEvent::SessionChanged(state)).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn seed_from_cache(&mut self) {
        if !self.store.items().is_empty() {
            return;
        }
        let Some(cache) = &self.cache else {
            return;
        };

        match cache.load_window(self.store.feed_type(), self.settings.page_limit as usize) {
            Ok(items) => {
                if self.store.seed(items) {
                    tracing::debug!("Seeded feed from cache");
                }
            }
            Err(e) => tracing::warn!("Failed to read feed cache: {e}"),
        }
    }

    fn save_to_cache(&self) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.save_window(self.store.feed_type(), self.store.items())
        {
            tracing::warn!("Failed to write feed cache: {e}");
        }
    }

    fn is_current(&self, session: u64) -> bool {
        let current = self.session.generation() == session;
        if !current {
            tracing::debug!("Dropping result from an earlier session");
        }
        current
    }

    /// Wait for the next event and apply it. Events that change nothing are
    /// skipped. Returns `None` only if the channel closes.
    pub async fn step(&mut self) -> Option<SyncUpdate> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(update) = self.handle(event) {
                return Some(update);
            }
        }
    }

    /// Apply one event to the store
    pub fn handle(&mut self, event: SyncEvent) -> Option<SyncUpdate> {
        match event {
            SyncEvent::Refreshed {
                session,
                seq,
                feed,
                result,
            } => {
                if !self.is_current(session) || seq != self.refresh_seq || feed != self.store.feed_type() {
                    return None;
                }

                match result {
                    Ok(page) => {
                        self.store.replace(page.items, page.meta);
                        self.last_refresh = Some(Instant::now());
                        self.save_to_cache();
                        Some(SyncUpdate::Replaced {
                            count: self.store.items().len(),
                        })
                    }
                    Err(e) => {
                        tracing::warn!("Refresh failed: {e}");
                        Some(SyncUpdate::Failed(e))
                    }
                }
            }

            SyncEvent::PageLoaded {
                session,
                feed,
                request,
                result,
            } => {
                if !self.is_current(session) || feed != self.store.feed_type() {
                    return None;
                }

                match result {
                    Ok(page) => self
                        .store
                        .append_page(request, page.items, page.meta)
                        .ok()
                        .map(|count| SyncUpdate::Appended { count }),
                    Err(e) => {
                        tracing::warn!("Loading page {} failed: {e}", request.page());
                        self.store.append_failed(request);
                        Some(SyncUpdate::Failed(e))
                    }
                }
            }

            SyncEvent::Polled {
                session,
                feed,
                items,
            } => {
                if !self.is_current(session) || feed != self.store.feed_type() {
                    return None;
                }
                Some(SyncUpdate::Merged(self.store.merge_incoming(items)))
            }

            SyncEvent::Pushed { session, items } => {
                if !self.is_current(session) {
                    return None;
                }
                Some(SyncUpdate::Merged(self.store.merge_incoming(items)))
            }

            SyncEvent::MutationSettled {
                session: _,
                ticket,
                result,
            } => {
                // Tickets from an earlier session were already forgotten by
                // the controller and resolve as `Dropped`
                match self.mutations.resolve(&mut self.store, &ticket, result) {
                    Resolution::Dropped => None,
                    resolution => Some(SyncUpdate::Mutation {
                        item_id: ticket.item_id,
                        kind: ticket.kind,
                        resolution,
                    }),
                }
            }

            SyncEvent::Notified {
                session,
                notification,
            } => {
                if !self.is_current(session) || !self.inbox.push(notification) {
                    return None;
                }
                Some(SyncUpdate::Notified {
                    unread: self.inbox.unread_count(),
                })
            }

            SyncEvent::Posted { session, result } => {
                if !self.is_current(session) {
                    return None;
                }

                match result {
                    Ok(item) => {
                        if !item.is_reply() {
                            self.store.merge_incoming(vec![item.clone()]);
                        }
                        Some(SyncUpdate::Posted(item))
                    }
                    Err(e) => {
                        tracing::warn!("Post failed: {e}");
                        Some(SyncUpdate::Failed(e))
                    }
                }
            }

            SyncEvent::SessionChanged(state) => {
                self.store.sync_session();
                self.mutations.sync_session();
                self.inbox.sync_session();
                self.refresh_seq += 1;
                self.last_refresh = None;

                let signed_in = state.identity.is_some();
                if !signed_in
                    && let Some(cache) = &self.cache
                    && let Err(e) = cache.clear()
                {
                    tracing::warn!("Failed to clear feed cache: {e}");
                }
                Some(SyncUpdate::SessionReset { signed_in })
            }
        }
    }
}

impl<A: FeedApi> Drop for FeedSync<A> {
    fn drop(&mut self) {
        self.stop_poller();
        if let Some(task) = self.session_task.take() {
            task.abort();
        }
    }
}
