//! Notifications
//!
//! Two sources: the external push SDK, which the core only links/unlinks on
//! login/logout and whose tapped payloads become deep links, and `notification`
//! events on the live channel, which feed a per-session [`NotificationInbox`]
//! (unread counter plus newest-first list). Notifications never touch feed
//! state.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::session::SessionWatch;

/// Sink side of the push-notification SDK
pub trait PushSdk: Send + Sync {
    /// Associate the device with a user (called on login)
    fn link_external_id(&self, user_id: &str);

    /// Remove the device/user association (called on logout)
    fn unlink_external_id(&self);
}

/// `PushSdk` that only logs; used when no SDK is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPushSdk;

impl PushSdk for TracingPushSdk {
    fn link_external_id(&self, user_id: &str) {
        tracing::debug!("Push SDK: link external id {user_id}");
    }

    fn unlink_external_id(&self) {
        tracing::debug!("Push SDK: unlink external id");
    }
}

/// Notification type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Someone favorited the user's item
    #[serde(alias = "like")]
    Favorite,
    /// Someone reposted the user's item
    #[serde(alias = "retweet")]
    Repost,
    /// Someone followed the user
    Follow,
    /// Someone replied to the user's item
    Reply,
    /// Anything else the server may send
    #[default]
    #[serde(other)]
    Unknown,
}

/// Payload attached to a tapped notification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Notification type
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Related item
    #[serde(default, alias = "tweetId")]
    pub item_id: Option<String>,
    /// Related user
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Navigation target derived from a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    /// Open the item detail screen
    Item(String),
    /// Open a user profile
    Profile(String),
}

impl NotificationEvent {
    /// Resolve the navigation target, if the payload carries one
    pub fn deep_link(&self) -> Option<DeepLink> {
        match self.kind {
            NotificationKind::Favorite | NotificationKind::Repost | NotificationKind::Reply => {
                self.item_id.clone().map(DeepLink::Item)
            }
            NotificationKind::Follow => self.user_id.clone().map(DeepLink::Profile),
            NotificationKind::Unknown => None,
        }
    }
}

/// Routes tapped notifications to deep links.
///
/// A notification tapped before navigation is ready is held (the latest one
/// wins) and delivered by [`NotificationRouter::set_ready`].
#[derive(Debug, Default)]
pub struct NotificationRouter {
    ready: bool,
    pending: Option<NotificationEvent>,
}

impl NotificationRouter {
    /// Create a router that is not yet ready
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a decoded notification
    pub fn handle(&mut self, event: NotificationEvent) -> Option<DeepLink> {
        if !self.ready {
            tracing::debug!("Navigation not ready, holding notification");
            self.pending = Some(event);
            return None;
        }

        let link = event.deep_link();
        if link.is_none() {
            tracing::warn!("Ignoring notification without a target: {:?}", event);
        }
        link
    }

    /// Handle a raw JSON payload from the SDK
    pub fn handle_json(&mut self, payload: &serde_json::Value) -> Option<DeepLink> {
        match NotificationEvent::deserialize(payload) {
            Ok(event) => self.handle(event),
            Err(e) => {
                tracing::warn!("Unreadable notification payload: {e}");
                None
            }
        }
    }

    /// Mark navigation as ready and deliver any held notification
    pub fn set_ready(&mut self) -> Option<DeepLink> {
        self.ready = true;
        self.pending.take().and_then(|event| self.handle(event))
    }

    /// Whether a notification is waiting for navigation
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// A notification delivered over the live channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Notification identifier
    pub id: String,
    /// Notification type
    pub kind: NotificationKind,
    /// User who triggered it
    pub actor_id: Option<String>,
    /// Related item
    pub item_id: Option<String>,
    /// Whether the server already marked it read
    pub read: bool,
    /// Creation time, if the payload carried a readable one
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNotification {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: NotificationKind,
    #[serde(default)]
    actor: Option<Value>,
    #[serde(default, alias = "tweet")]
    item: Option<Value>,
    #[serde(default, alias = "tweetId")]
    item_id: Option<String>,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    created_at: Option<String>,
}

/// Identifier of an embedded reference: either the bare id or an object
/// carrying `_id`/`id`
fn reference_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map
            .get("_id")
            .or_else(|| map.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    id.filter(|id| !id.is_empty())
}

impl Notification {
    /// Decode a live-channel payload. `None` when it is unreadable or has no
    /// identifier.
    pub fn from_json(payload: Value) -> Option<Self> {
        let wire = match WireNotification::deserialize(payload) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::debug!("Dropping unreadable notification: {e}");
                return None;
            }
        };
        let Some(id) = wire.id.filter(|id| !id.is_empty()) else {
            tracing::debug!("Dropping notification without identifier");
            return None;
        };

        Some(Self {
            id,
            kind: wire.kind,
            actor_id: wire.actor.as_ref().and_then(reference_id),
            item_id: wire.item_id.or_else(|| wire.item.as_ref().and_then(reference_id)),
            read: wire.read,
            created_at: wire
                .created_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    /// Navigation target for this notification
    pub fn deep_link(&self) -> Option<DeepLink> {
        NotificationEvent {
            kind: self.kind,
            item_id: self.item_id.clone(),
            user_id: self.actor_id.clone(),
        }
        .deep_link()
    }
}

/// Unread counter and newest-first list of live notifications.
///
/// Bound to a session, it empties itself whenever the session changes.
#[derive(Debug, Default)]
pub struct NotificationInbox {
    unread: usize,
    fresh: Vec<Notification>,
    session: Option<SessionWatch>,
}

impl NotificationInbox {
    /// Empty inbox with no session binding
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty inbox that resets on session change
    pub fn with_session(session: SessionWatch) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    /// Reset if the session changed since the last operation
    pub fn sync_session(&mut self) {
        if self.session.as_mut().and_then(SessionWatch::take_change).is_some() {
            self.unread = 0;
            self.fresh.clear();
        }
    }

    /// Record an arrival. A notification already in the list is not counted
    /// again. Returns whether it was new.
    pub fn push(&mut self, notification: Notification) -> bool {
        self.sync_session();
        if self.fresh.iter().any(|n| n.id == notification.id) {
            tracing::debug!("Notification {} already received", notification.id);
            return false;
        }

        self.unread += 1;
        self.fresh.insert(0, notification);
        true
    }

    /// Unread counter
    pub const fn unread_count(&self) -> usize {
        self.unread
    }

    /// Notifications received this session, newest first
    pub fn new_notifications(&self) -> &[Notification] {
        &self.fresh
    }

    /// Reset the unread counter; the list is kept
    pub const fn clear_unread(&mut self) {
        self.unread = 0;
    }

    /// Empty the list; the counter is kept
    pub fn clear_new(&mut self) {
        self.fresh.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_links() {
        let mut router = NotificationRouter::new();
        router.set_ready();

        assert_eq!(
            router.handle_json(&json!({"type": "favorite", "itemId": "t1"})),
            Some(DeepLink::Item("t1".to_string()))
        );
        assert_eq!(
            router.handle_json(&json!({"type": "follow", "userId": "u9"})),
            Some(DeepLink::Profile("u9".to_string()))
        );
        assert_eq!(
            router.handle_json(&json!({"type": "retweet", "tweetId": "t2"})),
            Some(DeepLink::Item("t2".to_string()))
        );
    }

    #[test]
    fn test_incomplete_or_unknown_payloads_ignored() {
        let mut router = NotificationRouter::new();
        router.set_ready();

        assert_eq!(router.handle_json(&json!({"type": "reply"})), None);
        assert_eq!(router.handle_json(&json!({"type": "mention", "itemId": "t1"})), None);
        assert_eq!(router.handle_json(&json!({"itemId": "t1"})), None);
    }

    #[test]
    fn test_held_until_ready() {
        let mut router = NotificationRouter::new();
        assert_eq!(router.handle_json(&json!({"type": "reply", "itemId": "t1"})), None);
        assert!(router.has_pending());

        assert_eq!(router.set_ready(), Some(DeepLink::Item("t1".to_string())));
        assert!(!router.has_pending());
    }

    #[test]
    fn test_live_notification_decoding() {
        let n = Notification::from_json(json!({
            "_id": "n1",
            "type": "like",
            "actor": {"_id": "u2", "username": "bob"},
            "tweet": {"_id": "t1", "text": "hi"},
            "read": false,
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(n.kind, NotificationKind::Favorite);
        assert_eq!(n.actor_id.as_deref(), Some("u2"));
        assert_eq!(n.item_id.as_deref(), Some("t1"));
        assert!(n.created_at.is_some());
        assert_eq!(n.deep_link(), Some(DeepLink::Item("t1".to_string())));

        let follow = Notification::from_json(json!({"_id": "n2", "type": "follow", "actor": "u3"})).unwrap();
        assert_eq!(follow.deep_link(), Some(DeepLink::Profile("u3".to_string())));

        assert!(Notification::from_json(json!({"type": "reply"})).is_none());
        assert!(Notification::from_json(json!("garbage")).is_none());
    }

    fn notification(id: &str) -> Notification {
        Notification::from_json(json!({"_id": id, "type": "reply"})).unwrap()
    }

    #[test]
    fn test_inbox_counts_and_clears() {
        let mut inbox = NotificationInbox::new();
        assert!(inbox.push(notification("n1")));
        assert!(inbox.push(notification("n2")));
        assert!(!inbox.push(notification("n1")));

        assert_eq!(inbox.unread_count(), 2);
        let ids: Vec<&str> = inbox.new_notifications().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n1"]);

        inbox.clear_unread();
        assert_eq!(inbox.unread_count(), 0);
        assert_eq!(inbox.new_notifications().len(), 2);

        inbox.clear_new();
        assert!(inbox.new_notifications().is_empty());
    }

    #[test]
    fn test_inbox_resets_on_session_change() {
        use crate::session::{Identity, Session};

        let session = Session::new();
        session.open(Identity::new("me", "t"));
        let mut inbox = NotificationInbox::with_session(session.subscribe());
        inbox.push(notification("n1"));

        session.close();
        inbox.sync_session();
        assert_eq!(inbox.unread_count(), 0);
        assert!(inbox.new_notifications().is_empty());
    }
}
