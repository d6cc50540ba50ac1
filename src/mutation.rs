//! Optimistic engagement toggles
//!
//! Each (item, kind) pair runs a tiny state machine:
//!
//! ```text
//!   Idle --toggle--> Pending --success--> Confirmed --> Idle
//!                            --failure--> RolledBack --> Idle
//! ```
//!
//! While a pair is `Pending` further toggles on it are ignored. Success adopts
//! the server's flag and count verbatim; any failure restores the snapshot
//! taken at toggle time.
//!
//! Following a user runs the same machine, keyed by user id. The follow
//! endpoint may omit the follower count; the count is then moved by one from
//! the snapshot when the server's flag differs from it.

use std::collections::HashMap;

use crate::api::{FollowOutcome, ToggleOutcome};
use crate::error::ApiError;
use crate::models::{EngagementKind, EngagementPatch};
use crate::session::SessionWatch;

/// Anything holding items whose engagement can be read and patched
pub trait EngagementTarget {
    /// Current (flag, count) for an item, if the item is loaded
    fn engagement(&self, id: &str, kind: EngagementKind) -> Option<(bool, u64)>;

    /// Write engagement fields onto an item. Returns `false` if the item is
    /// not loaded.
    fn apply_engagement(&mut self, id: &str, patch: EngagementPatch) -> bool;
}

/// Anything holding users whose follow state can be read and patched
pub trait FollowTarget {
    /// Current (following, follower count) for a user, if loaded
    fn follow_state(&self, user_id: &str) -> Option<(bool, u64)>;

    /// Write follow fields onto a user. Returns `false` if the user is not
    /// loaded.
    fn apply_follow(&mut self, user_id: &str, following: bool, followers: u64) -> bool;
}

/// Flipped flag and the count moved by one in that direction, never below 0
const fn flip(active: bool, count: u64) -> (bool, u64) {
    if active {
        (false, count.saturating_sub(1))
    } else {
        (true, count.saturating_add(1))
    }
}

/// Per-pair state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Nothing in flight
    Idle,
    /// A toggle is waiting for the server
    Pending,
}

/// An in-flight optimistic toggle. Also serves as the ticket handed back to
/// [`MutationController::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    /// Target item
    pub item_id: String,
    /// Which toggle
    pub kind: EngagementKind,
    /// Flag before the toggle
    pub previous_active: bool,
    /// Count before the toggle
    pub previous_count: u64,
    /// Optimistic flag
    pub next_active: bool,
    /// Optimistic count
    pub next_count: u64,
    seq: u64,
}

/// An in-flight optimistic follow toggle, also the ticket for
/// [`MutationController::resolve_follow`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFollow {
    /// Target user
    pub user_id: String,
    /// Flag before the toggle
    pub previous_following: bool,
    /// Follower count before the toggle
    pub previous_followers: u64,
    /// Optimistic flag
    pub next_following: bool,
    /// Optimistic follower count
    pub next_followers: u64,
    seq: u64,
}

/// How a pending mutation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Server values adopted
    Confirmed {
        /// Authoritative flag
        active: bool,
        /// Authoritative count
        count: u64,
    },
    /// Snapshot restored
    RolledBack {
        /// Restored flag
        active: bool,
        /// Restored count
        count: u64,
    },
    /// The ticket no longer matches anything in flight (session changed)
    Dropped,
}

/// Tracks pending optimistic toggles
#[derive(Debug, Default)]
pub struct MutationController {
    pending: HashMap<(String, EngagementKind), PendingMutation>,
    follows: HashMap<String, PendingFollow>,
    next_seq: u64,
    session: Option<SessionWatch>,
}

impl MutationController {
    /// Create a controller with no session binding
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller that forgets its pending mutations whenever the
    /// session changes
    pub fn with_session(session: SessionWatch) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    /// Drop all pending state if the session changed
    pub fn sync_session(&mut self) {
        let changed = self
            .session
            .as_mut()
            .is_some_and(|watch| watch.take_change().is_some());
        if changed {
            if self.in_flight() > 0 {
                tracing::debug!(
                    "Session changed, forgetting {} pending mutation(s)",
                    self.in_flight()
                );
            }
            self.clear();
        }
    }

    /// Forget every pending mutation
    pub fn clear(&mut self) {
        self.pending.clear();
        self.follows.clear();
    }

    /// State of an (item, kind) pair
    pub fn state(&mut self, item_id: &str, kind: EngagementKind) -> MutationState {
        self.sync_session();
        if self.pending.contains_key(&(item_id.to_string(), kind)) {
            MutationState::Pending
        } else {
            MutationState::Idle
        }
    }

    /// State of a follow toggle on a user
    pub fn follow_state(&mut self, user_id: &str) -> MutationState {
        self.sync_session();
        if self.follows.contains_key(user_id) {
            MutationState::Pending
        } else {
            MutationState::Idle
        }
    }

    /// Number of toggles in flight
    pub fn in_flight(&self) -> usize {
        self.pending.len() + self.follows.len()
    }

    /// Apply a toggle optimistically.
    ///
    /// Returns the ticket to resolve once the server answers, or `None` when
    /// the pair is already pending or the item is not loaded.
    pub fn begin<T: EngagementTarget + ?Sized>(
        &mut self,
        target: &mut T,
        item_id: &str,
        kind: EngagementKind,
    ) -> Option<PendingMutation> {
        self.sync_session();

        let key = (item_id.to_string(), kind);
        if self.pending.contains_key(&key) {
            tracing::debug!("Ignoring {kind} on {item_id}: already pending");
            return None;
        }

        let (active, count) = target.engagement(item_id, kind)?;
        let (next_active, next_count) = flip(active, count);

        target.apply_engagement(
            item_id,
            EngagementPatch::for_kind(kind, next_active, next_count),
        );

        self.next_seq += 1;
        let mutation = PendingMutation {
            item_id: item_id.to_string(),
            kind,
            previous_active: active,
            previous_count: count,
            next_active,
            next_count,
            seq: self.next_seq,
        };
        self.pending.insert(key, mutation.clone());
        Some(mutation)
    }

    /// Settle a pending toggle with the server's answer
    pub fn resolve<T: EngagementTarget + ?Sized>(
        &mut self,
        target: &mut T,
        ticket: &PendingMutation,
        result: Result<ToggleOutcome, ApiError>,
    ) -> Resolution {
        self.sync_session();

        let key = (ticket.item_id.clone(), ticket.kind);
        match self.pending.get(&key) {
            Some(current) if current.seq == ticket.seq => {
                self.pending.remove(&key);
            }
            _ => {
                tracing::debug!(
                    "Dropping stale {} result for {}",
                    ticket.kind,
                    ticket.item_id
                );
                return Resolution::Dropped;
            }
        }

        match result {
            Ok(outcome) => {
                target.apply_engagement(
                    &ticket.item_id,
                    EngagementPatch::for_kind(ticket.kind, outcome.active, outcome.count),
                );
                Resolution::Confirmed {
                    active: outcome.active,
                    count: outcome.count,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "{} on {} failed, rolling back: {e}",
                    ticket.kind,
                    ticket.item_id
                );
                target.apply_engagement(
                    &ticket.item_id,
                    EngagementPatch::for_kind(
                        ticket.kind,
                        ticket.previous_active,
                        ticket.previous_count,
                    ),
                );
                Resolution::RolledBack {
                    active: ticket.previous_active,
                    count: ticket.previous_count,
                }
            }
        }
    }

    /// Apply a follow toggle optimistically. `None` when a follow toggle on
    /// the user is already pending or the user is not loaded.
    pub fn begin_follow<T: FollowTarget + ?Sized>(
        &mut self,
        target: &mut T,
        user_id: &str,
    ) -> Option<PendingFollow> {
        self.sync_session();

        if self.follows.contains_key(user_id) {
            tracing::debug!("Ignoring follow on {user_id}: already pending");
            return None;
        }

        let (following, followers) = target.follow_state(user_id)?;
        let (next_following, next_followers) = flip(following, followers);
        target.apply_follow(user_id, next_following, next_followers);

        self.next_seq += 1;
        let ticket = PendingFollow {
            user_id: user_id.to_string(),
            previous_following: following,
            previous_followers: followers,
            next_following,
            next_followers,
            seq: self.next_seq,
        };
        self.follows.insert(user_id.to_string(), ticket.clone());
        Some(ticket)
    }

    /// Settle a pending follow toggle with the server's answer
    pub fn resolve_follow<T: FollowTarget + ?Sized>(
        &mut self,
        target: &mut T,
        ticket: &PendingFollow,
        result: Result<FollowOutcome, ApiError>,
    ) -> Resolution {
        self.sync_session();

        match self.follows.get(&ticket.user_id) {
            Some(current) if current.seq == ticket.seq => {
                self.follows.remove(&ticket.user_id);
            }
            _ => {
                tracing::debug!("Dropping stale follow result for {}", ticket.user_id);
                return Resolution::Dropped;
            }
        }

        let resolution = match result {
            Ok(outcome) => {
                let count = outcome.follower_count.unwrap_or_else(|| {
                    if outcome.following == ticket.previous_following {
                        ticket.previous_followers
                    } else {
                        flip(ticket.previous_following, ticket.previous_followers).1
                    }
                });
                Resolution::Confirmed {
                    active: outcome.following,
                    count,
                }
            }
            Err(e) => {
                tracing::warn!("Follow on {} failed, rolling back: {e}", ticket.user_id);
                Resolution::RolledBack {
                    active: ticket.previous_following,
                    count: ticket.previous_followers,
                }
            }
        };

        if let Resolution::Confirmed { active, count } | Resolution::RolledBack { active, count } =
            resolution
        {
            target.apply_follow(&ticket.user_id, active, count);
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;
    use crate::session::{Identity, Session};

    #[derive(Default)]
    struct Single(Option<Item>);

    impl EngagementTarget for Single {
        fn engagement(&self, id: &str, kind: EngagementKind) -> Option<(bool, u64)> {
            self.0.as_ref().filter(|i| i.id == id).map(|i| i.engagement(kind))
        }

        fn apply_engagement(&mut self, id: &str, patch: EngagementPatch) -> bool {
            match self.0.as_mut().filter(|i| i.id == id) {
                Some(item) => {
                    patch.apply(item, None);
                    true
                }
                None => false,
            }
        }
    }

    fn target(favorited: bool, count: u64) -> Single {
        let mut item = Item::new("t1");
        item.favorited = favorited;
        item.favorite_count = count;
        Single(Some(item))
    }

    #[test]
    fn test_failure_restores_snapshot() {
        let mut target = target(false, 5);
        let mut controller = MutationController::new();

        let ticket = controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .unwrap();
        assert_eq!(target.engagement("t1", EngagementKind::Favorite), Some((true, 6)));
        assert_eq!(controller.state("t1", EngagementKind::Favorite), MutationState::Pending);

        let resolution = controller.resolve(
            &mut target,
            &ticket,
            Err(ApiError::Transport("offline".to_string())),
        );
        assert_eq!(resolution, Resolution::RolledBack { active: false, count: 5 });
        assert_eq!(target.engagement("t1", EngagementKind::Favorite), Some((false, 5)));
        assert_eq!(controller.state("t1", EngagementKind::Favorite), MutationState::Idle);
    }

    #[test]
    fn test_success_adopts_server_values() {
        let mut target = target(false, 5);
        let mut controller = MutationController::new();

        let ticket = controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .unwrap();
        let resolution = controller.resolve(
            &mut target,
            &ticket,
            Ok(ToggleOutcome { active: true, count: 9 }),
        );

        assert_eq!(resolution, Resolution::Confirmed { active: true, count: 9 });
        assert_eq!(target.engagement("t1", EngagementKind::Favorite), Some((true, 9)));
    }

    #[test]
    fn test_second_toggle_while_pending_ignored() {
        let mut target = target(false, 5);
        let mut controller = MutationController::new();

        let _ticket = controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .unwrap();
        assert!(controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .is_none());
        assert_eq!(target.engagement("t1", EngagementKind::Favorite), Some((true, 6)));

        // A different kind on the same item is independent
        assert!(controller
            .begin(&mut target, "t1", EngagementKind::Repost)
            .is_some());
        assert_eq!(controller.in_flight(), 2);
    }

    #[test]
    fn test_unfavorite_never_goes_negative() {
        let mut target = target(true, 0);
        let mut controller = MutationController::new();

        controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .unwrap();
        assert_eq!(target.engagement("t1", EngagementKind::Favorite), Some((false, 0)));
    }

    #[test]
    fn test_missing_item_is_noop() {
        let mut target = Single::default();
        let mut controller = MutationController::new();
        assert!(controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .is_none());
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn test_session_change_drops_tickets() {
        let session = Session::new();
        session.open(Identity::new("me", "tok"));
        let mut controller = MutationController::with_session(session.subscribe());
        let mut target = target(false, 5);

        let ticket = controller
            .begin(&mut target, "t1", EngagementKind::Favorite)
            .unwrap();
        session.close();

        let resolution = controller.resolve(
            &mut target,
            &ticket,
            Ok(ToggleOutcome { active: true, count: 6 }),
        );
        assert_eq!(resolution, Resolution::Dropped);
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn test_follow_confirm_without_count_moves_snapshot() {
        use crate::models::Profile;

        let mut profile = Profile::new("u2");
        profile.follower_count = 10;
        let mut controller = MutationController::new();

        let ticket = controller.begin_follow(&mut profile, "u2").unwrap();
        assert_eq!(profile.follow_state("u2"), Some((true, 11)));
        assert!(controller.begin_follow(&mut profile, "u2").is_none());
        assert_eq!(controller.follow_state("u2"), MutationState::Pending);

        let resolution = controller.resolve_follow(
            &mut profile,
            &ticket,
            Ok(FollowOutcome {
                following: true,
                follower_count: None,
            }),
        );
        assert_eq!(resolution, Resolution::Confirmed { active: true, count: 11 });
        assert_eq!(controller.follow_state("u2"), MutationState::Idle);

        // Server says we were already following: count stays at the snapshot
        let ticket = controller.begin_follow(&mut profile, "u2").unwrap();
        assert_eq!(profile.follow_state("u2"), Some((false, 10)));
        controller.resolve_follow(
            &mut profile,
            &ticket,
            Ok(FollowOutcome {
                following: true,
                follower_count: None,
            }),
        );
        assert_eq!(profile.follow_state("u2"), Some((true, 11)));
    }

    #[test]
    fn test_follow_failure_and_server_count() {
        use crate::models::Profile;

        let mut profile = Profile::new("u2");
        profile.following = true;
        profile.follower_count = 0;
        let mut controller = MutationController::new();

        let ticket = controller.begin_follow(&mut profile, "u2").unwrap();
        assert_eq!(profile.follow_state("u2"), Some((false, 0)));
        let resolution = controller.resolve_follow(
            &mut profile,
            &ticket,
            Err(ApiError::Transport("offline".to_string())),
        );
        assert_eq!(resolution, Resolution::RolledBack { active: true, count: 0 });
        assert_eq!(profile.follow_state("u2"), Some((true, 0)));

        let ticket = controller.begin_follow(&mut profile, "u2").unwrap();
        controller.resolve_follow(
            &mut profile,
            &ticket,
            Ok(FollowOutcome {
                following: false,
                follower_count: Some(41),
            }),
        );
        assert_eq!(profile.follow_state("u2"), Some((false, 41)));
        assert!(controller.begin_follow(&mut profile, "someone-else").is_none());
    }

    #[test]
    fn test_session_change_drops_follow_tickets() {
        use crate::models::Profile;

        let session = Session::new();
        session.open(Identity::new("me", "tok"));
        let mut controller = MutationController::with_session(session.subscribe());
        let mut profile = Profile::new("u2");

        let ticket = controller.begin_follow(&mut profile, "u2").unwrap();
        session.close();

        let resolution = controller.resolve_follow(
            &mut profile,
            &ticket,
            Ok(FollowOutcome {
                following: true,
                follower_count: None,
            }),
        );
        assert_eq!(resolution, Resolution::Dropped);
        assert_eq!(controller.in_flight(), 0);
    }
}
