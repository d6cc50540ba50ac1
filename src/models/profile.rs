//! User profile model

use serde::{Deserialize, Serialize};

use crate::mutation::FollowTarget;

/// A user as shown on a profile screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// User identifier
    pub id: String,
    /// Handle without the leading `@`
    pub username: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Number of followers
    pub follower_count: u64,
    /// Number of users followed
    pub following_count: u64,
    /// Whether the viewer follows this user
    pub following: bool,
}

impl Profile {
    /// Create an empty profile with an identifier
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Handle with `@`, falling back to the identifier
    pub fn handle(&self) -> String {
        if self.username.is_empty() {
            format!("@{}", self.id)
        } else {
            format!("@{}", self.username)
        }
    }
}

impl FollowTarget for Profile {
    fn follow_state(&self, user_id: &str) -> Option<(bool, u64)> {
        (self.id == user_id).then_some((self.following, self.follower_count))
    }

    fn apply_follow(&mut self, user_id: &str, following: bool, followers: u64) -> bool {
        if self.id != user_id {
            return false;
        }
        self.following = following;
        self.follower_count = followers;
        true
    }
}
