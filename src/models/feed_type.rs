//! Feed type definitions

use serde::{Deserialize, Serialize};

/// Which server-side feed to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FeedType {
    /// Mixed feed: followed accounts plus suggested/trending items
    #[default]
    #[serde(rename = "forYou")]
    ForYou,
    /// Only accounts the user follows
    #[serde(rename = "following")]
    Following,
}

impl FeedType {
    /// Get all feed types
    pub const fn all() -> &'static [Self] {
        &[Self::ForYou, Self::Following]
    }

    /// Value used in the `feedType` query parameter
    pub const fn as_query(&self) -> &'static str {
        match self {
            Self::ForYou => "forYou",
            Self::Following => "following",
        }
    }

    /// Get the display name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ForYou => "For you",
            Self::Following => "Following",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "foryou" | "for-you" | "for_you" => Some(Self::ForYou),
            "following" => Some(Self::Following),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_query() {
        assert_eq!(FeedType::from_str("forYou"), Some(FeedType::ForYou));
        assert_eq!(FeedType::from_str("FOLLOWING"), Some(FeedType::Following));
        assert_eq!(FeedType::from_str("global"), None);
        assert_eq!(FeedType::Following.as_query(), "following");
    }

    #[test]
    fn test_serde_matches_query_value() {
        let json = serde_json::to_string(&FeedType::ForYou).unwrap();
        assert_eq!(json, "\"forYou\"");
    }
}
