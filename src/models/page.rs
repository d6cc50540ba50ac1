//! Pagination metadata

use serde::{Deserialize, Serialize};

/// Pagination block returned by list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Page this response holds (1-based)
    #[serde(default = "first_page")]
    pub page: u32,
    /// Total number of pages available
    #[serde(default = "first_page")]
    pub total_pages: u32,
}

const fn first_page() -> u32 {
    1
}

impl Default for PageMeta {
    fn default() -> Self {
        Self::single()
    }
}

impl PageMeta {
    /// Create pagination metadata
    pub const fn new(page: u32, total_pages: u32) -> Self {
        Self { page, total_pages }
    }

    /// A response with exactly one page
    pub const fn single() -> Self {
        Self::new(1, 1)
    }

    /// Whether older pages remain after this one
    pub const fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more() {
        assert!(PageMeta::new(1, 3).has_more());
        assert!(!PageMeta::new(3, 3).has_more());
        assert!(!PageMeta::new(1, 0).has_more());
    }

    #[test]
    fn test_missing_fields_default_to_single_page() {
        let meta: PageMeta = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, PageMeta::single());
    }
}
