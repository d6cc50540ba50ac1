//! Forward (older-item) pagination cursor
//!
//! A load-more is a ticketed request: [`PageCursor::begin_next`] hands out a
//! [`PageRequest`] and the response is only applied if it still matches the
//! outstanding ticket and reports the requested page. A `reset` (refresh)
//! bumps the epoch, so a slow response from before the refresh can never
//! advance the cursor afterwards.

use crate::models::PageMeta;

/// Ticket for one outstanding load-more
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    epoch: u64,
}

impl PageRequest {
    /// Page number requested
    pub const fn page(&self) -> u32 {
        self.page
    }
}

/// Why a page response was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The ticket is no longer outstanding (refresh, session change, or
    /// already answered)
    Outdated,
    /// The server answered with a different page than requested
    PageMismatch {
        /// Page requested
        requested: u32,
        /// Page reported
        reported: u32,
    },
}

/// Pagination state for one list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    page: u32,
    has_more: bool,
    loading: Option<PageRequest>,
    epoch: u64,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCursor {
    /// Cursor before anything is loaded
    pub const fn new() -> Self {
        Self {
            page: 1,
            has_more: false,
            loading: None,
            epoch: 0,
        }
    }

    /// Current page number
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Whether older pages remain
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether a load-more is outstanding
    pub const fn is_loading_more(&self) -> bool {
        self.loading.is_some()
    }

    /// Back to page 1 after a full replace
    pub fn reset(&mut self, meta: PageMeta) {
        self.epoch += 1;
        self.page = 1;
        self.has_more = meta.has_more();
        self.loading = None;
    }

    /// Forget everything (session change)
    pub fn clear(&mut self) {
        let epoch = self.epoch + 1;
        *self = Self::new();
        self.epoch = epoch;
    }

    /// Start loading the next page. Returns `None` while another load-more
    /// is outstanding or when no older pages remain.
    pub fn begin_next(&mut self) -> Option<PageRequest> {
        if self.loading.is_some() || !self.has_more {
            return None;
        }

        let request = PageRequest {
            page: self.page + 1,
            epoch: self.epoch,
        };
        self.loading = Some(request);
        Some(request)
    }

    /// Apply a response for `request`
    pub fn finish(&mut self, request: PageRequest, meta: PageMeta) -> Result<(), Rejection> {
        if self.loading != Some(request) {
            return Err(Rejection::Outdated);
        }
        self.loading = None;

        if meta.page != request.page {
            return Err(Rejection::PageMismatch {
                requested: request.page,
                reported: meta.page,
            });
        }

        self.page = meta.page;
        self.has_more = meta.has_more();
        Ok(())
    }

    /// Release the loading flag after a failed request
    pub fn fail(&mut self, request: PageRequest) {
        if self.loading == Some(request) {
            self.loading = None;
        }
    }
}
