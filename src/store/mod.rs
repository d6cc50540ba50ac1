//! Client-side list state: the feed window and reply threads

mod cursor;
mod feed;
mod list;
mod thread;

pub use cursor::{PageCursor, PageRequest, Rejection};
pub use feed::{FeedStore, MergeOutcome};
pub use list::ItemList;
pub use thread::{ItemDetail, ReplyThread};
