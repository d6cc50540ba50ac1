//! Data models for feedline

mod feed_type;
mod item;
mod page;
mod profile;

pub use feed_type::FeedType;
pub use item::{Author, EngagementKind, EngagementPatch, Item, Media, MediaKind};
pub use page::PageMeta;
pub use profile::Profile;
