//! # feedline
//!
//! Client-side feed synchronization for a social backend: paginated feeds,
//! live push arrivals, periodic polling and optimistic engagement toggles,
//! all converging on one deduplicated, ordered window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         FeedSync                            │
//! │  Single-owner event loop: applies SyncEvents one at a time  │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                   ▲                   ▲
//!          │ Refreshed/Paged   │ Pushed            │ SessionChanged
//!          │ Polled/Settled    │                   │
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │       API       │ │      Live       │ │     Session     │
//! │                 │ │                 │ │                 │
//! │ • FeedApi trait │ │ • Socket.IO v4  │ │ • open / close  │
//! │ • reqwest HTTP  │ │ • setup handshk │ │ • 401 invalidat │
//! │ • wire decoding │ │ • newItem/notif │ │ • push SDK link │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │      Store      │ │    Mutation     │ │      Cache      │
//! │                 │ │                 │ │                 │
//! │ • Feed window   │ │ • Optimistic    │ │ • Last window   │
//! │ • Pending buf   │ │ • Rollback      │ │ • SQLite        │
//! │ • Reply thread  │ │ • Pending lock  │ │                 │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] — HTTP client and the [`FeedApi`] seam
//! - [`auth`] — Encrypted storage of the signed-in identity
//! - [`cache`] — `SQLite` cache of the last visible window
//! - [`config`] — Configuration management
//! - [`live`] — Socket.IO live update channel
//! - [`models`] — Items, authors, profiles, pagination metadata
//! - [`mutation`] — Optimistic favorite/repost/follow controller
//! - [`notifications`] — Live notification inbox and deep-link routing
//! - [`session`] — Explicitly owned session object
//! - [`store`] — Feed window and reply thread state
//! - [`sync`] — Event-loop driver tying everything together
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedline::{ApiClient, Config, FeedSync, Identity, Session, SyncSettings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let session = Session::new();
//! session.open(Identity::new("user-1", "token"));
//!
//! let api = Arc::new(ApiClient::new(&config.api_url, session.clone()));
//! let mut sync = FeedSync::new(api, session, config.feed_type, SyncSettings::from(&config));
//! sync.on_activate();
//! while let Some(update) = sync.step().await {
//!     println!("{update:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/feedline/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::future_not_send)]

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod live;
pub mod models;
pub mod mutation;
pub mod notifications;
pub mod paths;
pub mod session;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use api::{ApiClient, FeedApi, FollowOutcome, Page, ToggleOutcome};
pub use cache::FeedCache;
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use live::LiveChannel;
pub use models::{
    Author, EngagementKind, EngagementPatch, FeedType, Item, Media, MediaKind, PageMeta, Profile,
};
pub use mutation::{MutationController, MutationState, PendingFollow, PendingMutation, Resolution};
pub use notifications::{
    DeepLink, Notification, NotificationEvent, NotificationInbox, NotificationKind,
    NotificationRouter, PushSdk,
};
pub use session::{Identity, Session, SessionState, SessionWatch};
pub use store::{FeedStore, ItemDetail, MergeOutcome, ReplyThread};
pub use sync::{FeedSync, SyncEvent, SyncSettings, SyncUpdate};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
