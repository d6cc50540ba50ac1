//! feedline - command-line client for the feed sync core
#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use feedline::mutation::{EngagementTarget, FollowTarget};
use feedline::notifications::TracingPushSdk;
use feedline::{
    ApiClient, Config, EngagementKind, FeedApi, FeedCache, FeedSync, FeedType, Identity, Item,
    ItemDetail, LiveChannel, MutationController, Profile, Resolution, Session, SyncSettings,
    SyncUpdate,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match parse_args()? {
        Command::Login { user_id, token } => login(&user_id, &token),
        Command::Logout => logout().await,
        Command::Feed { feed, limit, page } => feed_cli(feed, limit, page).await,
        Command::Show { id } => show_cli(&id).await,
        Command::Toggle { id, kind } => toggle_cli(&id, kind).await,
        Command::Profile { user_id } => profile_cli(&user_id).await,
        Command::Follow { user_id } => follow_cli(&user_id).await,
        Command::Post { text, reply_to } => post_cli(&text, reply_to.as_deref()).await,
        Command::Watch => watch().await,
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Login { user_id: String, token: String },
    Logout,
    Feed {
        feed: Option<FeedType>,
        limit: Option<u32>,
        page: u32,
    },
    Show { id: String },
    Toggle { id: String, kind: EngagementKind },
    Profile { user_id: String },
    Follow { user_id: String },
    Post {
        text: String,
        reply_to: Option<String>,
    },
    Watch,
    Help,
    Version,
}

/// Value following a `--flag` anywhere in the argument list
fn flag_value<'a>(args: &'a [String], names: &[&str]) -> Option<&'a str> {
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn required(args: &[String], index: usize, what: &str) -> Result<String> {
    args.get(index)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing {what}\nRun 'feedline --help' for usage"))
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),

        "login" => Ok(Command::Login {
            user_id: required(&args, 2, "user id")?,
            token: required(&args, 3, "token")?,
        }),

        "logout" => Ok(Command::Logout),

        "feed" => {
            let feed = match args.get(2).filter(|a| !a.starts_with('-')) {
                Some(name) => Some(
                    FeedType::from_str(name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown feed: {name} (forYou, following)"))?,
                ),
                None => None,
            };
            let limit = flag_value(&args, &["--limit", "-l"])
                .map(str::parse::<u32>)
                .transpose()
                .context("Invalid --limit")?;
            let page = flag_value(&args, &["--page", "-p"])
                .map(str::parse::<u32>)
                .transpose()
                .context("Invalid --page")?
                .unwrap_or(1);
            Ok(Command::Feed { feed, limit, page })
        }

        "show" => Ok(Command::Show {
            id: required(&args, 2, "item id")?,
        }),

        "favorite" | "fav" => Ok(Command::Toggle {
            id: required(&args, 2, "item id")?,
            kind: EngagementKind::Favorite,
        }),

        "repost" => Ok(Command::Toggle {
            id: required(&args, 2, "item id")?,
            kind: EngagementKind::Repost,
        }),

        "profile" => Ok(Command::Profile {
            user_id: required(&args, 2, "user id")?,
        }),

        "follow" => Ok(Command::Follow {
            user_id: required(&args, 2, "user id")?,
        }),

        "post" => Ok(Command::Post {
            text: required(&args, 2, "post text")?,
            reply_to: flag_value(&args, &["--reply-to", "-r"]).map(str::to_string),
        }),

        "watch" => Ok(Command::Watch),

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'feedline --help' for usage"
        )),
    }
}

fn print_help() {
    let config_path = feedline::paths::config_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"feedline {} - real-time feed client

USAGE:
    feedline [COMMAND]

COMMANDS:
    login <user-id> <token>            Store the session identity
    logout                             End the session and clear local data
    feed [forYou|following] [OPTIONS]  Show one page of a feed
      Options:
        -l, --limit <n>                Items per page (default: config)
        -p, --page <n>                 Page number (default: 1)
    show <item-id>                     Show an item and its first replies
    favorite <item-id>                 Toggle favorite on an item
    repost <item-id>                   Toggle repost on an item
    profile <user-id>                  Show a user profile
    follow <user-id>                   Toggle following a user
    post <text> [OPTIONS]              Create an item
      Options:
        -r, --reply-to <item-id>       Post as a reply
    watch                              Follow the feed live until Ctrl-C

OPTIONS:
    -h, --help                         Show this help message
    -v, --version                      Show version information

CONFIG:
    {}
"#,
        feedline::VERSION,
        config_path
    );
}

fn print_version() {
    println!("feedline {}", feedline::VERSION);
}

fn print_item(item: &Item) {
    let author = if item.author.username.is_empty() {
        item.author.id.as_str()
    } else {
        item.author.username.as_str()
    };
    println!("\n@{} · {} · {}", author, item.relative_time(), item.id);
    println!("{}", item.text);
    println!(
        "♥ {}{}  🔁 {}{}  💬 {}",
        item.favorite_count,
        if item.favorited { "*" } else { "" },
        item.repost_count,
        if item.reposted { "*" } else { "" },
        item.reply_count
    );
}

fn print_profile(profile: &Profile) {
    println!("\n{} {}", profile.name, profile.handle());
    println!(
        "{} following · {} followers{}",
        profile.following_count,
        profile.follower_count,
        if profile.following { " · you follow" } else { "" }
    );
}

/// Session restored from the credentials file, if any
fn restore_session() -> Result<Session> {
    let session = Session::with_push_sdk(Arc::new(TracingPushSdk));
    if let Some(identity) = feedline::auth::load_identity()? {
        session.open(identity);
    }
    Ok(session)
}

fn require_login(session: &Session) -> Result<()> {
    if session.is_open() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Not logged in. Run: feedline login <user-id> <token>"))
    }
}

fn login(user_id: &str, token: &str) -> Result<()> {
    feedline::auth::store_identity(&Identity::new(user_id, token))?;
    println!("✓ Logged in as {user_id}");
    Ok(())
}

async fn logout() -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;

    if session.is_open() {
        let client = ApiClient::new(&config.api_url, session.clone());
        if let Err(e) = client.logout().await {
            tracing::warn!("Server logout failed: {e}");
        }
        session.close();
    }

    feedline::auth::clear_identity()?;
    if config.cache_enabled {
        FeedCache::open()?.clear()?;
    }
    println!("✓ Logged out");
    Ok(())
}

async fn feed_cli(feed: Option<FeedType>, limit: Option<u32>, page: u32) -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    let client = ApiClient::new(&config.api_url, session);

    let feed = feed.unwrap_or(config.feed_type);
    let limit = limit.unwrap_or(config.page_limit);
    let result = client.feed_page(feed, page, limit).await?;

    println!("{} · page {} of {}", feed, result.meta.page, result.meta.total_pages);
    println!("{}", "─".repeat(60));
    for item in &result.items {
        print_item(item);
    }
    if result.items.is_empty() {
        println!("\nNothing here yet.");
    }
    Ok(())
}

async fn show_cli(id: &str) -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    let client = ApiClient::new(&config.api_url, session.clone());

    let mut detail = ItemDetail::with_session(id, session.subscribe());
    detail.apply_item(client.item(id).await?);
    let replies = client.replies(id, 1, config.page_limit).await?;
    detail.thread.replace(replies.items, replies.meta);

    if let Some(item) = detail.item() {
        print_item(item);
    }
    println!("\n{}", "─".repeat(60));
    println!("Replies{}", if detail.thread.has_more() { " (more available)" } else { "" });
    for reply in detail.thread.items() {
        print_item(reply);
    }
    Ok(())
}

async fn toggle_cli(id: &str, kind: EngagementKind) -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    require_login(&session)?;
    let client = ApiClient::new(&config.api_url, session.clone());

    let mut detail = ItemDetail::with_session(id, session.subscribe());
    detail.apply_item(client.item(id).await?);

    let mut mutations = MutationController::with_session(session.subscribe());
    let ticket = mutations
        .begin(&mut detail, id, kind)
        .ok_or_else(|| anyhow::anyhow!("Item {id} is not available"))?;

    let result = client.toggle(id, kind).await;
    match mutations.resolve(&mut detail, &ticket, result) {
        Resolution::Confirmed { active, count } => {
            println!("✓ {} {} ({count})", if active { "Set" } else { "Cleared" }, kind);
        }
        Resolution::RolledBack { .. } => {
            let (active, count) = detail.engagement(id, kind).unwrap_or_default();
            println!("✗ {kind} failed; still {} ({count})", if active { "set" } else { "not set" });
        }
        Resolution::Dropped => println!("✗ Session changed, {kind} discarded"),
    }
    Ok(())
}

async fn profile_cli(user_id: &str) -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    let client = ApiClient::new(&config.api_url, session);

    print_profile(&client.profile(user_id).await?);
    Ok(())
}

async fn follow_cli(user_id: &str) -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    require_login(&session)?;
    let client = ApiClient::new(&config.api_url, session.clone());

    let mut profile = client.profile(user_id).await?;
    let mut mutations = MutationController::with_session(session.subscribe());
    let ticket = mutations
        .begin_follow(&mut profile, user_id)
        .ok_or_else(|| anyhow::anyhow!("User {user_id} is not available"))?;

    let result = client.toggle_follow(user_id).await;
    match mutations.resolve_follow(&mut profile, &ticket, result) {
        Resolution::Confirmed { active, count } => {
            let verb = if active { "Following" } else { "Unfollowed" };
            println!("✓ {verb} {} ({count} followers)", profile.handle());
        }
        Resolution::RolledBack { .. } => {
            let (active, _) = profile.follow_state(user_id).unwrap_or_default();
            println!(
                "✗ Follow failed; {} {}",
                if active { "still following" } else { "still not following" },
                profile.handle()
            );
        }
        Resolution::Dropped => println!("✗ Session changed, follow discarded"),
    }
    Ok(())
}

async fn post_cli(text: &str, reply_to: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    require_login(&session)?;
    let client = ApiClient::new(&config.api_url, session);

    let item = client.create_item(text, reply_to).await?;
    println!("✓ Posted {}", item.id);
    Ok(())
}

async fn watch() -> Result<()> {
    let config = Config::load()?;
    let session = restore_session()?;
    let api = Arc::new(ApiClient::new(&config.api_url, session.clone()));

    let mut sync = FeedSync::new(
        api,
        session.clone(),
        config.feed_type,
        SyncSettings::from(&config),
    );
    if config.cache_enabled {
        match FeedCache::open() {
            Ok(cache) => sync = sync.with_cache(cache),
            Err(e) => tracing::warn!("Feed cache unavailable: {e}"),
        }
    }

    let mut live = LiveChannel::new(&config.socket_url(), config.reconnect_delay(), sync.sender());
    live.apply_session(&session.state());

    println!("Watching {} (Ctrl-C to stop)", config.feed_type);
    sync.on_activate();
    for item in sync.store().items() {
        print_item(item);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = sync.step() => {
                let Some(update) = update else { break };
                report(&sync, &update);
                if let SyncUpdate::SessionReset { .. } = update {
                    live.apply_session(&session.state());
                }
                // A terminal has no scroll position; show staged items right away
                sync.release_pending();
            }
        }
    }

    live.disconnect();
    sync.on_deactivate();
    Ok(())
}

fn report<A: FeedApi>(sync: &FeedSync<A>, update: &SyncUpdate) {
    match update {
        SyncUpdate::Replaced { count } => {
            println!("\n── {count} item(s) ──");
            for item in sync.store().items() {
                print_item(item);
            }
        }
        SyncUpdate::Merged(outcome) => {
            let store = sync.store();
            for item in store.items().iter().take(outcome.prepended + outcome.released) {
                print_item(item);
            }
            if outcome.staged > 0 {
                println!("\n── {} new item(s) above ──", store.pending_count());
                for item in store.pending_items().iter().take(outcome.staged) {
                    print_item(item);
                }
            }
        }
        SyncUpdate::Notified { unread } => {
            if let Some(latest) = sync.inbox().new_notifications().first() {
                println!("\n🔔 {:?} ({unread} unread)", latest.kind);
            }
        }
        SyncUpdate::Failed(e) => eprintln!("! {e}"),
        SyncUpdate::SessionReset { signed_in } => {
            println!("Session {}", if *signed_in { "changed" } else { "ended" });
        }
        SyncUpdate::Appended { .. } | SyncUpdate::Mutation { .. } | SyncUpdate::Posted(_) => {}
    }
}
