use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use repofeed_core::config_file::{self, ConfigFile};
use repofeed_core::{
    DraftField, FeedOptions, FetchOutcome, Notifier, RepoFeed, SqliteStore,
};
use repofeed_github::GithubSource;

mod output;

use output::ColorMode;

/// Incremental pager over a GitHub user's repositories, with a local,
/// editable cache
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the snapshot database
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch more pages into the cached working set
    Fetch {
        /// GitHub user whose repositories to list (falls back to config)
        user: Option<String>,

        /// Page budget for this run
        #[arg(long, default_value_t = 5)]
        pages: u32,

        /// Keep fetching until the source is exhausted
        #[arg(long)]
        all: bool,

        /// Page size, fixed per session
        #[arg(long)]
        per_page: Option<u32>,

        /// API token (falls back to GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the cached working set
    Show,

    /// Rename or re-describe a cached entry (local only; never synced)
    Edit {
        id: u64,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove a cached entry (local only)
    Delete { id: u64 },

    /// Drop the cached working set and cursor
    Clear,
}

/// A page landed; published on the "page" channel for progress reporting.
struct PageEvent {
    page: u32,
    total_pages: u32,
    appended: usize,
    cached: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let color = ColorMode(!cli.no_color);
    let config = config_file::load_config();

    let store = SqliteStore::open(&store_path(cli.store.clone(), &config))?;
    let options = feed_options(&config, None);

    match cli.command {
        Command::Fetch {
            user,
            pages,
            all,
            per_page,
            token,
        } => {
            // CLI flags > env vars > config file > defaults
            let user = user
                .or_else(|| config.source.as_ref().and_then(|s| s.user.clone()))
                .ok_or_else(|| {
                    anyhow::anyhow!("no user given (pass one or set [source].user in config)")
                })?;
            let token = token
                .or_else(|| std::env::var("GITHUB_TOKEN").ok())
                .or_else(|| config.source.as_ref().and_then(|s| s.token.clone()));
            let source = build_source(&user, token, &config);
            let options = feed_options(&config, per_page);
            let feed = RepoFeed::new(source, store, options);
            fetch(&feed, pages, all, color).await
        }
        Command::Show => {
            let feed = local_feed(&config, store, options);
            output::print_entries(&mut std::io::stdout(), &feed.entries(), color)?;
            output::print_summary(&mut std::io::stdout(), feed.len(), feed.cursor(), color)?;
            Ok(())
        }
        Command::Edit {
            id,
            name,
            description,
        } => {
            let feed = local_feed(&config, store, options);
            if !feed.records().iter().any(|r| r.id == id) {
                println!("no cached repository with id {id}");
                return Ok(());
            }
            if name.is_none() && description.is_none() {
                println!("nothing to change (pass --name and/or --description)");
                return Ok(());
            }
            feed.toggle_edit(id);
            if let Some(name) = name {
                feed.update_draft(id, DraftField::Name, name);
            }
            if let Some(description) = description {
                feed.update_draft(id, DraftField::Description, description);
            }
            feed.commit_edit(id);

            let entries = feed.entries();
            if let Some(entry) = entries.iter().find(|e| e.record.id == id) {
                output::print_entries(&mut std::io::stdout(), std::slice::from_ref(entry), color)?;
            }
            Ok(())
        }
        Command::Delete { id } => {
            let feed = local_feed(&config, store, options);
            let before = feed.len();
            feed.delete(id);
            if feed.len() < before {
                println!("deleted {id}");
            } else {
                println!("no cached repository with id {id}");
            }
            Ok(())
        }
        Command::Clear => {
            let feed = local_feed(&config, store, options);
            feed.reset();
            println!("cache cleared");
            Ok(())
        }
    }
}

/// Drive near-end signals until the page budget is spent, the source is
/// exhausted, or a fetch fails.
async fn fetch(
    feed: &RepoFeed<GithubSource, SqliteStore>,
    pages: u32,
    all: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));

    // Progress reporting is decoupled from the fetch loop: the loop
    // publishes page events, the subscribed renderer draws them.
    let events: Notifier<PageEvent> = Notifier::new();
    {
        let bar = bar.clone();
        events.subscribe("page", move |e: &PageEvent| {
            bar.set_message(format!(
                "page {}/{}: +{} new, {} cached",
                e.page, e.total_pages, e.appended, e.cached
            ));
        });
    }

    let mut fetched = 0u32;
    let mut stalled = false;

    match feed.start().await {
        Ok(FetchOutcome::Fetched(appended)) => {
            fetched += 1;
            publish_page(&events, feed, appended);
        }
        Ok(_) => {}
        Err(_) => stalled = true,
    }

    while !stalled && (all || fetched < pages) {
        match feed.notify_near_end().await {
            FetchOutcome::Fetched(appended) => {
                fetched += 1;
                publish_page(&events, feed, appended);
            }
            FetchOutcome::Exhausted => break,
            FetchOutcome::Failed => stalled = true,
            FetchOutcome::InFlight | FetchOutcome::Stale | FetchOutcome::Seeded => break,
        }
    }
    bar.finish_and_clear();

    if stalled {
        let warning = "fetch failed; cached results shown (see log for details)";
        if color.enabled() {
            eprintln!("{}", warning.yellow());
        } else {
            eprintln!("{warning}");
        }
    }

    output::print_entries(&mut std::io::stdout(), &feed.entries(), color)?;
    output::print_summary(&mut std::io::stdout(), feed.len(), feed.cursor(), color)?;
    Ok(())
}

fn publish_page(
    events: &Notifier<PageEvent>,
    feed: &RepoFeed<GithubSource, SqliteStore>,
    appended: usize,
) {
    let cursor = feed.cursor();
    events.publish(
        "page",
        &PageEvent {
            // current_page already points past the page that just landed.
            page: cursor.current_page.saturating_sub(1),
            total_pages: cursor.total_pages,
            appended,
            cached: feed.len(),
        },
    );
}

/// A feed for local-only commands; the source is never contacted.
fn local_feed(
    config: &ConfigFile,
    store: SqliteStore,
    options: FeedOptions,
) -> RepoFeed<GithubSource, SqliteStore> {
    let user = config
        .source
        .as_ref()
        .and_then(|s| s.user.clone())
        .unwrap_or_default();
    RepoFeed::new(build_source(&user, None, config), store, options)
}

fn build_source(user: &str, token: Option<String>, config: &ConfigFile) -> GithubSource {
    let mut source = GithubSource::new(user).with_token(token);
    if let Some(base_url) = config.source.as_ref().and_then(|s| s.base_url.clone()) {
        source = source.with_base_url(base_url);
    }
    if let Some(user_agent) = config.source.as_ref().and_then(|s| s.user_agent.clone()) {
        source = source.with_user_agent(user_agent);
    }
    source
}

fn feed_options(config: &ConfigFile, per_page_flag: Option<u32>) -> FeedOptions {
    let mut options = FeedOptions::default();
    if let Some(per_page) = per_page_flag
        .or_else(|| config.paging.as_ref().and_then(|p| p.per_page))
    {
        options.per_page = per_page;
    }
    if let Some(key) = config.store.as_ref().and_then(|s| s.key.clone()) {
        options.snapshot_key = key;
    }
    options
}

/// Snapshot database path: flag > env > config > platform data dir.
fn store_path(flag: Option<PathBuf>, config: &ConfigFile) -> PathBuf {
    flag.or_else(|| std::env::var("REPOFEED_STORE").ok().map(PathBuf::from))
        .or_else(|| {
            config
                .store
                .as_ref()
                .and_then(|s| s.path.clone())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("repofeed")
                .join("snapshots.db")
        })
}
