//! tabkeep CLI
//!
//! Command-line interface for tabkeep - bookmarks, tags and curation backed
//! by a local SQLite store.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tabkeep_core::views::{GroupOrder, GroupSort, Grouping, Sort, SortDir, SortProp};
use tabkeep_core::{Config, Domain, Engine, SqliteStorage, StorageMedium};

mod commands;
mod output;

use output::{Output, OutputFormat};

/// Environment variable holding the log filter
const LOG_ENV: &str = "TABKEEP_LOG";

#[derive(Parser)]
#[command(name = "tabkeep")]
#[command(about = "tabkeep - Local-first tabs, bookmarks and tags")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show storage and collection status
    Status,
    /// Migrate data from the legacy storage layout
    Migrate {
        /// Remove legacy keys after a completed migration
        #[arg(long)]
        cleanup: bool,
    },
    /// List items with filtering, sorting and grouping
    #[command(alias = "ls")]
    List(ListArgs),
    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: Option<TagCommands>,
    },
    /// Show the curation queue
    Curate {
        /// Bookmark ids to include regardless of other reasons
        #[arg(short, long)]
        pick: Vec<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args)]
struct ListArgs {
    /// Which collection to list
    #[arg(short, long, value_enum, default_value_t = DomainArg::Bookmarks)]
    domain: DomainArg,
    /// Keywords to search for
    #[arg(short, long)]
    keyword: Vec<String>,
    /// Only items with one of these tags (id or name)
    #[arg(short, long)]
    tag: Vec<String>,
    /// Fuzzy keyword matching instead of word prefixes
    #[arg(long)]
    loose: bool,
    /// Sort items by
    #[arg(short, long, value_enum, default_value_t = SortArg::Index)]
    sort: SortArg,
    /// Sort descending
    #[arg(long)]
    desc: bool,
    /// Group items by
    #[arg(short, long, value_enum, default_value_t = GroupArg::None)]
    group: GroupArg,
    /// Order groups by size instead of key
    #[arg(long)]
    by_size: bool,
}

#[derive(Subcommand)]
enum BookmarkCommands {
    /// Save a bookmark
    Add {
        /// URL to save
        url: String,
        /// Title (defaults to the URL)
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Tags to add (id or name)
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Delete bookmarks
    #[command(alias = "delete")]
    Rm {
        /// Bookmark ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Add a tag to bookmarks
    Tag {
        /// Tag id or name
        tag: String,
        /// Bookmark ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove a tag from bookmarks
    Untag {
        /// Tag id or name
        tag: String,
        /// Bookmark ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TagCommands {
    /// List all tags with usage counts
    #[command(alias = "ls")]
    List,
    /// Create a tag
    #[command(alias = "add")]
    Create {
        name: String,
        /// Display color
        #[arg(short, long, default_value = "#6b7280")]
        color: String,
    },
    /// Toggle a tag's favorite flag
    Favorite {
        /// Tag id or name
        tag: String,
    },
    /// Delete a tag
    #[command(alias = "delete")]
    Rm {
        /// Tag id or name
        tag: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, debounce_ms, recently_closed_limit, log_level)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DomainArg {
    Tabs,
    Bookmarks,
}

impl From<DomainArg> for Domain {
    fn from(arg: DomainArg) -> Self {
        match arg {
            DomainArg::Tabs => Domain::Tabs,
            DomainArg::Bookmarks => Domain::Bookmarks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortArg {
    Index,
    Title,
    Url,
    Domain,
    Saved,
    Accessed,
}

impl From<SortArg> for SortProp {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Index => SortProp::Index,
            SortArg::Title => SortProp::Title,
            SortArg::Url => SortProp::Url,
            SortArg::Domain => SortProp::Domain,
            SortArg::Saved => SortProp::SavedAt,
            SortArg::Accessed => SortProp::LastAccessed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GroupArg {
    None,
    Tag,
    Window,
    Domain,
}

impl From<GroupArg> for Grouping {
    fn from(arg: GroupArg) -> Self {
        match arg {
            GroupArg::None => Grouping::None,
            GroupArg::Tag => Grouping::Tag,
            GroupArg::Window => Grouping::Window,
            GroupArg::Domain => Grouping::Domain,
        }
    }
}

impl ListArgs {
    fn sort(&self) -> Sort {
        Sort::new(self.sort.into(), direction(self.desc))
    }

    fn group_sort(&self) -> GroupSort {
        GroupSort {
            by: if self.by_size {
                GroupOrder::Size
            } else {
                GroupOrder::Key
            },
            dir: direction(self.desc),
        }
    }
}

fn direction(desc: bool) -> SortDir {
    if desc {
        SortDir::Desc
    } else {
        SortDir::Asc
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config);

    let storage = Arc::new(
        SqliteStorage::open(&config.sqlite_path())
            .with_context(|| format!("Failed to open {:?}", config.sqlite_path()))?,
    );

    // Migration runs on its own so the command can report the marker
    if let Commands::Migrate { cleanup } = cli.command {
        return commands::migrate::run(storage, cleanup, &output).await;
    }

    let medium: Arc<dyn StorageMedium> = storage.clone();
    let mut engine = Engine::init(medium, config).await;

    let result = match cli.command {
        Commands::Status => commands::status::show(&engine, &storage, &output).await,
        Commands::List(args) => commands::list::list(&engine, &args, &output),
        Commands::Bookmark { command } => handle_bookmark_command(command, &mut engine, &output),
        Commands::Tag { command } => handle_tag_command(command, &engine, &output),
        Commands::Curate { pick } => commands::curate::queue(&engine, pick, &output),
        Commands::Config { .. } | Commands::Migrate { .. } => Ok(()), // Handled above
    };

    engine.dispose().await;
    result
}

fn handle_bookmark_command(
    command: BookmarkCommands,
    engine: &mut Engine,
    output: &Output,
) -> Result<()> {
    match command {
        BookmarkCommands::Add { url, title, tag } => {
            commands::bookmark::add(engine, url, title, tag, output)
        }
        BookmarkCommands::Rm { ids } => commands::bookmark::remove(engine, ids, output),
        BookmarkCommands::Tag { tag, ids } => commands::bookmark::tag(engine, tag, ids, output),
        BookmarkCommands::Untag { tag, ids } => {
            commands::bookmark::untag(engine, tag, ids, output)
        }
    }
}

fn handle_tag_command(
    command: Option<TagCommands>,
    engine: &Engine,
    output: &Output,
) -> Result<()> {
    match command {
        Some(TagCommands::List) | None => commands::tag::list(engine, output),
        Some(TagCommands::Create { name, color }) => {
            commands::tag::create(engine, name, color, output)
        }
        Some(TagCommands::Favorite { tag }) => commands::tag::favorite(engine, tag, output),
        Some(TagCommands::Rm { tag }) => commands::tag::delete(engine, tag, output),
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Log to stderr, filtered by TABKEEP_LOG or the configured level
fn init_logging(config: &Config) {
    let level = config.log_level.as_deref().unwrap_or("warn");
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(format!("tabkeep_core={},tabkeep_cli={}", level, level))
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
