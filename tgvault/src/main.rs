//! tgvault - catalogue, export, and chart Telegram chat history
//!
//! Subcommands cover the catalogue (chat list + categories), the
//! resumable per-chat text export, and the day-bucketed message
//! statistics. The remote platform sits behind the messenger port;
//! this binary wires in the local archive backend configured under
//! `[archive]` in the config file.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/tgvault/tgvault.db
//! - Exports:  $XDG_DATA_HOME/tgvault/exports/
//! - Logs:     $XDG_STATE_HOME/tgvault/tgvault.log
//! - Config:   $XDG_CONFIG_HOME/tgvault/config.toml

mod archive;

use anyhow::{bail, Context, Result};
use archive::ArchiveClient;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tgvault_core::export::{export_dir, CheckpointStore};
use tgvault_core::{Config, Database, IngestCoordinator, MessengerClient};

#[derive(Parser)]
#[command(name = "tgvault")]
#[command(about = "Catalogue, export, and chart Telegram chat history")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalogued chats with their categories
    Chats,
    /// Pull the chat list from the backend and replace the catalogue
    RefreshChats,
    /// Manage categories and their assignment to chats
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Export a chat's history to text files, resuming from its
    /// checkpoint
    Export {
        /// Platform id of the chat (see `tgvault chats`)
        chat_id: i64,
        /// Word budget per export file (overrides config)
        #[arg(long)]
        words_per_file: Option<u64>,
    },
    /// Per-day message statistics
    #[command(subcommand)]
    Stats(StatsCommand),
    /// Show backend, catalogue, and checkpoint status
    Status,
}

#[derive(Subcommand)]
enum CategoryCommand {
    /// Create a new category
    Create { name: String },
    /// List categories, optionally filtered
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Assign a category to a chat
    Assign { chat_id: i64, name: String },
    /// Remove a category from a chat
    Unassign { chat_id: i64, name: String },
}

#[derive(Subcommand)]
enum StatsCommand {
    /// Re-pull the full history and rebuild the snapshot
    Refresh { chat_id: i64 },
    /// Print the per-day message counts
    Daily { chat_id: i64 },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        tgvault_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("tgvault starting");

    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    match args.command {
        Command::Chats => list_chats(&db),
        Command::RefreshChats => {
            let client = backend(&config)?;
            let coordinator = IngestCoordinator::new(db, &config);
            let count = coordinator.sync_catalog(&client).await?;
            println!("Catalogue refreshed: {} chat(s)", count);
            Ok(())
        }
        Command::Category(cmd) => run_category(&db, cmd),
        Command::Export {
            chat_id,
            words_per_file,
        } => {
            let mut config = config;
            if let Some(words) = words_per_file {
                config.export.words_per_file = words;
            }
            let client = backend(&config)?;
            run_export(db, &config, &client, chat_id).await
        }
        Command::Stats(StatsCommand::Refresh { chat_id }) => {
            let client = backend(&config)?;
            let coordinator = IngestCoordinator::new(db, &config);
            let outcome = coordinator.refresh_stats(&client, chat_id).await?;
            println!(
                "Stats refreshed: {} message(s) across {} day(s)",
                outcome.total_messages, outcome.total_days
            );
            Ok(())
        }
        Command::Stats(StatsCommand::Daily { chat_id }) => {
            for bucket in db.daily_counts(chat_id)? {
                println!("{}  {}", bucket.date, bucket.count);
            }
            Ok(())
        }
        Command::Status => status(&db, &config).await,
    }
}

/// Build the configured messenger backend.
fn backend(config: &Config) -> Result<ArchiveClient> {
    let Some(root) = config.archive.root.clone() else {
        bail!(
            "no backend configured: set archive.root in {}",
            Config::config_path().display()
        );
    };
    Ok(ArchiveClient::new(root))
}

fn list_chats(db: &Database) -> Result<()> {
    let listings = db.list_chats_with_categories()?;
    if listings.is_empty() {
        println!("Catalogue is empty. Run `tgvault refresh-chats` first.");
        return Ok(());
    }

    println!(
        "{:>14}  {:<8}  {:>7}  {:<32}  {}",
        "ID", "KIND", "MEMBERS", "TITLE", "CATEGORIES"
    );
    for listing in listings {
        let chat = &listing.chat;
        println!(
            "{:>14}  {:<8}  {:>7}  {:<32}  {}",
            chat.id,
            chat.kind.display_name(),
            chat.participants
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            chat.title,
            listing.categories.join(", ")
        );
    }
    Ok(())
}

fn run_category(db: &Database, cmd: CategoryCommand) -> Result<()> {
    match cmd {
        CategoryCommand::Create { name } => {
            let id = db
                .create_category(&name)
                .with_context(|| format!("failed to create category '{}'", name))?;
            println!("Created category '{}' (#{})", name, id);
        }
        CategoryCommand::List { search } => {
            let categories = match search {
                Some(term) => db.search_categories(&term)?,
                None => db.list_categories()?,
            };
            for category in categories {
                println!("{:>5}  {}", category.id, category.name);
            }
        }
        CategoryCommand::Assign { chat_id, name } => {
            let category = find_category(db, &name)?;
            if db.assign_category(chat_id, category.id)? {
                println!("Assigned '{}' to chat {}", category.name, chat_id);
            } else {
                println!("Chat {} already has '{}'", chat_id, category.name);
            }
        }
        CategoryCommand::Unassign { chat_id, name } => {
            let category = find_category(db, &name)?;
            db.unassign_category(chat_id, category.id)?;
            println!("Removed '{}' from chat {}", category.name, chat_id);
        }
    }
    Ok(())
}

fn find_category(db: &Database, name: &str) -> Result<tgvault_core::Category> {
    db.list_categories()?
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .with_context(|| format!("no category named '{}'", name))
}

async fn run_export(
    db: Database,
    config: &Config,
    client: &dyn MessengerClient,
    chat_id: i64,
) -> Result<()> {
    let coordinator = IngestCoordinator::new(db, config);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let outcome = coordinator
        .export_chat_with_progress(client, chat_id, |processed| {
            pb.set_message(format!("{} message(s) processed", processed));
        })
        .await;
    pb.finish_and_clear();

    let outcome = outcome.with_context(|| format!("export of chat {} failed", chat_id))?;
    println!("Export complete:");
    println!("  Messages written: {}", outcome.messages_written);
    println!("  Files used:       {}", outcome.files_used);
    println!("  Directory:        {}", outcome.directory.display());
    Ok(())
}

async fn status(db: &Database, config: &Config) -> Result<()> {
    println!("Database: {}", Config::database_path().display());
    println!("Exports:  {}", config.exports_dir().display());
    match config.api_credentials() {
        Some(api) => println!("API app:  configured (id {})", api.api_id),
        None => println!("API app:  not configured"),
    }

    match config.archive.root.as_ref() {
        Some(root) => {
            println!("Backend:  archive at {}", root.display());
            let client = ArchiveClient::new(root.clone());
            if client.is_authorized().await? {
                if let Some(name) = client.account_name().await? {
                    println!("Account:  {}", name);
                }
            } else {
                println!("Account:  not available (archive index missing)");
            }
        }
        None => println!("Backend:  not configured"),
    }

    let chats = db.list_chats()?;
    println!("Catalogue: {} chat(s)", chats.len());

    let exports_root = config.exports_dir();
    for chat in &chats {
        let store = CheckpointStore::new(&export_dir(&exports_root, chat));
        if let Some(cp) = store.load()? {
            println!(
                "  {} ({}): exported through id {} into {} file(s), updated {}",
                chat.title,
                chat.id,
                cp.last_message_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                cp.last_file_index,
                cp.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
    Ok(())
}
