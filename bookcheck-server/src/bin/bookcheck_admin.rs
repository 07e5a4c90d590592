//! bookcheck-admin - maintenance tasks run directly against the database

use std::path::PathBuf;

use anyhow::{Context, Result};
use bookcheck_common::config::{TomlConfig, DEFAULT_DATABASE_PATH, DEFAULT_UPLOADS_DIR};
use bookcheck_server::admin::{summary_line, Maintenance};
use bookcheck_server::db::init_database_pool;
use bookcheck_server::services::BookRepository;
use bookcheck_server::storage::AssetStore;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bookcheck-admin")]
#[command(about = "Maintenance tasks for the bookcheck database")]
#[command(version)]
struct Args {
    /// TOML config file (same format as bookcheck-server)
    #[arg(short, long, env = "BOOKCHECK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, env = "BOOKCHECK_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Directory holding uploaded covers and PDFs
    #[arg(long, env = "BOOKCHECK_UPLOADS_DIR", global = true)]
    uploads_dir: Option<PathBuf>,

    /// Report what would change without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every book as `id | title | owner | description`
    List,
    /// Replace empty or placeholder descriptions with a generated one
    FillDescriptions,
    /// Remove reviews left by test accounts
    PurgeTestData {
        /// Also delete books owned by test accounts
        #[arg(long)]
        delete_books: bool,
    },
    /// Delete books whose owner no longer exists
    DeleteOrphans,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookcheck_server=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let file = TomlConfig::load(args.config.as_deref()).context("Failed to read config file")?;

    let database = args
        .database
        .or(file.database_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
    let uploads_dir = args
        .uploads_dir
        .or(file.uploads_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR));

    let pool = init_database_pool(&database)
        .await
        .with_context(|| format!("Failed to open {}", database.display()))?;
    let books = BookRepository::new(pool.clone(), AssetStore::new(uploads_dir));
    let maintenance = Maintenance::new(pool, books, args.dry_run);

    if args.dry_run {
        println!("Dry run: no changes will be written");
    }

    match args.command {
        Command::List => {
            let books = maintenance.list().await?;
            for book in &books {
                println!("{}", summary_line(book));
            }
            println!("{} books", books.len());
        }
        Command::FillDescriptions => {
            let changed = maintenance.fill_descriptions().await?;
            for book in &changed {
                println!("{} | {} -> {}", book.id, book.title, book.description);
            }
            println!("Updated {} descriptions", changed.len());
        }
        Command::PurgeTestData { delete_books } => {
            let report = maintenance.purge_test_data(delete_books).await?;
            println!(
                "Scanned {} books, removed {} reviews from {} books",
                report.books_scanned, report.reviews_removed, report.books_touched
            );
            if delete_books {
                println!("Deleted {} books owned by test accounts", report.books_deleted);
            }
        }
        Command::DeleteOrphans => {
            let deleted = maintenance.delete_orphans().await?;
            for book in &deleted {
                println!("{} | {}", book.id, book.title);
            }
            println!("Deleted {} orphaned books", deleted.len());
        }
    }

    Ok(())
}
