//! # Shelf CLI (`shelf`)
//!
//! The `shelf` binary manages a personal reading log: books and page
//! progress, a reading stopwatch, reading-time statistics, deadline goals,
//! goal reminders, and the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and tables |
//! | `shelf book add\|list\|progress\|delete` | Manage books |
//! | `shelf library [--watch]` | Status tabs with today/week reading time |
//! | `shelf session start\|log\|recent` | Time or record reading sessions |
//! | `shelf stats --period days\|weeks\|months` | Reading-time chart |
//! | `shelf goal add\|list\|bump\|delete` | Manage goals |
//! | `shelf notify check [--test]` / `shelf notify watch` | Goal reminders |
//! | `shelf serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! shelf init
//! shelf book add "Dune" --author "Frank Herbert" --pages 412
//! shelf book progress <id> 120
//! shelf session start <id>
//! shelf goal add "Autumn hours" --unit hours --hours 10 --deadline 2026-12-21
//! shelf notify check --test
//! ```

use anyhow::Result;
use chrono::{Local, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use shelf::client::{Client, UserScope};
use shelf::config::{self, Config};
use shelf::notify::{CheckMode, CheckOutcome, Dispatcher, NotificationManager};
use shelf::stopwatch::{self, Driver, SessionInput, StopDecision};
use shelf::{books, goals, library, logging, migrate, server, stats, wakelock};
use shelf_core::models::{BookStatus, Device, GoalUnit};
use shelf_core::reading_stats::{format_clock, Period};

/// Shelf CLI: a local-first reading tracker.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Shelf: track books, reading sessions and reading goals",
    version,
    long_about = "Shelf keeps a per-user reading log in a local SQLite database: books with \
    page progress, stopwatch-timed reading sessions, and goals with deadlines whose progress is \
    derived from what you read. Reminders point at the most urgent unfinished goal."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/shelf.toml`.
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    /// Act as this user instead of `[user].id` from the config.
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and its tables. Safe to run more
    /// than once.
    Init,

    /// Add, list, update or delete books.
    Book {
        #[command(subcommand)]
        action: BookAction,
    },

    /// Show books grouped by status with today's and this week's reading time.
    Library {
        /// Keep running and reprint whenever books or sessions change.
        #[arg(long)]
        watch: bool,
    },

    /// Time, record, or list reading sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Reading-time chart.
    Stats {
        /// Bucket size: `days` (last 7), `weeks` (last 4), or `months` (last 6).
        #[arg(long, default_value = "days")]
        period: Period,
    },

    /// Add, list, adjust or delete goals.
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Goal reminders.
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum BookAction {
    /// Add a book to the library.
    Add {
        title: String,
        #[arg(long)]
        author: String,
        /// Total page count.
        #[arg(long)]
        pages: String,
        /// Initial status: to-read (default), reading, or read.
        #[arg(long)]
        status: Option<BookStatus>,
    },
    /// List books, optionally only one status.
    List {
        #[arg(long)]
        status: Option<BookStatus>,
    },
    /// Set the current page. Status follows automatically.
    Progress {
        id: String,
        #[arg(allow_hyphen_values = true)]
        page: i64,
    },
    /// Delete a book.
    Delete { id: String },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Run the stopwatch for a book. Ctrl-C stops and saves.
    Start { book_id: String },
    /// Record a session that was timed elsewhere.
    Log { book_id: String, seconds: u64 },
    /// Show the five most recent sessions.
    Recent,
}

#[derive(Subcommand)]
enum GoalAction {
    /// Create a goal.
    Add {
        name: String,
        /// books, pages, hours, or chapters.
        #[arg(long)]
        unit: GoalUnit,
        /// Deadline date (YYYY-MM-DD); the goal ends at 23:59:59 that day.
        #[arg(long)]
        deadline: String,
        /// Target quantity.
        #[arg(long)]
        total: Option<f64>,
        /// Hours part of an hours target.
        #[arg(long)]
        hours: Option<f64>,
        /// Minutes part of an hours target.
        #[arg(long)]
        minutes: Option<f64>,
    },
    /// List goals with progress and urgency.
    List,
    /// Adjust a chapters goal. Negative values step back.
    Bump {
        id: String,
        #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
        by: f64,
    },
    /// Delete a goal.
    Delete { id: String },
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Check goals once and send a reminder if one is due.
    Check {
        /// Ignore the once-a-day limit and do not record this check.
        #[arg(long)]
        test: bool,
    },
    /// Keep checking on the configured schedule.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match &cli.command {
        Commands::Serve | Commands::Notify { action: NotifyAction::Watch } => "info",
        _ => "warn",
    };
    logging::init(default_filter);

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "shelf", &mut std::io::stdout());
        return Ok(());
    }

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(user) = cli.user {
        cfg.user.id = user;
        cfg.validate()?;
    }

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }
    if let Commands::Serve = cli.command {
        return server::run_server(&cfg).await;
    }

    let client = Client::open(&cfg).await?;
    let me = client.user(cfg.user.id.clone());

    match cli.command {
        Commands::Book { action } => run_book(&cfg, &me, action).await?,
        Commands::Library { watch } => library::run_library(&me, watch).await?,
        Commands::Session { action } => run_session(&cfg, &me, action).await?,
        Commands::Stats { period } => stats::run_stats(&me, period).await?,
        Commands::Goal { action } => run_goal(&cfg, &me, action).await?,
        Commands::Notify { action } => run_notify(&cfg, &me, action).await?,
        Commands::Init | Commands::Serve | Commands::Completions { .. } => {
            // Handled above
            unreachable!()
        }
    }

    Ok(())
}

async fn run_book(cfg: &Config, me: &UserScope, action: BookAction) -> Result<()> {
    match action {
        BookAction::Add {
            title,
            author,
            pages,
            status,
        } => {
            let input = books::BookInput {
                title,
                author,
                total_pages: serde_json::Value::String(pages),
                status,
            };
            let added = books::add(me, input, cfg.save.book_timeout()).await?;
            println!("Added book {} ({:?}).", added.id, added.saved);
        }
        BookAction::List { status } => {
            let list = books::list(me, status).await?;
            if list.is_empty() {
                println!("No books.");
            }
            for b in list {
                println!(
                    "{}  [{}]  {} by {}  {}/{} ({}%)",
                    b.id,
                    b.status.label(),
                    b.title,
                    b.author,
                    b.current_page,
                    b.total_pages,
                    b.percent_read()
                );
            }
        }
        BookAction::Progress { id, page } => {
            let book = books::update_progress(me, &id, page, Utc::now()).await?;
            println!(
                "{}: page {}/{} ({}%), {}",
                book.title,
                book.current_page,
                book.total_pages,
                book.percent_read(),
                book.status.label()
            );
        }
        BookAction::Delete { id } => {
            books::delete(me, &id).await?;
            println!("Deleted book {}.", id);
        }
    }
    Ok(())
}

async fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn run_stopwatch(cfg: &Config, me: &UserScope, book_id: &str) -> Result<()> {
    let mut driver = Driver::new(
        me.clone(),
        cfg.stopwatch.min_session_secs,
        wakelock::from_config(&cfg.stopwatch),
        Device::Desktop,
        cfg.save.timeout(),
    );
    driver.select_book(book_id).await?;
    driver.start().await?;

    let title = stopwatch::book_title(me, book_id).await?;
    eprintln!("Reading \"{}\". Press Ctrl-C to stop.", title);

    let live_clock = atty::is(atty::Stream::Stderr);
    let mut redraw = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = redraw.tick() => {
                if live_clock {
                    eprint!("\r{}", format_clock(driver.elapsed().await));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    if live_clock {
        eprintln!();
    }

    if let StopDecision::ConfirmDiscard { elapsed } = driver.stop().await {
        let prompt = format!("Only {} seconds. Discard this session?", elapsed);
        if confirm(&prompt).await? {
            driver.reset().await;
            println!("Session discarded.");
            return Ok(());
        }
    }

    let recorded = driver.save().await?;
    println!(
        "Saved {} of reading ({:?}).",
        format_clock(recorded.duration_seconds),
        recorded.saved
    );
    Ok(())
}

async fn run_session(cfg: &Config, me: &UserScope, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Start { book_id } => run_stopwatch(cfg, me, &book_id).await?,
        SessionAction::Log { book_id, seconds } => {
            let input = SessionInput {
                book_id,
                duration_seconds: seconds,
            };
            let recorded = stopwatch::log_session(me, input, Device::Desktop, cfg.save.timeout()).await?;
            println!(
                "Recorded {} ({:?}).",
                format_clock(recorded.duration_seconds),
                recorded.saved
            );
        }
        SessionAction::Recent => stats::run_recent(me).await?,
    }
    Ok(())
}

async fn run_goal(cfg: &Config, me: &UserScope, action: GoalAction) -> Result<()> {
    match action {
        GoalAction::Add {
            name,
            unit,
            deadline,
            total,
            hours,
            minutes,
        } => {
            let input = goals::GoalInput {
                name,
                unit,
                total,
                hours,
                minutes,
                deadline,
            };
            let added = goals::create(me, input, cfg.save.timeout()).await?;
            println!("Added goal {} ({:?}).", added.id, added.saved);
        }
        GoalAction::List => {
            goals::print_views(&goals::list(me, Utc::now()).await?);
        }
        GoalAction::Bump { id, by } => {
            let goal = goals::bump(me, &id, by).await?;
            println!("{}: {}/{} {}", goal.name, goal.current, goal.total, goal.unit);
        }
        GoalAction::Delete { id } => {
            goals::delete(me, &id).await?;
            println!("Deleted goal {}.", id);
        }
    }
    Ok(())
}

async fn run_notify(cfg: &Config, me: &UserScope, action: NotifyAction) -> Result<()> {
    let dispatcher = Dispatcher::from_config(&cfg.notifications)?;
    let manager = NotificationManager::new(me.clone(), &cfg.notifications, dispatcher);

    match action {
        NotifyAction::Check { test } => {
            let mode = if test { CheckMode::Manual } else { CheckMode::Scheduled };
            match manager.check(mode, &Local::now()).await? {
                CheckOutcome::Throttled => println!("Already reminded today."),
                CheckOutcome::NothingPending => println!("0 pending goals."),
                CheckOutcome::Delivered { channel, reminder } => {
                    println!("Sent via {}: {} | {}", channel, reminder.title, reminder.body)
                }
                CheckOutcome::Undelivered { reminder } => {
                    println!("No channel accepted: {} | {}", reminder.title, reminder.body)
                }
            }
        }
        NotifyAction::Watch => {
            tokio::select! {
                _ = manager.run() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }
    Ok(())
}
