// SPDX-License-Identifier: MPL-2.0

//! Command-line front end for the runestone catalog cache.

use chrono::Utc;
use clap::{Parser, Subcommand};
use runestones::cache::{BoundingBox, CacheEvent};
use runestones::config::DEFAULT_SEARCH_LIMIT;
use runestones::runtime;
use runestones::state::Backend;
use runestones::{RunestonesApp, Settings, User};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "runestones", version, about = "Offline-first runestone catalog")]
struct Cli {
    /// Storage backend for the local mirror
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Directory holding the local mirror
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Signed-in user for visited commands
#[derive(clap::Args)]
struct UserArgs {
    #[arg(long, env = "RUNESTONES_USER_ID")]
    user_id: String,

    #[arg(long, env = "RUNESTONES_ACCESS_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Subcommand)]
enum Command {
    /// Force a full refresh from the remote catalog
    Sync,
    /// Print every runestone
    List,
    /// Free-text search
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Runestones inside a bounding box
    Bounds {
        #[arg(long, allow_negative_numbers = true)]
        west: f64,
        #[arg(long, allow_negative_numbers = true)]
        south: f64,
        #[arg(long, allow_negative_numbers = true)]
        east: f64,
        #[arg(long, allow_negative_numbers = true)]
        north: f64,
    },
    /// Look up a runestone by slug
    Show { slug: String },
    /// Delete the local mirror
    Clear,
    /// Mirror health
    Status,
    /// Visited runestones of a user
    Visited {
        #[command(flatten)]
        user: UserArgs,
    },
    /// Mark a runestone as visited
    Mark {
        id: i64,
        #[command(flatten)]
        user: UserArgs,
    },
    /// Remove a visit
    Unmark {
        id: i64,
        #[command(flatten)]
        user: UserArgs,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<CacheEvent>) {
    while let Ok(event) = events.recv().await {
        tracing::debug!(?event, "cache changed");
    }
}

async fn sign_in(app: &RunestonesApp, user: UserArgs) -> Result<(), Box<dyn std::error::Error>> {
    // The token is only issued to verified accounts
    let account = User {
        id: user.user_id,
        email: None,
        email_confirmed_at: Some(Utc::now()),
    };
    app.sign_in(&account, Some(user.token)).await?;
    Ok(())
}

async fn run(app: RunestonesApp, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Sync => {
            let count = app.refresh().await?;
            print_json(&serde_json::json!({ "count": count }))
        }
        Command::List => print_json(&app.all().await?),
        Command::Search { query, limit } => print_json(&app.search(&query, limit).await?),
        Command::Bounds {
            west,
            south,
            east,
            north,
        } => {
            let bbox = BoundingBox::new(west, south, east, north);
            print_json(&app.in_bounds(bbox).await?)
        }
        Command::Show { slug } => match app.by_slug(&slug).await? {
            Some(stone) => print_json(&stone),
            None => Err(format!("no runestone with slug {slug:?}").into()),
        },
        Command::Clear => {
            app.clear().await?;
            eprintln!("Local mirror cleared");
            Ok(())
        }
        Command::Status => print_json(&app.status().await?),
        Command::Visited { user } => {
            sign_in(&app, user).await?;
            let total = app.cache().options().expected_total;
            print_json(&serde_json::json!({
                "count": app.visited().visited_count(),
                "completion_percentage": app.visited().completion_percentage(total),
                "runestones": app.visited_details().await?,
            }))
        }
        Command::Mark { id, user } => {
            sign_in(&app, user).await?;
            app.mark_visited(id).await?;
            eprintln!("Marked {id} as visited");
            Ok(())
        }
        Command::Unmark { id, user } => {
            sign_in(&app, user).await?;
            app.unmark_visited(id).await?;
            eprintln!("Removed visit to {id}");
            Ok(())
        }
    }
}

fn start(settings: &Settings, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let app = RunestonesApp::new(settings)?;
    runtime::spawn(log_events(app.subscribe()))?;
    runtime::block_on(run(app, command))?
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = Some(dir);
    }

    if let Err(err) = start(&settings, cli.command) {
        eprintln!("runestones: {err}");
        std::process::exit(1);
    }
}
