//! # Related Index CLI (`relidx`)
//!
//! The `relidx` binary runs the related-documents service and its one-shot
//! maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! relidx --config ./config/relidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relidx serve` | HTTP API + metrics flush + daily rebuild (leader) or sync (follower) |
//! | `relidx rebuild` | Rebuild the index from the content database and publish it |
//! | `relidx sync` | Adopt the snapshot the leader last published |
//! | `relidx related <id>` | Print the documents related to `<id>` |
//! | `relidx stats` | Summarize the local index |
//!
//! ## Examples
//!
//! ```bash
//! # Leader: build and publish right now instead of waiting for 09:00 UTC
//! relidx rebuild --config ./config/relidx.toml
//!
//! # Follower: pull the latest snapshot
//! RELIDX_ROLE=follower relidx sync
//!
//! # Ask for eight related posts
//! relidx related 1042 --count 8
//!
//! # Run the service with JSON logs
//! RUST_LOG=related_index=debug relidx serve --log-json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use related_index::config;
use related_index::scheduler::{self, ScheduledJob};
use related_index::server;
use related_index::services;
use related_index::stats;
use related_index::sync::SyncOutcome;
use related_index::telemetry;
use related_index_core::metrics::MetricsAggregator;
use related_index_core::models::ReplicaRole;

/// Related Index: related-documents similarity service with leader/follower
/// snapshot replication.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/relidx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "relidx",
    about = "Related Index: related-documents similarity service",
    version,
    long_about = "Related Index embeds published documents into a vector index, answers \
    'what is related to this document' queries over HTTP, and replicates the index from a \
    single leader to followers through an object-storage mirror."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/relidx.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API, the metrics flush loop, and the daily replica job.
    ///
    /// Leaders rebuild at `replica.leader_at` (default 09:00 UTC); followers
    /// sync at `replica.follower_at` (default 09:30 UTC).
    Serve,

    /// Rebuild the index from the content database and publish the snapshot.
    Rebuild,

    /// Adopt the snapshot currently published in the mirror.
    Sync,

    /// Print the ids of documents related to a document.
    Related {
        /// Document id in the content database.
        id: String,

        /// Maximum number of related ids to return.
        #[arg(long, default_value_t = server::DEFAULT_RESULTS)]
        count: usize,
    },

    /// Show alias, live name space, record counts, and database size.
    Stats,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(
        "related_index=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;
    let index = services::open_index(&cfg).await?;

    match cli.command {
        Commands::Serve => {
            let metrics = Arc::new(MetricsAggregator::new());

            let sink = telemetry::create_sink(&cfg.telemetry)?;
            let _flush = telemetry::run_flush_loop(
                metrics.clone(),
                sink,
                Duration::from_secs(cfg.telemetry.flush_secs),
            );

            let job: Arc<dyn ScheduledJob> = match cfg.replica.role {
                ReplicaRole::Leader => Arc::new(services::builder(&cfg, index.clone()).await?),
                ReplicaRole::Follower => Arc::new(services::synchronizer(&cfg, index.clone())?),
            };
            tracing::info!(role = %cfg.replica.role, job = job.name(), "starting replica");
            let _daily = scheduler::spawn_daily(job, cfg.replica.slot(), metrics.clone());

            let service = services::query_service(&cfg, index, metrics).await?;
            server::run_server(&cfg.server.bind, service).await?;
        }
        Commands::Rebuild => {
            let report = services::builder(&cfg, index).await?.rebuild().await?;
            println!("rebuild");
            println!("  fetched: {} documents", report.fetched);
            println!("  duplicates dropped: {}", report.duplicates);
            println!("  skipped (empty text): {}", report.skipped_empty);
            println!("  indexed: {}", report.indexed);
            println!("  objects published: {}", report.published);
            println!("ok");
        }
        Commands::Sync => {
            let outcome = services::synchronizer(&cfg, index)?.sync().await?;
            println!("sync");
            match outcome {
                SyncOutcome::Adopted { records } => println!("  adopted: {} records", records),
                SyncOutcome::Unchanged => {
                    println!("  unchanged: mirror empty or snapshot has no records")
                }
            }
            println!("ok");
        }
        Commands::Related { id, count } => {
            let metrics = Arc::new(MetricsAggregator::new());
            let service = services::query_service(&cfg, index, metrics).await?;
            let ids = service.find_related(&id, count).await?;
            if ids.is_empty() {
                println!("No related documents.");
            }
            for (rank, related) in ids.iter().enumerate() {
                println!("{:>3}. {}", rank + 1, related);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg, &index).await?;
        }
    }

    Ok(())
}
