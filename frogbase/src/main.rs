//! frogbase - searchable library of spoken media
//!
//! Subcommands operate on one library under the data root. `serve` exposes
//! the same library over HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frogbase::config::{FrogBaseConfig, SearchStrategy};
use frogbase::db::media::MediaFilter;
use frogbase::export::TranscriptFormat;
use frogbase::models::{AddSummary, MediaStatus, OutcomeStatus, SourceKind};
use frogbase::{AppState, Library};
use frogbase_common::config::{resolve_config_path, LoggingConfig};
use frogbase_common::events::IngestEvent;

/// Command-line arguments for frogbase
#[derive(Parser, Debug)]
#[command(name = "frogbase")]
#[command(about = "Searchable library of spoken media")]
#[command(version)]
struct Args {
    /// Data root holding the libraries
    #[arg(long, global = true, env = "FROGBASE_ROOT")]
    root: Option<PathBuf>,

    /// Library to operate on
    #[arg(short, long, global = true, env = "FROGBASE_LIBRARY")]
    library: Option<String>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "FROGBASE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1", env = "FROGBASE_HOST")]
        host: String,

        #[arg(short, long, default_value = "5780", env = "FROGBASE_PORT")]
        port: u16,
    },

    /// Add URLs, playlists, files or folders
    Add {
        #[arg(required = true)]
        sources: Vec<String>,

        /// Concurrent items
        #[arg(short, long)]
        workers: Option<usize>,

        /// Descend into sub-directories of folder sources
        #[arg(short, long)]
        recursive: bool,

        /// Move local files into the library instead of copying
        #[arg(long)]
        move_files: bool,
    },

    /// Search segment text
    Search {
        query: String,

        #[arg(short)]
        k: Option<usize>,

        /// semantic, substring or hybrid
        #[arg(short, long)]
        strategy: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List media items, newest first
    List {
        #[arg(short, long)]
        title: Option<String>,

        #[arg(long)]
        status: Option<String>,

        /// remote_video, remote_playlist, local_file or local_directory
        #[arg(long)]
        kind: Option<String>,

        #[arg(short = 'n', long)]
        limit: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Show one media item and its segments
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Write one media item's transcript as vtt, srt or json
    Export {
        id: String,

        #[arg(short, long, default_value = "vtt")]
        format: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild the index from stored embeddings
    RebuildIndex,

    /// List libraries under the data root
    Libraries,

    /// Delete a library and all of its files
    RemoveLibrary {
        name: String,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = FrogBaseConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    let root = config.resolve_root(args.root.as_deref());
    let library_name = config.resolve_library(args.library.as_deref());
    info!("Root folder: {}", root.display());
    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }

    match args.command {
        Command::Serve { host, port } => {
            let library = open_library(&root, &library_name, &config).await?;
            serve(library, &host, port).await?;
        }

        Command::Add {
            sources,
            workers,
            recursive,
            move_files,
        } => {
            if let Some(workers) = workers {
                config.settings.pipeline.workers = workers;
            }
            config.settings.fetch.recursive |= recursive;
            config.settings.fetch.move_files |= move_files;

            let library = open_library(&root, &library_name, &config).await?;
            let summary = add(&library, &sources).await;
            print_summary(&summary);
            library.close().await;
            if summary.failed() > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Search {
            query,
            k,
            strategy,
            json,
        } => {
            let library = open_library(&root, &library_name, &config).await?;
            let strategy = match strategy {
                Some(s) => s.parse::<SearchStrategy>()?,
                None => config.settings.search.strategy,
            };
            let k = k.unwrap_or(config.settings.search.default_k);
            let hits = library.search_with(&query, k, strategy).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results");
            } else {
                for (rank, hit) in hits.iter().enumerate() {
                    println!(
                        "{:>3}. {:.3}  {}  [{} - {}]  {}",
                        rank + 1,
                        hit.score,
                        hit.media.title,
                        format_time(hit.start),
                        format_time(hit.end),
                        hit.text
                    );
                }
            }
            library.close().await;
        }

        Command::List {
            title,
            status,
            kind,
            limit,
            json,
        } => {
            let library = open_library(&root, &library_name, &config).await?;
            let filter = MediaFilter {
                title,
                source_kind: kind.map(|k| k.parse::<SourceKind>()).transpose()?,
                status: status.map(|s| s.parse::<MediaStatus>()).transpose()?,
                limit,
            };
            let items = library.list_media(&filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in &items {
                    println!(
                        "{:<16}  {:<20}  {:>8}  {}",
                        item.id,
                        item.status,
                        item.duration_seconds.map(format_time).unwrap_or_default(),
                        item.title
                    );
                }
                println!("{} item(s)", items.len());
            }
            library.close().await;
        }

        Command::Show { id, json } => {
            let library = open_library(&root, &library_name, &config).await?;
            let detail = library.media_detail(&id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                let media = &detail.media;
                println!("{} ({})", media.title, media.id);
                println!("  source:   {}", media.source);
                println!("  status:   {}", media.status);
                if let Some(error) = &media.error {
                    println!("  error:    {}", error);
                }
                if let Some(path) = &media.local_path {
                    println!("  file:     {}", library.dir().join(path).display());
                }
                for segment in &detail.segments {
                    println!(
                        "  [{} - {}] {}",
                        format_time(segment.start_seconds),
                        format_time(segment.end_seconds),
                        segment.text
                    );
                }
            }
            library.close().await;
        }

        Command::Export { id, format, output } => {
            let format = format.parse::<TranscriptFormat>()?;
            let library = open_library(&root, &library_name, &config).await?;
            let transcript = library.export_transcript(&id, format).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, transcript)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(media_id = %id, path = %path.display(), "Transcript exported");
                }
                None => print!("{}", transcript),
            }
            library.close().await;
        }

        Command::RebuildIndex => {
            let library = open_library(&root, &library_name, &config).await?;
            let entries = library.rebuild_index().await?;
            println!("Index rebuilt with {} entries", entries);
            library.close().await;
        }

        Command::Libraries => {
            for name in frogbase::list_libraries(&root).await? {
                println!("{}", name);
            }
        }

        Command::RemoveLibrary { name, yes } => {
            if !yes {
                anyhow::bail!(
                    "Refusing to delete library '{}' without --yes",
                    name
                );
            }
            frogbase::remove_library(&root, &name).await?;
            println!("Removed library {}", name);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("frogbase={level},frogbase_common={level},tower_http=info", level = logging.level)
            .into()
    });

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

async fn open_library(root: &Path, name: &str, config: &FrogBaseConfig) -> Result<Library> {
    Library::open(root, name, config.settings.clone())
        .await
        .with_context(|| format!("Failed to open library '{}'", name))
}

/// Run an add batch, printing progress and cancelling on Ctrl+C
async fn add(library: &Library, sources: &[String]) -> AddSummary {
    let mut rx = library.events().subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                IngestEvent::ItemResolved { title, .. } => eprintln!("  + {}", title),
                IngestEvent::StageCompleted {
                    media_id,
                    stage,
                    segment_count,
                    ..
                } => match segment_count {
                    Some(n) => eprintln!("    {} {} ({} segments)", media_id, stage, n),
                    None => eprintln!("    {} {}", media_id, stage),
                },
                IngestEvent::ItemSkipped { media_id, reason, .. } => {
                    eprintln!("  = {} skipped: {}", media_id, reason)
                }
                IngestEvent::ItemFailed {
                    source, message, ..
                } => eprintln!("  ! {}: {}", source, message),
                IngestEvent::BatchCompleted { .. } => break,
                IngestEvent::BatchStarted { .. } => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted: finishing items in progress");
            on_interrupt.cancel();
        }
    });

    let summary = library.add_with_cancel(sources, cancel).await;
    watcher.abort();
    let _ = printer.await;
    summary
}

fn print_summary(summary: &AddSummary) {
    println!(
        "Indexed {}, skipped {}, failed {}, cancelled {} in {:.1}s",
        summary.indexed(),
        summary.skipped(),
        summary.failed(),
        summary.cancelled(),
        summary.duration_ms as f64 / 1000.0
    );
    for outcome in &summary.outcomes {
        if outcome.status == OutcomeStatus::Failed {
            println!(
                "  {} [{}]: {}",
                outcome.source,
                outcome.error_kind.as_deref().unwrap_or("error"),
                outcome.error.as_deref().unwrap_or("")
            );
        }
    }
}

/// `h:mm:ss` or `m:ss`
fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

async fn serve(library: Library, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let state = AppState::new(Arc::new(library));
    let app = frogbase::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
