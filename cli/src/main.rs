//! `docwatch`: watch a content directory, render documents into an output
//! directory, and optionally serve the output over HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docwatch_render::MarkdownConverter;
use docwatch_watcher::{Converter, ServeCoordinator, WatchConfig, WatchLoop, parse_duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "docwatch", version, about = "Watch, render and serve a document tree")]
struct Cli {
    /// TOML config file; command-line flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the content directory and mirror it into the output directory
    Watch(WatchArgs),

    /// Watch, and serve the output directory over HTTP
    Serve {
        #[command(flatten)]
        watch: WatchArgs,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
}

#[derive(Debug, Args)]
struct WatchArgs {
    /// Content directory to watch [default: content]
    #[arg(long)]
    content: Option<PathBuf>,

    /// Output directory [default: output]
    #[arg(long)]
    output: Option<PathBuf>,

    /// Extension of files to render [default: md]
    #[arg(long = "ext")]
    extension: Option<String>,

    /// Polling interval, e.g. 500ms, 2s [default: 1s]
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Keep existing files in the output directory
    #[arg(long)]
    no_clean: bool,

    /// Follow symbolic links in the content directory
    #[arg(long)]
    follow_symlinks: bool,
}

impl WatchArgs {
    /// Overlay the flags that were given on `config`.
    fn apply(self, mut config: WatchConfig) -> WatchConfig {
        if let Some(content) = self.content {
            config.content_dir = content;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(extension) = self.extension {
            config.extension = extension;
        }
        if let Some(interval) = self.interval {
            config.poll_interval = interval;
        }
        if self.no_clean {
            config.clean_output_on_start = false;
        }
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }
        config
    }
}

fn load_base_config(path: Option<&Path>) -> Result<WatchConfig> {
    match path {
        Some(path) => WatchConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(WatchConfig::default()),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Cancel `cancel` on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let base = load_base_config(cli.config.as_deref())?;
    let converter: Arc<dyn Converter> = Arc::new(MarkdownConverter::new());
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let stats = match cli.command {
        Command::Watch(args) => {
            let watch =
                WatchLoop::new(args.apply(base), converter).context("invalid watch settings")?;
            watch.run(cancel).await?
        }
        Command::Serve { watch, port } => {
            let watch =
                WatchLoop::new(watch.apply(base), converter).context("invalid watch settings")?;
            ServeCoordinator::new(watch)
                .activate_and_serve(port, cancel)
                .await?
        }
    };

    info!(
        "Stopped after {} polls: {} syncs, {} files changed, {} failed",
        stats.polls, stats.syncs, stats.files_changed, stats.files_failed
    );
    Ok(())
}
