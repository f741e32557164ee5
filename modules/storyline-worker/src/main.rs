mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use storyline_common::{AppConfig, FileConfig};
use storyline_handlers::{FcmChannel, HandlerDeps, NoopChannel, PushChannel};
use storyline_store::MemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "storyline-worker")]
#[command(about = "Run the storyline propagation handlers")]
#[command(version)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a store from a snapshot, replay logged client writes, print the result
    Replay {
        /// JSON tree to start from
        #[arg(long)]
        snapshot: PathBuf,

        /// JSON-lines log of `{"path": ..., "value": ...}` writes
        #[arg(long)]
        events: PathBuf,

        /// TOML config, overriding STORYLINE_CONFIG
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("storyline=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn push_channel(app: &AppConfig, config: &FileConfig) -> Arc<dyn PushChannel> {
    match &app.fcm_server_key {
        Some(key) if config.notifications.push_enabled => {
            let channel = FcmChannel::new(key.clone());
            match &app.fcm_endpoint {
                Some(endpoint) => Arc::new(channel.with_endpoint(endpoint.clone())),
                None => Arc::new(channel),
            }
        }
        _ => {
            info!("Push delivery disabled, using no-op channel");
            Arc::new(NoopChannel)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    info!("Storyline worker starting...");
    let app = AppConfig::from_env()?;

    match cli.command {
        Commands::Replay {
            snapshot,
            events,
            config,
        } => {
            let config = app.file_config(config.as_deref())?;
            let store = Arc::new(MemoryStore::from_value(replay::load_snapshot(&snapshot)?));
            let writes = replay::load_events(&events)?;
            info!(writes = writes.len(), snapshot = %snapshot.display(), "Replaying");

            let deps = HandlerDeps::builder()
                .store(store.clone())
                .push(push_channel(&app, &config))
                .config(config)
                .build();

            let summary = replay::replay(store.clone(), &deps, writes).await?;
            if !summary.report.is_clean() {
                info!(
                    failures = summary.report.failures.len(),
                    abandoned = summary.report.abandoned,
                    requeued = summary.report.requeued,
                    "Replay left events on the feed"
                );
            }

            println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        }
    }

    Ok(())
}
