use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paperfeed_adapters::Translator;
use paperfeed_storage::{MemoryPaperStore, PaperStore, PgPaperStore};
use paperfeed_sync::{maybe_build_scheduler, run_ingest_once, AppConfig};
use paperfeed_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "paperfeed")]
#[command(about = "Daily arXiv paper feed")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the daily ingestion job once and print its summary as JSON.
    Ingest,
    /// Apply pending database migrations.
    Migrate,
    /// Serve the HTTP API.
    Serve {
        /// Overrides PAPERFEED_WEB_PORT.
        #[arg(long)]
        port: Option<u16>,
        /// Apply migrations before accepting requests.
        #[arg(long)]
        migrate: bool,
        /// Keep papers in process memory instead of Postgres.
        #[arg(long)]
        memory: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperfeed=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn connect_store(config: &AppConfig) -> Result<PgPaperStore> {
    PgPaperStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to DATABASE_URL")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::Ingest => {
            let store = connect_store(&config).await?;
            let summary = run_ingest_once(&config, Arc::new(store)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Migrate => {
            connect_store(&config)
                .await?
                .migrate()
                .await
                .context("applying migrations")?;
            info!("migrations applied");
        }
        Commands::Serve {
            port,
            migrate,
            memory,
        } => {
            let cron_secret = config
                .cron_secret
                .clone()
                .context("CRON_SECRET must be set to serve the ingest trigger")?;

            let store: Arc<dyn PaperStore> = if memory {
                warn!("serving from an in-memory store; nothing survives a restart");
                Arc::new(MemoryPaperStore::new())
            } else {
                let store = connect_store(&config).await?;
                if migrate {
                    store.migrate().await.context("applying migrations")?;
                }
                Arc::new(store)
            };

            let translator = config
                .translator()?
                .map(|t| Arc::new(t) as Arc<dyn Translator>);
            if translator.is_none() {
                warn!("TRANSLATE_API_URL unset; translation webhook will fail inserts");
            }

            let state = AppState::new(
                store,
                Arc::new(config.arxiv_source()?),
                translator,
                cron_secret,
            );

            // Held for the lifetime of the server.
            let scheduler = maybe_build_scheduler(&config, state.pipeline().clone()).await?;
            if let Some(sched) = scheduler.as_ref() {
                sched.start().await.context("starting ingest scheduler")?;
            }

            paperfeed_web::serve(state, port.unwrap_or(config.web_port)).await?;
        }
    }

    Ok(())
}
