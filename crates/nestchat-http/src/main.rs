use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use nestchat_http::app::{self, AppState};
use nestchat_http::diag;
use nestchat_local::{
    BoundedRunner, ChatEngine, EngineConfig, Extractor, JsonResourceStore, MemorySessionStore,
    ModelSelector,
};

#[derive(Parser, Debug)]
#[command(name = "nestchat")]
#[command(version, about = "Chat over extracted resource text (Gemini-backed)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP chat service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "NESTCHAT_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
        /// Resource manifest (JSON array of {id, kind, ...} entries).
        #[arg(long, env = "NESTCHAT_RESOURCES", default_value = "resources.json")]
        resources: PathBuf,
        /// Directory that relative PDF paths in the manifest resolve against.
        #[arg(long, env = "NESTCHAT_UPLOADS_ROOT", default_value = "uploads")]
        uploads_root: PathBuf,
    },
    /// Print the effective configuration as JSON (never the key itself).
    Doctor,
    /// List the models visible to the configured API key.
    ListModels,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = EngineConfig::from_env();
    match cli.command {
        Commands::Serve { bind, resources, uploads_root } => {
            serve(cfg, bind, &resources, &uploads_root).await
        }
        Commands::Doctor => {
            println!("{}", serde_json::to_string_pretty(&diag::doctor_report(&cfg))?);
            Ok(())
        }
        Commands::ListModels => list_models(cfg).await,
    }
}

async fn serve(
    cfg: EngineConfig,
    bind: SocketAddr,
    resources: &Path,
    uploads_root: &Path,
) -> Result<()> {
    let extractor = Extractor::new(&cfg).context("building http client")?;
    let store = JsonResourceStore::load(resources, uploads_root)
        .with_context(|| format!("loading resource manifest {}", resources.display()))?;
    tracing::info!(resources = store.len(), "resource manifest loaded");

    let runner = BoundedRunner::new(cfg.max_calls);
    let selector = ModelSelector::new(
        extractor.http_client(),
        cfg.gemini_base_url.clone(),
        cfg.api_key.clone(),
        cfg.model_candidates.clone(),
        cfg.probe_budget,
        runner.clone(),
    );
    let engine = ChatEngine::new(selector, runner, cfg.chat_budget);

    if engine.configured() {
        engine.warm_up().await;
        match engine.model_name().await {
            Some(model) => tracing::info!(%model, "model ready"),
            None => tracing::warn!("no model candidate answered the probe; chat will report errors"),
        }
    } else {
        tracing::warn!("no Gemini API key configured; chat will report errors");
    }

    let state = Arc::new(AppState {
        engine,
        extractor,
        resources: Arc::new(store),
        sessions: Arc::new(MemorySessionStore::default()),
    });
    let router = app::router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn list_models(cfg: EngineConfig) -> Result<()> {
    let Some(key) = cfg.api_key.as_deref() else {
        anyhow::bail!("no API key configured; set GEMINI_API_KEY or NESTCHAT_GEMINI_API_KEY");
    };
    let client = reqwest::Client::new();
    let models =
        nestchat_local::list_models(&client, &cfg.gemini_base_url, key, cfg.probe_budget)
            .await
            .map_err(|e| anyhow::anyhow!("listing models failed: {e}"))?;
    if models.is_empty() {
        println!("no models visible to this key");
    } else {
        print!("{}", diag::render_models(&models));
    }
    Ok(())
}
