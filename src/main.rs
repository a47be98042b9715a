use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::response::Html;
use clap::Parser;
use tower_http::services::{ServeDir, ServeFile};

use questcard::config::{CaptureConfig, SelectorSet};
use questcard::server::{AppState, router};
use questcard::store::{CardStore, MemoryCardStore, RedisCardStore};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Redis connection URL. Falls back to KV_URL; without either the card
    /// list lives in memory and is lost on restart.
    #[arg(long)]
    redis_url: Option<String>,

    /// YAML file overriding the build-page selector set.
    #[arg(long)]
    selectors: Option<PathBuf>,

    /// Bound on page navigation, in seconds.
    #[arg(long, default_value_t = 30)]
    nav_timeout_secs: u64,

    /// Bound on waiting for the capture region to appear, in seconds.
    #[arg(long, default_value_t = 20)]
    content_timeout_secs: u64,

    /// Static web assets directory (serve if exists).
    #[arg(long, default_value = "web/dist")]
    web_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    questcard::logging::init().context("init logging")?;

    let args = AppArgs::parse();
    tracing::debug!(?args, "parsed args");

    let selectors =
        SelectorSet::load_or_default(args.selectors.as_deref()).context("load selector set")?;
    let capture = Arc::new(CaptureConfig {
        selectors,
        nav_timeout: Duration::from_secs(args.nav_timeout_secs.max(1)),
        content_timeout: Duration::from_secs(args.content_timeout_secs.max(1)),
        ..CaptureConfig::default()
    });

    let redis_url = args
        .redis_url
        .or_else(|| std::env::var("KV_URL").ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let store: Arc<dyn CardStore> = match &redis_url {
        Some(redis_url) => {
            tracing::info!("using redis card store");
            Arc::new(
                RedisCardStore::connect(redis_url)
                    .await
                    .context("connect card store")?,
            )
        }
        None => {
            tracing::warn!("no redis url configured; cards will not survive restarts");
            Arc::new(MemoryCardStore::new())
        }
    };

    let mut app = router(AppState { store, capture });

    let web_index = args.web_dir.join("index.html");
    if web_index.exists() {
        let static_files = ServeDir::new(args.web_dir).not_found_service(ServeFile::new(web_index));
        app = app.fallback_service(static_files);
    } else {
        app = app.fallback(|| async {
            Html(
                r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>questcard</title></head>
  <body>
    <h1>questcard</h1>
    <p>web assets not found. Build the gallery into <code>web/dist</code> or run a dev server.</p>
  </body>
</html>
"#,
            )
        });
    }

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
