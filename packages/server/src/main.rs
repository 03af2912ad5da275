use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use voxweave::{ModelResidencyController, RemoteEngine, ServiceConfig, TtsService, VoiceStore};
use voxweave_domain::ResidencyPolicy;
use voxweave_server::{AppState, router};

#[derive(Parser, Debug)]
#[command(author, version, about = "voxweave speech synthesis server")]
struct Args {
    /// TOML configuration file. Defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Keep the model on the CPU between requests.
    #[arg(long)]
    low_resource: bool,
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("voxweave=info".parse()?)
                .add_directive("voxweave_server=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut config = ServiceConfig::discover(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.low_resource {
        config.residency.low_resource = true;
    }
    config.validate()?;

    let mut engine = RemoteEngine::new(
        &config.engine.base_url,
        Duration::from_secs(config.engine.request_timeout_secs),
        config.engine.stream_block_samples,
        tokio::runtime::Handle::current(),
    )?;
    engine
        .probe()
        .await
        .with_context(|| format!("inference backend at {}", config.engine.base_url))?;

    let policy: ResidencyPolicy = config.residency.policy();
    let residency = tokio::task::spawn_blocking(move || {
        ModelResidencyController::start(Box::new(engine), policy)
    })
    .await??;

    let mut store = VoiceStore::new(config.paths.voices_dir.clone())
        .with_download_timeout(Duration::from_secs(config.engine.download_timeout_secs))?;
    if let Some(library) = &config.paths.voice_library {
        store = store.with_library_file(library)?;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let service = TtsService::new(config, store, residency)?;
    let app = router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "voxweave server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
