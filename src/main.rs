use anyhow::Context;
use clap::Parser;
use maestro::app::AppContext;
use maestro::cleanup::cleanup_all_sessions;
use maestro::cli::Cli;
use maestro::infrastructure::config::load_settings_service;
use maestro::infrastructure::events::log_emitter;
use maestro::infrastructure::logging::init_logging;
use maestro::status_api::StatusEndpoint;
use mimalloc::MiMalloc;
use tokio::sync::oneshot;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging();

    if let Err(e) = run(cli).await {
        log::error!("Maestro exited with error: {e:#}");
        eprintln!("maestro: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings_service().map_err(anyhow::Error::msg)?;
    let root = match &cli.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };

    let emitter = log_emitter();
    let ctx = AppContext::new(&root, &settings, emitter.clone())
        .with_context(|| format!("Failed to open workspace at {}", root.display()))?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let status_server = if cli.no_status {
        log::info!("Status endpoint disabled");
        None
    } else {
        let endpoint = StatusEndpoint::bootstrap(cli.port_range(settings.status_port_range()))?;
        log::info!("Status endpoint listening on http://{}", endpoint.local_addr());
        let counts = ctx.manager.subscribe();
        Some(tokio::spawn(endpoint.serve(counts, emitter, async move {
            let _ = stop_rx.await;
        })))
    };

    ctx.manager.mount().await;
    log::info!(
        "Workspace '{}' mounted with {} slot(s), press Ctrl-C to exit",
        ctx.workspace.name(),
        ctx.manager.counts().slots
    );

    let signal = tokio::signal::ctrl_c().await;
    log::info!("Shutting down...");

    let _ = stop_tx.send(());
    let strays = cleanup_all_sessions(&ctx.manager, &ctx.workspace).await;
    if strays > 0 {
        log::warn!("Killed {strays} session(s) that were no longer tracked by a slot");
    }

    if let Some(server) = status_server {
        server.await.context("Status endpoint task panicked")??;
    }
    signal.context("Failed to listen for Ctrl-C")?;
    Ok(())
}
