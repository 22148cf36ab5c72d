use anyhow::Context;
use clap::Parser;
use marketbrief_core::archive::ArchiveStore;
use marketbrief_core::config::Settings;
use marketbrief_core::pipeline::Pipeline;
use marketbrief_core::time::session;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "marketbrief_worker")]
struct Args {
    /// Path to an already-produced artifact JSON: run only the rotation
    /// stage against it.
    artifact: Option<std::path::PathBuf>,

    /// Analysis date (YYYY-MM-DD). Defaults to the current slot's date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Session label (morning|afternoon). Defaults by KST time of day.
    #[arg(long)]
    session: Option<String>,

    /// Do everything except the archive rotation.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = tokio::select! {
        res = run(&settings, &args) => res,
        _ = shutdown_signal() => {
            tracing::warn!("termination signal received; aborting before completion");
            Err(anyhow::anyhow!("terminated by signal"))
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }

    result
}

async fn run(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    if let Some(path) = &args.artifact {
        let archive = ArchiveStore::from_settings(settings);
        archive
            .rotate(path)
            .await
            .with_context(|| format!("rotate-only run failed for {}", path.display()))?;
        tracing::info!(path = %path.display(), "rotate-only run complete");
        return Ok(());
    }

    let (as_of_date, slot) = session::resolve_run_slot(
        args.as_of_date.as_deref(),
        args.session.as_deref(),
        chrono::Utc::now(),
    )?;

    let pipeline = Pipeline::from_settings(settings)?;
    pipeline.run(as_of_date, slot, args.dry_run).await
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
