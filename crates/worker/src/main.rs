use std::process::ExitCode;

use geogrid_worker::config::{LogFormat, OrchestratorConfig};
use geogrid_worker::orchestrator::run_once;
use geogrid_worker::shutdown::{cancel_on_shutdown, ShutdownSignal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = OrchestratorConfig::from_env();
    let log_format = config.as_ref().map(|c| c.log_format).unwrap_or(LogFormat::Text);
    init_tracing(log_format);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    match ShutdownSignal::install() {
        Ok(signal) => {
            cancel_on_shutdown(signal, cancel.clone());
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    }

    // The lock guard lives inside `run_once`, so it is gone by the time the
    // exit code is chosen.
    match run_once(&config, &cancel).await {
        Ok(Some(summary)) => {
            tracing::info!(
                runs = summary.runs,
                done = summary.done,
                errored = summary.errored,
                "Orchestrator finished",
            );
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Orchestrator failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "geogrid_worker=info,geogrid_db=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
