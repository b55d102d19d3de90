use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use trove_agent::{Cli, HttpTransport, reporter};
use trove_config::{ConfigLoad, ConfigLoader};
use trove_core::{Orchestrator, RunContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = cli.loader_options().context("invalid shape arguments")?;
    let ConfigLoad {
        config,
        warnings,
        metadata,
    } = ConfigLoader::with_options(options)
        .load()
        .context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        service = %config.service.base_url(),
        field = %config.search.field(),
        treasures = config.search.assumed_treasures,
        workers = config.dispatcher.workers,
        explore_concurrency = config.search.explore_concurrency,
        permits = config.extraction.max_permits,
        shapes = config.search.shapes.len(),
        "configuration in effect"
    );

    let transport =
        HttpTransport::new(&config.service).context("failed to build HTTP client")?;
    let stats_interval = config.telemetry.stats_interval();
    let ctx = RunContext::new(config);

    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("stop requested, draining in-flight calls");
                signal_ctx.stop();
            }
            Err(e) => warn!("failed to listen for ctrl-c: {}", e),
        }
    });

    let reporter_stop = ctx.shutdown.child_token();
    let reporter = stats_interval.map(|period| {
        reporter::spawn_reporter(Arc::clone(&ctx.stats), period, reporter_stop.clone())
    });

    let mut orchestrator = Orchestrator::new(&ctx, Arc::new(transport));
    let outcome = orchestrator.run().await;

    reporter_stop.cancel();
    if let Some(handle) = reporter
        && let Err(e) = handle.await
    {
        warn!("stats reporter ended abnormally: {:?}", e);
    }

    match outcome {
        Ok(summary) => {
            reporter::log_summary(&summary);
            Ok(())
        }
        Err(e) => {
            reporter::log_snapshot(&ctx.stats.snapshot());
            error!(error = %e, "run aborted");
            Err(e).context("exploration run failed")
        }
    }
}
