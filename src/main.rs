use anyhow::{Context, Result};
use energy_manager::{
    config::Config,
    ledger::Ledger,
    repo::{MemoryStorage, Snapshot},
    scheduler,
    service::EnergyService,
    telemetry,
};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;
    let path = &cfg.storage.snapshot_path;

    let snapshot = if path.exists() {
        Snapshot::load(path)
            .await
            .with_context(|| format!("loading snapshot {}", path.display()))?
    } else {
        warn!(path = %path.display(), "snapshot not found, starting empty");
        Snapshot::default()
    };
    let storage = Arc::new(MemoryStorage::from_snapshot(snapshot)?);

    let service = Arc::new(EnergyService::new(storage, Arc::new(Ledger::new()), &cfg));
    service.warm_ledger().await?;

    for (client, outcome) in service.optimize_all().await? {
        match outcome {
            Ok(plan) => info!(
                client = %client,
                hours = plan.objective_value,
                "monthly usage plan"
            ),
            Err(e) => warn!(client = %client, error = %e, "no usage plan for client"),
        }
    }

    info!(
        every_seconds = cfg.assignment.interval_seconds,
        metric = %cfg.assignment.metric,
        "starting energy manager"
    );
    let task = scheduler::spawn_reassignment(
        service.clone(),
        Duration::from_secs(cfg.assignment.interval_seconds),
        telemetry::shutdown_signal(),
    );

    let status = task.await?;
    warn!(
        runs = status.run_count,
        failures = status.error_count,
        "shutdown complete"
    );
    Ok(())
}
