use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::service::EnergyService;

/// Task status tracking
#[derive(Debug, Clone, Default)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Run transformer reassignment every `every` until `shutdown` resolves.
///
/// The first run happens immediately. The handle yields the final status.
pub fn spawn_reassignment<F>(
    service: Arc<EnergyService>,
    every: Duration,
    shutdown: F,
) -> JoinHandle<TaskStatus>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status = TaskStatus::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(runs = status.run_count, "reassignment task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    status.last_run = Some(now);
                    status.run_count += 1;

                    match service.reassign_transformers().await {
                        Ok(report) => {
                            status.last_success = Some(now);
                            status.success_count += 1;
                            status.last_error = None;
                            for issue in &report.issues {
                                warn!(%issue, "assignment issue");
                            }
                            info!(
                                assigned = report.assigned_count(),
                                issues = report.issues.len(),
                                "periodic reassignment completed"
                            );
                        }
                        Err(e) => {
                            status.error_count += 1;
                            status.last_error = Some(e.to_string());
                            error!(error = %e, "periodic reassignment failed");
                        }
                    }
                }
            }
        }
        status
    })
}
