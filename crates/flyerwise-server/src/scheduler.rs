//! Background housekeeping.
//!
//! Expiry is detected lazily on access; this job only reclaims storage for
//! sessions whose time budget ran out.

use std::sync::Arc;

use flyerwise_core::AppConfig;
use flyerwise_wizard::WizardManager;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the purge cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    wizard: Arc<WizardManager>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_purge_job(&scheduler, wizard, &config.purge_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_purge_job(
    scheduler: &JobScheduler,
    wizard: Arc<WizardManager>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let wizard = Arc::clone(&wizard);
        Box::pin(async move {
            run_purge(&wizard).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: expired-session purge registered");
    Ok(())
}

/// One purge pass. Failures are logged and retried on the next tick.
pub(crate) async fn run_purge(wizard: &WizardManager) -> Option<u64> {
    match wizard.purge_expired().await {
        Ok(0) => {
            tracing::debug!("scheduler: no expired sessions to purge");
            Some(0)
        }
        Ok(n) => {
            tracing::info!(purged = n, "scheduler: purged expired sessions");
            Some(n)
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: session purge failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{in_memory_wizard, Fixture};
    use chrono::Duration;
    use flyerwise_wizard::SessionFilters;

    #[tokio::test]
    async fn purge_pass_reclaims_lapsed_sessions() {
        let fixture = Fixture::new();
        let (wizard, clock) = in_memory_wizard(&fixture);
        wizard
            .start_session(fixture.list_id, fixture.items.clone(), SessionFilters::default())
            .await
            .expect("start");

        assert_eq!(run_purge(&wizard).await, Some(0));
        clock.advance(Duration::minutes(31));
        assert_eq!(run_purge(&wizard).await, Some(1));
    }

    #[tokio::test]
    async fn invalid_cron_fails_registration() {
        let fixture = Fixture::new();
        let (wizard, _clock) = in_memory_wizard(&fixture);
        let scheduler = JobScheduler::new().await.expect("scheduler");
        let result = register_purge_job(&scheduler, Arc::new(wizard), "every now and then").await;
        assert!(result.is_err());
    }
}
