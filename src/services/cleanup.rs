//! Background sweeper for idle sessions and uploads stuck in `processing`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::ImportSettings;
use crate::db::UploadRepository;
use crate::error::AppResult;

use super::session::SessionRegistry;
use super::stage::StageWorkflow;

/// Configuration for the cleanup service.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Sessions untouched for this long are discarded
    pub session_idle: Duration,
    /// Uploads still `processing` after this many hours are retired
    pub stuck_upload_hours: i64,
    /// How often to run cleanup
    pub interval: Duration,
}

impl From<&ImportSettings> for CleanupConfig {
    fn from(settings: &ImportSettings) -> Self {
        Self {
            session_idle: Duration::from_secs(settings.session_idle_secs),
            stuck_upload_hours: settings.stuck_upload_hours,
            interval: Duration::from_secs(settings.cleanup_interval_secs),
        }
    }
}

/// Counts from one cleanup cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions_evicted: usize,
    pub uploads_retired: usize,
    pub uploads_failed: usize,
}

/// Start the cleanup background task.
pub fn start_cleanup_task(
    sessions: Arc<SessionRegistry>,
    repo: Arc<dyn UploadRepository>,
    workflow: StageWorkflow,
    config: CleanupConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting cleanup service (session idle: {}s, stuck uploads: {}h, interval: {}s)",
            config.session_idle.as_secs(),
            config.stuck_upload_hours,
            config.interval.as_secs()
        );

        let mut ticker = interval(config.interval);

        loop {
            ticker.tick().await;

            match run_cleanup(&sessions, repo.as_ref(), &workflow, &config).await {
                Ok(report) if report != CleanupReport::default() => {
                    info!(
                        sessions_evicted = report.sessions_evicted,
                        uploads_retired = report.uploads_retired,
                        uploads_failed = report.uploads_failed,
                        "Cleanup cycle finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Cleanup task error: {}", e),
            }
        }
    })
}

/// Run a single cleanup cycle.
pub async fn run_cleanup(
    sessions: &SessionRegistry,
    repo: &dyn UploadRepository,
    workflow: &StageWorkflow,
    config: &CleanupConfig,
) -> AppResult<CleanupReport> {
    let mut report = CleanupReport {
        sessions_evicted: sessions.evict_idle(config.session_idle).await,
        ..CleanupReport::default()
    };

    let cutoff = Utc::now() - chrono::Duration::hours(config.stuck_upload_hours);
    let stuck = repo.list_stuck_uploads(cutoff).await?;

    let reason = format!(
        "Upload did not finish processing within {} hours and was retired by cleanup",
        config.stuck_upload_hours
    );

    for upload in &stuck {
        match workflow.abandon(upload, &reason).await {
            Ok(()) => report.uploads_retired += 1,
            Err(e) => {
                warn!(
                    org_id = %upload.org_id,
                    upload_id = %upload.id,
                    error = %e,
                    "Failed to retire stuck upload"
                );
                report.uploads_failed += 1;
            }
        }
    }

    Ok(report)
}
