//! Backup Orchestrator - one full run across every repository
//!
//! The orchestrator owns the process-wide [`BackupStatus`] and is the only
//! thing that moves it between states. The HTTP layer and the CLI read it
//! through [`BackupStatus::snapshot`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::BackupError;
use crate::git::GitClient;
use crate::github::{Credential, GitHubClient, RepositoryLister};
use crate::sync::{SyncEngine, SyncSummary};

/// Lifecycle of the current or most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Error,
}

/// Point-in-time view of the run status, as served by `/api/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: RunStatus,
    pub last_backup: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub backup_dir: String,
}

#[derive(Debug)]
struct StatusInner {
    status: RunStatus,
    last_backup: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shared run status; clones observe the same state
#[derive(Debug, Clone)]
pub struct BackupStatus {
    inner: Arc<Mutex<StatusInner>>,
    backup_dir: String,
}

impl BackupStatus {
    pub fn new(backup_dir: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusInner {
                status: RunStatus::Idle,
                last_backup: None,
                last_error: None,
            })),
            backup_dir: backup_dir.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        // State stays consistent across a panicked holder: every write is a single assignment
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            status: inner.status,
            last_backup: inner.last_backup,
            error: inner.last_error.clone(),
            backup_dir: self.backup_dir.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().status == RunStatus::Running
    }

    /// Enter `running` unless a run is already active. Clears the last error.
    pub fn try_begin(&self) -> bool {
        let mut inner = self.lock();
        if inner.status == RunStatus::Running {
            return false;
        }
        inner.status = RunStatus::Running;
        inner.last_error = None;
        true
    }

    pub fn complete(&self, at: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.status = RunStatus::Completed;
        inner.last_backup = Some(at);
    }

    pub fn fail(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        inner.status = RunStatus::Error;
        inner.last_error = Some(message.into());
    }
}

/// Marks the run `error` if it is dropped before reaching `complete` or `fail`
struct RunGuard<'a> {
    status: &'a BackupStatus,
    armed: bool,
}

impl<'a> RunGuard<'a> {
    fn new(status: &'a BackupStatus) -> Self {
        Self { status, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            error!("Backup run aborted before completion");
            self.status.fail("Backup run aborted before completion");
        }
    }
}

/// Drives full backup runs: enumerate, then sync every repository
#[derive(Clone)]
pub struct Orchestrator {
    lister: Arc<dyn RepositoryLister>,
    engine: SyncEngine,
    status: BackupStatus,
    max_parallel: usize,
}

impl Orchestrator {
    pub fn new(lister: Arc<dyn RepositoryLister>, engine: SyncEngine) -> Self {
        let status = BackupStatus::new(engine.backup_dir().display().to_string());
        Self {
            lister,
            engine,
            status,
            max_parallel: 1,
        }
    }

    /// Build the production orchestrator from configuration
    pub fn from_config(config: &Config, credential: Credential) -> Result<Self> {
        let lister = GitHubClient::new(config, &credential)?;

        let mut git = GitClient::new(&config.sync);
        if config.sync.authenticate_git {
            git = git.with_credential(credential);
        }

        let engine = SyncEngine::new(Arc::new(git), PathBuf::from(&config.backup_directory))
            .cleanup_on_error(config.sync.cleanup_on_error);

        Ok(Self::new(Arc::new(lister), engine).max_parallel(config.effective_parallelism()))
    }

    /// Number of repositories synced at once; 1 keeps the run strictly sequential
    pub fn max_parallel(mut self, workers: usize) -> Self {
        self.max_parallel = workers.max(1);
        self
    }

    pub fn status(&self) -> &BackupStatus {
        &self.status
    }

    /// Run one backup. Fails only when a run is already active or enumeration fails.
    pub async fn perform_backup(&self) -> Result<SyncSummary, BackupError> {
        if !self.status.try_begin() {
            warn!("Backup requested while another run is in progress");
            return Err(BackupError::AlreadyRunning);
        }
        let guard = RunGuard::new(&self.status);

        info!("Starting backup process...");
        let start = Instant::now();

        let repositories = match self.lister.list_all_repositories().await {
            Ok(repositories) => repositories,
            Err(e) => {
                error!("Backup failed: {}", e);
                self.status.fail(e.to_string());
                guard.disarm();
                return Err(e.into());
            }
        };

        info!(
            "Syncing {} repositories ({} at a time)",
            repositories.len(),
            self.max_parallel
        );

        let engine = &self.engine;
        let results = stream::iter(repositories)
            .map(|repo| async move { engine.sync_repository(&repo).await })
            .buffered(self.max_parallel)
            .collect::<Vec<_>>()
            .await;

        let summary = SyncSummary::compile(results, start.elapsed());
        self.status.complete(Utc::now());
        guard.disarm();

        info!(
            "Backup completed: {} cloned, {} updated, {} recovered, {} failed in {:.1}s",
            summary.cloned,
            summary.updated,
            summary.recovered,
            summary.failed,
            summary.duration.as_secs_f64()
        );
        for failure in summary.failures() {
            warn!("Skipped {} in this run", failure.name());
        }

        Ok(summary)
    }
}
