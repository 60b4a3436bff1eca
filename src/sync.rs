//! Sync Engine - Per-repository mirror synchronization
//!
//! Decides for one repository whether to clone or update its local mirror, and
//! falls back to a wipe-and-reclone recovery when either step fails.
//! [`SyncEngine::sync_repository`] never returns an error: every failure becomes
//! a [`SyncResult::Failed`] so one repository can never abort a run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{RecoveryPhase, SyncError};
use crate::git::GitTransport;
use crate::github::RepositoryDescriptor;

/// On-disk state of a mirror before a sync starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Nothing at the mirror path
    Absent,
    /// A directory holding a git checkout
    Valid,
    /// Something at the mirror path that is not a usable checkout
    Invalid,
}

impl MirrorState {
    /// Classify whatever currently sits at `path`
    pub async fn probe(path: &Path) -> Self {
        match tokio::fs::symlink_metadata(path).await {
            Err(_) => MirrorState::Absent,
            Ok(meta) if meta.is_dir() => {
                if tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false) {
                    MirrorState::Valid
                } else {
                    MirrorState::Invalid
                }
            }
            Ok(_) => MirrorState::Invalid,
        }
    }
}

/// Outcome of syncing one repository
#[derive(Debug)]
pub enum SyncResult {
    /// Mirror was absent and has been cloned
    Cloned { name: String, path: PathBuf },
    /// Existing mirror was fetched and fast-forwarded
    Updated { name: String, path: PathBuf },
    /// Mirror was wiped and recloned after `cause`
    Recovered {
        name: String,
        path: PathBuf,
        cause: String,
    },
    /// Repository skipped for this run
    Failed {
        name: String,
        path: PathBuf,
        error: String,
    },
}

impl SyncResult {
    pub fn name(&self) -> &str {
        match self {
            SyncResult::Cloned { name, .. }
            | SyncResult::Updated { name, .. }
            | SyncResult::Recovered { name, .. }
            | SyncResult::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncResult::Failed { .. })
    }
}

/// Results from a complete run
#[derive(Debug)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub updated: usize,
    pub recovered: usize,
    pub failed: usize,
    pub duration: Duration,
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    /// Compile summary from results
    pub fn compile(results: Vec<SyncResult>, duration: Duration) -> Self {
        let mut summary = Self {
            total_repositories: results.len(),
            cloned: 0,
            updated: 0,
            recovered: 0,
            failed: 0,
            duration,
            results: Vec::new(),
        };

        for result in &results {
            match result {
                SyncResult::Cloned { .. } => summary.cloned += 1,
                SyncResult::Updated { .. } => summary.updated += 1,
                SyncResult::Recovered { .. } => summary.recovered += 1,
                SyncResult::Failed { .. } => summary.failed += 1,
            }
        }

        summary.results = results;
        summary
    }

    /// Repositories skipped in this run
    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| r.is_failure())
    }
}

/// Mirrors single repositories under the backup root
#[derive(Clone)]
pub struct SyncEngine {
    git: Arc<dyn GitTransport>,
    backup_dir: PathBuf,
    cleanup_on_error: bool,
}

impl SyncEngine {
    pub fn new(git: Arc<dyn GitTransport>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            git,
            backup_dir: backup_dir.into(),
            cleanup_on_error: true,
        }
    }

    /// Whether a failed recovery clone may remove the directory it left behind
    pub fn cleanup_on_error(mut self, enabled: bool) -> Self {
        self.cleanup_on_error = enabled;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Mirror location for a repository
    pub fn mirror_path(&self, repo: &RepositoryDescriptor) -> PathBuf {
        self.backup_dir.join(&repo.name)
    }

    /// Bring one mirror up to date, recovering once on failure
    pub async fn sync_repository(&self, repo: &RepositoryDescriptor) -> SyncResult {
        let path = self.mirror_path(repo);
        let state = MirrorState::probe(&path).await;

        debug!(
            repo = %repo.name,
            path = %path.display(),
            ?state,
            clone_url = %repo.clone_url,
            "Starting clone/update"
        );

        let attempt = match state {
            MirrorState::Absent => self.clone_fresh(repo, &path).await.map(|_| {
                info!("Cloned {}", repo.name);
                SyncResult::Cloned {
                    name: repo.name.clone(),
                    path: path.clone(),
                }
            }),
            MirrorState::Valid => self.update(repo, &path).await.map(|_| {
                info!("Updated {}", repo.name);
                SyncResult::Updated {
                    name: repo.name.clone(),
                    path: path.clone(),
                }
            }),
            MirrorState::Invalid => Err(SyncError::InvalidMirror { path: path.clone() }),
        };

        match attempt {
            Ok(result) => result,
            Err(cause) => {
                warn!("Error with {}: {}", repo.name, cause);
                self.recover(repo, path, cause).await
            }
        }
    }

    /// Fetch every remote, then pull the default branch
    async fn update(&self, repo: &RepositoryDescriptor, path: &Path) -> Result<(), SyncError> {
        debug!("Updating {}...", repo.name);
        self.git.fetch_all(path).await?;
        self.git.pull(path, &repo.default_branch).await
    }

    /// Clone into an absent mirror path
    async fn clone_fresh(&self, repo: &RepositoryDescriptor, path: &Path) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|source| SyncError::Filesystem {
                path: self.backup_dir.clone(),
                source,
            })?;

        debug!("Cloning {}...", repo.name);
        self.git.clone_repo(&repo.clone_url, path).await
    }

    /// Skip the repository, or wipe and reclone when something is on disk
    async fn recover(&self, repo: &RepositoryDescriptor, path: PathBuf, cause: SyncError) -> SyncResult {
        if !path_exists(&path).await {
            error!("Skipping {} due to error: {}", repo.name, cause);
            return SyncResult::Failed {
                name: repo.name.clone(),
                path,
                error: cause.to_string(),
            };
        }

        info!("Removing {} and trying again...", repo.name);
        match self.reclone(repo, &path).await {
            Ok(()) => {
                info!("Successfully cloned {}", repo.name);
                SyncResult::Recovered {
                    name: repo.name.clone(),
                    path,
                    cause: cause.to_string(),
                }
            }
            Err(e) => {
                error!("Failed to recover {}: {}", repo.name, e);
                SyncResult::Failed {
                    name: repo.name.clone(),
                    path,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Present-Invalid -> Absent -> Present-Valid, reporting the failing phase
    pub async fn reclone(&self, repo: &RepositoryDescriptor, path: &Path) -> Result<(), SyncError> {
        remove_path(path).await.map_err(|source| SyncError::Recovery {
            phase: RecoveryPhase::Wipe,
            source: Box::new(SyncError::Filesystem {
                path: path.to_path_buf(),
                source,
            }),
        })?;

        let result = self.clone_fresh(repo, path).await;

        // Last attempt for this run: leave the mirror Absent rather than half-cloned
        if result.is_err() && self.cleanup_on_error && path_exists(path).await {
            debug!("Removing partial clone at {}", path.display());
            if let Err(e) = remove_path(path).await {
                warn!("Failed to clean up partial clone {}: {}", path.display(), e);
            }
        }

        result.map_err(|source| SyncError::Recovery {
            phase: RecoveryPhase::Reclone,
            source: Box::new(source),
        })
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

/// Remove whatever sits at a mirror path: directories recursively, anything else as a file
async fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
