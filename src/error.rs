//! Error taxonomy for RepoVault
//!
//! Only [`ConfigError`] and [`NetworkError`] (wrapped in [`BackupError`]) ever
//! abort a run or the process. [`SyncError`] is always contained to the single
//! repository it was raised for.

use std::path::PathBuf;
use thiserror::Error;

/// Startup failures: nothing is backed up while one of these is outstanding
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "No GitHub credential found. Set GITHUB_TOKEN, add github.token to the config file, \
         or authenticate the GitHub CLI with: gh auth login"
    )]
    MissingCredential,

    #[error("GitHub CLI credential lookup failed: {0}")]
    CredentialHelper(String),

    #[error("Unknown auth method: {0}")]
    UnknownAuthMethod(String),

    #[error("Failed to create backup directory {path}: {source}")]
    CreateBackupDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write to backup directory {path}: {source}")]
    BackupDirUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PORT value {0:?}")]
    InvalidPort(String),
}

/// Repository enumeration failures; fatal to the current run
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Request for repository page {page} failed: {source}")]
    Request {
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("GitHub API responded with status {status} for page {page}: {body}")]
    Status { page: u32, status: u16, body: String },

    #[error("Failed to decode repository page {page}: {source}")]
    Decode {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
}

/// Recovery phase in which a [`SyncError`] was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// Removing the broken mirror directory
    Wipe,
    /// Cloning into the freshly emptied location
    Reclone,
}

impl std::fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryPhase::Wipe => f.write_str("wipe"),
            RecoveryPhase::Reclone => f.write_str("reclone"),
        }
    }
}

/// Per-repository failures
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to execute git {operation}: {source}")]
    Spawn {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Git {operation} failed: {stderr}")]
    Command {
        operation: &'static str,
        stderr: String,
    },

    #[error("Git {operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} exists but is not a git checkout")]
    InvalidMirror { path: PathBuf },

    #[error("Recovery failed during {phase}: {source}")]
    Recovery {
        phase: RecoveryPhase,
        #[source]
        source: Box<SyncError>,
    },
}

/// Run-level failures surfaced to the trigger caller
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Enumeration(#[from] NetworkError),
}
