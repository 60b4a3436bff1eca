//! RepoVault - GitHub Account Backup Service
//!
//! RepoVault mirrors every repository owned by an authenticated GitHub account
//! to local disk, cloning new repositories and fast-forwarding existing mirrors,
//! and exposes a small HTTP control surface over the backup process.
//!
//! ## Core Features
//!
//! - **Repository Enumeration**: Paginated listing of `/user/repos` following `Link` headers
//! - **Idempotent Sync**: Clone when absent, fetch and pull when present
//! - **Recovery**: Broken mirrors are wiped and recloned, one repository at a time
//! - **Run Status**: Single-run-at-a-time orchestration with a shareable status snapshot
//! - **Control Surface**: `GET /api/status` and `POST /api/backup` over axum
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`github`]: GitHub API listing and credential resolution
//! - [`git`]: Git command transport
//! - [`sync`]: Per-repository sync engine
//! - [`backup`]: Backup orchestrator and run status
//! - [`server`]: HTTP control surface

pub mod backup;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod health;
pub mod script;
pub mod server;
pub mod sync;

pub use backup::{BackupStatus, Orchestrator, RunStatus, StatusSnapshot};
pub use config::Config;
pub use error::{BackupError, ConfigError, NetworkError, SyncError};
pub use git::{GitClient, GitTransport};
pub use github::{Credential, GitHubClient, RepositoryDescriptor, RepositoryLister};
pub use health::HealthCheck;
pub use sync::{SyncEngine, SyncResult, SyncSummary};
