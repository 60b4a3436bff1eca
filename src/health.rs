//! Preflight diagnostics for RepoVault
//!
//! Verifies that git is available, that a GitHub credential resolves and is
//! accepted by the API, and that the backup root is usable, before any run.

use crate::git::git_version;
use crate::github::{resolve_credential, GitHubClient};
use crate::Config;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// GitHub credential status
    pub credential: CheckResult,
    /// Backup root status
    pub backup_dir: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(),
            credential: Self::check_credential(config).await,
            backup_dir: Self::check_backup_dir(config),
        }
    }

    /// Check if all required checks passed (warnings still pass)
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.credential.passed && self.backup_dir.passed
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        [&self.git, &self.credential, &self.backup_dir]
            .into_iter()
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        [&self.git, &self.credential, &self.backup_dir]
            .into_iter()
            .filter(|r| r.is_warning)
            .collect()
    }

    fn check_git() -> CheckResult {
        match git_version() {
            Some(version) => CheckResult::ok_with_details("Git installed", version),
            None => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Resolve the credential and ask the API who it belongs to
    async fn check_credential(config: &Config) -> CheckResult {
        let credential = match resolve_credential(config) {
            Ok(credential) => credential,
            Err(e) => return CheckResult::error_with_details("No usable GitHub credential", e.to_string()),
        };

        let client = match GitHubClient::new(config, &credential) {
            Ok(client) => client,
            Err(e) => return CheckResult::error_with_details("GitHub client setup failed", e.to_string()),
        };

        match client.current_user().await {
            Ok(login) => CheckResult::ok_with_details(
                "GitHub authentication successful",
                format!("Username: {}", login),
            ),
            Err(e) => CheckResult::error_with_details(
                "GitHub authentication failed",
                format!("{:#}\nCheck GITHUB_TOKEN or run: gh auth login", e),
            ),
        }
    }

    /// A missing root is only a warning: it is created before the first run
    fn check_backup_dir(config: &Config) -> CheckResult {
        let path = config.backup_path();

        if !path.exists() {
            return CheckResult::warning_with_details(
                "Backup directory does not exist yet",
                format!("{} will be created on the first run", path.display()),
            );
        }
        if !path.is_dir() {
            return CheckResult::error(format!("{} is not a directory", path.display()));
        }

        match config.prepare_backup_dir() {
            Ok(path) => CheckResult::ok_with_details("Backup directory is writable", path.display().to_string()),
            Err(e) => CheckResult::error_with_details("Backup directory is not usable", e.to_string()),
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 3] {
        [
            ("Git", &self.git),
            ("GitHub credential", &self.credential),
            ("Backup directory", &self.backup_dir),
        ]
    }
}
