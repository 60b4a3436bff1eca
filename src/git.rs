use async_trait::async_trait;
use base64::Engine as _;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::github::Credential;

/// Version-control operations the sync engine needs
#[async_trait]
pub trait GitTransport: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), SyncError>;

    /// `git fetch --all` inside an existing checkout
    async fn fetch_all(&self, repo: &Path) -> Result<(), SyncError>;

    /// `git pull origin <branch>` inside an existing checkout
    async fn pull(&self, repo: &Path, branch: &str) -> Result<(), SyncError>;
}

/// Git transport backed by the `git` executable
#[derive(Clone)]
pub struct GitClient {
    operation_timeout: Duration,
    fast_forward_only: bool,
    credential: Option<Credential>,
}

impl GitClient {
    /// Create a new Git client with the given sync settings
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            operation_timeout: Duration::from_secs(config.timeout.max(1)),
            fast_forward_only: config.fast_forward_only,
            credential: None,
        }
    }

    /// Authenticate https remotes with the API credential
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    fn command(&self, url_hint: Option<&str>) -> AsyncCommand {
        let mut cmd = AsyncCommand::new("git");
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null());

        // Passed through GIT_CONFIG_* so the token stays out of argv and .git/config
        let https = url_hint.map_or(true, |url| url.starts_with("https://"));
        if let (Some(credential), true) = (&self.credential, https) {
            let basic = base64::engine::general_purpose::STANDARD
                .encode(format!("x-access-token:{}", credential.expose()));
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {}", basic));
        }

        cmd
    }

    async fn run(&self, operation: &'static str, mut cmd: AsyncCommand) -> Result<Output, SyncError> {
        let output = match timeout(self.operation_timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| SyncError::Spawn { operation, source })?,
            Err(_) => {
                return Err(SyncError::Timeout {
                    operation,
                    secs: self.operation_timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SyncError::Command { operation, stderr });
        }

        Ok(output)
    }
}

#[async_trait]
impl GitTransport for GitClient {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), SyncError> {
        debug!("Running git clone {} {}", url, dest.display());

        let mut cmd = self.command(Some(url));
        cmd.arg("clone").arg(url).arg(dest);

        self.run("clone", cmd).await.map(|_| ())
    }

    async fn fetch_all(&self, repo: &Path) -> Result<(), SyncError> {
        debug!("Running git fetch --all in {}", repo.display());

        let mut cmd = self.command(None);
        cmd.args(["fetch", "--all"]).current_dir(repo);

        self.run("fetch", cmd).await.map(|_| ())
    }

    async fn pull(&self, repo: &Path, branch: &str) -> Result<(), SyncError> {
        debug!("Running git pull origin {} in {}", branch, repo.display());

        let mut cmd = self.command(None);
        cmd.arg("pull");
        if self.fast_forward_only {
            cmd.arg("--ff-only");
        }
        cmd.args(["origin", branch]).current_dir(repo);

        self.run("pull", cmd).await.map(|_| ())
    }
}

/// Check that a `git` executable is on PATH, returning its version string
pub fn git_version() -> Option<String> {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn client() -> GitClient {
        GitClient::new(&SyncConfig::default())
    }

    #[test]
    fn test_client_respects_sync_config() {
        let config = SyncConfig {
            timeout: 0,
            fast_forward_only: false,
            ..Default::default()
        };
        let git = GitClient::new(&config);

        assert_eq!(git.operation_timeout, Duration::from_secs(1));
        assert!(!git.fast_forward_only);
        assert!(git.credential.is_none());
    }

    #[test]
    fn test_credential_header_only_for_https() {
        let git = client().with_credential(Credential::new("ghp_abc"));

        let https = git.command(Some("https://github.com/octocat/hello.git"));
        let ssh = git.command(Some("git@github.com:octocat/hello.git"));

        let has_header = |cmd: &AsyncCommand| {
            cmd.as_std()
                .get_envs()
                .any(|(k, _)| k == "GIT_CONFIG_VALUE_0")
        };
        assert!(has_header(&https));
        assert!(!has_header(&ssh));
    }

    #[tokio::test]
    async fn test_clone_of_missing_source_fails() {
        if git_version().is_none() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("mirror");
        let missing = temp.path().join("does-not-exist");

        let result = client()
            .clone_repo(&missing.to_string_lossy(), &dest)
            .await;

        assert_matches!(result, Err(SyncError::Command { operation: "clone", .. }));
    }

    #[tokio::test]
    async fn test_fetch_outside_checkout_fails() {
        if git_version().is_none() {
            return;
        }

        let temp = TempDir::new().unwrap();
        // Isolate from any enclosing repository
        let plain = temp.path().join("plain");
        std::fs::create_dir_all(&plain).unwrap();
        let mut git = client();
        git.operation_timeout = Duration::from_secs(30);

        let mut cmd = git.command(None);
        cmd.args(["fetch", "--all"])
            .current_dir(&plain)
            .env("GIT_CEILING_DIRECTORIES", temp.path());
        let result = git.run("fetch", cmd).await;

        assert_matches!(result, Err(SyncError::Command { operation: "fetch", .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_operation_times_out() {
        let mut git = client();
        git.operation_timeout = Duration::from_millis(200);

        let mut cmd = AsyncCommand::new("sleep");
        cmd.arg("5").kill_on_drop(true);
        let started = std::time::Instant::now();
        let result = git.run("clone", cmd).await;

        // A missing `sleep` surfaces as a spawn error instead
        if matches!(result, Err(SyncError::Spawn { .. })) {
            return;
        }
        assert_matches!(result, Err(SyncError::Timeout { operation: "clone", .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
