/// Common test utilities and helpers for RepoVault tests

use assert_fs::fixture::PathChild;
use assert_fs::TempDir;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Scratch area holding origins, the backup root and a config file
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub origins: PathBuf,
    pub backup_dir: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let origins = temp_dir.child("origins").path().to_path_buf();
        std::fs::create_dir_all(&origins).expect("Failed to create origins dir");
        let backup_dir = temp_dir.child("backup").path().to_path_buf();
        let config_path = temp_dir.child("config.yml").path().to_path_buf();

        Self {
            temp_dir,
            origins,
            backup_dir,
            config_path,
        }
    }

    /// Write a config that points the API at `api_url` and authenticates with a fixed token
    pub fn write_config(&self, api_url: &str) -> PathBuf {
        let content = format!(
            r#"
backup_directory: "{}"
github:
  api_url: "{}"
  token: "ghp_integration"
  auth_method: "token"
sync:
  timeout: 60
logging:
  level: "debug"
  color: false
"#,
            self.backup_dir.display(),
            api_url
        );
        std::fs::write(&self.config_path, content).expect("Failed to write test config");
        self.config_path.clone()
    }

    /// Command for the built binary with a scrubbed environment
    pub fn repovault(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_repovault"));
        cmd.env_remove("GITHUB_TOKEN")
            .env_remove("BACKUP_DIR")
            .env_remove("PORT")
            .env_remove("RUST_LOG")
            .env("XDG_CONFIG_HOME", self.temp_dir.path())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    /// Bare origin repository named `name` with one commit on `main`
    pub fn create_origin(&self, name: &str) -> PathBuf {
        let bare = self.origins.join(format!("{}.git", name));
        git(&self.origins, &["init", "--bare", &bare.to_string_lossy()]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let work = self.origins.join(format!("{}-work", name));
        git(&self.origins, &["clone", &bare.to_string_lossy(), &work.to_string_lossy()]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        commit_file(&work, "README.md", &format!("# {}\n", name));
        git(&work, &["push", "origin", "main"]);

        bare
    }

    /// Push one more commit to the origin created for `name`
    pub fn push_commit(&self, name: &str, file: &str, content: &str) {
        let work = self.origins.join(format!("{}-work", name));
        commit_file(&work, file, content);
        git(&work, &["push", "origin", "main"]);
    }
}

/// Whether a usable `git` is on PATH; git-backed tests are skipped otherwise
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=RepoVault Test", "-c", "user.email=test@example.com"])
        .args(["-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("Failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn commit_file(work: &Path, file: &str, content: &str) {
    std::fs::write(work.join(file), content).expect("Failed to write file");
    git(work, &["add", file]);
    git(work, &["commit", "-m", &format!("Add {}", file)]);
}

/// GitHub-style repository JSON pointing at a local origin
pub fn repo_json(name: &str, clone_url: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "full_name": format!("octocat/{}", name),
        "clone_url": clone_url,
        "default_branch": "main",
        "private": true
    })
}
