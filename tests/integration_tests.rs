mod common;

use assert_fs::prelude::*;
use common::{git_available, repo_json, TestEnvironment};
use predicates::prelude::*;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Integration tests for RepoVault CLI commands
/// These tests run the actual binary against a mock API and local git origins

async fn run(cmd: std::process::Command) -> std::process::Output {
    tokio::process::Command::from(cmd)
        .output()
        .await
        .expect("Failed to execute repovault")
}

#[test]
fn test_cli_help() {
    let env = TestEnvironment::new();
    let output = env.repovault().arg("--help").output().expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    for command in ["serve", "backup", "list", "script", "doctor", "init"] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_cli_version() {
    let env = TestEnvironment::new();
    let output = env.repovault().arg("--version").output().expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("repovault"));
}

#[test]
fn test_init_writes_config_once() {
    let env = TestEnvironment::new();
    let config = env.temp_dir.child("fresh").child("config.yml");

    let output = env
        .repovault()
        .args(["init", "--backup-dir", "/srv/github"])
        .arg("--config")
        .arg(config.path())
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    config.assert(predicate::str::contains("/srv/github"));
    config.assert(predicate::str::contains("ghp_").not());

    let again = env
        .repovault()
        .arg("init")
        .arg("--config")
        .arg(config.path())
        .output()
        .expect("Failed to execute command");
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));
}

#[test]
fn test_backup_without_credential_aborts_before_run() {
    let env = TestEnvironment::new();
    std::fs::write(
        &env.config_path,
        format!(
            "backup_directory: \"{}\"\ngithub:\n  auth_method: \"token\"\n",
            env.backup_dir.display()
        ),
    )
    .unwrap();

    let output = env
        .repovault()
        .arg("backup")
        .arg("--config")
        .arg(&env.config_path)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No GitHub credential found"));
    env.temp_dir.child("backup").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_enumeration_failure_fails_backup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;
    let env = TestEnvironment::new();
    let config = env.write_config(&server.uri());

    let mut cmd = env.repovault();
    cmd.arg("backup").arg("--config").arg(&config);
    let output = run(cmd).await;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("401"));
    // The root is prepared, but nothing is cloned into it
    assert_eq!(std::fs::read_dir(&env.backup_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_list_prints_every_page() {
    let server = MockServer::start().await;
    let next = format!("<{}/user/repos?page=2>; rel=\"next\"", server.uri());
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(vec![repo_json("first", "https://example.com/first.git")]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![repo_json("second", "https://example.com/second.git")]),
        )
        .mount(&server)
        .await;
    let env = TestEnvironment::new();
    let config = env.write_config(&server.uri());

    let mut cmd = env.repovault();
    cmd.args(["list", "--details"]).arg("--config").arg(&config);
    let output = run(cmd).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Repositories (2)"));
    assert!(stdout.find("first").unwrap() < stdout.find("second").unwrap());
    assert!(stdout.contains("https://example.com/second.git"));
}

#[tokio::test]
async fn test_script_writes_executable_clone_script() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            repo_json("alpha", "https://github.com/octocat/alpha.git"),
            repo_json("beta", "https://github.com/octocat/beta.git"),
        ]))
        .mount(&server)
        .await;
    let env = TestEnvironment::new();
    let config = env.write_config(&server.uri());
    let script = env.temp_dir.child("clone_repos.sh");

    let mut cmd = env.repovault();
    cmd.arg("script")
        .arg("--output")
        .arg(script.path())
        .arg("--config")
        .arg(&config);
    let output = run(cmd).await;

    assert!(output.status.success());
    script.assert(predicate::str::starts_with("#!/bin/bash\n\n"));
    script.assert(predicate::str::contains(
        "git clone 'https://github.com/octocat/alpha.git'\ngit clone 'https://github.com/octocat/beta.git'\n",
    ));
    // Token stays out unless asked for
    script.assert(predicate::str::contains("ghp_integration").not());
}

#[tokio::test]
async fn test_backup_clones_updates_and_recovers_local_origins() {
    if !git_available() {
        return;
    }

    let env = TestEnvironment::new();
    let alpha = env.create_origin("alpha");
    let missing = env.origins.join("missing.git");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            repo_json("alpha", &alpha.to_string_lossy()),
            repo_json("missing", &missing.to_string_lossy()),
        ]))
        .mount(&server)
        .await;
    let config = env.write_config(&server.uri());
    let backup = env.temp_dir.child("backup");

    // First run: alpha cloned, missing skipped without aborting the run
    let mut cmd = env.repovault();
    cmd.arg("backup").arg("--config").arg(&config);
    let output = run(cmd).await;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cloned: 1"));
    assert!(stdout.contains("Failed: 1"));
    backup.child("alpha").child(".git").assert(predicate::path::is_dir());
    backup.child("alpha").child("README.md").assert("# alpha\n");
    backup.child("missing").assert(predicate::path::missing());

    // Second run: new upstream commit is pulled into the existing mirror
    env.push_commit("alpha", "CHANGELOG.md", "v2\n");
    let mut cmd = env.repovault();
    cmd.arg("backup").arg("--config").arg(&config);
    let output = run(cmd).await;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Updated: 1"));
    backup.child("alpha").child("CHANGELOG.md").assert("v2\n");

    // Third run: a mirror without .git is wiped and recloned
    std::fs::remove_dir_all(backup.child("alpha").child(".git").path()).unwrap();
    let mut cmd = env.repovault();
    cmd.arg("backup").arg("--config").arg(&config);
    let output = run(cmd).await;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Recovered: 1"));
    backup.child("alpha").child(".git").assert(predicate::path::is_dir());
    backup.child("alpha").child("CHANGELOG.md").assert("v2\n");
}
