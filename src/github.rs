use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, NetworkError};

/// Branch used when the API does not report one
pub const FALLBACK_BRANCH: &str = "main";

/// API bearer credential; never printed in full
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Remote identity of one repository, fetched fresh on every run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepositoryDescriptor {
    /// Unique name, also used as the mirror directory name
    pub name: String,
    pub clone_url: String,
    #[serde(default = "fallback_branch", deserialize_with = "branch_or_fallback")]
    pub default_branch: String,
}

impl RepositoryDescriptor {
    pub fn new(
        name: impl Into<String>,
        clone_url: impl Into<String>,
        default_branch: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            clone_url: clone_url.into(),
            default_branch: default_branch
                .filter(|b| !b.is_empty())
                .unwrap_or(FALLBACK_BRANCH)
                .to_string(),
        }
    }
}

fn fallback_branch() -> String {
    FALLBACK_BRANCH.to_string()
}

fn branch_or_fallback<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let branch = Option::<String>::deserialize(deserializer)?;
    Ok(branch
        .filter(|b| !b.is_empty())
        .unwrap_or_else(fallback_branch))
}

/// One page of the repository listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub repositories: Vec<RepositoryDescriptor>,
    /// Whether the response advertised a `rel="next"` link
    pub has_next: bool,
}

/// Source of numbered listing pages (1-based)
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Page, NetworkError>;
}

/// Enumerates every repository of the authenticated account
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    async fn list_all_repositories(&self) -> Result<Vec<RepositoryDescriptor>, NetworkError>;
}

/// Walk pages from 1 until a page is empty or no next page is advertised.
///
/// Pages are concatenated in the order the API yields them. The first failing
/// page aborts the walk.
pub async fn paginate<S>(source: &S) -> Result<Vec<RepositoryDescriptor>, NetworkError>
where
    S: PageSource + ?Sized,
{
    let mut repositories = Vec::new();
    let mut page = 1u32;

    loop {
        let Page {
            repositories: items,
            has_next,
        } = source.fetch_page(page).await?;

        if items.is_empty() {
            debug!("Page {} is empty, listing complete", page);
            break;
        }

        info!("Fetched page {}, found {} repositories", page, items.len());
        repositories.extend(items);

        if !has_next {
            break;
        }
        page += 1;
    }

    Ok(repositories)
}

/// Check a `Link` header for a `rel="next"` entry
pub fn has_next_link(link: &str) -> bool {
    link.split(',').any(|entry| {
        entry.split(';').skip(1).any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|rel| {
                    rel.trim_matches('"')
                        .split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("next"))
                })
                .unwrap_or(false)
        })
    })
}

/// Resolve the API credential according to `github.auth_method`
pub fn resolve_credential(config: &Config) -> Result<Credential, ConfigError> {
    let configured = config
        .github
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let token = match config.github.auth_method.as_str() {
        "auto" => match configured {
            Some(token) => token.to_string(),
            None => try_github_cli().map_err(|e| {
                debug!("GitHub CLI fallback unavailable: {}", e);
                ConfigError::MissingCredential
            })?,
        },
        "token" => configured
            .ok_or(ConfigError::MissingCredential)?
            .to_string(),
        "gh_cli" => try_github_cli().map_err(|e| ConfigError::CredentialHelper(e.to_string()))?,
        other => return Err(ConfigError::UnknownAuthMethod(other.to_string())),
    };

    if !["ghp_", "gho_", "ghs_", "ghu_", "github_pat_"]
        .iter()
        .any(|prefix| token.starts_with(prefix))
    {
        warn!("GitHub token doesn't look like a GitHub token (expected a ghp_, gho_, ghs_, ghu_ or github_pat_ prefix)");
    }

    Ok(Credential::new(token))
}

/// Try to get token from GitHub CLI
fn try_github_cli() -> Result<String> {
    debug!("Attempting GitHub CLI authentication");

    let token_output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .context("Failed to run GitHub CLI (is gh installed?)")?;

    if !token_output.status.success() {
        return Err(anyhow!(
            "Failed to retrieve token from GitHub CLI: {}",
            String::from_utf8_lossy(&token_output.stderr).trim()
        ));
    }

    let token = String::from_utf8(token_output.stdout)
        .context("GitHub CLI token is not valid UTF-8")?
        .trim()
        .to_string();

    if token.is_empty() {
        return Err(anyhow!("GitHub CLI returned empty token"));
    }

    debug!("Successfully obtained token from GitHub CLI");
    Ok(token)
}

/// GitHub REST client for the repository listing
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    per_page: u32,
}

#[derive(Deserialize)]
struct AuthenticatedUser {
    login: String,
}

impl GitHubClient {
    /// Create a client that authenticates every request with `credential`
    pub fn new(config: &Config, credential: &Credential) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .context("GitHub token contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("repovault/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.github.request_timeout.max(1)))
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            http,
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            per_page: config.github.per_page.clamp(1, 100),
        })
    }

    /// Login of the account the credential belongs to
    pub async fn current_user(&self) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .send()
            .await
            .context("Failed to reach the GitHub API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub API responded with status {}: {}", status, body));
        }

        let user: AuthenticatedUser = response
            .json()
            .await
            .context("Failed to decode authenticated user")?;
        Ok(user.login)
    }
}

#[async_trait]
impl PageSource for GitHubClient {
    async fn fetch_page(&self, page: u32) -> Result<Page, NetworkError> {
        debug!("Requesting repository page {}", page);

        let response = self
            .http
            .get(format!("{}/user/repos", self.api_url))
            .query(&[("page", page), ("per_page", self.per_page)])
            .send()
            .await
            .map_err(|source| NetworkError::Request { page, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                page,
                status: status.as_u16(),
                body,
            });
        }

        let has_next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(has_next_link)
            .unwrap_or(false);

        let repositories: Vec<RepositoryDescriptor> = response
            .json()
            .await
            .map_err(|source| NetworkError::Decode { page, source })?;

        Ok(Page {
            repositories,
            has_next,
        })
    }
}

#[async_trait]
impl RepositoryLister for GitHubClient {
    async fn list_all_repositories(&self) -> Result<Vec<RepositoryDescriptor>, NetworkError> {
        let repositories = paginate(self).await?;
        info!("Found {} repositories", repositories.len());
        Ok(repositories)
    }
}
