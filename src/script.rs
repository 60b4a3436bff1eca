//! One-shot clone script generation over the repository listing

use anyhow::{Context, Result};
use std::path::Path;

use crate::github::{Credential, RepositoryDescriptor};

pub const DEFAULT_SCRIPT_NAME: &str = "clone_repos.sh";

/// Render a bash script with one `git clone` per repository, in listing order.
///
/// With a credential, https clone URLs carry the token inline so the script runs
/// unattended. Anyone who can read the file can then read the token.
pub fn generate_clone_script(repos: &[RepositoryDescriptor], credential: Option<&Credential>) -> String {
    let mut script = String::from("#!/bin/bash\n\n");

    for repo in repos {
        let url = match credential {
            Some(credential) => embed_token(&repo.clone_url, credential),
            None => repo.clone_url.clone(),
        };
        script.push_str(&format!("git clone {}\n", shell_quote(&url)));
    }

    script
}

fn embed_token(url: &str, credential: &Credential) -> String {
    match url.strip_prefix("https://") {
        Some(rest) => format!("https://{}@{}", credential.expose(), rest),
        None => url.to_string(),
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Write the script and mark it executable
pub fn write_clone_script(path: &Path, script: &str) -> Result<()> {
    std::fs::write(path, script)
        .with_context(|| format!("Failed to write clone script: {:?}", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {:?} executable", path))?;
    }

    Ok(())
}
