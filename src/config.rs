//! Action inputs and CI run context.
//!
//! Inputs arrive as `INPUT_<NAME>` environment variables (the GitHub Actions
//! convention), optionally layered over a TOML file for local runs. Everything
//! the service needs from the process environment is captured once here and
//! passed down explicitly.

use crate::github::{MergeMethod, PullRequestContent, PullRequestMetadata};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_PR_BODY_CHARS: usize = 65536;
pub const DEFAULT_REMOTE_NAME: &str = "origin";
pub const DEFAULT_MAX_MERGE_RETRIES: u32 = 60;
pub const DEFAULT_MERGE_RETRY_INTERVAL: u64 = 60;
pub const DEFAULT_SERVER_URL: &str = "https://github.com";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

pub const PR_BODY_TOO_LONG: &str = "The maximum size of the Pull Request body 65536 character. Your input PR body message will be truncated shorter.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Input Github Token not supplied. Unable to continue.")]
    TokenNotSupplied,
    #[error("Input required and not supplied: {name}")]
    MissingInput { name: &'static str },
    #[error("The source_branch and the target_branch for a pull request must be different branches. Unable to continue.")]
    SameBranch,
    #[error("Input '{name}' must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("Input '{name}' must be one of true | True | TRUE | false | False | FALSE, got '{value}'")]
    InvalidBoolean { name: &'static str, value: String },
    #[error("GITHUB_WORKSPACE not defined")]
    WorkspaceNotDefined,
    #[error("Failed to load inputs: {0}")]
    Load(#[from] config::ConfigError),
}

/// Inputs exactly as supplied; unset and empty values are `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInputs {
    pub github_token: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub remote_name: Option<String>,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    pub pr_title: Option<String>,
    pub pr_body: Option<String>,
    pub draft: Option<String>,
    pub require_middle_branch: Option<String>,
    pub auto_merge: Option<String>,
    pub merge_method: Option<String>,
    pub max_merge_retries: Option<String>,
    pub merge_retry_interval: Option<String>,
    pub milestone: Option<String>,
    pub assignees: Option<String>,
    pub reviewers: Option<String>,
    pub team_reviewers: Option<String>,
    pub labels: Option<String>,
    pub signoff: Option<String>,
    pub ssh_key: Option<String>,
    pub ssh_known_hosts: Option<String>,
    pub ssh_strict: Option<String>,
    pub persist_credentials: Option<String>,
}

impl RawInputs {
    /// Layer `INPUT_*` variables from `env` over the optional file.
    pub fn load(file: Option<&Path>, env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix("INPUT").source(Some(env)))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_process_env(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(file, std::env::vars().collect())
    }
}

/// CI run context read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub workspace: PathBuf,
    pub github_ref: Option<String>,
    pub server_url: String,
    pub api_url: String,
    pub runner_temp: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
}

impl RunContext {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string);

        let workspace = get("GITHUB_WORKSPACE").ok_or(ConfigError::WorkspaceNotDefined)?;
        let workspace = std::path::absolute(&workspace).unwrap_or_else(|_| PathBuf::from(&workspace));
        debug!(workspace = %workspace.display(), "Resolved workspace");

        Ok(Self {
            workspace,
            github_ref: get("GITHUB_REF"),
            server_url: get("GITHUB_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            api_url: get("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            runner_temp: get("RUNNER_TEMP").map(PathBuf::from),
            output_file: get("GITHUB_OUTPUT").map(PathBuf::from),
            home_dir: get("HOME").map(PathBuf::from),
        })
    }
}

/// Validated action inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inputs {
    pub github_token: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub remote_name: String,
    pub source_branch: String,
    /// May be empty; the reconciler rejects an empty target.
    pub target_branch: String,
    pub pr_title: String,
    pub pr_body: String,
    pub draft: bool,
    pub require_middle_branch: bool,
    pub auto_merge: bool,
    pub merge_method: MergeMethod,
    pub max_merge_retries: u32,
    pub merge_retry_interval: u64,
    pub milestone: Option<u64>,
    pub assignees: Vec<String>,
    pub reviewers: Vec<String>,
    pub team_reviewers: Vec<String>,
    pub labels: Vec<String>,
    /// Accepted for workflow compatibility; the action creates no commits.
    pub signoff: bool,
    pub ssh_key: Option<String>,
    pub ssh_known_hosts: Option<String>,
    pub ssh_strict: bool,
    pub persist_credentials: bool,
}

impl Inputs {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_raw(RawInputs::from_process_env(file)?)
    }

    pub fn from_raw(raw: RawInputs) -> Result<Self, ConfigError> {
        let github_token = non_empty(raw.github_token).ok_or(ConfigError::TokenNotSupplied)?;
        let source_branch = required(raw.source_branch, "source_branch")?;
        let target_branch = non_empty(raw.target_branch).unwrap_or_default();
        if source_branch == target_branch {
            return Err(ConfigError::SameBranch);
        }

        let mut pr_body = non_empty(raw.pr_body).unwrap_or_default();
        if pr_body.chars().count() > MAX_PR_BODY_CHARS {
            warn!("{}", PR_BODY_TOO_LONG);
            crate::workflow::warning(PR_BODY_TOO_LONG);
            pr_body = pr_body.chars().take(MAX_PR_BODY_CHARS).collect();
        }

        Ok(Self {
            github_token,
            repo_owner: required(raw.repo_owner, "repo_owner")?,
            repo_name: required(raw.repo_name, "repo_name")?,
            remote_name: non_empty(raw.remote_name).unwrap_or_else(|| DEFAULT_REMOTE_NAME.to_string()),
            source_branch,
            target_branch,
            pr_title: required(raw.pr_title, "pr_title")?,
            pr_body,
            draft: boolean(raw.draft, "draft", false)?,
            require_middle_branch: boolean(raw.require_middle_branch, "require_middle_branch", false)?,
            auto_merge: boolean(raw.auto_merge, "auto_merge", false)?,
            merge_method: non_empty(raw.merge_method)
                .map(|m| MergeMethod::from_input(&m))
                .unwrap_or_default(),
            max_merge_retries: number(raw.max_merge_retries, "max_merge_retries")?
                .unwrap_or(DEFAULT_MAX_MERGE_RETRIES),
            merge_retry_interval: number(raw.merge_retry_interval, "merge_retry_interval")?
                .unwrap_or(DEFAULT_MERGE_RETRY_INTERVAL),
            milestone: number(raw.milestone, "milestone")?,
            assignees: list(raw.assignees),
            reviewers: list(raw.reviewers),
            team_reviewers: list(raw.team_reviewers),
            labels: list(raw.labels),
            signoff: boolean(raw.signoff, "signoff", false)?,
            ssh_key: non_empty(raw.ssh_key),
            ssh_known_hosts: non_empty(raw.ssh_known_hosts),
            ssh_strict: boolean(raw.ssh_strict, "ssh_strict", true)?,
            persist_credentials: boolean(raw.persist_credentials, "persist_credentials", false)?,
        })
    }

    pub fn content(&self) -> PullRequestContent {
        PullRequestContent {
            title: self.pr_title.clone(),
            body: self.pr_body.clone(),
            draft: self.draft,
        }
    }

    pub fn metadata(&self) -> PullRequestMetadata {
        PullRequestMetadata {
            milestone: self.milestone,
            labels: self.labels.clone(),
            assignees: self.assignees.clone(),
            reviewers: self.reviewers.clone(),
            team_reviewers: self.team_reviewers.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_empty(value)
        .map(|v| v.trim().to_string())
        .ok_or(ConfigError::MissingInput { name })
}

fn boolean(value: Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = non_empty(value) else {
        return Ok(default);
    };
    match value.trim() {
        "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        other => Err(ConfigError::InvalidBoolean {
            name,
            value: other.to_string(),
        }),
    }
}

fn number<T: std::str::FromStr>(value: Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    non_empty(value)
        .map(|v| {
            v.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
                name,
                value: v.clone(),
            })
        })
        .transpose()
}

/// Comma separated, blanks dropped.
fn list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load `.env` for local runs; absence is not an error.
pub fn load_env_file() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to load .env file"),
    }
}
