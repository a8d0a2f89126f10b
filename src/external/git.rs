//! Git command abstractions
//!
//! `GitCommands` is the capability surface the reconciliation engine and the
//! auth helper need. `GitClient` implements it by shelling out to the git CLI
//! through a `CommandExecutor`.

use super::command::{CommandError, CommandExecutor, CommandOutput};
use async_trait::async_trait;
use regex::RegexBuilder;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

const NO_LOCAL_CHANGES: &str = "No local changes to save";
const TAGS_REFSPEC: &str = "+refs/tags/*:refs/tags/*";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Repository not found or not a git repository")]
    RepositoryNotFound,
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
    #[error("git {args} failed with exit code {code}: {stderr}")]
    GitCommandFailed {
        args: String,
        code: i32,
        stderr: String,
    },
    #[error("Unexpected output from git {args}: '{output}'")]
    UnexpectedOutput { args: String, output: String },
    #[error("The format of '{url}' is not a valid GitHub repository URL")]
    InvalidRemoteUrl { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingBaseType {
    Branch,
    Commit,
    Pull,
}

impl fmt::Display for WorkingBaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            WorkingBaseType::Branch => "branch",
            WorkingBaseType::Commit => "commit",
            WorkingBaseType::Pull => "pull",
        };
        f.write_str(value)
    }
}

/// The ref the job started on and what kind of ref it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingBase {
    pub working_base: String,
    pub working_base_type: WorkingBaseType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProtocol {
    Https,
    Ssh,
}

impl fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteProtocol::Https => f.write_str("HTTPS"),
            RemoteProtocol::Ssh => f.write_str("SSH"),
        }
    }
}

/// Parsed form of the origin remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDetail {
    pub hostname: String,
    pub protocol: RemoteProtocol,
    /// `owner/repo`
    pub repository: String,
}

/// Parse a remote URL against the configured server URL.
///
/// Accepts `https://[user@]host/owner/repo[.git]` and the scp-like
/// `git@host:owner/repo[.git]` form.
pub fn parse_remote_detail(remote_url: &str, server_url: &str) -> Result<RemoteDetail, GitError> {
    let invalid = || GitError::InvalidRemoteUrl {
        url: remote_url.to_string(),
    };

    let host = server_url
        .strip_prefix("https://")
        .or_else(|| server_url.strip_prefix("http://"))
        .map(|h| h.trim_end_matches('/'))
        .filter(|h| !h.is_empty())
        .ok_or_else(invalid)?;
    let host_pattern = regex::escape(host);

    let https = RegexBuilder::new(&format!(r"^https?://(?:[^@/]*@)?{host_pattern}/(.+/.+?)(?:\.git)?$"))
        .case_insensitive(true)
        .build()
        .map_err(|_| invalid())?;
    if let Some(captures) = https.captures(remote_url) {
        return Ok(RemoteDetail {
            hostname: host.to_string(),
            protocol: RemoteProtocol::Https,
            repository: captures[1].to_string(),
        });
    }

    let ssh = RegexBuilder::new(&format!(r"^git@{host_pattern}:(.+/.+?)(?:\.git)?$"))
        .case_insensitive(true)
        .build()
        .map_err(|_| invalid())?;
    if let Some(captures) = ssh.captures(remote_url) {
        return Ok(RemoteDetail {
            hostname: host.to_string(),
            protocol: RemoteProtocol::Ssh,
            repository: captures[1].to_string(),
        });
    }

    Err(invalid())
}

/// Git operations used while preparing a pull request branch.
///
/// Every call runs to completion before the next one is issued; callers never
/// run two commands concurrently against the same working tree.
#[async_trait]
pub trait GitCommands: Send + Sync {
    /// Where the job started: a pull ref, a branch, or a detached commit.
    async fn working_base_and_type(&self) -> Result<WorkingBase, GitError>;

    /// Returns `true` when something was stashed.
    async fn stash_push(&self, options: &[String]) -> Result<bool, GitError>;
    async fn stash_pop(&self, options: &[String]) -> Result<(), GitError>;

    async fn checkout(&self, reference: &str) -> Result<(), GitError>;
    /// `checkout -B <branch> <start_point>`
    async fn checkout_new(&self, branch: &str, start_point: &str) -> Result<(), GitError>;

    /// Fetch one branch into `refs/remotes/<remote>/<branch>`.
    /// Returns `false` when the branch cannot be fetched.
    async fn fetch(&self, remote: &str, branch: &str) -> Result<bool, GitError>;
    async fn fetch_remote(&self, refspecs: &[String], remote: &str, options: &[String]) -> Result<(), GitError>;
    async fn fetch_all(&self) -> Result<(), GitError>;
    async fn pull(&self, options: &[String]) -> Result<(), GitError>;
    async fn push(&self, options: &[String]) -> Result<(), GitError>;

    /// Commits reachable from `branch2` but not `branch1`.
    async fn commits_ahead(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<u32, GitError>;
    /// Commits reachable from `branch1` but not `branch2`.
    async fn commits_behind(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<u32, GitError>;

    async fn is_ahead(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<bool, GitError> {
        Ok(self.commits_ahead(branch1, branch2, options).await? > 0)
    }

    async fn is_behind(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<bool, GitError> {
        Ok(self.commits_behind(branch1, branch2, options).await? > 0)
    }

    async fn is_even(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<bool, GitError> {
        Ok(!self.is_ahead(branch1, branch2, options).await?
            && !self.is_behind(branch1, branch2, options).await?)
    }

    async fn has_diff(&self, options: &[String]) -> Result<bool, GitError>;
    async fn rev_parse(&self, reference: &str, options: &[String]) -> Result<String, GitError>;
    async fn delete_branch(&self, branch: &str, options: &[String]) -> Result<(), GitError>;

    async fn config(&self, key: &str, value: &str, global: bool, add: bool) -> Result<(), GitError>;
    async fn config_exists(&self, key: &str, global: bool) -> Result<bool, GitError>;
    /// Returns `false` when the key could not be removed.
    async fn unset_config(&self, key: &str, global: bool) -> Result<bool, GitError>;
    async fn repo_remote_url(&self) -> Result<String, GitError>;

    /// Extra environment for every subsequent git invocation.
    fn set_env(&self, name: &str, value: &str);
    fn remove_env(&self, name: &str);
}

/// Real Git implementation
pub struct GitClient {
    executor: Arc<dyn CommandExecutor>,
    working_dir: PathBuf,
    github_ref: Option<String>,
    env: Mutex<HashMap<String, String>>,
}

impl GitClient {
    pub fn new(executor: Arc<dyn CommandExecutor>, working_dir: impl Into<PathBuf>, github_ref: Option<String>) -> Self {
        let mut env = HashMap::new();
        env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
        env.insert("GCM_INTERACTIVE".to_string(), "Never".to_string());
        Self {
            executor,
            working_dir: working_dir.into(),
            github_ref,
            env: Mutex::new(env),
        }
    }

    fn env_pairs(&self) -> Vec<(String, String)> {
        let env = self.env.lock().unwrap_or_else(|e| e.into_inner());
        let mut pairs: Vec<(String, String)> = env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort();
        pairs
    }

    async fn exec(&self, args: Vec<String>, allow_all_exit_codes: bool) -> Result<CommandOutput, GitError> {
        let output = self.executor.execute("git", &args, &self.env_pairs()).await?;

        if !output.success() && !allow_all_exit_codes {
            return Err(classify_git_error(&output, &args));
        }

        Ok(output)
    }

    async fn execute_git_command(&self, args: Vec<String>) -> Result<String, GitError> {
        Ok(self.exec(args, false).await?.stdout.trim().to_string())
    }

    async fn rev_list_count(&self, side: &str, branch1: &str, branch2: &str, options: &[String]) -> Result<u32, GitError> {
        let mut args = strings(&["rev-list", side, "--count", &format!("{branch1}...{branch2}")]);
        args.extend_from_slice(options);
        let output = self.execute_git_command(args.clone()).await?;
        output.parse::<u32>().map_err(|_| GitError::UnexpectedOutput {
            args: args.join(" "),
            output,
        })
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn classify_git_error(output: &CommandOutput, args: &[String]) -> GitError {
    if output.stderr.contains("not a git repository") {
        GitError::RepositoryNotFound
    } else {
        GitError::GitCommandFailed {
            args: args.join(" "),
            code: output.status_code,
            stderr: output.stderr.trim().to_string(),
        }
    }
}

#[async_trait]
impl GitCommands for GitClient {
    async fn working_base_and_type(&self) -> Result<WorkingBase, GitError> {
        if let Some(github_ref) = self.github_ref.as_deref().filter(|r| r.contains("/pull/")) {
            let rest = github_ref.strip_prefix("refs/pull/").unwrap_or(github_ref);
            return Ok(WorkingBase {
                working_base: format!("refs/remotes/pull/{rest}"),
                working_base_type: WorkingBaseType::Pull,
            });
        }

        let symbolic = self.exec(strings(&["symbolic-ref", "HEAD", "--short"]), true).await?;
        if symbolic.success() {
            return Ok(WorkingBase {
                working_base: symbolic.stdout.trim().to_string(),
                working_base_type: WorkingBaseType::Branch,
            });
        }

        let head = self.rev_parse("HEAD", &[]).await?;
        Ok(WorkingBase {
            working_base: head,
            working_base_type: WorkingBaseType::Commit,
        })
    }

    async fn stash_push(&self, options: &[String]) -> Result<bool, GitError> {
        let mut args = strings(&["stash", "push"]);
        args.extend_from_slice(options);
        let output = self.execute_git_command(args).await?;
        Ok(output != NO_LOCAL_CHANGES)
    }

    async fn stash_pop(&self, options: &[String]) -> Result<(), GitError> {
        let mut args = strings(&["stash", "pop"]);
        args.extend_from_slice(options);
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn checkout(&self, reference: &str) -> Result<(), GitError> {
        let args = strings(&["checkout", "--progress", "--force", reference, "--"]);
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn checkout_new(&self, branch: &str, start_point: &str) -> Result<(), GitError> {
        let args = strings(&["checkout", "--progress", "--force", "-B", branch, start_point, "--"]);
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn fetch(&self, remote: &str, branch: &str) -> Result<bool, GitError> {
        let refspec = format!("{branch}:refs/remotes/{remote}/{branch}");
        match self.fetch_remote(&[refspec], remote, &strings(&["--force"])).await {
            Ok(()) => Ok(true),
            Err(GitError::GitCommandFailed { stderr, .. }) => {
                tracing::debug!(remote, branch, stderr = %stderr, "Branch not fetched");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_remote(&self, refspecs: &[String], remote: &str, options: &[String]) -> Result<(), GitError> {
        let mut args = strings(&["-c", "protocol.version=2", "fetch"]);
        if !refspecs.iter().any(|r| r == TAGS_REFSPEC) {
            args.push("--no-tags".to_string());
        }
        args.push("--progress".to_string());
        args.push("--no-recurse-submodules".to_string());
        if self.working_dir.join(".git").join("shallow").exists() {
            args.push("--unshallow".to_string());
        }
        args.extend_from_slice(options);
        args.push(if remote.is_empty() { "origin" } else { remote }.to_string());
        args.extend_from_slice(refspecs);

        self.execute_git_command(args).await.map(|_| ())
    }

    async fn fetch_all(&self) -> Result<(), GitError> {
        self.execute_git_command(strings(&["fetch"])).await.map(|_| ())
    }

    async fn pull(&self, options: &[String]) -> Result<(), GitError> {
        let mut args = strings(&["pull"]);
        args.extend_from_slice(options);
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn push(&self, options: &[String]) -> Result<(), GitError> {
        let mut args = strings(&["push"]);
        args.extend_from_slice(options);
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn commits_ahead(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<u32, GitError> {
        self.rev_list_count("--right-only", branch1, branch2, options).await
    }

    async fn commits_behind(&self, branch1: &str, branch2: &str, options: &[String]) -> Result<u32, GitError> {
        self.rev_list_count("--left-only", branch1, branch2, options).await
    }

    async fn has_diff(&self, options: &[String]) -> Result<bool, GitError> {
        let mut args = strings(&["diff", "--quiet"]);
        args.extend_from_slice(options);
        let output = self.exec(args.clone(), true).await?;
        match output.status_code {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(classify_git_error(&output, &args)),
        }
    }

    async fn rev_parse(&self, reference: &str, options: &[String]) -> Result<String, GitError> {
        let mut args = strings(&["rev-parse"]);
        args.extend_from_slice(options);
        args.push(reference.to_string());
        self.execute_git_command(args).await
    }

    async fn delete_branch(&self, branch: &str, options: &[String]) -> Result<(), GitError> {
        let mut args = strings(&["branch", "--delete"]);
        args.extend_from_slice(options);
        args.push(branch.to_string());
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn config(&self, key: &str, value: &str, global: bool, add: bool) -> Result<(), GitError> {
        let mut args = strings(&["config", if global { "--global" } else { "--local" }]);
        if add {
            args.push("--add".to_string());
        }
        args.push(key.to_string());
        args.push(value.to_string());
        self.execute_git_command(args).await.map(|_| ())
    }

    async fn config_exists(&self, key: &str, global: bool) -> Result<bool, GitError> {
        let args = strings(&["config", if global { "--global" } else { "--local" }, "--get-all", key]);
        Ok(self.exec(args, true).await?.success())
    }

    async fn unset_config(&self, key: &str, global: bool) -> Result<bool, GitError> {
        let args = strings(&["config", if global { "--global" } else { "--local" }, "--unset-all", key]);
        Ok(self.exec(args, true).await?.success())
    }

    async fn repo_remote_url(&self) -> Result<String, GitError> {
        self.execute_git_command(strings(&["config", "--get", "remote.origin.url"])).await
    }

    fn set_env(&self, name: &str, value: &str) {
        let mut env = self.env.lock().unwrap_or_else(|e| e.into_inner());
        env.insert(name.to_string(), value.to_string());
    }

    fn remove_env(&self, name: &str) {
        let mut env = self.env.lock().unwrap_or_else(|e| e.into_inner());
        env.remove(name);
    }
}
