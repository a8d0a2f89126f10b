// Recording git fake for reconciliation and service tests - no side effects

use crate::external::git::{GitCommands, GitError, WorkingBase, WorkingBaseType};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    WorkingBase,
    StashPush(Vec<String>),
    StashPop,
    Checkout(String),
    CheckoutNew { branch: String, start_point: String },
    Fetch { remote: String, branch: String },
    FetchRemote(Vec<String>),
    FetchAll,
    Pull,
    Push(Vec<String>),
    CommitsAhead { from: String, to: String },
    CommitsBehind { from: String, to: String },
    HasDiff(Vec<String>),
    RevParse(String),
    DeleteBranch { branch: String, options: Vec<String> },
    Config { key: String, value: String },
    ConfigExists(String),
    UnsetConfig(String),
    RemoteUrl,
}

impl GitCall {
    pub fn name(&self) -> &'static str {
        match self {
            GitCall::WorkingBase => "working_base",
            GitCall::StashPush(_) => "stash_push",
            GitCall::StashPop => "stash_pop",
            GitCall::Checkout(_) => "checkout",
            GitCall::CheckoutNew { .. } => "checkout_new",
            GitCall::Fetch { .. } => "fetch",
            GitCall::FetchRemote(_) => "fetch_remote",
            GitCall::FetchAll => "fetch_all",
            GitCall::Pull => "pull",
            GitCall::Push(_) => "push",
            GitCall::CommitsAhead { .. } => "commits_ahead",
            GitCall::CommitsBehind { .. } => "commits_behind",
            GitCall::HasDiff(_) => "has_diff",
            GitCall::RevParse(_) => "rev_parse",
            GitCall::DeleteBranch { .. } => "delete_branch",
            GitCall::Config { .. } => "config",
            GitCall::ConfigExists(_) => "config_exists",
            GitCall::UnsetConfig(_) => "unset_config",
            GitCall::RemoteUrl => "remote_url",
        }
    }
}

/// Git fake with canned answers; every call is recorded in order.
#[derive(Debug)]
pub struct MockGit {
    working_base: WorkingBase,
    stash_has_changes: bool,
    remote_branches: HashSet<String>,
    ahead: HashMap<(String, String), u32>,
    behind: HashMap<(String, String), u32>,
    diffs: HashMap<String, bool>,
    head_sha: String,
    remote_url: String,
    fail_on: Option<&'static str>,
    calls: Mutex<Vec<GitCall>>,
    env: Mutex<HashMap<String, String>>,
}

impl Default for MockGit {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGit {
    pub fn new() -> Self {
        Self {
            working_base: WorkingBase {
                working_base: "feature".to_string(),
                working_base_type: WorkingBaseType::Branch,
            },
            stash_has_changes: false,
            remote_branches: HashSet::new(),
            ahead: HashMap::new(),
            behind: HashMap::new(),
            diffs: HashMap::new(),
            head_sha: "0123456789abcdef".to_string(),
            remote_url: "https://github.com/octo/widgets.git".to_string(),
            fail_on: None,
            calls: Mutex::new(Vec::new()),
            env: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_working_base(mut self, base: &str, kind: WorkingBaseType) -> Self {
        self.working_base = WorkingBase {
            working_base: base.to_string(),
            working_base_type: kind,
        };
        self
    }

    pub fn with_stashed_changes(mut self) -> Self {
        self.stash_has_changes = true;
        self
    }

    pub fn with_remote_branch(mut self, branch: &str) -> Self {
        self.remote_branches.insert(branch.to_string());
        self
    }

    /// Commits in `to` that are not in `from`.
    pub fn with_ahead(mut self, from: &str, to: &str, count: u32) -> Self {
        self.ahead.insert((from.to_string(), to.to_string()), count);
        self
    }

    /// Commits in `from` that are not in `to`.
    pub fn with_behind(mut self, from: &str, to: &str, count: u32) -> Self {
        self.behind.insert((from.to_string(), to.to_string()), count);
        self
    }

    pub fn with_diff(mut self, range: &str) -> Self {
        self.diffs.insert(range.to_string(), true);
        self
    }

    pub fn with_head_sha(mut self, sha: &str) -> Self {
        self.head_sha = sha.to_string();
        self
    }

    pub fn with_remote_url(mut self, url: &str) -> Self {
        self.remote_url = url.to_string();
        self
    }

    /// Make every call with this name fail.
    pub fn failing_on(mut self, name: &'static str) -> Self {
        self.fail_on = Some(name);
        self
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.name() == name).count()
    }

    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env.lock().unwrap().get(name).cloned()
    }

    fn record(&self, call: GitCall) -> Result<(), GitError> {
        let name = call.name();
        self.calls.lock().unwrap().push(call);
        if self.fail_on == Some(name) {
            return Err(GitError::GitCommandFailed {
                args: name.to_string(),
                code: 1,
                stderr: format!("{name} failed"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GitCommands for MockGit {
    async fn working_base_and_type(&self) -> Result<WorkingBase, GitError> {
        self.record(GitCall::WorkingBase)?;
        Ok(self.working_base.clone())
    }

    async fn stash_push(&self, options: &[String]) -> Result<bool, GitError> {
        self.record(GitCall::StashPush(options.to_vec()))?;
        Ok(self.stash_has_changes)
    }

    async fn stash_pop(&self, _options: &[String]) -> Result<(), GitError> {
        self.record(GitCall::StashPop)
    }

    async fn checkout(&self, reference: &str) -> Result<(), GitError> {
        self.record(GitCall::Checkout(reference.to_string()))
    }

    async fn checkout_new(&self, branch: &str, start_point: &str) -> Result<(), GitError> {
        self.record(GitCall::CheckoutNew {
            branch: branch.to_string(),
            start_point: start_point.to_string(),
        })
    }

    async fn fetch(&self, remote: &str, branch: &str) -> Result<bool, GitError> {
        self.record(GitCall::Fetch {
            remote: remote.to_string(),
            branch: branch.to_string(),
        })?;
        Ok(self.remote_branches.contains(branch))
    }

    async fn fetch_remote(&self, refspecs: &[String], _remote: &str, _options: &[String]) -> Result<(), GitError> {
        self.record(GitCall::FetchRemote(refspecs.to_vec()))
    }

    async fn fetch_all(&self) -> Result<(), GitError> {
        self.record(GitCall::FetchAll)
    }

    async fn pull(&self, _options: &[String]) -> Result<(), GitError> {
        self.record(GitCall::Pull)
    }

    async fn push(&self, options: &[String]) -> Result<(), GitError> {
        self.record(GitCall::Push(options.to_vec()))
    }

    async fn commits_ahead(&self, branch1: &str, branch2: &str, _options: &[String]) -> Result<u32, GitError> {
        self.record(GitCall::CommitsAhead {
            from: branch1.to_string(),
            to: branch2.to_string(),
        })?;
        Ok(*self
            .ahead
            .get(&(branch1.to_string(), branch2.to_string()))
            .unwrap_or(&0))
    }

    async fn commits_behind(&self, branch1: &str, branch2: &str, _options: &[String]) -> Result<u32, GitError> {
        self.record(GitCall::CommitsBehind {
            from: branch1.to_string(),
            to: branch2.to_string(),
        })?;
        Ok(*self
            .behind
            .get(&(branch1.to_string(), branch2.to_string()))
            .unwrap_or(&0))
    }

    async fn has_diff(&self, options: &[String]) -> Result<bool, GitError> {
        self.record(GitCall::HasDiff(options.to_vec()))?;
        Ok(options.iter().any(|o| self.diffs.get(o).copied().unwrap_or(false)))
    }

    async fn rev_parse(&self, reference: &str, _options: &[String]) -> Result<String, GitError> {
        self.record(GitCall::RevParse(reference.to_string()))?;
        Ok(self.head_sha.clone())
    }

    async fn delete_branch(&self, branch: &str, options: &[String]) -> Result<(), GitError> {
        self.record(GitCall::DeleteBranch {
            branch: branch.to_string(),
            options: options.to_vec(),
        })
    }

    async fn config(&self, key: &str, value: &str, _global: bool, _add: bool) -> Result<(), GitError> {
        self.record(GitCall::Config {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn config_exists(&self, key: &str, _global: bool) -> Result<bool, GitError> {
        self.record(GitCall::ConfigExists(key.to_string()))?;
        Ok(false)
    }

    async fn unset_config(&self, key: &str, _global: bool) -> Result<bool, GitError> {
        self.record(GitCall::UnsetConfig(key.to_string()))?;
        Ok(true)
    }

    async fn repo_remote_url(&self) -> Result<String, GitError> {
        self.record(GitCall::RemoteUrl)?;
        Ok(self.remote_url.clone())
    }

    fn set_env(&self, name: &str, value: &str) {
        self.env.lock().unwrap().insert(name.to_string(), value.to_string());
    }

    fn remove_env(&self, name: &str) {
        self.env.lock().unwrap().remove(name);
    }
}
