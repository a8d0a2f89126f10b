use crate::config::ConfigError;
use crate::external::{AuthError, GitError};
use crate::github::GitHubError;
use crate::retry::RetryError;
use std::fmt;
use thiserror::Error;

/// What reconciliation did to the pull request branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchAction {
    /// Nothing to publish.
    #[default]
    None,
    Created,
    Updated,
    /// The branch already matches its remote copy.
    NotUpdated,
}

impl BranchAction {
    /// Whether the branch needs to be pushed.
    pub fn needs_push(self) -> bool {
        matches!(self, BranchAction::Created | BranchAction::Updated)
    }
}

impl fmt::Display for BranchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            BranchAction::None => "none",
            BranchAction::Created => "created",
            BranchAction::Updated => "updated",
            BranchAction::NotUpdated => "not-updated",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub action: BranchAction,
    /// Effective pull request branch, including any middle-branch suffix.
    pub source_branch: String,
    pub target_branch: String,
    pub has_diff_with_target_branch: bool,
    pub head_sha: String,
}

impl ReconciliationResult {
    pub fn is_publishable(&self) -> bool {
        self.action.needs_push() && self.has_diff_with_target_branch
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
    #[error(transparent)]
    Retry(#[from] RetryError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("The target_branch input must be supplied.")]
    TargetBranchRequired,
    #[error("When in the detached HEAD state, the target_branch input must be supplied.")]
    TargetBranchRequiredWhenDetached,
}
