use crate::service::BranchAction;
use serde::Deserialize;
use std::fmt;

/// Outcome of the publish and merge steps, reported as step outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub sha: String,
    pub html_url: String,
    pub action: Option<BranchAction>,
    pub created: bool,
    pub merged: bool,
}

impl PullRequestRecord {
    /// Value of the `pull-request-operation` output.
    pub fn operation(&self) -> String {
        self.action.map(|a| a.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    /// Unknown values fall back to a merge commit.
    pub fn from_input(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "squash" => MergeMethod::Squash,
            "rebase" => MergeMethod::Rebase,
            _ => MergeMethod::Merge,
        }
    }

    pub fn to_octocrab(self) -> octocrab::params::pulls::MergeMethod {
        match self {
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        };
        f.write_str(value)
    }
}

/// Fields of a pull request the action reads back from the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub draft: bool,
    /// `owner:branch`
    pub head: String,
    pub head_repo: String,
    pub base: String,
}

/// Issue metadata applied after the pull request exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestMetadata {
    pub milestone: Option<u64>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub reviewers: Vec<String>,
    pub team_reviewers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_method_from_input() {
        assert_eq!(MergeMethod::from_input("squash"), MergeMethod::Squash);
        assert_eq!(MergeMethod::from_input(" Rebase "), MergeMethod::Rebase);
        assert_eq!(MergeMethod::from_input("merge"), MergeMethod::Merge);
        assert_eq!(MergeMethod::from_input("fast-forward"), MergeMethod::Merge);
        assert_eq!(MergeMethod::Rebase.to_string(), "rebase");
    }

    #[test]
    fn test_default_record_is_zero_valued() {
        let record = PullRequestRecord::default();
        assert_eq!(record.number, 0);
        assert!(record.sha.is_empty());
        assert!(record.html_url.is_empty());
        assert_eq!(record.operation(), "");
        assert!(!record.created && !record.merged);
    }
}
