//! Pull request branch reconciliation.
//!
//! The candidate content is captured on a throwaway branch at `HEAD` first.
//! An existing pull request branch is only reset to it when stale, so commits
//! pushed to that branch by hand survive as long as they match the candidate.
//! The working tree is returned to where it started before returning.

use super::types::{BranchAction, ReconciliationResult, ServiceError};
use crate::external::git::{GitCommands, WorkingBaseType};
use crate::ids::IdGenerator;
use std::sync::Arc;
use tracing::info;

pub struct BranchReconciler {
    git: Arc<dyn GitCommands>,
    ids: Arc<dyn IdGenerator>,
}

fn separator() -> Vec<String> {
    vec!["--".to_string()]
}

/// Name of the intermediate branch used when a middle branch is required.
pub fn middle_branch_name(source: &str, target: &str) -> String {
    format!("{source}-merge-to-{target}")
}

impl BranchReconciler {
    pub fn new(git: Arc<dyn GitCommands>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { git, ids }
    }

    pub async fn reconcile(
        &self,
        source_branch: &str,
        target_branch: &str,
        remote_name: &str,
        require_middle_branch: bool,
    ) -> Result<ReconciliationResult, ServiceError> {
        let git = &self.git;

        let working_base = git.working_base_and_type().await?;
        info!(
            "Working base is {} '{}'",
            working_base.working_base_type, working_base.working_base
        );
        if target_branch.is_empty() {
            return Err(match working_base.working_base_type {
                WorkingBaseType::Commit => ServiceError::TargetBranchRequiredWhenDetached,
                _ => ServiceError::TargetBranchRequired,
            });
        }

        let stashed = git.stash_push(&["--include-untracked".to_string()]).await?;

        if working_base.working_base != source_branch {
            git.fetch_all().await?;
            git.checkout(source_branch).await?;
            git.pull(&[]).await?;
        }

        let temp_branch = self.ids.next_id();
        git.checkout_new(&temp_branch, "HEAD").await?;

        let branch = if require_middle_branch {
            middle_branch_name(source_branch, target_branch)
        } else {
            source_branch.to_string()
        };
        let remote_target = format!("{remote_name}/{target_branch}");

        let mut result = ReconciliationResult {
            action: BranchAction::None,
            source_branch: branch.clone(),
            target_branch: target_branch.to_string(),
            has_diff_with_target_branch: false,
            head_sha: String::new(),
        };

        if !git.fetch(remote_name, &branch).await? {
            info!("Pull request branch '{}' does not exist yet.", branch);
            git.checkout_new(&branch, &temp_branch).await?;
            result.has_diff_with_target_branch = git.is_ahead(&remote_target, &branch, &separator()).await?;
            if result.has_diff_with_target_branch {
                result.action = BranchAction::Created;
                info!("Created branch '{}'", branch);
            } else {
                info!(
                    "Branch '{}' is not ahead of base '{}' and will not be created",
                    branch, target_branch
                );
            }
        } else {
            info!(
                "Pull request branch '{}' already exists as remote branch '{}/{}'",
                branch, remote_name, branch
            );
            git.checkout(&branch).await?;

            let temp_ahead = git.commits_ahead(&remote_target, &temp_branch, &separator()).await?;
            let branch_ahead = git.commits_ahead(&remote_target, &branch, &separator()).await?;
            let stale = git.has_diff(&[format!("{branch}..{temp_branch}")]).await?
                || branch_ahead != temp_ahead
                || temp_ahead == 0;
            if stale {
                info!("Resetting '{}'", branch);
                git.checkout_new(&branch, &temp_branch).await?;
            }

            let remote_branch = format!("{remote_name}/{branch}");
            if git.is_even(&remote_branch, &branch, &separator()).await? {
                result.action = BranchAction::NotUpdated;
                info!("Branch '{}' is even with its remote and will not be updated", branch);
            } else {
                result.action = BranchAction::Updated;
                info!("Updated branch '{}'", branch);
            }
            result.has_diff_with_target_branch = git.is_ahead(&remote_target, &branch, &separator()).await?;
        }

        result.head_sha = git.rev_parse("HEAD", &[]).await?;
        git.delete_branch(&temp_branch, &["--force".to_string()]).await?;
        git.checkout(&working_base.working_base).await?;

        if stashed {
            git.stash_pop(&[]).await?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MockIdGenerator;
    use crate::service::mocks::{GitCall, MockGit};

    const TEMP: &str = "temp-branch";

    fn reconciler(git: MockGit) -> (BranchReconciler, Arc<MockGit>) {
        let git = Arc::new(git);
        let mut ids = MockIdGenerator::new();
        ids.expect_next_id().returning(|| TEMP.to_string());
        (BranchReconciler::new(git.clone(), Arc::new(ids)), git)
    }

    fn checkout(reference: &str) -> GitCall {
        GitCall::Checkout(reference.to_string())
    }

    fn checkout_new(branch: &str, start_point: &str) -> GitCall {
        GitCall::CheckoutNew {
            branch: branch.to_string(),
            start_point: start_point.to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_branch_ahead_of_target_is_created() {
        let (reconciler, git) = reconciler(
            MockGit::new()
                .with_ahead("origin/main", "feature", 2)
                .with_head_sha("cafef00d"),
        );

        let result = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert_eq!(
            result,
            ReconciliationResult {
                action: BranchAction::Created,
                source_branch: "feature".to_string(),
                target_branch: "main".to_string(),
                has_diff_with_target_branch: true,
                head_sha: "cafef00d".to_string(),
            }
        );
        assert_eq!(
            git.calls(),
            vec![
                GitCall::WorkingBase,
                GitCall::StashPush(vec!["--include-untracked".to_string()]),
                checkout_new(TEMP, "HEAD"),
                GitCall::Fetch {
                    remote: "origin".to_string(),
                    branch: "feature".to_string()
                },
                checkout_new("feature", TEMP),
                GitCall::CommitsAhead {
                    from: "origin/main".to_string(),
                    to: "feature".to_string()
                },
                GitCall::RevParse("HEAD".to_string()),
                GitCall::DeleteBranch {
                    branch: TEMP.to_string(),
                    options: vec!["--force".to_string()]
                },
                checkout("feature"),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_branch_not_ahead_is_not_created() {
        let (reconciler, git) = reconciler(MockGit::new());

        let result = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert_eq!(result.action, BranchAction::None);
        assert!(!result.has_diff_with_target_branch);
        assert_eq!(git.count("push"), 0);
        assert_eq!(git.count("delete_branch"), 1);
        assert_eq!(git.calls().last(), Some(&checkout("feature")));
    }

    #[tokio::test]
    async fn test_switches_to_source_when_started_elsewhere() {
        let (reconciler, git) = reconciler(
            MockGit::new()
                .with_working_base("main", WorkingBaseType::Branch)
                .with_stashed_changes(),
        );

        reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        let calls = git.calls();
        assert_eq!(&calls[2..5], &[GitCall::FetchAll, checkout("feature"), GitCall::Pull]);
        assert_eq!(&calls[calls.len() - 2..], &[checkout("main"), GitCall::StashPop]);
    }

    #[tokio::test]
    async fn test_middle_branch_name() {
        let (reconciler, git) = reconciler(MockGit::new().with_ahead("origin/main", "feature-merge-to-main", 1));

        let result = reconciler.reconcile("feature", "main", "origin", true).await.unwrap();

        assert_eq!(result.source_branch, "feature-merge-to-main");
        assert_eq!(result.action, BranchAction::Created);
        assert!(git.calls().contains(&checkout_new("feature-merge-to-main", TEMP)));
    }

    #[tokio::test]
    async fn test_existing_branch_even_with_remote_is_not_updated() {
        let (reconciler, git) = reconciler(
            MockGit::new()
                .with_remote_branch("feature")
                .with_ahead("origin/main", TEMP, 2)
                .with_ahead("origin/main", "feature", 2),
        );

        let result = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert_eq!(result.action, BranchAction::NotUpdated);
        assert!(result.has_diff_with_target_branch);
        assert!(!git.calls().contains(&checkout_new("feature", TEMP)));
    }

    #[tokio::test]
    async fn test_existing_branch_with_diff_is_reset_and_updated() {
        let (reconciler, git) = reconciler(
            MockGit::new()
                .with_remote_branch("feature")
                .with_diff(&format!("feature..{TEMP}"))
                .with_ahead("origin/main", TEMP, 2)
                .with_ahead("origin/main", "feature", 2)
                .with_ahead("origin/feature", "feature", 1),
        );

        let result = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert_eq!(result.action, BranchAction::Updated);
        assert!(git.calls().contains(&checkout_new("feature", TEMP)));
    }

    #[tokio::test]
    async fn test_existing_branch_with_different_ahead_count_is_reset() {
        let (reconciler, git) = reconciler(
            MockGit::new()
                .with_remote_branch("feature")
                .with_ahead("origin/main", TEMP, 3)
                .with_ahead("origin/main", "feature", 2)
                .with_behind("origin/feature", "feature", 1),
        );

        let result = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert_eq!(result.action, BranchAction::Updated);
        assert!(git.calls().contains(&checkout_new("feature", TEMP)));
    }

    #[tokio::test]
    async fn test_existing_branch_with_nothing_ahead_is_reset() {
        let (reconciler, git) = reconciler(MockGit::new().with_remote_branch("feature"));

        let result = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert!(git.calls().contains(&checkout_new("feature", TEMP)));
        assert_eq!(result.action, BranchAction::NotUpdated);
        assert!(!result.has_diff_with_target_branch);
    }

    #[tokio::test]
    async fn test_detached_head_without_target_fails_before_mutation() {
        let (reconciler, git) = reconciler(MockGit::new().with_working_base("0123abc", WorkingBaseType::Commit));

        let err = reconciler.reconcile("feature", "", "origin", false).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "When in the detached HEAD state, the target_branch input must be supplied."
        );
        assert_eq!(git.calls(), vec![GitCall::WorkingBase]);
    }

    #[tokio::test]
    async fn test_branch_without_target_fails() {
        let (reconciler, _) = reconciler(MockGit::new());

        let err = reconciler.reconcile("feature", "", "origin", false).await.unwrap_err();

        assert!(matches!(err, ServiceError::TargetBranchRequired));
        assert_eq!(err.to_string(), "The target_branch input must be supplied.");
    }

    #[tokio::test]
    async fn test_git_failure_propagates() {
        let (reconciler, git) = reconciler(MockGit::new().failing_on("fetch"));

        let err = reconciler.reconcile("feature", "main", "origin", false).await.unwrap_err();

        assert!(matches!(err, ServiceError::Git(_)));
        assert_eq!(git.count("delete_branch"), 0);
    }

    #[tokio::test]
    async fn test_repeated_runs_report_the_same_action() {
        let git = MockGit::new()
            .with_remote_branch("feature")
            .with_ahead("origin/main", TEMP, 1)
            .with_ahead("origin/main", "feature", 1);
        let (reconciler, _) = reconciler(git);

        let first = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();
        let second = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

        assert_eq!(first.action, BranchAction::NotUpdated);
        assert_eq!(first, second);
    }
}
