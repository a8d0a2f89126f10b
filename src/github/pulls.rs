use super::client::PullRequestApi;
use super::errors::{GitHubError, UPDATE_REVIEWER_HINT};
use super::types::{MergeMethod, NewPullRequest, PullRequestMetadata, PullRequestRecord};
use crate::service::ReconciliationResult;
use std::sync::Arc;
use tracing::{error, info};

/// Title and body for the pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestContent {
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// Handler for GitHub pull request operations
#[derive(Clone)]
pub struct PullRequestHandler {
    api: Arc<dyn PullRequestApi>,
    owner: String,
    repo: String,
}

impl PullRequestHandler {
    pub fn new(api: Arc<dyn PullRequestApi>, owner: String, repo: String) -> Self {
        Self { api, owner, repo }
    }

    /// Create or update the pull request, then apply issue metadata.
    pub async fn prepare_pull_request(
        &self,
        content: &PullRequestContent,
        metadata: &PullRequestMetadata,
        result: &ReconciliationResult,
    ) -> Result<PullRequestRecord, GitHubError> {
        let pull = self.create_or_update_pull_request(content, result).await?;
        self.update_issues(metadata, &pull).await?;
        Ok(pull)
    }

    pub async fn create_or_update_pull_request(
        &self,
        content: &PullRequestContent,
        result: &ReconciliationResult,
    ) -> Result<PullRequestRecord, GitHubError> {
        let head = format!("{}:{}", self.owner, result.source_branch);
        let request = NewPullRequest {
            title: content.title.clone(),
            body: content.body.clone(),
            draft: content.draft,
            head: head.clone(),
            head_repo: self.repo.clone(),
            base: result.target_branch.clone(),
        };

        info!("Trying to create the Pull Request");
        match self.api.create_pull(&self.owner, &self.repo, &request).await {
            Ok(pull) => {
                info!(number = pull.number, url = %pull.html_url, "Created pull request");
                return Ok(PullRequestRecord {
                    number: pull.number,
                    sha: pull.head.sha,
                    html_url: pull.html_url,
                    action: Some(result.action),
                    created: true,
                    merged: false,
                });
            }
            Err(e) if e.is_already_exists() => {
                info!("A pull request already exists for {}/{}:{}", self.owner, self.repo, head);
            }
            Err(e) => return Err(e),
        }

        info!("Fetching existing pull request");
        let pulls = self
            .api
            .list_open_pulls(&self.owner, &self.repo, &head, &result.target_branch)
            .await?;
        let existing = pulls.first().ok_or_else(|| GitHubError::PullRequestNotFound {
            head: head.clone(),
            base: result.target_branch.clone(),
        })?;

        info!("Attempting update of pull request");
        let pull = self
            .api
            .update_pull(&self.owner, &self.repo, existing.number, &content.title, &content.body)
            .await?;
        info!(
            "Updated pull request #{} ({} => {})",
            pull.number, head, result.target_branch
        );

        Ok(PullRequestRecord {
            number: pull.number,
            sha: pull.head.sha,
            html_url: pull.html_url,
            action: Some(result.action),
            created: false,
            merged: false,
        })
    }

    pub async fn update_issues(&self, metadata: &PullRequestMetadata, pull: &PullRequestRecord) -> Result<(), GitHubError> {
        if let Some(milestone) = metadata.milestone {
            info!("Applying milestone '{}'", milestone);
            self.api
                .set_milestone(&self.owner, &self.repo, pull.number, milestone)
                .await?;
        }

        if !metadata.labels.is_empty() {
            info!("Applying labels '{}'", metadata.labels.join(","));
            self.api
                .add_labels(&self.owner, &self.repo, pull.number, &metadata.labels)
                .await?;
        }

        if !metadata.assignees.is_empty() {
            info!("Applying assignees '{}'", metadata.assignees.join(","));
            self.api
                .add_assignees(&self.owner, &self.repo, pull.number, &metadata.assignees)
                .await?;
        }

        let teams = strip_org_prefix_from_teams(&metadata.team_reviewers);
        if !metadata.reviewers.is_empty() {
            info!("Requesting reviewers '{}'", metadata.reviewers.join(","));
        }
        if !teams.is_empty() {
            info!("Requesting team reviewers '{}'", teams.join(","));
        }
        if metadata.reviewers.is_empty() && teams.is_empty() {
            return Ok(());
        }

        if let Err(e) = self
            .api
            .request_reviewers(&self.owner, &self.repo, pull.number, &metadata.reviewers, &teams)
            .await
        {
            if e.is_review_token_scope() {
                error!("{}", UPDATE_REVIEWER_HINT);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Merge the pull request and record whether GitHub reports it merged.
    pub async fn merge_pull_request(&self, pull: &PullRequestRecord, method: MergeMethod) -> Result<PullRequestRecord, GitHubError> {
        let merged = self
            .api
            .merge_pull(&self.owner, &self.repo, pull.number, method)
            .await?;

        Ok(PullRequestRecord {
            merged,
            ..pull.clone()
        })
    }
}

/// `org/team` becomes `team`; a leading slash is left alone.
pub fn strip_org_prefix_from_teams(teams: &[String]) -> Vec<String> {
    teams
        .iter()
        .map(|team| match team.rfind('/') {
            Some(index) if index > 0 => team[index + 1..].to_string(),
            _ => team.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::client::MockPullRequestApi;
    use crate::github::types::{PullRequestHead, PullRequestInfo};
    use crate::service::BranchAction;
    use mockall::predicate::*;

    fn result(action: BranchAction) -> ReconciliationResult {
        ReconciliationResult {
            action,
            source_branch: "feature".to_string(),
            target_branch: "main".to_string(),
            has_diff_with_target_branch: true,
            head_sha: "abc123".to_string(),
        }
    }

    fn content() -> PullRequestContent {
        PullRequestContent {
            title: "Sync feature".to_string(),
            body: "Automated".to_string(),
            draft: false,
        }
    }

    fn info(number: u64, sha: &str) -> PullRequestInfo {
        PullRequestInfo {
            number,
            html_url: format!("https://github.com/octo/widgets/pull/{number}"),
            head: PullRequestHead { sha: sha.to_string() },
        }
    }

    fn handler(api: MockPullRequestApi) -> PullRequestHandler {
        PullRequestHandler::new(Arc::new(api), "octo".to_string(), "widgets".to_string())
    }

    fn already_exists() -> GitHubError {
        GitHubError::Api {
            status: 422,
            message: "Validation Failed: {\"message\":\"A pull request already exists for octo:feature.\"}".to_string(),
        }
    }

    #[test]
    fn test_strip_org_prefix_from_teams() {
        let teams = vec![
            "org/team-a".to_string(),
            "org/group/team-b".to_string(),
            "team-c".to_string(),
            "/team-d".to_string(),
        ];
        assert_eq!(
            strip_org_prefix_from_teams(&teams),
            vec!["team-a", "team-b", "team-c", "/team-d"]
        );
    }

    #[tokio::test]
    async fn test_create_pull_request() {
        let mut api = MockPullRequestApi::new();
        api.expect_create_pull()
            .withf(|owner, repo, request| {
                owner == "octo"
                    && repo == "widgets"
                    && request.head == "octo:feature"
                    && request.head_repo == "widgets"
                    && request.base == "main"
            })
            .times(1)
            .returning(|_, _, _| Ok(info(7, "abc123")));

        let pull = handler(api)
            .create_or_update_pull_request(&content(), &result(BranchAction::Created))
            .await
            .unwrap();

        assert_eq!(pull.number, 7);
        assert_eq!(pull.sha, "abc123");
        assert_eq!(pull.action, Some(BranchAction::Created));
        assert!(pull.created);
        assert!(!pull.merged);
    }

    #[tokio::test]
    async fn test_existing_pull_request_is_updated() {
        let mut api = MockPullRequestApi::new();
        api.expect_create_pull().times(1).returning(|_, _, _| Err(already_exists()));
        api.expect_list_open_pulls()
            .with(eq("octo"), eq("widgets"), eq("octo:feature"), eq("main"))
            .times(1)
            .returning(|_, _, _, _| Ok(vec![info(12, "old")]));
        api.expect_update_pull()
            .with(eq("octo"), eq("widgets"), eq(12u64), eq("Sync feature"), eq("Automated"))
            .times(1)
            .returning(|_, _, _, _, _| Ok(info(12, "def456")));

        let pull = handler(api)
            .create_or_update_pull_request(&content(), &result(BranchAction::Updated))
            .await
            .unwrap();

        assert_eq!(pull.number, 12);
        assert_eq!(pull.sha, "def456");
        assert!(!pull.created);
        assert_eq!(pull.operation(), "updated");
    }

    #[tokio::test]
    async fn test_existing_pull_request_missing_from_list() {
        let mut api = MockPullRequestApi::new();
        api.expect_create_pull().returning(|_, _, _| Err(already_exists()));
        api.expect_list_open_pulls().returning(|_, _, _, _| Ok(vec![]));
        api.expect_update_pull().never();

        let err = handler(api)
            .create_or_update_pull_request(&content(), &result(BranchAction::Updated))
            .await
            .unwrap_err();

        assert!(matches!(err, GitHubError::PullRequestNotFound { .. }));
    }

    #[tokio::test]
    async fn test_other_create_errors_propagate() {
        let mut api = MockPullRequestApi::new();
        api.expect_create_pull().returning(|_, _, _| {
            Err(GitHubError::Api {
                status: 403,
                message: "Resource not accessible by integration".to_string(),
            })
        });
        api.expect_list_open_pulls().never();

        let err = handler(api)
            .create_or_update_pull_request(&content(), &result(BranchAction::Created))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_update_issues_applies_all_metadata() {
        let mut api = MockPullRequestApi::new();
        api.expect_set_milestone()
            .with(eq("octo"), eq("widgets"), eq(7u64), eq(3u64))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        api.expect_add_labels()
            .withf(|_, _, number, labels| *number == 7 && labels == ["automated".to_string()])
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        api.expect_add_assignees()
            .withf(|_, _, _, assignees| assignees == ["octocat".to_string()])
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        api.expect_request_reviewers()
            .withf(|_, _, _, reviewers, teams| reviewers == ["hubot".to_string()] && teams == ["core".to_string()])
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let metadata = PullRequestMetadata {
            milestone: Some(3),
            labels: vec!["automated".to_string()],
            assignees: vec!["octocat".to_string()],
            reviewers: vec!["hubot".to_string()],
            team_reviewers: vec!["octo-org/core".to_string()],
        };
        let pull = PullRequestRecord {
            number: 7,
            ..Default::default()
        };

        handler(api).update_issues(&metadata, &pull).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_issues_without_metadata_makes_no_calls() {
        let api = MockPullRequestApi::new();
        let pull = PullRequestRecord {
            number: 7,
            ..Default::default()
        };

        handler(api)
            .update_issues(&PullRequestMetadata::default(), &pull)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_review_token_scope_error_is_rethrown() {
        let mut api = MockPullRequestApi::new();
        api.expect_request_reviewers().returning(|_, _, _, _, _| {
            Err(GitHubError::Api {
                status: 422,
                message: "Validation Failed: Could not resolve to a node with the global id of 'T_1'".to_string(),
            })
        });
        let metadata = PullRequestMetadata {
            team_reviewers: vec!["org/team".to_string()],
            ..Default::default()
        };

        let err = handler(api)
            .update_issues(&metadata, &PullRequestRecord::default())
            .await
            .unwrap_err();

        assert!(err.is_review_token_scope());
    }

    #[tokio::test]
    async fn test_merge_sets_merged_flag() {
        let mut api = MockPullRequestApi::new();
        api.expect_merge_pull()
            .with(eq("octo"), eq("widgets"), eq(7u64), eq(MergeMethod::Squash))
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        let pull = PullRequestRecord {
            number: 7,
            created: true,
            ..Default::default()
        };

        let merged = handler(api).merge_pull_request(&pull, MergeMethod::Squash).await.unwrap();

        assert!(merged.merged);
        assert!(merged.created);
        assert_eq!(merged.number, 7);
    }
}
