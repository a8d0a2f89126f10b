use super::errors::GitHubError;
use super::types::{MergeMethod, NewPullRequest, PullRequestInfo};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::json;
use tracing::debug;

/// Pull request endpoints of the GitHub REST API used by the action.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    async fn create_pull(&self, owner: &str, repo: &str, request: &NewPullRequest) -> Result<PullRequestInfo, GitHubError>;

    async fn list_open_pulls(&self, owner: &str, repo: &str, head: &str, base: &str) -> Result<Vec<PullRequestInfo>, GitHubError>;

    async fn update_pull(&self, owner: &str, repo: &str, number: u64, title: &str, body: &str) -> Result<PullRequestInfo, GitHubError>;

    async fn set_milestone(&self, owner: &str, repo: &str, number: u64, milestone: u64) -> Result<(), GitHubError>;

    async fn add_labels(&self, owner: &str, repo: &str, number: u64, labels: &[String]) -> Result<(), GitHubError>;

    async fn add_assignees(&self, owner: &str, repo: &str, number: u64, assignees: &[String]) -> Result<(), GitHubError>;

    async fn request_reviewers(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        reviewers: &[String],
        team_reviewers: &[String],
    ) -> Result<(), GitHubError>;

    /// Returns whether GitHub reports the pull request as merged.
    async fn merge_pull(&self, owner: &str, repo: &str, number: u64, method: MergeMethod) -> Result<bool, GitHubError>;
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    pub fn new(token: &str, api_url: &str) -> Result<Self, GitHubError> {
        let octocrab = Octocrab::builder()
            .base_uri(api_url)
            .map_err(|_| GitHubError::InvalidApiUrl {
                url: api_url.to_string(),
            })?
            .personal_token(token.to_string())
            .build()?;

        Ok(Self { octocrab })
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn create_pull(&self, owner: &str, repo: &str, request: &NewPullRequest) -> Result<PullRequestInfo, GitHubError> {
        let route = format!("/repos/{owner}/{repo}/pulls");
        let payload = json!({
            "title": request.title,
            "body": request.body,
            "draft": request.draft,
            "head": request.head,
            "head_repo": request.head_repo,
            "base": request.base,
        });
        debug!(route = %route, head = %request.head, base = %request.base, "Creating pull request");

        Ok(self.octocrab.post(route, Some(&payload)).await?)
    }

    async fn list_open_pulls(&self, owner: &str, repo: &str, head: &str, base: &str) -> Result<Vec<PullRequestInfo>, GitHubError> {
        let route = format!("/repos/{owner}/{repo}/pulls");
        let params = [("state", "open"), ("head", head), ("base", base)];

        Ok(self.octocrab.get(route, Some(&params)).await?)
    }

    async fn update_pull(&self, owner: &str, repo: &str, number: u64, title: &str, body: &str) -> Result<PullRequestInfo, GitHubError> {
        let route = format!("/repos/{owner}/{repo}/pulls/{number}");
        let payload = json!({ "title": title, "body": body });

        Ok(self.octocrab.patch(route, Some(&payload)).await?)
    }

    async fn set_milestone(&self, owner: &str, repo: &str, number: u64, milestone: u64) -> Result<(), GitHubError> {
        let route = format!("/repos/{owner}/{repo}/issues/{number}");
        let _: serde_json::Value = self
            .octocrab
            .patch(route, Some(&json!({ "milestone": milestone })))
            .await?;
        Ok(())
    }

    async fn add_labels(&self, owner: &str, repo: &str, number: u64, labels: &[String]) -> Result<(), GitHubError> {
        let route = format!("/repos/{owner}/{repo}/issues/{number}/labels");
        let _: serde_json::Value = self.octocrab.post(route, Some(&json!({ "labels": labels }))).await?;
        Ok(())
    }

    async fn add_assignees(&self, owner: &str, repo: &str, number: u64, assignees: &[String]) -> Result<(), GitHubError> {
        let route = format!("/repos/{owner}/{repo}/issues/{number}/assignees");
        let _: serde_json::Value = self
            .octocrab
            .post(route, Some(&json!({ "assignees": assignees })))
            .await?;
        Ok(())
    }

    async fn request_reviewers(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        reviewers: &[String],
        team_reviewers: &[String],
    ) -> Result<(), GitHubError> {
        let route = format!("/repos/{owner}/{repo}/pulls/{number}/requested_reviewers");
        let payload = json!({ "reviewers": reviewers, "team_reviewers": team_reviewers });
        let _: serde_json::Value = self.octocrab.post(route, Some(&payload)).await?;
        Ok(())
    }

    async fn merge_pull(&self, owner: &str, repo: &str, number: u64, method: MergeMethod) -> Result<bool, GitHubError> {
        let merge_result = self
            .octocrab
            .pulls(owner, repo)
            .merge(number)
            .method(method.to_octocrab())
            .send()
            .await?;

        Ok(merge_result.merged)
    }
}
