//! Orchestration of a single action run.
//!
//! Every public operation is wrapped in credential setup and teardown;
//! teardown runs on every exit path and never masks the original error.

pub mod branch;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod mocks;

pub use branch::{middle_branch_name, BranchReconciler};
pub use types::{BranchAction, ReconciliationResult, ServiceError};

use crate::config::{ConfigError, Inputs, RunContext};
use crate::external::{
    parse_remote_detail, AuthHelper, AuthSettings, GitAuthHelper, GitClient, GitCommands, ProcessCommandExecutor,
};
use crate::github::{GitHubClient, PullRequestApi, PullRequestHandler, PullRequestRecord};
use crate::ids::{IdGenerator, UuidGenerator};
use crate::retry::{RandomSource, RetryConfig, RetryHelper, ThreadRandom};
use crate::workflow;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators the service drives.
pub struct ServiceDeps {
    pub git: Arc<dyn GitCommands>,
    pub auth: Arc<dyn AuthHelper>,
    pub api: Arc<dyn PullRequestApi>,
    pub ids: Arc<dyn IdGenerator>,
    pub random: Arc<dyn RandomSource>,
}

impl ServiceDeps {
    /// Real git, octocrab and credential helpers for the checked out workspace.
    pub fn production(inputs: &Inputs, context: &RunContext) -> Result<Self, ServiceError> {
        let repo_path = context.workspace.clone();
        let executor = Arc::new(ProcessCommandExecutor::new(&repo_path));
        let git: Arc<dyn GitCommands> = Arc::new(GitClient::new(executor, &repo_path, context.github_ref.clone()));
        let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);

        let auth = GitAuthHelper::new(
            git.clone(),
            ids.clone(),
            AuthSettings {
                repository_path: repo_path,
                server_url: context.server_url.clone(),
                token: inputs.github_token.clone(),
                ssh_key: inputs.ssh_key.clone(),
                ssh_known_hosts: inputs.ssh_known_hosts.clone(),
                ssh_strict: inputs.ssh_strict,
                persist_credentials: inputs.persist_credentials,
                runner_temp: context.runner_temp.clone(),
                home_dir: context.home_dir.clone(),
            },
        )?;
        let api = GitHubClient::new(&inputs.github_token, &context.api_url)?;

        Ok(Self {
            git,
            auth: Arc::new(auth),
            api: Arc::new(api),
            ids,
            random: Arc::new(ThreadRandom),
        })
    }
}

pub struct Service {
    inputs: Inputs,
    server_url: String,
    git: Arc<dyn GitCommands>,
    auth: Arc<dyn AuthHelper>,
    pulls: PullRequestHandler,
    reconciler: BranchReconciler,
    random: Arc<dyn RandomSource>,
}

impl Service {
    pub fn new(inputs: Inputs, context: &RunContext, deps: ServiceDeps) -> Result<Self, ServiceError> {
        if inputs.source_branch == inputs.target_branch {
            return Err(ConfigError::SameBranch.into());
        }

        let pulls = PullRequestHandler::new(deps.api, inputs.repo_owner.clone(), inputs.repo_name.clone());
        let reconciler = BranchReconciler::new(deps.git.clone(), deps.ids);

        Ok(Self {
            inputs,
            server_url: context.server_url.clone(),
            git: deps.git,
            auth: deps.auth,
            pulls,
            reconciler,
            random: deps.random,
        })
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Reconcile the branch, push it and open or update the pull request.
    ///
    /// Returns the zero-valued record when there is nothing to publish.
    pub async fn create_pull_request(&self) -> Result<PullRequestRecord, ServiceError> {
        self.with_auth(|| self.publish_pull_request()).await
    }

    /// One direct merge, then up to `max_merge_retries - 1` more at a fixed
    /// interval.
    pub async fn merge_pull_request_with_retries(&self, pull: &PullRequestRecord) -> Result<PullRequestRecord, ServiceError> {
        self.with_auth(|| self.merge_with_retries(pull)).await
    }

    async fn publish_pull_request(&self) -> Result<PullRequestRecord, ServiceError> {
        let result = {
            let _group = workflow::group("Create or update the pull request branch");
            self.reconciler
                .reconcile(
                    &self.inputs.source_branch,
                    &self.inputs.target_branch,
                    &self.inputs.remote_name,
                    self.inputs.require_middle_branch,
                )
                .await?
        };

        if !result.is_publishable() {
            info!(
                action = %result.action,
                has_diff = result.has_diff_with_target_branch,
                "Nothing to publish"
            );
            return Ok(PullRequestRecord::default());
        }

        self.push_pull_request_branch(&result).await?;

        let _group = workflow::group("Create or update the pull request");
        let pull = self
            .pulls
            .prepare_pull_request(&self.inputs.content(), &self.inputs.metadata(), &result)
            .await?;
        Ok(pull)
    }

    async fn merge_with_retries(&self, pull: &PullRequestRecord) -> Result<PullRequestRecord, ServiceError> {
        let error = match self.merge_pull_request(pull).await {
            Ok(merged) => return Ok(merged),
            Err(e) => e,
        };

        let remaining = self.inputs.max_merge_retries.saturating_sub(1);
        if remaining == 0 {
            return Err(error);
        }
        warn!(error = %error, remaining, "Merge failed, retrying");

        let helper = RetryHelper::with_random(
            RetryConfig::fixed(remaining, self.inputs.merge_retry_interval),
            self.random.clone(),
        )?;
        helper.execute(|| self.merge_pull_request(pull)).await
    }

    async fn merge_pull_request(&self, pull: &PullRequestRecord) -> Result<PullRequestRecord, ServiceError> {
        let _group = workflow::group(&format!("Merging pull request #{}", pull.number));
        Ok(self.pulls.merge_pull_request(pull, self.inputs.merge_method).await?)
    }

    async fn push_pull_request_branch(&self, result: &ReconciliationResult) -> Result<(), ServiceError> {
        if !result.action.needs_push() {
            return Ok(());
        }

        let remote = &self.inputs.remote_name;
        let branch = &result.source_branch;
        let _group = workflow::group(&format!("Pushing pull request branch to '{remote}/{branch}'"));
        self.git
            .push(&[
                "--force-with-lease".to_string(),
                remote.clone(),
                format!("{branch}:refs/heads/{branch}"),
            ])
            .await?;
        Ok(())
    }

    async fn prepare_git_authentication(&self) -> Result<(), ServiceError> {
        let remote_url = self.git.repo_remote_url().await?;
        let remote = parse_remote_detail(&remote_url, &self.server_url)?;
        info!("Pull request branch target repository set to {}", remote.repository);

        info!("Configuring credential for {} authentication", remote.protocol);
        self.auth.configure_auth(remote.protocol).await?;
        Ok(())
    }

    async fn with_auth<T, F, Fut>(&self, body: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let outcome = match self.prepare_git_authentication().await {
            Ok(()) => body().await,
            Err(e) => Err(e),
        };

        match (outcome, self.auth.remove_auth().await) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(teardown)) => Err(teardown.into()),
            (Err(e), Err(teardown)) => {
                warn!(error = %teardown, "Failed to remove git credentials");
                Err(e)
            }
        }
    }
}
