pub mod client;
pub mod errors;
pub mod pulls;
pub mod types;

pub use client::{GitHubClient, PullRequestApi};
pub use errors::GitHubError;
pub use pulls::{strip_org_prefix_from_teams, PullRequestContent, PullRequestHandler};
pub use types::{
    MergeMethod, NewPullRequest, PullRequestHead, PullRequestInfo, PullRequestMetadata, PullRequestRecord,
};
