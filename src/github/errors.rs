use octocrab::Error as OctocrabError;
use thiserror::Error;

/// Marker GitHub puts in the validation error when the head branch already
/// has an open pull request against the base.
pub const PULL_REQUEST_EXISTS: &str = "A pull request already exists for";

/// Returned when the token cannot resolve the requested team reviewers.
pub const REVIEW_TOKEN_SCOPE_ERROR: &str = "Could not resolve to a node with the global id of";

pub const UPDATE_REVIEWER_HINT: &str =
    "Unable to request team reviewers. The token supplied needs the 'repo' and 'read:org' scopes to request reviews from teams.";

#[derive(Debug, Error)]
pub enum GitHubError {
    /// The API answered with an error status; `message` includes any
    /// validation error details.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("GitHub request failed: {0}")]
    Octocrab(OctocrabError),
    #[error("Invalid GitHub API URL '{url}'")]
    InvalidApiUrl { url: String },
    #[error("No open pull request found for head '{head}' and base '{base}'")]
    PullRequestNotFound { head: String, base: String },
}

impl GitHubError {
    pub fn is_already_exists(&self) -> bool {
        self.to_string().contains(PULL_REQUEST_EXISTS)
    }

    pub fn is_review_token_scope(&self) -> bool {
        self.to_string().contains(REVIEW_TOKEN_SCOPE_ERROR)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<OctocrabError> for GitHubError {
    fn from(err: OctocrabError) -> Self {
        match err {
            OctocrabError::GitHub { source, .. } => {
                let mut message = source.message.clone();
                for detail in source.errors.iter().flatten() {
                    message.push_str(": ");
                    message.push_str(&detail.to_string());
                }
                GitHubError::Api {
                    status: source.status_code.as_u16(),
                    message,
                }
            }
            other => GitHubError::Octocrab(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_detection() {
        let err = GitHubError::Api {
            status: 422,
            message: "Validation Failed: {\"resource\":\"PullRequest\",\"code\":\"custom\",\"message\":\"A pull request already exists for octo:feature.\"}".to_string(),
        };
        assert!(err.is_already_exists());
        assert!(!err.is_review_token_scope());
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn test_not_found_is_not_already_exists() {
        let err = GitHubError::PullRequestNotFound {
            head: "octo:feature".to_string(),
            base: "main".to_string(),
        };
        assert!(!err.is_already_exists());
        assert_eq!(err.status(), None);
    }
}
