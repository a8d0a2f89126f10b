// create-pull-request library
// Reconciles a pull request branch with git and publishes it through the GitHub API

pub mod config;
pub mod external;
pub mod github;
pub mod ids;
pub mod retry;
pub mod service;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{ConfigError, Inputs, RawInputs, RunContext};
pub use external::{GitClient, GitCommands, GitError, ProcessCommandExecutor};
pub use github::{GitHubClient, GitHubError, MergeMethod, PullRequestHandler, PullRequestRecord};
pub use retry::{RetryConfig, RetryError, RetryHelper};
pub use service::{BranchAction, BranchReconciler, ReconciliationResult, Service, ServiceDeps, ServiceError};
pub use telemetry::{init_telemetry, LogFormat};
