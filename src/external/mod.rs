//! External tool abstractions
//!
//! Trait-based wrappers around the git CLI and the credential setup it needs,
//! so the reconciliation logic can run against fakes in tests.

pub mod auth;
pub mod command;
pub mod git;

pub use auth::{AuthError, AuthHelper, AuthSettings, GitAuthHelper};
pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use git::{
    parse_remote_detail, GitClient, GitCommands, GitError, RemoteDetail, RemoteProtocol, WorkingBase,
    WorkingBaseType,
};
