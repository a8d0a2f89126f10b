//! Git credential setup and teardown
//!
//! Token auth is written as an `http.<origin>/.extraheader` entry in the
//! repository's local config. The credential is first written as a
//! placeholder through git and then swapped in by editing `.git/config`, so it
//! never appears on a command line. SSH auth stages a private key and a
//! known-hosts file under the runner temp directory.

use super::git::{GitCommands, GitError, RemoteProtocol};
use crate::ids::IdGenerator;
use crate::workflow;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

const SSH_COMMAND_KEY: &str = "core.sshCommand";
const TOKEN_PLACEHOLDER: &str = "AUTHORIZATION: basic ***";
const GITHUB_KNOWN_HOST: &str = "github.com ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABgQCj7ndNxQowgcQnjshcLrqPEiiphnt+VTTvDP6mHBL9j1aNUkY4Ue1gvwnGLVlOhGeYrnZaMgRK6+PKCUXaDbC7qtbW8gIkhL7aGCsOr/C56SJMy/BCZfxd1nWzAOxSDPgVsmerOBYfNqltV9/hWCqBywINIR+5dIg6JTJ72pcEpEjcYgXkE2YEFXV1JHnsKgbLWNlhScqb2UmyRkQyytRLtL+38TGxkxCflmO+5Z8CSSNY7GidjMIZ7Q4zMjA2n1nGrlTDkzwDCsw+wqFPGQA179cnfGWOWRVruj16z6XyvxvjJwbz0wQZ75XK5tKSb7FNyeIEs4TT4jk+S4dhPeAUC5y+bDYirYgM4GC7uEnztnZyaVWQ7B381AK4Qdrwt51ZqExKbQpTUNn+EjqoTwvqNj4kqx5QUCI0ThS/YkOxJCXmPUWZbhjpCg56i+2aB6CmK2JGhn57K5mj0MNdBXA4/WnwH6XoPWJzK5Nyu2zB3nAZp+S5hpQs+p1vN1/wsjk=";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("Failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to replace auth placeholder in {}", path.display())]
    PlaceholderNotReplaced { path: PathBuf },
    #[error("RUNNER_TEMP is not defined")]
    RunnerTempNotDefined,
    #[error("Invalid server URL '{url}'")]
    InvalidServerUrl { url: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AuthError + '_ {
    move |source| AuthError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Paired credential setup and teardown around remote git operations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthHelper: Send + Sync {
    /// Clears stale credentials, then installs the ones `protocol` uses.
    async fn configure_auth(&self, protocol: RemoteProtocol) -> Result<(), AuthError>;
    /// Safe to call when nothing was configured.
    async fn remove_auth(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub repository_path: PathBuf,
    pub server_url: String,
    pub token: String,
    pub ssh_key: Option<String>,
    pub ssh_known_hosts: Option<String>,
    pub ssh_strict: bool,
    pub persist_credentials: bool,
    pub runner_temp: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct SshState {
    key_path: Option<PathBuf>,
    known_hosts_path: Option<PathBuf>,
}

pub struct GitAuthHelper {
    git: Arc<dyn GitCommands>,
    ids: Arc<dyn IdGenerator>,
    settings: AuthSettings,
    token_config_key: String,
    token_config_value: String,
    ssh: Mutex<SshState>,
}

impl GitAuthHelper {
    pub fn new(git: Arc<dyn GitCommands>, ids: Arc<dyn IdGenerator>, settings: AuthSettings) -> Result<Self, AuthError> {
        let origin = server_origin(&settings.server_url)?;
        let credential = STANDARD.encode(format!("x-access-token:{}", settings.token));
        workflow::add_mask(&credential);

        Ok(Self {
            git,
            ids,
            token_config_key: format!("http.{origin}/.extraheader"),
            token_config_value: format!("AUTHORIZATION: basic {credential}"),
            settings,
            ssh: Mutex::new(SshState::default()),
        })
    }

    pub fn token_config_key(&self) -> &str {
        &self.token_config_key
    }

    pub fn token_config_value(&self) -> &str {
        &self.token_config_value
    }

    fn config_path(&self) -> PathBuf {
        self.settings.repository_path.join(".git").join("config")
    }

    async fn configure_token(&self) -> Result<(), AuthError> {
        self.git
            .config(&self.token_config_key, TOKEN_PLACEHOLDER, false, false)
            .await?;
        self.replace_token_placeholder(&self.config_path()).await
    }

    async fn replace_token_placeholder(&self, config_path: &Path) -> Result<(), AuthError> {
        let content = tokio::fs::read_to_string(config_path)
            .await
            .map_err(io_error(config_path))?;

        if content.matches(TOKEN_PLACEHOLDER).count() != 1 {
            return Err(AuthError::PlaceholderNotReplaced {
                path: config_path.to_path_buf(),
            });
        }

        let content = content.replacen(TOKEN_PLACEHOLDER, &self.token_config_value, 1);
        tokio::fs::write(config_path, content)
            .await
            .map_err(io_error(config_path))
    }

    async fn configure_ssh(&self) -> Result<(), AuthError> {
        let Some(ssh_key) = self.settings.ssh_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(());
        };
        let runner_temp = self
            .settings
            .runner_temp
            .as_ref()
            .ok_or(AuthError::RunnerTempNotDefined)?;

        tokio::fs::create_dir_all(runner_temp)
            .await
            .map_err(io_error(runner_temp))?;

        let unique_id = self.ids.next_id();
        let key_path = runner_temp.join(&unique_id);
        self.lock_ssh().key_path = Some(key_path.clone());
        write_private_key(&key_path, &format!("{}\n", ssh_key.trim())).await?;

        let known_hosts_path = runner_temp.join(format!("{unique_id}_known_hosts"));
        self.lock_ssh().known_hosts_path = Some(known_hosts_path.clone());
        let known_hosts = self.known_hosts().await?;
        tokio::fs::write(&known_hosts_path, known_hosts)
            .await
            .map_err(io_error(&known_hosts_path))?;

        let mut ssh_command = format!("ssh -i \"{}\"", key_path.display());
        if self.settings.ssh_strict {
            ssh_command.push_str(" -o StrictHostKeyChecking=yes -o CheckHostIP=no");
        }
        ssh_command.push_str(&format!(" -o \"UserKnownHostsFile={}\"", known_hosts_path.display()));

        info!("Temporarily overriding GIT_SSH_COMMAND={}", ssh_command);
        self.git.set_env("GIT_SSH_COMMAND", &ssh_command);

        if self.settings.persist_credentials {
            self.git.config(SSH_COMMAND_KEY, &ssh_command, false, false).await?;
        }
        Ok(())
    }

    async fn known_hosts(&self) -> Result<String, AuthError> {
        let mut known_hosts = String::new();

        if let Some(home) = &self.settings.home_dir {
            let user_path = home.join(".ssh").join("known_hosts");
            match tokio::fs::read_to_string(&user_path).await {
                Ok(user_hosts) if !user_hosts.is_empty() => {
                    let shown = user_path.display();
                    known_hosts.push_str(&format!("# Begin from {shown}\n{user_hosts}\n# End from {shown}\n"));
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&user_path)(e)),
            }
        }

        if let Some(input_hosts) = self.settings.ssh_known_hosts.as_deref().filter(|h| !h.is_empty()) {
            known_hosts.push_str(&format!(
                "# Begin from input known hosts\n{input_hosts}\n# end from input known hosts\n"
            ));
        }

        known_hosts.push_str(&format!(
            "# Begin implicitly added github.com\n{GITHUB_KNOWN_HOST}\n# End implicitly added github.com\n"
        ));
        Ok(known_hosts)
    }

    async fn remove_ssh(&self) -> Result<(), AuthError> {
        let (key_path, known_hosts_path) = {
            let mut state = self.lock_ssh();
            (state.key_path.take(), state.known_hosts_path.take())
        };

        if let Some(key_path) = key_path {
            if let Err(e) = remove_file_if_exists(&key_path).await {
                debug!(error = %e, "Key removal failed");
                workflow::warning(&format!("Failed to remove SSH key '{}'", key_path.display()));
            }
        }
        if let Some(known_hosts_path) = known_hosts_path {
            let _ = remove_file_if_exists(&known_hosts_path).await;
        }

        self.git.remove_env("GIT_SSH_COMMAND");
        self.remove_git_config(SSH_COMMAND_KEY).await
    }

    async fn remove_git_config(&self, key: &str) -> Result<(), AuthError> {
        if self.git.config_exists(key, false).await? && !self.git.unset_config(key, false).await? {
            warn!(key, "Failed to remove key from the git config");
            workflow::warning(&format!("Failed to remove '{key}' from the git config"));
        }
        Ok(())
    }

    fn lock_ssh(&self) -> std::sync::MutexGuard<'_, SshState> {
        self.ssh.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AuthHelper for GitAuthHelper {
    async fn configure_auth(&self, protocol: RemoteProtocol) -> Result<(), AuthError> {
        self.remove_auth().await?;
        match protocol {
            RemoteProtocol::Https => self.configure_token().await,
            RemoteProtocol::Ssh => self.configure_ssh().await,
        }
    }

    async fn remove_auth(&self) -> Result<(), AuthError> {
        self.remove_ssh().await?;
        let key = self.token_config_key.clone();
        self.remove_git_config(&key).await
    }
}

/// `scheme://host[:port]` of the server URL.
fn server_origin(server_url: &str) -> Result<String, AuthError> {
    let invalid = || AuthError::InvalidServerUrl {
        url: server_url.to_string(),
    };
    let (scheme, rest) = server_url.split_once("://").ok_or_else(invalid)?;
    let authority = rest.split('/').next().unwrap_or_default();
    if scheme.is_empty() || authority.is_empty() {
        return Err(invalid());
    }
    Ok(format!("{}://{}", scheme.to_ascii_lowercase(), authority.to_ascii_lowercase()))
}

async fn write_private_key(path: &Path, contents: &str) -> Result<(), AuthError> {
    tokio::fs::write(path, contents).await.map_err(io_error(path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_error(path))?;
    }
    Ok(())
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
