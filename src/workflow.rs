//! GitHub Actions workflow commands and step outputs.
//!
//! Commands are plain `::name::value` lines on stdout; outputs are appended to
//! the file named by `GITHUB_OUTPUT`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

fn escape_data(value: &str) -> String {
    value.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

/// Ask the runner to redact `secret` from all further log output.
pub fn add_mask(secret: &str) {
    if !secret.is_empty() {
        println!("::add-mask::{}", escape_data(secret));
    }
}

pub fn error(message: &str) {
    println!("::error::{}", escape_data(message));
}

pub fn warning(message: &str) {
    println!("::warning::{}", escape_data(message));
}

/// Collapsible log section, closed when dropped.
#[must_use = "the group closes as soon as the guard is dropped"]
pub struct LogGroup {
    _private: (),
}

pub fn group(name: &str) -> LogGroup {
    println!("::group::{}", escape_data(name));
    LogGroup { _private: () }
}

impl Drop for LogGroup {
    fn drop(&mut self) {
        println!("::endgroup::");
    }
}

/// Writes step outputs using the heredoc format of the `GITHUB_OUTPUT` file.
#[derive(Debug, Clone, Default)]
pub struct OutputWriter {
    path: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn set_output(&self, name: &str, value: &str) -> std::io::Result<()> {
        info!(output = name, value, "Setting step output");

        let Some(path) = &self.path else {
            return Ok(());
        };

        let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{name}<<{delimiter}")?;
        writeln!(file, "{value}")?;
        writeln!(file, "{delimiter}")?;
        Ok(())
    }
}
