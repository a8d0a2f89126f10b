//! Branch reconciliation against real git repositories
//!
//! Each test builds a bare remote plus a working clone in a temp directory and
//! drives `BranchReconciler` through the production git client.

use create_pull_request::external::{GitClient, GitCommands, ProcessCommandExecutor};
use create_pull_request::ids::UuidGenerator;
use create_pull_request::service::{BranchAction, BranchReconciler};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should be installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
    git(dir, &["add", name]);
    git(dir, &["commit", "-m", &format!("Add {name}")]);
}

/// Bare `remote.git` with `main`, cloned into `work` with a local `feature`
/// branch one commit ahead.
struct Fixture {
    _root: TempDir,
    work: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let remote = root.path().join("remote.git");
        let work = root.path().join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&remote, &["init", "--bare", "--quiet"]);
        git(&work, &["init", "--quiet"]);
        git(&work, &["config", "user.name", "Test User"]);
        git(&work, &["config", "user.email", "test@example.com"]);
        git(&work, &["config", "commit.gpgsign", "false"]);
        git(&work, &["checkout", "-b", "main"]);
        commit_file(&work, "README.md", "# widgets\n");
        git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        git(&work, &["push", "--quiet", "origin", "main"]);

        git(&work, &["checkout", "-b", "feature"]);
        commit_file(&work, "feature.txt", "feature work\n");

        Self { _root: root, work }
    }

    fn client(&self) -> Arc<GitClient> {
        Arc::new(GitClient::new(
            Arc::new(ProcessCommandExecutor::new(&self.work)),
            &self.work,
            None,
        ))
    }

    fn reconciler(&self, client: Arc<GitClient>) -> BranchReconciler {
        BranchReconciler::new(client, Arc::new(UuidGenerator))
    }

    fn current_branch(&self) -> String {
        git(&self.work, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn branches(&self) -> String {
        git(&self.work, &["branch", "--format=%(refname:short)"])
    }
}

#[tokio::test]
async fn test_new_branch_is_created_then_not_updated_after_push() {
    let fixture = Fixture::new();
    let client = fixture.client();
    let reconciler = fixture.reconciler(client.clone());

    let first = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

    assert_eq!(first.action, BranchAction::Created);
    assert!(first.has_diff_with_target_branch);
    assert_eq!(first.head_sha, git(&fixture.work, &["rev-parse", "feature"]));
    assert_eq!(fixture.current_branch(), "feature");
    assert_eq!(fixture.branches().lines().count(), 2, "temporary branch should be deleted");

    client
        .push(&[
            "--force-with-lease".to_string(),
            "origin".to_string(),
            "feature:refs/heads/feature".to_string(),
        ])
        .await
        .unwrap();

    let second = reconciler.reconcile("feature", "main", "origin", false).await.unwrap();

    assert_eq!(second.action, BranchAction::NotUpdated);
    assert!(second.has_diff_with_target_branch);
    assert_eq!(second.head_sha, first.head_sha);
}

#[tokio::test]
async fn test_new_commit_on_source_updates_existing_branch() {
    let fixture = Fixture::new();
    let client = fixture.client();
    git(&fixture.work, &["push", "--quiet", "origin", "feature"]);
    commit_file(&fixture.work, "more.txt", "more work\n");

    let result = fixture
        .reconciler(client)
        .reconcile("feature", "main", "origin", false)
        .await
        .unwrap();

    assert_eq!(result.action, BranchAction::Updated);
    assert!(result.has_diff_with_target_branch);
}

#[tokio::test]
async fn test_middle_branch_is_created_from_source() {
    let fixture = Fixture::new();
    let client = fixture.client();

    let result = fixture
        .reconciler(client)
        .reconcile("feature", "main", "origin", true)
        .await
        .unwrap();

    assert_eq!(result.action, BranchAction::Created);
    assert_eq!(result.source_branch, "feature-merge-to-main");
    assert_eq!(
        git(&fixture.work, &["rev-parse", "feature-merge-to-main"]),
        git(&fixture.work, &["rev-parse", "feature"])
    );
}

#[tokio::test]
async fn test_branch_without_new_commits_is_not_created() {
    let fixture = Fixture::new();
    git(&fixture.work, &["checkout", "--quiet", "main"]);
    git(&fixture.work, &["branch", "--quiet", "-D", "feature"]);
    git(&fixture.work, &["checkout", "--quiet", "-b", "feature"]);

    let result = fixture
        .reconciler(fixture.client())
        .reconcile("feature", "main", "origin", false)
        .await
        .unwrap();

    assert_eq!(result.action, BranchAction::None);
    assert!(!result.has_diff_with_target_branch);
}

#[tokio::test]
async fn test_local_changes_are_restored_when_starting_elsewhere() {
    let fixture = Fixture::new();
    git(&fixture.work, &["push", "--quiet", "-u", "origin", "feature"]);
    git(&fixture.work, &["checkout", "--quiet", "main"]);
    std::fs::write(fixture.work.join("scratch.txt"), "uncommitted\n").unwrap();

    let result = fixture
        .reconciler(fixture.client())
        .reconcile("feature", "main", "origin", false)
        .await
        .unwrap();

    assert_eq!(result.action, BranchAction::NotUpdated);
    assert_eq!(fixture.current_branch(), "main");
    assert_eq!(
        std::fs::read_to_string(fixture.work.join("scratch.txt")).unwrap(),
        "uncommitted\n"
    );
}
