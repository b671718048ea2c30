//! Version-control collaborator.
//!
//! The checkpoint coordinator treats version control as an opaque
//! transactional log: stage paths, commit, or roll the staging area back.
//! The default implementation shells out to `git`; tests inject a fake.

use std::path::PathBuf;

use crate::errors::{CoreError, CoreResult};
use crate::process::{ProcessOutput, ProcessRequest, ProcessRunner, SystemProcessRunner};

/// Transactional commit surface used by checkpoints.
pub trait VersionControl: Send + Sync {
    /// Stage `paths` for the next commit.
    fn stage(&self, paths: &[PathBuf]) -> CoreResult<()>;

    /// Commit staged changes, returning the commit hash.
    ///
    /// Committing with nothing staged is not an error: the current head hash
    /// is returned so checkpoints stay idempotent.
    fn commit(&self, message: &str) -> CoreResult<String>;

    /// Unstage everything staged since the last commit.
    fn reset_staging(&self) -> CoreResult<()>;
}

/// `git`-backed [`VersionControl`].
pub struct GitVersionControl<R: ProcessRunner = SystemProcessRunner> {
    repo_root: PathBuf,
    runner: R,
}

impl GitVersionControl<SystemProcessRunner> {
    /// Create a git collaborator for the repository at `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self::with_runner(repo_root, SystemProcessRunner)
    }
}

impl<R: ProcessRunner> GitVersionControl<R> {
    /// Create a git collaborator with an injected process runner.
    pub fn with_runner(repo_root: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            repo_root: repo_root.into(),
            runner,
        }
    }

    fn git(&self, args: &[&str]) -> CoreResult<ProcessOutput> {
        let request = ProcessRequest::new("git")
            .args(args.iter().copied())
            .current_dir(&self.repo_root);
        self.runner
            .run(&request)
            .map_err(|e| CoreError::external("git", e.to_string()))
    }

    fn head_hash(&self) -> CoreResult<String> {
        let output = self.git(&["rev-parse", "HEAD"])?;
        if !output.success {
            return Err(CoreError::external(
                "git rev-parse HEAD",
                output.stderr.trim().to_string(),
            ));
        }
        Ok(output.stdout.trim().to_string())
    }
}

impl<R: ProcessRunner> VersionControl for GitVersionControl<R> {
    fn stage(&self, paths: &[PathBuf]) -> CoreResult<()> {
        let existing: Vec<String> = paths
            .iter()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if existing.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add".to_string(), "--".to_string()];
        args.extend(existing);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.git(&arg_refs)?;
        if !output.success {
            return Err(CoreError::external(
                "git add",
                output.stderr.trim().to_string(),
            ));
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> CoreResult<String> {
        let output = self.git(&["commit", "-m", message])?;
        if output.success {
            return self.head_hash();
        }
        let combined = format!("{}{}", output.stdout, output.stderr);
        if combined.contains("nothing to commit") || combined.contains("nothing added to commit") {
            // Idempotent re-checkpoint of unchanged state.
            return self.head_hash();
        }
        Err(CoreError::external(
            "git commit",
            combined.trim().to_string(),
        ))
    }

    fn reset_staging(&self) -> CoreResult<()> {
        let output = self.git(&["reset", "--quiet"])?;
        if !output.success {
            return Err(CoreError::external(
                "git reset",
                output.stderr.trim().to_string(),
            ));
        }
        Ok(())
    }
}

/// A [`VersionControl`] that records calls and returns scripted results.
///
/// Lives here (not behind `cfg(test)`) so integration tests across the
/// workspace can drive checkpoints without a real repository.
#[derive(Debug, Default)]
pub struct RecordingVersionControl {
    state: std::sync::Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    staged: Vec<Vec<PathBuf>>,
    commits: Vec<String>,
    resets: usize,
    fail_next_commit: bool,
}

impl RecordingVersionControl {
    /// Create a collaborator that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` call fail.
    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().fail_next_commit = true;
    }

    /// Messages of every commit accepted so far.
    pub fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    /// How many times the staging area was reset.
    pub fn resets(&self) -> usize {
        self.state.lock().unwrap().resets
    }

    /// Every staged path set, in call order.
    pub fn staged(&self) -> Vec<Vec<PathBuf>> {
        self.state.lock().unwrap().staged.clone()
    }
}

impl VersionControl for RecordingVersionControl {
    fn stage(&self, paths: &[PathBuf]) -> CoreResult<()> {
        self.state.lock().unwrap().staged.push(paths.to_vec());
        Ok(())
    }

    fn commit(&self, message: &str) -> CoreResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_commit {
            state.fail_next_commit = false;
            return Err(CoreError::external("fake commit", "scripted failure"));
        }
        state.commits.push(message.to_string());
        Ok(format!("commit{:04}", state.commits.len()))
    }

    fn reset_staging(&self) -> CoreResult<()> {
        self.state.lock().unwrap().resets += 1;
        Ok(())
    }
}
