use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not in a git repository")]
    NotARepo,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Version-control collaborator consumed by the review engine.
///
/// Every method either succeeds fully or fails hard; the engine treats any
/// failure as fatal for the run.
pub trait Repository {
    /// Regenerate the unified diff of the working tree against the base
    /// revision. Called after every working-tree mutation.
    fn diff_text(&self) -> Result<String>;
    /// Current branch name (empty for a detached HEAD).
    fn branch_name(&self) -> Result<String>;
    /// Absolute path of a repository-relative path.
    fn absolute_path(&self, relative: &str) -> PathBuf;
    /// Restore a path from the index, discarding working-tree changes.
    fn checkout_path(&self, relative: &str) -> Result<()>;
    /// Files present in the working tree but unknown to the repository.
    fn untracked_files(&self) -> Result<Vec<String>>;
    /// Files left in a conflicted state by a merge.
    fn unmerged_files(&self) -> Result<Vec<String>>;
}

/// `Repository` implementation that shells out to the `git` binary.
pub struct GitRepo {
    root: PathBuf,
    distance: u32,
}

impl GitRepo {
    /// Locate the enclosing repository and diff against the commit
    /// `distance` steps behind HEAD.
    pub fn discover(distance: u32) -> Result<Self> {
        let output = Command::new("git")
            .arg("rev-parse")
            .arg("--show-toplevel")
            .output()?;
        if !output.status.success() {
            return Err(GitError::NotARepo);
        }
        let root = String::from_utf8(output.stdout)?.trim().to_owned();
        Ok(Self {
            root: PathBuf::from(root),
            distance,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Revision id of the commit `distance` steps behind HEAD. Re-resolved
    /// on every diff so the base follows the repository, not one run.
    pub fn base_revision(&self) -> Result<String> {
        let rev = self.run(&["rev-parse", &format!("HEAD~{}", self.distance)])?;
        Ok(rev.trim().to_owned())
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout).map_err(GitError::from)
    }

    fn run_lines(&self, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .run(args)?
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

impl Repository for GitRepo {
    fn diff_text(&self) -> Result<String> {
        let rev = self.base_revision()?;
        // One line of context keeps hunks tight and the mark insertion
        // offset well-defined.
        self.run(&["diff", &rev, "-U1"])
    }

    fn branch_name(&self) -> Result<String> {
        Ok(self.run(&["branch", "--show-current"])?.trim().to_owned())
    }

    fn absolute_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn checkout_path(&self, relative: &str) -> Result<()> {
        self.run(&["checkout", "--", relative])?;
        Ok(())
    }

    fn untracked_files(&self) -> Result<Vec<String>> {
        self.run_lines(&["ls-files", "--others", "--exclude-standard"])
    }

    fn unmerged_files(&self) -> Result<Vec<String>> {
        self.run_lines(&["diff", "--name-only", "--diff-filter=U"])
    }
}
