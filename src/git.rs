//! Git integration via libgit2 for committing refreshed data files.
//!
//! [`GitManager`] commits exactly the files a run changed on top of HEAD,
//! optionally on a dedicated branch. Pushing and opening the pull request is
//! left to the surrounding CI workflow.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use git2::{BranchType, Commit, ErrorCode, Index, IndexEntry, IndexTime, Repository, Signature};
use tracing::info;

use crate::orchestrator::{ChangeProposer, ProposalResult};

pub struct GitManager {
    repo: Repository,
}

impl GitManager {
    /// Opens an existing git repository at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).context("failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Points HEAD at `name`, creating the branch at the current commit if
    /// needed. The working tree is never checked out, so freshly written
    /// files stay in place; an existing branch must therefore sit on the
    /// current commit. In a repository without commits HEAD is simply
    /// repointed and the first commit creates the branch.
    pub fn switch_to_branch(&self, name: &str) -> Result<()> {
        let reference = format!("refs/heads/{name}");
        let existing = self.repo.find_branch(name, BranchType::Local).ok();
        match self.head_commit()? {
            Some(head_commit) => match existing {
                Some(branch) => {
                    let target = branch.get().peel_to_commit()?;
                    if target.id() != head_commit.id() {
                        bail!("branch `{name}` exists and does not point at HEAD");
                    }
                }
                None => {
                    self.repo.branch(name, &head_commit, false)?;
                }
            },
            None if existing.is_some() => {
                bail!("branch `{name}` exists but HEAD has no commits yet");
            }
            None => {}
        }
        self.repo.set_head(&reference)?;
        Ok(())
    }

    /// Commits exactly `paths` on top of HEAD and returns the short hash.
    ///
    /// The commit tree is HEAD's tree plus the given files, so anything else
    /// the user has staged stays out of it. Those paths are also refreshed in
    /// the repository index, leaving other staged entries as they were.
    pub fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<String> {
        let workdir = self
            .repo
            .workdir()
            .context("repository has no working directory")?;
        let workdir = std::fs::canonicalize(workdir)?;

        let relative: Vec<PathBuf> = paths
            .iter()
            .map(|path| -> Result<PathBuf> {
                let absolute = std::fs::canonicalize(path)
                    .with_context(|| format!("cannot resolve {}", path.display()))?;
                let relative = absolute.strip_prefix(&workdir).with_context(|| {
                    format!("{} is outside the repository", path.display())
                })?;
                Ok(relative.to_path_buf())
            })
            .collect::<Result<_>>()?;

        // An unborn HEAD (fresh repository) gets a root commit.
        let parent = self.head_commit()?;

        let mut tree_index = Index::new()?;
        if let Some(parent) = &parent {
            tree_index.read_tree(&parent.tree()?)?;
        }
        for path in &relative {
            let entry = self.blob_entry(&tree_index, &workdir, path)?;
            tree_index.add(&entry)?;
        }
        let tree_oid = tree_index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_oid)?;

        let sig = self
            .repo
            .signature()
            .or_else(|_| Signature::now("Sentinel Searcher", "sentinel@localhost"))?;

        let parents: Vec<&Commit> = parent.iter().collect();
        let commit_oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        let mut index = self.repo.index()?;
        for path in &relative {
            index.add_path(path)?;
        }
        index.write()?;

        let short = &commit_oid.to_string()[..7];
        Ok(short.to_string())
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Index entry for the working-tree file at `relative`, written as a blob.
    /// Keeps the file mode already recorded in `tree_index`, if any.
    fn blob_entry(&self, tree_index: &Index, workdir: &Path, relative: &Path) -> Result<IndexEntry> {
        let contents = std::fs::read(workdir.join(relative))
            .with_context(|| format!("cannot read {}", relative.display()))?;
        let id = self.repo.blob(&contents)?;
        let mode = tree_index
            .get_path(relative, 0)
            .map_or(0o100644, |entry| entry.mode);

        let path = relative
            .to_str()
            .context("path is not valid UTF-8")?
            .replace('\\', "/")
            .into_bytes();
        Ok(IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            file_size: contents.len() as u32,
            id,
            flags: path.len().min(0xfff) as u16,
            flags_extended: 0,
            path,
        })
    }

    /// Returns the name of the current branch.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        let name = head
            .shorthand()
            .context("branch name is not valid UTF-8")?
            .to_string();
        Ok(name)
    }
}

/// Commit message: summary line plus one bullet per changed file.
pub fn commit_message(paths: &[PathBuf]) -> String {
    let mut message = format!("sentinel: update {} file(s)\n", paths.len());
    if !paths.is_empty() {
        message.push('\n');
    }
    for path in paths {
        message.push_str(&format!("- {}\n", path.display()));
    }
    message
}

/// Commits changed files to a local branch for CI to push as a pull request.
pub struct GitProposer {
    repo_path: PathBuf,
    branch: Option<String>,
}

impl GitProposer {
    pub fn new(repo_path: PathBuf, branch: Option<String>) -> Self {
        Self { repo_path, branch }
    }
}

impl ChangeProposer for GitProposer {
    fn propose(&self, paths: &[PathBuf]) -> Result<ProposalResult> {
        let git = GitManager::open(&self.repo_path)?;
        if let Some(branch) = &self.branch {
            git.switch_to_branch(branch)?;
        }
        let commit = git.commit_paths(paths, &commit_message(paths))?;
        let branch = git.current_branch()?;
        info!(%branch, %commit, files = paths.len(), "committed updated files");
        Ok(ProposalResult {
            branch,
            commit,
            files: paths.len(),
        })
    }
}
