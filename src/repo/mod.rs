//! Repository facade: the library's main entry point, owning an object
//! manager and exposing typed reads over it.

pub mod manager;

use std::path::{Path, PathBuf};

use crate::error::{GitError, Result};
use crate::object::{commit, tag, tree, CommitObj, Decoded, ObjectId, ObjectType};
use manager::GitObjectManager;

pub struct ResolvedObject {
    pub sha: ObjectId,
    pub decoded: Decoded,
}

pub struct Repository {
    #[allow(dead_code)]
    root: PathBuf,
    manager: GitObjectManager,
}

/// Opens a repository rooted at `path`, which must contain a `.git`
/// directory with an `objects` subdirectory (loose and/or packed).
pub fn open_repository(path: impl AsRef<Path>) -> Result<Repository> {
    Repository::open(path.as_ref())
}

impl Repository {
    pub fn open(path: &Path) -> Result<Repository> {
        let objects_dir = path.join(".git").join("objects");
        if !objects_dir.is_dir() {
            return Err(GitError::object_broken(format!(
                "not a git repository (missing {})",
                objects_dir.display()
            )));
        }
        let manager = GitObjectManager::open(&objects_dir)?;
        Ok(Repository {
            root: path.to_path_buf(),
            manager,
        })
    }

    pub fn cat(&self, sha: &ObjectId) -> Result<ResolvedObject> {
        let (kind, data) = self.manager.cat(sha)?;
        let decoded = match kind {
            ObjectType::Commit => Decoded::Commit(commit::parse_commit(&data)?),
            ObjectType::Tree => Decoded::Tree(tree::parse_tree(&data)?),
            ObjectType::Blob => Decoded::Blob(data),
            ObjectType::Tag => Decoded::Tag(tag::parse_tag(&data)?),
            ObjectType::OfsDelta | ObjectType::RefDelta => {
                return Err(GitError::object_broken(
                    "resolved object still carries a delta type tag",
                ))
            }
        };
        Ok(ResolvedObject { sha: *sha, decoded })
    }

    /// Walks parent links from `sha` up to `lookback` commits, for
    /// building a plausible `have` list ahead of an incremental fetch.
    pub fn list_commit_have(&self, sha: &ObjectId, lookback: usize) -> Result<Vec<CommitObj>> {
        let mut commits = Vec::new();
        let mut frontier = vec![*sha];
        let mut seen = std::collections::HashSet::new();

        while commits.len() < lookback {
            let Some(next) = frontier.pop() else {
                break;
            };
            if !seen.insert(next) {
                continue;
            }
            let resolved = self.cat(&next)?;
            let Decoded::Commit(commit) = resolved.decoded else {
                return Err(GitError::object_broken(format!(
                    "{next} is not a commit"
                )));
            };
            frontier.extend(commit.parent.as_slice());
            commits.push(commit);
        }

        Ok(commits)
    }

    pub fn pack_count(&self) -> usize {
        self.manager.pack_count()
    }

    pub fn loose_count(&self) -> usize {
        self.manager.loose_count()
    }
}
