use chrono::DateTime;
use git2::Repository;
use std::path::Path;
use thiserror::Error;

/// Placeholder reported when no repository is present.
pub const NONE: &str = "none";

#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Commit time {0} is out of range")]
    Timestamp(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// UTC, formatted like `Tue, 05 Mar 2019 17:42`.
    pub date: String,
    pub hash: String,
}

impl CommitInfo {
    fn none() -> Self {
        Self {
            date: NONE.to_string(),
            hash: NONE.to_string(),
        }
    }
}

/// Date and hash of HEAD in the repository containing `repo_location`.
/// A missing directory yields `"none"` for both.
pub fn repo_commit_info(repo_location: &Path) -> Result<CommitInfo, ProvenanceError> {
    if !repo_location.exists() {
        log::debug!("{} does not exist, no commit info", repo_location.display());
        return Ok(CommitInfo::none());
    }

    let repo = Repository::discover(repo_location)?;
    let commit = repo.head()?.peel_to_commit()?;
    log::debug!("HEAD of {} is {}", repo_location.display(), commit.id());

    Ok(CommitInfo {
        date: format_commit_time(commit.time().seconds())?,
        hash: commit.id().to_string(),
    })
}

fn format_commit_time(secs: i64) -> Result<String, ProvenanceError> {
    let when = DateTime::from_timestamp(secs, 0).ok_or(ProvenanceError::Timestamp(secs))?;
    Ok(when.format("%a, %d %b %Y %H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Signature, Time};
    use tempfile::tempdir;

    fn commit_at(repo: &Repository, secs: i64) -> git2::Oid {
        let sig = Signature::new("Sorter", "sorter@example.com", &Time::new(secs, 0)).unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap()
    }

    #[test]
    fn test_missing_repo_is_none() {
        let info = repo_commit_info(Path::new("/definitely/not/a/repo/here")).unwrap();
        assert_eq!(info, CommitInfo::none());
    }

    #[test]
    fn test_head_commit_info() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let oid = commit_at(&repo, 1551807720);

        let info = repo_commit_info(dir.path()).unwrap();
        assert_eq!(info.date, "Tue, 05 Mar 2019 17:42");
        assert_eq!(info.hash, oid.to_string());
        assert_eq!(info.hash.len(), 40);
    }

    #[test]
    fn test_subdirectory_finds_enclosing_repo() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let oid = commit_at(&repo, 1551807720);
        let sub = dir.path().join("sorting");
        std::fs::create_dir(&sub).unwrap();

        assert_eq!(repo_commit_info(&sub).unwrap().hash, oid.to_string());
    }

    #[test]
    fn test_repo_without_commits_is_error() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        assert!(matches!(
            repo_commit_info(dir.path()),
            Err(ProvenanceError::Git(_))
        ));
    }

    #[test]
    fn test_format_commit_time() {
        assert_eq!(format_commit_time(0).unwrap(), "Thu, 01 Jan 1970 00:00");
        assert!(matches!(
            format_commit_time(i64::MAX),
            Err(ProvenanceError::Timestamp(i64::MAX))
        ));
    }
}
