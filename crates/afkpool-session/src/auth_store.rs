//! Per-identity auth folders on disk.
//!
//! Each identity owns `<root>/<identity>/`. The protocol client's auth
//! flow decides what goes inside; this module only lists, locates and
//! deletes the folders.

use std::io;
use std::path::{Path, PathBuf};

use afkpool_protocol::Identity;

use crate::SessionError;

#[derive(Debug, Clone)]
pub struct AuthStore {
    root: PathBuf,
}

impl AuthStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The folder holding `identity`'s cached credentials.
    ///
    /// [`Identity`] rejects path separators, so the result always sits
    /// directly under the root.
    pub fn profile_dir(&self, identity: &Identity) -> PathBuf {
        self.root.join(identity.as_str())
    }

    /// Identities with a folder under the root, sorted.
    ///
    /// A missing root yields an empty list. Entries that are not
    /// directories, or whose names are not valid identities, are skipped.
    pub fn list_identities(&self) -> Result<Vec<Identity>, SessionError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut identities = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 auth folder");
                continue;
            };
            match Identity::parse(name) {
                Ok(identity) => identities.push(identity),
                Err(e) => tracing::debug!(error = %e, "skipping auth folder"),
            }
        }
        identities.sort();
        Ok(identities)
    }

    /// Deletes `identity`'s folder. Returns whether anything was removed.
    pub async fn purge(&self, identity: &Identity) -> Result<bool, SessionError> {
        match tokio::fs::remove_dir_all(self.profile_dir(identity)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[test]
    fn test_list_identities_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path().join("nope"));
        assert!(store.list_identities().unwrap().is_empty());
    }

    #[test]
    fn test_list_identities_only_directories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b@example.com")).unwrap();
        std::fs::create_dir(dir.path().join("a@example.com")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let store = AuthStore::new(dir.path());

        assert_eq!(
            store.list_identities().unwrap(),
            vec![id("a@example.com"), id("b@example.com")]
        );
    }

    #[tokio::test]
    async fn test_purge_removes_folder_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path());
        let who = id("a@example.com");
        std::fs::create_dir_all(store.profile_dir(&who).join("cache")).unwrap();

        assert!(store.purge(&who).await.unwrap());
        assert!(!store.profile_dir(&who).exists());
        assert!(!store.purge(&who).await.unwrap());
    }
}
