//! Durable flat-file backend.
//!
//! The entire world-state is one postcard blob. A missing file reads as
//! the default (empty) state, so first boot needs no initialization step.
//! Commits write a fresh temp file in the same directory and atomically
//! rename it over the previous blob; the last committed state survives a
//! crash at any point.
//!
//! The lock is process-level. This deployment assumes one process owns the
//! store (see the workspace docs); scaling past that means replacing this
//! backend with a genuinely transactional one behind the same contract.

use crate::WorldStore;
use parking_lot::Mutex;
use parley_core::{MarketError, MarketResult, WorldState};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> MarketResult<WorldState> {
        if !self.path.exists() {
            return Ok(WorldState::default());
        }
        let bytes = std::fs::read(&self.path)?;
        postcard::from_bytes(&bytes)
            .map_err(|e| MarketError::storage(format!("world-state blob is unreadable: {e}")))
    }

    fn commit(&self, state: &WorldState) -> MarketResult<()> {
        let bytes = postcard::to_allocvec(state)
            .map_err(|e| MarketError::storage(format!("world-state encoding failed: {e}")))?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), &bytes)?;
        // Atomic rename over the previous blob.
        tmp.persist(&self.path)
            .map_err(|e| MarketError::storage(format!("commit rename failed: {e}")))?;
        tracing::trace!(bytes = bytes.len(), path = %self.path.display(), "committed world-state");
        Ok(())
    }
}

impl WorldStore for FileStore {
    fn read(&self) -> MarketResult<WorldState> {
        let _guard = self.lock.lock();
        self.load()
    }

    fn atomically<T, F>(&self, mutate: F) -> MarketResult<T>
    where
        F: FnOnce(&mut WorldState) -> MarketResult<T>,
    {
        let _guard = self.lock.lock();
        let mut state = self.load()?;
        let value = mutate(&mut state)?;
        self.commit(&state)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{MarketError, UserRecord, Username};

    fn store_in(dir: &tempfile::TempDir) -> FileStore {
        FileStore::new(dir.path().join("world.bin"))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.read().unwrap(), WorldState::default());
    }

    #[test]
    fn committed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir);
            store
                .atomically(|ws| {
                    ws.users.insert(
                        Username::from("alice"),
                        UserRecord::with_password(Default::default()),
                    );
                    Ok(())
                })
                .unwrap();
        }
        let reopened = store_in(&dir);
        assert!(reopened
            .read()
            .unwrap()
            .user_exists(&Username::from("alice")));
    }

    #[test]
    fn failed_transaction_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .atomically(|ws| {
                ws.users.insert(
                    Username::from("alice"),
                    UserRecord::with_password(Default::default()),
                );
                Ok(())
            })
            .unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let err = store.atomically::<(), _>(|ws| {
            ws.users.clear();
            Err(MarketError::conflict("nope"))
        });
        assert!(err.is_err());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn corrupt_blob_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"definitely not postcard").unwrap();
        assert!(matches!(
            store.read(),
            Err(MarketError::Storage { .. })
        ));
    }
}
