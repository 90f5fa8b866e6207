//! In-memory backend.

use crate::WorldStore;
use parking_lot::Mutex;
use parley_core::{MarketResult, WorldState};

/// Mutex-guarded state for tests and simulations. The mutation closure
/// runs on a scratch clone that is swapped in only on success, so a
/// half-mutated state never becomes visible even when the closure errors
/// partway through.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<WorldState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: WorldState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl WorldStore for MemoryStore {
    fn read(&self) -> MarketResult<WorldState> {
        Ok(self.state.lock().clone())
    }

    fn atomically<T, F>(&self, mutate: F) -> MarketResult<T>
    where
        F: FnOnce(&mut WorldState) -> MarketResult<T>,
    {
        let mut guard = self.state.lock();
        let mut scratch = guard.clone();
        let value = mutate(&mut scratch)?;
        *guard = scratch;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{MarketError, PredictionId, Username};

    #[test]
    fn snapshot_is_independent() {
        let store = MemoryStore::new();
        let snapshot = store.read().unwrap();
        store
            .atomically(|ws| {
                ws.users.insert(
                    Username::from("alice"),
                    parley_core::UserRecord::with_password(Default::default()),
                );
                Ok(())
            })
            .unwrap();
        assert!(snapshot.users.is_empty());
        assert_eq!(store.read().unwrap().users.len(), 1);
    }

    #[test]
    fn failed_transaction_commits_nothing() {
        let store = MemoryStore::new();
        store
            .atomically(|ws| {
                ws.users.insert(
                    Username::from("alice"),
                    parley_core::UserRecord::with_password(Default::default()),
                );
                Ok(())
            })
            .unwrap();
        let before = store.read().unwrap();

        let err = store.atomically::<(), _>(|ws| {
            // Mutate, then fail: none of this may stick.
            ws.users.clear();
            ws.predictions.remove(&PredictionId(7));
            Err(MarketError::conflict("nope"))
        });
        assert_eq!(err, Err(MarketError::conflict("nope")));
        assert_eq!(store.read().unwrap(), before);
    }

    #[test]
    fn returns_the_closure_value() {
        let store = MemoryStore::new();
        let n = store.atomically(|ws| Ok(ws.predictions.len())).unwrap();
        assert_eq!(n, 0);
    }
}
