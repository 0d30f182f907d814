//! Set of nicknames currently held by active sessions.

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Tracks claimed nicknames and enforces uniqueness across sessions.
///
/// Every operation is a single critical section over one lock, so compound
/// check-then-act steps (claim, rename) cannot interleave between sessions.
/// A poisoned lock is recovered because no operation leaves the set half
/// updated.
#[derive(Debug, Default)]
pub struct NicknameRegistry {
    names: Mutex<HashSet<String>>,
}

impl NicknameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` if nobody holds it yet.
    pub fn try_claim(&self, name: &str) -> bool {
        let mut names = self.lock();
        if names.contains(name) {
            return false;
        }
        names.insert(name.to_string())
    }

    /// Frees `name`; does nothing if it is not held.
    pub fn release(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Swaps `old` for `new` in one step.
    ///
    /// Fails without touching the set when `old` is not held or `new` is
    /// already taken. Renaming to the name already held is a successful no-op.
    pub fn rename(&self, old: &str, new: &str) -> bool {
        let mut names = self.lock();
        if !names.contains(old) {
            return false;
        }
        if old == new {
            return true;
        }
        if names.contains(new) {
            return false;
        }
        names.remove(old);
        names.insert(new.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    use super::*;

    #[test]
    fn claim_rejects_duplicates() {
        let registry = NicknameRegistry::new();
        assert!(registry.try_claim("alice"));
        assert!(!registry.try_claim("alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn release_frees_name_and_ignores_unknown() {
        let registry = NicknameRegistry::new();
        registry.release("ghost");
        assert!(registry.try_claim("alice"));
        registry.release("alice");
        assert!(registry.is_empty());
        assert!(registry.try_claim("alice"));
    }

    #[test]
    fn rename_moves_the_claim() {
        let registry = NicknameRegistry::new();
        assert!(registry.try_claim("alice"));
        assert!(registry.rename("alice", "carol"));
        assert!(!registry.contains("alice"));
        assert!(registry.contains("carol"));
        assert!(registry.try_claim("alice"));
    }

    #[test]
    fn rename_fails_when_target_taken_or_source_missing() {
        let registry = NicknameRegistry::new();
        assert!(registry.try_claim("alice"));
        assert!(registry.try_claim("bob"));

        assert!(!registry.rename("alice", "bob"));
        assert!(registry.contains("alice"));
        assert!(registry.contains("bob"));

        assert!(!registry.rename("nobody", "zed"));
        assert!(!registry.contains("zed"));
    }

    #[test]
    fn rename_to_same_name_is_noop() {
        let registry = NicknameRegistry::new();
        assert!(registry.try_claim("alice"));
        assert!(registry.rename("alice", "alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_claims_have_single_winner() {
        let registry = Arc::new(NicknameRegistry::new());
        let contenders = 16;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.try_claim("alice")
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("claim thread panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn concurrent_renames_to_same_target_have_single_winner() {
        for _ in 0..50 {
            let registry = Arc::new(NicknameRegistry::new());
            assert!(registry.try_claim("alice"));
            assert!(registry.try_claim("bob"));
            let barrier = Arc::new(Barrier::new(2));

            let racers: Vec<_> = ["alice", "bob"]
                .into_iter()
                .map(|old| {
                    let registry = Arc::clone(&registry);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        (old, registry.rename(old, "carol"))
                    })
                })
                .collect();

            let results: Vec<_> = racers
                .into_iter()
                .map(|handle| handle.join().expect("rename thread panicked"))
                .collect();

            let winners: Vec<_> = results.iter().filter(|(_, won)| *won).collect();
            assert_eq!(winners.len(), 1);
            let (loser, _) = results
                .iter()
                .find(|(_, won)| !*won)
                .expect("one rename must lose");
            assert!(registry.contains(loser));
            assert!(registry.contains("carol"));
            assert_eq!(registry.len(), 2);
        }
    }
}
