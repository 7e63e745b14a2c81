use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of trying to take ownership of a path for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    InFlight,
    AlreadyProcessed,
}

enum Store {
    Unbounded(HashSet<PathBuf>),
    Bounded(LruCache<PathBuf, ()>),
}

impl Store {
    fn contains(&self, path: &Path) -> bool {
        match self {
            Store::Unbounded(set) => set.contains(path),
            Store::Bounded(cache) => cache.contains(path),
        }
    }

    fn insert(&mut self, path: PathBuf) {
        match self {
            Store::Unbounded(set) => {
                set.insert(path);
            }
            Store::Bounded(cache) => {
                cache.put(path, ());
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Store::Unbounded(set) => set.len(),
            Store::Bounded(cache) => cache.len(),
        }
    }
}

struct Inner {
    in_flight: HashSet<PathBuf>,
    processed: Store,
}

/// Paths for which the processing command has been started, plus paths
/// currently being stabilized. Lives for the life of the process.
///
/// All membership checks and updates go through one mutex, which is never
/// held across an await.
pub struct ProcessedSet {
    inner: Mutex<Inner>,
}

impl ProcessedSet {
    /// `capacity` bounds the processed paths with LRU eviction; `None` keeps
    /// every path forever.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let processed = match capacity {
            Some(cap) => Store::Bounded(LruCache::new(cap)),
            None => Store::Unbounded(HashSet::new()),
        };
        Self {
            inner: Mutex::new(Inner {
                in_flight: HashSet::new(),
                processed,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomic check-then-claim. Only one caller per path gets `Claimed` until
    /// the claim is released.
    pub fn claim(&self, path: &Path) -> Claim {
        let mut inner = self.lock();
        if inner.processed.contains(path) {
            Claim::AlreadyProcessed
        } else if !inner.in_flight.insert(path.to_path_buf()) {
            Claim::InFlight
        } else {
            Claim::Claimed
        }
    }

    /// Gives up a claim without marking the path, leaving it eligible again.
    pub fn release(&self, path: &Path) {
        self.lock().in_flight.remove(path);
    }

    /// Moves a claimed path into the processed set. Called strictly before
    /// the command is spawned.
    pub fn mark_processed(&self, path: &Path) {
        let mut inner = self.lock();
        inner.in_flight.remove(path);
        inner.processed.insert(path.to_path_buf());
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().processed.contains(path)
    }

    #[cfg(test)]
    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.lock().in_flight.contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_claim_lifecycle() {
        let set = ProcessedSet::new(None);
        let path = Path::new("/in/a.png");

        assert_eq!(set.claim(path), Claim::Claimed);
        assert_eq!(set.claim(path), Claim::InFlight);
        assert!(set.is_in_flight(path));
        assert!(!set.contains(path));

        set.mark_processed(path);
        assert!(!set.is_in_flight(path));
        assert!(set.contains(path));
        assert_eq!(set.claim(path), Claim::AlreadyProcessed);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_release_makes_path_eligible_again() {
        let set = ProcessedSet::new(None);
        let path = Path::new("/in/a.png");

        assert_eq!(set.claim(path), Claim::Claimed);
        set.release(path);
        assert!(set.is_empty());
        assert_eq!(set.claim(path), Claim::Claimed);
    }

    #[test]
    fn test_bounded_set_evicts_oldest() {
        let set = ProcessedSet::new(NonZeroUsize::new(2));
        for name in ["/in/1.png", "/in/2.png", "/in/3.png"] {
            let path = Path::new(name);
            assert_eq!(set.claim(path), Claim::Claimed);
            set.mark_processed(path);
        }

        assert_eq!(set.len(), 2);
        assert!(!set.contains(Path::new("/in/1.png")));
        assert!(set.contains(Path::new("/in/3.png")));
        assert_eq!(set.claim(Path::new("/in/1.png")), Claim::Claimed);
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let set = Arc::new(ProcessedSet::new(None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                thread::spawn(move || set.claim(Path::new("/in/dup.jpg")))
            })
            .collect();

        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c == Claim::Claimed)
            .count();
        assert_eq!(claimed, 1);
    }
}
