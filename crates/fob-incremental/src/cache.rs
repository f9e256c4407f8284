//! In-memory transformation cache keyed by file modification times.
//!
//! An entry remembers the artifact a [`Transform`] produced for a file, the
//! root the artifact was computed from, every file the computation read, and
//! a freshness mark: the newest modification time across those files at the
//! moment the computation started. An entry stays valid while no dependency
//! is newer than the mark. A stale entry is recomputed from its root on
//! lookup; concurrent lookups of one key wait for that recomputation instead
//! of running their own.
//!
//! Entries are keyed by `(scope, path)`; the same file transformed under two
//! resolution roots yields two independent entries.

use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// A computation over a root file that may read further files.
pub trait Transform: Send + Sync {
    type Artifact: Clone;
    type Error;

    fn transform(&self, root: &Path) -> Result<Transformed<Self::Artifact>, Self::Error>;
}

/// Output of a [`Transform`]: the artifact plus the files it was derived from
/// besides the root.
#[derive(Debug, Clone)]
pub struct Transformed<A> {
    pub artifact: A,
    pub dependencies: Vec<PathBuf>,
}

impl<A> Transformed<A> {
    pub fn new(artifact: A) -> Self {
        Self {
            artifact,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = PathBuf>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<A> {
    artifact: A,
    root: PathBuf,
    dependencies: Vec<PathBuf>,
    freshness: SystemTime,
}

impl<A> CacheEntry<A> {
    /// `mark` yields the modification time a path counts with; the newest
    /// one becomes the freshness mark.
    fn new<F>(artifact: A, root: PathBuf, mut dependencies: Vec<PathBuf>, mark: F) -> Self
    where
        F: Fn(&Path) -> Option<SystemTime>,
    {
        dependencies.retain(|dep| *dep != root);
        dependencies.sort();
        dependencies.dedup();
        let mut entry = Self {
            artifact,
            root,
            dependencies,
            freshness: SystemTime::UNIX_EPOCH,
        };
        entry.freshness = entry
            .paths()
            .filter_map(mark)
            .max()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entry
    }

    fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.root.as_path()).chain(self.dependencies.iter().map(PathBuf::as_path))
    }

    /// Fresh while every dependency exists and none is newer than the mark.
    fn is_fresh(&self) -> bool {
        self.paths().all(|path| match modified(path) {
            Some(mtime) => mtime <= self.freshness,
            None => false,
        })
    }
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub recomputations: u64,
}

type Key<S> = (S, PathBuf);

pub struct TransformCache<S, T: Transform> {
    transform: T,
    entries: Mutex<HashMap<Key<S>, CacheEntry<T::Artifact>>>,
    /// Held while a key is looked up or recomputed.
    in_flight: Mutex<HashMap<Key<S>, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    recomputations: AtomicU64,
}

impl<S, T> TransformCache<S, T>
where
    S: Eq + Hash + Clone,
    T: Transform,
{
    pub fn new(transform: T) -> Self {
        Self {
            transform,
            entries: Mutex::new(HashMap::default()),
            in_flight: Mutex::new(HashMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            recomputations: AtomicU64::new(0),
        }
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Looks up the artifact for `path` under `scope`.
    ///
    /// Returns `Ok(None)` when nothing is cached. A stale entry is recomputed
    /// from its root and replaced. If that recomputation fails the error is
    /// returned and the stale entry is left in place.
    pub fn get(&self, scope: &S, path: &Path) -> Result<Option<T::Artifact>, T::Error> {
        let key = (scope.clone(), path.to_path_buf());
        let slot = self.slot(&key);
        let _guard = slot.lock();
        self.get_locked(&key)
    }

    /// Stores an artifact computed elsewhere. The freshness mark is taken from
    /// the filesystem now.
    pub fn put(
        &self,
        scope: S,
        path: impl Into<PathBuf>,
        artifact: T::Artifact,
        root: impl Into<PathBuf>,
        dependencies: Vec<PathBuf>,
    ) {
        let entry = CacheEntry::new(artifact, root.into(), dependencies, modified);
        self.entries.lock().insert((scope, path.into()), entry);
    }

    /// [`get`](Self::get), falling back to transforming `path` as its own root.
    pub fn get_or_compute(&self, scope: &S, path: &Path) -> Result<T::Artifact, T::Error> {
        let key = (scope.clone(), path.to_path_buf());
        let slot = self.slot(&key);
        let _guard = slot.lock();
        if let Some(artifact) = self.get_locked(&key)? {
            return Ok(artifact);
        }
        let entry = self.compute(path.to_path_buf(), &[])?;
        let artifact = entry.artifact.clone();
        self.entries.lock().insert(key, entry);
        Ok(artifact)
    }

    pub fn invalidate(&self, scope: &S, path: &Path) -> bool {
        let key = (scope.clone(), path.to_path_buf());
        self.in_flight.lock().remove(&key);
        self.entries.lock().remove(&key).is_some()
    }

    /// Freshness mark of an entry, if present.
    pub fn freshness(&self, scope: &S, path: &Path) -> Option<SystemTime> {
        self.entries
            .lock()
            .get(&(scope.clone(), path.to_path_buf()))
            .map(|entry| entry.freshness)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.in_flight.lock().clear();
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recomputations: self.recomputations.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: &Key<S>) -> Arc<Mutex<()>> {
        Arc::clone(self.in_flight.lock().entry(key.clone()).or_default())
    }

    /// Body of [`get`](Self::get); the caller holds the key's slot.
    fn get_locked(&self, key: &Key<S>) -> Result<Option<T::Artifact>, T::Error> {
        let (root, known) = {
            let entries = self.entries.lock();
            let Some(entry) = entries.get(key) else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            };
            if entry.is_fresh() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.artifact.clone()));
            }
            (entry.root.clone(), entry.dependencies.clone())
        };

        tracing::debug!(
            path = %key.1.display(),
            root = %root.display(),
            "cache entry stale, recomputing"
        );
        let entry = self.compute(root, &known)?;
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        let artifact = entry.artifact.clone();
        self.entries.lock().insert(key.clone(), entry);
        Ok(Some(artifact))
    }

    /// Runs the transform. The root and the `known` dependencies are stat'd
    /// before it starts, so an edit made while it runs leaves the entry
    /// stale. Dependencies first discovered by this run count only if they
    /// were last modified before it started.
    fn compute(
        &self,
        root: PathBuf,
        known: &[PathBuf],
    ) -> Result<CacheEntry<T::Artifact>, T::Error> {
        let started = SystemTime::now();
        let before: HashMap<PathBuf, Option<SystemTime>> = std::iter::once(&root)
            .chain(known)
            .map(|path| (path.clone(), modified(path)))
            .collect();

        let Transformed {
            artifact,
            dependencies,
        } = self.transform.transform(&root)?;

        Ok(CacheEntry::new(artifact, root, dependencies, |path| match before.get(path) {
            Some(mtime) => *mtime,
            None => modified(path).filter(|mtime| *mtime < started),
        }))
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
