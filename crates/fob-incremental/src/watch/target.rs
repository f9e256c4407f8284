//! Watch targets and watch sets.

use crate::bundler::Metafile;
use path_clean::PathClean;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Directory names that mark a dependency subtree.
pub const DEFAULT_PACKAGE_MARKERS: &[&str] = &["node_modules"];

/// What to observe for one input path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WatchTarget {
    /// A single file.
    Leaf(PathBuf),
    /// A whole dependency package directory, polled recursively.
    Package(PathBuf),
}

/// Classifies an input path.
///
/// A path containing a marker segment reduces to the package directory right
/// after the first marker (`@scope/name` for scoped packages). Anything else
/// is a leaf.
pub fn classify(path: &Path, markers: &[String]) -> WatchTarget {
    let mut prefix = PathBuf::new();
    let mut components = path.components();

    while let Some(component) = components.next() {
        prefix.push(component);
        let Component::Normal(name) = component else {
            continue;
        };
        if !markers.iter().any(|marker| name == marker.as_str()) {
            continue;
        }

        let Some(Component::Normal(package)) = components.next() else {
            break;
        };
        prefix.push(package);
        if package.to_string_lossy().starts_with('@') {
            if let Some(Component::Normal(name)) = components.next() {
                prefix.push(name);
            }
        }
        return WatchTarget::Package(prefix);
    }

    WatchTarget::Leaf(path.to_path_buf())
}

/// Everything one arming observes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    leaves: BTreeSet<PathBuf>,
    packages: BTreeSet<PathBuf>,
    inputs: BTreeSet<PathBuf>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set for a generation's manifest.
    pub fn from_metafile(metafile: &Metafile, cwd: &Path, markers: &[String]) -> Self {
        let mut set = Self::new();
        set.extend(metafile.input_paths(cwd), markers);
        set
    }

    /// Adds one concrete input path.
    pub fn insert(&mut self, path: impl Into<PathBuf>, markers: &[String]) {
        let path = path.into().clean();
        match classify(&path, markers) {
            WatchTarget::Leaf(leaf) => {
                self.leaves.insert(leaf);
            }
            WatchTarget::Package(dir) => {
                self.packages.insert(dir);
            }
        }
        self.inputs.insert(path);
    }

    pub fn extend<I>(&mut self, paths: I, markers: &[String])
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        for path in paths {
            self.insert(path, markers);
        }
    }

    pub fn union(&self, other: &WatchSet) -> WatchSet {
        WatchSet {
            leaves: self.leaves.union(&other.leaves).cloned().collect(),
            packages: self.packages.union(&other.packages).cloned().collect(),
            inputs: self.inputs.union(&other.inputs).cloned().collect(),
        }
    }

    pub fn leaves(&self) -> &BTreeSet<PathBuf> {
        &self.leaves
    }

    pub fn packages(&self) -> &BTreeSet<PathBuf> {
        &self.packages
    }

    /// Concrete input files, including those inside packages.
    pub fn inputs(&self) -> &BTreeSet<PathBuf> {
        &self.inputs
    }

    pub fn targets(&self) -> impl Iterator<Item = WatchTarget> + '_ {
        self.leaves
            .iter()
            .cloned()
            .map(WatchTarget::Leaf)
            .chain(self.packages.iter().cloned().map(WatchTarget::Package))
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.packages.is_empty()
    }

    /// What changes when moving from `self` to `next`.
    pub fn diff(&self, next: &WatchSet) -> WatchDiff {
        WatchDiff {
            added_leaves: next.leaves.difference(&self.leaves).cloned().collect(),
            removed_leaves: self.leaves.difference(&next.leaves).cloned().collect(),
            added_packages: next.packages.difference(&self.packages).cloned().collect(),
            removed_packages: self.packages.difference(&next.packages).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchDiff {
    pub added_leaves: Vec<PathBuf>,
    pub removed_leaves: Vec<PathBuf>,
    pub added_packages: Vec<PathBuf>,
    pub removed_packages: Vec<PathBuf>,
}

impl WatchDiff {
    pub fn is_empty(&self) -> bool {
        self.added_leaves.is_empty()
            && self.removed_leaves.is_empty()
            && self.added_packages.is_empty()
            && self.removed_packages.is_empty()
    }
}
