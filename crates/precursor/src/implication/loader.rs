//! Implication loading and the descriptor cache.
//!
//! Descriptors may be rewritten between planning calls, so the cache is not
//! trusted: the planner invalidates an entry immediately before every load.
//! The cache only saves repeated parsing inside a single read.

use super::registry::MemoryRegistry;
use super::schema::{Implication, ImplicationId};
use crate::result::{PrecursorError, PrecursorResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Loads implication descriptors by identifier.
pub trait ImplicationLoader {
    /// Load a descriptor.
    ///
    /// # Errors
    /// `DescriptorNotFound` when nothing exists under `id`; parse and
    /// validation errors for malformed descriptors.
    fn load(&self, id: &ImplicationId) -> PrecursorResult<Arc<Implication>>;

    /// Drop any cached copy of `id`.
    fn invalidate(&self, id: &ImplicationId);
}

/// Process-wide keyed descriptor store.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: Mutex<HashMap<ImplicationId, Arc<Implication>>>,
}

impl DescriptorCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ImplicationId, Arc<Implication>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached descriptor
    #[must_use]
    pub fn get(&self, id: &ImplicationId) -> Option<Arc<Implication>> {
        self.entries().get(id).cloned()
    }

    /// Store a descriptor
    pub fn insert(&self, id: ImplicationId, implication: Arc<Implication>) {
        self.entries().insert(id, implication);
    }

    /// Drop one entry. Returns whether it was cached.
    pub fn invalidate(&self, id: &ImplicationId) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Drop every entry whose identifier matches. Returns how many were dropped.
    pub fn invalidate_all(&self, predicate: impl Fn(&ImplicationId) -> bool) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|id, _| !predicate(id));
        before - entries.len()
    }

    /// Number of cached descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Loader over descriptors held in memory.
///
/// [`MemoryLoader::insert`] replaces a descriptor the way an editor rewrites
/// a file; the change is visible after the next invalidation.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    descriptors: RwLock<HashMap<ImplicationId, Implication>>,
    cache: DescriptorCache,
    reads: AtomicUsize,
}

impl MemoryLoader {
    /// Create an empty loader
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor.
    pub fn insert(&self, implication: Implication) {
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(implication.id.clone(), implication);
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(self, implication: Implication) -> Self {
        self.insert(implication);
        self
    }

    /// Registry covering every held descriptor.
    #[must_use]
    pub fn registry(&self) -> MemoryRegistry {
        let descriptors = self.descriptors.read().unwrap_or_else(PoisonError::into_inner);
        let mut sorted: Vec<&Implication> = descriptors.values().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        MemoryRegistry::from_implications(sorted)
    }

    /// How many times a descriptor was read from the backing store
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The loader's cache
    #[must_use]
    pub const fn cache(&self) -> &DescriptorCache {
        &self.cache
    }
}

impl ImplicationLoader for MemoryLoader {
    fn load(&self, id: &ImplicationId) -> PrecursorResult<Arc<Implication>> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(cached);
        }
        let implication = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PrecursorError::not_found(id.as_str()))?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        let implication = Arc::new(implication);
        self.cache.insert(id.clone(), Arc::clone(&implication));
        Ok(implication)
    }

    fn invalidate(&self, id: &ImplicationId) {
        self.cache.invalidate(id);
    }
}

/// Descriptor file extensions, in lookup order
pub const DESCRIPTOR_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Loader over a catalog directory holding one `<id>.yaml|yml|json` per
/// implication.
#[derive(Debug)]
pub struct DirectoryLoader {
    root: PathBuf,
    cache: DescriptorCache,
}

impl DirectoryLoader {
    /// Create a loader rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DescriptorCache::new(),
        }
    }

    /// Catalog directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The loader's cache
    #[must_use]
    pub const fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Descriptor file for `id`, if one exists.
    #[must_use]
    pub fn path_for(&self, id: &ImplicationId) -> Option<PathBuf> {
        DESCRIPTOR_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{ext}", id.as_str())))
            .find(|path| path.is_file())
    }

    /// Identifiers of every descriptor file in the catalog, sorted.
    ///
    /// # Errors
    /// I/O errors reading the directory.
    pub fn ids(&self) -> PrecursorResult<Vec<ImplicationId>> {
        let mut ids: Vec<ImplicationId> = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| DESCRIPTOR_EXTENSIONS.contains(&e))
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(ImplicationId::from)
            })
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Load every descriptor in the catalog, freshly, sorted by identifier.
    ///
    /// # Errors
    /// I/O errors reading the directory and any descriptor parse error.
    pub fn load_all(&self) -> PrecursorResult<Vec<Arc<Implication>>> {
        self.ids()?
            .iter()
            .map(|id| {
                self.invalidate(id);
                self.load(id)
            })
            .collect()
    }

    /// Build a registry (and discovery cache) from the whole catalog.
    ///
    /// # Errors
    /// Same as [`DirectoryLoader::load_all`].
    pub fn scan(&self) -> PrecursorResult<MemoryRegistry> {
        let implications = self.load_all()?;
        Ok(MemoryRegistry::from_implications(
            implications.iter().map(AsRef::as_ref),
        ))
    }
}

impl ImplicationLoader for DirectoryLoader {
    fn load(&self, id: &ImplicationId) -> PrecursorResult<Arc<Implication>> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(cached);
        }
        let path = self
            .path_for(id)
            .ok_or_else(|| PrecursorError::not_found(id.as_str()))?;
        let text = fs::read_to_string(&path)?;
        let implication = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Implication::from_json(id.clone(), &text)?,
            _ => Implication::from_yaml(id.clone(), &text)?,
        };
        tracing::debug!("Loaded implication {} from {}", id, path.display());
        let implication = Arc::new(implication);
        self.cache.insert(id.clone(), Arc::clone(&implication));
        Ok(implication)
    }

    fn invalidate(&self, id: &ImplicationId) {
        self.cache.invalidate(id);
    }
}
