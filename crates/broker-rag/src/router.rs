use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use crate::index::{Index, MemoryIndex};

/// Derives the collection name for a codebase's absolute path:
/// `codebase_<slug>_<first12-of-sha256(path)>`, where `slug` is the last
/// path component lowercased, non-alphanumerics replaced with `_`, and
/// truncated to 20 characters.
pub fn collection_name(abs_path: &str) -> String {
    let last_component = abs_path.rsplit(['/', '\\']).find(|s| !s.is_empty()).unwrap_or(abs_path);
    let mut slug: String = last_component
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.truncate(20);
    if slug.is_empty() {
        slug.push('_');
    }
    let digest = Sha256::digest(abs_path.as_bytes());
    let hex = hex::encode(digest);
    format!("codebase_{}_{}", slug, &hex[..12])
}

/// Holds one index handle per collection ever switched to, plus a marker
/// for which one is active. Switching to a name that was already created
/// this process reconnects to its existing handle rather than building a
/// fresh empty one — a codebase's previously-ingested chunks survive
/// switching away and back. Both sides of the system share the exact same
/// `Arc<dyn Index>` for a given collection, so a `clear()` issued by one is
/// immediately visible to the other; there is no independently cached copy
/// to go stale.
pub struct IndexRouter {
    collections: Mutex<HashMap<String, Arc<dyn Index>>>,
    active_name: Mutex<Option<String>>,
}

impl Default for IndexRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexRouter {
    pub fn new() -> Self {
        Self { collections: Mutex::new(HashMap::new()), active_name: Mutex::new(None) }
    }

    /// Switches to the collection for `abs_path`, reconnecting to its
    /// existing index if this router has seen that path before and
    /// creating a fresh one otherwise. Returns the shared handle.
    pub fn switch_to(&self, abs_path: &str) -> Arc<dyn Index> {
        let name = collection_name(abs_path);
        let mut collections = self.collections.lock().unwrap();
        let handle = collections.entry(name.clone()).or_insert_with(|| Arc::new(MemoryIndex::new())).clone();
        *self.active_name.lock().unwrap() = Some(name);
        handle
    }

    /// The handle currently active, if any collection has been switched to.
    pub fn active(&self) -> Option<Arc<dyn Index>> {
        let name = self.active_name.lock().unwrap().clone()?;
        self.collections.lock().unwrap().get(&name).cloned()
    }

    pub fn active_collection_name(&self) -> Option<String> {
        self.active_name.lock().unwrap().clone()
    }
}
