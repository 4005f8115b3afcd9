//! Document registry of a script engine.
//!
//! Every run submitted under a name registers a [`DebugDocument`]. Names are made unique per
//! engine by appending ` [n]` on collision, so the submitted name is always a prefix of the
//! registered one. Discarded documents are released when the run returns.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::trace;

/// A script document registered by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugDocument {
    /// Unique name within the engine
    pub name: String,
    /// Source text
    pub source: String,
    /// `true` if the document outlives its run
    pub retained: bool,
}

/// Handle of a registered document, released with [`DocumentRegistry::release`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    id: u64,
    name: String,
}

impl DocumentHandle {
    /// The unique name the document was registered under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Registered documents in submission order
pub struct DocumentRegistry {
    documents: SkipMap<u64, DebugDocument>,
    names: DashMap<String, u64>,
    next_id: AtomicU64,
}

impl DocumentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        DocumentRegistry {
            documents: SkipMap::new(),
            names: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a document. Without a name nothing is registered.
    pub fn register(
        &self,
        name: Option<&str>,
        source: &str,
        retained: bool,
    ) -> Option<DocumentHandle> {
        let requested = name?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut unique = requested.to_string();
        let mut suffix = 2;
        loop {
            match self.names.entry(unique.clone()) {
                Entry::Occupied(_) => {
                    unique = format!("{} [{}]", requested, suffix);
                    suffix += 1;
                }
                Entry::Vacant(entry) => {
                    entry.insert(id);
                    break;
                }
            }
        }

        trace!("document '{}' registered (retained: {})", unique, retained);
        self.documents.insert(
            id,
            DebugDocument {
                name: unique.clone(),
                source: source.to_string(),
                retained,
            },
        );

        Some(DocumentHandle { id, name: unique })
    }

    /// Release a document at the end of its run; retained documents stay registered
    pub fn release(&self, handle: &DocumentHandle) {
        let retained = self
            .documents
            .get(&handle.id)
            .is_some_and(|entry| entry.value().retained);
        if !retained {
            self.documents.remove(&handle.id);
            self.names.remove(&handle.name);
        }
    }

    /// Names of all registered documents, in submission order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|entry| entry.value().name.clone())
            .collect()
    }

    /// Look up a document by its unique name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<DebugDocument> {
        let id = *self.names.get(name)?;
        self.documents.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of registered documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// `true` if no document is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Drop every document
    pub fn clear(&self) {
        self.documents.clear();
        self.names.clear();
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnamed_documents_are_not_registered() {
        let registry = DocumentRegistry::new();
        assert!(registry.register(None, "1 + 1", true).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_retained_and_discarded() {
        let registry = DocumentRegistry::new();

        let kept = registry.register(Some("setup"), "let a = 1;", true).unwrap();
        let dropped = registry.register(Some("temp"), "a + 1", false).unwrap();
        assert_eq!(registry.names(), vec!["setup", "temp"]);

        registry.release(&kept);
        registry.release(&dropped);
        assert_eq!(registry.names(), vec!["setup"]);
        assert_eq!(registry.get("setup").unwrap().source, "let a = 1;");
        assert!(registry.get("temp").is_none());
    }

    #[test]
    fn test_unique_names() {
        let registry = DocumentRegistry::new();
        let first = registry.register(Some("lib"), "", true).unwrap();
        let second = registry.register(Some("lib"), "", true).unwrap();
        let third = registry.register(Some("lib"), "", true).unwrap();

        assert_eq!(first.name(), "lib");
        assert_eq!(second.name(), "lib [2]");
        assert_eq!(third.name(), "lib [3]");
        assert!(registry.names().iter().all(|name| name.starts_with("lib")));
    }
}
