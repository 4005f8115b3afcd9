//! Registry of host items whose members are exposed unqualified.
//!
//! Collisions are resolved deterministically: the most recently bound item that has a member
//! wins. Binding a name again moves it to the most recent position.

use std::sync::RwLock;

use tracing::debug;

use crate::host::HostItem;

/// Per-engine registry of global-members host items
#[derive(Default)]
pub struct GlobalMembers {
    items: RwLock<Vec<(String, HostItem)>>,
}

impl GlobalMembers {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        GlobalMembers {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Register `item` under `name`, replacing and outranking any earlier binding of `name`
    pub fn register(&self, name: &str, item: HostItem) {
        let mut items = write_lock!(self.items);
        items.retain(|(existing, _)| existing != name);
        items.push((name.to_string(), item));
        debug!("exposed members of '{}' globally ({} global items)", name, items.len());
    }

    /// Remove the binding of `name`; `false` if there was none
    pub fn unregister(&self, name: &str) -> bool {
        let mut items = write_lock!(self.items);
        let before = items.len();
        items.retain(|(existing, _)| existing != name);
        before != items.len()
    }

    /// The most recently bound item accepted by `has_member`
    pub fn resolve(&self, has_member: impl Fn(&HostItem) -> bool) -> Option<HostItem> {
        read_lock!(self.items)
            .iter()
            .rev()
            .find(|(_, item)| has_member(item))
            .map(|(_, item)| item.clone())
    }

    /// Snapshot of all bindings, oldest first
    #[must_use]
    pub fn items(&self) -> Vec<(String, HostItem)> {
        read_lock!(self.items).clone()
    }

    /// Names of all bindings, oldest first
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        read_lock!(self.items)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Remove all bindings
    pub fn clear(&self) {
        write_lock!(self.items).clear();
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock!(self.items).len()
    }

    /// `true` if nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        typesystem::{PrimitiveKind, TypeRegistry},
        value::HostValue,
    };

    fn item_of(registry: &TypeRegistry, kind: PrimitiveKind) -> HostItem {
        HostItem::from_value(HostValue::Type(registry.primitive(kind))).unwrap()
    }

    fn is_kind(item: &HostItem, registry: &TypeRegistry, kind: PrimitiveKind) -> bool {
        item.to_host_value() == Some(HostValue::Type(registry.primitive(kind)))
    }

    #[test]
    fn test_most_recent_binding_wins() {
        let registry = TypeRegistry::new();
        let globals = GlobalMembers::new();

        globals.register("first", item_of(&registry, PrimitiveKind::Int32));
        globals.register("second", item_of(&registry, PrimitiveKind::String));

        let winner = globals.resolve(|_| true).unwrap();
        assert!(is_kind(&winner, &registry, PrimitiveKind::String));

        globals.register("first", item_of(&registry, PrimitiveKind::Int32));
        let winner = globals.resolve(|_| true).unwrap();
        assert!(is_kind(&winner, &registry, PrimitiveKind::Int32));
        assert_eq!(globals.names(), vec!["second".to_string(), "first".to_string()]);
    }

    #[test]
    fn test_resolve_filters_and_unregister() {
        let registry = TypeRegistry::new();
        let globals = GlobalMembers::new();

        globals.register("a", item_of(&registry, PrimitiveKind::String));
        globals.register("b", item_of(&registry, PrimitiveKind::Int32));

        let found = globals
            .resolve(|item| is_kind(item, &registry, PrimitiveKind::String))
            .unwrap();
        assert!(is_kind(&found, &registry, PrimitiveKind::String));
        assert!(globals.resolve(|_| false).is_none());

        assert!(globals.unregister("a"));
        assert!(!globals.unregister("a"));
        assert_eq!(globals.len(), 1);
        globals.clear();
        assert!(globals.is_empty());
    }
}
