//! Per-engine bridge state.

use std::{collections::HashMap, sync::Arc, sync::RwLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    access::{AccessContext, GlobalMembers, HostItemFlags},
    events::EventConnection,
    host::HostItem,
    typesystem::{HostTypeRc, TypeRegistry, TypeResolver},
};

/// Everything the bridge keeps per engine.
///
/// The type registry may be shared between engines; bound items, the global-members registry,
/// the access context and the event connections created by scripts belong to exactly one
/// engine.
pub struct BridgeContext {
    registry: Arc<TypeRegistry>,
    resolver: TypeResolver,
    items: RwLock<HashMap<String, HostItem>>,
    globals: GlobalMembers,
    access: AccessContext,
    connections: Mutex<Vec<EventConnection>>,
    max_array_size: usize,
}

impl BridgeContext {
    /// Create an empty context resolving types from `registry`
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        BridgeContext {
            resolver: TypeResolver::new(registry.clone()),
            registry,
            items: RwLock::new(HashMap::new()),
            globals: GlobalMembers::new(),
            access: AccessContext::new(),
            connections: Mutex::new(Vec::new()),
            max_array_size: 0,
        }
    }

    /// Cap the element count of host arrays created from script; 0 = unlimited
    #[must_use]
    pub fn with_max_array_size(mut self, max: usize) -> Self {
        self.max_array_size = max;
        self
    }

    /// Largest host array scripts may create, 0 = unlimited
    #[must_use]
    pub fn max_array_size(&self) -> usize {
        self.max_array_size
    }

    /// The type registry
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The type resolver
    #[must_use]
    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Items whose members are exposed unqualified
    #[must_use]
    pub fn globals(&self) -> &GlobalMembers {
        &self.globals
    }

    /// The engine-wide access context
    #[must_use]
    pub fn access_context(&self) -> &AccessContext {
        &self.access
    }

    /// The current access context type
    #[must_use]
    pub fn context_type(&self) -> Option<HostTypeRc> {
        self.access.get()
    }

    /// Bind `item` under `name`, replacing an earlier binding of the same name
    pub fn bind(&self, name: &str, item: HostItem) {
        if item.flags().contains(HostItemFlags::GLOBAL_MEMBERS) {
            self.globals.register(name, item.clone());
        } else {
            self.globals.unregister(name);
        }

        debug!("bound host item '{}' ({}, {:?})", name, item.type_name(), item.flags());
        write_lock!(self.items).insert(name.to_string(), item);
    }

    /// Remove the binding `name`; `false` if there was none
    pub fn unbind(&self, name: &str) -> bool {
        self.globals.unregister(name);
        let removed = write_lock!(self.items).remove(name).is_some();
        if removed {
            debug!("unbound host item '{}'", name);
        }
        removed
    }

    /// The item bound under `name`
    #[must_use]
    pub fn item(&self, name: &str) -> Option<HostItem> {
        read_lock!(self.items).get(name).cloned()
    }

    /// Names of all bound items, sorted
    #[must_use]
    pub fn item_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock!(self.items).keys().cloned().collect();
        names.sort();
        names
    }

    /// Remember a connection created by script code
    pub fn track_connection(&self, connection: EventConnection) {
        let mut connections = self.connections.lock();
        connections.retain(EventConnection::is_connected);
        connections.push(connection);
    }

    /// Number of script-created connections that are still connected
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|connection| connection.is_connected())
            .count()
    }

    /// Disconnect every connection created by script code, returns how many were connected
    pub fn disconnect_all(&self) -> usize {
        let connections: Vec<EventConnection> = self.connections.lock().drain(..).collect();
        connections
            .iter()
            .filter(|connection| connection.disconnect())
            .count()
    }

    /// Drop every binding, global member and script-created connection
    pub fn clear(&self) {
        let disconnected = self.disconnect_all();
        self.globals.clear();
        write_lock!(self.items).clear();
        self.access.set(None);
        debug!("cleared bridge context ({} connections closed)", disconnected);
    }
}
