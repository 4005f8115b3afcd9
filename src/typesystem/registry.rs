//! Central host type registry.
//!
//! This module provides the [`TypeRegistry`], a thread-safe registry of every host type a
//! bridge knows about. Scripts never see types that are not registered here; the
//! [`crate::typesystem::TypeResolver`] answers all name lookups from its indices.
//!
//! # Registry Architecture
//!
//! The registry uses a multi-index approach for efficient type lookup:
//!
//! - **Token-based lookup**: Primary index using registry-assigned tokens
//! - **Name-based lookup**: Secondary indices for full names, simple names and namespaces
//! - **Assembly lookup**: Types grouped by their declaring assembly, used for assembly hints
//! - **Instantiation cache**: Closed generic types keyed by definition and type arguments
//!
//! # Thread Safety
//!
//! - Lock-free data structures for primary storage (`SkipMap`)
//! - Concurrent hash maps for indices (`DashMap`)
//! - Atomic operations for token generation
//!
//! # Examples
//!
//! ```rust,no_run
//! use hostbridge::typesystem::{TypeBuilder, TypeRegistry};
//!
//! let registry = TypeRegistry::new();
//! let point = registry.define(TypeBuilder::structure("Drawing", "Point").assembly("Drawing"))?;
//!
//! assert!(registry.get_by_fullname("Drawing.Point").is_some());
//! assert!(registry.has_namespace("Drawing"));
//! assert_eq!(registry.get_by_assembly("Drawing").len(), 1);
//! # Ok::<(), hostbridge::Error>(())
//! ```

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::{DashMap, DashSet};
use strum::{EnumCount, IntoEnumIterator};
use tracing::debug;

use crate::{
    typesystem::{
        GenericState, HostType, HostTypeRc, MemberTable, PrimitiveKind, TypeBuilder, TypeFlavor,
        TypeToken,
    },
    Result,
};

/// Assembly the built-in primitives are attributed to
pub const CORE_ASSEMBLY: &str = "System.Private.CoreLib";

/// Central registry of all host types known to a bridge.
///
/// One registry may be shared between any number of engines; per-engine state (host items,
/// access context, global members) lives in the engine's bridge context instead.
pub struct TypeRegistry {
    /// Primary storage
    types: SkipMap<TypeToken, HostTypeRc>,
    /// Next token to hand out
    next_token: AtomicU32,
    /// Primitive descriptors, indexed by [`PrimitiveKind`]
    primitives: Vec<HostTypeRc>,
    /// Full name -> tokens (generic definitions of different arity share a name)
    types_by_fullname: DashMap<String, Vec<TypeToken>>,
    /// Simple name -> tokens
    types_by_name: DashMap<String, Vec<TypeToken>>,
    /// Namespace -> tokens
    types_by_namespace: DashMap<String, Vec<TypeToken>>,
    /// Assembly -> tokens
    types_by_assembly: DashMap<String, Vec<TypeToken>>,
    /// Every namespace and each of its dotted prefixes
    namespaces: DashSet<String>,
    /// (definition, type arguments) -> closed instantiation
    instantiations: DashMap<(TypeToken, Vec<TypeToken>), HostTypeRc>,
}

impl TypeRegistry {
    /// Create a registry seeded with the built-in primitive types
    #[must_use]
    pub fn new() -> Self {
        let registry = TypeRegistry {
            types: SkipMap::new(),
            next_token: AtomicU32::new(PrimitiveKind::COUNT as u32),
            primitives: Self::build_primitives(),
            types_by_fullname: DashMap::new(),
            types_by_name: DashMap::new(),
            types_by_namespace: DashMap::new(),
            types_by_assembly: DashMap::new(),
            namespaces: DashSet::new(),
            instantiations: DashMap::new(),
        };

        for primitive in &registry.primitives {
            registry.register_type_internal(primitive);
        }

        registry
    }

    fn build_primitives() -> Vec<HostTypeRc> {
        let mut primitives: Vec<HostTypeRc> = Vec::with_capacity(PrimitiveKind::COUNT);

        for kind in PrimitiveKind::iter() {
            let base = primitives.first().cloned();
            primitives.push(Arc::new(HostType {
                token: TypeToken::new(kind as u32),
                namespace: "System".to_string(),
                name: kind.name().to_string(),
                assembly: CORE_ASSEMBLY.to_string(),
                flavor: TypeFlavor::Primitive,
                generic: GenericState::NonGeneric,
                base,
                declaring: None,
                interfaces: Vec::new(),
                primitive: Some(kind),
                members: Arc::new(MemberTable::new()),
            }));
        }

        primitives
    }

    fn next_token(&self) -> TypeToken {
        TypeToken::new(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    fn register_type_internal(&self, type_rc: &HostTypeRc) {
        self.types.insert(type_rc.token, type_rc.clone());

        self.types_by_fullname
            .entry(type_rc.fullname())
            .or_default()
            .push(type_rc.token);

        self.types_by_name
            .entry(type_rc.name.clone())
            .or_default()
            .push(type_rc.token);

        if !type_rc.namespace.is_empty() {
            self.types_by_namespace
                .entry(type_rc.namespace.clone())
                .or_default()
                .push(type_rc.token);

            let mut prefix = String::new();
            for segment in type_rc.namespace.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(segment);
                self.namespaces.insert(prefix.clone());
            }
        }

        if !type_rc.assembly.is_empty() {
            self.types_by_assembly
                .entry(type_rc.assembly.clone())
                .or_default()
                .push(type_rc.token);
        }
    }

    fn resolve_tokens(&self, tokens: &[TypeToken]) -> Vec<HostTypeRc> {
        tokens
            .iter()
            .filter_map(|token| self.types.get(token).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Register the type described by `builder`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if a type with the same full name and generic
    /// arity is already registered.
    pub fn define(&self, builder: TypeBuilder) -> Result<HostTypeRc> {
        let fullname = builder.definition_name();
        let arity = builder.arity();

        if self
            .get_all_by_fullname(&fullname)
            .iter()
            .any(|existing| existing.generic.arity() == arity)
        {
            return Err(resolution_error!(fullname, "type is already defined"));
        }

        let type_rc = Arc::new(builder.build(self.next_token(), self));
        self.register_type_internal(&type_rc);

        debug!(
            "registered host type {} ({}, token {})",
            type_rc.fullname(),
            type_rc.flavor,
            type_rc.token
        );
        Ok(type_rc)
    }

    /// Return the closed instantiation of `definition` over `arguments`, creating it once.
    ///
    /// Validation happens in [`crate::typesystem::TypeResolver::close`]; instantiations are
    /// reachable by token but not indexed by name.
    pub(crate) fn instantiation(
        &self,
        definition: &HostTypeRc,
        arguments: &[HostTypeRc],
    ) -> HostTypeRc {
        let key = (
            definition.token,
            arguments.iter().map(|argument| argument.token).collect::<Vec<_>>(),
        );

        self.instantiations
            .entry(key)
            .or_insert_with(|| {
                let closed = Arc::new(HostType::instantiate(
                    definition,
                    arguments.to_vec(),
                    self.next_token(),
                ));
                self.types.insert(closed.token, closed.clone());
                debug!("closed generic {} (token {})", closed.fullname(), closed.token);
                closed
            })
            .value()
            .clone()
    }

    /// The descriptor of a built-in primitive
    #[must_use]
    pub fn primitive(&self, kind: PrimitiveKind) -> HostTypeRc {
        self.primitives[kind as usize].clone()
    }

    /// The root of the hierarchy, `System.Object`
    #[must_use]
    pub fn object(&self) -> HostTypeRc {
        self.primitive(PrimitiveKind::Object)
    }

    /// Get a type by its token
    #[must_use]
    pub fn get(&self, token: &TypeToken) -> Option<HostTypeRc> {
        self.types.get(token).map(|entry| entry.value().clone())
    }

    /// Get the non-generic type, or the first registered definition, with this full name
    #[must_use]
    pub fn get_by_fullname(&self, fullname: &str) -> Option<HostTypeRc> {
        let candidates = self.get_all_by_fullname(fullname);
        candidates
            .iter()
            .find(|candidate| candidate.generic.arity() == 0)
            .or_else(|| candidates.first())
            .cloned()
    }

    /// Get every type registered under this full name
    #[must_use]
    pub fn get_all_by_fullname(&self, fullname: &str) -> Vec<HostTypeRc> {
        self.types_by_fullname
            .get(fullname)
            .map(|tokens| self.resolve_tokens(&tokens))
            .unwrap_or_default()
    }

    /// Get all types with a specific simple name across all namespaces
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Vec<HostTypeRc> {
        self.types_by_name
            .get(name)
            .map(|tokens| self.resolve_tokens(&tokens))
            .unwrap_or_default()
    }

    /// Get all types declared directly in `namespace`
    #[must_use]
    pub fn get_by_namespace(&self, namespace: &str) -> Vec<HostTypeRc> {
        self.types_by_namespace
            .get(namespace)
            .map(|tokens| self.resolve_tokens(&tokens))
            .unwrap_or_default()
    }

    /// Get all types declared by `assembly`
    #[must_use]
    pub fn get_by_assembly(&self, assembly: &str) -> Vec<HostTypeRc> {
        self.types_by_assembly
            .get(assembly)
            .map(|tokens| self.resolve_tokens(&tokens))
            .unwrap_or_default()
    }

    /// `true` if any type was registered under `assembly`
    #[must_use]
    pub fn has_assembly(&self, assembly: &str) -> bool {
        self.types_by_assembly.contains_key(assembly)
    }

    /// `true` if `namespace` (or a namespace below it) contains registered types
    #[must_use]
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    /// Returns the total number of types, including primitives and instantiations
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the registry contains no types
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Get all types in token order
    #[must_use]
    pub fn all_types(&self) -> Vec<HostTypeRc> {
        self.types.iter().map(|entry| entry.value().clone()).collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_primitives() {
        let registry = TypeRegistry::new();

        let bool_type = registry.primitive(PrimitiveKind::Boolean);
        assert_eq!(bool_type.name, "Boolean");
        assert_eq!(bool_type.namespace, "System");
        assert!(bool_type.is_value_type());

        let string_type = registry.get_by_fullname("System.String").unwrap();
        assert_eq!(string_type.token, registry.primitive(PrimitiveKind::String).token);
        assert!(!string_type.is_value_type());

        let object = registry.object();
        assert!(object.base.is_none());
        assert!(string_type.derives_from(&object));
        assert_eq!(registry.len(), PrimitiveKind::COUNT);
    }

    #[test]
    fn test_define_and_lookup() {
        let registry = TypeRegistry::new();

        let point = registry
            .define(TypeBuilder::structure("System.Drawing", "Point").assembly("Drawing"))
            .unwrap();

        assert_eq!(point.fullname(), "System.Drawing.Point");
        assert!(point.is_value_type());
        assert_eq!(registry.get_by_name("Point").len(), 1);
        assert_eq!(registry.get_by_namespace("System.Drawing").len(), 1);
        assert!(registry.has_namespace("System"));
        assert!(registry.has_namespace("System.Drawing"));
        assert!(!registry.has_namespace("System.Draw"));
        assert!(registry.has_assembly("Drawing"));
        assert_eq!(registry.get(&point.token).unwrap().name, "Point");
    }

    #[test]
    fn test_duplicate_definition() {
        let registry = TypeRegistry::new();

        registry.define(TypeBuilder::class("Demo", "List")).unwrap();
        registry
            .define(TypeBuilder::class("Demo", "List").generic(1))
            .unwrap();

        let result = registry.define(TypeBuilder::class("Demo", "List"));
        assert!(matches!(result, Err(crate::Error::TypeResolution { .. })));
        assert_eq!(registry.get_all_by_fullname("Demo.List").len(), 2);
        assert_eq!(registry.get_by_fullname("Demo.List").unwrap().generic.arity(), 0);
    }

    #[test]
    fn test_multiple_types_with_same_name() {
        let registry = TypeRegistry::new();

        let first = registry.define(TypeBuilder::class("A", "Point")).unwrap();
        let second = registry.define(TypeBuilder::class("B", "Point")).unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(registry.get_by_name("Point").len(), 2);
    }

    #[test]
    fn test_instantiation_cache() {
        let registry = TypeRegistry::new();
        let list = registry
            .define(TypeBuilder::class("Demo", "List").generic(1))
            .unwrap();
        let int = registry.primitive(PrimitiveKind::Int32);

        let first = registry.instantiation(&list, &[int.clone()]);
        let second = registry.instantiation(&list, &[int]);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.fullname(), "Demo.List<System.Int32>");
        assert!(first.is_same_definition(&list));
        assert!(registry.get(&first.token).is_some());
        assert_eq!(registry.get_all_by_fullname("Demo.List").len(), 1);
    }
}
