//! Host type system for the interop bridge.
//!
//! This module describes the host types scripts can see: their names, generic state,
//! inheritance and members. Every member carries compile-time-known metadata (access level,
//! modifiers, parameter shapes) plus a closure implementing it, so member dispatch never
//! relies on runtime type punning.
//!
//! # Key Components
//!
//! - [`HostType`]: A host type descriptor (class, struct, enum, interface or primitive)
//! - [`TypeRegistry`]: Central registry of all host types known to a bridge
//! - [`TypeResolver`]: Name/assembly/generic resolution and namespace navigation
//! - [`TypeBuilder`]: Builder for declaring host types
//! - [`Method`], [`Property`], [`Indexer`], [`EventMember`]: Member descriptors
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hostbridge::typesystem::{TypeBuilder, TypeRegistry, TypeResolver};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! registry.define(TypeBuilder::class("Demo", "List").assembly("Demo.Collections").generic(1))?;
//!
//! let resolver = TypeResolver::new(registry.clone());
//! let open = resolver.resolve("List", &[], None)?;
//! let int = registry.get_by_fullname("System.Int32").unwrap();
//! let closed = resolver.close(&open, &[int])?;
//! assert_eq!(closed.fullname(), "Demo.List<System.Int32>");
//! # Ok::<(), hostbridge::Error>(())
//! ```

mod base;
mod builder;
mod members;
mod registry;
mod resolver;

use std::{fmt, sync::Arc};

pub use base::{GenericState, PrimitiveKind, TypeFlavor, TypeToken};
pub use builder::TypeBuilder;
pub use members::{
    EventAccessor, EventMember, EventMemberRc, Indexer, IndexerRc, Invocation, MemberAccess,
    MemberMatch, MemberModifiers, MemberTable, Method, MethodBody, MethodRc, ParamShape,
    Parameter, Property, PropertyRc, SetterBody, CONSTRUCTOR_NAME, MEMBER_ACCESS_MASK,
};
pub use registry::TypeRegistry;
pub use resolver::{NamespaceNode, ResolvedChild, TypeResolver};

/// Reference to a `HostType`
pub type HostTypeRc = Arc<HostType>;

/// A host type descriptor.
///
/// Descriptors are immutable once registered, apart from their append-only member lists.
/// Closed generic instantiations share the member table of their definition.
pub struct HostType {
    /// Registry-assigned identity
    pub token: TypeToken,
    /// Namespace, may be empty
    pub namespace: String,
    /// Simple name, without generic arity
    pub name: String,
    /// Name of the assembly declaring the type
    pub assembly: String,
    /// Kind of the type
    pub flavor: TypeFlavor,
    /// Generic state
    pub generic: GenericState,
    /// Base type, `None` only for `System.Object` and interfaces
    pub base: Option<HostTypeRc>,
    /// Outer type for nested types
    pub declaring: Option<HostTypeRc>,
    /// Implemented interfaces
    pub interfaces: Vec<HostTypeRc>,
    /// Set for the registry's built-in primitives
    pub primitive: Option<PrimitiveKind>,
    pub(crate) members: Arc<MemberTable>,
}

impl HostType {
    /// Create a closed instantiation of `definition` over `arguments`
    pub(crate) fn instantiate(
        definition: &HostTypeRc,
        arguments: Vec<HostTypeRc>,
        token: TypeToken,
    ) -> HostType {
        HostType {
            token,
            namespace: definition.namespace.clone(),
            name: definition.name.clone(),
            assembly: definition.assembly.clone(),
            flavor: definition.flavor,
            generic: GenericState::Closed {
                definition: definition.clone(),
                arguments,
            },
            base: definition.base.clone(),
            declaring: definition.declaring.clone(),
            interfaces: definition.interfaces.clone(),
            primitive: None,
            members: definition.members.clone(),
        }
    }

    /// Full name without type arguments, nested types joined with `+`
    #[must_use]
    pub fn definition_name(&self) -> String {
        if let Some(outer) = &self.declaring {
            return format!("{}+{}", outer.definition_name(), self.name);
        }

        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Full name; closed generic types list their type arguments (`Ns.List<System.Int32>`)
    #[must_use]
    pub fn fullname(&self) -> String {
        match &self.generic {
            GenericState::Closed { arguments, .. } => {
                let arguments: Vec<String> = arguments.iter().map(|a| a.fullname()).collect();
                format!("{}<{}>", self.definition_name(), arguments.join(","))
            }
            _ => self.definition_name(),
        }
    }

    /// Token of the generic definition, or of this type if it is not an instantiation
    #[must_use]
    pub fn definition_token(&self) -> TypeToken {
        match &self.generic {
            GenericState::Closed { definition, .. } => definition.token,
            _ => self.token,
        }
    }

    /// `true` if both descriptors originate from the same definition
    #[must_use]
    pub fn is_same_definition(&self, other: &HostType) -> bool {
        self.definition_token() == other.definition_token()
    }

    /// `true` for generic definitions whose parameters are still unresolved
    #[must_use]
    pub fn is_open_generic(&self) -> bool {
        matches!(self.generic, GenericState::Open { .. })
    }

    /// Type arguments of a closed instantiation, empty otherwise
    #[must_use]
    pub fn type_arguments(&self) -> &[HostTypeRc] {
        match &self.generic {
            GenericState::Closed { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// `true` for structs, enums and value primitives
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self.primitive {
            Some(kind) => kind.is_value_type(),
            None => matches!(self.flavor, TypeFlavor::Struct | TypeFlavor::Enum),
        }
    }

    /// `true` for the built-in `kind`
    #[must_use]
    pub fn is_primitive(&self, kind: PrimitiveKind) -> bool {
        self.primitive == Some(kind)
    }

    /// `true` if `self` is `other`, derives from it, or implements it
    #[must_use]
    pub fn derives_from(&self, other: &HostType) -> bool {
        if self.token == other.token {
            return true;
        }

        if other.flavor == TypeFlavor::Interface
            && self.interfaces.iter().any(|i| i.derives_from(other))
        {
            return true;
        }

        match &self.base {
            Some(base) => base.derives_from(other),
            None => false,
        }
    }

    /// `true` if a value of type `source` can be used where `self` is expected
    #[must_use]
    pub fn is_assignable_from(&self, source: &HostType) -> bool {
        self.is_primitive(PrimitiveKind::Object) || source.derives_from(self)
    }

    /// `true` if `self` is nested (at any depth) inside `outer`
    #[must_use]
    pub fn is_nested_in(&self, outer: &HostType) -> bool {
        let mut current = self.declaring.clone();
        while let Some(candidate) = current {
            if candidate.is_same_definition(outer) {
                return true;
            }
            current = candidate.declaring.clone();
        }
        false
    }

    /// The members declared by this type itself
    #[must_use]
    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    /// Methods named `name` with the matching static-ness, most derived declarations first.
    ///
    /// Constructors are never returned; use [`HostType::constructors`].
    #[must_use]
    pub fn find_methods(self: &Arc<Self>, name: &str, is_static: bool) -> Vec<MemberMatch<MethodRc>> {
        let mut found = Vec::new();
        let mut current = Some(self.clone());

        while let Some(ty) = current {
            for (_, method) in ty.members.methods.iter() {
                if method.name == name && method.is_static() == is_static && !method.is_constructor()
                {
                    found.push(MemberMatch {
                        declaring: ty.clone(),
                        member: method.clone(),
                    });
                }
            }

            if is_static {
                break;
            }
            current = ty.base.clone();
        }

        found
    }

    /// `true` if any invocable method named `name` exists with the matching static-ness
    #[must_use]
    pub fn has_method(self: &Arc<Self>, name: &str, is_static: bool) -> bool {
        !self.find_methods(name, is_static).is_empty()
    }

    /// The first property named `name`, searching the base chain for instance members
    #[must_use]
    pub fn find_property(
        self: &Arc<Self>,
        name: &str,
        is_static: bool,
    ) -> Option<MemberMatch<PropertyRc>> {
        let mut current = Some(self.clone());

        while let Some(ty) = current {
            for (_, property) in ty.members.properties.iter() {
                if property.name == name && property.is_static() == is_static {
                    return Some(MemberMatch {
                        declaring: ty.clone(),
                        member: property.clone(),
                    });
                }
            }

            if is_static {
                break;
            }
            current = ty.base.clone();
        }

        None
    }

    /// The first event named `name`, searching the base chain for instance members
    #[must_use]
    pub fn find_event(
        self: &Arc<Self>,
        name: &str,
        is_static: bool,
    ) -> Option<MemberMatch<EventMemberRc>> {
        let mut current = Some(self.clone());

        while let Some(ty) = current {
            for (_, event) in ty.members.events.iter() {
                if event.name == name && event.is_static() == is_static {
                    return Some(MemberMatch {
                        declaring: ty.clone(),
                        member: event.clone(),
                    });
                }
            }

            if is_static {
                break;
            }
            current = ty.base.clone();
        }

        None
    }

    /// The default indexer, searching the base chain
    #[must_use]
    pub fn find_indexer(self: &Arc<Self>) -> Option<MemberMatch<IndexerRc>> {
        let mut current = Some(self.clone());

        while let Some(ty) = current {
            if let Some(indexer) = &ty.members.indexer {
                return Some(MemberMatch {
                    declaring: ty.clone(),
                    member: indexer.clone(),
                });
            }
            current = ty.base.clone();
        }

        None
    }

    /// Constructors declared by this type
    #[must_use]
    pub fn constructors(&self) -> Vec<MethodRc> {
        self.members
            .methods
            .iter()
            .filter(|(_, method)| method.is_constructor())
            .map(|(_, method)| method.clone())
            .collect()
    }

    /// Storage fields of a struct type, in declaration order
    #[must_use]
    pub fn storage_fields(&self) -> Vec<PropertyRc> {
        self.members
            .properties
            .iter()
            .filter(|(_, property)| property.is_storage() && !property.is_static())
            .map(|(_, property)| property.clone())
            .collect()
    }

    /// Value of the enum constant `name`
    #[must_use]
    pub fn enum_value(&self, name: &str) -> Option<i64> {
        self.members
            .enum_values
            .iter()
            .find(|(constant, _)| constant == name)
            .map(|(_, value)| *value)
    }

    /// Name of the enum constant with `value`
    #[must_use]
    pub fn enum_name(&self, value: i64) -> Option<&str> {
        self.members
            .enum_values
            .iter()
            .find(|(_, constant)| *constant == value)
            .map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostType")
            .field("token", &self.token)
            .field("fullname", &self.fullname())
            .field("flavor", &self.flavor)
            .field("assembly", &self.assembly)
            .finish()
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}
