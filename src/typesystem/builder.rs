//! Builder for host type declarations.
//!
//! This module provides the [`TypeBuilder`] struct, a fluent API for declaring classes,
//! structs, enums and interfaces together with their members. A builder is handed to
//! [`TypeRegistry::define`], which assigns the token and indexes the finished type.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hostbridge::typesystem::{Method, ParamShape, Property, TypeBuilder, TypeRegistry};
//! use hostbridge::HostValue;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let counter = registry.define(
//!     TypeBuilder::class("Demo", "Counter")
//!         .assembly("Demo")
//!         .constructor(Method::constructor(|_inv| Ok(HostValue::Null)))
//!         .property(Property::new("Count", ParamShape::Int32).getter(|_| Ok(HostValue::I32(0)))),
//! )?;
//! assert_eq!(counter.fullname(), "Demo.Counter");
//! # Ok::<(), hostbridge::Error>(())
//! ```

use std::sync::Arc;

use crate::typesystem::{
    EventMember, GenericState, HostType, HostTypeRc, Indexer, MemberTable, Method, ParamShape,
    Property, TypeFlavor, TypeRegistry, TypeToken,
};

/// Provides a fluent API for declaring host types
pub struct TypeBuilder {
    namespace: String,
    name: String,
    assembly: String,
    flavor: TypeFlavor,
    arity: usize,
    base: Option<HostTypeRc>,
    declaring: Option<HostTypeRc>,
    interfaces: Vec<HostTypeRc>,
    members: MemberTable,
}

impl TypeBuilder {
    fn new(flavor: TypeFlavor, namespace: &str, name: &str) -> Self {
        TypeBuilder {
            namespace: namespace.to_string(),
            name: name.to_string(),
            assembly: String::new(),
            flavor,
            arity: 0,
            base: None,
            declaring: None,
            interfaces: Vec::new(),
            members: MemberTable::new(),
        }
    }

    /// Declare a reference type
    ///
    /// ## Arguments
    /// * 'namespace' - The namespace of the type, may be empty
    /// * 'name'      - The simple name of the type
    #[must_use]
    pub fn class(namespace: &str, name: &str) -> Self {
        Self::new(TypeFlavor::Class, namespace, name)
    }

    /// Declare a value aggregate, marshaled by value
    ///
    /// ## Arguments
    /// * 'namespace' - The namespace of the type, may be empty
    /// * 'name'      - The simple name of the type
    #[must_use]
    pub fn structure(namespace: &str, name: &str) -> Self {
        Self::new(TypeFlavor::Struct, namespace, name)
    }

    /// Declare an enumeration
    ///
    /// ## Arguments
    /// * 'namespace' - The namespace of the type, may be empty
    /// * 'name'      - The simple name of the type
    #[must_use]
    pub fn enumeration(namespace: &str, name: &str) -> Self {
        Self::new(TypeFlavor::Enum, namespace, name)
    }

    /// Declare an interface
    ///
    /// ## Arguments
    /// * 'namespace' - The namespace of the type, may be empty
    /// * 'name'      - The simple name of the type
    #[must_use]
    pub fn interface(namespace: &str, name: &str) -> Self {
        Self::new(TypeFlavor::Interface, namespace, name)
    }

    /// Set the declaring assembly
    #[must_use]
    pub fn assembly(mut self, assembly: &str) -> Self {
        self.assembly = assembly.to_string();
        self
    }

    /// Set the base type; defaults to `System.Object` for everything but interfaces
    #[must_use]
    pub fn base(mut self, base: &HostTypeRc) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Nest the type inside `outer`
    #[must_use]
    pub fn nested_in(mut self, outer: &HostTypeRc) -> Self {
        self.declaring = Some(outer.clone());
        self
    }

    /// Add an implemented interface
    #[must_use]
    pub fn implements(mut self, interface: &HostTypeRc) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    /// Make the type a generic definition with `arity` parameters
    #[must_use]
    pub fn generic(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Add a method
    #[must_use]
    pub fn method(self, method: Method) -> Self {
        self.members.add_method(method);
        self
    }

    /// Add a constructor built with [`Method::constructor`]
    #[must_use]
    pub fn constructor(self, constructor: Method) -> Self {
        self.method(constructor)
    }

    /// Add a property
    #[must_use]
    pub fn property(self, property: Property) -> Self {
        self.members.add_property(property);
        self
    }

    /// Add a storage field; struct values carry the field data
    #[must_use]
    pub fn field(self, name: &str, shape: ParamShape) -> Self {
        self.property(Property::new(name, shape))
    }

    /// Add an event
    #[must_use]
    pub fn event(self, event: EventMember) -> Self {
        self.members.add_event(event);
        self
    }

    /// Set the default indexer
    #[must_use]
    pub fn indexer(mut self, indexer: Indexer) -> Self {
        self.members.indexer = Some(Arc::new(indexer));
        self
    }

    /// Add an enum constant
    #[must_use]
    pub fn enum_value(mut self, name: &str, value: i64) -> Self {
        self.members.enum_values.push((name.to_string(), value));
        self
    }

    /// Full name the type will be registered under
    #[must_use]
    pub fn definition_name(&self) -> String {
        let local = match &self.declaring {
            Some(outer) => return format!("{}+{}", outer.definition_name(), self.name),
            None => &self.name,
        };

        if self.namespace.is_empty() {
            local.clone()
        } else {
            format!("{}.{}", self.namespace, local)
        }
    }

    /// Generic arity of the declared type
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Produce the descriptor with the registry-assigned `token`
    pub(crate) fn build(self, token: TypeToken, registry: &TypeRegistry) -> HostType {
        let base = match (self.base, self.flavor) {
            (Some(base), _) => Some(base),
            (None, TypeFlavor::Interface) => None,
            (None, _) => Some(registry.object()),
        };

        let generic = if self.arity > 0 {
            GenericState::Open { arity: self.arity }
        } else {
            GenericState::NonGeneric
        };

        HostType {
            token,
            namespace: self.namespace,
            name: self.name,
            assembly: self.assembly,
            flavor: self.flavor,
            generic,
            base,
            declaring: self.declaring,
            interfaces: self.interfaces,
            primitive: None,
            members: Arc::new(self.members),
        }
    }
}
