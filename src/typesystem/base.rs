//! Basic building blocks of host type descriptors.
//!
//! # Key Types
//! - [`TypeToken`]: Registry-assigned identity of a type descriptor
//! - [`TypeFlavor`]: The kind of host type (class, struct, enum, ...)
//! - [`PrimitiveKind`]: The built-in types every registry provides
//! - [`GenericState`]: Open/closed state of generic types

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::typesystem::HostTypeRc;

/// Identity of a type descriptor inside one [`crate::typesystem::TypeRegistry`].
///
/// Tokens are assigned sequentially; primitives occupy the first slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeToken(u32);

impl TypeToken {
    /// Create a token from its raw value
    #[must_use]
    pub fn new(value: u32) -> Self {
        TypeToken(value)
    }

    /// The raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// The kind of a host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TypeFlavor {
    /// Reference type with identity
    Class,
    /// Value aggregate, marshaled by value
    Struct,
    /// Named integral constants, marshaled by value
    Enum,
    /// Contract implemented by classes and structs
    Interface,
    /// One of the built-in [`PrimitiveKind`] types
    Primitive,
}

/// The built-in types every registry is seeded with.
///
/// The discriminant doubles as the token value of the primitive inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum PrimitiveKind {
    /// `System.Object`, the root of the hierarchy
    Object,
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.Int32`
    Int32,
    /// `System.Int64`
    Int64,
    /// `System.Double`
    Double,
    /// `System.String`
    String,
    /// `System.Type`
    Type,
}

impl PrimitiveKind {
    /// The simple name of the primitive inside the `System` namespace
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Object => "Object",
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::String => "String",
            PrimitiveKind::Type => "Type",
        }
    }

    /// `true` if values of this primitive are copied rather than referenced
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Object | PrimitiveKind::String | PrimitiveKind::Type
        )
    }
}

/// Generic state of a type descriptor.
///
/// Open definitions turn into closed instantiations by applying type arguments through
/// [`crate::typesystem::TypeResolver::close`]; there is no way back.
#[derive(Debug, Clone)]
pub enum GenericState {
    /// Not a generic type
    NonGeneric,
    /// Generic definition with unresolved parameters
    Open {
        /// Number of generic parameters
        arity: usize,
    },
    /// Instantiation of a generic definition
    Closed {
        /// The open definition this type was created from
        definition: HostTypeRc,
        /// The applied type arguments, in parameter order
        arguments: Vec<HostTypeRc>,
    },
}

impl GenericState {
    /// Number of generic parameters, 0 for non-generic types
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            GenericState::NonGeneric => 0,
            GenericState::Open { arity } => *arity,
            GenericState::Closed { arguments, .. } => arguments.len(),
        }
    }
}
