//! Host-side values and the host object capability trait.
//!
//! # Key Types
//! - [`HostValue`]: Everything the host can hand to, or receive from, a script
//! - [`HostObject`]: Capability trait of reference-like host objects
//! - [`HostArray`]: Rank-N array with reference semantics
//! - [`EnumValue`], [`StructValue`]: Value-semantics aggregates
//!
//! # Equality
//!
//! [`HostValue`] equality follows host semantics: scalars, enums and structs compare by
//! value, objects and arrays by reference identity, types by token.

mod array;

use std::{any::Any, fmt, sync::Arc};

use crate::typesystem::{HostTypeRc, ParamShape, PrimitiveKind, TypeFlavor};

pub use array::HostArray;

/// Capability trait of reference-like host objects.
///
/// Everything a script can do with an object goes through the member descriptors of
/// [`HostObject::host_type`]; the implementation itself only needs to expose itself for
/// downcasting. Objects with open-ended members (property bags) override the `dynamic_*`
/// methods.
pub trait HostObject: Any + Send + Sync {
    /// Runtime type of the object
    fn host_type(&self) -> HostTypeRc;

    /// The object as [`Any`], for downcasting in member implementations
    fn as_any(&self) -> &dyn Any;

    /// Display form, used by `ToString()`
    fn to_display(&self) -> String {
        self.host_type().fullname()
    }

    /// Value of a member not described by the type, `None` if absent
    fn dynamic_member(&self, _name: &str) -> Option<HostValue> {
        None
    }

    /// Create or replace a member not described by the type; `false` if unsupported
    fn set_dynamic_member(&self, _name: &str, _value: HostValue) -> bool {
        false
    }

    /// Names of the members not described by the type
    fn dynamic_member_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl fmt::Debug for dyn HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.host_type().fullname())
    }
}

/// Shared reference to a host object
pub type HostObjectRef = Arc<dyn HostObject>;

/// A named constant of a host enum
#[derive(Debug, Clone)]
pub struct EnumValue {
    /// The enum type
    pub ty: HostTypeRc,
    /// The underlying integral value
    pub value: i64,
}

impl EnumValue {
    /// Create a value of `ty`
    #[must_use]
    pub fn new(ty: &HostTypeRc, value: i64) -> Self {
        EnumValue {
            ty: ty.clone(),
            value,
        }
    }

    /// Name of the constant, if `value` has one
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.ty.enum_name(self.value)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty.token == other.ty.token && self.value == other.value
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.value),
        }
    }
}

/// A value of a host struct type, holding its storage fields
#[derive(Debug, Clone)]
pub struct StructValue {
    /// The struct type
    pub ty: HostTypeRc,
    /// Storage fields in declaration order
    pub fields: Vec<(String, HostValue)>,
}

impl StructValue {
    /// A value with every storage field set to its default
    #[must_use]
    pub fn default_of(ty: &HostTypeRc) -> Self {
        let fields = ty
            .storage_fields()
            .iter()
            .map(|field| (field.name.clone(), HostValue::default_for_shape(&field.shape)))
            .collect();

        StructValue {
            ty: ty.clone(),
            fields,
        }
    }

    /// Read a field
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Write a field; `false` if the struct has no such field
    pub fn set(&mut self, name: &str, value: HostValue) -> bool {
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Builder form of [`StructValue::set`], for initializing values in host code
    #[must_use]
    pub fn with(mut self, name: &str, value: HostValue) -> Self {
        self.set(name, value);
        self
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty.token == other.ty.token && self.fields == other.fields
    }
}

/// An opaque script value (map, closure, ...) held on the host side
#[derive(Debug, Clone)]
pub struct ScriptValue(pub rhai::Dynamic);

impl ScriptValue {
    /// Internal type name of the script value
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.type_name() == other.0.type_name() && self.0.to_string() == other.0.to_string()
    }
}

/// A host-side value.
#[derive(Debug, Clone)]
pub enum HostValue {
    /// Null reference
    Null,
    /// Result of a void member
    Void,
    /// `System.Boolean`
    Bool(bool),
    /// `System.Char`
    Char(char),
    /// `System.Int32`
    I32(i32),
    /// `System.Int64`
    I64(i64),
    /// `System.Double`
    F64(f64),
    /// `System.String`
    String(String),
    /// Enum constant, by value
    Enum(EnumValue),
    /// Struct, by value
    Struct(StructValue),
    /// Host object, by reference
    Object(HostObjectRef),
    /// Host array, by reference
    Array(HostArray),
    /// Host type
    Type(HostTypeRc),
    /// Script value without host representation
    Script(ScriptValue),
}

impl HostValue {
    /// The default value of `ty`: zero for primitives, constant 0 for enums, default
    /// fields for structs, null for everything else
    #[must_use]
    pub fn default_for(ty: &HostTypeRc) -> HostValue {
        match ty.flavor {
            TypeFlavor::Enum => HostValue::Enum(EnumValue::new(ty, 0)),
            TypeFlavor::Struct => HostValue::Struct(StructValue::default_of(ty)),
            _ => Self::default_for_shape(&ParamShape::of(ty)),
        }
    }

    /// The default value for a parameter or field of `shape`
    #[must_use]
    pub fn default_for_shape(shape: &ParamShape) -> HostValue {
        match shape {
            ParamShape::Bool => HostValue::Bool(false),
            ParamShape::Char => HostValue::Char('\0'),
            ParamShape::Int32 => HostValue::I32(0),
            ParamShape::Int64 => HostValue::I64(0),
            ParamShape::Double => HostValue::F64(0.0),
            ParamShape::Instance(ty) if ty.is_value_type() => Self::default_for(ty),
            _ => HostValue::Null,
        }
    }

    /// `true` for [`HostValue::Null`] and [`HostValue::Void`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null | HostValue::Void)
    }

    /// Wrap a host object
    pub fn object(object: impl HostObject) -> HostValue {
        HostValue::Object(Arc::new(object))
    }

    /// Runtime host type of the value; `None` for null, void, arrays and script values
    #[must_use]
    pub fn host_type(&self, registry: &crate::typesystem::TypeRegistry) -> Option<HostTypeRc> {
        match self {
            HostValue::Null | HostValue::Void | HostValue::Array(_) | HostValue::Script(_) => None,
            HostValue::Bool(_) => Some(registry.primitive(PrimitiveKind::Boolean)),
            HostValue::Char(_) => Some(registry.primitive(PrimitiveKind::Char)),
            HostValue::I32(_) => Some(registry.primitive(PrimitiveKind::Int32)),
            HostValue::I64(_) => Some(registry.primitive(PrimitiveKind::Int64)),
            HostValue::F64(_) => Some(registry.primitive(PrimitiveKind::Double)),
            HostValue::String(_) => Some(registry.primitive(PrimitiveKind::String)),
            HostValue::Enum(value) => Some(value.ty.clone()),
            HostValue::Struct(value) => Some(value.ty.clone()),
            HostValue::Object(object) => Some(object.host_type()),
            HostValue::Type(_) => Some(registry.primitive(PrimitiveKind::Type)),
        }
    }

    /// Short description of the value's kind, used in error messages
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Void => "void".to_string(),
            HostValue::Bool(_) => "System.Boolean".to_string(),
            HostValue::Char(_) => "System.Char".to_string(),
            HostValue::I32(_) => "System.Int32".to_string(),
            HostValue::I64(_) => "System.Int64".to_string(),
            HostValue::F64(_) => "System.Double".to_string(),
            HostValue::String(_) => "System.String".to_string(),
            HostValue::Enum(value) => value.ty.fullname(),
            HostValue::Struct(value) => value.ty.fullname(),
            HostValue::Object(object) => object.host_type().fullname(),
            HostValue::Array(array) => array.type_name(),
            HostValue::Type(_) => "System.Type".to_string(),
            HostValue::Script(value) => format!("script {}", value.type_name()),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) | (HostValue::Void, HostValue::Void) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Char(a), HostValue::Char(b)) => a == b,
            (HostValue::I32(a), HostValue::I32(b)) => a == b,
            (HostValue::I64(a), HostValue::I64(b)) => a == b,
            (HostValue::F64(a), HostValue::F64(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Enum(a), HostValue::Enum(b)) => a == b,
            (HostValue::Struct(a), HostValue::Struct(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => std::ptr::addr_eq(
                Arc::as_ptr(a),
                Arc::as_ptr(b),
            ),
            (HostValue::Array(a), HostValue::Array(b)) => a.is_same(b),
            (HostValue::Type(a), HostValue::Type(b)) => a.token == b.token,
            (HostValue::Script(a), HostValue::Script(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Void => Ok(()),
            HostValue::Bool(value) => write!(f, "{}", value),
            HostValue::Char(value) => write!(f, "{}", value),
            HostValue::I32(value) => write!(f, "{}", value),
            HostValue::I64(value) => write!(f, "{}", value),
            HostValue::F64(value) => write!(f, "{}", value),
            HostValue::String(value) => write!(f, "{}", value),
            HostValue::Enum(value) => write!(f, "{}", value),
            HostValue::Struct(value) => write!(f, "{}", value.ty.fullname()),
            HostValue::Object(object) => write!(f, "{}", object.to_display()),
            HostValue::Array(array) => write!(f, "{}", array.type_name()),
            HostValue::Type(ty) => write!(f, "{}", ty.fullname()),
            HostValue::Script(value) => write!(f, "{}", value.0),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::I32(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::I64(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::F64(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}
