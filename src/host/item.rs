//! The script-visible wrapper of host objects, types and values.

use std::fmt;

use crate::{
    access::HostItemFlags,
    events::{EventConnection, EventSource},
    typesystem::{HostTypeRc, NamespaceNode},
    value::{HostArray, HostObjectRef, HostValue},
};

/// An event reached through a host item (`item.Changed`), ready to be connected
#[derive(Clone, Debug)]
pub struct EventSite {
    /// The host event
    pub source: EventSource,
    /// Full name of the type declaring the event
    pub declaring: String,
}

/// What a [`HostItem`] refers to
#[derive(Clone, Debug)]
pub enum HostTarget {
    /// A host object, by reference
    Object(HostObjectRef),
    /// A host type; member access reaches static members
    Type(HostTypeRc),
    /// An enum or struct value, by value
    Value(HostValue),
    /// A host array, by reference
    Array(HostArray),
    /// A namespace node of the host type collection
    Namespace(NamespaceNode),
    /// A host event
    Event(EventSite),
    /// A connection created by connecting a script callable to an event
    Connection(EventConnection),
}

/// A host object, type or value as seen by script code.
///
/// Items created implicitly while marshaling carry [`HostItemFlags::DEFAULT`]; named bindings
/// carry the flags they were bound with. Cloning an item never copies the object it refers to.
#[derive(Clone, Debug)]
pub struct HostItem {
    target: HostTarget,
    flags: HostItemFlags,
}

impl HostItem {
    /// Wrap `target` with `flags`
    #[must_use]
    pub fn new(target: HostTarget, flags: HostItemFlags) -> Self {
        HostItem { target, flags }
    }

    /// Wrap a reference-like or aggregate host value.
    ///
    /// Returns `None` for scalars, strings, null and script values, which cross the boundary
    /// as native script values instead.
    #[must_use]
    pub fn from_value(value: HostValue) -> Option<Self> {
        let target = match value {
            HostValue::Object(object) => HostTarget::Object(object),
            HostValue::Array(array) => HostTarget::Array(array),
            HostValue::Type(ty) => HostTarget::Type(ty),
            value @ (HostValue::Enum(_) | HostValue::Struct(_)) => HostTarget::Value(value),
            _ => return None,
        };

        Some(HostItem::new(target, HostItemFlags::DEFAULT))
    }

    /// An item for the host type `ty`
    #[must_use]
    pub fn for_type(ty: HostTypeRc, flags: HostItemFlags) -> Self {
        HostItem::new(HostTarget::Type(ty), flags)
    }

    /// An item for the namespace `node`
    #[must_use]
    pub fn namespace(node: NamespaceNode, flags: HostItemFlags) -> Self {
        HostItem::new(HostTarget::Namespace(node), flags)
    }

    /// The wrapped target
    #[must_use]
    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub(crate) fn target_mut(&mut self) -> &mut HostTarget {
        &mut self.target
    }

    /// Access flags of this item
    #[must_use]
    pub fn flags(&self) -> HostItemFlags {
        self.flags
    }

    /// The same target with other flags
    #[must_use]
    pub fn with_flags(mut self, flags: HostItemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The host value this item carries; `None` for namespaces, events and connections
    #[must_use]
    pub fn to_host_value(&self) -> Option<HostValue> {
        match &self.target {
            HostTarget::Object(object) => Some(HostValue::Object(object.clone())),
            HostTarget::Type(ty) => Some(HostValue::Type(ty.clone())),
            HostTarget::Value(value) => Some(value.clone()),
            HostTarget::Array(array) => Some(HostValue::Array(array.clone())),
            HostTarget::Namespace(_) | HostTarget::Event(_) | HostTarget::Connection(_) => None,
        }
    }

    /// Name of the host type of the target
    #[must_use]
    pub fn type_name(&self) -> String {
        match &self.target {
            HostTarget::Object(object) => object.host_type().fullname(),
            HostTarget::Type(_) => "System.Type".to_string(),
            HostTarget::Value(value) => value.describe(),
            HostTarget::Array(array) => array.type_name(),
            HostTarget::Namespace(_) => "Namespace".to_string(),
            HostTarget::Event(_) => "Event".to_string(),
            HostTarget::Connection(_) => "EventConnection".to_string(),
        }
    }

    /// `true` if both items refer to the same object, type, namespace, event or connection,
    /// or carry equal values
    #[must_use]
    pub fn is_same(&self, other: &HostItem) -> bool {
        match (&self.target, &other.target) {
            (HostTarget::Object(_), HostTarget::Object(_))
            | (HostTarget::Type(_), HostTarget::Type(_))
            | (HostTarget::Value(_), HostTarget::Value(_))
            | (HostTarget::Array(_), HostTarget::Array(_)) => {
                self.to_host_value() == other.to_host_value()
            }
            (HostTarget::Namespace(a), HostTarget::Namespace(b)) => a == b,
            (HostTarget::Event(a), HostTarget::Event(b)) => a.source.is_same(&b.source),
            (HostTarget::Connection(a), HostTarget::Connection(b)) => a.is_same(b),
            _ => false,
        }
    }

    /// Display form, as returned by `ToString()`
    #[must_use]
    pub fn display(&self) -> String {
        match &self.target {
            HostTarget::Object(object) => object.to_display(),
            HostTarget::Type(ty) => ty.fullname(),
            HostTarget::Value(value) => value.to_string(),
            HostTarget::Array(array) => array.type_name(),
            HostTarget::Namespace(node) => node.to_string(),
            HostTarget::Event(site) => format!("{}.{}", site.declaring, site.source.name()),
            HostTarget::Connection(connection) => {
                format!("EventConnection({})", connection.source().name())
            }
        }
    }
}

impl fmt::Display for HostItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry};
    use crate::value::{EnumValue, StructValue};

    #[test]
    fn test_from_value_rejects_scalars() {
        assert!(HostItem::from_value(HostValue::I32(1)).is_none());
        assert!(HostItem::from_value(HostValue::String("x".into())).is_none());
        assert!(HostItem::from_value(HostValue::Null).is_none());
    }

    #[test]
    fn test_value_items_compare_by_value() {
        let registry = TypeRegistry::new();
        let day = registry
            .define(TypeBuilder::enumeration("Demo", "Day").enum_value("Friday", 5))
            .unwrap();
        let size = registry
            .define(TypeBuilder::structure("Demo", "Size").field("W", crate::typesystem::ParamShape::Int32))
            .unwrap();

        let a = HostItem::from_value(HostValue::Enum(EnumValue::new(&day, 5))).unwrap();
        let b = HostItem::from_value(HostValue::Enum(EnumValue::new(&day, 5))).unwrap();
        assert!(a.is_same(&b));
        assert_eq!(a.display(), "Friday");
        assert_eq!(a.type_name(), "Demo.Day");

        let s = HostItem::from_value(HostValue::Struct(StructValue::default_of(&size))).unwrap();
        assert!(!s.is_same(&a));
        assert_eq!(s.display(), "Demo.Size");
    }

    #[test]
    fn test_array_and_type_items() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::Int32);
        let array = HostArray::new(int.clone(), &[2, 2]).unwrap();

        let first = HostItem::from_value(HostValue::Array(array.clone())).unwrap();
        let second = HostItem::from_value(HostValue::Array(array)).unwrap();
        assert!(first.is_same(&second));
        assert_eq!(first.type_name(), "System.Int32[,]");

        let ty = HostItem::for_type(int, HostItemFlags::PRIVATE_ACCESS);
        assert_eq!(ty.display(), "System.Int32");
        assert_eq!(ty.flags(), HostItemFlags::PRIVATE_ACCESS);
        assert!(!ty.is_same(&first));

        let ns = HostItem::namespace(NamespaceNode::new("System"), HostItemFlags::DEFAULT);
        assert!(ns.to_host_value().is_none());
        assert_eq!(ns.type_name(), "Namespace");
    }
}
