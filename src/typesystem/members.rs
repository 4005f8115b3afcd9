//! Member descriptors of host types.
//!
//! Host types expose their members through compile-time-known descriptors: every method,
//! property, indexer and event carries its accessibility, its modifiers, the shapes of its
//! parameters and a closure implementing it. The bridge never inspects host objects beyond
//! these descriptors.
//!
//! # Key Types
//! - [`MemberAccess`], [`MemberModifiers`]: Accessibility and modifier flags
//! - [`ParamShape`]: The host shape a parameter, property or return value expects
//! - [`Method`], [`Property`], [`Indexer`], [`EventMember`]: Member descriptors
//! - [`Invocation`]: Everything a member implementation receives when called
//! - [`MemberTable`]: The members declared by one type

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    events::EventSource,
    host::BridgeContext,
    typesystem::{HostTypeRc, PrimitiveKind},
    value::{HostObject, HostValue, StructValue},
    Error, Result,
};

/// Bitmask for `ACCESS` state extraction
pub const MEMBER_ACCESS_MASK: u32 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Member accessibility
    pub struct MemberAccess: u32 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the declaring type and its nested types
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in the declaring assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the declaring assembly
        const ASSEM = 0x0003;
        /// Accessible only by the declaring type and its sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in the declaring assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
    }
}

impl MemberAccess {
    /// Extract the access level from raw member flags
    #[must_use]
    pub fn from_member_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & MEMBER_ACCESS_MASK)
    }

    /// `true` for [`MemberAccess::PUBLIC`]
    #[must_use]
    pub fn is_public(&self) -> bool {
        *self == MemberAccess::PUBLIC
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Member modifiers
    pub struct MemberModifiers: u32 {
        /// Member belongs to the type, not to an instance
        const STATIC = 0x0010;
        /// Property or field cannot be assigned
        const READ_ONLY = 0x0020;
    }
}

/// The host shape a parameter, property or return value expects.
///
/// Shapes drive both overload scoring and the final host-side conversion of script values.
#[derive(Debug, Clone)]
pub enum ParamShape {
    /// Any value (`System.Object`)
    Any,
    /// No value
    Void,
    /// `System.Boolean`
    Bool,
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
    /// A host type (`System.Type`)
    Type,
    /// An instance of the given class, struct, enum or interface
    Instance(HostTypeRc),
    /// A host array with the given element type and rank
    Array {
        /// Element type of the array
        element: HostTypeRc,
        /// Number of dimensions, at least 1
        rank: usize,
    },
    /// The generic parameter at this position of the declaring type
    Generic(usize),
    /// An output parameter, passed as a host variable
    Out(Box<ParamShape>),
}

impl ParamShape {
    /// The shape accepting values of the given type
    #[must_use]
    pub fn of(ty: &HostTypeRc) -> ParamShape {
        match ty.primitive {
            Some(PrimitiveKind::Object) => ParamShape::Any,
            Some(PrimitiveKind::Void) => ParamShape::Void,
            Some(PrimitiveKind::Boolean) => ParamShape::Bool,
            Some(PrimitiveKind::Char) => ParamShape::Char,
            Some(PrimitiveKind::Int32) => ParamShape::Int32,
            Some(PrimitiveKind::Int64) => ParamShape::Int64,
            Some(PrimitiveKind::Double) => ParamShape::Double,
            Some(PrimitiveKind::String) => ParamShape::String,
            Some(PrimitiveKind::Type) => ParamShape::Type,
            None => ParamShape::Instance(ty.clone()),
        }
    }

    /// Shape of an array of `element` with `rank` dimensions
    #[must_use]
    pub fn array(element: &HostTypeRc, rank: usize) -> ParamShape {
        ParamShape::Array {
            element: element.clone(),
            rank: rank.max(1),
        }
    }

    /// Shape of an output parameter receiving `inner`
    #[must_use]
    pub fn out(inner: ParamShape) -> ParamShape {
        ParamShape::Out(Box::new(inner))
    }

    /// Replace generic parameters with the given type arguments.
    ///
    /// Parameters without a matching argument are left untouched.
    #[must_use]
    pub fn substitute(&self, arguments: &[HostTypeRc]) -> ParamShape {
        match self {
            ParamShape::Generic(index) => match arguments.get(*index) {
                Some(argument) => ParamShape::of(argument),
                None => self.clone(),
            },
            ParamShape::Out(inner) => ParamShape::Out(Box::new(inner.substitute(arguments))),
            other => other.clone(),
        }
    }

    /// `true` if a null reference is an acceptable value
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        match self {
            ParamShape::Any | ParamShape::String | ParamShape::Type | ParamShape::Array { .. } => {
                true
            }
            ParamShape::Instance(ty) => !ty.is_value_type(),
            _ => false,
        }
    }
}

impl fmt::Display for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamShape::Any => write!(f, "System.Object"),
            ParamShape::Void => write!(f, "System.Void"),
            ParamShape::Bool => write!(f, "System.Boolean"),
            ParamShape::Char => write!(f, "System.Char"),
            ParamShape::Int32 => write!(f, "System.Int32"),
            ParamShape::Int64 => write!(f, "System.Int64"),
            ParamShape::Double => write!(f, "System.Double"),
            ParamShape::String => write!(f, "System.String"),
            ParamShape::Type => write!(f, "System.Type"),
            ParamShape::Instance(ty) => write!(f, "{}", ty.fullname()),
            ParamShape::Array { element, rank } => {
                write!(f, "{}[{}]", element.fullname(), ",".repeat(rank - 1))
            }
            ParamShape::Generic(index) => write!(f, "!{}", index),
            ParamShape::Out(inner) => write!(f, "out {}", inner),
        }
    }
}

/// A named parameter of a method or constructor
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Expected shape of the argument
    pub shape: ParamShape,
}

/// Implementation of a method, constructor or property getter
pub type MethodBody = Arc<dyn Fn(&Invocation<'_>) -> Result<HostValue> + Send + Sync>;
/// Implementation of a property or indexer setter
pub type SetterBody = Arc<dyn Fn(&Invocation<'_>, HostValue) -> Result<()> + Send + Sync>;
/// Accessor returning the event source of an event member
pub type EventAccessor = Arc<dyn Fn(&Invocation<'_>) -> Result<EventSource> + Send + Sync>;

/// Everything a member implementation receives when called.
///
/// Arguments have already been converted to the declared parameter shapes; for methods with a
/// trailing variadic parameter the extra arguments follow the fixed ones in [`Invocation::args`].
pub struct Invocation<'a> {
    member: &'a str,
    this: Option<&'a HostValue>,
    declaring: &'a HostTypeRc,
    args: &'a [HostValue],
    bridge: Option<&'a BridgeContext>,
}

impl<'a> Invocation<'a> {
    /// Create an invocation of `member` reached through `declaring` with `args`
    #[must_use]
    pub fn new(member: &'a str, declaring: &'a HostTypeRc, args: &'a [HostValue]) -> Self {
        Invocation {
            member,
            this: None,
            declaring,
            args,
            bridge: None,
        }
    }

    /// Attach the instance the member is invoked on
    #[must_use]
    pub fn with_this(mut self, this: &'a HostValue) -> Self {
        self.this = Some(this);
        self
    }

    /// Attach the bridge context of the calling engine
    #[must_use]
    pub fn with_bridge(mut self, bridge: &'a BridgeContext) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Name of the invoked member
    #[must_use]
    pub fn member(&self) -> &'a str {
        self.member
    }

    /// The instance, `None` for static members and constructors
    #[must_use]
    pub fn this(&self) -> Option<&'a HostValue> {
        self.this
    }

    /// The instance, downcast to the concrete host object type.
    ///
    /// # Errors
    /// Returns [`Error::HostInvocation`] for static invocations or a mismatched instance type.
    pub fn this_as<T: HostObject>(&self) -> Result<&'a T> {
        match self.this {
            Some(HostValue::Object(object)) => {
                let object: &'a dyn HostObject = object.as_ref();
                object
                    .as_any()
                    .downcast_ref::<T>()
                    .ok_or_else(|| self.fail("instance has an unexpected type"))
            }
            _ => Err(self.fail("member requires an object instance")),
        }
    }

    /// The struct instance of a struct member.
    ///
    /// # Errors
    /// Returns [`Error::HostInvocation`] if the instance is not a struct value.
    pub fn this_struct(&self) -> Result<&'a StructValue> {
        match self.this {
            Some(HostValue::Struct(value)) => Ok(value),
            _ => Err(self.fail("member requires a struct instance")),
        }
    }

    /// All converted arguments
    #[must_use]
    pub fn args(&self) -> &'a [HostValue] {
        self.args
    }

    /// The argument at `index`.
    ///
    /// # Errors
    /// Returns [`Error::HostInvocation`] if fewer arguments were passed.
    pub fn arg(&self, index: usize) -> Result<&'a HostValue> {
        self.args
            .get(index)
            .ok_or_else(|| self.fail(format!("missing argument {}", index)))
    }

    /// The type the member was reached through; closed for generic instantiations
    #[must_use]
    pub fn declaring(&self) -> &'a HostTypeRc {
        self.declaring
    }

    /// Type arguments of the declaring type, empty for non-generic types
    #[must_use]
    pub fn type_arguments(&self) -> &'a [HostTypeRc] {
        self.declaring.type_arguments()
    }

    /// The bridge context of the calling engine.
    ///
    /// # Errors
    /// Returns [`Error::HostInvocation`] when invoked outside of an engine.
    pub fn bridge(&self) -> Result<&'a BridgeContext> {
        self.bridge
            .ok_or_else(|| self.fail("member requires an engine context"))
    }

    /// Build a [`Error::HostInvocation`] for this member
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> Error {
        Error::HostInvocation {
            member: format!("{}.{}", self.declaring.fullname(), self.member),
            message: message.into(),
        }
    }
}

/// Name shared by all constructors
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// A method or constructor descriptor.
///
/// ```rust,no_run
/// use hostbridge::typesystem::{Method, MemberAccess, ParamShape};
/// use hostbridge::HostValue;
///
/// let add = Method::new("Add", |inv| {
///     let (HostValue::I32(a), HostValue::I32(b)) = (inv.arg(0)?, inv.arg(1)?) else {
///         return Err(inv.fail("expected integers"));
///     };
///     Ok(HostValue::I32(a + b))
/// })
/// .param("a", ParamShape::Int32)
/// .param("b", ParamShape::Int32)
/// .returns(ParamShape::Int32)
/// .access(MemberAccess::PUBLIC)
/// .as_static();
/// ```
pub struct Method {
    /// Method name
    pub name: String,
    /// Accessibility
    pub access: MemberAccess,
    /// Modifiers
    pub modifiers: MemberModifiers,
    /// Fixed parameters
    pub params: Vec<Parameter>,
    /// Trailing variadic parameter, its shape applies to each extra argument
    pub params_array: Option<Parameter>,
    /// Shape of the return value
    pub returns: ParamShape,
    body: MethodBody,
}

/// Reference to a [`Method`]
pub type MethodRc = Arc<Method>;

impl Method {
    /// A public instance method returning `System.Object`
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&Invocation<'_>) -> Result<HostValue> + Send + Sync + 'static,
    ) -> Self {
        Method {
            name: name.into(),
            access: MemberAccess::PUBLIC,
            modifiers: MemberModifiers::empty(),
            params: Vec::new(),
            params_array: None,
            returns: ParamShape::Any,
            body: Arc::new(body),
        }
    }

    /// A public constructor
    pub fn constructor(
        body: impl Fn(&Invocation<'_>) -> Result<HostValue> + Send + Sync + 'static,
    ) -> Self {
        Method::new(CONSTRUCTOR_NAME, body)
    }

    /// Append a fixed parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, shape: ParamShape) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            shape,
        });
        self
    }

    /// Set the trailing variadic parameter
    #[must_use]
    pub fn variadic(mut self, name: impl Into<String>, shape: ParamShape) -> Self {
        self.params_array = Some(Parameter {
            name: name.into(),
            shape,
        });
        self
    }

    /// Set the return shape
    #[must_use]
    pub fn returns(mut self, shape: ParamShape) -> Self {
        self.returns = shape;
        self
    }

    /// Set the accessibility
    #[must_use]
    pub fn access(mut self, access: MemberAccess) -> Self {
        self.access = access;
        self
    }

    /// Mark the method static
    #[must_use]
    pub fn as_static(mut self) -> Self {
        self.modifiers |= MemberModifiers::STATIC;
        self
    }

    /// `true` for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MemberModifiers::STATIC)
    }

    /// `true` for constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// `true` if the method can be called with `count` arguments
    #[must_use]
    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.params_array.is_some() {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }

    /// The shape expected for the argument at `index`
    #[must_use]
    pub fn shape_at(&self, index: usize) -> Option<&ParamShape> {
        self.params
            .get(index)
            .map(|param| &param.shape)
            .or_else(|| self.params_array.as_ref().map(|param| &param.shape))
    }

    /// Run the implementation
    ///
    /// # Errors
    /// Whatever the implementation reports.
    pub fn invoke(&self, invocation: &Invocation<'_>) -> Result<HostValue> {
        (self.body)(invocation)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<String> = self.params.iter().map(|p| p.shape.to_string()).collect();
        if let Some(variadic) = &self.params_array {
            params.push(format!("params {}", variadic.shape));
        }
        write!(f, "{} {}({})", self.returns, self.name, params.join(", "))
    }
}

/// A property or field descriptor.
///
/// A property without getter and setter is a storage field; it only exists on struct types
/// whose values carry the field data themselves.
pub struct Property {
    /// Property name
    pub name: String,
    /// Accessibility
    pub access: MemberAccess,
    /// Modifiers
    pub modifiers: MemberModifiers,
    /// Shape of the property value
    pub shape: ParamShape,
    getter: Option<MethodBody>,
    setter: Option<SetterBody>,
}

/// Reference to a [`Property`]
pub type PropertyRc = Arc<Property>;

impl Property {
    /// A public instance property without accessors
    pub fn new(name: impl Into<String>, shape: ParamShape) -> Self {
        Property {
            name: name.into(),
            access: MemberAccess::PUBLIC,
            modifiers: MemberModifiers::empty(),
            shape,
            getter: None,
            setter: None,
        }
    }

    /// Set the getter
    #[must_use]
    pub fn getter(
        mut self,
        body: impl Fn(&Invocation<'_>) -> Result<HostValue> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(body));
        self
    }

    /// Set the setter
    #[must_use]
    pub fn setter(
        mut self,
        body: impl Fn(&Invocation<'_>, HostValue) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(body));
        self
    }

    /// Set the accessibility
    #[must_use]
    pub fn access(mut self, access: MemberAccess) -> Self {
        self.access = access;
        self
    }

    /// Mark the property static
    #[must_use]
    pub fn as_static(mut self) -> Self {
        self.modifiers |= MemberModifiers::STATIC;
        self
    }

    /// Mark the property read-only
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.modifiers |= MemberModifiers::READ_ONLY;
        self
    }

    /// `true` for static properties
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MemberModifiers::STATIC)
    }

    /// `true` for struct storage fields
    #[must_use]
    pub fn is_storage(&self) -> bool {
        self.getter.is_none() && self.setter.is_none()
    }

    /// `true` if the property can be assigned
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.modifiers.contains(MemberModifiers::READ_ONLY)
            && (self.setter.is_some() || self.is_storage())
    }

    /// Run the getter, `None` if there is none
    pub fn read(&self, invocation: &Invocation<'_>) -> Option<Result<HostValue>> {
        self.getter.as_ref().map(|getter| getter(invocation))
    }

    /// Run the setter, `None` if there is none
    pub fn write(&self, invocation: &Invocation<'_>, value: HostValue) -> Option<Result<()>> {
        self.setter.as_ref().map(|setter| setter(invocation, value))
    }
}

/// The default indexed property of a type (`item[key]`)
pub struct Indexer {
    /// Accessibility
    pub access: MemberAccess,
    /// Shape of the key
    pub key: ParamShape,
    /// Shape of the stored values
    pub value: ParamShape,
    getter: Option<MethodBody>,
    setter: Option<SetterBody>,
}

/// Reference to an [`Indexer`]
pub type IndexerRc = Arc<Indexer>;

impl Indexer {
    /// A public indexer without accessors
    #[must_use]
    pub fn new(key: ParamShape, value: ParamShape) -> Self {
        Indexer {
            access: MemberAccess::PUBLIC,
            key,
            value,
            getter: None,
            setter: None,
        }
    }

    /// Set the getter; the key is passed as the only argument
    #[must_use]
    pub fn getter(
        mut self,
        body: impl Fn(&Invocation<'_>) -> Result<HostValue> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(body));
        self
    }

    /// Set the setter; the key is passed as the only argument
    #[must_use]
    pub fn setter(
        mut self,
        body: impl Fn(&Invocation<'_>, HostValue) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(body));
        self
    }

    /// Run the getter, `None` if there is none
    pub fn read(&self, invocation: &Invocation<'_>) -> Option<Result<HostValue>> {
        self.getter.as_ref().map(|getter| getter(invocation))
    }

    /// Run the setter, `None` if there is none
    pub fn write(&self, invocation: &Invocation<'_>, value: HostValue) -> Option<Result<()>> {
        self.setter.as_ref().map(|setter| setter(invocation, value))
    }
}

/// An event descriptor
pub struct EventMember {
    /// Event name
    pub name: String,
    /// Accessibility
    pub access: MemberAccess,
    /// Modifiers
    pub modifiers: MemberModifiers,
    accessor: EventAccessor,
}

/// Reference to an [`EventMember`]
pub type EventMemberRc = Arc<EventMember>;

impl EventMember {
    /// A public instance event whose source is returned by `accessor`
    pub fn new(
        name: impl Into<String>,
        accessor: impl Fn(&Invocation<'_>) -> Result<EventSource> + Send + Sync + 'static,
    ) -> Self {
        EventMember {
            name: name.into(),
            access: MemberAccess::PUBLIC,
            modifiers: MemberModifiers::empty(),
            accessor: Arc::new(accessor),
        }
    }

    /// Set the accessibility
    #[must_use]
    pub fn access(mut self, access: MemberAccess) -> Self {
        self.access = access;
        self
    }

    /// Mark the event static
    #[must_use]
    pub fn as_static(mut self) -> Self {
        self.modifiers |= MemberModifiers::STATIC;
        self
    }

    /// `true` for static events
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MemberModifiers::STATIC)
    }

    /// Fetch the event source
    ///
    /// # Errors
    /// Whatever the accessor reports.
    pub fn source(&self, invocation: &Invocation<'_>) -> Result<EventSource> {
        (self.accessor)(invocation)
    }
}

/// The members declared by one type.
///
/// Member lists are append-only so types may gain members after registration.
pub struct MemberTable {
    /// Methods and constructors
    pub methods: boxcar::Vec<MethodRc>,
    /// Properties and fields
    pub properties: boxcar::Vec<PropertyRc>,
    /// Events
    pub events: boxcar::Vec<EventMemberRc>,
    /// Default indexer
    pub indexer: Option<IndexerRc>,
    /// Named constants of enum types
    pub enum_values: Vec<(String, i64)>,
}

impl MemberTable {
    /// An empty member table
    #[must_use]
    pub fn new() -> Self {
        MemberTable {
            methods: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            indexer: None,
            enum_values: Vec::new(),
        }
    }

    /// Add a method or constructor
    pub fn add_method(&self, method: Method) {
        self.methods.push(Arc::new(method));
    }

    /// Add a property or field
    pub fn add_property(&self, property: Property) {
        self.properties.push(Arc::new(property));
    }

    /// Add an event
    pub fn add_event(&self, event: EventMember) {
        self.events.push(Arc::new(event));
    }
}

impl Default for MemberTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A member found on a type or one of its base types
#[derive(Clone)]
pub struct MemberMatch<M> {
    /// The type in the hierarchy that declares the member
    pub declaring: HostTypeRc,
    /// The member
    pub member: M,
}
