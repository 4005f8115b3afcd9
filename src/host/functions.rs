//! Host helper objects.
//!
//! [`HostFunctions`] is the object scripts conventionally see as `host`: it creates host
//! objects, arrays and variables, casts values and resolves types at run time. The other
//! helpers are host objects it hands out:
//!
//! - [`HostVariable`]: a typed slot passed as an output argument, read through `value`
//! - [`HostDelegate`]: a host callable, invoked from script with `Invoke(args...)`
//! - [`PropertyBag`]: a dynamic object whose members are created on first assignment
//!
//! All helper types live in the `HostBridge` namespace and are registered on first use.

use std::{any::Any, collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    access::HostItemFlags,
    marshal::{self, to_script},
    typesystem::{
        HostTypeRc, Invocation, Method, ParamShape, Property, TypeBuilder, TypeFlavor,
        TypeRegistry,
    },
    error::LimitKind,
    value::{HostArray, HostObject, HostValue, ScriptValue},
    Error, Result,
};

/// Namespace of the helper types
pub const HOST_NAMESPACE: &str = "HostBridge";

/// Signature of a [`HostDelegate`] body
pub type DelegateBody = Arc<dyn Fn(&[HostValue]) -> Result<HostValue> + Send + Sync>;

struct BuiltinTypes {
    functions: HostTypeRc,
    variable: HostTypeRc,
    delegate: HostTypeRc,
    bag: HostTypeRc,
}

fn define_once(registry: &TypeRegistry, builder: TypeBuilder) -> Result<HostTypeRc> {
    let fullname = builder.definition_name();
    if let Some(existing) = registry.get_by_fullname(&fullname) {
        return Ok(existing);
    }

    match registry.define(builder) {
        Ok(defined) => Ok(defined),
        // lost a registration race against another engine
        Err(error) => registry.get_by_fullname(&fullname).ok_or(error),
    }
}

fn type_arg(invocation: &Invocation<'_>, index: usize) -> Result<HostTypeRc> {
    match invocation.arg(index)? {
        HostValue::Type(ty) => Ok(ty.clone()),
        other => Err(invocation.fail(format!("expected a type, found {}", other.describe()))),
    }
}

fn register_builtins(registry: &TypeRegistry) -> Result<BuiltinTypes> {
    let any = ParamShape::Any;

    let bag = define_once(registry, TypeBuilder::class(HOST_NAMESPACE, "PropertyBag"))?;

    let variable = define_once(
        registry,
        TypeBuilder::class(HOST_NAMESPACE, "HostVariable").generic(1).property(
            Property::new("value", ParamShape::Generic(0))
                .getter(|inv| Ok(inv.this_as::<HostVariable>()?.value()))
                .setter(|inv, value| {
                    inv.this_as::<HostVariable>()?.set_value(value);
                    Ok(())
                }),
        ),
    )?;

    let delegate = define_once(
        registry,
        TypeBuilder::class(HOST_NAMESPACE, "HostDelegate").method(
            Method::new("Invoke", |inv| {
                let delegate = inv.this_as::<HostDelegate>()?;
                (delegate.body)(inv.args())
            })
            .variadic("args", any.clone()),
        ),
    )?;

    let functions = define_once(
        registry,
        TypeBuilder::class(HOST_NAMESPACE, "HostFunctions")
            .method(Method::new("newObj", |inv| {
                PropertyBag::create(inv.bridge()?.registry())
            }))
            .method(
                Method::new("newObj", |inv| {
                    let ty = type_arg(inv, 0)?;
                    let args: Vec<_> = inv.args()[1..].iter().cloned().map(to_script).collect();
                    inv.bridge()?.construct(&ty, HostItemFlags::DEFAULT, &args)
                })
                .param("type", ParamShape::Type)
                .variadic("args", any.clone()),
            )
            .method(
                Method::new("newArr", |inv| {
                    let element = type_arg(inv, 0)?;
                    let mut dimensions = Vec::with_capacity(inv.args().len() - 1);
                    for length in &inv.args()[1..] {
                        match length {
                            HostValue::I32(length) if *length >= 0 => {
                                dimensions.push(*length as usize);
                            }
                            other => {
                                return Err(inv.fail(format!("invalid array length {}", other)))
                            }
                        }
                    }
                    let limit = inv.bridge()?.max_array_size();
                    if limit > 0 && HostArray::element_count(&dimensions)? > limit {
                        return Err(Error::LimitExceeded(LimitKind::DataSize(format!(
                            "host array of {:?}",
                            dimensions
                        ))));
                    }
                    Ok(HostValue::Array(HostArray::new(element, &dimensions)?))
                })
                .param("elementType", ParamShape::Type)
                .variadic("lengths", ParamShape::Int32),
            )
            .method(
                Method::new("newVar", |inv| {
                    let ty = type_arg(inv, 0)?;
                    HostVariable::create(inv.bridge()?.registry(), &ty, None)
                })
                .param("type", ParamShape::Type),
            )
            .method(
                Method::new("cast", |inv| {
                    let ty = type_arg(inv, 0)?;
                    let registry = inv.bridge()?.registry();
                    let value = to_script(inv.arg(1)?.clone());
                    if ty.flavor == TypeFlavor::Enum {
                        marshal::to_enum(&value, &ty, registry)
                    } else {
                        marshal::to_host(&value, &ParamShape::of(&ty), registry)
                    }
                })
                .param("type", ParamShape::Type)
                .param("value", any.clone()),
            )
            .method(
                Method::new("type", |inv| {
                    let HostValue::String(name) = inv.arg(0)? else {
                        return Err(inv.fail("expected a type name"));
                    };

                    let mut rest = &inv.args()[1..];
                    let mut hint = None;
                    if let Some(HostValue::String(assembly)) = rest.first() {
                        hint = Some(assembly.as_str());
                        rest = &rest[1..];
                    }

                    let mut type_args = Vec::with_capacity(rest.len());
                    for argument in rest {
                        match argument {
                            HostValue::Type(ty) => type_args.push(ty.clone()),
                            other => {
                                return Err(inv.fail(format!(
                                    "expected a type argument, found {}",
                                    other.describe()
                                )))
                            }
                        }
                    }

                    let resolved = inv.bridge()?.resolver().resolve(name, &type_args, hint)?;
                    Ok(HostValue::Type(resolved))
                })
                .param("name", ParamShape::String)
                .variadic("args", any.clone()),
            )
            .method(
                Method::new("isNull", |inv| Ok(HostValue::Bool(inv.arg(0)?.is_null())))
                    .param("value", any.clone())
                    .returns(ParamShape::Bool),
            )
            .method(
                Method::new("isType", |inv| {
                    let ty = type_arg(inv, 0)?;
                    let registry = inv.bridge()?.registry();
                    let matches = inv
                        .arg(1)?
                        .host_type(registry)
                        .is_some_and(|actual| ty.is_assignable_from(&actual));
                    Ok(HostValue::Bool(matches))
                })
                .param("type", ParamShape::Type)
                .param("value", any.clone())
                .returns(ParamShape::Bool),
            )
            .method(
                Method::new("toArray", |inv| {
                    let HostValue::Array(array) = inv.arg(0)? else {
                        return Err(inv.fail("expected a host array"));
                    };
                    let elements: Vec<_> = array.to_vec().into_iter().map(to_script).collect();
                    Ok(HostValue::Script(ScriptValue(rhai::Dynamic::from_array(
                        elements,
                    ))))
                })
                .param("array", ParamShape::array(&registry.object(), 1)),
            ),
    )?;

    Ok(BuiltinTypes {
        functions,
        variable,
        delegate,
        bag,
    })
}

/// The `host` helper object.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use hostbridge::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::new());
/// let engine = ScriptEngine::new(registry.clone())?;
/// engine.add_host_object("host", HostFunctions::create(&registry)?, HostItemFlags::DEFAULT)?;
/// engine.add_host_type("Int32", "System.Int32", HostItemFlags::DEFAULT)?;
///
/// engine.execute("let grid = host.newArr(Int32, 3, 5, 7); grid.SetValue(1, 2, 4, 6);")?;
/// # Ok::<(), hostbridge::Error>(())
/// ```
pub struct HostFunctions {
    ty: HostTypeRc,
}

impl HostFunctions {
    /// Full name of the helper type
    pub const FULLNAME: &'static str = "HostBridge.HostFunctions";

    /// Create the helper object, registering the helper types in `registry` if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if a conflicting type occupies a helper name.
    pub fn create(registry: &TypeRegistry) -> Result<HostValue> {
        let types = register_builtins(registry)?;
        debug!("created host functions object");
        Ok(HostValue::object(HostFunctions {
            ty: types.functions,
        }))
    }
}

impl HostObject for HostFunctions {
    fn host_type(&self) -> HostTypeRc {
        self.ty.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A typed value slot, used for output parameters.
pub struct HostVariable {
    ty: HostTypeRc,
    value: RwLock<HostValue>,
}

impl HostVariable {
    /// Create a `HostVariable<value_type>` holding `initial`, or the default of `value_type`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if `value_type` is an open generic.
    pub fn create(
        registry: &TypeRegistry,
        value_type: &HostTypeRc,
        initial: Option<HostValue>,
    ) -> Result<HostValue> {
        let types = register_builtins(registry)?;
        if value_type.is_open_generic() {
            return Err(resolution_error!(
                value_type.fullname(),
                "a host variable requires a closed type"
            ));
        }

        let ty = registry.instantiation(&types.variable, &[value_type.clone()]);
        Ok(HostValue::object(HostVariable {
            ty,
            value: RwLock::new(initial.unwrap_or_else(|| HostValue::default_for(value_type))),
        }))
    }

    /// The variable inside a host value, if it holds one
    #[must_use]
    pub fn of(value: &HostValue) -> Option<&HostVariable> {
        match value {
            HostValue::Object(object) => object.as_any().downcast_ref::<HostVariable>(),
            _ => None,
        }
    }

    /// The type of the stored value
    #[must_use]
    pub fn value_type(&self) -> &HostTypeRc {
        &self.ty.type_arguments()[0]
    }

    /// The stored value
    #[must_use]
    pub fn value(&self) -> HostValue {
        self.value.read().clone()
    }

    /// Replace the stored value
    pub fn set_value(&self, value: HostValue) {
        *self.value.write() = value;
    }
}

impl HostObject for HostVariable {
    fn host_type(&self) -> HostTypeRc {
        self.ty.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_display(&self) -> String {
        self.value().to_string()
    }
}

/// A host callable exposed to scripts
pub struct HostDelegate {
    ty: HostTypeRc,
    body: DelegateBody,
}

impl HostDelegate {
    /// Wrap `body` as a host object.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if a conflicting type occupies a helper name.
    pub fn create(
        registry: &TypeRegistry,
        body: impl Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    ) -> Result<HostValue> {
        let types = register_builtins(registry)?;
        Ok(HostValue::object(HostDelegate {
            ty: types.delegate,
            body: Arc::new(body),
        }))
    }

    /// Call the delegate from host code
    ///
    /// # Errors
    /// Whatever the body reports.
    pub fn call(&self, args: &[HostValue]) -> Result<HostValue> {
        (self.body)(args)
    }
}

impl HostObject for HostDelegate {
    fn host_type(&self) -> HostTypeRc {
        self.ty.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A dynamic host object; members spring into existence on assignment
pub struct PropertyBag {
    ty: HostTypeRc,
    members: RwLock<BTreeMap<String, HostValue>>,
}

impl PropertyBag {
    /// Create an empty bag.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if a conflicting type occupies a helper name.
    pub fn create(registry: &TypeRegistry) -> Result<HostValue> {
        let types = register_builtins(registry)?;
        Ok(HostValue::object(PropertyBag {
            ty: types.bag,
            members: RwLock::new(BTreeMap::new()),
        }))
    }

    /// The bag inside a host value, if it holds one
    #[must_use]
    pub fn of(value: &HostValue) -> Option<&PropertyBag> {
        match value {
            HostValue::Object(object) => object.as_any().downcast_ref::<PropertyBag>(),
            _ => None,
        }
    }

    /// Read a member
    #[must_use]
    pub fn get(&self, name: &str) -> Option<HostValue> {
        self.members.read().get(name).cloned()
    }

    /// Create or replace a member
    pub fn set(&self, name: &str, value: HostValue) {
        self.members.write().insert(name.to_string(), value);
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// `true` without members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HostObject for PropertyBag {
    fn host_type(&self) -> HostTypeRc {
        self.ty.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dynamic_member(&self, name: &str) -> Option<HostValue> {
        self.get(name)
    }

    fn set_dynamic_member(&self, name: &str, value: HostValue) -> bool {
        self.set(name, value);
        true
    }

    fn dynamic_member_names(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }
}
