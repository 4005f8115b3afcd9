//! Member dispatch for host items.
//!
//! Every script access to a host item ends up here: property reads and writes, method calls,
//! construction and indexing. Each dispatch consults the access policy with the item's flags
//! and the engine's access context, converts script arguments to the declared parameter
//! shapes and converts results back into script values.

use rhai::Dynamic;
use tracing::{trace, warn};

use crate::{
    access::{AccessPolicy, HostItemFlags},
    host::{overload, BridgeContext, EventSite, HostItem, HostTarget},
    marshal::{self, to_host, to_script},
    typesystem::{
        EventMemberRc, HostTypeRc, IndexerRc, Invocation, MemberAccess, MemberMatch, MethodRc,
        ParamShape, PropertyRc, ResolvedChild, CONSTRUCTOR_NAME,
    },
    value::{EnumValue, HostArray, HostValue},
    Error, Result,
};

const INDEXER_NAME: &str = "Item";

fn not_found(type_name: String, member: &str) -> Error {
    Error::MemberNotFound {
        type_name,
        member: member.to_string(),
    }
}

fn index_of(value: &Dynamic) -> Result<usize> {
    let index = value
        .as_int()
        .map_err(|_| conversion_error!("array index", marshal::describe(value)))?;
    usize::try_from(index).map_err(|_| conversion_error!("non-negative array index", index))
}

fn indices_of(values: &[Dynamic]) -> Result<Vec<usize>> {
    values.iter().map(index_of).collect()
}

fn expect_arity(member: &str, args: &[Dynamic], count: usize) -> Result<()> {
    if args.len() == count {
        return Ok(());
    }

    Err(Error::OverloadResolution {
        member: member.to_string(),
        arguments: args
            .iter()
            .map(marshal::describe)
            .collect::<Vec<_>>()
            .join(", "),
        reason: format!("expected {} arguments", count),
    })
}

impl BridgeContext {
    fn check(
        &self,
        flags: HostItemFlags,
        declaring: &HostTypeRc,
        access: MemberAccess,
        member: &str,
    ) -> Result<()> {
        let context = self.context_type();
        AccessPolicy::check(flags, declaring, access, member, context.as_deref())
    }

    fn invocation<'a>(
        &'a self,
        member: &'a str,
        declaring: &'a HostTypeRc,
        args: &'a [HostValue],
        this: Option<&'a HostValue>,
    ) -> Invocation<'a> {
        let invocation = Invocation::new(member, declaring, args).with_bridge(self);
        match this {
            Some(this) => invocation.with_this(this),
            None => invocation,
        }
    }

    fn read_property(
        &self,
        flags: HostItemFlags,
        found: &MemberMatch<PropertyRc>,
        this: Option<&HostValue>,
    ) -> Result<Dynamic> {
        let property = &found.member;
        self.check(flags, &found.declaring, property.access, &property.name)?;

        if property.is_storage() {
            if let Some(HostValue::Struct(value)) = this {
                return Ok(to_script(
                    value.get(&property.name).cloned().unwrap_or(HostValue::Null),
                ));
            }
        }

        let invocation = self.invocation(&property.name, &found.declaring, &[], this);
        match property.read(&invocation) {
            Some(value) => Ok(to_script(value?)),
            None => Err(not_found(found.declaring.fullname(), &property.name)),
        }
    }

    fn write_property(
        &self,
        flags: HostItemFlags,
        found: &MemberMatch<PropertyRc>,
        this: Option<&HostValue>,
        value: &Dynamic,
    ) -> Result<()> {
        let property = &found.member;
        self.check(flags, &found.declaring, property.access, &property.name)?;

        if !property.is_writable() {
            warn!(
                "rejected write to read-only member '{}' of {}",
                property.name,
                found.declaring.fullname()
            );
            return Err(Error::AccessDenied {
                type_name: found.declaring.fullname(),
                member: property.name.clone(),
            });
        }

        let shape = property.shape.substitute(found.declaring.type_arguments());
        let converted = to_host(value, &shape, self.registry())?;
        let invocation = self.invocation(&property.name, &found.declaring, &[], this);
        match property.write(&invocation, converted) {
            Some(result) => result,
            None => Err(not_found(found.declaring.fullname(), &property.name)),
        }
    }

    fn event_site(
        &self,
        flags: HostItemFlags,
        found: &MemberMatch<EventMemberRc>,
        this: Option<&HostValue>,
    ) -> Result<Dynamic> {
        let event = &found.member;
        self.check(flags, &found.declaring, event.access, &event.name)?;

        let invocation = self.invocation(&event.name, &found.declaring, &[], this);
        let site = EventSite {
            source: event.source(&invocation)?,
            declaring: found.declaring.fullname(),
        };
        Ok(Dynamic::from(HostItem::new(HostTarget::Event(site), flags)))
    }

    fn call_method(
        &self,
        flags: HostItemFlags,
        name: &str,
        candidates: &[MemberMatch<MethodRc>],
        this: Option<&HostValue>,
        args: &[Dynamic],
    ) -> Result<HostValue> {
        let context = self.context_type();
        let selection = overload::select(
            name,
            candidates,
            args,
            flags,
            context.as_deref(),
            self.registry(),
        )?;

        let matched = &selection.matched;
        let invocation = self.invocation(name, &matched.declaring, &selection.args, this);
        matched.member.invoke(&invocation)
    }

    fn require_closed(&self, ty: &HostTypeRc, member: &str) -> Result<()> {
        if ty.is_open_generic() {
            return Err(resolution_error!(
                ty.fullname(),
                "member '{}' requires type arguments",
                member
            ));
        }
        Ok(())
    }

    fn nested_type(&self, ty: &HostTypeRc, name: &str) -> Option<HostTypeRc> {
        self.registry()
            .get_by_fullname(&format!("{}+{}", ty.definition_name(), name))
    }

    fn value_type(&self, value: &HostValue) -> Option<HostTypeRc> {
        value.host_type(self.registry())
    }

    /// `true` if `name` reads as a member (property, field, event, enum constant, nested type
    /// or namespace child) of `item`
    #[must_use]
    pub fn has_member(&self, item: &HostItem, name: &str) -> bool {
        match item.target() {
            HostTarget::Object(object) => {
                let ty = object.host_type();
                ty.find_property(name, false).is_some()
                    || ty.find_event(name, false).is_some()
                    || object.dynamic_member(name).is_some()
            }
            HostTarget::Type(ty) => {
                ty.enum_value(name).is_some()
                    || ty.find_property(name, true).is_some()
                    || ty.find_event(name, true).is_some()
                    || self.nested_type(ty, name).is_some()
            }
            HostTarget::Value(value) => self
                .value_type(value)
                .is_some_and(|ty| ty.find_property(name, false).is_some()),
            HostTarget::Array(_) => matches!(name, "Length" | "Rank"),
            HostTarget::Namespace(node) => self.resolver().child(node, name).is_some(),
            HostTarget::Event(_) | HostTarget::Connection(_) => false,
        }
    }

    /// `true` if `name` is a callable method of `item`
    #[must_use]
    pub fn has_invocable(&self, item: &HostItem, name: &str) -> bool {
        match item.target() {
            HostTarget::Object(object) => {
                object.host_type().has_method(name, false)
                    || matches!(object.dynamic_member(name), Some(HostValue::Object(_)))
            }
            HostTarget::Type(ty) => ty.has_method(name, true),
            HostTarget::Value(value) => self
                .value_type(value)
                .is_some_and(|ty| ty.has_method(name, false)),
            HostTarget::Array(_) => matches!(name, "GetLength" | "GetValue" | "SetValue"),
            _ => false,
        }
    }

    /// Read the member `name` of `item`.
    ///
    /// # Errors
    /// - [`Error::MemberNotFound`] if `item` has no such member
    /// - [`Error::AccessDenied`] if the member is not visible
    /// - [`Error::TypeResolution`] for static members of open generic types and unknown
    ///   namespace children
    pub fn get_member(&self, item: &HostItem, name: &str) -> Result<Dynamic> {
        trace!("get {}.{}", item.type_name(), name);
        let flags = item.flags();

        match item.target() {
            HostTarget::Object(object) => {
                let ty = object.host_type();
                let this = HostValue::Object(object.clone());

                if let Some(found) = ty.find_property(name, false) {
                    return self.read_property(flags, &found, Some(&this));
                }
                if let Some(found) = ty.find_event(name, false) {
                    return self.event_site(flags, &found, Some(&this));
                }
                match object.dynamic_member(name) {
                    Some(value) => Ok(to_script(value)),
                    None => Err(not_found(item.type_name(), name)),
                }
            }
            HostTarget::Type(ty) => {
                if let Some(value) = ty.enum_value(name) {
                    return Ok(to_script(HostValue::Enum(EnumValue::new(ty, value))));
                }
                if let Some(nested) = self.nested_type(ty, name) {
                    return Ok(Dynamic::from(HostItem::for_type(nested, flags)));
                }
                if let Some(found) = ty.find_property(name, true) {
                    self.require_closed(ty, name)?;
                    return self.read_property(flags, &found, None);
                }
                if let Some(found) = ty.find_event(name, true) {
                    self.require_closed(ty, name)?;
                    return self.event_site(flags, &found, None);
                }
                Err(not_found(ty.fullname(), name))
            }
            HostTarget::Value(value) => {
                let found = self
                    .value_type(value)
                    .and_then(|ty| ty.find_property(name, false));
                match found {
                    Some(found) => self.read_property(flags, &found, Some(value)),
                    None => Err(not_found(item.type_name(), name)),
                }
            }
            HostTarget::Array(array) => match name {
                "Length" => Ok(to_script(HostValue::I32(array.len() as i32))),
                "Rank" => Ok(to_script(HostValue::I32(array.rank() as i32))),
                _ => Err(not_found(array.type_name(), name)),
            },
            HostTarget::Namespace(node) => match self.resolver().child(node, name) {
                Some(ResolvedChild::Type(ty)) => Ok(Dynamic::from(HostItem::for_type(ty, flags))),
                Some(ResolvedChild::Namespace(child)) => {
                    Ok(Dynamic::from(HostItem::namespace(child, flags)))
                }
                None => Err(resolution_error!(
                    node.child_path(name),
                    "no such type or namespace"
                )),
            },
            HostTarget::Event(_) | HostTarget::Connection(_) => {
                Err(not_found(item.type_name(), name))
            }
        }
    }

    /// `true` if `value` is what `name` of `item` already reads as. A method call on a member
    /// (`Type.Event.connect(f)`, `item.Reading.abs()`) stores the member back afterwards,
    /// which must not fail on members that cannot be assigned.
    fn is_write_back(&self, item: &HostItem, name: &str, value: &Dynamic) -> bool {
        let Ok(current) = self.get_member(item, name) else {
            return false;
        };

        let written = value.read_lock::<HostItem>().map(|written| (*written).clone());
        let read = current.read_lock::<HostItem>().map(|read| (*read).clone());
        match (read, written) {
            (Some(read), Some(written)) => read.is_same(&written),
            (None, None) => marshal::to_host_any(&current) == marshal::to_host_any(value),
            _ => false,
        }
    }

    /// Assign `value` to the member `name` of `item`.
    ///
    /// Struct items are updated in place, so the assignment is visible through the script
    /// variable holding the item and nowhere else. Storing back the value a member already
    /// reads as succeeds even where an assignment would be denied.
    ///
    /// # Errors
    /// - [`Error::MemberNotFound`] if `item` has no such member
    /// - [`Error::AccessDenied`] if the member is not visible or read-only
    /// - [`Error::Conversion`] if `value` does not fit the member's shape
    pub fn set_member(&self, item: &mut HostItem, name: &str, value: &Dynamic) -> Result<()> {
        trace!("set {}.{}", item.type_name(), name);
        match self.assign_member(item, name, value) {
            Err(Error::AccessDenied { .. } | Error::MemberNotFound { .. })
                if self.is_write_back(item, name, value) =>
            {
                Ok(())
            }
            result => result,
        }
    }

    fn assign_member(&self, item: &mut HostItem, name: &str, value: &Dynamic) -> Result<()> {
        let flags = item.flags();
        let type_name = item.type_name();

        match item.target_mut() {
            HostTarget::Object(object) => {
                let this = HostValue::Object(object.clone());
                if let Some(found) = object.host_type().find_property(name, false) {
                    return self.write_property(flags, &found, Some(&this), value);
                }
                if object.set_dynamic_member(name, marshal::to_host_any(value)) {
                    return Ok(());
                }
                Err(not_found(type_name, name))
            }
            HostTarget::Type(ty) => match ty.find_property(name, true) {
                Some(found) => {
                    self.require_closed(ty, name)?;
                    self.write_property(flags, &found, None, value)
                }
                None => Err(not_found(ty.fullname(), name)),
            },
            HostTarget::Value(HostValue::Struct(instance)) => {
                let Some(found) = instance.ty.find_property(name, false) else {
                    return Err(not_found(type_name, name));
                };

                if !found.member.is_storage() {
                    let this = HostValue::Struct(instance.clone());
                    return self.write_property(flags, &found, Some(&this), value);
                }

                self.check(flags, &found.declaring, found.member.access, name)?;
                if !found.member.is_writable() {
                    return Err(Error::AccessDenied {
                        type_name,
                        member: name.to_string(),
                    });
                }
                let shape = found.member.shape.substitute(found.declaring.type_arguments());
                let converted = to_host(value, &shape, self.registry())?;
                instance.set(name, converted);
                Ok(())
            }
            _ => Err(not_found(type_name, name)),
        }
    }

    /// Invoke the method `name` of `item` with script arguments.
    ///
    /// Besides declared methods every item answers `ToString()`, `GetType()` and
    /// `Equals(other)`; arrays answer `GetLength`, `GetValue` and `SetValue`; types answer
    /// `Of(types...)`, closing an open generic definition.
    ///
    /// # Errors
    /// - [`Error::MemberNotFound`] if `item` has no such method
    /// - [`Error::AccessDenied`] if only non-visible signatures match
    /// - [`Error::OverloadResolution`] if no signature accepts the arguments
    /// - [`Error::TypeResolution`] for static methods of open generic types
    /// - whatever the host implementation reports
    pub fn invoke(&self, item: &HostItem, name: &str, args: &[Dynamic]) -> Result<Dynamic> {
        trace!("invoke {}.{} with {} arguments", item.type_name(), name, args.len());
        let flags = item.flags();

        match item.target() {
            HostTarget::Object(object) => {
                let candidates = object.host_type().find_methods(name, false);
                if !candidates.is_empty() {
                    let this = HostValue::Object(object.clone());
                    return self
                        .call_method(flags, name, &candidates, Some(&this), args)
                        .map(to_script);
                }
                if let Some(HostValue::Object(callable)) = object.dynamic_member(name) {
                    let callable = HostItem::new(HostTarget::Object(callable), flags);
                    return self.invoke(&callable, "Invoke", args);
                }
            }
            HostTarget::Type(ty) => {
                if name == "Of" {
                    return self.close_generic(ty, flags, args);
                }
                let candidates = ty.find_methods(name, true);
                if !candidates.is_empty() {
                    self.require_closed(ty, name)?;
                    return self
                        .call_method(flags, name, &candidates, None, args)
                        .map(to_script);
                }
            }
            HostTarget::Value(value) => {
                let candidates = self
                    .value_type(value)
                    .map(|ty| ty.find_methods(name, false))
                    .unwrap_or_default();
                if !candidates.is_empty() {
                    return self
                        .call_method(flags, name, &candidates, Some(value), args)
                        .map(to_script);
                }
            }
            HostTarget::Array(array) => {
                if let Some(result) = self.invoke_array(array, name, args) {
                    return result;
                }
            }
            HostTarget::Connection(connection) => {
                if matches!(name, "disconnect" | "Disconnect") {
                    expect_arity(name, args, 0)?;
                    return Ok(Dynamic::from(connection.disconnect()));
                }
            }
            HostTarget::Namespace(_) | HostTarget::Event(_) => {}
        }

        self.invoke_common(item, name, args)
    }

    fn invoke_array(
        &self,
        array: &HostArray,
        name: &str,
        args: &[Dynamic],
    ) -> Option<Result<Dynamic>> {
        let result = match name {
            "GetLength" => expect_arity(name, args, 1)
                .and_then(|()| index_of(&args[0]))
                .and_then(|dimension| array.get_length(dimension))
                .map(|length| to_script(HostValue::I32(length as i32))),
            "GetValue" => indices_of(args)
                .and_then(|indices| array.get(&indices))
                .map(to_script),
            "SetValue" => {
                if args.is_empty() {
                    return Some(expect_arity(name, args, 1).map(|()| Dynamic::UNIT));
                }
                let shape = ParamShape::of(array.element_type());
                to_host(&args[0], &shape, self.registry()).and_then(|value| {
                    let indices = indices_of(&args[1..])?;
                    array.set(&indices, value).map(|()| Dynamic::UNIT)
                })
            }
            _ => return None,
        };
        Some(result)
    }

    fn invoke_common(&self, item: &HostItem, name: &str, args: &[Dynamic]) -> Result<Dynamic> {
        match (name, args) {
            ("ToString", []) => Ok(Dynamic::from(item.display())),
            ("Equals", [other]) => Ok(Dynamic::from(
                other
                    .read_lock::<HostItem>()
                    .is_some_and(|other| item.is_same(&other)),
            )),
            ("GetType", []) => {
                let ty = item
                    .to_host_value()
                    .and_then(|value| match value {
                        HostValue::Array(_) => None,
                        other => other.host_type(self.registry()),
                    })
                    .ok_or_else(|| not_found(item.type_name(), name))?;
                Ok(Dynamic::from(HostItem::for_type(ty, item.flags())))
            }
            _ => Err(not_found(item.type_name(), name)),
        }
    }

    fn close_generic(
        &self,
        ty: &HostTypeRc,
        flags: HostItemFlags,
        args: &[Dynamic],
    ) -> Result<Dynamic> {
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            match to_host(arg, &ParamShape::Type, self.registry())? {
                HostValue::Type(argument) => arguments.push(argument),
                _ => return Err(conversion_error!("System.Type", marshal::describe(arg))),
            }
        }

        let closed = self.resolver().close(ty, &arguments)?;
        Ok(Dynamic::from(HostItem::for_type(closed, flags)))
    }

    /// Create an instance of `ty` with script arguments.
    ///
    /// Structs and enums without a matching parameterless constructor produce their default
    /// value.
    ///
    /// # Errors
    /// - [`Error::TypeResolution`] if `ty` is an open generic definition
    /// - [`Error::MemberNotFound`] if `ty` declares no constructor
    /// - overload, access and conversion errors as for [`BridgeContext::invoke`]
    pub fn construct(
        &self,
        ty: &HostTypeRc,
        flags: HostItemFlags,
        args: &[Dynamic],
    ) -> Result<HostValue> {
        trace!("construct {} with {} arguments", ty.fullname(), args.len());
        if ty.is_open_generic() {
            return Err(resolution_error!(
                ty.fullname(),
                "cannot create an instance of an open generic type"
            ));
        }

        let constructors = ty.constructors();
        if args.is_empty()
            && ty.is_value_type()
            && !constructors.iter().any(|constructor| constructor.accepts_arity(0))
        {
            return Ok(HostValue::default_for(ty));
        }

        if constructors.is_empty() {
            return Err(not_found(ty.fullname(), CONSTRUCTOR_NAME));
        }

        let candidates: Vec<MemberMatch<MethodRc>> = constructors
            .into_iter()
            .map(|member| MemberMatch {
                declaring: ty.clone(),
                member,
            })
            .collect();
        self.call_method(flags, CONSTRUCTOR_NAME, &candidates, None, args)
    }

    fn indexer_of(&self, item: &HostItem, key: &Dynamic) -> Result<(MemberMatch<IndexerRc>, HostValue)> {
        let missing = || {
            let member = if key.is_string() {
                key.to_string()
            } else {
                INDEXER_NAME.to_string()
            };
            not_found(item.type_name(), &member)
        };

        let this = match item.target() {
            HostTarget::Object(object) => HostValue::Object(object.clone()),
            HostTarget::Value(value) => value.clone(),
            _ => return Err(missing()),
        };
        let ty = self.value_type(&this).ok_or_else(missing)?;
        let found = ty.find_indexer().ok_or_else(missing)?;
        self.check(item.flags(), &found.declaring, found.member.access, INDEXER_NAME)?;
        Ok((found, this))
    }

    /// Read `item[key]`.
    ///
    /// Integer keys address rank-1 arrays, script arrays of integers address rank-N arrays.
    /// String keys naming a member read that member; any other key goes to the default
    /// indexer of the item's type.
    ///
    /// # Errors
    /// [`Error::IndexOutOfBounds`] for array access outside the bounds, otherwise as
    /// [`BridgeContext::get_member`].
    pub fn index_get(&self, item: &HostItem, key: &Dynamic) -> Result<Dynamic> {
        if let HostTarget::Array(array) = item.target() {
            if key.is_int() {
                return array.get(&[index_of(key)?]).map(to_script);
            }
            if key.is_array() {
                let indices = indices_of(&key.as_array_ref().map_err(|_| {
                    conversion_error!("array indices", marshal::describe(key))
                })?)?;
                return array.get(&indices).map(to_script);
            }
        }

        if key.is_string() {
            let name = key.to_string();
            if self.has_member(item, &name) {
                return self.get_member(item, &name);
            }
        }

        let (found, this) = self.indexer_of(item, key)?;
        let shape = found.member.key.substitute(found.declaring.type_arguments());
        let args = [to_host(key, &shape, self.registry())?];
        let invocation = self.invocation(INDEXER_NAME, &found.declaring, &args, Some(&this));
        match found.member.read(&invocation) {
            Some(value) => Ok(to_script(value?)),
            None => Err(not_found(item.type_name(), INDEXER_NAME)),
        }
    }

    /// Write `item[key] = value`; the counterpart of [`BridgeContext::index_get`].
    ///
    /// # Errors
    /// As [`BridgeContext::index_get`] and [`BridgeContext::set_member`].
    pub fn index_set(&self, item: &mut HostItem, key: &Dynamic, value: &Dynamic) -> Result<()> {
        if let HostTarget::Array(array) = item.target() {
            let indices = if key.is_array() {
                Some(indices_of(&key.as_array_ref().map_err(|_| {
                    conversion_error!("array indices", marshal::describe(key))
                })?)?)
            } else if key.is_int() {
                Some(vec![index_of(key)?])
            } else {
                None
            };

            if let Some(indices) = indices {
                let converted = to_host(value, &ParamShape::of(array.element_type()), self.registry())?;
                return array.set(&indices, converted);
            }
        }

        if key.is_string() {
            let name = key.to_string();
            if self.has_member(item, &name) {
                return self.set_member(item, &name, value);
            }
        }

        let (found, this) = self.indexer_of(item, key)?;
        let type_args = found.declaring.type_arguments();
        let args = [to_host(key, &found.member.key.substitute(type_args), self.registry())?];
        let converted = to_host(value, &found.member.value.substitute(type_args), self.registry())?;
        let invocation = self.invocation(INDEXER_NAME, &found.declaring, &args, Some(&this));
        match found.member.write(&invocation, converted) {
            Some(result) => result,
            None => Err(Error::AccessDenied {
                type_name: found.declaring.fullname(),
                member: INDEXER_NAME.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rhai::INT;

    use super::*;
    use crate::{
        test::{fixtures, TestObject},
        typesystem::{PrimitiveKind, TypeRegistry},
    };

    fn context() -> BridgeContext {
        let registry = Arc::new(TypeRegistry::new());
        fixtures::register_all(&registry).unwrap();
        BridgeContext::new(registry)
    }

    fn object_item(context: &BridgeContext, flags: HostItemFlags) -> HostItem {
        HostItem::from_value(TestObject::create(context.registry()))
            .unwrap()
            .with_flags(flags)
    }

    #[test]
    fn test_property_round_trip() {
        let context = context();
        let mut item = object_item(&context, HostItemFlags::DEFAULT);

        context
            .set_member(&mut item, "Name", &Dynamic::from("changed"))
            .unwrap();
        let name = context.get_member(&item, "Name").unwrap();
        assert_eq!(name.to_string(), "changed");

        assert!(matches!(
            context.set_member(&mut item, "Name", &Dynamic::from(1 as INT)),
            Err(Error::Conversion { .. })
        ));
        assert!(matches!(
            context.get_member(&item, "Missing"),
            Err(Error::MemberNotFound { .. })
        ));
        assert!(matches!(
            context.set_member(&mut item, "Id", &Dynamic::from(1 as INT)),
            Err(Error::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_member_write_back() {
        let context = context();
        let ty = context.registry().get_by_fullname(TestObject::FULLNAME).unwrap();
        let mut type_item = HostItem::for_type(ty, HostItemFlags::DEFAULT);
        let mut item = object_item(&context, HostItemFlags::DEFAULT);

        let event = context.get_member(&type_item, "StaticChange").unwrap();
        context.set_member(&mut type_item, "StaticChange", &event).unwrap();

        let other = context.get_member(&item, "Change").unwrap();
        assert!(matches!(
            context.set_member(&mut type_item, "StaticChange", &other),
            Err(Error::MemberNotFound { .. })
        ));

        context
            .set_member(&mut item, "Id", &Dynamic::from(7 as INT))
            .unwrap();
        assert!(matches!(
            context.set_member(&mut item, "Id", &Dynamic::from(8 as INT)),
            Err(Error::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_private_method_access() {
        let context = context();
        let args = [Dynamic::from(5 as INT)];

        let public = object_item(&context, HostItemFlags::DEFAULT);
        assert!(matches!(
            context.invoke(&public, "PrivateMethod", &args),
            Err(Error::AccessDenied { .. })
        ));

        let private = object_item(&context, HostItemFlags::PRIVATE_ACCESS);
        let result = context.invoke(&private, "PrivateMethod", &args).unwrap();
        assert_eq!(result.as_int().unwrap(), 10);

        let ty = context.registry().get_by_fullname(TestObject::FULLNAME).unwrap();
        context.access_context().set(Some(ty));
        assert_eq!(
            context.invoke(&public, "PrivateMethod", &args).unwrap().as_int().unwrap(),
            10
        );
    }

    #[test]
    fn test_arrays() {
        let context = context();
        let int = context.registry().primitive(PrimitiveKind::Int32);
        let array = HostArray::new(int, &[3, 5, 7]).unwrap();
        let mut item = HostItem::from_value(HostValue::Array(array.clone())).unwrap();

        assert_eq!(context.get_member(&item, "Rank").unwrap().as_int().unwrap(), 3);
        assert_eq!(
            context
                .invoke(&item, "GetLength", &[Dynamic::from(2 as INT)])
                .unwrap()
                .as_int()
                .unwrap(),
            7
        );

        let at = |i: INT, j: INT, k: INT| {
            vec![Dynamic::from(i), Dynamic::from(j), Dynamic::from(k)]
        };
        let mut set_args = vec![Dynamic::from(42 as INT)];
        set_args.extend(at(2, 4, 6));
        context.invoke(&item, "SetValue", &set_args).unwrap();
        assert_eq!(array.get(&[2, 4, 6]).unwrap(), HostValue::I32(42));

        array.set(&[1, 1, 1], HostValue::I32(7)).unwrap();
        let key = Dynamic::from_array(at(1, 1, 1));
        assert_eq!(context.index_get(&item, &key).unwrap().as_int().unwrap(), 7);

        context
            .index_set(&mut item, &key, &Dynamic::from(8 as INT))
            .unwrap();
        assert_eq!(array.get(&[1, 1, 1]).unwrap(), HostValue::I32(8));

        assert!(matches!(
            context.invoke(&item, "GetValue", &at(3, 0, 0)),
            Err(Error::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_open_generic_rules() {
        let context = context();
        let list = context.resolver().resolve("List", &[], None).unwrap();
        let flags = HostItemFlags::DEFAULT;

        assert!(matches!(
            context.construct(&list, flags, &[]),
            Err(Error::TypeResolution { .. })
        ));

        let item = HostItem::for_type(list, flags);
        let int = Dynamic::from(HostItem::for_type(
            context.registry().primitive(PrimitiveKind::Int32),
            flags,
        ));
        let closed = context.invoke(&item, "Of", &[int.clone()]).unwrap();
        let closed = closed.read_lock::<HostItem>().unwrap().clone();
        let HostTarget::Type(closed_ty) = closed.target() else {
            panic!("expected a type item");
        };

        let instance = context.construct(closed_ty, flags, &[]).unwrap();
        let instance = HostItem::from_value(instance).unwrap();
        context
            .invoke(&instance, "Add", &[Dynamic::from(3 as INT)])
            .unwrap();
        assert!(matches!(
            context.invoke(&instance, "Add", &[Dynamic::from("three")]),
            Err(Error::OverloadResolution { .. })
        ));
        assert_eq!(context.get_member(&instance, "Count").unwrap().as_int().unwrap(), 1);
        assert_eq!(
            context.index_get(&instance, &Dynamic::from(0 as INT)).unwrap().as_int().unwrap(),
            3
        );

        assert!(matches!(
            context.invoke(&closed, "Of", &[int]),
            Err(Error::TypeResolution { .. })
        ));
    }

    #[test]
    fn test_namespace_navigation() {
        let context = context();
        let root = HostItem::namespace(
            crate::typesystem::NamespaceNode::root(),
            HostItemFlags::DEFAULT,
        );

        let system = context.get_member(&root, "System").unwrap();
        let system = system.read_lock::<HostItem>().unwrap().clone();
        let int = context.get_member(&system, "Int32").unwrap();
        assert_eq!(int.read_lock::<HostItem>().unwrap().display(), "System.Int32");

        assert!(matches!(
            context.get_member(&system, "NoSuchThing"),
            Err(Error::TypeResolution { .. })
        ));
    }
}
