//! Value conversion between host and script space.
//!
//! Scalars cross the boundary as native script values; enums and structs cross by value inside
//! a [`HostItem`]; host objects, arrays and types cross by reference inside a [`HostItem`], so
//! marshaling the same object or array twice yields two script values that compare equal and
//! share state.
//!
//! # Key Functions
//! - [`to_script`]: Host value to script value
//! - [`to_host`]: Script value to the host value a parameter shape expects
//! - [`to_host_any`]: Script value to its natural host value
//! - [`score`]: Compatibility of a script value with a parameter shape, for overload selection
//!
//! # Integer Narrowing
//!
//! Script integers are 64-bit. Without a requested shape they become `Int32` when they fit
//! and `Int64` otherwise. Integral floating point values are accepted for integer shapes.

use rhai::{Dynamic, FLOAT, INT};

use crate::{
    host::{HostItem, HostTarget},
    typesystem::{HostTypeRc, ParamShape, TypeRegistry},
    value::{EnumValue, HostArray, HostValue, ScriptValue},
    Result,
};

/// Script-side tag of a value, the basis of compatibility scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ValueTag {
    /// Unit / null
    Null,
    /// Boolean
    Bool,
    /// Character
    Char,
    /// Integer
    Integer,
    /// Floating point number
    Float,
    /// String
    String,
    /// Host object reference
    Object,
    /// Host enum value
    Enum,
    /// Host struct value
    Struct,
    /// Host array reference
    Array,
    /// Host type
    Type,
    /// Any other host item (namespace, event, connection)
    HostItem,
    /// Native script array
    ScriptArray,
    /// Any other native script value
    ScriptObject,
}

/// Determine the tag of a script value
#[must_use]
pub fn tag_of(value: &Dynamic) -> ValueTag {
    if value.is_unit() {
        ValueTag::Null
    } else if value.is_bool() {
        ValueTag::Bool
    } else if value.is_char() {
        ValueTag::Char
    } else if value.is_int() {
        ValueTag::Integer
    } else if value.is_float() {
        ValueTag::Float
    } else if value.is_string() {
        ValueTag::String
    } else if value.is_array() {
        ValueTag::ScriptArray
    } else if let Some(item) = value.read_lock::<HostItem>() {
        match item.target() {
            HostTarget::Object(_) => ValueTag::Object,
            HostTarget::Type(_) => ValueTag::Type,
            HostTarget::Array(_) => ValueTag::Array,
            HostTarget::Value(HostValue::Enum(_)) => ValueTag::Enum,
            HostTarget::Value(HostValue::Struct(_)) => ValueTag::Struct,
            _ => ValueTag::HostItem,
        }
    } else {
        ValueTag::ScriptObject
    }
}

/// Describe a script value for error messages
#[must_use]
pub fn describe(value: &Dynamic) -> String {
    match value.read_lock::<HostItem>() {
        Some(item) => item.type_name(),
        None => value.type_name().to_string(),
    }
}

/// Convert a host value into a script value.
///
/// Reference-like values and value aggregates are wrapped in a [`HostItem`] with default
/// access flags.
#[must_use]
pub fn to_script(value: HostValue) -> Dynamic {
    match value {
        HostValue::Null | HostValue::Void => Dynamic::UNIT,
        HostValue::Bool(value) => Dynamic::from(value),
        HostValue::Char(value) => Dynamic::from(value),
        HostValue::I32(value) => Dynamic::from(INT::from(value)),
        HostValue::I64(value) => Dynamic::from(value as INT),
        HostValue::F64(value) => Dynamic::from(value as FLOAT),
        HostValue::String(value) => Dynamic::from(value),
        HostValue::Script(value) => value.0,
        other => match HostItem::from_value(other) {
            Some(item) => Dynamic::from(item),
            None => Dynamic::UNIT,
        },
    }
}

fn integer_of(value: &Dynamic) -> Option<INT> {
    if let Ok(integer) = value.as_int() {
        return Some(integer);
    }

    match value.as_float() {
        Ok(float)
            if float.fract() == 0.0 && float >= INT::MIN as FLOAT && float <= INT::MAX as FLOAT =>
        {
            Some(float as INT)
        }
        _ => None,
    }
}

/// Convert a script value into its natural host value.
///
/// Host items unwrap to the value they carry; script aggregates without host representation
/// become [`HostValue::Script`].
#[must_use]
pub fn to_host_any(value: &Dynamic) -> HostValue {
    match tag_of(value) {
        ValueTag::Null => HostValue::Null,
        ValueTag::Bool => HostValue::Bool(value.as_bool().unwrap_or_default()),
        ValueTag::Char => HostValue::Char(value.as_char().unwrap_or_default()),
        ValueTag::Integer => {
            let integer = value.as_int().unwrap_or_default();
            match i32::try_from(integer) {
                Ok(narrow) => HostValue::I32(narrow),
                Err(_) => HostValue::I64(integer),
            }
        }
        ValueTag::Float => HostValue::F64(value.as_float().unwrap_or_default()),
        ValueTag::String => HostValue::String(value.to_string()),
        ValueTag::ScriptArray | ValueTag::ScriptObject | ValueTag::HostItem => {
            match value.read_lock::<HostItem>().and_then(|item| item.to_host_value()) {
                Some(host) => host,
                None => HostValue::Script(ScriptValue(value.clone())),
            }
        }
        _ => value
            .read_lock::<HostItem>()
            .and_then(|item| item.to_host_value())
            .unwrap_or(HostValue::Null),
    }
}

/// Convert a script value into the host value `shape` expects.
///
/// # Errors
/// Returns [`crate::Error::Conversion`] if the value cannot take the requested shape, including
/// script arrays whose nesting depth differs from the requested array rank.
pub fn to_host(value: &Dynamic, shape: &ParamShape, registry: &TypeRegistry) -> Result<HostValue> {
    let tag = tag_of(value);
    let mismatch = || conversion_error!(shape, describe(value));

    if tag == ValueTag::Null {
        let accepts_null =
            shape.is_nullable() || matches!(shape, ParamShape::Generic(_) | ParamShape::Void);
        return if accepts_null {
            Ok(HostValue::Null)
        } else {
            Err(mismatch())
        };
    }

    match shape {
        ParamShape::Any | ParamShape::Generic(_) => Ok(to_host_any(value)),
        ParamShape::Void => Ok(HostValue::Null),
        ParamShape::Bool => value.as_bool().map(HostValue::Bool).map_err(|_| mismatch()),
        ParamShape::Char => match tag {
            ValueTag::Char => Ok(HostValue::Char(value.as_char().unwrap_or_default())),
            ValueTag::String => {
                let text = value.to_string();
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(single), None) => Ok(HostValue::Char(single)),
                    _ => Err(mismatch()),
                }
            }
            _ => Err(mismatch()),
        },
        ParamShape::Int32 => integer_of(value)
            .and_then(|integer| i32::try_from(integer).ok())
            .map(HostValue::I32)
            .ok_or_else(mismatch),
        ParamShape::Int64 => integer_of(value).map(HostValue::I64).ok_or_else(mismatch),
        ParamShape::Double => match tag {
            ValueTag::Float => Ok(HostValue::F64(value.as_float().unwrap_or_default())),
            ValueTag::Integer => Ok(HostValue::F64(value.as_int().unwrap_or_default() as FLOAT)),
            _ => Err(mismatch()),
        },
        ParamShape::String => match tag {
            ValueTag::String | ValueTag::Char => Ok(HostValue::String(value.to_string())),
            _ => Err(mismatch()),
        },
        ParamShape::Type => match value.read_lock::<HostItem>().map(|item| item.target().clone()) {
            Some(HostTarget::Type(ty)) => Ok(HostValue::Type(ty)),
            _ => Err(mismatch()),
        },
        ParamShape::Instance(expected) => {
            let Some(item) = value.read_lock::<HostItem>() else {
                return Err(mismatch());
            };
            match item.target() {
                HostTarget::Object(object) if expected.is_assignable_from(&object.host_type()) => {
                    Ok(HostValue::Object(object.clone()))
                }
                HostTarget::Value(HostValue::Enum(enum_value))
                    if enum_value.ty.token == expected.token =>
                {
                    Ok(HostValue::Enum(enum_value.clone()))
                }
                HostTarget::Value(HostValue::Struct(struct_value))
                    if struct_value.ty.token == expected.token =>
                {
                    Ok(HostValue::Struct(struct_value.clone()))
                }
                _ => Err(mismatch()),
            }
        }
        ParamShape::Array { element, rank } => {
            if tag == ValueTag::ScriptArray {
                return script_array_to_host(value, element, *rank, registry);
            }

            match value.read_lock::<HostItem>().map(|item| item.target().clone()) {
                Some(HostTarget::Array(array))
                    if array.rank() == *rank
                        && (array.element_type().token == element.token
                            || element.is_assignable_from(array.element_type())) =>
                {
                    Ok(HostValue::Array(array))
                }
                _ => Err(mismatch()),
            }
        }
        ParamShape::Out(_) => match value.read_lock::<HostItem>().map(|item| item.target().clone()) {
            Some(HostTarget::Object(object)) => Ok(HostValue::Object(object)),
            _ => Err(conversion_error!(
                "host variable for output parameter",
                describe(value)
            )),
        },
    }
}

/// Convert a script value into a constant of the enum `ty`, by number, by constant name or
/// from an existing value of the same enum.
///
/// # Errors
/// Returns [`crate::Error::Conversion`] for unknown names and values of other types.
pub fn to_enum(
    value: &Dynamic,
    ty: &HostTypeRc,
    registry: &TypeRegistry,
) -> Result<HostValue> {
    if let Some(integer) = integer_of(value) {
        return Ok(HostValue::Enum(EnumValue::new(ty, integer)));
    }

    if value.is_string() {
        let name = value.to_string();
        return ty
            .enum_value(&name)
            .map(|constant| HostValue::Enum(EnumValue::new(ty, constant)))
            .ok_or_else(|| conversion_error!(ty.fullname(), format!("unknown constant '{}'", name)));
    }

    to_host(value, &ParamShape::Instance(ty.clone()), registry)
}

/// Rank and lengths of a nested script array, following first elements
fn script_array_dimensions(value: &Dynamic, rank: usize) -> Result<Vec<usize>> {
    let mut dimensions = Vec::with_capacity(rank);
    let mut current = value.clone();

    for depth in 0..rank {
        let next = {
            let array = current.as_array_ref().map_err(|_| {
                conversion_error!(
                    format!("rank-{} array", rank),
                    format!("rank-{} script array", depth)
                )
            })?;
            dimensions.push(array.len());
            array.first().cloned()
        };

        match next {
            Some(first) => current = first,
            None => {
                dimensions.resize(rank, 0);
                break;
            }
        }
    }

    Ok(dimensions)
}

fn flatten_script_array(
    value: &Dynamic,
    dimensions: &[usize],
    depth: usize,
    element: &ParamShape,
    registry: &TypeRegistry,
    out: &mut Vec<HostValue>,
) -> Result<()> {
    if depth == dimensions.len() {
        out.push(to_host(value, element, registry)?);
        return Ok(());
    }

    let array = value.as_array_ref().map_err(|_| {
        conversion_error!(
            format!("rank-{} array", dimensions.len()),
            format!("rank-{} script array", depth)
        )
    })?;

    if array.len() != dimensions[depth] {
        return Err(conversion_error!(
            format!("{} elements in dimension {}", dimensions[depth], depth),
            format!("jagged script array with {} elements", array.len())
        ));
    }

    for item in array.iter() {
        flatten_script_array(item, dimensions, depth + 1, element, registry, out)?;
    }

    Ok(())
}

fn script_array_to_host(
    value: &Dynamic,
    element: &HostTypeRc,
    rank: usize,
    registry: &TypeRegistry,
) -> Result<HostValue> {
    let dimensions = script_array_dimensions(value, rank)?;
    let mut elements = Vec::with_capacity(dimensions.iter().product());
    flatten_script_array(
        value,
        &dimensions,
        0,
        &ParamShape::of(element),
        registry,
        &mut elements,
    )?;

    Ok(HostValue::Array(HostArray::with_elements(
        element.clone(),
        &dimensions,
        elements,
    )?))
}

/// Nesting depth of a native script array, following first elements
fn script_array_depth(value: &Dynamic) -> usize {
    let mut depth = 0;
    let mut current = value.clone();

    loop {
        let next = match current.as_array_ref() {
            Ok(array) => array.first().cloned(),
            Err(_) => return depth,
        };
        depth += 1;
        match next {
            Some(first) => current = first,
            None => return depth,
        }
    }
}

/// Score how well a script value fits a parameter shape.
///
/// - `4`: exact match
/// - `3`: lossless widening or derived reference type
/// - `2`: related conversion (integral float to integer, char to string, script array)
/// - `1`: `System.Object`, generic parameters, null for nullable shapes
/// - `None`: incompatible
#[must_use]
pub fn score(value: &Dynamic, shape: &ParamShape) -> Option<u32> {
    let tag = tag_of(value);

    if tag == ValueTag::Null {
        return match shape {
            ParamShape::Any | ParamShape::Generic(_) => Some(1),
            other if other.is_nullable() => Some(1),
            _ => None,
        };
    }

    match shape {
        ParamShape::Any | ParamShape::Generic(_) => Some(1),
        ParamShape::Void => None,
        ParamShape::Bool => (tag == ValueTag::Bool).then_some(4),
        ParamShape::Char => match tag {
            ValueTag::Char => Some(4),
            ValueTag::String if value.to_string().chars().count() == 1 => Some(2),
            _ => None,
        },
        ParamShape::Int32 => match tag {
            ValueTag::Integer => value
                .as_int()
                .ok()
                .and_then(|integer| i32::try_from(integer).ok())
                .map(|_| 4),
            ValueTag::Float => integer_of(value)
                .and_then(|integer| i32::try_from(integer).ok())
                .map(|_| 2),
            _ => None,
        },
        ParamShape::Int64 => match tag {
            ValueTag::Integer => match value.as_int().map(i32::try_from) {
                Ok(Ok(_)) => Some(3),
                _ => Some(4),
            },
            ValueTag::Float => integer_of(value).map(|_| 2),
            _ => None,
        },
        ParamShape::Double => match tag {
            ValueTag::Float => Some(4),
            ValueTag::Integer => Some(2),
            _ => None,
        },
        ParamShape::String => match tag {
            ValueTag::String => Some(4),
            ValueTag::Char => Some(2),
            _ => None,
        },
        ParamShape::Type => (tag == ValueTag::Type).then_some(4),
        ParamShape::Instance(expected) => {
            let item = value.read_lock::<HostItem>()?;
            match item.target() {
                HostTarget::Object(object) => {
                    let actual = object.host_type();
                    if actual.token == expected.token {
                        Some(4)
                    } else if expected.is_assignable_from(&actual) {
                        Some(3)
                    } else {
                        None
                    }
                }
                HostTarget::Value(HostValue::Enum(enum_value)) => {
                    (enum_value.ty.token == expected.token).then_some(4)
                }
                HostTarget::Value(HostValue::Struct(struct_value)) => {
                    (struct_value.ty.token == expected.token).then_some(4)
                }
                _ => None,
            }
        }
        ParamShape::Array { element, rank } => match tag {
            ValueTag::ScriptArray => (script_array_depth(value) >= *rank).then_some(2),
            ValueTag::Array => {
                let item = value.read_lock::<HostItem>()?;
                match item.target() {
                    HostTarget::Array(array) if array.rank() == *rank => {
                        if array.element_type().token == element.token {
                            Some(4)
                        } else if element.is_assignable_from(array.element_type()) {
                            Some(3)
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        },
        ParamShape::Out(_) => (tag == ValueTag::Object).then_some(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::HostItemFlags,
        typesystem::{PrimitiveKind, TypeBuilder},
        value::StructValue,
        Error,
    };

    #[test]
    fn test_scalar_round_trip() {
        let registry = TypeRegistry::new();
        let values = [
            (HostValue::Bool(true), ParamShape::Bool),
            (HostValue::Char('x'), ParamShape::Char),
            (HostValue::I32(-7), ParamShape::Int32),
            (HostValue::I64(1 << 40), ParamShape::Int64),
            (HostValue::F64(2.5), ParamShape::Double),
            (HostValue::String("text".into()), ParamShape::String),
        ];

        for (value, shape) in values {
            let script = to_script(value.clone());
            assert_eq!(to_host(&script, &shape, &registry).unwrap(), value);
            assert_eq!(to_host_any(&script), value);
        }
    }

    #[test]
    fn test_integer_narrowing() {
        let registry = TypeRegistry::new();

        assert_eq!(to_host_any(&Dynamic::from(42 as INT)), HostValue::I32(42));
        assert_eq!(
            to_host_any(&Dynamic::from(1 as INT + i32::MAX as INT)),
            HostValue::I64(i32::MAX as i64 + 1)
        );
        assert_eq!(
            to_host(&Dynamic::from(3.0 as FLOAT), &ParamShape::Int32, &registry).unwrap(),
            HostValue::I32(3)
        );
        assert!(matches!(
            to_host(&Dynamic::from(3.5 as FLOAT), &ParamShape::Int32, &registry),
            Err(Error::Conversion { .. })
        ));
        assert!(matches!(
            to_host(&Dynamic::from(i64::MAX), &ParamShape::Int32, &registry),
            Err(Error::Conversion { .. })
        ));
    }

    #[test]
    fn test_enum_and_struct_by_value() {
        let registry = TypeRegistry::new();
        let day = registry
            .define(
                TypeBuilder::enumeration("Demo", "Day")
                    .enum_value("Monday", 1)
                    .enum_value("Tuesday", 2),
            )
            .unwrap();
        let point = registry
            .define(TypeBuilder::structure("Demo", "Point").field("X", ParamShape::Int32))
            .unwrap();

        let tuesday = HostValue::Enum(EnumValue::new(&day, 2));
        let script = to_script(tuesday.clone());
        assert_eq!(tag_of(&script), ValueTag::Enum);
        assert_eq!(
            to_host(&script, &ParamShape::Instance(day.clone()), &registry).unwrap(),
            tuesday
        );

        let origin = HostValue::Struct(StructValue::default_of(&point).with("X", HostValue::I32(4)));
        let script = to_script(origin.clone());
        assert_eq!(to_host_any(&script), origin);
        assert!(to_host(&script, &ParamShape::Instance(day), &registry).is_err());
    }

    #[test]
    fn test_script_array_to_rank_2() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::Int32);
        let row = |a: INT, b: INT| Dynamic::from_array(vec![Dynamic::from(a), Dynamic::from(b)]);
        let grid = Dynamic::from_array(vec![row(1, 2), row(3, 4), row(5, 6)]);

        let HostValue::Array(array) = to_host(&grid, &ParamShape::array(&int, 2), &registry).unwrap()
        else {
            panic!("expected host array");
        };
        assert_eq!(array.dimensions(), &[3, 2]);
        assert_eq!(array.get(&[2, 1]).unwrap(), HostValue::I32(6));

        assert!(matches!(
            to_host(&grid, &ParamShape::array(&int, 3), &registry),
            Err(Error::Conversion { .. })
        ));

        let jagged = Dynamic::from_array(vec![
            row(1, 2),
            Dynamic::from_array(vec![Dynamic::from(3 as INT)]),
        ]);
        assert!(matches!(
            to_host(&jagged, &ParamShape::array(&int, 2), &registry),
            Err(Error::Conversion { .. })
        ));
    }

    #[test]
    fn test_host_array_identity() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::Int32);
        let array = HostArray::new(int.clone(), &[3, 5, 7]).unwrap();

        let first = to_script(HostValue::Array(array.clone()));
        let second = to_script(HostValue::Array(array.clone()));
        let (HostValue::Array(a), HostValue::Array(b)) = (to_host_any(&first), to_host_any(&second))
        else {
            panic!("expected arrays");
        };
        assert!(a.is_same(&b));
        assert!(a.is_same(&array));
        assert_eq!(score(&first, &ParamShape::array(&int, 3)), Some(4));
        assert_eq!(score(&first, &ParamShape::array(&int, 2)), None);
    }

    #[test]
    fn test_scores() {
        let registry = TypeRegistry::new();
        let small = Dynamic::from(5 as INT);
        let large = Dynamic::from(i64::MAX);

        assert_eq!(score(&small, &ParamShape::Int32), Some(4));
        assert_eq!(score(&small, &ParamShape::Int64), Some(3));
        assert_eq!(score(&small, &ParamShape::Double), Some(2));
        assert_eq!(score(&small, &ParamShape::Any), Some(1));
        assert_eq!(score(&small, &ParamShape::String), None);
        assert_eq!(score(&large, &ParamShape::Int32), None);
        assert_eq!(score(&large, &ParamShape::Int64), Some(4));
        assert_eq!(score(&Dynamic::UNIT, &ParamShape::String), Some(1));
        assert_eq!(score(&Dynamic::UNIT, &ParamShape::Int32), None);

        let ty = to_script(HostValue::Type(registry.primitive(PrimitiveKind::String)));
        assert_eq!(score(&ty, &ParamShape::Type), Some(4));
        assert_eq!(
            HostItem::from_value(HostValue::Type(registry.object()))
                .unwrap()
                .flags(),
            HostItemFlags::DEFAULT
        );
    }
}
