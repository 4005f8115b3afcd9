//! Host types shared by the integration tests, declared through the public API only.

#![allow(dead_code)]

use std::{
    any::Any,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use hostbridge::prelude::*;
use parking_lot::RwLock;

pub const NAMESPACE: &str = "Telemetry";

/// A named sensor with a `Tripped` event and a private calibration method. The type raises
/// the static `Alarm` event from `SoundAlarm(level)`.
pub struct Sensor {
    ty: HostTypeRc,
    name: RwLock<String>,
    reading: AtomicI32,
    pub tripped: EventSource,
}

impl Sensor {
    pub const FULLNAME: &'static str = "Telemetry.Sensor";

    pub fn new(ty: &HostTypeRc, name: &str) -> Sensor {
        Sensor {
            ty: ty.clone(),
            name: RwLock::new(name.to_string()),
            reading: AtomicI32::new(0),
            tripped: EventSource::new("Tripped"),
        }
    }

    pub fn reading(&self) -> i32 {
        self.reading.load(Ordering::Relaxed)
    }
}

impl HostObject for Sensor {
    fn host_type(&self) -> HostTypeRc {
        self.ty.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_display(&self) -> String {
        format!("Sensor({})", self.name.read())
    }
}

/// `Telemetry.Buffer<T>`, a growable host list
pub struct Buffer {
    ty: HostTypeRc,
    items: RwLock<Vec<HostValue>>,
}

impl HostObject for Buffer {
    fn host_type(&self) -> HostTypeRc {
        self.ty.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn int_arg(inv: &Invocation<'_>, index: usize) -> Result<i32> {
    match inv.arg(index)? {
        HostValue::I32(value) => Ok(*value),
        other => Err(inv.fail(format!("expected Int32, found {}", other.describe()))),
    }
}

fn string_arg(inv: &Invocation<'_>, index: usize) -> Result<String> {
    match inv.arg(index)? {
        HostValue::String(value) => Ok(value.clone()),
        other => Err(inv.fail(format!("expected String, found {}", other.describe()))),
    }
}

/// Declare the telemetry types in `registry`
pub fn register(registry: &TypeRegistry) -> Result<()> {
    if registry.has_namespace(NAMESPACE) {
        return Ok(());
    }

    let alarm = EventSource::new("Alarm");
    let sound = alarm.clone();

    registry.define(
        TypeBuilder::class(NAMESPACE, "Sensor")
            .assembly("Telemetry.Core")
            .constructor(
                Method::constructor(|inv| {
                    let name = string_arg(inv, 0)?;
                    Ok(HostValue::object(Sensor::new(inv.declaring(), &name)))
                })
                .param("name", ParamShape::String),
            )
            .property(
                Property::new("Name", ParamShape::String)
                    .getter(|inv| Ok(HostValue::String(inv.this_as::<Sensor>()?.name.read().clone())))
                    .setter(|inv, value| match value {
                        HostValue::String(name) => {
                            *inv.this_as::<Sensor>()?.name.write() = name;
                            Ok(())
                        }
                        other => Err(inv.fail(format!("expected String, found {}", other.describe()))),
                    }),
            )
            .property(
                Property::new("Reading", ParamShape::Int32)
                    .getter(|inv| Ok(HostValue::I32(inv.this_as::<Sensor>()?.reading())))
                    .read_only(),
            )
            .method(
                Method::new("Trip", |inv| {
                    let sensor = inv.this_as::<Sensor>()?;
                    let value = int_arg(inv, 0)?;
                    sensor.reading.store(value, Ordering::Relaxed);
                    sensor.tripped.raise(&[HostValue::I32(value)])?;
                    Ok(HostValue::Void)
                })
                .param("value", ParamShape::Int32),
            )
            .method(
                Method::new("Describe", |inv| {
                    Ok(HostValue::String(format!("sensor {}", inv.this_as::<Sensor>()?.name.read())))
                })
                .returns(ParamShape::String),
            )
            .method(
                Method::new("Calibrate", |inv| Ok(HostValue::I32(int_arg(inv, 0)? + 100)))
                    .param("offset", ParamShape::Int32)
                    .returns(ParamShape::Int32)
                    .access(MemberAccess::PRIVATE),
            )
            .method(
                Method::new("TryParse", |inv| {
                    let text = string_arg(inv, 0)?;
                    let target = HostVariable::of(inv.arg(1)?)
                        .ok_or_else(|| inv.fail("expected a host variable"))?;
                    match text.trim().parse::<i32>() {
                        Ok(value) => {
                            target.set_value(HostValue::I32(value));
                            Ok(HostValue::Bool(true))
                        }
                        Err(_) => Ok(HostValue::Bool(false)),
                    }
                })
                .param("text", ParamShape::String)
                .param("result", ParamShape::out(ParamShape::Int32))
                .returns(ParamShape::Bool)
                .as_static(),
            )
            .method(
                Method::new("SoundAlarm", move |inv| {
                    sound.raise(&[HostValue::I32(int_arg(inv, 0)?)])?;
                    Ok(HostValue::Void)
                })
                .param("level", ParamShape::Int32)
                .as_static(),
            )
            .event(EventMember::new("Tripped", |inv| {
                Ok(inv.this_as::<Sensor>()?.tripped.clone())
            }))
            .event(EventMember::new("Alarm", move |_| Ok(alarm.clone())).as_static()),
    )?;

    registry.define(
        TypeBuilder::class(NAMESPACE, "Buffer")
            .assembly("Telemetry.Core")
            .generic(1)
            .constructor(Method::constructor(|inv| {
                Ok(HostValue::object(Buffer {
                    ty: inv.declaring().clone(),
                    items: RwLock::new(Vec::new()),
                }))
            }))
            .method(
                Method::new("Add", |inv| {
                    inv.this_as::<Buffer>()?.items.write().push(inv.arg(0)?.clone());
                    Ok(HostValue::Void)
                })
                .param("item", ParamShape::Generic(0)),
            )
            .property(Property::new("Count", ParamShape::Int32).getter(|inv| {
                Ok(HostValue::I32(inv.this_as::<Buffer>()?.items.read().len() as i32))
            }))
            .indexer(Indexer::new(ParamShape::Int32, ParamShape::Generic(0)).getter(|inv| {
                let index = int_arg(inv, 0)?;
                let items = inv.this_as::<Buffer>()?.items.read();
                usize::try_from(index)
                    .ok()
                    .and_then(|index| items.get(index).cloned())
                    .ok_or_else(|| inv.fail(format!("no element at {}", index)))
            })),
    )?;

    let status = ["Idle", "Active", "Failed"]
        .iter()
        .zip(0..)
        .fold(TypeBuilder::enumeration(NAMESPACE, "Status"), |builder, (name, value)| {
            builder.enum_value(name, value)
        });
    registry.define(status.assembly("Telemetry.Core"))?;

    registry.define(
        TypeBuilder::structure(NAMESPACE, "Sample")
            .assembly("Telemetry.Core")
            .field("Value", ParamShape::Int32)
            .field("Weight", ParamShape::Double),
    )?;

    Ok(())
}

/// A registry holding the telemetry types
pub fn registry() -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new());
    register(&registry).unwrap();
    registry
}

/// Route library logs to the test output; filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine with the `host` helper object and the telemetry types bound by simple name
pub fn engine_with(config: EngineConfig) -> ScriptEngine {
    init_tracing();
    let registry = registry();
    let engine = ScriptEngine::with_config(registry.clone(), config).unwrap();
    engine
        .add_host_object("host", HostFunctions::create(&registry).unwrap(), HostItemFlags::DEFAULT)
        .unwrap();
    for name in ["Sensor", "Buffer", "Status", "Sample"] {
        engine
            .add_host_type(name, &format!("{}.{}", NAMESPACE, name), HostItemFlags::DEFAULT)
            .unwrap();
    }
    engine
        .add_host_type("Int32", "System.Int32", HostItemFlags::DEFAULT)
        .unwrap();
    engine
}

pub fn engine() -> ScriptEngine {
    engine_with(EngineConfig::default())
}

/// Create a sensor and keep a typed handle to it
pub fn sensor(engine: &ScriptEngine, name: &str) -> (HostValue, Arc<dyn HostObject>) {
    let ty = engine.registry().get_by_fullname(Sensor::FULLNAME).unwrap();
    let object: Arc<dyn HostObject> = Arc::new(Sensor::new(&ty, name));
    (HostValue::Object(object.clone()), object)
}

/// Downcast a sensor handle
pub fn as_sensor(object: &Arc<dyn HostObject>) -> &Sensor {
    object.as_any().downcast_ref::<Sensor>().unwrap()
}
