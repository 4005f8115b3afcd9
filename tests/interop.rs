//! Integration tests for host objects, types, arrays and events seen from script.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use hostbridge::prelude::*;

fn recorder(engine: &ScriptEngine) -> (HostValue, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let delegate = HostDelegate::create(engine.registry(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(HostValue::Void)
    })
    .unwrap();
    (delegate, calls)
}

#[test]
fn test_properties_and_methods() -> Result<()> {
    let engine = common::engine();
    let (sensor, handle) = common::sensor(&engine, "intake");
    engine.add_host_object("intake", sensor, HostItemFlags::DEFAULT)?;

    assert_eq!(engine.evaluate("intake.Name")?, HostValue::String("intake".into()));
    engine.execute("intake.Name = \"exhaust\"; intake.Trip(12);")?;
    assert_eq!(common::as_sensor(&handle).reading(), 12);
    assert_eq!(engine.evaluate("intake.Describe()")?, HostValue::String("sensor exhaust".into()));

    // read-only property
    match engine.execute("intake.Reading = 3;") {
        Err(Error::ExternalCall(inner)) => {
            assert!(matches!(*inner, Error::AccessDenied { .. }))
        }
        other => panic!("expected an access failure, got {:?}", other),
    }

    // wrong argument type
    assert!(matches!(
        engine.execute("intake.Trip(\"high\");"),
        Err(Error::ExternalCall(_))
    ));
    Ok(())
}

#[test]
fn test_construction_and_generics() -> Result<()> {
    let engine = common::engine();

    engine.execute(
        r#"
        let probe = host.newObj(Sensor, "probe");
        let readings = host.newObj(Buffer.Of(Int32));
        readings.Add(5);
        readings.Add(7);
        "#,
    )?;
    assert_eq!(engine.evaluate("probe.Name")?, HostValue::String("probe".into()));
    assert_eq!(engine.evaluate("readings.Count")?, HostValue::I32(2));
    assert_eq!(engine.evaluate("readings[1]")?, HostValue::I32(7));

    // element type of the closed generic is enforced
    assert!(engine.execute("readings.Add(\"seven\");").is_err());

    let int = engine.registry().primitive(PrimitiveKind::Int32);
    let closed = engine
        .bridge()
        .resolver()
        .resolve("Telemetry.Buffer", &[int.clone()], None)?;
    let again = engine.bridge().resolver().resolve("Buffer", &[int], None)?;
    assert!(Arc::ptr_eq(&closed, &again));
    Ok(())
}

#[test]
fn test_out_parameter() -> Result<()> {
    let engine = common::engine();
    engine.execute(
        r#"
        let parsed = host.newVar(Int32);
        let ok = Sensor.TryParse("  42 ", parsed);
        let bad = Sensor.TryParse("forty-two", parsed);
        "#,
    )?;
    assert_eq!(engine.evaluate("ok")?, HostValue::Bool(true));
    assert_eq!(engine.evaluate("bad")?, HostValue::Bool(false));
    assert_eq!(engine.evaluate("parsed.value")?, HostValue::I32(42));
    Ok(())
}

#[test]
fn test_scalar_binding_is_rejected() -> Result<()> {
    let engine = common::engine();

    for value in [
        HostValue::I32(3),
        HostValue::String("text".into()),
        HostValue::Bool(true),
        HostValue::Null,
    ] {
        assert!(matches!(
            engine.add_host_object("scalar", value, HostItemFlags::DEFAULT),
            Err(Error::InvalidBinding { .. })
        ));
    }
    assert!(!engine.host_item_names().iter().any(|name| name == "scalar"));
    Ok(())
}

#[test]
fn test_enum_and_struct_round_trip() -> Result<()> {
    let engine = common::engine();
    let registry = engine.registry().clone();

    let status_type = registry.get_by_fullname("Telemetry.Status").unwrap();
    let active = HostValue::Enum(EnumValue::new(&status_type, 1));
    engine.add_host_object("current", active.clone(), HostItemFlags::DEFAULT)?;
    assert_eq!(engine.evaluate("current")?, active);
    assert_eq!(engine.evaluate("current == Status.Active")?, HostValue::Bool(true));
    assert_eq!(engine.evaluate("current != Status.Idle")?, HostValue::Bool(true));

    let sample_type = registry.get_by_fullname("Telemetry.Sample").unwrap();
    let sample = HostValue::Struct(
        StructValue::default_of(&sample_type)
            .with("Value", HostValue::I32(9))
            .with("Weight", HostValue::F64(0.5)),
    );
    engine.add_host_object("sample", sample.clone(), HostItemFlags::DEFAULT)?;
    assert_eq!(engine.evaluate("sample")?, sample);
    assert_eq!(engine.evaluate("sample.Value")?, HostValue::I32(9));

    // struct values are copied into script variables
    engine.execute("let copy = sample; copy.Value = 10;")?;
    assert_eq!(engine.evaluate("copy.Value")?, HostValue::I32(10));
    assert_eq!(engine.evaluate("sample.Value")?, HostValue::I32(9));

    let fresh = engine.evaluate("host.newObj(Sample)")?;
    assert_eq!(fresh, HostValue::Struct(StructValue::default_of(&sample_type)));
    Ok(())
}

#[test]
fn test_array_identity() -> Result<()> {
    let engine = common::engine();
    let int = engine.registry().primitive(PrimitiveKind::Int32);
    let array = HostArray::new(int, &[3, 5, 7])?;

    engine.add_host_object("grid", HostValue::Array(array.clone()), HostItemFlags::DEFAULT)?;
    engine.add_host_object("alias", HostValue::Array(array.clone()), HostItemFlags::DEFAULT)?;

    assert_eq!(engine.evaluate("grid.Rank")?, HostValue::I32(3));
    assert_eq!(engine.evaluate("grid.Length")?, HostValue::I32(105));
    for (dimension, length) in [3, 5, 7].iter().enumerate() {
        assert_eq!(
            engine.evaluate(&format!("grid.GetLength({})", dimension))?,
            HostValue::I32(*length)
        );
    }
    assert_eq!(engine.evaluate("grid == alias")?, HostValue::Bool(true));

    engine.execute("grid.SetValue(42, 2, 4, 6);")?;
    assert_eq!(array.get(&[2, 4, 6])?, HostValue::I32(42));
    assert_eq!(engine.evaluate("alias.GetValue(2, 4, 6)")?, HostValue::I32(42));

    array.set(&[1, 1, 1], HostValue::I32(7))?;
    assert_eq!(engine.evaluate("grid.GetValue(1, 1, 1)")?, HostValue::I32(7));

    assert!(matches!(
        engine.execute("grid.GetValue(3, 0, 0);"),
        Err(Error::ExternalCall(_))
    ));

    let HostValue::Array(returned) = engine.evaluate("grid")? else {
        panic!("expected the host array back");
    };
    assert!(returned.is_same(&array));
    Ok(())
}

#[test]
fn test_script_created_array() -> Result<()> {
    let engine = common::engine();
    engine.execute("let row = host.newArr(Int32, 4); row[2] = 11;")?;

    let HostValue::Array(row) = engine.evaluate("row")? else {
        panic!("expected a host array");
    };
    assert_eq!(row.rank(), 1);
    assert_eq!(row.get(&[2])?, HostValue::I32(11));
    assert_eq!(engine.evaluate("host.toArray(row).len()")?, HostValue::I32(4));
    Ok(())
}

#[test]
fn test_host_array_size_is_bounded() -> Result<()> {
    let engine = common::engine_with(EngineConfig::sandboxed());

    match engine.execute("let a = host.newArr(Int32, 2000000000, 2000000000, 2000000000);") {
        Err(Error::ExternalCall(inner)) => assert!(matches!(*inner, Error::Conversion { .. })),
        other => panic!("expected a conversion failure, got {:?}", other),
    }
    match engine.execute("let a = host.newArr(Int32, 1000, 1000);") {
        Err(Error::ExternalCall(inner)) => {
            assert!(matches!(*inner, Error::LimitExceeded(LimitKind::DataSize(_))))
        }
        other => panic!("expected the array limit, got {:?}", other),
    }
    assert_eq!(engine.evaluate("host.newArr(Int32, 100, 100).Length")?, HostValue::I32(10_000));

    let open = common::engine_with(EngineConfig::unrestricted());
    assert!(matches!(
        open.execute("let a = host.newArr(Int32, 2000000000, 2000000000, 2000000000);"),
        Err(Error::ExternalCall(_))
    ));
    Ok(())
}

#[test]
fn test_private_access() -> Result<()> {
    let engine = common::engine();
    let (sensor, _) = common::sensor(&engine, "valve");
    engine.add_host_object("public", sensor.clone(), HostItemFlags::DEFAULT)?;
    engine.add_host_object("trusted", sensor, HostItemFlags::PRIVATE_ACCESS)?;

    match engine.evaluate("public.Calibrate(5)") {
        Err(Error::ExternalCall(inner)) => {
            assert!(matches!(*inner, Error::AccessDenied { .. }))
        }
        other => panic!("expected an access failure, got {:?}", other),
    }
    assert_eq!(engine.evaluate("trusted.Calibrate(5)")?, HostValue::I32(105));

    let declaring = engine.registry().get_by_fullname(common::Sensor::FULLNAME).unwrap();
    engine.set_access_context(Some(declaring.clone()));
    assert!(engine.access_context().is_some_and(|ty| Arc::ptr_eq(&ty, &declaring)));
    assert_eq!(engine.evaluate("public.Calibrate(5)")?, HostValue::I32(105));

    engine.set_access_context(None);
    assert!(engine.evaluate("public.Calibrate(5)").is_err());
    Ok(())
}

#[test]
fn test_global_members_last_bound_wins() -> Result<()> {
    let engine = common::engine();
    let (first, _) = common::sensor(&engine, "first");
    let (second, _) = common::sensor(&engine, "second");

    engine.add_host_object("first", first.clone(), HostItemFlags::GLOBAL_MEMBERS)?;
    engine.add_host_object("second", second, HostItemFlags::GLOBAL_MEMBERS)?;
    assert_eq!(engine.evaluate("Describe()")?, HostValue::String("sensor second".into()));
    assert_eq!(engine.evaluate("Name")?, HostValue::String("second".into()));

    engine.add_host_object("first", first, HostItemFlags::GLOBAL_MEMBERS)?;
    assert_eq!(engine.evaluate("Describe()")?, HostValue::String("sensor first".into()));

    assert!(engine.remove_host_item("first")?);
    assert_eq!(engine.evaluate("Describe()")?, HostValue::String("sensor second".into()));
    Ok(())
}

/// Global members read unqualified; assignment has to go through the bound name.
#[test]
fn test_global_member_assignment() -> Result<()> {
    let engine = common::engine();
    let (sensor, handle) = common::sensor(&engine, "boiler");
    engine.add_host_object("boiler", sensor, HostItemFlags::GLOBAL_MEMBERS)?;

    assert!(matches!(
        engine.execute("Name = \"renamed\";"),
        Err(Error::ScriptFault { .. })
    ));
    assert_eq!(engine.evaluate("Name")?, HostValue::String("boiler".into()));

    engine.execute("boiler.Name = \"renamed\";")?;
    assert_eq!(engine.evaluate("Name")?, HostValue::String("renamed".into()));
    assert_eq!(common::as_sensor(&handle).to_display(), "Sensor(renamed)");
    Ok(())
}

/// Connect, fire twice, disconnect, fire twice more: exactly two callbacks.
#[test]
fn test_event_fires_until_disconnected() -> Result<()> {
    let engine = common::engine();
    let (sensor, handle) = common::sensor(&engine, "door");
    let (record, calls) = recorder(&engine);
    engine.add_host_object("door", sensor, HostItemFlags::DEFAULT)?;
    engine.add_host_object("record", record, HostItemFlags::DEFAULT)?;

    engine.execute(
        r#"
        let conn = door.Tripped.connect(|value| record.Invoke(value));
        door.Trip(1);
        door.Trip(2);
        conn.disconnect();
        door.Trip(3);
        door.Trip(4);
        "#,
    )?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(common::as_sensor(&handle).tripped.handler_count(), 0);
    Ok(())
}

/// Static events connect through the type item, chained or through a variable.
#[test]
fn test_static_event_fires_until_disconnected() -> Result<()> {
    let engine = common::engine();
    let (record, calls) = recorder(&engine);
    engine.add_host_object("record", record, HostItemFlags::DEFAULT)?;

    engine.execute(
        r#"
        let conn = Sensor.Alarm.connect(|level| record.Invoke(level));
        Sensor.SoundAlarm(1);
        Sensor.SoundAlarm(2);
        conn.disconnect();
        Sensor.SoundAlarm(3);
        Sensor.SoundAlarm(4);
        "#,
    )?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    engine.execute(
        r#"
        let kind = Sensor;
        let alarm = kind.Alarm.connect(|level| record.Invoke(level));
        kind.SoundAlarm(5);
        alarm.disconnect();
        kind.SoundAlarm(6);
        "#,
    )?;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn test_event_raised_from_host_thread() -> Result<()> {
    let engine = common::engine();
    let (sensor, handle) = common::sensor(&engine, "window");
    let (record, calls) = recorder(&engine);
    engine.add_host_object("window", sensor, HostItemFlags::DEFAULT)?;
    engine.add_host_object("record", record, HostItemFlags::DEFAULT)?;

    engine.execute(
        r#"
        fn on_tripped(value) { record.Invoke(value); }
        let conn = window.Tripped.connect(Fn("on_tripped"));
        "#,
    )?;

    let raise_twice = |handle: &Arc<dyn HostObject>| {
        let handle = handle.clone();
        thread::spawn(move || {
            let sensor = common::as_sensor(&handle);
            sensor.tripped.raise(&[HostValue::I32(1)])?;
            sensor.tripped.raise(&[HostValue::I32(2)])
        })
        .join()
        .unwrap()
    };

    raise_twice(&handle)?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    engine.execute("conn.disconnect();")?;
    raise_twice(&handle)?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_namespace_collection() -> Result<()> {
    let engine = common::engine();
    engine.add_type_collection("clr", HostItemFlags::DEFAULT)?;

    engine.execute("let gauge = host.newObj(clr.Telemetry.Sensor, \"gauge\");")?;
    assert_eq!(engine.evaluate("gauge.Name")?, HostValue::String("gauge".into()));
    assert_eq!(
        engine.execute_command("clr.Telemetry.Status.Active")?,
        "Active"
    );
    assert!(engine.evaluate("clr.Telemetry.Missing").is_err());
    Ok(())
}

#[test]
fn test_property_bag() -> Result<()> {
    let engine = common::engine();
    let bag = PropertyBag::create(engine.registry())?;
    engine.add_host_object("settings", bag.clone(), HostItemFlags::DEFAULT)?;

    engine.execute("settings.retries = 3; settings.label = \"primary\";")?;
    let bag = PropertyBag::of(&bag).unwrap();
    assert_eq!(bag.get("retries"), Some(HostValue::I32(3)));
    assert_eq!(bag.get("label"), Some(HostValue::String("primary".into())));
    assert_eq!(engine.evaluate("settings.retries + 1")?, HostValue::I32(4));
    Ok(())
}
