//! Benchmarks for value marshaling and member dispatch.
//!
//! Measures the host/script boundary crossing costs:
//! - Scalar and struct conversion in both directions
//! - Argument scoring used by overload selection
//! - Member dispatch on a bound host array
//! - A full script run calling into the host

extern crate hostbridge;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, Criterion};
use hostbridge::{marshal, prelude::*};
use rhai::{Dynamic, INT};

fn point_type(registry: &TypeRegistry) -> HostTypeRc {
    registry
        .define(
            TypeBuilder::structure("Bench", "Point")
                .field("X", ParamShape::Int32)
                .field("Y", ParamShape::Int32),
        )
        .unwrap()
}

/// Benchmark converting scalars into script values and back.
fn bench_scalar_round_trip(c: &mut Criterion) {
    let registry = TypeRegistry::new();

    c.bench_function("marshal_scalar_round_trip", |b| {
        b.iter(|| {
            let script = marshal::to_script(black_box(HostValue::I32(42)));
            let host = marshal::to_host(&script, &ParamShape::Int32, &registry).unwrap();
            black_box(host)
        });
    });

    c.bench_function("marshal_string_to_host", |b| {
        let value = Dynamic::from("a moderately sized script string");
        b.iter(|| black_box(marshal::to_host(black_box(&value), &ParamShape::String, &registry)));
    });
}

/// Benchmark struct conversion, which copies every field.
fn bench_struct_round_trip(c: &mut Criterion) {
    let registry = TypeRegistry::new();
    let ty = point_type(&registry);
    let shape = ParamShape::of(&ty);
    let point = HostValue::Struct(
        StructValue::default_of(&ty)
            .with("X", HostValue::I32(3))
            .with("Y", HostValue::I32(4)),
    );

    c.bench_function("marshal_struct_round_trip", |b| {
        b.iter(|| {
            let script = marshal::to_script(black_box(point.clone()));
            black_box(marshal::to_host(&script, &shape, &registry).unwrap())
        });
    });
}

/// Benchmark argument scoring against the common parameter shapes.
fn bench_score(c: &mut Criterion) {
    let values = [
        Dynamic::from(7 as INT),
        Dynamic::from(2.5_f64),
        Dynamic::from("text"),
        Dynamic::TRUE,
    ];
    let shapes = [
        ParamShape::Int32,
        ParamShape::Int64,
        ParamShape::Double,
        ParamShape::String,
        ParamShape::Any,
    ];

    c.bench_function("marshal_score", |b| {
        b.iter(|| {
            let mut total = 0;
            for value in &values {
                for shape in &shapes {
                    total += marshal::score(black_box(value), shape).unwrap_or(0);
                }
            }
            black_box(total)
        });
    });
}

/// Benchmark dispatching `GetValue` on a rank-3 host array.
fn bench_array_dispatch(c: &mut Criterion) {
    let registry = Arc::new(TypeRegistry::new());
    let bridge = BridgeContext::new(registry.clone());
    let array = HostArray::new(registry.primitive(PrimitiveKind::Int32), &[3, 5, 7]).unwrap();
    let item = HostItem::from_value(HostValue::Array(array)).unwrap();
    let indices = [
        Dynamic::from(2 as INT),
        Dynamic::from(4 as INT),
        Dynamic::from(6 as INT),
    ];

    c.bench_function("dispatch_array_get_value", |b| {
        b.iter(|| black_box(bridge.invoke(&item, "GetValue", black_box(&indices)).unwrap()));
    });
}

/// Benchmark a script loop crossing into the host on every iteration.
fn bench_script_calls(c: &mut Criterion) {
    let registry = Arc::new(TypeRegistry::new());
    let engine = ScriptEngine::with_config(registry.clone(), EngineConfig::unrestricted()).unwrap();
    let array = HostArray::new(registry.primitive(PrimitiveKind::Int32), &[100]).unwrap();
    engine
        .add_host_object("values", HostValue::Array(array), HostItemFlags::DEFAULT)
        .unwrap();

    c.bench_function("script_host_calls_100", |b| {
        b.iter(|| {
            engine
                .execute("for i in 0..100 { values[i] = i; }")
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_scalar_round_trip,
    bench_struct_round_trip,
    bench_score,
    bench_array_dispatch,
    bench_script_calls,
);
criterion_main!(benches);
