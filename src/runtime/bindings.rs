//! Registration of host items with the script engine.
//!
//! Script code sees every host item as one custom type, `HostItem`. Property reads and writes
//! fall through to the string indexer, integer and array indexing go to the item's default
//! indexer, and method calls are routed by name: for every method name the registry knows,
//! one dispatcher per arity is registered that forwards to [`BridgeContext::invoke`].
//! Global-members bindings additionally get unqualified dispatchers, and a variable resolver
//! exposes bound items and global properties by name.
//!
//! Host errors raised during dispatch cross into the script as an opaque [`ExternalCallFailure`]
//! and come back out of the run as [`crate::Error::ExternalCall`].

use std::{
    any::TypeId,
    collections::HashSet,
    fmt,
    sync::{Arc, Weak},
};

use rhai::{
    packages::{Package, StandardPackage},
    Array, Dynamic, Engine, EvalAltResult, FnPtr, FuncRegistration, ImmutableString,
    NativeCallContext, Position, INT,
};
use tracing::{debug, info, trace};

use crate::{
    events::EventHandler,
    host::{BridgeContext, HostItem, HostTarget},
    marshal,
    runtime::{
        cancel::CancelToken, controller::map_eval_error, engine::EngineShared, EngineConfig,
        ScriptLimits,
    },
    typesystem::HostTypeRc,
    value::HostValue,
    Error, Result,
};

/// Result of a native function called from script
type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Largest number of extra arguments a variadic host method is callable with
pub(crate) const MAX_VARIADIC_ARGS: usize = 16;

/// Largest number of type arguments accepted by `Type.Of(...)`
const MAX_TYPE_ARGS: usize = 8;

/// A host error, as script code sees it
#[derive(Clone)]
pub struct ExternalCallFailure(
    /// The host error
    pub Arc<Error>,
);

impl fmt::Display for ExternalCallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "external call failed: {}", self.0)
    }
}

impl fmt::Debug for ExternalCallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalCallFailure({:?})", self.0)
    }
}

/// Wrap a host error for the script
pub(crate) fn failure(error: Error) -> Box<EvalAltResult> {
    trace!("host call failed: {}", error);
    EvalAltResult::ErrorRuntime(
        Dynamic::from(ExternalCallFailure(Arc::new(error))),
        Position::NONE,
    )
    .into()
}

fn apply_limits(engine: &mut Engine, limits: &ScriptLimits) {
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(match limits.max_call_levels {
        0 => usize::MAX,
        levels => levels,
    });
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
}

/// Build the script engine of one [`crate::ScriptEngine`].
///
/// `shared` is the engine state under construction; callbacks that need it upgrade the weak
/// reference when they run.
pub(crate) fn build_engine(
    name: &str,
    config: &EngineConfig,
    bridge: &Arc<BridgeContext>,
    token: &Arc<CancelToken>,
    shared: Weak<EngineShared>,
) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());
    apply_limits(&mut engine, &config.limits);

    let token = token.clone();
    engine.on_progress(move |operations| token.checkpoint(operations).map(Dynamic::from));

    if config.forward_output {
        let engine_name = name.to_string();
        engine.on_print(move |text| info!(engine = %engine_name, "{}", text));
        let engine_name = name.to_string();
        engine.on_debug(move |text, source, position| {
            debug!(
                engine = %engine_name,
                document = source.unwrap_or(""),
                line = position.line().unwrap_or(0),
                "{}",
                text
            );
        });
    } else {
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
    }

    engine
        .register_type_with_name::<HostItem>("HostItem")
        .register_type_with_name::<ExternalCallFailure>("HostError")
        .register_fn("to_string", |item: &mut HostItem| item.display())
        .register_fn("to_debug", |item: &mut HostItem| item.display())
        .register_fn("to_string", |failure: &mut ExternalCallFailure| failure.to_string())
        .register_fn("==", |left: &mut HostItem, right: HostItem| left.is_same(&right))
        .register_fn("!=", |left: &mut HostItem, right: HostItem| !left.is_same(&right));

    register_indexers(&mut engine, bridge);
    register_variable_resolver(&mut engine, bridge);
    register_connect(&mut engine, shared);

    engine
}

fn register_indexers(engine: &mut Engine, bridge: &Arc<BridgeContext>) {
    let context = bridge.clone();
    engine.register_indexer_get(
        move |item: &mut HostItem, key: ImmutableString| -> ScriptResult<Dynamic> {
            context.index_get(item, &Dynamic::from(key)).map_err(failure)
        },
    );
    let context = bridge.clone();
    engine.register_indexer_get(move |item: &mut HostItem, key: INT| -> ScriptResult<Dynamic> {
        context.index_get(item, &Dynamic::from(key)).map_err(failure)
    });
    let context = bridge.clone();
    engine.register_indexer_get(move |item: &mut HostItem, key: Array| -> ScriptResult<Dynamic> {
        context
            .index_get(item, &Dynamic::from_array(key))
            .map_err(failure)
    });

    // Bound items reach the script as constants, so the setters have to be callable on them.
    let context = bridge.clone();
    FuncRegistration::new_index_setter()
        .with_purity(true)
        .register_into_engine(
            engine,
            move |item: &mut HostItem, key: ImmutableString, value: Dynamic| -> ScriptResult<()> {
                context
                    .index_set(item, &Dynamic::from(key), &value)
                    .map_err(failure)
            },
        );
    let context = bridge.clone();
    FuncRegistration::new_index_setter()
        .with_purity(true)
        .register_into_engine(
            engine,
            move |item: &mut HostItem, key: INT, value: Dynamic| -> ScriptResult<()> {
                context
                    .index_set(item, &Dynamic::from(key), &value)
                    .map_err(failure)
            },
        );
    let context = bridge.clone();
    FuncRegistration::new_index_setter()
        .with_purity(true)
        .register_into_engine(
            engine,
            move |item: &mut HostItem, key: Array, value: Dynamic| -> ScriptResult<()> {
                context
                    .index_set(item, &Dynamic::from_array(key), &value)
                    .map_err(failure)
            },
        );
}

/// Bound items first, then readable members of global-members items. Script variables shadow
/// both.
fn register_variable_resolver(engine: &mut Engine, bridge: &Arc<BridgeContext>) {
    let context = bridge.clone();
    #[allow(deprecated)]
    engine.on_var(move |name, index, eval| {
        if index > 0 || eval.scope().contains(name) {
            return Ok(None);
        }

        if let Some(item) = context.item(name) {
            return Ok(Some(Dynamic::from(item)));
        }

        match context
            .globals()
            .resolve(|item| context.has_member(item, name))
        {
            Some(item) => context.get_member(&item, name).map(Some).map_err(failure),
            None => Ok(None),
        }
    });
}

/// `connect` takes the event item by value, so calling it on a member chain does not store
/// the event back into its owner.
fn register_connect(engine: &mut Engine, shared: Weak<EngineShared>) {
    FuncRegistration::new("connect").register_into_engine(
        engine,
        move |item: HostItem, callback: FnPtr| -> ScriptResult<HostItem> {
            let HostTarget::Event(site) = item.target() else {
                return Err(failure(Error::MemberNotFound {
                    type_name: item.type_name(),
                    member: "connect".to_string(),
                }));
            };
            let shared = shared.upgrade().ok_or_else(|| failure(Error::Disposed))?;

            let handler = ScriptEventHandler {
                shared: Arc::downgrade(&shared),
                callback,
                event: site.source.name().to_string(),
            };
            let connection = site
                .source
                .connect_gated(Arc::new(handler), shared.gate.clone());
            shared.bridge.track_connection(connection.clone());

            debug!("script callable connected to {}.{}", site.declaring, site.source.name());
            Ok(HostItem::new(HostTarget::Connection(connection), item.flags()))
        },
    );
}

/// Forwards host event invocations to a script callable
struct ScriptEventHandler {
    shared: Weak<EngineShared>,
    callback: FnPtr,
    event: String,
}

impl EventHandler for ScriptEventHandler {
    fn handle(&self, args: &[HostValue]) -> Result<()> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };

        let _gate = shared.gate.lock();
        if shared.is_disposed() {
            return Ok(());
        }

        let limits = &shared.config.limits;
        let run = shared.controller.enter(limits);
        let script_args: Vec<Dynamic> = args.iter().cloned().map(marshal::to_script).collect();
        let library = shared.library.read().clone();

        let result = {
            let engine = shared.engine.read_recursive();
            self.callback
                .call::<Dynamic>(&engine, &library, script_args)
                .map(|_| ())
                .map_err(|error| map_eval_error(&error, &self.event, limits))
        };

        if let Some(run) = run {
            run.finish(&result);
        }
        result
    }
}

/// Method dispatchers registered so far
#[derive(Default)]
pub(crate) struct BindingSet {
    methods: HashSet<(String, usize)>,
    globals: HashSet<(String, usize)>,
    fingerprint: Option<(usize, usize, Vec<String>)>,
}

impl BindingSet {
    /// Number of registered dispatchers
    pub(crate) fn len(&self) -> usize {
        self.methods.len() + self.globals.len()
    }
}

fn arities(params: usize, variadic: bool) -> std::ops::RangeInclusive<usize> {
    if variadic {
        params..=params + MAX_VARIADIC_ARGS
    } else {
        params..=params
    }
}

/// Method names and argument counts callable on `ty`, including inherited methods
fn callable_signatures(ty: &HostTypeRc, is_static: bool) -> Vec<(String, usize)> {
    let mut signatures = Vec::new();
    let mut current = Some(ty.clone());

    while let Some(ty) = current {
        for (_, method) in ty.members().methods.iter() {
            if method.is_constructor() || method.is_static() != is_static {
                continue;
            }
            for count in arities(method.params.len(), method.params_array.is_some()) {
                signatures.push((method.name.clone(), count));
            }
        }
        if is_static {
            break;
        }
        current = ty.base.clone();
    }

    signatures
}

fn builtin_signatures() -> Vec<(String, usize)> {
    let mut signatures = vec![
        ("ToString".to_string(), 0),
        ("GetType".to_string(), 0),
        ("Equals".to_string(), 1),
        ("GetLength".to_string(), 1),
        ("disconnect".to_string(), 0),
        ("Disconnect".to_string(), 0),
    ];
    for count in 1..=MAX_VARIADIC_ARGS {
        signatures.push(("GetValue".to_string(), count));
        signatures.push(("SetValue".to_string(), count + 1));
    }
    for count in 1..=MAX_TYPE_ARGS {
        signatures.push(("Of".to_string(), count));
    }
    signatures
}

fn register_method(engine: &mut Engine, bridge: &Arc<BridgeContext>, name: &str, count: usize) {
    let mut types = vec![TypeId::of::<HostItem>()];
    types.resize(count + 1, TypeId::of::<Dynamic>());

    let context = bridge.clone();
    let member = name.to_string();
    #[allow(deprecated)]
    engine.register_raw_fn(
        name,
        types,
        move |_: NativeCallContext, args: &mut [&mut Dynamic]| -> ScriptResult<Dynamic> {
            let Some((this, rest)) = args.split_first() else {
                return Err(failure(Error::MemberNotFound {
                    type_name: "HostItem".to_string(),
                    member: member.clone(),
                }));
            };
            let item = this
                .read_lock::<HostItem>()
                .map(|item| (*item).clone())
                .ok_or_else(|| failure(conversion_error!("HostItem", marshal::describe(this))))?;
            let rest: Vec<Dynamic> = rest.iter().map(|arg| arg.flatten_clone()).collect();

            context.invoke(&item, &member, &rest).map_err(failure)
        },
    );
}

fn register_global(engine: &mut Engine, bridge: &Arc<BridgeContext>, name: &str, count: usize) {
    let types = vec![TypeId::of::<Dynamic>(); count];

    let context = bridge.clone();
    let member = name.to_string();
    #[allow(deprecated)]
    engine.register_raw_fn(
        name,
        types,
        move |_: NativeCallContext, args: &mut [&mut Dynamic]| -> ScriptResult<Dynamic> {
            let args: Vec<Dynamic> = args.iter().map(|arg| arg.flatten_clone()).collect();

            // Method-call syntax on a host item may land here when a global shares the name.
            let this = args
                .first()
                .and_then(|arg| arg.read_lock::<HostItem>().map(|item| (*item).clone()));
            if let Some(this) = this {
                if context.has_invocable(&this, &member) {
                    return context.invoke(&this, &member, &args[1..]).map_err(failure);
                }
            }

            let item = context
                .globals()
                .resolve(|item| context.has_invocable(item, &member))
                .ok_or_else(|| {
                    failure(Error::MemberNotFound {
                        type_name: "global".to_string(),
                        member: member.clone(),
                    })
                })?;
            context.invoke(&item, &member, &args).map_err(failure)
        },
    );
}

/// Register dispatchers for methods and global members added since the last call.
///
/// Needs exclusive access to the engine, so it runs at the start of top-level runs only.
pub(crate) fn sync_bindings(
    engine: &mut Engine,
    bridge: &Arc<BridgeContext>,
    bindings: &mut BindingSet,
) {
    let registry = bridge.registry();
    let types = registry.all_types();
    let method_count = types.iter().map(|ty| ty.members().methods.count()).sum();
    let fingerprint = (types.len(), method_count, bridge.globals().names());
    if bindings.fingerprint.as_ref() == Some(&fingerprint) {
        return;
    }

    let mut signatures = builtin_signatures();
    for ty in &types {
        signatures.extend(callable_signatures(ty, false));
        signatures.extend(callable_signatures(ty, true));
    }
    for (name, count) in signatures {
        if bindings.methods.insert((name.clone(), count)) {
            register_method(engine, bridge, &name, count);
        }
    }

    for (_, item) in bridge.globals().items() {
        let signatures = match item.target() {
            HostTarget::Object(object) => callable_signatures(&object.host_type(), false),
            HostTarget::Type(ty) => callable_signatures(ty, true),
            HostTarget::Value(value) => value
                .host_type(registry)
                .map(|ty| callable_signatures(&ty, false))
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        for (name, count) in signatures {
            if bindings.globals.insert((name.clone(), count)) {
                register_global(engine, bridge, &name, count);
            }
        }
    }

    trace!("{} method dispatchers registered", bindings.len());
    bindings.fingerprint = Some(fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::{Method, ParamShape, TypeBuilder, TypeRegistry};

    #[test]
    fn test_callable_signatures() {
        let registry = TypeRegistry::new();
        let ty = registry
            .define(
                TypeBuilder::class("Demo", "Calc")
                    .method(Method::new("Sum", |_| Ok(HostValue::Null)).variadic("values", ParamShape::Int32))
                    .method(
                        Method::new("Twice", |_| Ok(HostValue::Null))
                            .param("value", ParamShape::Int32)
                            .as_static(),
                    ),
            )
            .unwrap();

        let instance = callable_signatures(&ty, false);
        assert!(instance.contains(&("Sum".to_string(), 0)));
        assert!(instance.contains(&("Sum".to_string(), MAX_VARIADIC_ARGS)));
        assert!(!instance.iter().any(|(name, _)| name == "Twice"));

        let statics = callable_signatures(&ty, true);
        assert_eq!(statics, vec![("Twice".to_string(), 1)]);
    }

    #[test]
    fn test_sync_bindings_is_incremental() {
        let registry = Arc::new(TypeRegistry::new());
        let bridge = Arc::new(BridgeContext::new(registry.clone()));
        let mut engine = Engine::new_raw();
        let mut bindings = BindingSet::default();

        sync_bindings(&mut engine, &bridge, &mut bindings);
        let initial = bindings.len();
        assert!(initial >= builtin_signatures().len());

        registry
            .define(
                TypeBuilder::class("Demo", "Widget")
                    .method(Method::new("Spin", |_| Ok(HostValue::Null)).param("turns", ParamShape::Int32)),
            )
            .unwrap();
        sync_bindings(&mut engine, &bridge, &mut bindings);
        assert_eq!(bindings.len(), initial + 1);

        sync_bindings(&mut engine, &bridge, &mut bindings);
        assert_eq!(bindings.len(), initial + 1);
    }

    #[test]
    fn test_failure_round_trip() {
        let error = failure(Error::Disposed);
        let limits = ScriptLimits::default();
        assert!(matches!(
            map_eval_error(&error, "doc", &limits),
            Error::ExternalCall(_)
        ));
    }
}
