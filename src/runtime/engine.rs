//! The script engine facade.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rhai::{Dynamic, Engine, Scope, AST};
use tracing::{debug, debug_span, warn};

use crate::{
    access::HostItemFlags,
    events::InvocationGate,
    host::{BridgeContext, HostItem},
    marshal,
    runtime::{
        bindings::{self, BindingSet},
        cancel::{CancelToken, ContinuationCallback},
        controller::{map_eval_error, map_parse_error, ExecutionController, ExecutionState},
        documents::{DebugDocument, DocumentRegistry},
        script::ScriptObject,
        EngineConfig,
    },
    typesystem::{HostTypeRc, NamespaceNode, TypeRegistry},
    value::HostValue,
    Error, Result,
};

static ENGINE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Document name reported for runs submitted without a name
const UNNAMED_DOCUMENT: &str = "Script";

/// Document name of [`ScriptEngine::execute_command`]
const COMMAND_DOCUMENT: &str = "Command";

/// State shared by an engine, its script proxy and the event handlers it connected
pub(crate) struct EngineShared {
    pub(crate) name: String,
    pub(crate) config: EngineConfig,
    pub(crate) bridge: Arc<BridgeContext>,
    pub(crate) engine: RwLock<Engine>,
    pub(crate) scope: Mutex<Scope<'static>>,
    /// Script functions defined by earlier runs
    pub(crate) library: RwLock<AST>,
    /// Serializes runs, event callbacks and `invoke_with_lock`
    pub(crate) gate: InvocationGate,
    pub(crate) controller: ExecutionController,
    pub(crate) documents: DocumentRegistry,
    bindings: Mutex<BindingSet>,
    disposed: AtomicBool,
}

impl EngineShared {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// Lock the script globals; fails while the running script holds them
    pub(crate) fn lock_scope(&self) -> Result<parking_lot::MutexGuard<'_, Scope<'static>>> {
        self.scope.try_lock().ok_or_else(|| {
            Error::EngineBusy("script globals are held by the running script".to_string())
        })
    }

    fn sync_bindings(&self) {
        let mut engine = self.engine.write();
        let mut bindings = self.bindings.lock();
        bindings::sync_bindings(&mut engine, &self.bridge, &mut bindings);
    }

    /// Compile and run `source`, returning the value of its last statement
    fn run(
        &self,
        document: Option<&str>,
        discard: bool,
        source: &str,
        evaluate: bool,
    ) -> Result<Dynamic> {
        let _gate = self.gate.lock();
        self.ensure_alive()?;

        let run = self.controller.enter(&self.config.limits);
        // A dispose() racing with the lines above found no run to interrupt.
        if self.is_disposed() {
            let cancelled: Result<()> = Err(Error::ExecutionCancelled);
            if let Some(run) = run {
                run.finish(&cancelled);
            }
            return Err(Error::Disposed);
        }

        let handle = self.documents.register(document, source, !discard);
        let document_name = handle
            .as_ref()
            .map_or(UNNAMED_DOCUMENT, |handle| handle.name())
            .to_string();

        let span = debug_span!("script_run", engine = %self.name, document = %document_name);
        let _enter = span.enter();

        if run.is_some() {
            self.sync_bindings();
        }

        let result = self.run_source(&document_name, source, evaluate);
        match &result {
            Ok(_) => {}
            Err(error) if error.is_cancellation() => warn!("script run cancelled"),
            Err(error) => warn!(error = %error, "script run failed"),
        }

        if let Some(run) = run {
            run.finish(&result);
        }
        if let Some(handle) = handle {
            self.documents.release(&handle);
        }
        result
    }

    fn run_source(&self, document: &str, source: &str, evaluate: bool) -> Result<Dynamic> {
        let mut scope = self.lock_scope()?;
        let engine = self.engine.read_recursive();

        let mut ast = engine
            .compile(source)
            .map_err(|error| map_parse_error(&error, document))?;
        ast.set_source(document);

        // Functions are visible to event callbacks raised while this run is active.
        self.library.write().combine(ast.clone_functions_only());
        let program = self.library.read().merge(&ast);

        let result = if evaluate {
            engine.eval_ast_with_scope::<Dynamic>(&mut scope, &program)
        } else {
            engine
                .run_ast_with_scope(&mut scope, &program)
                .map(|()| Dynamic::UNIT)
        };
        result.map_err(|error| map_eval_error(&error, document, &self.config.limits))
    }

    fn render(&self, value: &Dynamic) -> Result<String> {
        let item = value.read_lock::<HostItem>().map(|item| (*item).clone());
        if let Some(item) = item {
            let text = self.bridge.invoke(&item, "ToString", &[])?;
            return Ok(text.to_string());
        }

        Ok(if value.is_unit() {
            String::new()
        } else if value.is_array() {
            "[ScriptObject:Array]".to_string()
        } else if value.is_map() {
            "[ScriptObject:Map]".to_string()
        } else if value.is_fnptr() {
            "[ScriptObject:Function]".to_string()
        } else {
            value.to_string()
        })
    }
}

/// A script engine with its own globals, host items and execution controller.
///
/// Script globals and functions persist across runs. Runs are serialized; a second caller
/// blocks until the first run returns. Event callbacks and [`ScriptEngine::invoke_with_lock`]
/// take the same gate, so host code never observes a half-finished run.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use hostbridge::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::new());
/// let engine = ScriptEngine::with_config(registry.clone(), EngineConfig::sandboxed())?;
///
/// engine.add_host_object("host", HostFunctions::create(&registry)?, HostItemFlags::DEFAULT)?;
/// engine.execute_document("setup", false, "let total = 0;")?;
/// engine.execute("total += 5;")?;
///
/// assert_eq!(engine.evaluate("total")?, HostValue::I32(5));
/// assert_eq!(engine.debug_document_names(), vec!["setup".to_string()]);
/// # Ok::<(), hostbridge::Error>(())
/// ```
pub struct ScriptEngine {
    shared: Arc<EngineShared>,
}

impl ScriptEngine {
    /// Create an engine with the default configuration
    ///
    /// # Errors
    /// See [`ScriptEngine::with_config`].
    pub fn new(registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Create an engine over `registry`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if `config` does not validate.
    pub fn with_config(registry: Arc<TypeRegistry>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let name = config.name.clone().unwrap_or_else(|| {
            format!(
                "ScriptEngine [{}]",
                ENGINE_COUNTER.fetch_add(1, Ordering::Relaxed)
            )
        });
        let bridge = Arc::new(
            BridgeContext::new(registry).with_max_array_size(config.limits.max_array_size),
        );
        let token = Arc::new(CancelToken::new(config.continuation_interval));

        let shared = Arc::new_cyclic(|weak| {
            let engine = bindings::build_engine(&name, &config, &bridge, &token, weak.clone());
            EngineShared {
                name: name.clone(),
                config,
                bridge,
                engine: RwLock::new(engine),
                scope: Mutex::new(Scope::new()),
                library: RwLock::new(AST::empty()),
                gate: Arc::new(ReentrantMutex::new(())),
                controller: ExecutionController::new(token),
                documents: DocumentRegistry::new(),
                bindings: Mutex::new(BindingSet::default()),
                disposed: AtomicBool::new(false),
            }
        });

        debug!("script engine '{}' created", name);
        Ok(ScriptEngine { shared })
    }

    /// The engine name, configured or generated
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// File name extension of script documents
    #[must_use]
    pub fn file_name_extension(&self) -> &'static str {
        "rhai"
    }

    /// The configuration the engine was created with
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// The type registry host items resolve against
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.shared.bridge.registry()
    }

    /// The engine's bridge context
    #[must_use]
    pub fn bridge(&self) -> &Arc<BridgeContext> {
        &self.shared.bridge
    }

    fn bind(&self, name: &str, item: HostItem) -> Result<()> {
        let _gate = self.shared.gate.lock();
        self.shared.ensure_alive()?;
        self.shared.bridge.bind(name, item);
        Ok(())
    }

    /// Expose a host object, array, type, enum or struct value to scripts under `name`.
    ///
    /// # Errors
    /// - [`Error::InvalidBinding`] for scalars, strings and null, which belong in script
    ///   variables (see [`ScriptObject::set`])
    /// - [`Error::Disposed`] after [`ScriptEngine::dispose`]
    pub fn add_host_object(&self, name: &str, value: HostValue, flags: HostItemFlags) -> Result<()> {
        let description = value.describe();
        let item = HostItem::from_value(value).ok_or_else(|| Error::InvalidBinding {
            name: name.to_string(),
            reason: format!("{} is not a reference-like value", description),
        })?;
        self.bind(name, item.with_flags(flags))
    }

    /// Expose the host type named `type_name` under `name`; scripts reach its static members,
    /// nested types and enum constants.
    ///
    /// # Errors
    /// Returns [`Error::TypeResolution`] if the type cannot be resolved.
    pub fn add_host_type(&self, name: &str, type_name: &str, flags: HostItemFlags) -> Result<()> {
        self.add_host_type_with(name, type_name, None, &[], flags)
    }

    /// Expose a host type resolved with an assembly hint and type arguments
    ///
    /// # Errors
    /// Returns [`Error::TypeResolution`] if the type cannot be resolved or closed.
    pub fn add_host_type_with(
        &self,
        name: &str,
        type_name: &str,
        assembly_hint: Option<&str>,
        type_args: &[HostTypeRc],
        flags: HostItemFlags,
    ) -> Result<()> {
        let ty = self
            .shared
            .bridge
            .resolver()
            .resolve(type_name, type_args, assembly_hint)?;
        self.bind(name, HostItem::for_type(ty, flags))
    }

    /// Expose an already resolved host type
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after [`ScriptEngine::dispose`].
    pub fn add_host_type_descriptor(
        &self,
        name: &str,
        ty: HostTypeRc,
        flags: HostItemFlags,
    ) -> Result<()> {
        self.bind(name, HostItem::for_type(ty, flags))
    }

    /// Expose the whole host type collection under `name`, conventionally `clr`, so scripts
    /// reach types by namespace (`clr.System.Random`).
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after [`ScriptEngine::dispose`].
    pub fn add_type_collection(&self, name: &str, flags: HostItemFlags) -> Result<()> {
        self.bind(name, HostItem::namespace(NamespaceNode::root(), flags))
    }

    /// Remove the host item bound under `name`
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after [`ScriptEngine::dispose`].
    pub fn remove_host_item(&self, name: &str) -> Result<bool> {
        let _gate = self.shared.gate.lock();
        self.shared.ensure_alive()?;
        Ok(self.shared.bridge.unbind(name))
    }

    /// Names of all bound host items, sorted
    #[must_use]
    pub fn host_item_names(&self) -> Vec<String> {
        self.shared.bridge.item_names()
    }

    /// Run `source` without registering a document
    ///
    /// # Errors
    /// - [`Error::Parse`] if `source` does not compile
    /// - [`Error::ScriptFault`] for errors the script did not handle
    /// - [`Error::ExternalCall`] for host errors raised by host members the script called
    /// - [`Error::ExecutionCancelled`] after an interrupt or a declining continuation callback
    /// - [`Error::LimitExceeded`] if a configured limit tripped
    /// - [`Error::Disposed`] after [`ScriptEngine::dispose`]
    pub fn execute(&self, source: &str) -> Result<()> {
        self.shared.run(None, false, source, false).map(|_| ())
    }

    /// Run `source` under the document `name`; `discard` drops the document afterwards
    ///
    /// # Errors
    /// See [`ScriptEngine::execute`].
    pub fn execute_document(&self, name: &str, discard: bool, source: &str) -> Result<()> {
        self.shared.run(Some(name), discard, source, false).map(|_| ())
    }

    /// Evaluate `source` and marshal its value to the host
    ///
    /// # Errors
    /// See [`ScriptEngine::execute`].
    pub fn evaluate(&self, source: &str) -> Result<HostValue> {
        self.shared
            .run(None, false, source, true)
            .map(|value| marshal::to_host_any(&value))
    }

    /// Evaluate `source` under the document `name`; `discard` drops the document afterwards
    ///
    /// # Errors
    /// See [`ScriptEngine::execute`].
    pub fn evaluate_document(&self, name: &str, discard: bool, source: &str) -> Result<HostValue> {
        self.shared
            .run(Some(name), discard, source, true)
            .map(|value| marshal::to_host_any(&value))
    }

    /// Evaluate `command` and render the result for display.
    ///
    /// Unit renders as an empty string, host items through their `ToString`, script arrays,
    /// maps and functions as `[ScriptObject:Array]`, `[ScriptObject:Map]` and
    /// `[ScriptObject:Function]`, everything else by its display form.
    ///
    /// # Errors
    /// See [`ScriptEngine::execute`].
    pub fn execute_command(&self, command: &str) -> Result<String> {
        let _gate = self.shared.gate.lock();
        let value = self.shared.run(Some(COMMAND_DOCUMENT), true, command, true)?;
        self.shared.render(&value)
    }

    /// Request cancellation of the active run from any thread.
    ///
    /// The run stops at its next operation with [`Error::ExecutionCancelled`]. Returns `false`,
    /// without effect, if no run is active.
    pub fn interrupt(&self) -> bool {
        let requested = self.shared.controller.interrupt();
        if requested {
            debug!("interrupt requested for engine '{}'", self.shared.name);
        }
        requested
    }

    /// State of the execution controller
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.shared.controller.state()
    }

    /// Set or clear the continuation callback, polled every
    /// [`EngineConfig::continuation_interval`] operations; returning `false` cancels the run
    pub fn set_continuation_callback(&self, callback: Option<ContinuationCallback>) {
        self.shared.controller.token().set_continuation(callback);
    }

    /// The continuation callback
    #[must_use]
    pub fn continuation_callback(&self) -> Option<ContinuationCallback> {
        self.shared.controller.token().continuation()
    }

    /// Set the type whose non-public members scripts may access, `None` for public only
    pub fn set_access_context(&self, context: Option<HostTypeRc>) {
        self.shared.bridge.access_context().set(context);
    }

    /// The current access context type
    #[must_use]
    pub fn access_context(&self) -> Option<HostTypeRc> {
        self.shared.bridge.context_type()
    }

    /// Names of the documents retained by earlier runs, in submission order
    #[must_use]
    pub fn debug_document_names(&self) -> Vec<String> {
        self.shared.documents.names()
    }

    /// A retained document by its unique name
    #[must_use]
    pub fn debug_document(&self, name: &str) -> Option<DebugDocument> {
        self.shared.documents.get(name)
    }

    /// Run `f` serialized with script runs and event callbacks.
    ///
    /// Reentrant: host code called from a running script may use it too.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after [`ScriptEngine::dispose`].
    pub fn invoke_with_lock<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let _gate = self.shared.gate.lock();
        self.shared.ensure_alive()?;
        Ok(f())
    }

    /// Access to top-level script variables and functions
    #[must_use]
    pub fn script(&self) -> ScriptObject {
        ScriptObject::new(self.shared.clone())
    }

    /// `true` after [`ScriptEngine::dispose`]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Shut the engine down.
    ///
    /// Interrupts the active run and waits for it to return, disconnects every event
    /// connection scripts created and drops host items, globals and documents. Later calls
    /// fail with [`Error::Disposed`]. Disposing twice is a no-op.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        shared.controller.interrupt();
        let _gate = shared.gate.lock();

        let disconnected = shared.bridge.disconnect_all();
        shared.bridge.clear();
        shared.documents.clear();
        if let Some(mut scope) = shared.scope.try_lock() {
            scope.clear();
        }
        *shared.library.write() = AST::empty();

        debug!(
            "script engine '{}' disposed, {} event connections closed",
            shared.name, disconnected
        );
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ScriptEngine {
        ScriptEngine::new(Arc::new(TypeRegistry::new())).unwrap()
    }

    #[test]
    fn test_generated_names_are_unique() {
        let first = engine();
        let second = engine();
        assert_ne!(first.name(), second.name());
        assert_eq!(first.file_name_extension(), "rhai");

        let named = ScriptEngine::with_config(
            Arc::new(TypeRegistry::new()),
            EngineConfig::default().with_name("plugins"),
        )
        .unwrap();
        assert_eq!(named.name(), "plugins");
    }

    #[test]
    fn test_globals_persist_across_runs() {
        let engine = engine();
        engine.execute("let counter = 40; fn bump(x) { x + 1 }").unwrap();
        engine.execute("counter += 1;").unwrap();
        assert_eq!(engine.evaluate("bump(counter)").unwrap(), HostValue::I32(42));
        assert_eq!(engine.state(), ExecutionState::Completed);
    }

    #[test]
    fn test_execute_command_rendering() {
        let engine = engine();
        assert_eq!(engine.execute_command("let x = 1;").unwrap(), "");
        assert_eq!(engine.execute_command("6 * 7").unwrap(), "42");
        assert_eq!(engine.execute_command("[1, 2]").unwrap(), "[ScriptObject:Array]");
        assert_eq!(engine.execute_command("#{ a: 1 }").unwrap(), "[ScriptObject:Map]");
        assert_eq!(engine.execute_command("|x| x").unwrap(), "[ScriptObject:Function]");
        assert!(engine.debug_document_names().is_empty());
    }

    #[test]
    fn test_script_errors() {
        let engine = engine();
        match engine.execute_document("broken", true, "let x = ;") {
            Err(Error::Parse { document, line, .. }) => {
                assert_eq!(document, "broken");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        match engine.execute("let a = 1;\nthrow \"bad\";") {
            Err(Error::ScriptFault { document, line, .. }) => {
                assert_eq!(document, UNNAMED_DOCUMENT);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.state(), ExecutionState::Faulted);
        assert_eq!(engine.evaluate("1 + 1").unwrap(), HostValue::I32(2));
    }

    #[test]
    fn test_scalar_binding_is_rejected() {
        let engine = engine();
        let result = engine.add_host_object("n", HostValue::I32(5), HostItemFlags::DEFAULT);
        assert!(matches!(result, Err(Error::InvalidBinding { .. })));
        assert!(engine.host_item_names().is_empty());
    }

    #[test]
    fn test_dispose() {
        let engine = engine();
        engine.execute("let x = 1;").unwrap();
        engine.dispose();
        engine.dispose();
        assert!(engine.is_disposed());
        assert!(matches!(engine.execute("x"), Err(Error::Disposed)));
        assert!(matches!(engine.invoke_with_lock(|| 1), Err(Error::Disposed)));
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_print_is_forwarded() {
        let engine = engine();
        engine.execute("print(\"hello from the script\");").unwrap();
        assert!(logs_contain("hello from the script"));

        let quiet = ScriptEngine::with_config(
            Arc::new(TypeRegistry::new()),
            EngineConfig::default().with_forward_output(false),
        )
        .unwrap();
        quiet.execute("print(\"not forwarded\");").unwrap();
        assert!(!logs_contain("not forwarded"));
    }

    #[test]
    fn test_limits() {
        let engine = ScriptEngine::with_config(
            Arc::new(TypeRegistry::new()),
            EngineConfig::default().with_limits(crate::ScriptLimits::new().with_max_operations(1_000)),
        )
        .unwrap();

        let result = engine.execute("let i = 0; loop { i += 1; }");
        assert!(matches!(
            result,
            Err(Error::LimitExceeded(crate::error::LimitKind::Operations(1_000)))
        ));
        assert_eq!(engine.evaluate("2 + 3").unwrap(), HostValue::I32(5));
    }
}
