//! Host-side access to the script's global variables and functions.

use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic};

use crate::{
    marshal,
    runtime::{controller::map_eval_error, engine::EngineShared},
    value::HostValue,
    Error, Result,
};

/// The script global object, as seen from the host.
///
/// Obtained through [`crate::ScriptEngine::script`]. All operations are serialized with script
/// runs; calling them from host code invoked by the running script fails with
/// [`Error::EngineBusy`], because the running script holds its globals.
pub struct ScriptObject {
    shared: Arc<EngineShared>,
}

impl ScriptObject {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        ScriptObject { shared }
    }

    /// Read the global variable `name`
    ///
    /// # Errors
    /// - [`Error::MemberNotFound`] if no such variable exists
    /// - [`Error::EngineBusy`] while the running script holds its globals
    pub fn get(&self, name: &str) -> Result<HostValue> {
        let _gate = self.shared.gate.lock();
        self.shared.ensure_alive()?;
        let scope = self.shared.lock_scope()?;

        scope
            .get_value::<Dynamic>(name)
            .map(|value| marshal::to_host_any(&value))
            .ok_or_else(|| Error::MemberNotFound {
                type_name: "ScriptObject".to_string(),
                member: name.to_string(),
            })
    }

    /// Create or overwrite the global variable `name`
    ///
    /// # Errors
    /// - [`Error::InvalidBinding`] if `name` is a script constant
    /// - [`Error::EngineBusy`] while the running script holds its globals
    pub fn set(&self, name: &str, value: HostValue) -> Result<()> {
        let _gate = self.shared.gate.lock();
        self.shared.ensure_alive()?;
        let mut scope = self.shared.lock_scope()?;

        if scope.is_constant(name) == Some(true) {
            return Err(Error::InvalidBinding {
                name: name.to_string(),
                reason: "script constants cannot be reassigned".to_string(),
            });
        }
        scope.set_value(name, marshal::to_script(value));
        Ok(())
    }

    /// Names of all global variables, in declaration order
    ///
    /// # Errors
    /// Returns [`Error::EngineBusy`] while the running script holds its globals.
    pub fn variable_names(&self) -> Result<Vec<String>> {
        let _gate = self.shared.gate.lock();
        let scope = self.shared.lock_scope()?;
        Ok(scope.iter().map(|(name, _, _)| name.to_string()).collect())
    }

    /// `true` if a script function `name` taking `arity` arguments is defined
    #[must_use]
    pub fn has_function(&self, name: &str, arity: usize) -> bool {
        self.shared
            .library
            .read()
            .iter_functions()
            .any(|function| function.name == name && function.params.len() == arity)
    }

    /// Call the script function `name` with positional arguments
    ///
    /// # Errors
    /// - [`Error::MemberNotFound`] if no function `name` takes `args.len()` arguments
    /// - [`Error::EngineBusy`] while the running script holds its globals
    /// - the errors of [`crate::ScriptEngine::execute`] for failures inside the function
    pub fn invoke(&self, name: &str, args: &[HostValue]) -> Result<HostValue> {
        let shared = &self.shared;
        let _gate = shared.gate.lock();
        shared.ensure_alive()?;

        if !self.has_function(name, args.len()) {
            return Err(Error::MemberNotFound {
                type_name: "ScriptObject".to_string(),
                member: name.to_string(),
            });
        }

        let mut scope = shared.lock_scope()?;
        let limits = &shared.config.limits;
        let run = shared.controller.enter(limits);

        let library = shared.library.read().clone();
        let args: Vec<Dynamic> = args.iter().cloned().map(marshal::to_script).collect();
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);

        let result = {
            let engine = shared.engine.read_recursive();
            engine
                .call_fn_with_options::<Dynamic>(options, &mut scope, &library, name, args)
                .map(|value| marshal::to_host_any(&value))
                .map_err(|error| map_eval_error(&error, name, limits))
        };

        if let Some(run) = run {
            run.finish(&result);
        }
        result
    }
}
