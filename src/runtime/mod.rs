//! Script engine lifecycle, execution control and cancellation.
//!
//! A [`ScriptEngine`] owns one [`rhai::Engine`], the script globals, the host items bound to it
//! and an [`ExecutionController`]. Every run is serialized through a single reentrant gate
//! shared with event callbacks, and observes the engine's [`CancelToken`] at every operation.
//!
//! # Key Components
//!
//! - [`ScriptEngine`]: Binding API, execute/evaluate, interrupt, dispose
//! - [`ScriptObject`]: Host access to script globals and functions
//! - [`ExecutionController`] / [`ExecutionState`]: The run state machine
//! - [`CancelToken`]: Interrupt flag, timeout and continuation callback
//! - [`DocumentRegistry`]: Named documents submitted by runs
//! - [`EngineConfig`] / [`ScriptLimits`]: Configuration

mod bindings;
mod cancel;
mod config;
mod controller;
mod documents;
mod engine;
mod script;

pub use bindings::ExternalCallFailure;
pub use cancel::{CancelReason, CancelToken, ContinuationCallback};
pub use config::{EngineConfig, ScriptLimits};
pub use controller::{ExecutionController, ExecutionState};
pub use documents::{DebugDocument, DocumentHandle, DocumentRegistry};
pub use engine::ScriptEngine;
pub use script::ScriptObject;
