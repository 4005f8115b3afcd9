// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # hostbridge
//!
//! A host/script interop bridge. `hostbridge` embeds a dynamically-typed script engine
//! ([`rhai`]) inside a statically-typed host and exposes host objects, host types and
//! their members to scripts, marshaling values, structs, enums, multi-dimensional arrays
//! and events across the boundary.
//!
//! ## Features
//!
//! - **🔍 Type resolution** - Host types by simple name, full name, assembly hint and
//!   generic type arguments, plus namespace chaining (`clr.System.Random`)
//! - **🔁 Value marshaling** - Scalars, enums and structs by value; host objects and arrays
//!   by reference with identity preserved, including rank-N arrays
//! - **🛡️ Access policy** - Public-only by default, per-item private access, an engine-wide
//!   access context, and global-members exposure
//! - **📣 Event bridge** - Host events connected to script callables with linearizable
//!   disconnect
//! - **⏹️ Cancellation** - Cross-thread interrupt and a cooperative continuation callback,
//!   leaving the engine reusable afterwards
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hostbridge::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let engine = ScriptEngine::new(registry.clone())?;
//!
//! engine.add_host_object("host", HostFunctions::create(&registry)?, HostItemFlags::DEFAULT)?;
//! engine.execute("fn pi() { 3.14159 }")?;
//!
//! let value = engine.evaluate("pi() * 2.0")?;
//! assert!(matches!(value, HostValue::F64(_)));
//! # Ok::<(), hostbridge::Error>(())
//! ```
//!
//! ## Architecture
//!
//! The bridge is organized in dependency order, leaves first:
//!
//! - [`typesystem`] - Host type descriptors, the type registry and the type resolver
//! - [`value`] - Host-side values, host object capability trait and host arrays
//! - [`marshal`] - Host ⇄ script value conversion and argument compatibility scoring
//! - [`access`] - Member visibility policy, access flags and the global-members registry
//! - [`host`] - Host item proxies and member dispatch, overload selection, host helper objects
//! - [`events`] - Event sources, connections and handlers
//! - [`runtime`] - The [`ScriptEngine`] itself: execution control, cancellation, documents
//!
//! ## Threading
//!
//! A [`ScriptEngine`] is `Send + Sync`. Script runs against one engine are serialized; event
//! callbacks are routed through the same run gate, and [`ScriptEngine::interrupt`] may be
//! called from any thread.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and spans. It never installs a subscriber.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use hostbridge::prelude::*;
///
/// let engine = ScriptEngine::new(std::sync::Arc::new(TypeRegistry::new()))?;
/// engine.execute("let answer = 42;")?;
/// # Ok::<(), hostbridge::Error>(())
/// ```
pub mod prelude;

/// Host type descriptors, registry and name resolution.
///
/// Types are declared with a [`typesystem::TypeBuilder`], registered in a
/// [`typesystem::TypeRegistry`] and looked up by the [`typesystem::TypeResolver`], which also
/// closes open generic definitions over concrete type arguments.
pub mod typesystem;

/// Host-side values.
///
/// [`value::HostValue`] is the host representation of everything that can cross into script
/// space; [`value::HostObject`] is the capability trait implemented by reference-like host
/// objects and [`value::HostArray`] is a shared, rank-N host array.
pub mod value;

/// Value conversion between host and script space.
pub mod marshal;

/// Member visibility policy and per-binding access flags.
pub mod access;

/// Host item proxies and member dispatch.
pub mod host;

/// Host events bridged to script callables.
pub mod events;

/// Script engine lifecycle, execution control and cancellation.
pub mod runtime;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust,no_run
/// use hostbridge::{Result, ScriptEngine};
///
/// fn answer(engine: &ScriptEngine) -> Result<hostbridge::value::HostValue> {
///     engine.evaluate("6 * 7")
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `hostbridge` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use hostbridge::{Error, ScriptEngine};
///
/// # fn run(engine: &ScriptEngine) {
/// match engine.execute("loop { }") {
///     Ok(()) => println!("finished"),
///     Err(Error::ExecutionCancelled) => println!("interrupted"),
///     Err(e) => println!("Error: {}", e),
/// }
/// # }
/// ```
pub use error::Error;

/// The resource limit carried by [`Error::LimitExceeded`].
pub use error::LimitKind;

/// The script engine facade.
///
/// See [`runtime::ScriptEngine`] for binding host items and running scripts.
pub use runtime::ScriptEngine;

pub use access::HostItemFlags;
pub use runtime::{EngineConfig, ScriptLimits};
pub use value::{HostObject, HostValue};
