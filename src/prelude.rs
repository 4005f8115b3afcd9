//! # hostbridge Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the hostbridge library. Import this module to get quick access to everything needed
//! to declare host types, bind host items and run scripts.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all hostbridge operations
pub use crate::Error;

/// The result type used throughout hostbridge
pub use crate::Result;

/// Resource limit that terminated a run
pub use crate::LimitKind;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The script engine and its configuration
pub use crate::runtime::{EngineConfig, ScriptEngine, ScriptLimits};

/// Host access to script globals, run state and cancellation
pub use crate::runtime::{ContinuationCallback, ExecutionState, ScriptObject};

// ================================================================================================
// Type System
// ================================================================================================

/// Type descriptors, registry and resolver
pub use crate::typesystem::{
    HostType, HostTypeRc, NamespaceNode, PrimitiveKind, TypeBuilder, TypeFlavor, TypeRegistry,
    TypeResolver,
};

/// Member declarations
pub use crate::typesystem::{
    EventMember, Indexer, Invocation, MemberAccess, Method, ParamShape, Property,
};

// ================================================================================================
// Values and Host Items
// ================================================================================================

/// Host values and host object capability trait
pub use crate::value::{EnumValue, HostArray, HostObject, HostObjectRef, HostValue, StructValue};

/// Host items and the helper host objects
pub use crate::host::{
    BridgeContext, HostDelegate, HostFunctions, HostItem, HostTarget, HostVariable, PropertyBag,
};

/// Access flags of bound host items
pub use crate::access::HostItemFlags;

// ================================================================================================
// Events
// ================================================================================================

/// Host events
pub use crate::events::{EventConnection, EventHandler, EventSource};
