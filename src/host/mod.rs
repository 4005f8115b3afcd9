//! Host item proxies and member dispatch.
//!
//! A [`HostItem`] is what script code holds when it touches anything host-side: a bound host
//! object or type, a namespace of the host type collection, an array, an enum or struct value,
//! an event or an event connection. All member access on items is dispatched through the
//! engine's [`BridgeContext`], which owns the per-engine state (bound items, access context,
//! global members) and applies the access policy on every access.
//!
//! # Key Components
//!
//! - [`HostItem`] / [`HostTarget`]: The script-visible proxy and what it refers to
//! - [`BridgeContext`]: Per-engine state plus member get/set/invoke, construction and indexing
//! - [`HostFunctions`]: The `host` helper object (`newObj`, `newArr`, `newVar`, `cast`, ...)
//! - [`HostVariable`], [`HostDelegate`], [`PropertyBag`]: Helper host objects

mod context;
mod functions;
mod item;
mod overload;
mod proxy;

pub use context::BridgeContext;
pub use functions::{
    DelegateBody, HostDelegate, HostFunctions, HostVariable, PropertyBag, HOST_NAMESPACE,
};
pub use item::{EventSite, HostItem, HostTarget};
