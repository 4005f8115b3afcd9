//! Name resolution for host types.
//!
//! The [`TypeResolver`] turns names requested by the host or by scripts into type
//! descriptors. A requested name goes through a small state machine:
//!
//! 1. **Parse**: an optional assembly qualification (`Name, Assembly`) and an optional
//!    generic arity suffix (`` List`1 ``) are split off
//! 2. **Lookup**: full name first, then simple name
//! 3. **Filter**: candidates outside the assembly hint are dropped
//! 4. **Select**: the candidate with the requested generic arity wins
//! 5. **Close**: type arguments, if supplied, turn the open definition into a closed type
//!
//! Closing is one-way: [`TypeResolver::close`] refuses already-closed and non-generic types.

use std::{fmt, sync::Arc};

use tracing::trace;

use crate::{
    typesystem::{GenericState, HostTypeRc, TypeRegistry},
    Result,
};

/// A namespace scope, reachable from script through the type collection.
///
/// The root node (empty path) is the host type collection itself; member access on a node
/// resolves either a type or a nested namespace below its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceNode {
    path: String,
}

impl NamespaceNode {
    /// The root of all namespaces
    #[must_use]
    pub fn root() -> Self {
        NamespaceNode {
            path: String::new(),
        }
    }

    /// Node for the dotted namespace `path`
    #[must_use]
    pub fn new(path: &str) -> Self {
        NamespaceNode {
            path: path.to_string(),
        }
    }

    /// Dotted namespace path, empty for the root
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `true` for the type collection root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Dotted path of `name` below this node
    #[must_use]
    pub fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }
}

impl fmt::Display for NamespaceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "HostTypeCollection")
        } else {
            write!(f, "{}", self.path)
        }
    }
}

/// Result of a member access on a [`NamespaceNode`]
#[derive(Debug, Clone)]
pub enum ResolvedChild {
    /// The name denotes a type
    Type(HostTypeRc),
    /// The name denotes a nested namespace
    Namespace(NamespaceNode),
}

/// A parsed type request
struct TypeRequest<'a> {
    name: &'a str,
    arity: Option<usize>,
    assembly: Option<&'a str>,
}

impl<'a> TypeRequest<'a> {
    fn parse(name: &'a str, assembly_hint: Option<&'a str>) -> Self {
        let (name, qualified) = match name.split_once(',') {
            Some((name, assembly)) => (name.trim(), Some(assembly.trim())),
            None => (name.trim(), None),
        };

        let (name, arity) = match name.rsplit_once('`') {
            Some((base, arity)) => match arity.parse::<usize>() {
                Ok(arity) => (base, Some(arity)),
                Err(_) => (name, None),
            },
            None => (name, None),
        };

        TypeRequest {
            name,
            arity,
            assembly: assembly_hint.or(qualified).filter(|a| !a.is_empty()),
        }
    }
}

/// Resolves host type names, closes generic definitions and navigates namespaces.
pub struct TypeResolver {
    registry: Arc<TypeRegistry>,
}

impl TypeResolver {
    /// Create a resolver over `registry`
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        TypeResolver { registry }
    }

    /// The registry this resolver reads from
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Resolve `name` to a type descriptor.
    ///
    /// `name` may be a full or simple name, may carry a `` `N `` arity suffix and may be
    /// assembly-qualified (`"Ns.Name, Assembly"`). When `type_args` is not empty the matching
    /// generic definition is closed over them.
    ///
    /// ## Arguments
    /// * 'name'          - The requested type name
    /// * 'type_args'     - Type arguments to close a generic definition with, may be empty
    /// * 'assembly_hint' - Restrict the lookup to types declared by this assembly
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if no type matches, the assembly is unknown,
    /// or the generic arity does not fit.
    pub fn resolve(
        &self,
        name: &str,
        type_args: &[HostTypeRc],
        assembly_hint: Option<&str>,
    ) -> Result<HostTypeRc> {
        let request = TypeRequest::parse(name, assembly_hint);

        let mut candidates = self.registry.get_all_by_fullname(request.name);
        if candidates.is_empty() {
            candidates = self.registry.get_by_name(request.name);
        }

        if let Some(assembly) = request.assembly {
            if !self.registry.has_assembly(assembly) {
                return Err(resolution_error!(
                    name,
                    "assembly '{}' is not known",
                    assembly
                ));
            }
            candidates.retain(|candidate| candidate.assembly == assembly);
        }

        if candidates.is_empty() {
            return Err(resolution_error!(name, "no such type"));
        }

        let arity = if type_args.is_empty() {
            request.arity
        } else {
            Some(type_args.len())
        };

        let selected = match arity {
            Some(arity) => candidates
                .into_iter()
                .find(|candidate| candidate.generic.arity() == arity)
                .ok_or_else(|| {
                    resolution_error!(name, "no generic definition with {} parameters", arity)
                })?,
            None => {
                let position = candidates
                    .iter()
                    .position(|candidate| candidate.generic.arity() == 0)
                    .unwrap_or(0);
                candidates.swap_remove(position)
            }
        };

        trace!("resolved type name '{}' to {}", name, selected.fullname());

        if type_args.is_empty() {
            Ok(selected)
        } else {
            self.close(&selected, type_args)
        }
    }

    /// Close the open generic definition `open` over `args`.
    ///
    /// Closing the same definition over the same arguments yields the same descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeResolution`] if `open` is not generic, is already closed,
    /// `args` has the wrong length, or an argument is itself an open generic.
    pub fn close(&self, open: &HostTypeRc, args: &[HostTypeRc]) -> Result<HostTypeRc> {
        match &open.generic {
            GenericState::NonGeneric => {
                Err(resolution_error!(open.fullname(), "type is not generic"))
            }
            GenericState::Closed { .. } => Err(resolution_error!(
                open.fullname(),
                "type arguments have already been applied"
            )),
            GenericState::Open { arity } => {
                if *arity != args.len() {
                    return Err(resolution_error!(
                        open.fullname(),
                        "expected {} type arguments, found {}",
                        arity,
                        args.len()
                    ));
                }

                if let Some(argument) = args.iter().find(|argument| argument.is_open_generic()) {
                    return Err(resolution_error!(
                        open.fullname(),
                        "type argument '{}' is an open generic",
                        argument.fullname()
                    ));
                }

                Ok(self.registry.instantiation(open, args))
            }
        }
    }

    /// Resolve `name` below the namespace `node`.
    ///
    /// Types win over namespaces of the same path; among types the non-generic one wins.
    #[must_use]
    pub fn child(&self, node: &NamespaceNode, name: &str) -> Option<ResolvedChild> {
        let path = node.child_path(name);

        if let Some(found) = self.registry.get_by_fullname(&path) {
            return Some(ResolvedChild::Type(found));
        }

        if self.registry.has_namespace(&path) {
            return Some(ResolvedChild::Namespace(NamespaceNode::new(&path)));
        }

        None
    }
}
