//! Member visibility policy.
//!
//! By default scripts see only public members. Two mechanisms widen that view:
//!
//! - [`HostItemFlags::PRIVATE_ACCESS`] on a binding makes every member of that one item visible
//! - the engine-wide [`AccessContext`] authorizes non-public members as if the calling code
//!   were declared inside the context type: private members of the type itself and its nested
//!   types, family members of its bases, assembly members of its assembly
//!
//! [`HostItemFlags::GLOBAL_MEMBERS`] is unrelated to visibility; it additionally exposes the
//! item's members unqualified, see [`GlobalMembers`].

mod globals;

use std::sync::RwLock;

use bitflags::bitflags;
use tracing::warn;

use crate::{
    typesystem::{HostType, HostTypeRc, MemberAccess},
    Error, Result,
};

pub use globals::GlobalMembers;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Per-binding access flags
    pub struct HostItemFlags: u32 {
        /// Non-public members of this item are visible
        const PRIVATE_ACCESS = 0x0001;
        /// Members of this item are exposed unqualified in the script global namespace
        const GLOBAL_MEMBERS = 0x0002;
    }
}

impl HostItemFlags {
    /// No flags: public members only, no global exposure
    pub const DEFAULT: Self = Self::empty();
}

impl Default for HostItemFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The type whose non-public members the engine may access.
///
/// Replacing the context affects subsequent member accesses only.
#[derive(Debug, Default)]
pub struct AccessContext {
    current: RwLock<Option<HostTypeRc>>,
}

impl AccessContext {
    /// An empty access context
    #[must_use]
    pub fn new() -> Self {
        AccessContext {
            current: RwLock::new(None),
        }
    }

    /// The current context type
    #[must_use]
    pub fn get(&self) -> Option<HostTypeRc> {
        read_lock!(self.current).clone()
    }

    /// Replace the context type, `None` clears it
    pub fn set(&self, context: Option<HostTypeRc>) {
        *write_lock!(self.current) = context;
    }
}

/// Decides whether a member is visible to script code.
pub struct AccessPolicy;

impl AccessPolicy {
    /// `true` if a member with `access`, declared on `declaring`, is visible through an item
    /// bound with `flags` while `context` is the engine's access context.
    #[must_use]
    pub fn is_member_visible(
        flags: HostItemFlags,
        declaring: &HostType,
        access: MemberAccess,
        context: Option<&HostType>,
    ) -> bool {
        if access.is_public() || flags.contains(HostItemFlags::PRIVATE_ACCESS) {
            return true;
        }

        let Some(context) = context else {
            return false;
        };

        let inside = context.is_same_definition(declaring) || context.is_nested_in(declaring);
        let family = inside || context.derives_from(declaring);
        let assembly = !declaring.assembly.is_empty() && context.assembly == declaring.assembly;

        if access == MemberAccess::PRIVATE {
            inside
        } else if access == MemberAccess::FAMILY {
            family
        } else if access == MemberAccess::ASSEM {
            assembly
        } else if access == MemberAccess::FAM_AND_ASSEM {
            family && assembly
        } else if access == MemberAccess::FAM_OR_ASSEM {
            family || assembly
        } else {
            false
        }
    }

    /// Check visibility, failing with [`Error::AccessDenied`].
    ///
    /// # Errors
    /// Returns [`Error::AccessDenied`] if the member is not visible.
    pub fn check(
        flags: HostItemFlags,
        declaring: &HostType,
        access: MemberAccess,
        member: &str,
        context: Option<&HostType>,
    ) -> Result<()> {
        if Self::is_member_visible(flags, declaring, access, context) {
            return Ok(());
        }

        warn!(
            "denied access to {:?} member '{}' of {}",
            access,
            member,
            declaring.fullname()
        );
        Err(Error::AccessDenied {
            type_name: declaring.fullname(),
            member: member.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::{TypeBuilder, TypeRegistry};

    #[test]
    fn test_public_and_private_access_flag() {
        let registry = TypeRegistry::new();
        let ty = registry.define(TypeBuilder::class("Demo", "Secretive")).unwrap();

        assert!(AccessPolicy::is_member_visible(
            HostItemFlags::DEFAULT,
            &ty,
            MemberAccess::PUBLIC,
            None
        ));
        assert!(!AccessPolicy::is_member_visible(
            HostItemFlags::DEFAULT,
            &ty,
            MemberAccess::PRIVATE,
            None
        ));
        assert!(AccessPolicy::is_member_visible(
            HostItemFlags::PRIVATE_ACCESS,
            &ty,
            MemberAccess::PRIVATE,
            None
        ));
        assert!(matches!(
            AccessPolicy::check(HostItemFlags::DEFAULT, &ty, MemberAccess::FAMILY, "Hidden", None),
            Err(Error::AccessDenied { member, .. }) if member == "Hidden"
        ));
    }

    #[test]
    fn test_access_context_rules() {
        let registry = TypeRegistry::new();
        let base = registry
            .define(TypeBuilder::class("Demo", "Base").assembly("Core"))
            .unwrap();
        let derived = registry
            .define(TypeBuilder::class("Demo", "Derived").assembly("Plugin").base(&base))
            .unwrap();
        let nested = registry
            .define(TypeBuilder::class("Demo", "Inner").assembly("Core").nested_in(&base))
            .unwrap();
        let stranger = registry
            .define(TypeBuilder::class("Demo", "Stranger").assembly("Core"))
            .unwrap();

        let visible = |access, context: &HostTypeRc| {
            AccessPolicy::is_member_visible(
                HostItemFlags::DEFAULT,
                &base,
                access,
                Some(context.as_ref()),
            )
        };

        assert!(visible(MemberAccess::PRIVATE, &base));
        assert!(visible(MemberAccess::PRIVATE, &nested));
        assert!(!visible(MemberAccess::PRIVATE, &derived));

        assert!(visible(MemberAccess::FAMILY, &derived));
        assert!(!visible(MemberAccess::FAMILY, &stranger));

        assert!(visible(MemberAccess::ASSEM, &stranger));
        assert!(!visible(MemberAccess::ASSEM, &derived));

        assert!(!visible(MemberAccess::FAM_AND_ASSEM, &derived));
        assert!(visible(MemberAccess::FAM_AND_ASSEM, &nested));
        assert!(visible(MemberAccess::FAM_OR_ASSEM, &derived));
        assert!(visible(MemberAccess::FAM_OR_ASSEM, &stranger));
        assert!(!visible(MemberAccess::COMPILER_CONTROLLED, &base));
    }

    #[test]
    fn test_context_replacement() {
        let registry = TypeRegistry::new();
        let ty = registry.define(TypeBuilder::class("Demo", "Owner")).unwrap();
        let context = AccessContext::new();

        assert!(context.get().is_none());
        context.set(Some(ty.clone()));
        assert_eq!(context.get().unwrap().token, ty.token);
        context.set(None);
        assert!(context.get().is_none());
    }
}
