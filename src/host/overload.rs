//! Overload selection.
//!
//! Every candidate accepting the argument count is scored with [`marshal::score`]; a candidate
//! is applicable if every argument scores. Among the visible applicable candidates the highest
//! total wins, non-variadic before variadic on equal totals. Remaining ties are resolved in
//! favor of the most derived declaration; a tie between two signatures of the same type is
//! ambiguous.

use rhai::Dynamic;
use tracing::trace;

use crate::{
    access::{AccessPolicy, HostItemFlags},
    marshal,
    typesystem::{HostType, MemberMatch, MethodRc, TypeRegistry},
    value::HostValue,
    Error, Result,
};

/// The selected signature and the arguments converted to its parameter shapes
pub(crate) struct Selection {
    pub matched: MemberMatch<MethodRc>,
    pub args: Vec<HostValue>,
}

struct Scored {
    index: usize,
    total: u32,
    expanded: bool,
    visible: bool,
}

impl Scored {
    fn key(&self) -> (u32, bool) {
        (self.total, !self.expanded)
    }
}

fn describe_args(args: &[Dynamic]) -> String {
    args.iter()
        .map(marshal::describe)
        .collect::<Vec<_>>()
        .join(", ")
}

fn applicable(candidate: &MemberMatch<MethodRc>, args: &[Dynamic]) -> Option<(u32, bool)> {
    let method = &candidate.member;
    if !method.accepts_arity(args.len()) {
        return None;
    }

    let type_args = candidate.declaring.type_arguments();
    let mut total = 0;
    for (position, arg) in args.iter().enumerate() {
        let shape = method.shape_at(position)?.substitute(type_args);
        total += marshal::score(arg, &shape)?;
    }

    Some((total, args.len() > method.params.len() || method.params_array.is_some()))
}

/// Select the signature of `member` to call with `args`.
///
/// ## Arguments
/// * 'member'     - Member name, for diagnostics
/// * 'candidates' - Signatures sharing the name, most derived declarations first
/// * 'args'       - Script arguments
/// * 'flags'      - Access flags of the item the member is reached through
/// * 'context'    - The engine's access context type
/// * 'registry'   - Registry used for argument conversion
///
/// # Errors
/// Returns [`Error::OverloadResolution`] if no signature applies or the best ones are
/// ambiguous, [`Error::AccessDenied`] if only non-visible signatures apply, and
/// [`Error::Conversion`] if an argument fails its final conversion.
pub(crate) fn select(
    member: &str,
    candidates: &[MemberMatch<MethodRc>],
    args: &[Dynamic],
    flags: HostItemFlags,
    context: Option<&HostType>,
    registry: &TypeRegistry,
) -> Result<Selection> {
    let mut scored: Vec<Scored> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            applicable(candidate, args).map(|(total, expanded)| Scored {
                index,
                total,
                expanded,
                visible: AccessPolicy::is_member_visible(
                    flags,
                    &candidate.declaring,
                    candidate.member.access,
                    context,
                ),
            })
        })
        .collect();

    if scored.is_empty() {
        return Err(Error::OverloadResolution {
            member: member.to_string(),
            arguments: describe_args(args),
            reason: format!("none of {} signatures accepts the arguments", candidates.len()),
        });
    }

    if !scored.iter().any(|entry| entry.visible) {
        let hidden = &candidates[scored[0].index];
        AccessPolicy::check(flags, &hidden.declaring, hidden.member.access, member, context)?;
    }
    scored.retain(|entry| entry.visible);

    // stable: equal keys keep the most derived declaration first
    scored.sort_by(|a, b| b.key().cmp(&a.key()));
    let best = &scored[0];
    let best_declaring = candidates[best.index].declaring.token;

    let ambiguous = scored[1..]
        .iter()
        .take_while(|entry| entry.key() == best.key())
        .any(|entry| candidates[entry.index].declaring.token == best_declaring);
    if ambiguous {
        return Err(Error::OverloadResolution {
            member: member.to_string(),
            arguments: describe_args(args),
            reason: "more than one signature is equally specific".to_string(),
        });
    }

    let matched = candidates[best.index].clone();
    let type_args = matched.declaring.type_arguments();
    let mut converted = Vec::with_capacity(args.len());
    for (position, arg) in args.iter().enumerate() {
        let shape = match matched.member.shape_at(position) {
            Some(shape) => shape.substitute(type_args),
            None => break,
        };
        converted.push(marshal::to_host(arg, &shape, registry)?);
    }

    trace!("selected {} on {}", matched.member, matched.declaring.fullname());
    Ok(Selection {
        matched,
        args: converted,
    })
}
