//! Instance resolution.
//!
//! Instance arguments are solved by a backtracking search over candidate
//! instances: local hypotheses of instance goals first (innermost first),
//! then declarations registered for the goal's class, in priority order.
//! A candidate may itself take instance arguments, which are resolved
//! recursively up to [`MAX_DEPTH`]. Each attempt runs against the live
//! metavariable environment and is rolled back before the next candidate is
//! tried, so a failed candidate leaves no solutions behind.

use std::sync::Arc;

use crate::core::semantics::{ArcValue, Value};
use crate::core::universe::ULevel;
use crate::core::{Name, Plicity};
use crate::env::SharedEnv;
use crate::source::ByteRange;
use crate::surface::elaboration::{Context, MetaSource};

/// The maximum nesting depth of instance searches.
pub(super) const MAX_DEPTH: u32 = 32;

/// The reason an instance search came up empty.
#[derive(Debug, Clone)]
pub enum Failure {
    /// No candidate matched the goal.
    NoCandidate,
    /// A candidate was abandoned because its own instance arguments nested
    /// deeper than [`MAX_DEPTH`].
    DepthExceeded,
}

/// Search for a value of the goal type. On success the returned value is an
/// elaborated instance; solutions its unification made along the way are
/// kept, while failed attempts have been rolled back.
pub(super) fn resolve<'arena>(
    ctx: &mut Context<'_, 'arena, '_>,
    range: ByteRange,
    goal: &ArcValue<'arena>,
    depth: u32,
) -> Result<ArcValue<'arena>, Failure> {
    if depth >= MAX_DEPTH {
        return Err(Failure::DepthExceeded);
    }

    let goal = ctx.elim_env().force_and_unfold(goal);
    let class = match goal.match_const_spine() {
        Some((class, _)) => class,
        None => return Err(Failure::NoCandidate),
    };

    // Local hypotheses shadow registered instances.
    if ctx.config.use_local_instances {
        let locals: Vec<(ArcValue<'arena>, ArcValue<'arena>)> = Iterator::zip(
            ctx.local_env.exprs.iter().cloned(),
            ctx.local_env.types.iter().cloned(),
        )
        .collect();

        for (expr, r#type) in locals.into_iter().rev() {
            let forced = ctx.elim_env().force_and_unfold(&r#type);
            match forced.match_const_spine() {
                Some((head, _)) if head == class => {}
                _ => continue,
            }
            let saved = ctx.meta_env.save();
            match ctx.unification_context().unify(&forced, &goal) {
                Ok(()) => return Ok(expr),
                Err(_) => ctx.meta_env.restore(saved),
            }
        }
    }

    let mut hit_depth = false;
    let candidates: Vec<_> = ctx.env.instances(class).to_vec();
    for entry in candidates {
        match try_candidate(ctx, range, &goal, entry.name, depth) {
            Ok(value) => return Ok(value),
            Err(Failure::DepthExceeded) => hit_depth = true,
            Err(Failure::NoCandidate) => {}
        }
    }

    match hit_depth {
        true => Err(Failure::DepthExceeded),
        false => Err(Failure::NoCandidate),
    }
}

/// Attempt to conclude the goal from a single registered instance, rolling
/// the metavariable environment back on failure.
fn try_candidate<'arena>(
    ctx: &mut Context<'_, 'arena, '_>,
    range: ByteRange,
    goal: &ArcValue<'arena>,
    name: Name,
    depth: u32,
) -> Result<ArcValue<'arena>, Failure> {
    let decl = match ctx.env.get(name).cloned() {
        Some(decl) => decl,
        None => return Err(Failure::NoCandidate),
    };
    let levels: &'arena [ULevel<'arena>] = match decl.level_params.is_empty() {
        true => &[],
        false => ctx
            .scope
            .to_scope_from_iter(decl.level_params.iter().map(|_| ULevel::Zero)),
    };

    let saved = ctx.meta_env.save();
    let r#type = decl.r#type.instantiate_levels(ctx.scope, levels);
    let mut local_exprs = SharedEnv::new();
    let mut r#type = ctx.elim_env().eval_env(&mut local_exprs).eval(r#type);
    let mut value = Arc::new(Value::r#const(name, levels));

    // Feed the candidate's parameters until its conclusion can be compared
    // with the goal.
    loop {
        let forced = ctx.elim_env().force(&r#type);
        match forced.as_ref() {
            Value::FunType(Plicity::Implicit, name, dom, cod) => {
                let arg = ctx
                    .push_unsolved_value(MetaSource::ImplicitArg(range, *name), dom.clone());
                value = ctx.elim_env().fun_app(value, Plicity::Implicit, arg.clone());
                r#type = ctx.elim_env().apply_closure(cod, arg);
            }
            Value::FunType(Plicity::Instance, _, dom, cod) => {
                let arg = match resolve(ctx, range, dom, depth + 1) {
                    Ok(arg) => arg,
                    Err(failure) => {
                        ctx.meta_env.restore(saved);
                        return Err(failure);
                    }
                };
                value = ctx.elim_env().fun_app(value, Plicity::Instance, arg.clone());
                r#type = ctx.elim_env().apply_closure(cod, arg);
            }
            // An instance with an unfilled explicit parameter cannot be
            // applied automatically.
            Value::FunType(Plicity::Explicit, ..) => {
                ctx.meta_env.restore(saved);
                return Err(Failure::NoCandidate);
            }
            _ => break,
        }
    }

    match ctx.unification_context().unify(&r#type, goal) {
        Ok(()) => Ok(value),
        Err(_) => {
            ctx.meta_env.restore(saved);
            Err(Failure::NoCandidate)
        }
    }
}
