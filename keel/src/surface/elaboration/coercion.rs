//! Coercion insertion.
//!
//! When unification fails, a registered coercion between the heads of the
//! two types can still bridge them. Coercions also lift over functions: a
//! function whose codomain coerces is wrapped in an eta-expansion that
//! applies the coercion to its result.

use crate::core::semantics::{ArcValue, Value};
use crate::core::{Name, Plicity, Term};
use crate::env::Index;
use crate::source::Span;
use crate::surface::elaboration::Context;

/// Try to coerce `expr` from the `from` type to the `to` type. Returns
/// `None` when no registered coercion applies.
pub(super) fn coerce<'arena>(
    ctx: &mut Context<'_, 'arena, '_>,
    span: Span,
    expr: Term<'arena>,
    from: &ArcValue<'arena>,
    to: &ArcValue<'arena>,
) -> Option<Term<'arena>> {
    if let Some(name) = head_coercion(ctx, from, to) {
        return Some(apply_coercion(ctx, span, name, expr));
    }

    if ctx.config.lift_coercions {
        return lift_over_function(ctx, span, expr, from, to);
    }

    None
}

/// A coercion registered between the head constants of the two types.
fn head_coercion<'arena>(
    ctx: &Context<'_, 'arena, '_>,
    from: &ArcValue<'arena>,
    to: &ArcValue<'arena>,
) -> Option<Name> {
    let from = ctx.elim_env().force_and_unfold(from);
    let to = ctx.elim_env().force_and_unfold(to);
    let (from_head, _) = from.match_const_spine()?;
    let (to_head, _) = to.match_const_spine()?;
    ctx.env.coercion(from_head, to_head)
}

fn apply_coercion<'arena>(
    ctx: &Context<'_, 'arena, '_>,
    span: Span,
    name: Name,
    expr: Term<'arena>,
) -> Term<'arena> {
    Term::FunApp(
        span,
        Plicity::Explicit,
        ctx.scope.to_scope(Term::Const(span, name, &[])),
        ctx.scope.to_scope(expr),
    )
}

/// Lift a coercion over an explicit function type:
///
/// ```text
/// f : A -> B    coe : B -> C
/// ----------------------------
/// fun x => coe (f x) : A -> C
/// ```
fn lift_over_function<'arena>(
    ctx: &mut Context<'_, 'arena, '_>,
    span: Span,
    expr: Term<'arena>,
    from: &ArcValue<'arena>,
    to: &ArcValue<'arena>,
) -> Option<Term<'arena>> {
    let from = ctx.elim_env().force_and_unfold(from);
    let to = ctx.elim_env().force_and_unfold(to);

    let (from_dom, from_cod, to_dom, to_cod, name) = match (from.as_ref(), to.as_ref()) {
        (
            Value::FunType(Plicity::Explicit, name, from_dom, from_cod),
            Value::FunType(Plicity::Explicit, _, to_dom, to_cod),
        ) => (from_dom, from_cod, to_dom, to_cod, *name),
        _ => return None,
    };

    // The domains must already agree; only the codomain is coerced.
    if !ctx.conversion_env().is_equal(from_dom, to_dom) {
        return None;
    }

    let var = std::sync::Arc::new(Value::local_var(ctx.local_env.len().next_level()));
    let from_cod = ctx.elim_env().apply_closure(from_cod, var.clone());
    let to_cod = ctx.elim_env().apply_closure(to_cod, var);
    let coe = head_coercion(ctx, &from_cod, &to_cod)?;

    // `expr` moves under one binder.
    let shifted = ctx.scope.to_scope(expr).shift(ctx.scope, 1);
    let applied = Term::FunApp(
        span,
        Plicity::Explicit,
        shifted,
        ctx.scope.to_scope(Term::LocalVar(span, Index::last())),
    );
    let body = apply_coercion(ctx, span, coe, applied);

    Some(Term::FunLit(
        span,
        Plicity::Explicit,
        name,
        ctx.scope.to_scope(body),
    ))
}
