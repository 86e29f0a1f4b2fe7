//! The core language.
//!
//! Core terms are the output of elaboration and the input to the kernel:
//! fully explicit, nameless (de Bruijn indexed) expression trees, allocated
//! in an arena and shared by reference. Terms are immutable; structural
//! sharing is pervasive and a term may be referenced from many contexts at
//! once. Equality of terms is structural (spans and binder name hints are
//! ignored).

use std::cell::RefCell;

use scoped_arena::Scope;

use crate::env::{Index, Level};
use crate::source::{Span, StringId, StringInterner};

pub mod global;
pub mod inductive;
pub mod pretty;
pub mod semantics;
pub mod typing;
pub mod universe;

use universe::ULevel;

/// A hierarchical name: a dot-separated sequence of path components,
/// interned as a single string. Names key declarations, instances and
/// coercions in an [environment][global::Environment].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(StringId);

impl Name {
    /// Intern a full dotted path, for example `"nat.rec"`.
    pub fn intern(interner: &RefCell<StringInterner>, name: &str) -> Name {
        Name(interner.borrow_mut().get_or_intern(name))
    }

    /// A single-component name from an already interned string.
    pub fn from_id(id: StringId) -> Name {
        Name(id)
    }

    /// Extend the name with a child component.
    pub fn child(self, interner: &RefCell<StringInterner>, component: &str) -> Name {
        let mut interner = interner.borrow_mut();
        let base = interner.resolve(self.0).unwrap_or("").to_owned();
        Name(interner.get_or_intern(format!("{base}.{component}")))
    }

    pub fn id(self) -> StringId {
        self.0
    }

    /// Resolve the name to its dotted string form.
    pub fn resolve<'interner>(&self, interner: &'interner StringInterner) -> &'interner str {
        interner.resolve(self.0).unwrap_or("<unresolved>")
    }
}

/// The way in which a function parameter is supplied at call sites.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Plicity {
    /// A parameter that is supplied by the user.
    Explicit,
    /// A parameter inferred by unification.
    Implicit,
    /// A parameter solved by instance resolution.
    Instance,
}

impl Plicity {
    pub fn description(&self) -> &'static str {
        match self {
            Plicity::Explicit => "explicit",
            Plicity::Implicit => "implicit",
            Plicity::Instance => "instance",
        }
    }
}

/// The syntactic shape of a local context entry, as recorded on
/// [inserted metavariables][Term::InsertedMeta]. A metavariable depends on
/// the parameters of its local context, but not on the definitions, which
/// can be substituted away.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LocalInfo {
    Def,
    Param,
}

/// Literals of the built-in base types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Literal {
    Nat(u64),
    Str(StringId),
}

/// Core terms.
#[derive(Debug, Clone)]
pub enum Term<'arena> {
    /// Bound variable occurrences.
    LocalVar(Span, Index),
    /// References to declarations in the environment, instantiated at the
    /// given universe level arguments.
    Const(Span, Name, &'arena [ULevel<'arena>]),
    /// Metavariable occurrences.
    MetaVar(Span, Level),
    /// A metavariable occurrence inserted during elaboration, applied to the
    /// parameters of the local context it was created in (one entry per
    /// local binding, recording whether that binding was a definition or a
    /// parameter).
    InsertedMeta(Span, Level, &'arena [LocalInfo]),
    /// Universe sorts.
    Sort(Span, ULevel<'arena>),
    /// Annotated terms.
    Ann(Span, &'arena Term<'arena>, &'arena Term<'arena>),
    /// Let bindings: type, bound expression, body.
    Let(
        Span,
        Option<StringId>,
        &'arena Term<'arena>,
        &'arena Term<'arena>,
        &'arena Term<'arena>,
    ),
    /// Dependent function types.
    FunType(
        Span,
        Plicity,
        Option<StringId>,
        &'arena Term<'arena>,
        &'arena Term<'arena>,
    ),
    /// Function literals. Unannotated: the parameter type comes from the
    /// type the literal is checked against.
    FunLit(Span, Plicity, Option<StringId>, &'arena Term<'arena>),
    /// Function applications.
    FunApp(Span, Plicity, &'arena Term<'arena>, &'arena Term<'arena>),
    /// Dependent record (structure) types: a telescope of field types, each
    /// scoping over the fields before it.
    RecordType(Span, &'arena [StringId], &'arena [Term<'arena>]),
    /// Record literals.
    RecordLit(Span, &'arena [StringId], &'arena [Term<'arena>]),
    /// Record field projections.
    RecordProj(Span, &'arena Term<'arena>, StringId),
    /// Literals.
    Lit(Span, Literal),
    /// A sentinel standing for a subterm that failed to elaborate. A
    /// diagnostic has already been reported for it; the kernel rejects it.
    Error(Span),
}

impl<'arena> Term<'arena> {
    /// Get the source span of the term.
    pub fn span(&self) -> Span {
        match self {
            Term::LocalVar(span, _)
            | Term::Const(span, _, _)
            | Term::MetaVar(span, _)
            | Term::InsertedMeta(span, _, _)
            | Term::Sort(span, _)
            | Term::Ann(span, _, _)
            | Term::Let(span, _, _, _, _)
            | Term::FunType(span, _, _, _, _)
            | Term::FunLit(span, _, _, _)
            | Term::FunApp(span, _, _, _)
            | Term::RecordType(span, _, _)
            | Term::RecordLit(span, _, _)
            | Term::RecordProj(span, _, _)
            | Term::Lit(span, _)
            | Term::Error(span) => *span,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Term::Error(_))
    }

    /// Structural equality, ignoring spans and binder name hints. Universe
    /// levels are compared up to definitional equality, so `Sort (imax 1 1)`
    /// and `Sort 1` are alpha-equal.
    pub fn alpha_eq(&self, other: &Term<'arena>) -> bool {
        match (self, other) {
            (Term::LocalVar(_, var0), Term::LocalVar(_, var1)) => var0 == var1,
            (Term::Const(_, name0, levels0), Term::Const(_, name1, levels1)) => {
                name0 == name1 && ULevel::all_def_eq(levels0, levels1)
            }
            (Term::MetaVar(_, var0), Term::MetaVar(_, var1)) => var0 == var1,
            (Term::InsertedMeta(_, var0, infos0), Term::InsertedMeta(_, var1, infos1)) => {
                var0 == var1 && infos0 == infos1
            }
            (Term::Sort(_, level0), Term::Sort(_, level1)) => level0.is_def_eq(level1),
            (Term::Ann(_, expr0, type0), Term::Ann(_, expr1, type1)) => {
                expr0.alpha_eq(expr1) && type0.alpha_eq(type1)
            }
            (Term::Let(_, _, type0, expr0, body0), Term::Let(_, _, type1, expr1, body1)) => {
                type0.alpha_eq(type1) && expr0.alpha_eq(expr1) && body0.alpha_eq(body1)
            }
            (
                Term::FunType(_, plicity0, _, dom0, cod0),
                Term::FunType(_, plicity1, _, dom1, cod1),
            ) => plicity0 == plicity1 && dom0.alpha_eq(dom1) && cod0.alpha_eq(cod1),
            (Term::FunLit(_, plicity0, _, body0), Term::FunLit(_, plicity1, _, body1)) => {
                plicity0 == plicity1 && body0.alpha_eq(body1)
            }
            (Term::FunApp(_, plicity0, fun0, arg0), Term::FunApp(_, plicity1, fun1, arg1)) => {
                plicity0 == plicity1 && fun0.alpha_eq(fun1) && arg0.alpha_eq(arg1)
            }
            (Term::RecordType(_, labels0, types0), Term::RecordType(_, labels1, types1)) => {
                labels0 == labels1 && alpha_eq_slices(types0, types1)
            }
            (Term::RecordLit(_, labels0, exprs0), Term::RecordLit(_, labels1, exprs1)) => {
                labels0 == labels1 && alpha_eq_slices(exprs0, exprs1)
            }
            (Term::RecordProj(_, head0, label0), Term::RecordProj(_, head1, label1)) => {
                label0 == label1 && head0.alpha_eq(head1)
            }
            (Term::Lit(_, lit0), Term::Lit(_, lit1)) => lit0 == lit1,
            (Term::Error(_), Term::Error(_)) => true,
            (_, _) => false,
        }
    }

    /// Visit every metavariable occurrence in the term.
    pub fn for_each_meta(&self, on_meta: &mut impl FnMut(Span, Level)) {
        match self {
            Term::MetaVar(span, var) | Term::InsertedMeta(span, var, _) => on_meta(*span, *var),
            Term::LocalVar(..)
            | Term::Const(..)
            | Term::Sort(..)
            | Term::Lit(..)
            | Term::Error(_) => {}
            Term::Ann(_, expr, r#type) => {
                expr.for_each_meta(on_meta);
                r#type.for_each_meta(on_meta);
            }
            Term::Let(_, _, r#type, expr, body) => {
                r#type.for_each_meta(on_meta);
                expr.for_each_meta(on_meta);
                body.for_each_meta(on_meta);
            }
            Term::FunType(_, _, _, dom, cod) => {
                dom.for_each_meta(on_meta);
                cod.for_each_meta(on_meta);
            }
            Term::FunLit(_, _, _, body) => body.for_each_meta(on_meta),
            Term::FunApp(_, _, fun, arg) => {
                fun.for_each_meta(on_meta);
                arg.for_each_meta(on_meta);
            }
            Term::RecordType(_, _, types) => {
                types.iter().for_each(|r#type| r#type.for_each_meta(on_meta));
            }
            Term::RecordLit(_, _, exprs) => {
                exprs.iter().for_each(|expr| expr.for_each_meta(on_meta));
            }
            Term::RecordProj(_, head, _) => head.for_each_meta(on_meta),
        }
    }

    /// Shift the free variables of the term by `amount` binders.
    pub fn shift(
        &'arena self,
        scope: &'arena Scope<'arena>,
        amount: u32,
    ) -> &'arena Term<'arena> {
        self.shift_from(scope, 0, amount)
    }

    fn shift_from(
        &'arena self,
        scope: &'arena Scope<'arena>,
        cutoff: u32,
        amount: u32,
    ) -> &'arena Term<'arena> {
        if amount == 0 {
            return self;
        }
        match self {
            Term::LocalVar(span, var) if var.to_usize() >= cutoff as usize => {
                scope.to_scope(Term::LocalVar(*span, var.shifted(amount)))
            }
            Term::LocalVar(..)
            | Term::Const(..)
            | Term::MetaVar(..)
            | Term::InsertedMeta(..)
            | Term::Sort(..)
            | Term::Lit(..)
            | Term::Error(_) => self,
            Term::Ann(span, expr, r#type) => scope.to_scope(Term::Ann(
                *span,
                expr.shift_from(scope, cutoff, amount),
                r#type.shift_from(scope, cutoff, amount),
            )),
            Term::Let(span, name, r#type, expr, body) => scope.to_scope(Term::Let(
                *span,
                *name,
                r#type.shift_from(scope, cutoff, amount),
                expr.shift_from(scope, cutoff, amount),
                body.shift_from(scope, cutoff + 1, amount),
            )),
            Term::FunType(span, plicity, name, dom, cod) => scope.to_scope(Term::FunType(
                *span,
                *plicity,
                *name,
                dom.shift_from(scope, cutoff, amount),
                cod.shift_from(scope, cutoff + 1, amount),
            )),
            Term::FunLit(span, plicity, name, body) => scope.to_scope(Term::FunLit(
                *span,
                *plicity,
                *name,
                body.shift_from(scope, cutoff + 1, amount),
            )),
            Term::FunApp(span, plicity, fun, arg) => scope.to_scope(Term::FunApp(
                *span,
                *plicity,
                fun.shift_from(scope, cutoff, amount),
                arg.shift_from(scope, cutoff, amount),
            )),
            Term::RecordType(span, labels, types) => scope.to_scope(Term::RecordType(
                *span,
                labels,
                scope.to_scope_from_iter(
                    types.iter().enumerate().map(|(index, r#type)| {
                        r#type.shift_from(scope, cutoff + index as u32, amount).clone()
                    }),
                ),
            )),
            Term::RecordLit(span, labels, exprs) => scope.to_scope(Term::RecordLit(
                *span,
                labels,
                scope.to_scope_from_iter(
                    exprs
                        .iter()
                        .map(|expr| expr.shift_from(scope, cutoff, amount).clone()),
                ),
            )),
            Term::RecordProj(span, head, label) => scope.to_scope(Term::RecordProj(
                *span,
                head.shift_from(scope, cutoff, amount),
                *label,
            )),
        }
    }

    /// Substitute `arg` for the most recently bound variable, unbinding it:
    /// remaining free variables are shifted down by one.
    pub fn instantiate(
        &'arena self,
        scope: &'arena Scope<'arena>,
        arg: &'arena Term<'arena>,
    ) -> &'arena Term<'arena> {
        self.instantiate_at(scope, 0, arg)
    }

    fn instantiate_at(
        &'arena self,
        scope: &'arena Scope<'arena>,
        depth: u32,
        arg: &'arena Term<'arena>,
    ) -> &'arena Term<'arena> {
        match self {
            Term::LocalVar(_, var) if var.to_usize() == depth as usize => arg.shift(scope, depth),
            Term::LocalVar(span, var) if var.to_usize() > depth as usize => {
                scope.to_scope(Term::LocalVar(*span, var.unshifted(1)))
            }
            Term::LocalVar(..)
            | Term::Const(..)
            | Term::MetaVar(..)
            | Term::InsertedMeta(..)
            | Term::Sort(..)
            | Term::Lit(..)
            | Term::Error(_) => self,
            Term::Ann(span, expr, r#type) => scope.to_scope(Term::Ann(
                *span,
                expr.instantiate_at(scope, depth, arg),
                r#type.instantiate_at(scope, depth, arg),
            )),
            Term::Let(span, name, r#type, expr, body) => scope.to_scope(Term::Let(
                *span,
                *name,
                r#type.instantiate_at(scope, depth, arg),
                expr.instantiate_at(scope, depth, arg),
                body.instantiate_at(scope, depth + 1, arg),
            )),
            Term::FunType(span, plicity, name, dom, cod) => scope.to_scope(Term::FunType(
                *span,
                *plicity,
                *name,
                dom.instantiate_at(scope, depth, arg),
                cod.instantiate_at(scope, depth + 1, arg),
            )),
            Term::FunLit(span, plicity, name, body) => scope.to_scope(Term::FunLit(
                *span,
                *plicity,
                *name,
                body.instantiate_at(scope, depth + 1, arg),
            )),
            Term::FunApp(span, plicity, fun, arg0) => scope.to_scope(Term::FunApp(
                *span,
                *plicity,
                fun.instantiate_at(scope, depth, arg),
                arg0.instantiate_at(scope, depth, arg),
            )),
            Term::RecordType(span, labels, types) => scope.to_scope(Term::RecordType(
                *span,
                labels,
                scope.to_scope_from_iter(types.iter().enumerate().map(|(index, r#type)| {
                    r#type.instantiate_at(scope, depth + index as u32, arg).clone()
                })),
            )),
            Term::RecordLit(span, labels, exprs) => scope.to_scope(Term::RecordLit(
                *span,
                labels,
                scope.to_scope_from_iter(
                    exprs
                        .iter()
                        .map(|expr| expr.instantiate_at(scope, depth, arg).clone()),
                ),
            )),
            Term::RecordProj(span, head, label) => scope.to_scope(Term::RecordProj(
                *span,
                head.instantiate_at(scope, depth, arg),
                *label,
            )),
        }
    }

    /// Replace universe level parameters with the supplied level arguments.
    /// Used when unfolding a reference to a universe-polymorphic declaration.
    pub fn instantiate_levels(
        &'arena self,
        scope: &'arena Scope<'arena>,
        args: &'arena [ULevel<'arena>],
    ) -> &'arena Term<'arena> {
        if args.is_empty() {
            return self;
        }
        match self {
            Term::LocalVar(..) | Term::MetaVar(..) | Term::InsertedMeta(..) | Term::Lit(..)
            | Term::Error(_) => self,
            Term::Sort(span, level) => {
                scope.to_scope(Term::Sort(*span, level.instantiate(scope, args)))
            }
            Term::Const(span, name, levels) => scope.to_scope(Term::Const(
                *span,
                *name,
                scope.to_scope_from_iter(
                    levels.iter().map(|level| level.instantiate(scope, args)),
                ),
            )),
            Term::Ann(span, expr, r#type) => scope.to_scope(Term::Ann(
                *span,
                expr.instantiate_levels(scope, args),
                r#type.instantiate_levels(scope, args),
            )),
            Term::Let(span, name, r#type, expr, body) => scope.to_scope(Term::Let(
                *span,
                *name,
                r#type.instantiate_levels(scope, args),
                expr.instantiate_levels(scope, args),
                body.instantiate_levels(scope, args),
            )),
            Term::FunType(span, plicity, name, dom, cod) => scope.to_scope(Term::FunType(
                *span,
                *plicity,
                *name,
                dom.instantiate_levels(scope, args),
                cod.instantiate_levels(scope, args),
            )),
            Term::FunLit(span, plicity, name, body) => scope.to_scope(Term::FunLit(
                *span,
                *plicity,
                *name,
                body.instantiate_levels(scope, args),
            )),
            Term::FunApp(span, plicity, fun, arg) => scope.to_scope(Term::FunApp(
                *span,
                *plicity,
                fun.instantiate_levels(scope, args),
                arg.instantiate_levels(scope, args),
            )),
            Term::RecordType(span, labels, types) => scope.to_scope(Term::RecordType(
                *span,
                labels,
                scope.to_scope_from_iter(
                    types
                        .iter()
                        .map(|r#type| r#type.instantiate_levels(scope, args).clone()),
                ),
            )),
            Term::RecordLit(span, labels, exprs) => scope.to_scope(Term::RecordLit(
                *span,
                labels,
                scope.to_scope_from_iter(
                    exprs
                        .iter()
                        .map(|expr| expr.instantiate_levels(scope, args).clone()),
                ),
            )),
            Term::RecordProj(span, head, label) => scope.to_scope(Term::RecordProj(
                *span,
                head.instantiate_levels(scope, args),
                *label,
            )),
        }
    }
}

fn alpha_eq_slices<'arena>(lhs: &[Term<'arena>], rhs: &[Term<'arena>]) -> bool {
    lhs.len() == rhs.len() && Iterator::zip(lhs.iter(), rhs.iter()).all(|(l, r)| l.alpha_eq(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_drop() {
        assert!(!std::mem::needs_drop::<Term<'_>>());
        assert!(!std::mem::needs_drop::<ULevel<'_>>());
    }

    #[test]
    fn term_size() {
        assert!(std::mem::size_of::<Term<'_>>() <= 64);
    }

    #[test]
    fn shift_and_instantiate() {
        let scope = Scope::new();
        let var = |index: u32| {
            let mut var = Index::last();
            for _ in 0..index {
                var = var.prev();
            }
            Term::LocalVar(Span::Empty, var)
        };

        // (λ. 1 0) [x := 0]  ⇝  λ. 1 0  (the free variable is under a binder)
        let body = scope.to_scope(Term::FunApp(
            Span::Empty,
            Plicity::Explicit,
            scope.to_scope(var(1)),
            scope.to_scope(var(0)),
        ));
        let lam: &Term<'_> = scope.to_scope(Term::FunLit(Span::Empty, Plicity::Explicit, None, body));
        let arg = scope.to_scope(var(0));
        let result = lam.instantiate(&scope, arg);
        // The bound variable stays; the free variable 1 becomes the shifted
        // argument (index 1 under the binder).
        let expected = Term::FunLit(
            Span::Empty,
            Plicity::Explicit,
            None,
            scope.to_scope(Term::FunApp(
                Span::Empty,
                Plicity::Explicit,
                scope.to_scope(var(1)),
                scope.to_scope(var(0)),
            )),
        );
        assert!(result.alpha_eq(&expected));

        let shifted = lam.shift(&scope, 2);
        let expected = Term::FunLit(
            Span::Empty,
            Plicity::Explicit,
            None,
            scope.to_scope(Term::FunApp(
                Span::Empty,
                Plicity::Explicit,
                scope.to_scope(var(3)),
                scope.to_scope(var(0)),
            )),
        );
        assert!(shifted.alpha_eq(&expected));
    }

    #[test]
    fn alpha_eq_ignores_spans_and_names() {
        let scope = Scope::new();
        let span = Span::Range(crate::source::ByteRange::new(3, 7));
        let interner = RefCell::new(StringInterner::new());
        let name = interner.borrow_mut().get_or_intern("x");

        let lhs = Term::FunLit(
            span,
            Plicity::Explicit,
            Some(name),
            scope.to_scope(Term::LocalVar(span, Index::last())),
        );
        let rhs = Term::FunLit(
            Span::Empty,
            Plicity::Explicit,
            None,
            scope.to_scope(Term::LocalVar(Span::Empty, Index::last())),
        );
        assert!(lhs.alpha_eq(&rhs));
        assert!(!lhs.alpha_eq(&Term::Error(Span::Empty)));
    }

    #[test]
    fn alpha_eq_compares_levels_up_to_def_eq() {
        let scope = Scope::new();
        let one = ULevel::lit(&scope, 1);
        let imax_one_one = ULevel::imax(&scope, one, one);

        let lhs = Term::Sort(Span::Empty, imax_one_one);
        let rhs = Term::Sort(Span::Empty, one);
        assert!(lhs.alpha_eq(&rhs));
        assert!(!lhs.alpha_eq(&Term::Sort(Span::Empty, ULevel::Zero)));
    }
}
