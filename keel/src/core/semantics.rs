//! The operational semantics of the core language, implemented using
//! [normalisation by evaluation](https://en.wikipedia.org/wiki/Normalisation_by_evaluation).
//!
//! This evaluator belongs to the *untrusted* part of the system: the
//! elaborator uses it for conversion checking, metavariable solving, and
//! normalisation, but the kernel re-derives everything with its own reduction
//! machinery before a declaration is committed. Constants evaluate lazily to
//! stuck values; transparent definitions are only unfolded on demand through
//! [`ElimEnv::unfold_const`], and recursor applications reduce when their
//! major premise uncovers a constructor.

use std::panic::panic_any;
use std::sync::Arc;

use scoped_arena::Scope;

use crate::alloc::SliceVec;
use crate::core::global::{DeclKind, Environment};
use crate::core::universe::ULevel;
use crate::core::{LocalInfo, Literal, Name, Plicity, Term};
use crate::env::{EnvLen, Level, SharedEnv, SliceEnv};
use crate::source::{Span, StringId};

/// Atomically reference counted values. We use reference counting to increase
/// the amount of sharing we can achieve during evaluation.
pub type ArcValue<'arena> = Arc<Value<'arena>>;

/// Values in weak-head-normal form, with bindings converted to closures.
#[derive(Debug, Clone)]
pub enum Value<'arena> {
    /// A value whose computation has been blocked as a result of trying to
    /// [evaluate][EvalEnv::eval] an open [term][Term], along with a spine of
    /// eliminations. Subsequent eliminations applied to this value are
    /// accumulated in the spine.
    Stuck(Head<'arena>, Vec<Elim<'arena>>),
    /// Universe sorts.
    Sort(ULevel<'arena>),
    /// Dependent function types.
    FunType(Plicity, Option<StringId>, ArcValue<'arena>, Closure<'arena>),
    /// Function literals.
    FunLit(Plicity, Option<StringId>, Closure<'arena>),
    /// Record types.
    RecordType(&'arena [StringId], Telescope<'arena>),
    /// Record literals.
    RecordLit(&'arena [StringId], Vec<ArcValue<'arena>>),
    /// Literals.
    Lit(Literal),
}

impl<'arena> Value<'arena> {
    pub fn local_var(var: Level) -> Value<'arena> {
        Value::Stuck(Head::LocalVar(var), Vec::new())
    }

    pub fn meta_var(var: Level) -> Value<'arena> {
        Value::Stuck(Head::MetaVar(var), Vec::new())
    }

    pub fn r#const(name: Name, levels: &'arena [ULevel<'arena>]) -> Value<'arena> {
        Value::Stuck(Head::Const(name, levels), Vec::new())
    }

    /// The value of a subterm that failed to elaborate. It absorbs
    /// eliminations and converts with everything, preventing cascading
    /// diagnostics.
    pub fn error() -> Value<'arena> {
        Value::Stuck(Head::Error, Vec::new())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Stuck(Head::Error, _))
    }

    /// The constant heading the value, if it is a stuck constant application.
    pub fn match_const_spine(&self) -> Option<(Name, &[Elim<'arena>])> {
        match self {
            Value::Stuck(Head::Const(name, _), spine) => Some((*name, &spine[..])),
            _ => None,
        }
    }
}

/// The head of a [stuck value][Value::Stuck].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head<'arena> {
    /// The error sentinel.
    Error,
    /// Variables that refer to local binders.
    LocalVar(Level),
    /// Variables that refer to unsolved metavariables.
    MetaVar(Level),
    /// References to declarations in the environment.
    Const(Name, &'arena [ULevel<'arena>]),
}

/// A pending elimination to be reduced if the [head][Head] of a [stuck
/// value][Value::Stuck] becomes known.
#[derive(Debug, Clone)]
pub enum Elim<'arena> {
    /// Function applications.
    FunApp(Plicity, ArcValue<'arena>),
    /// Record projections.
    RecordProj(StringId),
}

/// A closure is a term that can later be instantiated with a value.
#[derive(Debug, Clone)]
pub struct Closure<'arena> {
    /// Local environment where the closed [term][Self::term] is bound. A new
    /// entry will need to be pushed to this environment before evaluating the
    /// term.
    local_exprs: SharedEnv<ArcValue<'arena>>,
    /// The term that is closed over.
    term: &'arena Term<'arena>,
}

impl<'arena> Closure<'arena> {
    pub fn new(
        local_exprs: SharedEnv<ArcValue<'arena>>,
        term: &'arena Term<'arena>,
    ) -> Closure<'arena> {
        Closure { local_exprs, term }
    }
}

/// A series of terms where each term might depend on previous terms.
///
/// The term ‘telescope’ was [coined by de Bruijn] to allude to how each
/// variable scopes over subsequent variables in a nested fashion, like how
/// the segments of an “old-fashioned” expandable telescope slide into each
/// other.
///
/// [coined by de Bruijn]: https://doi.org/10.1016/0890-5401(91)90066-B
#[derive(Debug, Clone)]
pub struct Telescope<'arena> {
    /// Local environment where the telescope's [terms][Self::terms] are bound.
    local_exprs: SharedEnv<ArcValue<'arena>>,
    /// The terms in the telescope.
    terms: &'arena [Term<'arena>],
}

impl<'arena> Telescope<'arena> {
    pub fn new(
        local_exprs: SharedEnv<ArcValue<'arena>>,
        terms: &'arena [Term<'arena>],
    ) -> Telescope<'arena> {
        Telescope { local_exprs, terms }
    }

    /// The number of terms in the telescope.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Errors encountered while interpreting terms. These are invariant
/// violations in the elaborator, not user errors, so they abort via panic
/// and are reported as internal bugs.
#[derive(Clone, Debug)]
pub enum Error {
    InvalidLocalVar,
    InvalidMetaVar,
    InvalidFunctionApp,
    InvalidRecordProj,
}

impl Error {
    pub fn description(&self) -> &str {
        match &self {
            Error::InvalidLocalVar => "invalid local variable",
            Error::InvalidMetaVar => "invalid metavariable",
            Error::InvalidFunctionApp => "invalid function application",
            Error::InvalidRecordProj => "invalid record projection",
        }
    }
}

/// Evaluation environment.
///
/// Like the [`ElimEnv`], this allows for the running of computations, but
/// also maintains a local environment, allowing for evaluation.
pub struct EvalEnv<'arena, 'env> {
    elim_env: ElimEnv<'arena, 'env>,
    local_exprs: &'env mut SharedEnv<ArcValue<'arena>>,
}

impl<'arena, 'env> EvalEnv<'arena, 'env> {
    pub fn new(
        elim_env: ElimEnv<'arena, 'env>,
        local_exprs: &'env mut SharedEnv<ArcValue<'arena>>,
    ) -> EvalEnv<'arena, 'env> {
        EvalEnv {
            elim_env,
            local_exprs,
        }
    }

    fn elim_env(&self) -> ElimEnv<'arena, 'env> {
        self.elim_env
    }

    /// Fully normalise a term by first [evaluating][EvalEnv::eval] it into a
    /// [value][Value], then [quoting it back][QuoteEnv::quote] into a
    /// [term][Term].
    pub fn normalise(&mut self, term: &Term<'arena>) -> Term<'arena> {
        let value = self.eval(term);
        QuoteEnv::new(self.elim_env, self.local_exprs.len()).quote(&value)
    }

    /// Evaluate a [term][Term] into a [value][Value].
    pub fn eval(&mut self, term: &Term<'arena>) -> ArcValue<'arena> {
        match term {
            Term::LocalVar(_, var) => match self.local_exprs.get_index(*var) {
                Some(value) => value.clone(),
                None => panic_any(Error::InvalidLocalVar),
            },
            Term::Const(_, name, levels) => Arc::new(Value::r#const(*name, levels)),
            Term::MetaVar(_, var) => match self.elim_env.meta_exprs.get_level(*var) {
                Some(Some(value)) => value.clone(),
                Some(None) => Arc::new(Value::meta_var(*var)),
                None => panic_any(Error::InvalidMetaVar),
            },
            Term::InsertedMeta(span, var, local_infos) => {
                let head_expr = self.eval(&Term::MetaVar(*span, *var));
                self.apply_local_infos(head_expr, local_infos)
            }
            Term::Sort(_, level) => Arc::new(Value::Sort(*level)),
            Term::Ann(_, expr, _) => self.eval(expr),
            Term::Let(_, _, _, def_expr, body_expr) => {
                let def_expr = self.eval(def_expr);
                self.local_exprs.push(def_expr);
                let body_expr = self.eval(body_expr);
                self.local_exprs.pop();
                body_expr
            }
            Term::FunType(_, plicity, name, dom, cod) => Arc::new(Value::FunType(
                *plicity,
                *name,
                self.eval(dom),
                Closure::new(self.local_exprs.clone(), cod),
            )),
            Term::FunLit(_, plicity, name, body) => Arc::new(Value::FunLit(
                *plicity,
                *name,
                Closure::new(self.local_exprs.clone(), body),
            )),
            Term::FunApp(_, plicity, fun, arg) => {
                let fun = self.eval(fun);
                let arg = self.eval(arg);
                self.elim_env().fun_app(fun, *plicity, arg)
            }
            Term::RecordType(_, labels, types) => Arc::new(Value::RecordType(
                labels,
                Telescope::new(self.local_exprs.clone(), types),
            )),
            Term::RecordLit(_, labels, exprs) => Arc::new(Value::RecordLit(
                labels,
                exprs.iter().map(|expr| self.eval(expr)).collect(),
            )),
            Term::RecordProj(_, head, label) => {
                let head = self.eval(head);
                self.elim_env().record_proj(head, *label)
            }
            Term::Lit(_, lit) => Arc::new(Value::Lit(*lit)),
            Term::Error(_) => Arc::new(Value::error()),
        }
    }

    /// Apply a metavariable to the parameters of the local context it was
    /// inserted in, skipping definitions.
    fn apply_local_infos(
        &mut self,
        mut head_expr: ArcValue<'arena>,
        local_infos: &[LocalInfo],
    ) -> ArcValue<'arena> {
        for (info, expr) in Iterator::zip(local_infos.iter(), self.local_exprs.iter()) {
            head_expr = match info {
                LocalInfo::Def => head_expr,
                LocalInfo::Param => {
                    self.elim_env
                        .fun_app(head_expr, Plicity::Explicit, expr.clone())
                }
            };
        }
        head_expr
    }
}

/// Elimination environment.
///
/// Contains enough state to run computations, but does not contain a local
/// environment that would be needed for full evaluation.
#[derive(Copy, Clone)]
pub struct ElimEnv<'arena, 'env> {
    scope: &'arena Scope<'arena>,
    env: &'env Environment<'arena>,
    meta_exprs: &'env SliceEnv<Option<ArcValue<'arena>>>,
}

impl<'arena, 'env> ElimEnv<'arena, 'env> {
    pub fn new(
        scope: &'arena Scope<'arena>,
        env: &'env Environment<'arena>,
        meta_exprs: &'env SliceEnv<Option<ArcValue<'arena>>>,
    ) -> ElimEnv<'arena, 'env> {
        ElimEnv {
            scope,
            env,
            meta_exprs,
        }
    }

    pub fn eval_env(
        self,
        local_exprs: &'env mut SharedEnv<ArcValue<'arena>>,
    ) -> EvalEnv<'arena, 'env> {
        EvalEnv::new(self, local_exprs)
    }

    /// Bring a value up-to-date with any new metavariable solutions that
    /// might now be present at the head of the given value.
    pub fn force(&self, value: &ArcValue<'arena>) -> ArcValue<'arena> {
        let mut forced_value = value.clone();
        // Attempt to force metavariables until we don't see any more.
        while let Value::Stuck(Head::MetaVar(var), spine) = forced_value.as_ref() {
            match self.meta_exprs.get_level(*var) {
                // Apply the spine to the solution. This might uncover
                // another metavariable so we'll continue looping.
                Some(Some(expr)) => forced_value = self.apply_spine(expr.clone(), spine),
                // There's no solution for this metavariable yet, meaning
                // that we've forced the value as much as possible for now.
                Some(None) => break,
                None => panic_any(Error::InvalidMetaVar),
            }
        }
        forced_value
    }

    /// Unfold a stuck transparent constant at the head of a value, applying
    /// its spine to the unfolded body. Returns `None` when the head is not a
    /// constant that can be unfolded.
    pub fn unfold_const(&self, value: &ArcValue<'arena>) -> Option<ArcValue<'arena>> {
        match value.as_ref() {
            Value::Stuck(Head::Const(name, levels), spine) => {
                let body = self.env.get(*name)?.unfoldable_body()?;
                let body = body.instantiate_levels(self.scope, levels);
                let mut local_exprs = SharedEnv::new();
                let body = self.eval_env(&mut local_exprs).eval(body);
                Some(self.apply_spine(body, spine))
            }
            _ => None,
        }
    }

    /// Apply a closure to a value.
    pub fn apply_closure(
        &self,
        closure: &Closure<'arena>,
        value: ArcValue<'arena>,
    ) -> ArcValue<'arena> {
        let mut local_exprs = closure.local_exprs.clone();
        local_exprs.push(value);
        EvalEnv::new(*self, &mut local_exprs).eval(closure.term)
    }

    /// Split a telescope into the first value, and a continuation that
    /// returns a telescope containing the rest of the values.
    pub fn split_telescope(
        &self,
        mut telescope: Telescope<'arena>,
    ) -> Option<(
        ArcValue<'arena>,
        impl FnOnce(ArcValue<'arena>) -> Telescope<'arena>,
    )> {
        let (term, terms) = telescope.terms.split_first()?;
        let value = EvalEnv::new(*self, &mut telescope.local_exprs).eval(term);

        Some((value, move |previous_value| {
            telescope.local_exprs.push(previous_value);
            telescope.terms = terms;
            telescope
        }))
    }

    /// Apply a function elimination to an expression, performing
    /// beta-reduction if possible.
    pub fn fun_app(
        &self,
        mut head_expr: ArcValue<'arena>,
        plicity: Plicity,
        arg: ArcValue<'arena>,
    ) -> ArcValue<'arena> {
        match Arc::make_mut(&mut head_expr) {
            // Beta-reduction
            Value::FunLit(_, _, body) => self.apply_closure(body, arg),
            // The computation is stuck, preventing further reduction
            Value::Stuck(head, spine) => {
                spine.push(Elim::FunApp(plicity, arg));
                let recursor = matches!(head, Head::Const(..));
                match recursor {
                    true => self.try_iota(&head_expr).unwrap_or(head_expr),
                    false => head_expr,
                }
            }
            _ => panic_any(Error::InvalidFunctionApp),
        }
    }

    /// Apply a record projection to an expression, performing beta-reduction
    /// if possible.
    pub fn record_proj(
        &self,
        mut head_expr: ArcValue<'arena>,
        label: StringId,
    ) -> ArcValue<'arena> {
        match Arc::make_mut(&mut head_expr) {
            // Beta-reduction
            Value::RecordLit(labels, exprs) => (labels.iter())
                .position(|current_label| *current_label == label)
                .and_then(|expr_index| exprs.get(expr_index).cloned())
                .unwrap_or_else(|| panic_any(Error::InvalidRecordProj)),
            // The computation is stuck, preventing further reduction
            Value::Stuck(_, spine) => {
                spine.push(Elim::RecordProj(label));
                head_expr
            }
            _ => panic_any(Error::InvalidRecordProj),
        }
    }

    /// Iota-reduction: reduce a saturated recursor application whose major
    /// premise is headed by a constructor.
    fn try_iota(&self, head_expr: &ArcValue<'arena>) -> Option<ArcValue<'arena>> {
        let (name, levels, spine) = match head_expr.as_ref() {
            Value::Stuck(Head::Const(name, levels), spine) => (*name, *levels, spine),
            _ => return None,
        };
        let decl = self.env.get(name)?;
        let (num_minors, rules) = match &decl.kind {
            DeclKind::Recursor {
                num_minors, rules, ..
            } => (*num_minors, rules),
            _ => return None,
        };

        let mut args = Vec::with_capacity(spine.len());
        for elim in spine {
            match elim {
                Elim::FunApp(_, arg) => args.push(arg),
                Elim::RecordProj(_) => return None,
            }
        }
        if args.len() < num_minors + 2 {
            return None;
        }

        // rec C m₁ … mₖ major rest…
        let major = self.force(args[num_minors + 1]);
        let (ctor, ctor_spine) = major.match_const_spine()?;
        let rule = rules.iter().find(|rule| rule.ctor == ctor)?;
        let mut fields = Vec::with_capacity(rule.num_fields);
        for elim in ctor_spine {
            match elim {
                Elim::FunApp(_, arg) => fields.push(arg.clone()),
                Elim::RecordProj(_) => return None,
            }
        }
        if fields.len() != rule.num_fields {
            return None;
        }

        let rhs = rule.rhs.instantiate_levels(self.scope, levels);
        let mut local_exprs = SharedEnv::new();
        let mut value = self.eval_env(&mut local_exprs).eval(rhs);
        for arg in &args[..num_minors + 1] {
            value = self.fun_app(value, Plicity::Explicit, (*arg).clone());
        }
        for field in fields {
            value = self.fun_app(value, Plicity::Explicit, field);
        }
        for arg in &args[num_minors + 2..] {
            value = self.fun_app(value, Plicity::Explicit, (*arg).clone());
        }
        Some(value)
    }

    /// Apply an expression to an elimination spine.
    pub fn apply_spine(
        &self,
        head_expr: ArcValue<'arena>,
        spine: &[Elim<'arena>],
    ) -> ArcValue<'arena> {
        spine.iter().fold(head_expr, |head_expr, elim| match elim {
            Elim::FunApp(plicity, arg) => self.fun_app(head_expr, *plicity, arg.clone()),
            Elim::RecordProj(label) => self.record_proj(head_expr, *label),
        })
    }

    /// Force the value and unfold constants at its head until it no longer
    /// changes. Used when the caller needs to see through transparent
    /// definitions, for example when looking up coercions by head constant.
    pub fn force_and_unfold(&self, value: &ArcValue<'arena>) -> ArcValue<'arena> {
        let mut value = self.force(value);
        while let Some(unfolded) = self.unfold_const(&value) {
            value = self.force(&unfolded);
        }
        value
    }
}

/// Quotation environment.
///
/// This environment keeps track of the length of the local environment,
/// allowing for quotation back into the term syntax.
pub struct QuoteEnv<'arena, 'env> {
    elim_env: ElimEnv<'arena, 'env>,
    local_exprs: EnvLen,
}

impl<'arena, 'env> QuoteEnv<'arena, 'env> {
    pub fn new(elim_env: ElimEnv<'arena, 'env>, local_exprs: EnvLen) -> QuoteEnv<'arena, 'env> {
        QuoteEnv {
            elim_env,
            local_exprs,
        }
    }

    fn scope(&self) -> &'arena Scope<'arena> {
        self.elim_env.scope
    }

    fn push_local(&mut self) {
        self.local_exprs.push();
    }

    fn pop_local(&mut self) {
        self.local_exprs.pop();
    }

    /// Quote a [value][Value] back into a [term][Term].
    pub fn quote(&mut self, value: &ArcValue<'arena>) -> Term<'arena> {
        let scope = self.scope();
        let value = self.elim_env.force(value);
        match value.as_ref() {
            Value::Stuck(head, spine) => {
                let head_expr = match head {
                    Head::Error => Term::Error(Span::Empty),
                    Head::LocalVar(var) => match self.local_exprs.level_to_index(*var) {
                        Some(var) => Term::LocalVar(Span::Empty, var),
                        None => panic_any(Error::InvalidLocalVar),
                    },
                    Head::MetaVar(var) => Term::MetaVar(Span::Empty, *var),
                    Head::Const(name, levels) => Term::Const(Span::Empty, *name, levels),
                };

                spine.iter().fold(head_expr, |head_expr, elim| match elim {
                    Elim::FunApp(plicity, arg) => Term::FunApp(
                        Span::Empty,
                        *plicity,
                        scope.to_scope(head_expr),
                        scope.to_scope(self.quote(arg)),
                    ),
                    Elim::RecordProj(label) => {
                        Term::RecordProj(Span::Empty, scope.to_scope(head_expr), *label)
                    }
                })
            }
            Value::Sort(level) => Term::Sort(Span::Empty, *level),
            Value::FunType(plicity, name, dom, cod) => {
                let dom = self.quote(dom);
                let cod = self.quote_closure(cod);
                Term::FunType(
                    Span::Empty,
                    *plicity,
                    *name,
                    scope.to_scope(dom),
                    scope.to_scope(cod),
                )
            }
            Value::FunLit(plicity, name, body) => {
                let body = self.quote_closure(body);
                Term::FunLit(Span::Empty, *plicity, *name, scope.to_scope(body))
            }
            Value::RecordType(labels, types) => {
                Term::RecordType(Span::Empty, labels, self.quote_telescope(types))
            }
            Value::RecordLit(labels, exprs) => Term::RecordLit(
                Span::Empty,
                labels,
                scope.to_scope_from_iter(exprs.iter().map(|expr| self.quote(expr))),
            ),
            Value::Lit(lit) => Term::Lit(Span::Empty, *lit),
        }
    }

    /// Quote a [closure][Closure] back into a [term][Term].
    fn quote_closure(&mut self, closure: &Closure<'arena>) -> Term<'arena> {
        let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
        let value = self.elim_env.apply_closure(closure, var);

        self.push_local();
        let term = self.quote(&value);
        self.pop_local();

        term
    }

    /// Quote a [telescope][Telescope] back into a slice of [terms][Term].
    fn quote_telescope(&mut self, telescope: &Telescope<'arena>) -> &'arena [Term<'arena>] {
        let initial_local_len = self.local_exprs;
        let mut telescope = telescope.clone();
        let mut terms = SliceVec::new(self.scope(), telescope.len());

        while let Some((value, next_telescope)) = self.elim_env.split_telescope(telescope) {
            let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
            telescope = next_telescope(var);
            terms.push(self.quote(&value));
            self.local_exprs.push();
        }

        self.local_exprs.truncate(initial_local_len);
        terms.into()
    }
}

/// Conversion environment.
///
/// This environment keeps track of the length of the local environment, for
/// use in conversion checking.
pub struct ConversionEnv<'arena, 'env> {
    elim_env: ElimEnv<'arena, 'env>,
    local_exprs: EnvLen,
}

impl<'arena, 'env> ConversionEnv<'arena, 'env> {
    pub fn new(
        elim_env: ElimEnv<'arena, 'env>,
        local_exprs: EnvLen,
    ) -> ConversionEnv<'arena, 'env> {
        ConversionEnv {
            elim_env,
            local_exprs,
        }
    }

    fn push_local(&mut self) {
        self.local_exprs.push();
    }

    fn pop_local(&mut self) {
        self.local_exprs.pop();
    }

    /// Check that one value is computationally equal to another value.
    ///
    /// This is sometimes referred to as 'conversion checking', or checking
    /// for 'definitional equality'. Eta-conversion is performed for functions
    /// and records; on a structural mismatch, transparent constants at either
    /// head are unfolded and the comparison retried.
    pub fn is_equal(&mut self, value0: &ArcValue<'arena>, value1: &ArcValue<'arena>) -> bool {
        let value0 = self.elim_env.force(value0);
        let value1 = self.elim_env.force(value1);

        if self.is_equal_whnf(&value0, &value1) {
            return true;
        }
        match self.elim_env.unfold_const(&value0) {
            Some(value0) => self.is_equal(&value0, &value1),
            None => match self.elim_env.unfold_const(&value1) {
                Some(value1) => self.is_equal(&value0, &value1),
                None => false,
            },
        }
    }

    fn is_equal_whnf(&mut self, value0: &ArcValue<'arena>, value1: &ArcValue<'arena>) -> bool {
        match (value0.as_ref(), value1.as_ref()) {
            // Error sentinels result from errors that have already been
            // reported, so we prevent them from triggering more errors.
            (Value::Stuck(Head::Error, _), _) | (_, Value::Stuck(Head::Error, _)) => true,

            (Value::Stuck(head0, spine0), Value::Stuck(head1, spine1)) => {
                self.is_equal_heads(head0, head1)
                    && spine0.len() == spine1.len()
                    && Iterator::zip(spine0.iter(), spine1.iter()).all(|(elim0, elim1)| {
                        match (elim0, elim1) {
                            (Elim::FunApp(_, arg0), Elim::FunApp(_, arg1)) => {
                                self.is_equal(arg0, arg1)
                            }
                            (Elim::RecordProj(label0), Elim::RecordProj(label1)) => {
                                label0 == label1
                            }
                            (_, _) => false,
                        }
                    })
            }
            (Value::Sort(level0), Value::Sort(level1)) => level0.is_def_eq(level1),

            (
                Value::FunType(plicity0, _, dom0, cod0),
                Value::FunType(plicity1, _, dom1, cod1),
            ) => {
                plicity0 == plicity1
                    && self.is_equal(dom0, dom1)
                    && self.is_equal_closures(cod0, cod1)
            }

            (Value::FunLit(_, _, body0), Value::FunLit(_, _, body1)) => {
                self.is_equal_closures(body0, body1)
            }
            // Eta-conversion
            (Value::FunLit(plicity, _, body), _) => {
                self.is_equal_fun_lit(*plicity, body, value1)
            }
            (_, Value::FunLit(plicity, _, body)) => {
                self.is_equal_fun_lit(*plicity, body, value0)
            }

            (Value::RecordType(labels0, types0), Value::RecordType(labels1, types1)) => {
                labels0 == labels1 && self.is_equal_telescopes(types0, types1)
            }

            (Value::RecordLit(labels0, exprs0), Value::RecordLit(labels1, exprs1)) => {
                labels0 == labels1
                    && Iterator::zip(exprs0.iter(), exprs1.iter())
                        .all(|(expr0, expr1)| self.is_equal(expr0, expr1))
            }
            // Eta-conversion
            (Value::RecordLit(labels, exprs), _) => {
                self.is_equal_record_lit(labels, exprs, value1)
            }
            (_, Value::RecordLit(labels, exprs)) => {
                self.is_equal_record_lit(labels, exprs, value0)
            }

            (Value::Lit(lit0), Value::Lit(lit1)) => lit0 == lit1,

            (_, _) => false,
        }
    }

    fn is_equal_heads(&self, head0: &Head<'arena>, head1: &Head<'arena>) -> bool {
        match (head0, head1) {
            (Head::LocalVar(var0), Head::LocalVar(var1)) => var0 == var1,
            (Head::MetaVar(var0), Head::MetaVar(var1)) => var0 == var1,
            (Head::Const(name0, levels0), Head::Const(name1, levels1)) => {
                name0 == name1 && ULevel::all_def_eq(levels0, levels1)
            }
            (_, _) => false,
        }
    }

    /// Check that two [closures][Closure] are equal.
    pub fn is_equal_closures(&mut self, closure0: &Closure<'arena>, closure1: &Closure<'arena>) -> bool {
        let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
        let value0 = self.elim_env.apply_closure(closure0, var.clone());
        let value1 = self.elim_env.apply_closure(closure1, var);

        self.push_local();
        let result = self.is_equal(&value0, &value1);
        self.pop_local();

        result
    }

    /// Check that two [telescopes][Telescope] are equal.
    pub fn is_equal_telescopes(
        &mut self,
        telescope0: &Telescope<'arena>,
        telescope1: &Telescope<'arena>,
    ) -> bool {
        if telescope0.len() != telescope1.len() {
            return false;
        }

        let initial_local_len = self.local_exprs;
        let mut telescope0 = telescope0.clone();
        let mut telescope1 = telescope1.clone();

        while let Some(((value0, next_telescope0), (value1, next_telescope1))) = Option::zip(
            self.elim_env.split_telescope(telescope0),
            self.elim_env.split_telescope(telescope1),
        ) {
            if !self.is_equal(&value0, &value1) {
                self.local_exprs.truncate(initial_local_len);
                return false;
            }

            let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
            telescope0 = next_telescope0(var.clone());
            telescope1 = next_telescope1(var);
            self.local_exprs.push();
        }

        self.local_exprs.truncate(initial_local_len);
        true
    }

    /// Check that a function literal is equal to a value, using
    /// eta-conversion.
    fn is_equal_fun_lit(
        &mut self,
        plicity: Plicity,
        body: &Closure<'arena>,
        value: &ArcValue<'arena>,
    ) -> bool {
        let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
        let value = self.elim_env.fun_app(value.clone(), plicity, var.clone());
        let body = self.elim_env.apply_closure(body, var);

        self.push_local();
        let result = self.is_equal(&body, &value);
        self.pop_local();

        result
    }

    /// Check that a record literal is equal to a value, using eta-conversion.
    fn is_equal_record_lit(
        &mut self,
        labels: &[StringId],
        exprs: &[ArcValue<'arena>],
        value: &ArcValue<'arena>,
    ) -> bool {
        Iterator::zip(labels.iter(), exprs.iter()).all(|(label, expr)| {
            let field_value = self.elim_env.record_proj(value.clone(), *label);
            self.is_equal(expr, &field_value)
        })
    }
}
