//! [Unification] is a process of checking if two [values][Value] are the same,
//! where there might be 'unknown' parts in either value. During this process
//! we attempt to fill in those missing bits of information, and record the
//! solutions we find for future use.
//!
//! We implement a limited form of higher order unification, called 'higher-
//! order pattern unification', which was first described by Dale Miller
//! in ["A Logic Programming Language with Lambda-Abstraction, Function
//! Variables, and Simple Unification”][dale-miller-1991]. More details about
//! the algorithm we use can be found in the [elaboration-zoo], in particular
//! in [elaboration-zoo/03-holes].
//!
//! [Unification]: https://en.wikipedia.org/wiki/Unification_(computer_science)
//! [dale-miller-1991]: https://doi.org/10.1093/logcom/1.4.497
//! [elaboration-zoo]: https://github.com/AndrasKovacs/elaboration-zoo/
//! [elaboration-zoo/03-holes]: https://github.com/AndrasKovacs/elaboration-zoo/tree/master/03-holes

use std::sync::Arc;

use scoped_arena::Scope;

use crate::alloc::SliceVec;
use crate::core::global::Environment;
use crate::core::semantics::{ArcValue, Closure, Elim, ElimEnv, Head, Telescope, Value};
use crate::core::universe::ULevel;
use crate::core::{Plicity, Term};
use crate::env::{EnvLen, Index, Level, SharedEnv, SliceEnv, UniqueEnv};
use crate::source::{Span, StringId};

/// Errors encountered during unification.
#[derive(Debug, Clone)]
pub enum Error {
    /// A known part of one value failed to match with a known part of the
    /// other value that we are comparing against.
    Mismatch,
    /// An error that was found in the problem spine.
    Spine(SpineError),
    /// An error that occurred when renaming the solution.
    Rename(RenameError),
}

impl From<SpineError> for Error {
    fn from(error: SpineError) -> Error {
        Error::Spine(error)
    }
}

impl From<RenameError> for Error {
    fn from(error: RenameError) -> Error {
        Error::Rename(error)
    }
}

/// An error that was found in the problem spine.
#[derive(Debug, Clone)]
pub enum SpineError {
    /// A local variable appeared multiple times in the spine of the
    /// metavariable being solved.
    ///
    /// For example:
    ///
    /// ```text
    /// ?α x x =? x`
    /// ```
    ///
    /// This results in two distinct solutions:
    ///
    /// - `?α := fun x _ => x`
    /// - `?α := fun _ x => x`
    ///
    /// We only want unification to result in a unique solution, so we fail
    /// to unify in this case.
    NonLinearSpine(Level),
    /// A metavariable or constant was found in the problem spine. Only
    /// spines of distinct local variables fall in the pattern fragment.
    NonRigidFunApp,
    /// A record projection was found in the problem spine.
    RecordProj(StringId),
}

/// An error that occurred when renaming the solution.
#[derive(Debug, Clone)]
pub enum RenameError {
    /// A free local variable in the compared value does not occur in the
    /// spine of the metavariable being solved.
    ///
    /// For example, where `z : U` is a local variable:
    ///
    /// ```text
    /// ?α x y =? z -> z
    /// ```
    ///
    /// There is no solution for this metavariable because it can only
    /// abstract over `x` and `y`, but these don't occur in `z -> z`.
    EscapingLocalVar(Level),
    /// The metavariable being solved occurs in the value being compared
    /// against, so a solution would be infinitely large. This is sometimes
    /// referred to as an 'occurs check' failure.
    InfiniteSolution,
}

/// Unification context.
pub struct Context<'arena, 'env> {
    /// Scoped arena for storing [renamed][Context::rename] terms.
    scope: &'arena Scope<'arena>,
    /// A renaming that is used when solving metavariables using pattern
    /// unification. We store it in the parent context, re-initialising it on
    /// each call to [`Context::solve`] in order to reuse previous allocations.
    renaming: &'env mut PartialRenaming,
    /// The declaration environment, for unfolding constants.
    env: &'env Environment<'arena>,
    /// The length of the local environment.
    local_exprs: EnvLen,
    /// Solutions for metavariables.
    meta_exprs: &'env mut SliceEnv<Option<ArcValue<'arena>>>,
}

impl<'arena, 'env> Context<'arena, 'env> {
    pub fn new(
        scope: &'arena Scope<'arena>,
        renaming: &'env mut PartialRenaming,
        env: &'env Environment<'arena>,
        local_exprs: EnvLen,
        meta_exprs: &'env mut SliceEnv<Option<ArcValue<'arena>>>,
    ) -> Context<'arena, 'env> {
        Context {
            scope,
            renaming,
            env,
            local_exprs,
            meta_exprs,
        }
    }

    fn elim_env(&self) -> ElimEnv<'arena, '_> {
        ElimEnv::new(self.scope, self.env, self.meta_exprs)
    }

    /// Unify two values, updating the solution environment if necessary.
    pub fn unify(
        &mut self,
        value0: &ArcValue<'arena>,
        value1: &ArcValue<'arena>,
    ) -> Result<(), Error> {
        // Check for pointer equality before trying to force the values.
        if Arc::ptr_eq(value0, value1) {
            return Ok(());
        }

        let value0 = self.elim_env().force(value0);
        let value1 = self.elim_env().force(value1);

        match (value0.as_ref(), value1.as_ref()) {
            // Error values result from problems that have already been
            // reported, so we prevent them from triggering more errors.
            (Value::Stuck(Head::Error, _), _) | (_, Value::Stuck(Head::Error, _)) => Ok(()),

            // Both values have the same metavariable at their head, so all
            // we need to do is unify the elimination spines.
            (
                Value::Stuck(Head::MetaVar(var0), spine0),
                Value::Stuck(Head::MetaVar(var1), spine1),
            ) if var0 == var1 => self.unify_spines(spine0, spine1),

            // One of the values has a metavariable at its head, so we
            // attempt to solve it using pattern unification.
            (Value::Stuck(Head::MetaVar(var0), spine0), _) => self.solve(*var0, spine0, &value1),
            (_, Value::Stuck(Head::MetaVar(var1), spine1)) => self.solve(*var1, spine1, &value0),

            (
                Value::Stuck(Head::LocalVar(var0), spine0),
                Value::Stuck(Head::LocalVar(var1), spine1),
            ) if var0 == var1 => self.unify_spines(spine0, spine1),

            (
                Value::Stuck(Head::Const(name0, levels0), spine0),
                Value::Stuck(Head::Const(name1, levels1), spine1),
            ) if name0 == name1 && ULevel::all_def_eq(levels0, levels1) => {
                // Same head, but the spines may still agree only after
                // unfolding the constant.
                match self.unify_spines(spine0, spine1) {
                    Ok(()) => Ok(()),
                    Err(error) => self.unify_unfold(&value0, &value1, error),
                }
            }

            (Value::Sort(level0), Value::Sort(level1)) => match level0.is_def_eq(level1) {
                true => Ok(()),
                false => Err(Error::Mismatch),
            },

            (
                Value::FunType(plicity0, _, dom0, cod0),
                Value::FunType(plicity1, _, dom1, cod1),
            ) if plicity0 == plicity1 => {
                self.unify(dom0, dom1)?;
                self.unify_closures(cod0, cod1)
            }

            (Value::FunLit(_, _, body0), Value::FunLit(_, _, body1)) => {
                self.unify_closures(body0, body1)
            }
            (Value::FunLit(plicity, _, body), _) => self.unify_fun_lit(*plicity, body, &value1),
            (_, Value::FunLit(plicity, _, body)) => self.unify_fun_lit(*plicity, body, &value0),

            (Value::RecordType(labels0, types0), Value::RecordType(labels1, types1)) => {
                if labels0 != labels1 {
                    return Err(Error::Mismatch);
                }
                self.unify_telescopes(types0, types1)
            }
            (Value::RecordLit(labels0, exprs0), Value::RecordLit(labels1, exprs1)) => {
                if labels0 != labels1 {
                    return Err(Error::Mismatch);
                }
                for (expr0, expr1) in Iterator::zip(exprs0.iter(), exprs1.iter()) {
                    self.unify(expr0, expr1)?;
                }
                Ok(())
            }
            (Value::RecordLit(labels, exprs), _) => self.unify_record_lit(labels, exprs, &value1),
            (_, Value::RecordLit(labels, exprs)) => self.unify_record_lit(labels, exprs, &value0),

            (Value::Lit(lit0), Value::Lit(lit1)) if lit0 == lit1 => Ok(()),

            // A constant at the head of either side might still unfold to
            // something that matches the other side.
            (Value::Stuck(Head::Const(..), _), _) | (_, Value::Stuck(Head::Const(..), _)) => {
                self.unify_unfold(&value0, &value1, Error::Mismatch)
            }

            (_, _) => Err(Error::Mismatch),
        }
    }

    /// Unfold a constant at the head of either value and retry, reporting
    /// the original error if neither side unfolds.
    fn unify_unfold(
        &mut self,
        value0: &ArcValue<'arena>,
        value1: &ArcValue<'arena>,
        error: Error,
    ) -> Result<(), Error> {
        if let Some(value0) = self.elim_env().unfold_const(value0) {
            return self.unify(&value0, value1);
        }
        if let Some(value1) = self.elim_env().unfold_const(value1) {
            return self.unify(value0, &value1);
        }
        Err(error)
    }

    /// Unify two elimination spines.
    fn unify_spines(
        &mut self,
        spine0: &[Elim<'arena>],
        spine1: &[Elim<'arena>],
    ) -> Result<(), Error> {
        if spine0.len() != spine1.len() {
            return Err(Error::Mismatch);
        }
        for (elim0, elim1) in Iterator::zip(spine0.iter(), spine1.iter()) {
            match (elim0, elim1) {
                (Elim::FunApp(_, arg0), Elim::FunApp(_, arg1)) => self.unify(arg0, arg1)?,
                (Elim::RecordProj(label0), Elim::RecordProj(label1)) if label0 == label1 => {}
                (_, _) => return Err(Error::Mismatch),
            }
        }
        Ok(())
    }

    /// Unify two [closures][Closure].
    fn unify_closures(
        &mut self,
        closure0: &Closure<'arena>,
        closure1: &Closure<'arena>,
    ) -> Result<(), Error> {
        let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
        let value0 = self.elim_env().apply_closure(closure0, var.clone());
        let value1 = self.elim_env().apply_closure(closure1, var);

        self.local_exprs.push();
        let result = self.unify(&value0, &value1);
        self.local_exprs.pop();

        result
    }

    /// Unify two [telescopes][Telescope].
    fn unify_telescopes(
        &mut self,
        telescope0: &Telescope<'arena>,
        telescope1: &Telescope<'arena>,
    ) -> Result<(), Error> {
        if telescope0.len() != telescope1.len() {
            return Err(Error::Mismatch);
        }

        let initial_local_len = self.local_exprs;
        let mut telescope0 = telescope0.clone();
        let mut telescope1 = telescope1.clone();

        while let Some(((value0, next_telescope0), (value1, next_telescope1))) = Option::zip(
            self.elim_env().split_telescope(telescope0),
            self.elim_env().split_telescope(telescope1),
        ) {
            if let Err(error) = self.unify(&value0, &value1) {
                self.local_exprs.truncate(initial_local_len);
                return Err(error);
            }

            let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
            telescope0 = next_telescope0(var.clone());
            telescope1 = next_telescope1(var);
            self.local_exprs.push();
        }

        self.local_exprs.truncate(initial_local_len);
        Ok(())
    }

    /// Unify a function literal with a value, using eta-conversion.
    ///
    /// ```text
    /// (fun x => f x) = f
    /// ```
    fn unify_fun_lit(
        &mut self,
        plicity: Plicity,
        body: &Closure<'arena>,
        value: &ArcValue<'arena>,
    ) -> Result<(), Error> {
        let var = Arc::new(Value::local_var(self.local_exprs.next_level()));
        let value = self.elim_env().fun_app(value.clone(), plicity, var.clone());
        let body = self.elim_env().apply_closure(body, var);

        self.local_exprs.push();
        let result = self.unify(&body, &value);
        self.local_exprs.pop();

        result
    }

    /// Unify a record literal with a value, using eta-conversion.
    ///
    /// ```text
    /// { x = r.x, y = r.y, .. } = r
    /// ```
    fn unify_record_lit(
        &mut self,
        labels: &[StringId],
        exprs: &[ArcValue<'arena>],
        value: &ArcValue<'arena>,
    ) -> Result<(), Error> {
        for (label, expr) in Iterator::zip(labels.iter(), exprs.iter()) {
            let field_value = self.elim_env().record_proj(value.clone(), *label);
            self.unify(expr, &field_value)?;
        }
        Ok(())
    }

    /// Solve a pattern unification problem that looks like:
    ///
    /// ```text
    /// ?α spine =? value`
    /// ```
    ///
    /// If successful, the metavariable environment will be updated with a
    /// solution that looks something like:
    ///
    /// ```text
    /// ?α := fun spine => value
    /// ```
    pub(crate) fn solve(
        &mut self,
        meta_var: Level,
        spine: &[Elim<'arena>],
        value: &ArcValue<'arena>,
    ) -> Result<(), Error> {
        self.init_renaming(spine)?;
        let term = self.rename(meta_var, value)?;
        let fun_term = self.fun_intros(spine, term);
        let solution = self
            .elim_env()
            .eval_env(&mut SharedEnv::new())
            .eval(self.scope.to_scope(fun_term));

        self.meta_exprs.set_level(meta_var, Some(solution));

        Ok(())
    }

    /// Re-initialise the [`Context::renaming`] by mapping the local variables
    /// in the spine to the local variables in the solution. This can fail if
    /// the spine does not contain distinct local variables.
    fn init_renaming(&mut self, spine: &[Elim<'arena>]) -> Result<(), SpineError> {
        self.renaming.init(self.local_exprs);

        for elim in spine {
            match elim {
                Elim::FunApp(_, arg) => match self.elim_env().force(arg).as_ref() {
                    Value::Stuck(Head::LocalVar(source_var), spine)
                        if spine.is_empty() && self.renaming.set_local(*source_var) => {}
                    Value::Stuck(Head::LocalVar(source_var), _) => {
                        return Err(SpineError::NonLinearSpine(*source_var))
                    }
                    _ => return Err(SpineError::NonRigidFunApp),
                },
                Elim::RecordProj(label) => return Err(SpineError::RecordProj(*label)),
            }
        }

        Ok(())
    }

    /// Wrap a `term` in [function literals][Term::FunLit] that correspond to
    /// the given `spine`.
    fn fun_intros(&self, spine: &[Elim<'arena>], term: Term<'arena>) -> Term<'arena> {
        spine.iter().fold(term, |term, elim| match elim {
            Elim::FunApp(plicity, _) => {
                Term::FunLit(Span::Empty, *plicity, None, self.scope.to_scope(term))
            }
            Elim::RecordProj(_) => unreachable!("should have been caught by `init_renaming`"),
        })
    }

    /// Rename `value` to a [`Term`], while at the same time using the current
    /// renaming to update variable indices, failing if the partial renaming is
    /// not defined (resulting in an [scope error][RenameError::EscapingLocalVar]),
    /// and also checking for occurrences of the `meta_var` (resulting in an
    /// [occurs check error][RenameError::InfiniteSolution]).
    ///
    /// This allows us to subsequently wrap the returned term in function
    /// literals, using [`Context::fun_intros`].
    fn rename(
        &mut self,
        meta_var: Level,
        value: &ArcValue<'arena>,
    ) -> Result<Term<'arena>, RenameError> {
        match self.elim_env().force(value).as_ref() {
            Value::Stuck(head, spine) => {
                let head_term = match head {
                    Head::Error => Term::Error(Span::Empty),
                    Head::LocalVar(source_var) => match self.renaming.get_as_local(*source_var) {
                        None => return Err(RenameError::EscapingLocalVar(*source_var)),
                        Some(target_var) => Term::LocalVar(Span::Empty, target_var),
                    },
                    Head::MetaVar(var) => match *var {
                        var if meta_var == var => return Err(RenameError::InfiniteSolution),
                        var => Term::MetaVar(Span::Empty, var),
                    },
                    Head::Const(name, levels) => Term::Const(Span::Empty, *name, *levels),
                };

                spine.iter().fold(Ok(head_term), |head_term, elim| {
                    Ok(match elim {
                        Elim::FunApp(plicity, arg) => Term::FunApp(
                            Span::Empty,
                            *plicity,
                            self.scope.to_scope(head_term?),
                            self.scope.to_scope(self.rename(meta_var, arg)?),
                        ),
                        Elim::RecordProj(label) => {
                            Term::RecordProj(Span::Empty, self.scope.to_scope(head_term?), *label)
                        }
                    })
                })
            }

            Value::Sort(level) => Ok(Term::Sort(Span::Empty, *level)),

            Value::FunType(plicity, name, dom, cod) => {
                let dom = self.rename(meta_var, dom)?;
                let cod = self.rename_closure(meta_var, cod)?;

                Ok(Term::FunType(
                    Span::Empty,
                    *plicity,
                    *name,
                    self.scope.to_scope(dom),
                    self.scope.to_scope(cod),
                ))
            }
            Value::FunLit(plicity, name, body) => {
                let body = self.rename_closure(meta_var, body)?;

                Ok(Term::FunLit(
                    Span::Empty,
                    *plicity,
                    *name,
                    self.scope.to_scope(body),
                ))
            }

            Value::RecordType(labels, types) => {
                let labels = *labels;
                let types = self.rename_telescope(meta_var, types)?;
                Ok(Term::RecordType(Span::Empty, labels, types))
            }
            Value::RecordLit(labels, exprs) => {
                let labels = *labels;
                let mut new_exprs = SliceVec::new(self.scope, exprs.len());
                for expr in exprs {
                    new_exprs.push(self.rename(meta_var, expr)?);
                }

                Ok(Term::RecordLit(Span::Empty, labels, new_exprs.into()))
            }

            Value::Lit(lit) => Ok(Term::Lit(Span::Empty, *lit)),
        }
    }

    /// Rename a closure back into a [`Term`].
    fn rename_closure(
        &mut self,
        meta_var: Level,
        closure: &Closure<'arena>,
    ) -> Result<Term<'arena>, RenameError> {
        let source_var = self.renaming.next_local_var();
        let value = self.elim_env().apply_closure(closure, source_var);

        self.renaming.push_local();
        let term = self.rename(meta_var, &value);
        self.renaming.pop_local();

        term
    }

    /// Rename a telescope back into a slice of [terms][Term].
    fn rename_telescope(
        &mut self,
        meta_var: Level,
        telescope: &Telescope<'arena>,
    ) -> Result<&'arena [Term<'arena>], RenameError> {
        let initial_len = self.renaming.len();
        let mut telescope = telescope.clone();
        let mut terms = SliceVec::new(self.scope, telescope.len());

        while let Some((value, next_telescope)) = self.elim_env().split_telescope(telescope) {
            match self.rename(meta_var, &value) {
                Ok(term) => {
                    terms.push(term);
                    let var = self.renaming.next_local_var();
                    telescope = next_telescope(var);
                    self.renaming.push_local();
                }
                Err(error) => {
                    self.renaming.truncate(initial_len);
                    return Err(error);
                }
            }
        }

        self.renaming.truncate(initial_len);
        Ok(terms.into())
    }
}

/// A partial renaming from a source environment to a target environment.
pub struct PartialRenaming {
    /// Mapping from local variables in the source environment to local
    /// variables in the target environment.
    source: UniqueEnv<Option<Level>>,
    /// The length of the target binding environment.
    target: EnvLen,
}

impl PartialRenaming {
    /// Create a new, empty renaming.
    pub fn new() -> PartialRenaming {
        PartialRenaming {
            source: UniqueEnv::new(),
            target: EnvLen::new(),
        }
    }

    /// Re-initialise the renaming to the requested `source_len`, reusing the
    /// previous allocation.
    fn init(&mut self, source_len: EnvLen) {
        self.source.clear();
        self.source.resize(source_len, None);
        self.target.clear();
    }

    fn next_local_var<'arena>(&self) -> ArcValue<'arena> {
        Arc::new(Value::local_var(self.source.len().next_level()))
    }

    /// Set a local source variable to local target variable mapping, ensuring
    /// that the variable appears uniquely.
    ///
    /// # Returns
    ///
    /// - `true` if the local binding was set successfully.
    /// - `false` if the local binding was already set.
    fn set_local(&mut self, source_var: Level) -> bool {
        let is_unique = self.get_as_level(source_var).is_none();

        if is_unique {
            let target_var = Some(self.target.next_level());
            self.source.set_level(source_var, target_var);
            self.target.push();
        }

        is_unique
    }

    /// Push an extra local binding onto the renaming.
    fn push_local(&mut self) {
        let target_var = self.target.next_level();
        self.source.push(Some(target_var));
        self.target.push();
    }

    /// Pop a local binding off the renaming.
    fn pop_local(&mut self) {
        self.source.pop();
        self.target.pop();
    }

    fn len(&self) -> (EnvLen, EnvLen) {
        (self.source.len(), self.target)
    }

    fn truncate(&mut self, (source_len, target_len): (EnvLen, EnvLen)) {
        self.source.truncate(source_len);
        self.target.truncate(target_len);
    }

    /// Get the local variable in the target environment that will be used in
    /// place of the `source_var`.
    fn get_as_level(&self, source_var: Level) -> Option<Level> {
        self.source.get_level(source_var).copied().flatten()
    }

    /// Rename a local variable in the source environment to a local variable
    /// in the target environment.
    fn get_as_local(&self, source_var: Level) -> Option<Index> {
        let target_var = self.get_as_level(source_var)?;
        self.target.level_to_index(target_var)
    }
}
