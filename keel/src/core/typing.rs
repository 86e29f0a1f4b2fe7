//! The kernel type checker.
//!
//! This module is the only part of the crate trusted for soundness. It never
//! trusts elaborator output: every judgment is re-derived from first
//! principles against the environment, at the level of raw terms. It has its
//! own reduction machinery, independent of the evaluator the elaborator uses
//! ([`semantics`][crate::core::semantics]), so that a bug in the untrusted
//! layers cannot leak into proof checking.
//!
//! Reduction and equality checking are fuel-bounded. Running out of fuel is
//! reported as [`KernelErrorKind::DeepRecursion`]: a clean, resource-limit
//! style failure that aborts the current declaration and commits nothing.

use std::cell::RefCell;
use std::fmt;

use fxhash::FxHashSet;
use scoped_arena::Scope;

use crate::core::global::{DeclKind, Declaration, Environment, Reducibility};
use crate::core::inductive::{self, InductiveViolation};
use crate::core::pretty;
use crate::core::universe::ULevel;
use crate::core::{Name, Plicity, Term};
use crate::env::Index;
use crate::source::{Span, StringId};
use crate::StringInterner;

/// The number of reduction/comparison steps a single kernel operation may
/// take before giving up with [`KernelErrorKind::DeepRecursion`].
pub const KERNEL_FUEL: u32 = 100_000;

/// A kernel failure.
///
/// Every kernel error captures the environment at the point of failure and,
/// when one is relevant, the offending term, so that a precise message can
/// be rendered later without re-walking anything. Rendering is deferred:
/// pretty-printing large terms only happens if [`KernelError::render`] is
/// actually called.
#[derive(Clone)]
pub struct KernelError<'arena> {
    env: Environment<'arena>,
    main_expr: Option<&'arena Term<'arena>>,
    kind: KernelErrorKind<'arena>,
}

impl fmt::Debug for KernelError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelError")
            .field("kind", &self.kind)
            .field("main_expr", &self.main_expr)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum KernelErrorKind<'arena> {
    /// A reference to a name not present in the environment.
    UnknownDeclaration(Name),
    /// An attempt to add a declaration under a name that already exists.
    AlreadyDeclared(Name),
    /// A term that does not type check.
    IllTyped(IllTyped<'arena>),
    /// An inductive declaration that violates the rules for inductive types.
    InvalidInductive(Name, InductiveViolation),
    /// A declaration registered as an instance whose type is not headed by a
    /// class constant.
    InvalidInstance(Name),
    /// A declaration registered as a coercion whose type is not a function
    /// between constant-headed types.
    InvalidCoercion(Name),
    /// A declaration whose universe level parameters are not distinct or do
    /// not cover the parameters its terms mention.
    InvalidLevelParams(Name),
    /// The reduction/equality fuel ran out.
    DeepRecursion,
}

/// The reasons a term can fail to type check.
#[derive(Debug, Clone)]
pub enum IllTyped<'arena> {
    TypeMismatch {
        expected: &'arena Term<'arena>,
        found: &'arena Term<'arena>,
    },
    NotAFunction {
        r#type: &'arena Term<'arena>,
    },
    NotASort {
        r#type: &'arena Term<'arena>,
    },
    NotARecord {
        r#type: &'arena Term<'arena>,
    },
    FieldNotFound {
        label: StringId,
    },
    MismatchedFieldLabels,
    DuplicateFieldLabels,
    PlicityMismatch {
        expected: Plicity,
        found: Plicity,
    },
    LevelArgMismatch {
        expected: usize,
        found: usize,
    },
    /// A function literal in a position where its type cannot be inferred.
    UnannotatedFunction,
    /// A variable not bound by the local context.
    UnboundVariable,
    /// The kernel never accepts metavariables; elaboration must solve or
    /// reject them first.
    UnexpectedMetaVar,
    /// An error sentinel produced by a failed elaboration.
    ReportedError,
}

impl<'arena> KernelError<'arena> {
    pub(crate) fn new(
        env: Environment<'arena>,
        main_expr: Option<&'arena Term<'arena>>,
        kind: KernelErrorKind<'arena>,
    ) -> KernelError<'arena> {
        KernelError {
            env,
            main_expr,
            kind,
        }
    }

    pub(crate) fn unknown_declaration(env: Environment<'arena>, name: Name) -> KernelError<'arena> {
        KernelError::new(env, None, KernelErrorKind::UnknownDeclaration(name))
    }

    pub(crate) fn invalid_instance(
        env: Environment<'arena>,
        name: Name,
        r#type: &'arena Term<'arena>,
    ) -> KernelError<'arena> {
        KernelError::new(env, Some(r#type), KernelErrorKind::InvalidInstance(name))
    }

    pub(crate) fn invalid_coercion(
        env: Environment<'arena>,
        name: Name,
        r#type: &'arena Term<'arena>,
    ) -> KernelError<'arena> {
        KernelError::new(env, Some(r#type), KernelErrorKind::InvalidCoercion(name))
    }

    pub fn kind(&self) -> &KernelErrorKind<'arena> {
        &self.kind
    }

    /// The environment at the point of failure.
    pub fn env(&self) -> &Environment<'arena> {
        &self.env
    }

    /// The term the failure is about, when there is one.
    pub fn main_expr(&self) -> Option<&'arena Term<'arena>> {
        self.main_expr
    }

    /// Render the error to a human-readable message. Pretty-printing of the
    /// terms involved happens here, not at construction time.
    pub fn render(&self, interner: &RefCell<StringInterner>) -> String {
        // The printer needs mutable access to the interner for generated
        // binder names, so every borrow here must be short-lived.
        let term = |term: &Term<'arena>| pretty::render(interner, term);
        let name = |name: Name| name.resolve(&interner.borrow()).to_owned();
        match &self.kind {
            KernelErrorKind::UnknownDeclaration(decl_name) => {
                format!("unknown declaration `{}`", name(*decl_name))
            }
            KernelErrorKind::AlreadyDeclared(decl_name) => format!(
                "invalid declaration, environment already contains a declaration named `{}`",
                name(*decl_name),
            ),
            KernelErrorKind::IllTyped(reason) => match reason {
                IllTyped::TypeMismatch { expected, found } => format!(
                    "type mismatch: expected `{}`, found `{}`",
                    term(expected),
                    term(found),
                ),
                IllTyped::NotAFunction { r#type } => {
                    format!("expected a function, found a term of type `{}`", term(r#type))
                }
                IllTyped::NotASort { r#type } => {
                    format!("expected a sort, found a term of type `{}`", term(r#type))
                }
                IllTyped::NotARecord { r#type } => {
                    format!("expected a record, found a term of type `{}`", term(r#type))
                }
                IllTyped::FieldNotFound { label } => format!(
                    "field `{}` not found",
                    interner.borrow().resolve(*label).unwrap_or("<unresolved>"),
                ),
                IllTyped::MismatchedFieldLabels => "mismatched field labels".to_owned(),
                IllTyped::DuplicateFieldLabels => "duplicate field labels".to_owned(),
                IllTyped::PlicityMismatch { expected, found } => format!(
                    "plicity mismatch: expected {} argument, found {} argument",
                    expected.description(),
                    found.description(),
                ),
                IllTyped::LevelArgMismatch { expected, found } => format!(
                    "expected {expected} universe level arguments, found {found}",
                ),
                IllTyped::UnannotatedFunction => {
                    "cannot infer the type of an unannotated function".to_owned()
                }
                IllTyped::UnboundVariable => "unbound variable".to_owned(),
                IllTyped::UnexpectedMetaVar => {
                    "term contains an unsolved metavariable".to_owned()
                }
                IllTyped::ReportedError => {
                    "term contains a subterm that failed to elaborate".to_owned()
                }
            },
            KernelErrorKind::InvalidInductive(decl_name, violation) => format!(
                "invalid inductive declaration `{}`: {}",
                name(*decl_name),
                violation.description(),
            ),
            KernelErrorKind::InvalidInstance(decl_name) => format!(
                "invalid instance `{}`: its type is not headed by a class",
                name(*decl_name),
            ),
            KernelErrorKind::InvalidCoercion(decl_name) => format!(
                "invalid coercion `{}`: its type is not a function between constants",
                name(*decl_name),
            ),
            KernelErrorKind::InvalidLevelParams(decl_name) => format!(
                "invalid universe level parameters in declaration `{}`",
                name(*decl_name),
            ),
            KernelErrorKind::DeepRecursion => "deep recursion detected by the kernel".to_owned(),
        }
    }
}

/// A declaration submitted to the kernel for checking.
#[derive(Debug, Clone)]
pub enum NewDeclaration<'arena> {
    Axiom {
        name: Name,
        level_params: Vec<StringId>,
        r#type: &'arena Term<'arena>,
    },
    Definition {
        name: Name,
        level_params: Vec<StringId>,
        r#type: &'arena Term<'arena>,
        body: &'arena Term<'arena>,
        reducibility: Reducibility,
    },
    Inductive {
        name: Name,
        level_params: Vec<StringId>,
        r#type: &'arena Term<'arena>,
        ctors: Vec<(Name, &'arena Term<'arena>)>,
        /// The name of the generated recursor, conventionally `<name>.rec`.
        rec_name: Name,
        /// The name of the extra universe parameter the recursor's motive
        /// eliminates into.
        motive_param: StringId,
    },
}

impl<'arena> NewDeclaration<'arena> {
    pub fn name(&self) -> Name {
        match self {
            NewDeclaration::Axiom { name, .. }
            | NewDeclaration::Definition { name, .. }
            | NewDeclaration::Inductive { name, .. } => *name,
        }
    }

    fn level_params(&self) -> &[StringId] {
        match self {
            NewDeclaration::Axiom { level_params, .. }
            | NewDeclaration::Definition { level_params, .. }
            | NewDeclaration::Inductive { level_params, .. } => level_params,
        }
    }
}

/// Atomically extend an environment with a new declaration.
///
/// On success the returned environment contains the declaration (and, for
/// inductives, its constructors and recursor). On failure the error is
/// returned and the input environment is untouched; no partially-checked
/// state is ever observable, because the input is never mutated at all.
pub fn add_declaration<'arena>(
    scope: &'arena Scope<'arena>,
    env: &Environment<'arena>,
    decl: &NewDeclaration<'arena>,
) -> Result<Environment<'arena>, KernelError<'arena>> {
    let name = decl.name();
    if env.contains(name) {
        return Err(KernelError::new(
            env.clone(),
            None,
            KernelErrorKind::AlreadyDeclared(name),
        ));
    }
    check_level_params(env, decl)?;

    match decl {
        NewDeclaration::Axiom { name, level_params, r#type } => {
            let mut checker = TypeChecker::new(scope, env);
            checker.infer_sort(r#type)?;
            Ok(env.with_decl(Declaration {
                name: *name,
                level_params: level_params.clone(),
                r#type,
                kind: DeclKind::Axiom,
            }))
        }
        NewDeclaration::Definition {
            name,
            level_params,
            r#type,
            body,
            reducibility,
        } => {
            let mut checker = TypeChecker::new(scope, env);
            checker.infer_sort(r#type)?;
            checker.check(body, r#type)?;
            Ok(env.with_decl(Declaration {
                name: *name,
                level_params: level_params.clone(),
                r#type,
                kind: DeclKind::Definition {
                    body,
                    reducibility: *reducibility,
                },
            }))
        }
        NewDeclaration::Inductive {
            name,
            level_params,
            r#type,
            ctors,
            rec_name,
            motive_param,
        } => inductive::add_inductive(
            scope,
            env,
            *name,
            level_params,
            r#type,
            ctors,
            *rec_name,
            *motive_param,
        ),
    }
}

fn check_level_params<'arena>(
    env: &Environment<'arena>,
    decl: &NewDeclaration<'arena>,
) -> Result<(), KernelError<'arena>> {
    let params = decl.level_params();
    let mut seen = FxHashSet::default();
    if !params.iter().all(|param| seen.insert(*param)) {
        return Err(KernelError::new(
            env.clone(),
            None,
            KernelErrorKind::InvalidLevelParams(decl.name()),
        ));
    }
    Ok(())
}

/// A single kernel checking pass over terms, holding the local context and
/// the remaining fuel.
pub struct TypeChecker<'arena, 'env> {
    scope: &'arena Scope<'arena>,
    env: &'env Environment<'arena>,
    /// Types of the local binders in scope, innermost last, each stored as
    /// it was at its binding site.
    locals: Vec<&'arena Term<'arena>>,
    fuel: u32,
}

impl<'arena, 'env> TypeChecker<'arena, 'env> {
    pub fn new(
        scope: &'arena Scope<'arena>,
        env: &'env Environment<'arena>,
    ) -> TypeChecker<'arena, 'env> {
        TypeChecker {
            scope,
            env,
            locals: Vec::new(),
            fuel: KERNEL_FUEL,
        }
    }

    fn error<T>(
        &self,
        main_expr: Option<&'arena Term<'arena>>,
        kind: KernelErrorKind<'arena>,
    ) -> Result<T, KernelError<'arena>> {
        Err(KernelError::new(self.env.clone(), main_expr, kind))
    }

    fn ill_typed<T>(
        &self,
        main_expr: &'arena Term<'arena>,
        reason: IllTyped<'arena>,
    ) -> Result<T, KernelError<'arena>> {
        self.error(Some(main_expr), KernelErrorKind::IllTyped(reason))
    }

    fn step(&mut self) -> Result<(), KernelError<'arena>> {
        match self.fuel.checked_sub(1) {
            Some(fuel) => {
                self.fuel = fuel;
                Ok(())
            }
            None => self.error(None, KernelErrorKind::DeepRecursion),
        }
    }

    /// Reduce a term to weak-head normal form: beta reduction, unfolding of
    /// transparent definitions, let reduction, iota reduction of recursor
    /// applications, and record projections. Declarations marked
    /// [`Reducibility::Irreducible`] are never unfolded.
    pub fn whnf(
        &mut self,
        term: &'arena Term<'arena>,
    ) -> Result<&'arena Term<'arena>, KernelError<'arena>> {
        let scope = self.scope;
        let mut head = term;
        // Pending arguments; the top of the stack is the next argument to be
        // consumed by the head.
        let mut spine: Vec<(Span, Plicity, &'arena Term<'arena>)> = Vec::new();

        loop {
            self.step()?;
            match head {
                Term::FunApp(span, plicity, fun, arg) => {
                    spine.push((*span, *plicity, arg));
                    head = fun;
                }
                Term::Ann(_, expr, _) => head = expr,
                Term::Let(_, _, _, expr, body) => head = body.instantiate(scope, expr),
                Term::FunLit(_, _, _, body) => match spine.pop() {
                    Some((_, _, arg)) => head = body.instantiate(scope, arg),
                    None => return Ok(head),
                },
                Term::RecordProj(_, expr, label) => {
                    let expr = self.whnf(expr)?;
                    match expr {
                        Term::RecordLit(_, labels, exprs) => {
                            match labels.iter().position(|l| l == label) {
                                Some(index) => head = &exprs[index],
                                None => {
                                    return self
                                        .ill_typed(head, IllTyped::FieldNotFound { label: *label })
                                }
                            }
                        }
                        _ => return Ok(rebuild(scope, head, &spine)),
                    }
                }
                Term::Const(_, name, levels) => {
                    let decl = match self.env.get(*name) {
                        Some(decl) => decl,
                        None => {
                            return self
                                .error(Some(head), KernelErrorKind::UnknownDeclaration(*name))
                        }
                    };
                    if let Some(body) = decl.unfoldable_body() {
                        head = body.instantiate_levels(scope, levels);
                        continue;
                    }
                    if let DeclKind::Recursor {
                        num_minors, rules, ..
                    } = &decl.kind
                    {
                        // rec C m₁ … mₖ major: the major premise sits after
                        // the motive and the minor premises.
                        let num_taken = num_minors + 2;
                        if spine.len() >= num_taken {
                            let major_at = spine.len() - num_taken;
                            let major = self.whnf(spine[major_at].2)?;
                            if let Some((rule, fields)) = match_rule(rules, major) {
                                // Replace the consumed arguments with the
                                // computation rule's parameters: the major
                                // premise is dropped and the constructor's
                                // fields take its place, so that the closed
                                // rhs beta-reduces against motive, minors,
                                // and fields in order.
                                let consumed: Vec<_> =
                                    spine.drain(major_at..).map(|(_, _, arg)| arg).collect();
                                for field in fields.iter().rev().copied() {
                                    spine.push((Span::Empty, Plicity::Explicit, field));
                                }
                                for arg in consumed[1..].iter().copied() {
                                    spine.push((Span::Empty, Plicity::Explicit, arg));
                                }
                                head = rule.rhs;
                                continue;
                            }
                        }
                        return Ok(rebuild(scope, head, &spine));
                    }
                    return Ok(rebuild(scope, head, &spine));
                }
                _ => return Ok(rebuild(scope, head, &spine)),
            }
        }
    }

    /// Definitional equality: syntactic equality first, then weak-head
    /// reduction and structural comparison with eta for functions and
    /// records, then proof irrelevance.
    pub fn is_def_eq(
        &mut self,
        lhs: &'arena Term<'arena>,
        rhs: &'arena Term<'arena>,
    ) -> Result<bool, KernelError<'arena>> {
        self.step()?;
        if lhs.alpha_eq(rhs) {
            return Ok(true);
        }
        let lhs = self.whnf(lhs)?;
        let rhs = self.whnf(rhs)?;
        if self.is_def_eq_whnf(lhs, rhs)? {
            return Ok(true);
        }
        self.try_proof_irrelevance(lhs, rhs)
    }

    fn is_def_eq_whnf(
        &mut self,
        lhs: &'arena Term<'arena>,
        rhs: &'arena Term<'arena>,
    ) -> Result<bool, KernelError<'arena>> {
        let scope = self.scope;
        match (lhs, rhs) {
            (Term::Sort(_, level0), Term::Sort(_, level1)) => Ok(level0.is_def_eq(level1)),
            (Term::LocalVar(_, var0), Term::LocalVar(_, var1)) => Ok(var0 == var1),
            (Term::Const(_, name0, levels0), Term::Const(_, name1, levels1)) => {
                Ok(name0 == name1 && ULevel::all_def_eq(levels0, levels1))
            }
            (Term::Lit(_, lit0), Term::Lit(_, lit1)) => Ok(lit0 == lit1),
            (
                Term::FunType(_, plicity0, _, dom0, cod0),
                Term::FunType(_, plicity1, _, dom1, cod1),
            ) => {
                if plicity0 != plicity1 || !self.is_def_eq(dom0, dom1)? {
                    return Ok(false);
                }
                self.locals.push(dom0);
                let result = self.is_def_eq(cod0, cod1);
                self.locals.pop();
                result
            }
            (Term::FunLit(_, _, _, body0), Term::FunLit(_, _, _, body1)) => {
                // The domain is not recorded on literals; proof irrelevance
                // under this binder is simply unavailable.
                self.locals.push(scope.to_scope(Term::Error(Span::Empty)));
                let result = self.is_def_eq(body0, body1);
                self.locals.pop();
                result
            }
            (Term::FunLit(_, plicity, _, body), other)
            | (other, Term::FunLit(_, plicity, _, body)) => {
                // Function eta: compare the body against `other x`.
                let var = scope.to_scope(Term::LocalVar(Span::Empty, Index::last()));
                let app = scope.to_scope(Term::FunApp(
                    Span::Empty,
                    *plicity,
                    other.shift(scope, 1),
                    var,
                ));
                self.locals.push(scope.to_scope(Term::Error(Span::Empty)));
                let result = self.is_def_eq(body, app);
                self.locals.pop();
                result
            }
            (Term::FunApp(_, _, fun0, arg0), Term::FunApp(_, _, fun1, arg1)) => {
                Ok(self.is_def_eq_whnf(fun0, fun1)? && self.is_def_eq(arg0, arg1)?)
            }
            (Term::RecordType(_, labels0, types0), Term::RecordType(_, labels1, types1)) => {
                if labels0 != labels1 {
                    return Ok(false);
                }
                let mut pushed = 0;
                let mut result = Ok(true);
                for (type0, type1) in Iterator::zip(types0.iter(), types1.iter()) {
                    match self.is_def_eq(type0, type1) {
                        Ok(true) => {}
                        other => {
                            result = other;
                            break;
                        }
                    }
                    self.locals.push(type0);
                    pushed += 1;
                }
                self.locals.truncate(self.locals.len() - pushed);
                result
            }
            (Term::RecordLit(_, labels0, exprs0), Term::RecordLit(_, labels1, exprs1)) => {
                if labels0 != labels1 {
                    return Ok(false);
                }
                for (expr0, expr1) in Iterator::zip(exprs0.iter(), exprs1.iter()) {
                    if !self.is_def_eq(expr0, expr1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Term::RecordLit(_, labels, exprs), other)
            | (other, Term::RecordLit(_, labels, exprs)) => {
                // Record eta: compare each field against a projection.
                for (label, expr) in Iterator::zip(labels.iter(), exprs.iter()) {
                    let proj = scope.to_scope(Term::RecordProj(Span::Empty, other, *label));
                    if !self.is_def_eq(expr, proj)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Term::RecordProj(_, head0, label0), Term::RecordProj(_, head1, label1)) => {
                Ok(label0 == label1 && self.is_def_eq(head0, head1)?)
            }
            (_, _) => Ok(false),
        }
    }

    /// Two terms are equal when they are both proofs of the same
    /// proposition, regardless of their structure.
    fn try_proof_irrelevance(
        &mut self,
        lhs: &'arena Term<'arena>,
        rhs: &'arena Term<'arena>,
    ) -> Result<bool, KernelError<'arena>> {
        let lhs_type = match self.infer(lhs) {
            Ok(r#type) => r#type,
            Err(error) => return swallow(error),
        };
        if !self.is_proposition(lhs_type)? {
            return Ok(false);
        }
        let rhs_type = match self.infer(rhs) {
            Ok(r#type) => r#type,
            Err(error) => return swallow(error),
        };
        self.is_def_eq(lhs_type, rhs_type)
    }

    /// Whether a type lives in `Sort 0`.
    fn is_proposition(
        &mut self,
        r#type: &'arena Term<'arena>,
    ) -> Result<bool, KernelError<'arena>> {
        let sort = match self.infer(r#type) {
            Ok(sort) => self.whnf(sort)?,
            Err(error) => return swallow(error),
        };
        match sort {
            Term::Sort(_, level) => Ok(level.is_zero()),
            _ => Ok(false),
        }
    }

    /// Infer the type of a term.
    pub fn infer(
        &mut self,
        term: &'arena Term<'arena>,
    ) -> Result<&'arena Term<'arena>, KernelError<'arena>> {
        let scope = self.scope;
        self.step()?;
        match term {
            Term::LocalVar(_, var) => {
                let depth = var.to_usize();
                match self.locals.len().checked_sub(depth + 1).map(|i| self.locals[i]) {
                    Some(r#type) => Ok(r#type.shift(scope, depth as u32 + 1)),
                    None => self.ill_typed(term, IllTyped::UnboundVariable),
                }
            }
            Term::Const(_, name, levels) => {
                let decl = match self.env.get(*name) {
                    Some(decl) => decl,
                    None => {
                        return self.error(Some(term), KernelErrorKind::UnknownDeclaration(*name))
                    }
                };
                if levels.len() != decl.level_params.len() {
                    return self.ill_typed(
                        term,
                        IllTyped::LevelArgMismatch {
                            expected: decl.level_params.len(),
                            found: levels.len(),
                        },
                    );
                }
                Ok(decl.r#type.instantiate_levels(scope, levels))
            }
            Term::MetaVar(..) | Term::InsertedMeta(..) => {
                self.ill_typed(term, IllTyped::UnexpectedMetaVar)
            }
            Term::Sort(span, level) => {
                Ok(scope.to_scope(Term::Sort(*span, ULevel::succ(scope, *level))))
            }
            Term::Ann(_, expr, r#type) => {
                self.infer_sort(r#type)?;
                self.check(expr, r#type)?;
                Ok(r#type)
            }
            Term::Let(_, _, r#type, expr, body) => {
                self.infer_sort(r#type)?;
                self.check(expr, r#type)?;
                self.locals.push(r#type);
                let body_type = self.infer(body);
                self.locals.pop();
                Ok(body_type?.instantiate(scope, expr))
            }
            Term::FunType(span, _, _, dom, cod) => {
                let dom_sort = self.infer_sort(dom)?;
                self.locals.push(dom);
                let cod_sort = self.infer_sort(cod);
                self.locals.pop();
                Ok(scope.to_scope(Term::Sort(
                    *span,
                    ULevel::imax(scope, dom_sort, cod_sort?),
                )))
            }
            Term::FunLit(..) => self.ill_typed(term, IllTyped::UnannotatedFunction),
            Term::FunApp(_, plicity, fun, arg) => {
                let fun_type = self.infer(fun)?;
                let fun_type = self.whnf(fun_type)?;
                match fun_type {
                    Term::FunType(_, fun_plicity, _, dom, cod) => {
                        if plicity != fun_plicity {
                            return self.ill_typed(
                                term,
                                IllTyped::PlicityMismatch {
                                    expected: *fun_plicity,
                                    found: *plicity,
                                },
                            );
                        }
                        self.check(arg, dom)?;
                        Ok(cod.instantiate(scope, arg))
                    }
                    _ => self.ill_typed(term, IllTyped::NotAFunction { r#type: fun_type }),
                }
            }
            Term::RecordType(span, labels, types) => {
                self.check_distinct_labels(term, labels)?;
                let mut sort = ULevel::Zero;
                let mut pushed = 0;
                let mut result = Ok(());
                for r#type in types.iter() {
                    match self.infer_sort(r#type) {
                        Ok(field_sort) => sort = ULevel::max(scope, sort, field_sort),
                        Err(error) => {
                            result = Err(error);
                            break;
                        }
                    }
                    self.locals.push(r#type);
                    pushed += 1;
                }
                self.locals.truncate(self.locals.len() - pushed);
                result?;
                Ok(scope.to_scope(Term::Sort(*span, sort)))
            }
            Term::RecordLit(span, labels, exprs) => {
                self.check_distinct_labels(term, labels)?;
                let mut types = Vec::with_capacity(exprs.len());
                for (index, expr) in exprs.iter().enumerate() {
                    // Field types do not depend on the other fields here, so
                    // shift them under the telescope binders they sit below.
                    let r#type = self.infer(expr)?;
                    types.push(r#type.shift(scope, index as u32).clone());
                }
                Ok(scope.to_scope(Term::RecordType(
                    *span,
                    labels,
                    scope.to_scope_from_iter(types),
                )))
            }
            Term::RecordProj(_, head, label) => {
                let head_type = self.infer(head)?;
                let head_type = self.whnf(head_type)?;
                match head_type {
                    Term::RecordType(_, labels, types) => {
                        match labels.iter().position(|l| l == label) {
                            Some(index) => {
                                let mut r#type = &types[index];
                                for prev in (0..index).rev() {
                                    let proj = scope.to_scope(Term::RecordProj(
                                        Span::Empty,
                                        head,
                                        labels[prev],
                                    ));
                                    r#type = r#type.instantiate(scope, proj);
                                }
                                Ok(r#type)
                            }
                            None => self.ill_typed(term, IllTyped::FieldNotFound { label: *label }),
                        }
                    }
                    _ => self.ill_typed(term, IllTyped::NotARecord { r#type: head_type }),
                }
            }
            Term::Lit(span, lit) => {
                let name = match lit {
                    crate::core::Literal::Nat(_) => self.env.prims().nat,
                    crate::core::Literal::Str(_) => self.env.prims().string,
                };
                Ok(scope.to_scope(Term::Const(*span, name, &[])))
            }
            Term::Error(_) => self.ill_typed(term, IllTyped::ReportedError),
        }
    }

    /// Check a term against an expected type.
    pub fn check(
        &mut self,
        term: &'arena Term<'arena>,
        expected: &'arena Term<'arena>,
    ) -> Result<(), KernelError<'arena>> {
        let scope = self.scope;
        self.step()?;
        let expected_whnf = self.whnf(expected)?;
        match (term, expected_whnf) {
            (Term::FunLit(_, plicity, _, body), Term::FunType(_, fun_plicity, _, dom, cod)) => {
                if plicity != fun_plicity {
                    return self.ill_typed(
                        term,
                        IllTyped::PlicityMismatch {
                            expected: *fun_plicity,
                            found: *plicity,
                        },
                    );
                }
                self.locals.push(dom);
                let result = self.check(body, cod);
                self.locals.pop();
                result
            }
            (Term::Let(_, _, r#type, expr, body), _) => {
                self.infer_sort(r#type)?;
                self.check(expr, r#type)?;
                self.locals.push(r#type);
                let result = self.check(body, expected_whnf.shift(scope, 1));
                self.locals.pop();
                result
            }
            (Term::RecordLit(_, labels, exprs), Term::RecordType(_, type_labels, types)) => {
                if labels != type_labels {
                    return self.ill_typed(term, IllTyped::MismatchedFieldLabels);
                }
                for (index, expr) in exprs.iter().enumerate() {
                    let mut r#type = &types[index];
                    for prev in (0..index).rev() {
                        r#type = r#type.instantiate(scope, &exprs[prev]);
                    }
                    self.check(expr, r#type)?;
                }
                Ok(())
            }
            (_, _) => {
                let found = self.infer(term)?;
                if self.is_def_eq(found, expected_whnf)? {
                    Ok(())
                } else {
                    self.ill_typed(
                        term,
                        IllTyped::TypeMismatch {
                            expected: expected_whnf,
                            found,
                        },
                    )
                }
            }
        }
    }

    /// Infer the sort a type lives in, failing if the term is not a type.
    pub fn infer_sort(
        &mut self,
        r#type: &'arena Term<'arena>,
    ) -> Result<ULevel<'arena>, KernelError<'arena>> {
        let sort = self.infer(r#type)?;
        let sort = self.whnf(sort)?;
        match sort {
            Term::Sort(_, level) => Ok(*level),
            _ => self.ill_typed(r#type, IllTyped::NotASort { r#type: sort }),
        }
    }

    fn check_distinct_labels(
        &self,
        term: &'arena Term<'arena>,
        labels: &[StringId],
    ) -> Result<(), KernelError<'arena>> {
        let mut seen = FxHashSet::default();
        if labels.iter().all(|label| seen.insert(*label)) {
            Ok(())
        } else {
            self.ill_typed(term, IllTyped::DuplicateFieldLabels)
        }
    }
}

/// Fuel exhaustion must not be swallowed by speculative checks; everything
/// else speculative simply fails the speculation.
fn swallow<'arena, T: Default>(error: KernelError<'arena>) -> Result<T, KernelError<'arena>> {
    match error.kind() {
        KernelErrorKind::DeepRecursion => Err(error),
        _ => Ok(T::default()),
    }
}

fn rebuild<'arena>(
    scope: &'arena Scope<'arena>,
    head: &'arena Term<'arena>,
    spine: &[(Span, Plicity, &'arena Term<'arena>)],
) -> &'arena Term<'arena> {
    let mut term = head;
    for &(span, plicity, arg) in spine.iter().rev() {
        term = scope.to_scope(Term::FunApp(span, plicity, term, arg));
    }
    term
}

/// Match a weak-head-normal major premise against a recursor's computation
/// rules, returning the rule and the constructor's fields in order.
fn match_rule<'rules, 'arena>(
    rules: &'rules [crate::core::global::RecRule<'arena>],
    mut major: &'arena Term<'arena>,
) -> Option<(
    &'rules crate::core::global::RecRule<'arena>,
    Vec<&'arena Term<'arena>>,
)> {
    let mut fields = Vec::new();
    loop {
        match major {
            Term::FunApp(_, _, fun, arg) => {
                fields.push(*arg);
                major = *fun;
            }
            Term::Const(_, name, _) => {
                fields.reverse();
                let rule = rules.iter().find(|rule| rule.ctor == *name)?;
                if rule.num_fields != fields.len() {
                    return None;
                }
                return Some((rule, fields));
            }
            _ => return None,
        }
    }
}
