//! Inductive type declarations.
//!
//! An inductive declaration introduces a sort-valued constant, a set of
//! constructors targeting it, and a generated recursor together with its
//! computation rules. Only *simple* inductives are supported: no parameters
//! and no indices, constructors are telescopes of fields whose final target
//! is the bare inductive constant, and recursive occurrences may appear only
//! as a whole field type (strict positivity in its plainest form).
//! Propositional inductives get a recursor that eliminates into `Sort 0`
//! only, unless they are subsingletons.

use scoped_arena::Scope;

use crate::core::global::{DeclKind, Declaration, Environment, RecRule};
use crate::core::typing::{KernelError, KernelErrorKind, TypeChecker};
use crate::core::universe::ULevel;
use crate::core::{Name, Plicity, Term};
use crate::env::Index;
use crate::source::{Span, StringId};

/// The ways an inductive declaration can be rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InductiveViolation {
    /// The declared type of the inductive is not a sort.
    TypeNotSort,
    /// A constructor's type does not end in the inductive being declared.
    CtorWrongTarget,
    /// A constructor mentions the inductive somewhere other than as a whole
    /// field type.
    CtorNotPositive,
    /// A recursive occurrence is not instantiated at the declaration's own
    /// level parameters.
    CtorLevelArgs,
}

impl InductiveViolation {
    pub fn description(&self) -> &'static str {
        match self {
            InductiveViolation::TypeNotSort => "its type is not a sort",
            InductiveViolation::CtorWrongTarget => {
                "a constructor does not target the inductive type"
            }
            InductiveViolation::CtorNotPositive => {
                "a constructor mentions the inductive type in a non-positive position"
            }
            InductiveViolation::CtorLevelArgs => {
                "a recursive occurrence is instantiated at foreign level arguments"
            }
        }
    }
}

/// Check an inductive declaration and extend the environment with the
/// inductive, its constructors, and its recursor. Called from
/// [`typing::add_declaration`][crate::core::typing::add_declaration] only.
#[allow(clippy::too_many_arguments)]
pub(crate) fn add_inductive<'arena>(
    scope: &'arena Scope<'arena>,
    env: &Environment<'arena>,
    name: Name,
    level_params: &[StringId],
    r#type: &'arena Term<'arena>,
    ctors: &[(Name, &'arena Term<'arena>)],
    rec_name: Name,
    motive_param: StringId,
) -> Result<Environment<'arena>, KernelError<'arena>> {
    let num_params = level_params.len();
    for (ctor_name, _) in ctors {
        if env.contains(*ctor_name) {
            return Err(KernelError::new(
                env.clone(),
                None,
                KernelErrorKind::AlreadyDeclared(*ctor_name),
            ));
        }
    }
    if env.contains(rec_name) {
        return Err(KernelError::new(
            env.clone(),
            None,
            KernelErrorKind::AlreadyDeclared(rec_name),
        ));
    }
    if level_params.contains(&motive_param) {
        return Err(KernelError::new(
            env.clone(),
            None,
            KernelErrorKind::InvalidLevelParams(rec_name),
        ));
    }

    let violation = |env: &Environment<'arena>, violation| {
        Err(KernelError::new(
            env.clone(),
            Some(r#type),
            KernelErrorKind::InvalidInductive(name, violation),
        ))
    };

    // The inductive's declared type must itself be a sort.
    let mut checker = TypeChecker::new(scope, env);
    checker.infer_sort(r#type)?;
    let is_prop = match checker.whnf(r#type)? {
        Term::Sort(_, level) => level.is_zero(),
        _ => return violation(env, InductiveViolation::TypeNotSort),
    };

    // Constructor types are checked in an environment that already contains
    // the inductive, so recursive fields resolve.
    let ind_env = env.with_decl(Declaration {
        name,
        level_params: level_params.to_vec(),
        r#type,
        kind: DeclKind::Inductive {
            ctors: ctors.iter().map(|(ctor_name, _)| *ctor_name).collect(),
        },
    });

    let mut new_env = ind_env.clone();
    let mut ctor_fields = Vec::with_capacity(ctors.len());
    for (index, (ctor_name, ctor_type)) in ctors.iter().enumerate() {
        let ctor_type: &'arena Term<'arena> = *ctor_type;
        let mut checker = TypeChecker::new(scope, &ind_env);
        checker.infer_sort(ctor_type)?;

        let mut fields: Vec<&'arena Term<'arena>> = Vec::new();
        let mut target: &'arena Term<'arena> = ctor_type;
        while let Term::FunType(_, _, _, dom, cod) = target {
            fields.push(dom);
            target = cod;
        }
        if mentions(target, name) && !is_self_ref(target, name, num_params) {
            let v = if matches!(target, Term::Const(..)) {
                InductiveViolation::CtorLevelArgs
            } else {
                InductiveViolation::CtorWrongTarget
            };
            return violation(env, v);
        }
        if !is_self_ref(target, name, num_params) {
            return violation(env, InductiveViolation::CtorWrongTarget);
        }
        for dom in fields.iter().copied() {
            if mentions(dom, name) && !is_self_ref(dom, name, num_params) {
                let v = match dom {
                    Term::Const(..) => InductiveViolation::CtorLevelArgs,
                    _ => InductiveViolation::CtorNotPositive,
                };
                return violation(env, v);
            }
        }

        new_env = new_env.with_decl(Declaration {
            name: *ctor_name,
            level_params: level_params.to_vec(),
            r#type: ctor_type,
            kind: DeclKind::Constructor {
                inductive: name,
                index,
                num_fields: fields.len(),
            },
        });
        ctor_fields.push((*ctor_name, fields));
    }

    // A propositional inductive may eliminate into higher sorts only when
    // proof irrelevance cannot distinguish its inhabitants: no constructors,
    // or a single constructor all of whose fields are propositions.
    let large_elim = !is_prop
        || match &ctor_fields[..] {
            [] => true,
            [(_, fields)] => {
                let mut checker = TypeChecker::new(scope, &new_env);
                let mut subsingleton = true;
                for dom in fields.iter().copied() {
                    subsingleton &= checker.infer_sort(dom)?.is_zero();
                }
                subsingleton
            }
            _ => false,
        };

    let recursor = build_recursor(scope, name, num_params, &ctor_fields, rec_name, large_elim);

    // Sanity-check the generated recursor type in the extended environment.
    let mut checker = TypeChecker::new(scope, &new_env);
    checker.infer_sort(recursor.r#type)?;

    let mut rec_level_params = level_params.to_vec();
    if large_elim {
        rec_level_params.push(motive_param);
    }
    Ok(new_env.with_decl(Declaration {
        name: rec_name,
        level_params: rec_level_params,
        r#type: recursor.r#type,
        kind: DeclKind::Recursor {
            inductive: name,
            num_minors: ctor_fields.len(),
            rules: recursor.rules,
        },
    }))
}

struct Recursor<'arena> {
    r#type: &'arena Term<'arena>,
    rules: Vec<RecRule<'arena>>,
}

/// Generate the recursor for an inductive with the given constructors.
///
/// For an inductive `I` with constructors `c₁ … c_K` the recursor has type
///
/// ```text
/// I.rec : (C : I → Sort u) → minor₁ → … → minor_K → (n : I) → C n
/// ```
///
/// where `minorᵢ` binds the constructor's fields, then one induction
/// hypothesis `C aⱼ` per recursive field, and targets `C (cᵢ a₁ … a_k)`.
/// Each computation rule's right hand side is a closed function of the
/// motive, the minors, and the fields, whose body applies the matching minor
/// and recurses through the recursor itself for the induction hypotheses.
///
/// When `large_elim` is false the recursor binds no motive level parameter
/// and the motive's codomain is pinned to `Sort 0`: proof irrelevance
/// identifies all inhabitants of a non-subsingleton proposition, so letting
/// its recursor distinguish them in a higher sort would be unsound.
fn build_recursor<'arena>(
    scope: &'arena Scope<'arena>,
    name: Name,
    num_params: usize,
    ctor_fields: &[(Name, Vec<&'arena Term<'arena>>)],
    rec_name: Name,
    large_elim: bool,
) -> Recursor<'arena> {
    let num_minors = ctor_fields.len();
    let motive_level = if large_elim {
        ULevel::Param(num_params as u16)
    } else {
        ULevel::Zero
    };
    let num_rec_levels = if large_elim { num_params + 1 } else { num_params };
    let self_levels: &'arena [ULevel<'arena>] =
        scope.to_scope_from_iter((0..num_params).map(|i| ULevel::Param(i as u16)));
    let rec_levels: &'arena [ULevel<'arena>] =
        scope.to_scope_from_iter((0..num_rec_levels).map(|i| ULevel::Param(i as u16)));
    let self_const = |scope: &'arena Scope<'arena>| -> &'arena Term<'arena> {
        scope.to_scope(Term::Const(Span::Empty, name, self_levels))
    };

    // C : I → Sort u
    let motive_type = pi(
        scope,
        self_const(scope),
        scope.to_scope(Term::Sort(Span::Empty, motive_level)),
    );

    let mut minor_types = Vec::with_capacity(num_minors);
    for (minor, (ctor_name, fields)) in ctor_fields.iter().enumerate() {
        let num_fields = fields.len();
        let recursive: Vec<usize> = (0..num_fields)
            .filter(|&j| is_self_ref(fields[j], name, num_params))
            .collect();
        let num_ihs = recursive.len();

        // In the target, C sits below the earlier minors, the fields, and
        // the induction hypotheses.
        let motive_at = |ihs_bound: usize| minor + num_fields + ihs_bound;
        let field_at = |j: usize, ihs_bound: usize| num_fields - 1 - j + ihs_bound;

        // C (cᵢ a₁ … a_k)
        let mut applied_ctor: &'arena Term<'arena> =
            scope.to_scope(Term::Const(Span::Empty, *ctor_name, self_levels));
        for j in 0..num_fields {
            applied_ctor = app(scope, applied_ctor, var(scope, field_at(j, num_ihs)));
        }
        let mut minor_type = app(scope, var(scope, motive_at(num_ihs)), applied_ctor);

        // Wrap the induction hypotheses, innermost last.
        for (t, &j) in recursive.iter().enumerate().rev() {
            let ih_type = app(scope, var(scope, motive_at(t)), var(scope, field_at(j, t)));
            minor_type = pi(scope, ih_type, minor_type);
        }
        // Wrap the fields. Constructor types are closed, so the field types
        // can be reused unshifted.
        for dom in fields.iter().rev().copied() {
            minor_type = pi(scope, dom, minor_type);
        }
        minor_types.push(minor_type);
    }

    // (n : I) → C n, with C below the minors and the major premise.
    let mut rec_type = pi(
        scope,
        self_const(scope),
        app(scope, var(scope, num_minors + 1), var(scope, 0)),
    );
    for minor_type in minor_types.iter().rev().copied() {
        rec_type = pi(scope, minor_type, rec_type);
    }
    rec_type = pi(scope, motive_type, rec_type);

    let mut rules = Vec::with_capacity(num_minors);
    for (minor, (ctor_name, fields)) in ctor_fields.iter().enumerate() {
        let num_fields = fields.len();
        // Binders of the rhs: C, m₁ … m_K, a₁ … a_k.
        let motive_at = num_minors + num_fields;
        let minor_at = |i: usize| num_minors - 1 - i + num_fields;
        let field_at = |j: usize| num_fields - 1 - j;

        let mut body = var(scope, minor_at(minor));
        for j in 0..num_fields {
            body = app(scope, body, var(scope, field_at(j)));
        }
        for j in 0..num_fields {
            if !is_self_ref(fields[j], name, num_params) {
                continue;
            }
            // rec C m₁ … m_K aⱼ
            let mut rec_call: &'arena Term<'arena> =
                scope.to_scope(Term::Const(Span::Empty, rec_name, rec_levels));
            rec_call = app(scope, rec_call, var(scope, motive_at));
            for i in 0..num_minors {
                rec_call = app(scope, rec_call, var(scope, minor_at(i)));
            }
            rec_call = app(scope, rec_call, var(scope, field_at(j)));
            body = app(scope, body, rec_call);
        }

        let mut rhs = body;
        for _ in 0..1 + num_minors + num_fields {
            rhs = scope.to_scope(Term::FunLit(Span::Empty, Plicity::Explicit, None, rhs));
        }
        rules.push(RecRule {
            ctor: *ctor_name,
            num_fields,
            rhs,
        });
    }

    Recursor {
        r#type: rec_type,
        rules,
    }
}

/// Whether a term is exactly the inductive constant instantiated at the
/// declaration's own level parameters, in order.
fn is_self_ref(term: &Term<'_>, name: Name, num_params: usize) -> bool {
    match term {
        Term::Const(_, n, levels) => {
            *n == name
                && levels.len() == num_params
                && levels
                    .iter()
                    .enumerate()
                    .all(|(i, level)| matches!(level, ULevel::Param(p) if *p as usize == i))
        }
        _ => false,
    }
}

/// Whether the inductive constant occurs anywhere in the term.
fn mentions(term: &Term<'_>, name: Name) -> bool {
    match term {
        Term::Const(_, n, _) => *n == name,
        Term::LocalVar(..)
        | Term::MetaVar(..)
        | Term::InsertedMeta(..)
        | Term::Sort(..)
        | Term::Lit(..)
        | Term::Error(_) => false,
        Term::Ann(_, expr, r#type) => mentions(expr, name) || mentions(r#type, name),
        Term::Let(_, _, r#type, expr, body) => {
            mentions(r#type, name) || mentions(expr, name) || mentions(body, name)
        }
        Term::FunType(_, _, _, dom, cod) => mentions(dom, name) || mentions(cod, name),
        Term::FunLit(_, _, _, body) => mentions(body, name),
        Term::FunApp(_, _, fun, arg) => mentions(fun, name) || mentions(arg, name),
        Term::RecordType(_, _, types) => types.iter().any(|r#type| mentions(r#type, name)),
        Term::RecordLit(_, _, exprs) => exprs.iter().any(|expr| mentions(expr, name)),
        Term::RecordProj(_, head, _) => mentions(head, name),
    }
}

fn pi<'arena>(
    scope: &'arena Scope<'arena>,
    dom: &'arena Term<'arena>,
    cod: &'arena Term<'arena>,
) -> &'arena Term<'arena> {
    scope.to_scope(Term::FunType(Span::Empty, Plicity::Explicit, None, dom, cod))
}

fn app<'arena>(
    scope: &'arena Scope<'arena>,
    fun: &'arena Term<'arena>,
    arg: &'arena Term<'arena>,
) -> &'arena Term<'arena> {
    scope.to_scope(Term::FunApp(Span::Empty, Plicity::Explicit, fun, arg))
}

fn var<'arena>(scope: &'arena Scope<'arena>, index: usize) -> &'arena Term<'arena> {
    scope.to_scope(Term::LocalVar(Span::Empty, Index::last().shifted(index as u32)))
}
