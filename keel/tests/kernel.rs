//! Integration tests for the kernel: declaration checking, reduction,
//! definitional equality, inductives, and the concurrent commit protocol.

use std::cell::RefCell;

use scoped_arena::Scope;

use keel::core::global::{CommitError, EnvStore, Environment, Reducibility};
use keel::core::inductive::InductiveViolation;
use keel::core::typing::{add_declaration, IllTyped, KernelErrorKind, NewDeclaration, TypeChecker};
use keel::core::universe::ULevel;
use keel::core::{Literal, Name, Plicity, Term};
use keel::env::Index;
use keel::source::Span;
use keel::StringInterner;

fn sort<'arena>(scope: &'arena Scope<'arena>, level: u32) -> &'arena Term<'arena> {
    scope.to_scope(Term::Sort(Span::Empty, ULevel::lit(scope, level)))
}

fn pi<'arena>(
    scope: &'arena Scope<'arena>,
    dom: &'arena Term<'arena>,
    cod: &'arena Term<'arena>,
) -> &'arena Term<'arena> {
    scope.to_scope(Term::FunType(Span::Empty, Plicity::Explicit, None, dom, cod))
}

fn lam<'arena>(scope: &'arena Scope<'arena>, body: &'arena Term<'arena>) -> &'arena Term<'arena> {
    scope.to_scope(Term::FunLit(Span::Empty, Plicity::Explicit, None, body))
}

fn app<'arena>(
    scope: &'arena Scope<'arena>,
    fun: &'arena Term<'arena>,
    arg: &'arena Term<'arena>,
) -> &'arena Term<'arena> {
    scope.to_scope(Term::FunApp(Span::Empty, Plicity::Explicit, fun, arg))
}

fn var<'arena>(scope: &'arena Scope<'arena>, index: u32) -> &'arena Term<'arena> {
    scope.to_scope(Term::LocalVar(Span::Empty, Index::last().shifted(index)))
}

fn cst<'arena>(scope: &'arena Scope<'arena>, name: Name) -> &'arena Term<'arena> {
    scope.to_scope(Term::Const(Span::Empty, name, &[]))
}

fn nat<'arena>(scope: &'arena Scope<'arena>, number: u64) -> &'arena Term<'arena> {
    scope.to_scope(Term::Lit(Span::Empty, Literal::Nat(number)))
}

fn axiom<'arena>(
    interner: &RefCell<StringInterner>,
    scope: &'arena Scope<'arena>,
    env: &Environment<'arena>,
    name: &str,
    r#type: &'arena Term<'arena>,
) -> Environment<'arena> {
    let decl = NewDeclaration::Axiom {
        name: Name::intern(interner, name),
        level_params: Vec::new(),
        r#type,
    };
    add_declaration(scope, env, &decl).unwrap_or_else(|error| {
        panic!("failed to declare `{}`: {}", name, error.render(interner))
    })
}

#[test]
fn sorts_form_a_hierarchy() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let mut checker = TypeChecker::new(&scope, &env);

    let r#type = checker.infer(sort(&scope, 0)).unwrap();
    assert!(r#type.alpha_eq(sort(&scope, 1)));

    let level = checker.infer_sort(sort(&scope, 3)).unwrap();
    assert!(level.is_def_eq(&ULevel::lit(&scope, 4)));
}

#[test]
fn prop_is_impredicative() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let mut checker = TypeChecker::new(&scope, &env);

    // (A : Sort 0) -> A lives in Sort 0 again: imax(1, 0) = 0.
    let prop_pi = pi(&scope, sort(&scope, 0), var(&scope, 0));
    let level = checker.infer_sort(prop_pi).unwrap();
    assert!(level.is_zero());

    // (A : Sort 1) -> A does not: imax(2, 1) = 2.
    let type_pi = pi(&scope, sort(&scope, 1), var(&scope, 0));
    let level = checker.infer_sort(type_pi).unwrap();
    assert!(level.is_def_eq(&ULevel::lit(&scope, 2)));
}

#[test]
fn transparent_definitions_unfold() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_type = cst(&scope, env.prims().nat);

    let two = Name::intern(&interner, "two");
    let decl = NewDeclaration::Definition {
        name: two,
        level_params: Vec::new(),
        r#type: nat_type,
        body: nat(&scope, 2),
        reducibility: Reducibility::Transparent,
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();

    let mut checker = TypeChecker::new(&scope, &env);
    assert!(checker.whnf(cst(&scope, two)).unwrap().alpha_eq(nat(&scope, 2)));
    assert!(checker.is_def_eq(cst(&scope, two), nat(&scope, 2)).unwrap());
}

#[test]
fn irreducible_definitions_stay_folded() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_type = cst(&scope, env.prims().nat);

    let two = Name::intern(&interner, "two");
    let decl = NewDeclaration::Definition {
        name: two,
        level_params: Vec::new(),
        r#type: nat_type,
        body: nat(&scope, 2),
        reducibility: Reducibility::Irreducible,
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();

    let mut checker = TypeChecker::new(&scope, &env);
    assert!(matches!(checker.whnf(cst(&scope, two)).unwrap(), Term::Const(..)));
    assert!(!checker.is_def_eq(cst(&scope, two), nat(&scope, 2)).unwrap());
    // The constant is still equal to itself.
    assert!(checker.is_def_eq(cst(&scope, two), cst(&scope, two)).unwrap());
}

#[test]
fn rejected_declarations_leave_the_environment_untouched() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let num_decls = env.num_decls();

    let bad = Name::intern(&interner, "bad");
    let decl = NewDeclaration::Definition {
        name: bad,
        level_params: Vec::new(),
        r#type: cst(&scope, env.prims().nat),
        body: sort(&scope, 0),
        reducibility: Reducibility::Transparent,
    };
    let error = add_declaration(&scope, &env, &decl).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::TypeMismatch { .. })
    ));
    assert_eq!(env.num_decls(), num_decls);
    assert!(!env.contains(bad));
}

#[test]
fn duplicate_names_are_rejected() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "A", sort(&scope, 1));

    let decl = NewDeclaration::Axiom {
        name: Name::intern(&interner, "A"),
        level_params: Vec::new(),
        r#type: sort(&scope, 2),
    };
    let error = add_declaration(&scope, &env, &decl).unwrap_err();
    assert!(matches!(error.kind(), KernelErrorKind::AlreadyDeclared(_)));
}

#[test]
fn duplicate_level_params_are_rejected() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    let u = interner.borrow_mut().get_or_intern("u");
    let decl = NewDeclaration::Axiom {
        name: Name::intern(&interner, "P"),
        level_params: vec![u, u],
        r#type: sort(&scope, 1),
    };
    let error = add_declaration(&scope, &env, &decl).unwrap_err();
    assert!(matches!(error.kind(), KernelErrorKind::InvalidLevelParams(_)));
}

#[test]
fn level_argument_counts_are_checked() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    // P.{u} : Sort (u + 1)
    let u = interner.borrow_mut().get_or_intern("u");
    let p = Name::intern(&interner, "P");
    let p_type = scope.to_scope(Term::Sort(
        Span::Empty,
        ULevel::succ(&scope, ULevel::Param(0)),
    ));
    let decl = NewDeclaration::Axiom {
        name: p,
        level_params: vec![u],
        r#type: p_type,
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();

    let mut checker = TypeChecker::new(&scope, &env);
    let error = checker.infer(cst(&scope, p)).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::LevelArgMismatch {
            expected: 1,
            found: 0,
        })
    ));

    // Instantiating `u := 0` gives `P.{0} : Sort 1`.
    let levels = scope.to_scope_from_iter([ULevel::Zero]);
    let applied = scope.to_scope(Term::Const(Span::Empty, p, levels));
    let r#type = checker.infer(applied).unwrap();
    assert!(checker.is_def_eq(r#type, sort(&scope, 1)).unwrap());
}

#[test]
fn proofs_of_a_proposition_are_equal() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "P", sort(&scope, 0));
    let p_type = cst(&scope, Name::intern(&interner, "P"));
    let env = axiom(&interner, &scope, &env, "p", p_type);
    let env = axiom(&interner, &scope, &env, "q", p_type);
    let nat_type = cst(&scope, env.prims().nat);
    let env = axiom(&interner, &scope, &env, "n", nat_type);
    let env = axiom(&interner, &scope, &env, "m", nat_type);

    let mut checker = TypeChecker::new(&scope, &env);
    let p = cst(&scope, Name::intern(&interner, "p"));
    let q = cst(&scope, Name::intern(&interner, "q"));
    assert!(checker.is_def_eq(p, q).unwrap());

    // Irrelevance does not extend above Sort 0.
    let n = cst(&scope, Name::intern(&interner, "n"));
    let m = cst(&scope, Name::intern(&interner, "m"));
    assert!(!checker.is_def_eq(n, m).unwrap());
}

#[test]
fn functions_are_compared_up_to_eta() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_type = cst(&scope, env.prims().nat);
    let env = axiom(&interner, &scope, &env, "f", pi(&scope, nat_type, nat_type));

    let f = cst(&scope, Name::intern(&interner, "f"));
    let eta = lam(&scope, app(&scope, f, var(&scope, 0)));
    let mut checker = TypeChecker::new(&scope, &env);
    assert!(checker.is_def_eq(eta, f).unwrap());
    assert!(checker.is_def_eq(f, eta).unwrap());
}

#[test]
fn records_are_compared_up_to_eta() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    let x = interner.borrow_mut().get_or_intern("x");
    let y = interner.borrow_mut().get_or_intern("y");
    let labels = scope.to_scope_from_iter([x, y]);
    let types = scope.to_scope_from_iter([
        Term::Const(Span::Empty, env.prims().nat, &[]),
        Term::Const(Span::Empty, env.prims().nat, &[]),
    ]);
    let record_type = scope.to_scope(Term::RecordType(Span::Empty, labels, types));
    let env = axiom(&interner, &scope, &env, "r", record_type);

    let r = cst(&scope, Name::intern(&interner, "r"));
    let projs = scope.to_scope_from_iter([
        Term::RecordProj(Span::Empty, r, x),
        Term::RecordProj(Span::Empty, r, y),
    ]);
    let eta = scope.to_scope(Term::RecordLit(Span::Empty, labels, projs));
    let mut checker = TypeChecker::new(&scope, &env);
    assert!(checker.is_def_eq(eta, r).unwrap());
}

/// Declare `B : Sort 1` with constructors `tt` and `ff`, returning the
/// extended environment.
fn declare_bool<'arena>(
    interner: &RefCell<StringInterner>,
    scope: &'arena Scope<'arena>,
    env: &Environment<'arena>,
) -> Environment<'arena> {
    let b = Name::intern(interner, "B");
    let b_type = cst(scope, b);
    let decl = NewDeclaration::Inductive {
        name: b,
        level_params: Vec::new(),
        r#type: sort(scope, 1),
        ctors: vec![
            (Name::intern(interner, "B.tt"), b_type),
            (Name::intern(interner, "B.ff"), b_type),
        ],
        rec_name: b.child(interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    add_declaration(scope, env, &decl).unwrap()
}

#[test]
fn recursors_compute_on_constructors() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = declare_bool(&interner, &scope, &env);

    let rec = Name::intern(&interner, "B.rec");
    assert!(env.contains(rec));

    // B.rec.{1} (fun _ => Nat) 2 3 B.tt
    let levels = scope.to_scope_from_iter([ULevel::lit(&scope, 1)]);
    let rec_head = scope.to_scope(Term::Const(Span::Empty, rec, levels));
    let motive = lam(&scope, cst(&scope, env.prims().nat));
    let on_tt = app(
        &scope,
        app(
            &scope,
            app(&scope, app(&scope, rec_head, motive), nat(&scope, 2)),
            nat(&scope, 3),
        ),
        cst(&scope, Name::intern(&interner, "B.tt")),
    );

    let mut checker = TypeChecker::new(&scope, &env);
    let r#type = checker.infer(on_tt).unwrap();
    assert!(checker.is_def_eq(r#type, cst(&scope, env.prims().nat)).unwrap());
    assert!(checker.whnf(on_tt).unwrap().alpha_eq(nat(&scope, 2)));

    let on_ff = app(
        &scope,
        app(
            &scope,
            app(&scope, app(&scope, rec_head, motive), nat(&scope, 2)),
            nat(&scope, 3),
        ),
        cst(&scope, Name::intern(&interner, "B.ff")),
    );
    assert!(checker.whnf(on_ff).unwrap().alpha_eq(nat(&scope, 3)));
}

#[test]
fn recursors_recurse_through_constructor_fields() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    // N : Sort 1, with z : N and s : N -> N.
    let n = Name::intern(&interner, "N");
    let n_type = cst(&scope, n);
    let decl = NewDeclaration::Inductive {
        name: n,
        level_params: Vec::new(),
        r#type: sort(&scope, 1),
        ctors: vec![
            (Name::intern(&interner, "N.z"), n_type),
            (Name::intern(&interner, "N.s"), pi(&scope, n_type, n_type)),
        ],
        rec_name: n.child(&interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();

    // N.rec.{1} (fun _ => Nat) 0 (fun a ih => ih) (N.s N.z) reduces through
    // the induction hypothesis back to the base case.
    let levels = scope.to_scope_from_iter([ULevel::lit(&scope, 1)]);
    let rec_head = scope.to_scope(Term::Const(Span::Empty, n.child(&interner, "rec"), levels));
    let motive = lam(&scope, cst(&scope, env.prims().nat));
    let on_zero = nat(&scope, 0);
    let on_succ = lam(&scope, lam(&scope, var(&scope, 0)));
    let one = app(
        &scope,
        cst(&scope, Name::intern(&interner, "N.s")),
        cst(&scope, Name::intern(&interner, "N.z")),
    );
    let term = app(
        &scope,
        app(
            &scope,
            app(&scope, app(&scope, rec_head, motive), on_zero),
            on_succ,
        ),
        one,
    );

    let mut checker = TypeChecker::new(&scope, &env);
    let r#type = checker.infer(term).unwrap();
    assert!(checker.is_def_eq(r#type, cst(&scope, env.prims().nat)).unwrap());
    assert!(checker.whnf(term).unwrap().alpha_eq(nat(&scope, 0)));
}

#[test]
fn propositional_inductives_eliminate_into_propositions_only() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    // Two : Sort 0 has two constructors, so proof irrelevance identifies
    // `Two.a` and `Two.b`; its recursor must not tell them apart in a
    // higher sort.
    let two = Name::intern(&interner, "Two");
    let two_type = cst(&scope, two);
    let decl = NewDeclaration::Inductive {
        name: two,
        level_params: Vec::new(),
        r#type: sort(&scope, 0),
        ctors: vec![
            (Name::intern(&interner, "Two.a"), two_type),
            (Name::intern(&interner, "Two.b"), two_type),
        ],
        rec_name: two.child(&interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();
    let mut checker = TypeChecker::new(&scope, &env);

    // The recursor binds no motive level parameter, so it cannot be
    // instantiated at a higher sort.
    let rec = Name::intern(&interner, "Two.rec");
    let levels = scope.to_scope_from_iter([ULevel::lit(&scope, 2)]);
    let error = checker
        .infer(scope.to_scope(Term::Const(Span::Empty, rec, levels)))
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::LevelArgMismatch {
            expected: 0,
            found: 1,
        })
    ));

    // And its motive must target Sort 0: `fun _ => Nat` is rejected.
    let rec_head = cst(&scope, rec);
    let motive = lam(&scope, cst(&scope, env.prims().nat));
    let error = checker.infer(app(&scope, rec_head, motive)).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::TypeMismatch { .. })
    ));
}

#[test]
fn subsingleton_propositions_keep_large_elimination() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    // One : Sort 0 with a single field-free constructor is a subsingleton;
    // eliminating it into any sort cannot distinguish proofs.
    let one = Name::intern(&interner, "One");
    let decl = NewDeclaration::Inductive {
        name: one,
        level_params: Vec::new(),
        r#type: sort(&scope, 0),
        ctors: vec![(Name::intern(&interner, "One.one"), cst(&scope, one))],
        rec_name: one.child(&interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();
    let mut checker = TypeChecker::new(&scope, &env);

    let rec = Name::intern(&interner, "One.rec");
    let levels = scope.to_scope_from_iter([ULevel::lit(&scope, 1)]);
    assert!(checker
        .infer(scope.to_scope(Term::Const(Span::Empty, rec, levels)))
        .is_ok());

    // A single constructor carrying non-propositional data is not a
    // subsingleton: its recursor stays small.
    let boxed = Name::intern(&interner, "Box");
    let nat_type = cst(&scope, env.prims().nat);
    let decl = NewDeclaration::Inductive {
        name: boxed,
        level_params: Vec::new(),
        r#type: sort(&scope, 0),
        ctors: vec![(
            Name::intern(&interner, "Box.mk"),
            pi(&scope, nat_type, cst(&scope, boxed)),
        )],
        rec_name: boxed.child(&interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    let env = add_declaration(&scope, &env, &decl).unwrap();
    let mut checker = TypeChecker::new(&scope, &env);

    let rec = Name::intern(&interner, "Box.rec");
    let levels = scope.to_scope_from_iter([ULevel::lit(&scope, 1)]);
    let error = checker
        .infer(scope.to_scope(Term::Const(Span::Empty, rec, levels)))
        .unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::LevelArgMismatch {
            expected: 0,
            found: 1,
        })
    ));
}

#[test]
fn non_positive_constructors_are_rejected() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    // bad : (X -> Nat) -> X puts X to the left of an arrow.
    let x = Name::intern(&interner, "X");
    let x_type = cst(&scope, x);
    let nat_type = cst(&scope, env.prims().nat);
    let decl = NewDeclaration::Inductive {
        name: x,
        level_params: Vec::new(),
        r#type: sort(&scope, 1),
        ctors: vec![(
            Name::intern(&interner, "X.bad"),
            pi(&scope, pi(&scope, x_type, nat_type), x_type),
        )],
        rec_name: x.child(&interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    let error = add_declaration(&scope, &env, &decl).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::InvalidInductive(_, InductiveViolation::CtorNotPositive)
    ));
}

#[test]
fn constructors_must_target_the_inductive() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    let x = Name::intern(&interner, "X");
    let decl = NewDeclaration::Inductive {
        name: x,
        level_params: Vec::new(),
        r#type: sort(&scope, 1),
        ctors: vec![(
            Name::intern(&interner, "X.bad"),
            cst(&scope, env.prims().nat),
        )],
        rec_name: x.child(&interner, "rec"),
        motive_param: interner.borrow_mut().get_or_intern("u"),
    };
    let error = add_declaration(&scope, &env, &decl).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::InvalidInductive(_, InductiveViolation::CtorWrongTarget)
    ));
}

#[test]
fn instance_registration_validates_the_class_shape() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "S", sort(&scope, 1));

    // A type headed by a sort is not a class.
    let error = env
        .register_instance(Name::intern(&interner, "S"), 0)
        .unwrap_err();
    assert!(matches!(error.kind(), KernelErrorKind::InvalidInstance(_)));

    let error = env
        .register_instance(Name::intern(&interner, "missing"), 0)
        .unwrap_err();
    assert!(matches!(error.kind(), KernelErrorKind::UnknownDeclaration(_)));

    // An axiom of a constant-headed type registers fine.
    let s_type = cst(&scope, Name::intern(&interner, "S"));
    let env = axiom(&interner, &scope, &env, "inst", s_type);
    let inst = Name::intern(&interner, "inst");
    let env = env.register_instance(inst, 7).unwrap();
    let entries = env.instances(Name::intern(&interner, "S"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, inst);
    assert_eq!(entries[0].priority, 7);
}

#[test]
fn instances_are_ordered_by_priority() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "S", sort(&scope, 1));
    let s_type = cst(&scope, Name::intern(&interner, "S"));
    let env = axiom(&interner, &scope, &env, "low", s_type);
    let env = axiom(&interner, &scope, &env, "high", s_type);
    let env = axiom(&interner, &scope, &env, "tied", s_type);

    let env = env.register_instance(Name::intern(&interner, "low"), 1).unwrap();
    let env = env.register_instance(Name::intern(&interner, "high"), 10).unwrap();
    let env = env.register_instance(Name::intern(&interner, "tied"), 10).unwrap();

    let names: Vec<Name> = env
        .instances(Name::intern(&interner, "S"))
        .iter()
        .map(|entry| entry.name)
        .collect();
    // Highest priority first; ties break towards earlier registration.
    assert_eq!(
        names,
        vec![
            Name::intern(&interner, "high"),
            Name::intern(&interner, "tied"),
            Name::intern(&interner, "low"),
        ]
    );
}

#[test]
fn coercion_registration_validates_the_function_shape() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "A", sort(&scope, 1));
    let env = axiom(&interner, &scope, &env, "B", sort(&scope, 1));
    let a_type = cst(&scope, Name::intern(&interner, "A"));
    let b_type = cst(&scope, Name::intern(&interner, "B"));

    // A non-function cannot be a coercion.
    let env = axiom(&interner, &scope, &env, "a", a_type);
    let error = env.register_coercion(Name::intern(&interner, "a")).unwrap_err();
    assert!(matches!(error.kind(), KernelErrorKind::InvalidCoercion(_)));

    let env = axiom(&interner, &scope, &env, "up", pi(&scope, a_type, b_type));
    let up = Name::intern(&interner, "up");
    let env = env.register_coercion(up).unwrap();
    assert_eq!(
        env.coercion(Name::intern(&interner, "A"), Name::intern(&interner, "B")),
        Some(up)
    );
    assert_eq!(
        env.coercion(Name::intern(&interner, "B"), Name::intern(&interner, "A")),
        None
    );
}

#[test]
fn commits_conflict_when_the_store_advances() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let store = EnvStore::new(Environment::new(&interner, &scope));

    let (base, snapshot) = store.snapshot();
    let decl_a = NewDeclaration::Axiom {
        name: Name::intern(&interner, "A"),
        level_params: Vec::new(),
        r#type: sort(&scope, 1),
    };
    let decl_b = NewDeclaration::Axiom {
        name: Name::intern(&interner, "B"),
        level_params: Vec::new(),
        r#type: sort(&scope, 1),
    };

    let (next, committed) = store.try_commit(&scope, base, &decl_a).unwrap();
    assert!(committed.contains(Name::intern(&interner, "A")));
    // The worker's snapshot is unaffected by the commit.
    assert!(!snapshot.contains(Name::intern(&interner, "A")));

    // A second worker holding the stale generation must retry.
    match store.try_commit(&scope, base, &decl_b) {
        Err(CommitError::Conflict) => {}
        Err(CommitError::Kernel(error)) => {
            panic!("expected a conflict, got: {}", error.render(&interner))
        }
        Ok(_) => panic!("expected a conflict"),
    }

    let (_, env) = store.try_commit(&scope, next, &decl_b).unwrap();
    assert!(env.contains(Name::intern(&interner, "A")));
    assert!(env.contains(Name::intern(&interner, "B")));
}

#[test]
fn kernel_commits_reject_ill_typed_declarations() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let store = EnvStore::new(Environment::new(&interner, &scope));

    let (base, _) = store.snapshot();
    let decl = NewDeclaration::Definition {
        name: Name::intern(&interner, "bad"),
        level_params: Vec::new(),
        r#type: sort(&scope, 0),
        body: nat(&scope, 2),
        reducibility: Reducibility::Transparent,
    };
    match store.try_commit(&scope, base, &decl) {
        Err(CommitError::Kernel(_)) => {}
        _ => panic!("expected a kernel error"),
    }
    // The failed commit did not advance the generation.
    let (after, env) = store.snapshot();
    assert_eq!(after, base);
    assert!(!env.contains(Name::intern(&interner, "bad")));
}

#[test]
fn beta_and_let_reduction() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_type = cst(&scope, env.prims().nat);
    let mut checker = TypeChecker::new(&scope, &env);

    // (fun x => x) 2
    let beta = app(&scope, lam(&scope, var(&scope, 0)), nat(&scope, 2));
    assert!(checker.whnf(beta).unwrap().alpha_eq(nat(&scope, 2)));

    // let x : Nat := 2; x
    let let_term = scope.to_scope(Term::Let(
        Span::Empty,
        None,
        nat_type,
        nat(&scope, 2),
        var(&scope, 0),
    ));
    assert!(checker.whnf(let_term).unwrap().alpha_eq(nat(&scope, 2)));
    let r#type = checker.infer(let_term).unwrap();
    assert!(checker.is_def_eq(r#type, nat_type).unwrap());
}

#[test]
fn metavariables_and_error_sentinels_are_rejected() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let mut checker = TypeChecker::new(&scope, &env);

    let meta = scope.to_scope(Term::MetaVar(Span::Empty, keel::env::Level::first()));
    let error = checker.infer(meta).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::UnexpectedMetaVar)
    ));

    let sentinel = scope.to_scope(Term::Error(Span::Empty));
    let error = checker.infer(sentinel).unwrap_err();
    assert!(matches!(
        error.kind(),
        KernelErrorKind::IllTyped(IllTyped::ReportedError)
    ));
}
