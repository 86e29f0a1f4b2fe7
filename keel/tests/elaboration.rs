//! Integration tests for the elaborator: bidirectional checking, implicit
//! and instance arguments, coercions, structure literals, tactic blocks, and
//! the kernel round trip.

use std::cell::RefCell;

use scoped_arena::Scope;

use keel::core::global::Environment;
use keel::core::typing::{add_declaration, NewDeclaration, TypeChecker};
use keel::core::universe::ULevel;
use keel::core::{Literal, Name, Plicity, Term as CoreTerm};
use keel::env::Index;
use keel::options::{ElabConfig, Options};
use keel::source::{ByteRange, Span, StringId};
use keel::surface::elaboration::{Context, FlycheckSink, GoalSnapshot, Message, MetaSource};
use keel::surface::{Arg, Pattern, Tactic, Term};
use keel::StringInterner;

fn range() -> ByteRange {
    ByteRange::new(0, 1)
}

fn intern(interner: &RefCell<StringInterner>, string: &str) -> StringId {
    interner.borrow_mut().get_or_intern(string)
}

fn sort<'arena>(scope: &'arena Scope<'arena>, level: u32) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::Sort(Span::Empty, ULevel::lit(scope, level)))
}

fn pi<'arena>(
    scope: &'arena Scope<'arena>,
    plicity: Plicity,
    dom: &'arena CoreTerm<'arena>,
    cod: &'arena CoreTerm<'arena>,
) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::FunType(Span::Empty, plicity, None, dom, cod))
}

fn lam<'arena>(
    scope: &'arena Scope<'arena>,
    plicity: Plicity,
    body: &'arena CoreTerm<'arena>,
) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::FunLit(Span::Empty, plicity, None, body))
}

fn app<'arena>(
    scope: &'arena Scope<'arena>,
    plicity: Plicity,
    fun: &'arena CoreTerm<'arena>,
    arg: &'arena CoreTerm<'arena>,
) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::FunApp(Span::Empty, plicity, fun, arg))
}

fn var<'arena>(scope: &'arena Scope<'arena>, index: u32) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::LocalVar(Span::Empty, Index::last().shifted(index)))
}

fn cst<'arena>(scope: &'arena Scope<'arena>, name: Name) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::Const(Span::Empty, name, &[]))
}

fn nat<'arena>(scope: &'arena Scope<'arena>, number: u64) -> &'arena CoreTerm<'arena> {
    scope.to_scope(CoreTerm::Lit(Span::Empty, Literal::Nat(number)))
}

fn axiom<'arena>(
    interner: &RefCell<StringInterner>,
    scope: &'arena Scope<'arena>,
    env: &Environment<'arena>,
    name: &str,
    r#type: &'arena CoreTerm<'arena>,
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
fn synthesises_sorts_and_arrows() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let (term, r#type) = ctx.elaborate(&Term::Sort(range(), 0));
    assert!(!ctx.has_errors());
    assert!(term.alpha_eq(sort(&scope, 0)));
    assert!(ctx.quote(&r#type).alpha_eq(sort(&scope, 1)));

    // Sort 0 -> Sort 0 lives in Sort 1: imax(1, 1) = 1.
    let dom = scope.to_scope(Term::Sort(range(), 0));
    let arrow = Term::Arrow(range(), dom, dom);
    let (_, r#type) = ctx.elaborate(&arrow);
    assert!(!ctx.has_errors());
    assert!(ctx.quote(&r#type).alpha_eq(sort(&scope, 1)));
}

#[test]
fn unknown_names_get_suggestions() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "foo", sort(&scope, 1));
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let (term, _) = ctx.elaborate(&Term::Name(range(), intern(&interner, "fop")));
    assert!(term.is_error());

    let messages: Vec<Message> = ctx.drain_messages().collect();
    match &messages[..] {
        [Message::UnknownName { suggestion, .. }] => {
            assert_eq!(*suggestion, Some(intern(&interner, "foo")));
        }
        other => panic!("unexpected messages: {:?}", other),
    }
}

#[test]
fn implicit_arguments_are_inserted_and_solved() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;

    // id : {A : Sort 1} -> A -> A
    let id_type = pi(
        &scope,
        Plicity::Implicit,
        sort(&scope, 1),
        pi(&scope, Plicity::Explicit, var(&scope, 0), var(&scope, 1)),
    );
    let env = axiom(&interner, &scope, &env, "id", id_type);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // id 2
    let head = scope.to_scope(Term::Name(range(), intern(&interner, "id")));
    let args = scope.to_scope_from_iter([Arg {
        plicity: Plicity::Explicit,
        term: Term::NumberLiteral(range(), 2),
    }]);
    let (term, r#type) = ctx.elaborate(&Term::FunElim(range(), head, args));
    assert!(!ctx.has_errors());

    // The implicit argument was solved to Nat by unifying against `2 : Nat`.
    let expected = app(
        &scope,
        Plicity::Explicit,
        app(
            &scope,
            Plicity::Implicit,
            cst(&scope, Name::intern(&interner, "id")),
            cst(&scope, nat_name),
        ),
        nat(&scope, 2),
    );
    assert!(term.alpha_eq(expected));
    assert!(ctx.quote(&r#type).alpha_eq(cst(&scope, nat_name)));
}

#[test]
fn unassigned_metavariables_are_reported() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);

    let mut ctx = Context::new(&interner, &scope, env.clone(), ElabConfig::default());
    ctx.elaborate(&Term::Placeholder(range()));
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(matches!(
        &messages[..],
        [Message::UnsolvedMeta {
            source: MetaSource::PlaceholderExpr(_),
        }]
    ));

    // With deferred checking, leftover metavariables are not an error.
    let config = ElabConfig::new(&Options::new(), false);
    let mut ctx = Context::new(&interner, &scope, env, config);
    ctx.elaborate(&Term::Placeholder(range()));
    assert!(!ctx.has_errors());
    assert_eq!(ctx.drain_messages().count(), 0);
}

#[test]
fn holes_report_their_solutions() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // (2 : ?T) solves ?T to Nat.
    let hole_name = intern(&interner, "T");
    let expr = scope.to_scope(Term::NumberLiteral(range(), 2));
    let hole = scope.to_scope(Term::Hole(range(), hole_name));
    let (term, _) = ctx.elaborate(&Term::Ann(range(), expr, hole));
    assert!(!ctx.has_errors());
    assert!(term.alpha_eq(nat(&scope, 2)));

    let messages: Vec<Message> = ctx.drain_messages().collect();
    match &messages[..] {
        [Message::HoleSolution { name, expr, .. }] => {
            assert_eq!(*name, hole_name);
            assert!(!expr.is_empty());
        }
        other => panic!("unexpected messages: {:?}", other),
    }
}

#[test]
fn structure_literals_solve_omitted_fields() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // { A : Sort 1, a : A }
    let a_label = intern(&interner, "A");
    let field_label = intern(&interner, "a");
    let labels = scope.to_scope_from_iter([a_label, field_label]);
    let types = scope.to_scope_from_iter([
        CoreTerm::Sort(Span::Empty, ULevel::lit(&scope, 1)),
        CoreTerm::LocalVar(Span::Empty, Index::last()),
    ]);
    let record_type = scope.to_scope(CoreTerm::RecordType(Span::Empty, labels, types));
    let expected_type = ctx.eval(record_type);

    // { a = 2 }: the omitted `A` is solved to Nat by the supplied field.
    let fields = scope.to_scope_from_iter([(
        (range(), field_label),
        Term::NumberLiteral(range(), 2),
    )]);
    let term = ctx.elaborate_check(&Term::RecordLiteral(range(), fields), &expected_type);
    assert!(!ctx.has_errors());

    let exprs = scope.to_scope_from_iter([
        CoreTerm::Const(Span::Empty, nat_name, &[]),
        CoreTerm::Lit(Span::Empty, Literal::Nat(2)),
    ]);
    let expected = scope.to_scope(CoreTerm::RecordLit(Span::Empty, labels, exprs));
    assert!(term.alpha_eq(expected));
}

#[test]
fn missing_fields_can_be_hard_errors() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;

    let mut config = ElabConfig::default();
    config.fail_missing_field = true;
    let mut ctx = Context::new(&interner, &scope, env, config);

    // { x : Nat, y : Nat } checked against { x = 2 }.
    let x_label = intern(&interner, "x");
    let y_label = intern(&interner, "y");
    let labels = scope.to_scope_from_iter([x_label, y_label]);
    let types = scope.to_scope_from_iter([
        CoreTerm::Const(Span::Empty, nat_name, &[]),
        CoreTerm::Const(Span::Empty, nat_name, &[]),
    ]);
    let record_type = scope.to_scope(CoreTerm::RecordType(Span::Empty, labels, types));
    let expected_type = ctx.eval(record_type);

    let fields =
        scope.to_scope_from_iter([((range(), x_label), Term::NumberLiteral(range(), 2))]);
    ctx.elaborate_check(&Term::RecordLiteral(range(), fields), &expected_type);

    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::MissingRecordField { label, .. } if *label == y_label)));
}

#[test]
fn stray_fields_are_reported() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let x_label = intern(&interner, "x");
    let z_label = intern(&interner, "z");
    let labels = scope.to_scope_from_iter([x_label]);
    let types = scope.to_scope_from_iter([CoreTerm::Const(Span::Empty, nat_name, &[])]);
    let record_type = scope.to_scope(CoreTerm::RecordType(Span::Empty, labels, types));
    let expected_type = ctx.eval(record_type);

    let fields = scope.to_scope_from_iter([
        ((range(), x_label), Term::NumberLiteral(range(), 2)),
        ((range(), z_label), Term::NumberLiteral(range(), 3)),
    ]);
    ctx.elaborate_check(&Term::RecordLiteral(range(), fields), &expected_type);

    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::MismatchedFieldLabels { .. })));
}

/// Declare `Show : Sort 1 -> Sort 1`, `showNat : Show Nat` (registered as an
/// instance), and `print : {A : Sort 1} -> [Show A] -> A -> Nat`.
fn declare_show<'arena>(
    interner: &RefCell<StringInterner>,
    scope: &'arena Scope<'arena>,
    env: &Environment<'arena>,
    register: bool,
) -> Environment<'arena> {
    let nat_name = env.prims().nat;
    let env = axiom(
        interner,
        scope,
        env,
        "Show",
        pi(scope, Plicity::Explicit, sort(scope, 1), sort(scope, 1)),
    );
    let show = Name::intern(interner, "Show");

    let show_nat = app(
        scope,
        Plicity::Explicit,
        cst(scope, show),
        cst(scope, nat_name),
    );
    let env = axiom(interner, scope, &env, "showNat", show_nat);
    let env = match register {
        true => env
            .register_instance(Name::intern(interner, "showNat"), 0)
            .unwrap(),
        false => env,
    };

    let print_type = pi(
        scope,
        Plicity::Implicit,
        sort(scope, 1),
        pi(
            scope,
            Plicity::Instance,
            app(scope, Plicity::Explicit, cst(scope, show), var(scope, 0)),
            pi(
                scope,
                Plicity::Explicit,
                var(scope, 1),
                cst(scope, nat_name),
            ),
        ),
    );
    axiom(interner, scope, &env, "print", print_type)
}

fn print_two<'arena>(
    interner: &RefCell<StringInterner>,
    scope: &'arena Scope<'arena>,
) -> Term<'arena, ByteRange> {
    let head = scope.to_scope(Term::Name(range(), intern(interner, "print")));
    let args = scope.to_scope_from_iter([Arg {
        plicity: Plicity::Explicit,
        term: Term::NumberLiteral(range(), 2),
    }]);
    Term::FunElim(range(), head, args)
}

#[test]
fn instance_arguments_are_resolved() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let env = declare_show(&interner, &scope, &env, true);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let (term, r#type) = ctx.elaborate(&print_two(&interner, &scope));
    assert!(!ctx.has_errors());

    let expected = app(
        &scope,
        Plicity::Explicit,
        app(
            &scope,
            Plicity::Instance,
            app(
                &scope,
                Plicity::Implicit,
                cst(&scope, Name::intern(&interner, "print")),
                cst(&scope, nat_name),
            ),
            cst(&scope, Name::intern(&interner, "showNat")),
        ),
        nat(&scope, 2),
    );
    assert!(term.alpha_eq(expected));
    assert!(ctx.quote(&r#type).alpha_eq(cst(&scope, nat_name)));
}

#[test]
fn instance_resolution_reports_failures() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = declare_show(&interner, &scope, &env, false);

    // No instance registered for `Show`. The failed search is reported
    // exactly once, not again by the unsolved-metavariable scan.
    let mut ctx = Context::new(&interner, &scope, env.clone(), ElabConfig::default());
    ctx.elaborate(&print_two(&interner, &scope));
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::UnresolvedInstance { .. })));
    assert_eq!(
        messages
            .iter()
            .filter(|message| matches!(
                message,
                Message::UnresolvedInstance { .. }
                    | Message::UnsolvedMeta {
                        source: MetaSource::InstanceArg(_),
                    }
            ))
            .count(),
        1
    );

    // With resolution disabled the metavariable is simply left unassigned.
    let mut config = ElabConfig::default();
    config.ignore_instances = true;
    let mut ctx = Context::new(&interner, &scope, env, config);
    ctx.elaborate(&print_two(&interner, &scope));
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages.iter().any(|message| matches!(
        message,
        Message::UnsolvedMeta {
            source: MetaSource::InstanceArg(_),
        }
    )));
}

#[test]
fn local_hypotheses_resolve_instances() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    // No registered instances; the hypothesis must be found instead.
    let env = declare_show(&interner, &scope, &env, false);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // print 2 checked against [Show Nat] -> Nat: the elaborator binds the
    // instance hypothesis and resolution picks it up.
    let goal = pi(
        &scope,
        Plicity::Instance,
        app(
            &scope,
            Plicity::Explicit,
            cst(&scope, Name::intern(&interner, "Show")),
            cst(&scope, nat_name),
        ),
        cst(&scope, nat_name),
    );
    let goal = ctx.eval(goal);
    let term = ctx.elaborate_check(&print_two(&interner, &scope), &goal);
    assert!(!ctx.has_errors());

    let expected = lam(
        &scope,
        Plicity::Instance,
        app(
            &scope,
            Plicity::Explicit,
            app(
                &scope,
                Plicity::Instance,
                app(
                    &scope,
                    Plicity::Implicit,
                    cst(&scope, Name::intern(&interner, "print")),
                    cst(&scope, nat_name),
                ),
                var(&scope, 0),
            ),
            nat(&scope, 2),
        ),
    );
    assert!(term.alpha_eq(expected));
}

#[test]
fn coercions_are_inserted() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "A", sort(&scope, 1));
    let env = axiom(&interner, &scope, &env, "B", sort(&scope, 1));
    let a_type = cst(&scope, Name::intern(&interner, "A"));
    let b_type = cst(&scope, Name::intern(&interner, "B"));
    let env = axiom(
        &interner,
        &scope,
        &env,
        "up",
        pi(&scope, Plicity::Explicit, a_type, b_type),
    );
    let env = env.register_coercion(Name::intern(&interner, "up")).unwrap();
    let env = axiom(&interner, &scope, &env, "a", a_type);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let expected_type = ctx.eval(b_type);
    let term = ctx.elaborate_check(&Term::Name(range(), intern(&interner, "a")), &expected_type);
    assert!(!ctx.has_errors());

    let expected = app(
        &scope,
        Plicity::Explicit,
        cst(&scope, Name::intern(&interner, "up")),
        cst(&scope, Name::intern(&interner, "a")),
    );
    assert!(term.alpha_eq(expected));
}

#[test]
fn coercions_lift_over_functions() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let nat_type = cst(&scope, nat_name);
    let env = axiom(&interner, &scope, &env, "A", sort(&scope, 1));
    let env = axiom(&interner, &scope, &env, "B", sort(&scope, 1));
    let a_type = cst(&scope, Name::intern(&interner, "A"));
    let b_type = cst(&scope, Name::intern(&interner, "B"));
    let env = axiom(
        &interner,
        &scope,
        &env,
        "up",
        pi(&scope, Plicity::Explicit, a_type, b_type),
    );
    let env = env.register_coercion(Name::intern(&interner, "up")).unwrap();
    let env = axiom(
        &interner,
        &scope,
        &env,
        "f",
        pi(&scope, Plicity::Explicit, nat_type, a_type),
    );

    // f : Nat -> A checked against Nat -> B becomes fun x => up (f x).
    let goal = pi(&scope, Plicity::Explicit, nat_type, b_type);
    let mut ctx = Context::new(&interner, &scope, env.clone(), ElabConfig::default());
    let goal_value = ctx.eval(goal);
    let term = ctx.elaborate_check(&Term::Name(range(), intern(&interner, "f")), &goal_value);
    assert!(!ctx.has_errors());

    let expected = lam(
        &scope,
        Plicity::Explicit,
        app(
            &scope,
            Plicity::Explicit,
            cst(&scope, Name::intern(&interner, "up")),
            app(
                &scope,
                Plicity::Explicit,
                cst(&scope, Name::intern(&interner, "f")),
                var(&scope, 0),
            ),
        ),
    );
    assert!(term.alpha_eq(expected));

    // With lifting disabled the mismatch is reported instead.
    let mut config = ElabConfig::default();
    config.lift_coercions = false;
    let mut ctx = Context::new(&interner, &scope, env, config);
    let goal_value = ctx.eval(goal);
    ctx.elaborate_check(&Term::Name(range(), intern(&interner, "f")), &goal_value);
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::FailedToUnify { .. })));
}

#[test]
fn tactic_blocks_build_terms() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let env = axiom(&interner, &scope, &env, "A", sort(&scope, 1));
    let a_type = cst(&scope, Name::intern(&interner, "A"));
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // by intro x; assumption : A -> A
    let goal = pi(&scope, Plicity::Explicit, a_type, a_type);
    let goal_value = ctx.eval(goal);
    let steps = scope.to_scope_from_iter([
        Tactic::Intro(range(), Some(intern(&interner, "x"))),
        Tactic::Assumption(range()),
    ]);
    let term = ctx.elaborate_check(&Term::Tactics(range(), steps), &goal_value);
    assert!(!ctx.has_errors());
    assert!(term.alpha_eq(lam(&scope, Plicity::Explicit, var(&scope, 0))));

    // by exact 2 : Nat
    let nat_goal = ctx.eval(cst(&scope, nat_name));
    let two = scope.to_scope(Term::NumberLiteral(range(), 2));
    let steps = scope.to_scope_from_iter([Tactic::Exact(range(), two)]);
    let term = ctx.elaborate_check(&Term::Tactics(range(), steps), &nat_goal);
    assert!(!ctx.has_errors());
    assert!(term.alpha_eq(nat(&scope, 2)));
}

struct CollectGoals(Vec<GoalSnapshot>);

impl FlycheckSink for CollectGoals {
    fn goal(&mut self, snapshot: &GoalSnapshot) {
        self.0.push(snapshot.clone());
    }
}

#[test]
fn flycheck_emits_goal_snapshots() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let env = axiom(&interner, &scope, &env, "A", sort(&scope, 1));
    let a_type = cst(&scope, Name::intern(&interner, "A"));

    let mut config = ElabConfig::default();
    config.flycheck_goals = true;
    let mut sink = CollectGoals(Vec::new());
    {
        let mut ctx = Context::new(&interner, &scope, env, config).with_flycheck(&mut sink);
        let goal = pi(&scope, Plicity::Explicit, a_type, a_type);
        let goal_value = ctx.eval(goal);
        let x_name = intern(&interner, "x");
        let steps = scope.to_scope_from_iter([
            Tactic::Intro(range(), Some(x_name)),
            Tactic::Assumption(range()),
        ]);
        ctx.elaborate_check(&Term::Tactics(range(), steps), &goal_value);
        assert!(!ctx.has_errors());
    }

    // One snapshot per tactic step.
    assert_eq!(sink.0.len(), 2);
    assert!(sink.0[0].hypotheses.is_empty());
    assert!(!sink.0[0].goal.is_empty());
    assert_eq!(sink.0[1].hypotheses.len(), 1);
    assert_eq!(sink.0[1].hypotheses[0].0, Some(intern(&interner, "x")));
}

#[test]
fn unfinished_tactic_blocks_leave_goals_open() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let nat_goal = ctx.eval(cst(&scope, nat_name));
    ctx.elaborate_check(&Term::Tactics(range(), &[]), &nat_goal);
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages.iter().any(|message| matches!(
        message,
        Message::UnsolvedMeta {
            source: MetaSource::TacticGoal(_),
        }
    )));

    // `intro` against a non-function goal is an error.
    let steps = scope.to_scope_from_iter([Tactic::Intro(range(), None)]);
    ctx.elaborate_check(&Term::Tactics(range(), steps), &nat_goal);
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::GoalNotAFunction { .. })));

    // A tactic block cannot synthesise its own goal.
    ctx.elaborate(&Term::Tactics(range(), &[]));
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::AmbiguousTacticBlock { .. })));
}

#[test]
fn record_projections_synthesise_field_types() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;

    let x_label = intern(&interner, "x");
    let y_label = intern(&interner, "y");
    let labels = scope.to_scope_from_iter([x_label, y_label]);
    let types = scope.to_scope_from_iter([
        CoreTerm::Const(Span::Empty, nat_name, &[]),
        CoreTerm::Const(Span::Empty, nat_name, &[]),
    ]);
    let record_type = scope.to_scope(CoreTerm::RecordType(Span::Empty, labels, types));
    let env = axiom(&interner, &scope, &env, "pt", record_type);
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    let head = scope.to_scope(Term::Name(range(), intern(&interner, "pt")));
    let (term, r#type) = ctx.elaborate(&Term::RecordProj(range(), head, (range(), y_label)));
    assert!(!ctx.has_errors());
    let pt = cst(&scope, Name::intern(&interner, "pt"));
    let expected = scope.to_scope(CoreTerm::RecordProj(Span::Empty, pt, y_label));
    assert!(term.alpha_eq(expected));
    assert!(ctx.quote(&r#type).alpha_eq(cst(&scope, nat_name)));

    // Projecting a label the record does not have.
    let z_label = intern(&interner, "z");
    let (term, _) = ctx.elaborate(&Term::RecordProj(range(), head, (range(), z_label)));
    assert!(term.is_error());
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::UnknownField { label, .. } if *label == z_label)));
}

#[test]
fn plicity_and_arity_errors() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_type = cst(&scope, env.prims().nat);
    let env = axiom(
        &interner,
        &scope,
        &env,
        "f",
        pi(&scope, Plicity::Explicit, nat_type, nat_type),
    );
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // An implicit argument supplied to an explicit parameter.
    let head = scope.to_scope(Term::Name(range(), intern(&interner, "f")));
    let args = scope.to_scope_from_iter([Arg {
        plicity: Plicity::Implicit,
        term: Term::NumberLiteral(range(), 2),
    }]);
    ctx.elaborate(&Term::FunElim(range(), head, args));
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::PlicityMismatch { .. })));

    // An argument applied to a non-function.
    let head = scope.to_scope(Term::NumberLiteral(range(), 2));
    let args = scope.to_scope_from_iter([Arg {
        plicity: Plicity::Explicit,
        term: Term::NumberLiteral(range(), 3),
    }]);
    ctx.elaborate(&Term::FunElim(range(), head, args));
    let messages: Vec<Message> = ctx.drain_messages().collect();
    assert!(messages
        .iter()
        .any(|message| matches!(message, Message::UnexpectedArgument { .. })));
}

#[test]
fn checking_inserts_implicit_lambdas() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let mut ctx = Context::new(&interner, &scope, env, ElabConfig::default());

    // 2 checked against {A : Sort 1} -> Nat.
    let goal = pi(
        &scope,
        Plicity::Implicit,
        sort(&scope, 1),
        cst(&scope, nat_name),
    );
    let goal_value = ctx.eval(goal);
    let term = ctx.elaborate_check(&Term::NumberLiteral(range(), 2), &goal_value);
    assert!(!ctx.has_errors());
    assert!(term.alpha_eq(lam(&scope, Plicity::Implicit, nat(&scope, 2))));
}

#[test]
fn elaborated_output_passes_the_kernel() {
    let interner = RefCell::new(StringInterner::new());
    let scope = Scope::new();
    let env = Environment::new(&interner, &scope);
    let nat_name = env.prims().nat;
    let nat_type = cst(&scope, nat_name);
    let mut ctx = Context::new(&interner, &scope, env.clone(), ElabConfig::default());

    // fun (x : Nat) => x
    let x_name = intern(&interner, "x");
    let nat_ann = scope.to_scope(Term::Name(range(), intern(&interner, "Nat")));
    let x_pattern = scope.to_scope(Pattern::Name(range(), x_name));
    let pattern = scope.to_scope(Pattern::Ann(range(), x_pattern, nat_ann));
    let body = scope.to_scope(Term::Name(range(), x_name));
    let fun = scope.to_scope(Term::FunLiteral(range(), Plicity::Explicit, pattern, body));
    let (fun_term, _) = ctx.elaborate(fun);
    assert!(!ctx.has_errors());

    // The kernel re-checks the elaborated function against its type.
    let fun_term = scope.to_scope(fun_term);
    let mut checker = TypeChecker::new(&scope, &env);
    checker
        .check(fun_term, pi(&scope, Plicity::Explicit, nat_type, nat_type))
        .unwrap();

    // (fun (x : Nat) => x) 2 normalises to 2 during finalisation, and the
    // kernel agrees about its type.
    let args = scope.to_scope_from_iter([Arg {
        plicity: Plicity::Explicit,
        term: Term::NumberLiteral(range(), 2),
    }]);
    let (app_term, _) = ctx.elaborate(&Term::FunElim(range(), fun, args));
    assert!(!ctx.has_errors());
    assert!(app_term.alpha_eq(nat(&scope, 2)));
    let app_term = scope.to_scope(app_term);
    let r#type = checker.infer(app_term).unwrap();
    assert!(checker.is_def_eq(r#type, nat_type).unwrap());
}
