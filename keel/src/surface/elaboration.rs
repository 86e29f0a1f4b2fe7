//! Elaboration of the surface language into the core language.
//!
//! This module is where user-facing concerns live: bidirectional type
//! checking against the [core language][crate::core], insertion of implicit
//! and instance arguments, metavariables and [pattern unification]
//! [unification], [instance resolution][instances], [coercions][coercion],
//! structure literals, and a small tactic language. The output is a core
//! term that the kernel re-checks from scratch before anything is committed
//! to an environment; nothing here is trusted.
//!
//! Elaboration is structured around a [`Context`] holding a snapshot of the
//! declaration environment, a local environment of bindings, and a
//! metavariable environment. Metavariables are inserted with
//! [`core::Term::InsertedMeta`], closing over the parameters of the local
//! context they were created in, and are solved by unification or (for
//! instance-kind metavariables) by a deferred instance search. After the
//! top-level term is elaborated, pending instance problems are resolved,
//! solved metavariables are substituted into the output, and leftover
//! metavariables are reported or kept depending on the session
//! configuration.

use std::cell::RefCell;
use std::sync::Arc;

use fxhash::FxHashMap;
use scoped_arena::Scope;

use crate::alloc::SliceVec;
use crate::core::global::Environment;
use crate::core::semantics::{
    ArcValue, Closure, ConversionEnv, Elim, ElimEnv, EvalEnv, QuoteEnv, Telescope, Value,
};
use crate::core::universe::ULevel;
use crate::core::{self, pretty, LocalInfo, Literal, Name, Plicity};
use crate::env::{self, EnvLen, Index, Level, SharedEnv, UniqueEnv};
use crate::options::ElabConfig;
use crate::source::{ByteRange, Span, StringId, StringInterner};
use crate::surface::{Arg, Pattern, Tactic, Term};

mod coercion;
pub mod instances;
pub mod reporting;
pub mod unification;

pub use reporting::Message;

/// The reason why a metavariable was inserted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MetaSource {
    /// The type of a hole.
    HoleType(ByteRange, StringId),
    /// The expression of a hole.
    HoleExpr(ByteRange, StringId),
    /// The type of a placeholder.
    PlaceholderType(ByteRange),
    /// The expression of a placeholder.
    PlaceholderExpr(ByteRange),
    /// An implicit argument inserted at an application head.
    ImplicitArg(ByteRange, Option<StringId>),
    /// An instance argument inserted at an application head, to be solved by
    /// instance resolution.
    InstanceArg(ByteRange),
    /// A structure literal field the user did not supply.
    MissingRecordField(ByteRange, StringId),
    /// A goal left open at the end of a tactic block.
    TacticGoal(ByteRange),
    /// The type of an expression that failed to elaborate.
    ReportedErrorType(ByteRange),
}

impl MetaSource {
    pub fn range(&self) -> ByteRange {
        match self {
            MetaSource::HoleType(range, _)
            | MetaSource::HoleExpr(range, _)
            | MetaSource::PlaceholderType(range)
            | MetaSource::PlaceholderExpr(range)
            | MetaSource::ImplicitArg(range, _)
            | MetaSource::InstanceArg(range)
            | MetaSource::MissingRecordField(range, _)
            | MetaSource::TacticGoal(range)
            | MetaSource::ReportedErrorType(range) => *range,
        }
    }

    /// Type-level sources accompany an expression metavariable that will be
    /// reported in its place, so they are not reported themselves.
    fn is_reported(&self) -> bool {
        !matches!(
            self,
            MetaSource::HoleType(..)
                | MetaSource::PlaceholderType(..)
                | MetaSource::ReportedErrorType(..)
        )
    }
}

/// A snapshot of an open goal, rendered for an interactive front end.
#[derive(Debug, Clone)]
pub struct GoalSnapshot {
    pub range: ByteRange,
    /// Hypotheses in binding order, outermost first.
    pub hypotheses: Vec<(Option<StringId>, String)>,
    pub goal: String,
}

/// A sink for goal snapshots emitted during tactic elaboration when
/// [`ElabConfig::flycheck_goals`] is set.
pub trait FlycheckSink {
    fn goal(&mut self, snapshot: &GoalSnapshot);
}

/// Elaborated type information recorded for names and holes.
#[derive(Debug, Clone)]
pub struct TermInfo {
    pub r#type: String,
}

/// A write-only collector of `(range, info)` pairs, for editor tooling.
pub trait InfoCollector {
    fn record(&mut self, range: ByteRange, info: TermInfo);
}

/// The local environment of the elaborator, laid out as parallel columns.
#[derive(Clone)]
struct LocalEnv<'arena> {
    /// Names of bindings, if any.
    names: UniqueEnv<Option<StringId>>,
    /// Whether each binding is a definition or a parameter.
    infos: UniqueEnv<LocalInfo>,
    /// Types of bindings.
    types: UniqueEnv<ArcValue<'arena>>,
    /// Expressions that bindings evaluate to.
    exprs: SharedEnv<ArcValue<'arena>>,
}

impl<'arena> LocalEnv<'arena> {
    fn new() -> LocalEnv<'arena> {
        LocalEnv {
            names: UniqueEnv::new(),
            infos: UniqueEnv::new(),
            types: UniqueEnv::new(),
            exprs: SharedEnv::new(),
        }
    }

    fn len(&self) -> EnvLen {
        self.exprs.len()
    }

    /// Push a definition onto the local environment.
    fn push_def(
        &mut self,
        name: Option<StringId>,
        expr: ArcValue<'arena>,
        r#type: ArcValue<'arena>,
    ) {
        self.names.push(name);
        self.infos.push(LocalInfo::Def);
        self.types.push(r#type);
        self.exprs.push(expr);
    }

    /// Push a parameter onto the local environment, returning the fresh
    /// variable it is bound to.
    fn push_param(&mut self, name: Option<StringId>, r#type: ArcValue<'arena>) -> ArcValue<'arena> {
        let expr = Arc::new(Value::local_var(self.exprs.len().next_level()));
        self.names.push(name);
        self.infos.push(LocalInfo::Param);
        self.types.push(r#type);
        self.exprs.push(expr.clone());
        expr
    }

    fn pop(&mut self) {
        self.names.pop();
        self.infos.pop();
        self.types.pop();
        self.exprs.pop();
    }

    fn truncate(&mut self, len: EnvLen) {
        self.names.truncate(len);
        self.infos.truncate(len);
        self.types.truncate(len);
        self.exprs.truncate(len);
    }
}

/// The metavariable environment of an elaboration session.
struct MetaEnv<'arena> {
    /// Why each metavariable was inserted.
    sources: UniqueEnv<MetaSource>,
    /// Types of metavariables.
    types: UniqueEnv<ArcValue<'arena>>,
    /// Solutions, if found so far.
    exprs: UniqueEnv<Option<ArcValue<'arena>>>,
}

impl<'arena> MetaEnv<'arena> {
    fn new() -> MetaEnv<'arena> {
        MetaEnv {
            sources: UniqueEnv::new(),
            types: UniqueEnv::new(),
            exprs: UniqueEnv::new(),
        }
    }

    /// Push an unsolved metavariable, returning its variable.
    fn push(&mut self, source: MetaSource, r#type: ArcValue<'arena>) -> Level {
        let var = self.exprs.len().next_level();
        self.sources.push(source);
        self.types.push(r#type);
        self.exprs.push(None);
        var
    }

    /// Record the solved/unsolved state of every metavariable, so that an
    /// attempted instance candidate can be rolled back.
    fn save(&self) -> (EnvLen, Vec<bool>) {
        let solved = self.exprs.iter().map(Option::is_some).collect();
        (self.exprs.len(), solved)
    }

    /// Undo solutions and metavariables introduced since `save`.
    fn restore(&mut self, (len, solved): (EnvLen, Vec<bool>)) {
        self.sources.truncate(len);
        self.types.truncate(len);
        self.exprs.truncate(len);
        for (var, was_solved) in Iterator::zip(env::levels(), solved.into_iter()) {
            if !was_solved {
                self.exprs.set_level(var, None);
            }
        }
    }
}

/// An instance-kind metavariable waiting for resolution, together with the
/// local environment it was created in.
struct PendingInstance<'arena> {
    var: Level,
    range: ByteRange,
    r#type: ArcValue<'arena>,
    local_env: LocalEnv<'arena>,
    /// The parameters of the local environment, as the spine the inserted
    /// metavariable is applied to. A found instance is turned into a
    /// solution for the metavariable through pattern unification against
    /// this spine.
    spine: Vec<Elim<'arena>>,
}

/// Elaboration context.
pub struct Context<'interner, 'arena, 'env> {
    /// Global string interner.
    interner: &'interner RefCell<StringInterner>,
    /// Scoped arena for storing elaborated terms.
    scope: &'arena Scope<'arena>,
    /// A snapshot of the declaration environment. Persistent: commits made
    /// elsewhere during the session are not observed.
    env: Environment<'arena>,
    /// Frozen session configuration.
    config: ElabConfig,
    /// The local environment.
    local_env: LocalEnv<'arena>,
    /// The metavariable environment.
    meta_env: MetaEnv<'arena>,
    /// A partial renaming to be used during pattern unification.
    renaming: unification::PartialRenaming,
    /// Instance problems queued for resolution after the top-level term.
    pending_instances: Vec<PendingInstance<'arena>>,
    /// Instance metavariables whose failed resolution has already produced
    /// an [`UnresolvedInstance`][Message::UnresolvedInstance] message, so
    /// the unsolved-metavariable scan does not report them a second time.
    reported_instances: Vec<Level>,
    /// Diagnostic messages collected during elaboration.
    messages: Vec<Message>,
    flycheck: Option<&'env mut dyn FlycheckSink>,
    info: Option<&'env mut dyn InfoCollector>,
}

impl<'interner, 'arena, 'env> Context<'interner, 'arena, 'env> {
    /// Construct a new elaboration context over an environment snapshot.
    pub fn new(
        interner: &'interner RefCell<StringInterner>,
        scope: &'arena Scope<'arena>,
        env: Environment<'arena>,
        config: ElabConfig,
    ) -> Context<'interner, 'arena, 'env> {
        Context {
            interner,
            scope,
            env,
            config,
            local_env: LocalEnv::new(),
            meta_env: MetaEnv::new(),
            renaming: unification::PartialRenaming::new(),
            pending_instances: Vec::new(),
            reported_instances: Vec::new(),
            messages: Vec::new(),
            flycheck: None,
            info: None,
        }
    }

    pub fn with_flycheck(mut self, sink: &'env mut dyn FlycheckSink) -> Self {
        self.flycheck = Some(sink);
        self
    }

    pub fn with_info(mut self, collector: &'env mut dyn InfoCollector) -> Self {
        self.info = Some(collector);
        self
    }

    pub fn config(&self) -> &ElabConfig {
        &self.config
    }

    pub fn drain_messages(&mut self) -> impl '_ + Iterator<Item = Message> {
        self.messages.drain(..)
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }

    fn elim_env(&self) -> ElimEnv<'arena, '_> {
        ElimEnv::new(self.scope, &self.env, &self.meta_env.exprs)
    }

    fn eval_env(&mut self) -> EvalEnv<'arena, '_> {
        let elim_env = ElimEnv::new(self.scope, &self.env, &self.meta_env.exprs);
        EvalEnv::new(elim_env, &mut self.local_env.exprs)
    }

    fn quote_env(&self) -> QuoteEnv<'arena, '_> {
        QuoteEnv::new(self.elim_env(), self.local_env.len())
    }

    fn conversion_env(&self) -> ConversionEnv<'arena, '_> {
        ConversionEnv::new(self.elim_env(), self.local_env.len())
    }

    fn unification_context(&mut self) -> unification::Context<'arena, '_> {
        unification::Context::new(
            self.scope,
            &mut self.renaming,
            &self.env,
            self.local_env.len(),
            &mut self.meta_env.exprs,
        )
    }

    /// Evaluate a core term in the current local environment.
    pub fn eval(&mut self, term: &core::Term<'arena>) -> ArcValue<'arena> {
        self.eval_env().eval(term)
    }

    /// Quote a value back into a core term at the current binding depth.
    pub fn quote(&mut self, value: &ArcValue<'arena>) -> core::Term<'arena> {
        self.quote_env().quote(value)
    }

    /// Render a value for a diagnostic message.
    fn pretty_value(&mut self, value: &ArcValue<'arena>) -> String {
        let term = self.quote_env().quote(value);
        pretty::render(self.interner, &term)
    }

    fn sort(&self, level: u32) -> ArcValue<'arena> {
        Arc::new(Value::Sort(ULevel::lit(self.scope, level)))
    }

    fn record_info(&mut self, range: ByteRange, r#type: &ArcValue<'arena>) {
        if self.info.is_none() {
            return;
        }
        let rendered = self.pretty_value(r#type);
        if let Some(collector) = &mut self.info {
            collector.record(range, TermInfo { r#type: rendered });
        }
    }

    /// Push an unsolved metavariable onto the context, as a term closing
    /// over the parameters of the local environment.
    fn push_unsolved_term(
        &mut self,
        span: Span,
        source: MetaSource,
        r#type: ArcValue<'arena>,
    ) -> core::Term<'arena> {
        let var = self.meta_env.push(source, r#type);
        let infos = self.scope.to_scope_from_iter(self.local_env.infos.iter().copied());
        core::Term::InsertedMeta(span, var, infos)
    }

    fn push_unsolved_value(
        &mut self,
        source: MetaSource,
        r#type: ArcValue<'arena>,
    ) -> ArcValue<'arena> {
        let term = self.push_unsolved_term(Span::Empty, source, r#type);
        self.eval_env().eval(&term)
    }

    /// Push an instance-kind metavariable and queue it as a pending instance
    /// problem, unless instance resolution is disabled for this session.
    fn push_instance_arg(&mut self, range: ByteRange, r#type: ArcValue<'arena>) -> core::Term<'arena> {
        let var = self.meta_env.push(MetaSource::InstanceArg(range), r#type.clone());
        let infos = self.scope.to_scope_from_iter(self.local_env.infos.iter().copied());
        if !self.config.ignore_instances {
            let spine = Iterator::zip(env::levels(), infos.iter())
                .filter(|(_, info)| matches!(info, LocalInfo::Param))
                .map(|(var, _)| Elim::FunApp(Plicity::Explicit, Arc::new(Value::local_var(var))))
                .collect();
            self.pending_instances.push(PendingInstance {
                var,
                range,
                r#type,
                local_env: self.local_env.clone(),
                spine,
            });
        }
        core::Term::InsertedMeta(Span::Empty, var, infos)
    }

    /// Look up a name in the local environment.
    fn get_local_name(&self, name: StringId) -> Option<(Index, ArcValue<'arena>)> {
        let mut entries = Iterator::zip(env::indices(), self.local_env.names.iter().rev());
        entries.find_map(|(index, entry)| match entry {
            Some(n) if *n == name => {
                let r#type = self.local_env.types.get_index(index)?.clone();
                Some((index, r#type))
            }
            _ => None,
        })
    }

    /// The closest name in scope, for "did you mean" suggestions.
    fn name_suggestion(&self, name: StringId) -> Option<StringId> {
        let interner = self.interner.borrow();
        let target = interner.resolve(name)?;
        let mut best: Option<(usize, StringId)> = None;

        let candidates = (self.local_env.names.iter().filter_map(|name| *name))
            .chain(self.env.names().map(Name::id));
        for candidate in candidates {
            if candidate == name {
                continue;
            }
            let text = match interner.resolve(candidate) {
                Some(text) => text,
                None => continue,
            };
            let distance = levenshtein::levenshtein(target, text);
            if distance <= 2 && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, candidate));
            }
        }
        best.map(|(_, candidate)| candidate)
    }

    /// Force a type, seeing through transparent definitions when the forced
    /// head is not already a function type.
    fn force_fun_type(&self, r#type: &ArcValue<'arena>) -> ArcValue<'arena> {
        let forced = self.elim_env().force(r#type);
        match forced.as_ref() {
            Value::FunType(..) => forced,
            _ => self.elim_env().force_and_unfold(&forced),
        }
    }

    fn synth_reported_error(&mut self, range: ByteRange) -> (core::Term<'arena>, ArcValue<'arena>) {
        let r#type =
            self.push_unsolved_value(MetaSource::ReportedErrorType(range), self.sort(1));
        (core::Term::Error(range.into()), r#type)
    }

    /// Elaborate a surface term in synthesis mode, then finish the session:
    /// resolve pending instance problems, report or keep unsolved
    /// metavariables per the configuration, and substitute solutions into
    /// the output.
    pub fn elaborate(
        &mut self,
        surface_term: &Term<'_, ByteRange>,
    ) -> (core::Term<'arena>, ArcValue<'arena>) {
        let (term, r#type) = self.synth(surface_term);
        let term = self.finalize(term);
        (term, r#type)
    }

    /// Elaborate a surface term against an expected type, then finish the
    /// session as [`Context::elaborate`] does.
    pub fn elaborate_check(
        &mut self,
        surface_term: &Term<'_, ByteRange>,
        expected: &ArcValue<'arena>,
    ) -> core::Term<'arena> {
        let term = self.check(surface_term, expected);
        self.finalize(term)
    }

    /// Elaborate a surface term that is expected to be a type, then finish
    /// the session. Returns the elaborated type and its universe level.
    pub fn elaborate_type(
        &mut self,
        surface_term: &Term<'_, ByteRange>,
    ) -> (core::Term<'arena>, ULevel<'arena>) {
        let (term, level) = self.synth_type(surface_term);
        let term = self.finalize(term);
        (term, level)
    }

    fn finalize(&mut self, term: core::Term<'arena>) -> core::Term<'arena> {
        self.resolve_pending_instances();
        if self.config.check_unassigned {
            self.report_unsolved(&term);
        }
        self.report_hole_solutions();
        // Substitute metavariable solutions into the output by normalising:
        // evaluation reads solutions out of the metavariable environment and
        // quotation turns the result back into a term.
        self.eval_env().normalise(&term)
    }

    fn resolve_pending_instances(&mut self) {
        let pending = std::mem::take(&mut self.pending_instances);
        for problem in pending {
            // Unification may have found a solution in the meantime.
            if let Some(Some(_)) = self.meta_env.exprs.get_level(problem.var) {
                continue;
            }
            let saved_local = std::mem::replace(&mut self.local_env, problem.local_env);
            let outcome = instances::resolve(self, problem.range, &problem.r#type, 0);
            let solved = match outcome {
                Ok(instance) => self
                    .unification_context()
                    .solve(problem.var, &problem.spine, &instance)
                    .is_ok(),
                Err(failure) => {
                    let goal = self.pretty_value(&problem.r#type);
                    self.messages.push(Message::UnresolvedInstance {
                        range: problem.range,
                        goal,
                        failure,
                    });
                    self.reported_instances.push(problem.var);
                    true // already reported
                }
            };
            if !solved {
                let goal = self.pretty_value(&problem.r#type);
                self.messages.push(Message::UnresolvedInstance {
                    range: problem.range,
                    goal,
                    failure: instances::Failure::NoCandidate,
                });
                self.reported_instances.push(problem.var);
            }
            self.local_env = saved_local;
        }
    }

    /// Report every distinct unsolved metavariable occurring in the term,
    /// skipping instance metavariables whose failed search already produced
    /// an [`UnresolvedInstance`][Message::UnresolvedInstance] message.
    fn report_unsolved(&mut self, term: &core::Term<'arena>) {
        let meta_exprs = &self.meta_env.exprs;
        let meta_sources = &self.meta_env.sources;
        let reported_instances = &self.reported_instances;
        let mut seen = vec![false; meta_exprs.iter().count()];
        let mut unsolved = Vec::new();

        term.for_each_meta(&mut |_, var| {
            let index = var.to_usize();
            if seen[index] {
                return;
            }
            seen[index] = true;
            if let (Some(None), Some(source)) =
                (meta_exprs.get_level(var), meta_sources.get_level(var))
            {
                if source.is_reported() && !reported_instances.contains(&var) {
                    unsolved.push(*source);
                }
            }
        });

        self.messages
            .extend(unsolved.into_iter().map(|source| Message::UnsolvedMeta { source }));
    }

    /// Report the solutions found for named holes.
    fn report_hole_solutions(&mut self) {
        let solutions: Vec<(ByteRange, StringId, ArcValue<'arena>)> =
            Iterator::zip(self.meta_env.sources.iter(), self.meta_env.exprs.iter())
                .filter_map(|(source, expr)| match (source, expr) {
                    (MetaSource::HoleExpr(range, name), Some(expr)) => {
                        Some((*range, *name, expr.clone()))
                    }
                    _ => None,
                })
                .collect();

        for (range, name, expr) in solutions {
            let expr = self.pretty_value(&expr);
            self.messages.push(Message::HoleSolution { range, name, expr });
        }
    }

    /// Elaborate a surface term into a core term, given an expected type.
    pub fn check(
        &mut self,
        surface_term: &Term<'_, ByteRange>,
        expected_type: &ArcValue<'arena>,
    ) -> core::Term<'arena> {
        let range = surface_term.range();
        let expected_type = self.elim_env().force(expected_type);

        match (surface_term, expected_type.as_ref()) {
            (Term::Let(_, pattern, def, body), _) => {
                let (name, type_term, def_term, type_value) = self.elab_let_def(pattern, def);
                let def_value = self.eval_env().eval(&def_term);
                self.local_env.push_def(name, def_value, type_value);
                let body_term = self.check(body, &expected_type);
                self.local_env.pop();

                core::Term::Let(
                    range.into(),
                    name,
                    self.scope.to_scope(type_term),
                    self.scope.to_scope(def_term),
                    self.scope.to_scope(body_term),
                )
            }

            (
                Term::FunLiteral(_, plicity, pattern, body),
                Value::FunType(type_plicity, _, dom, cod),
            ) if plicity == type_plicity => {
                let name = pattern.name();
                if let Pattern::Ann(_, _, ann) = pattern {
                    // An annotated parameter must agree with the domain of
                    // the expected type.
                    let ann_range = ann.range();
                    let (ann_term, _) = self.synth_type(ann);
                    let ann_value = self.eval_env().eval(&ann_term);
                    if let Err(error) = self.unification_context().unify(&ann_value, dom) {
                        let found = self.pretty_value(&ann_value);
                        let expected = self.pretty_value(dom);
                        self.messages.push(Message::FailedToUnify {
                            range: ann_range,
                            expected,
                            found,
                            error,
                        });
                    }
                }

                let var = self.local_env.push_param(name, dom.clone());
                let body_type = self.elim_env().apply_closure(cod, var);
                let body_term = self.check(body, &body_type);
                self.local_env.pop();

                core::Term::FunLit(range.into(), *plicity, name, self.scope.to_scope(body_term))
            }

            (Term::RecordLiteral(_, fields), Value::RecordType(labels, telescope)) => {
                self.check_record_literal(range, fields, *labels, &telescope.clone())
            }

            (Term::Tactics(_, steps), _) => self.check_tactics(range, steps, &expected_type),

            (Term::Placeholder(_), _) => self.push_unsolved_term(
                range.into(),
                MetaSource::PlaceholderExpr(range),
                expected_type.clone(),
            ),

            (Term::Hole(_, name), _) => self.push_unsolved_term(
                range.into(),
                MetaSource::HoleExpr(range, *name),
                expected_type.clone(),
            ),

            (Term::ReportedError(_), _) => core::Term::Error(range.into()),

            // The expected type wants an implicit or instance parameter that
            // the term does not bind, so bind it here and keep checking
            // under the binder.
            (_, Value::FunType(plicity, name, dom, cod))
                if matches!(plicity, Plicity::Implicit | Plicity::Instance) =>
            {
                let var = self.local_env.push_param(*name, dom.clone());
                let body_type = self.elim_env().apply_closure(cod, var);
                let body_term = self.check(surface_term, &body_type);
                self.local_env.pop();

                core::Term::FunLit(range.into(), *plicity, *name, self.scope.to_scope(body_term))
            }

            (_, _) => {
                let (term, r#type) = self.synth(surface_term);
                self.convert(range, term, &r#type, &expected_type)
            }
        }
    }

    /// Elaborate a surface term into a core term, synthesising its type.
    pub fn synth(
        &mut self,
        surface_term: &Term<'_, ByteRange>,
    ) -> (core::Term<'arena>, ArcValue<'arena>) {
        let range = surface_term.range();
        let span = Span::from(range);

        match surface_term {
            Term::Name(_, name) => {
                if let Some((index, r#type)) = self.get_local_name(*name) {
                    self.record_info(range, &r#type);
                    return (core::Term::LocalVar(span, index), r#type);
                }
                let const_name = Name::from_id(*name);
                if let Some(decl) = self.env.get(const_name).cloned() {
                    let levels: &'arena [ULevel<'arena>] = match decl.level_params.is_empty() {
                        true => &[],
                        // Level arguments are not inferred; polymorphic
                        // declarations are referenced at level zero.
                        false => self
                            .scope
                            .to_scope_from_iter(decl.level_params.iter().map(|_| ULevel::Zero)),
                    };
                    let r#type = decl.r#type.instantiate_levels(self.scope, levels);
                    let mut local_exprs = SharedEnv::new();
                    let r#type = self.elim_env().eval_env(&mut local_exprs).eval(r#type);
                    self.record_info(range, &r#type);
                    return (core::Term::Const(span, const_name, levels), r#type);
                }

                let suggestion = self.name_suggestion(*name);
                self.messages.push(Message::UnknownName {
                    range,
                    name: *name,
                    suggestion,
                });
                self.synth_reported_error(range)
            }

            Term::Hole(_, name) => {
                let r#type =
                    self.push_unsolved_value(MetaSource::HoleType(range, *name), self.sort(1));
                let expr =
                    self.push_unsolved_term(span, MetaSource::HoleExpr(range, *name), r#type.clone());
                self.record_info(range, &r#type);
                (expr, r#type)
            }

            Term::Placeholder(_) => {
                let r#type =
                    self.push_unsolved_value(MetaSource::PlaceholderType(range), self.sort(1));
                let expr = self.push_unsolved_term(
                    span,
                    MetaSource::PlaceholderExpr(range),
                    r#type.clone(),
                );
                (expr, r#type)
            }

            Term::Ann(_, expr, r#type) => {
                let (type_term, _) = self.synth_type(r#type);
                let type_value = self.eval_env().eval(&type_term);
                let expr_term = self.check(expr, &type_value);

                let term = core::Term::Ann(
                    span,
                    self.scope.to_scope(expr_term),
                    self.scope.to_scope(type_term),
                );
                (term, type_value)
            }

            Term::Let(_, pattern, def, body) => {
                let (name, type_term, def_term, type_value) = self.elab_let_def(pattern, def);
                let def_value = self.eval_env().eval(&def_term);
                self.local_env.push_def(name, def_value, type_value);
                let (body_term, body_type) = self.synth(body);
                self.local_env.pop();

                let term = core::Term::Let(
                    span,
                    name,
                    self.scope.to_scope(type_term),
                    self.scope.to_scope(def_term),
                    self.scope.to_scope(body_term),
                );
                (term, body_type)
            }

            Term::Sort(_, level) => (
                core::Term::Sort(span, ULevel::lit(self.scope, *level)),
                self.sort(*level + 1),
            ),

            Term::Arrow(_, dom, cod) => {
                let (dom_term, dom_level) = self.synth_type(dom);
                let dom_value = self.eval_env().eval(&dom_term);

                self.local_env.push_param(None, dom_value);
                let (cod_term, cod_level) = self.synth_type(cod);
                self.local_env.pop();

                let term = core::Term::FunType(
                    span,
                    Plicity::Explicit,
                    None,
                    self.scope.to_scope(dom_term),
                    self.scope.to_scope(cod_term),
                );
                let level = ULevel::imax(self.scope, dom_level, cod_level);
                (term, Arc::new(Value::Sort(level)))
            }

            Term::FunType(_, plicity, pattern, body) => {
                let (name, dom) = match pattern {
                    Pattern::Ann(_, pattern, dom) => (pattern.name(), dom),
                    _ => {
                        self.messages.push(Message::BinderMissingType {
                            range: pattern.range(),
                        });
                        return self.synth_reported_error(range);
                    }
                };
                let (dom_term, dom_level) = self.synth_type(dom);
                let dom_value = self.eval_env().eval(&dom_term);

                self.local_env.push_param(name, dom_value);
                let (cod_term, cod_level) = self.synth_type(body);
                self.local_env.pop();

                let term = core::Term::FunType(
                    span,
                    *plicity,
                    name,
                    self.scope.to_scope(dom_term),
                    self.scope.to_scope(cod_term),
                );
                let level = ULevel::imax(self.scope, dom_level, cod_level);
                (term, Arc::new(Value::Sort(level)))
            }

            Term::FunLiteral(_, plicity, pattern, body) => {
                let (name, dom) = match pattern {
                    Pattern::Ann(_, pattern, dom) => (pattern.name(), dom),
                    _ => {
                        // Without an annotation the parameter type cannot be
                        // synthesised; check the literal against a function
                        // type instead.
                        self.messages.push(Message::AmbiguousFunLiteral { range });
                        return self.synth_reported_error(range);
                    }
                };
                let (dom_term, _) = self.synth_type(dom);
                let dom_value = self.eval_env().eval(&dom_term);

                self.local_env.push_param(name, dom_value.clone());
                let (body_term, body_type) = self.synth(body);
                let cod_term = self.quote_env().quote(&body_type);
                self.local_env.pop();

                let term =
                    core::Term::FunLit(span, *plicity, name, self.scope.to_scope(body_term));
                let r#type = Arc::new(Value::FunType(
                    *plicity,
                    name,
                    dom_value,
                    Closure::new(self.local_env.exprs.clone(), self.scope.to_scope(cod_term)),
                ));
                (term, r#type)
            }

            Term::FunElim(_, head, args) => self.synth_fun_elim(range, head, args),

            Term::RecordType(_, fields) => {
                self.report_duplicate_labels(range, fields);
                let initial_len = self.local_env.len();
                let labels = self
                    .scope
                    .to_scope_from_iter(fields.iter().map(|((_, label), _)| *label));
                let mut types = SliceVec::new(self.scope, fields.len());
                let mut level = ULevel::ZERO;

                for ((_, label), r#type) in fields.iter() {
                    let (type_term, type_level) = self.synth_type(r#type);
                    level = ULevel::max(self.scope, level, type_level);
                    let type_value = self.eval_env().eval(&type_term);
                    self.local_env.push_param(Some(*label), type_value);
                    types.push(type_term);
                }
                self.local_env.truncate(initial_len);

                let term = core::Term::RecordType(span, labels, types.into());
                (term, Arc::new(Value::Sort(level)))
            }

            Term::RecordLiteral(_, fields) => {
                self.report_duplicate_labels(range, fields);
                let labels = self
                    .scope
                    .to_scope_from_iter(fields.iter().map(|((_, label), _)| *label));
                let mut exprs = SliceVec::new(self.scope, fields.len());
                let mut types = SliceVec::new(self.scope, fields.len());
                // Field types do not depend on each other here, but they sit
                // in a telescope, so each is quoted at the depth it will be
                // evaluated at.
                let mut depth = self.local_env.len();

                for (_, expr) in fields.iter() {
                    let (expr_term, expr_type) = self.synth(expr);
                    types.push(QuoteEnv::new(self.elim_env(), depth).quote(&expr_type));
                    exprs.push(expr_term);
                    depth.push();
                }

                let term = core::Term::RecordLit(span, labels, exprs.into());
                let r#type = Arc::new(Value::RecordType(
                    labels,
                    Telescope::new(self.local_env.exprs.clone(), types.into()),
                ));
                (term, r#type)
            }

            Term::RecordProj(_, head, (label_range, label)) => {
                let head_range = head.range();
                let (head_term, head_type) = self.synth(head);
                let head_term = self.scope.to_scope(head_term);
                let head_value = self.eval_env().eval(head_term);

                let forced = self.elim_env().force_and_unfold(&head_type);
                if let Value::RecordType(labels, telescope) = forced.as_ref() {
                    let mut telescope = telescope.clone();
                    for current_label in labels.iter() {
                        let (r#type, next_telescope) =
                            match self.elim_env().split_telescope(telescope) {
                                Some(entry) => entry,
                                None => break,
                            };
                        if current_label == label {
                            let term = core::Term::RecordProj(span, head_term, *label);
                            return (term, r#type);
                        }
                        let expr = self.elim_env().record_proj(head_value.clone(), *current_label);
                        telescope = next_telescope(expr);
                    }
                }

                if head_term.is_error() || forced.is_error() {
                    return self.synth_reported_error(range);
                }
                let head_type = self.pretty_value(&head_type);
                self.messages.push(Message::UnknownField {
                    head_range,
                    head_type,
                    label_range: *label_range,
                    label: *label,
                });
                self.synth_reported_error(range)
            }

            Term::NumberLiteral(_, number) => {
                let nat = self.env.prims().nat;
                let term = core::Term::Lit(span, Literal::Nat(*number));
                (term, Arc::new(Value::r#const(nat, &[])))
            }

            Term::StringLiteral(_, string) => {
                let string_type = self.env.prims().string;
                let term = core::Term::Lit(span, Literal::Str(*string));
                (term, Arc::new(Value::r#const(string_type, &[])))
            }

            Term::Tactics(..) => {
                // A tactic block only makes sense against a known goal.
                self.messages.push(Message::AmbiguousTacticBlock { range });
                self.synth_reported_error(range)
            }

            Term::ReportedError(_) => self.synth_reported_error(range),
        }
    }

    /// Elaborate a surface term that is expected to be a type, returning its
    /// universe level alongside.
    fn synth_type(
        &mut self,
        surface_term: &Term<'_, ByteRange>,
    ) -> (core::Term<'arena>, ULevel<'arena>) {
        let range = surface_term.range();

        // Holes in type position stand for a type directly, rather than
        // getting a type metavariable of their own.
        match surface_term {
            Term::Hole(_, name) => {
                let term = self.push_unsolved_term(
                    range.into(),
                    MetaSource::HoleExpr(range, *name),
                    self.sort(1),
                );
                return (term, ULevel::lit(self.scope, 1));
            }
            Term::Placeholder(_) => {
                let term = self.push_unsolved_term(
                    range.into(),
                    MetaSource::PlaceholderExpr(range),
                    self.sort(1),
                );
                return (term, ULevel::lit(self.scope, 1));
            }
            _ => {}
        }

        let (term, r#type) = self.synth(surface_term);
        let forced = self.elim_env().force_and_unfold(&r#type);
        match forced.as_ref() {
            Value::Sort(level) => (term, *level),
            _ if term.is_error() || forced.is_error() => {
                (core::Term::Error(range.into()), ULevel::ZERO)
            }
            _ => {
                let found = self.pretty_value(&r#type);
                self.messages.push(Message::SortExpected { range, found });
                (core::Term::Error(range.into()), ULevel::ZERO)
            }
        }
    }

    /// Elaborate the definition bound by a let expression. Returns the bound
    /// name, the type as a term and as a value, and the definition term.
    fn elab_let_def(
        &mut self,
        pattern: &Pattern<'_, ByteRange>,
        def: &Term<'_, ByteRange>,
    ) -> (
        Option<StringId>,
        core::Term<'arena>,
        core::Term<'arena>,
        ArcValue<'arena>,
    ) {
        match pattern {
            Pattern::Ann(_, pattern, r#type) => {
                let (type_term, _) = self.synth_type(r#type);
                let type_value = self.eval_env().eval(&type_term);
                let def_term = self.check(def, &type_value);
                (pattern.name(), type_term, def_term, type_value)
            }
            Pattern::Name(..) | Pattern::Placeholder(_) => {
                let (def_term, type_value) = self.synth(def);
                let type_term = self.quote_env().quote(&type_value);
                (pattern.name(), type_term, def_term, type_value)
            }
        }
    }

    /// Elaborate an application head and its spine of arguments, inserting
    /// implicit and instance arguments where the head's type calls for them.
    fn synth_fun_elim(
        &mut self,
        range: ByteRange,
        head: &Term<'_, ByteRange>,
        args: &[Arg<'_, ByteRange>],
    ) -> (core::Term<'arena>, ArcValue<'arena>) {
        let head_range = head.range();
        let (mut head_term, mut head_type) = self.synth(head);

        for arg in args {
            if arg.plicity == Plicity::Explicit {
                let (term, r#type) = self.insert_implicit_args(head_range, head_term, head_type);
                head_term = term;
                head_type = r#type;
            }

            let arg_range = arg.term.range();
            let forced = self.force_fun_type(&head_type);
            match forced.as_ref() {
                Value::FunType(plicity, _, dom, cod) if *plicity == arg.plicity => {
                    let arg_term = self.check(&arg.term, dom);
                    let arg_value = self.eval_env().eval(&arg_term);
                    head_term = core::Term::FunApp(
                        range.into(),
                        arg.plicity,
                        self.scope.to_scope(head_term),
                        self.scope.to_scope(arg_term),
                    );
                    head_type = self.elim_env().apply_closure(cod, arg_value);
                }
                Value::FunType(plicity, ..) => {
                    self.messages.push(Message::PlicityMismatch {
                        head_range,
                        arg_range,
                        expected: plicity.description(),
                        found: arg.plicity.description(),
                    });
                    return self.synth_reported_error(range);
                }
                _ if forced.is_error() => {
                    return (core::Term::Error(range.into()), Arc::new(Value::error()));
                }
                _ => {
                    let head_type = self.pretty_value(&head_type);
                    self.messages.push(Message::UnexpectedArgument {
                        head_range,
                        head_type,
                        arg_range,
                    });
                    return self.synth_reported_error(range);
                }
            }
        }

        (head_term, head_type)
    }

    /// Insert fresh metavariables for the implicit and instance parameters
    /// expected before the next explicit argument.
    fn insert_implicit_args(
        &mut self,
        head_range: ByteRange,
        mut head_term: core::Term<'arena>,
        mut head_type: ArcValue<'arena>,
    ) -> (core::Term<'arena>, ArcValue<'arena>) {
        loop {
            let forced = self.force_fun_type(&head_type);
            let (plicity, name, dom, cod) = match forced.as_ref() {
                Value::FunType(plicity @ Plicity::Implicit, name, dom, cod) => {
                    (*plicity, *name, dom, cod)
                }
                Value::FunType(plicity @ Plicity::Instance, name, dom, cod) => {
                    (*plicity, *name, dom, cod)
                }
                _ => return (head_term, head_type),
            };

            let arg_term = match plicity {
                Plicity::Instance => self.push_instance_arg(head_range, dom.clone()),
                _ => self.push_unsolved_term(
                    Span::Empty,
                    MetaSource::ImplicitArg(head_range, name),
                    dom.clone(),
                ),
            };
            let arg_value = self.eval_env().eval(&arg_term);
            head_term = core::Term::FunApp(
                head_range.into(),
                plicity,
                self.scope.to_scope(head_term),
                self.scope.to_scope(arg_term),
            );
            head_type = self.elim_env().apply_closure(cod, arg_value);
        }
    }

    /// Check a record literal against a record type, matching written fields
    /// against the type's labels in telescope order.
    fn check_record_literal(
        &mut self,
        range: ByteRange,
        fields: &[((ByteRange, StringId), Term<'_, ByteRange>)],
        labels: &'arena [StringId],
        telescope: &Telescope<'arena>,
    ) -> core::Term<'arena> {
        self.report_duplicate_labels(range, fields);

        let mut written: FxHashMap<StringId, (ByteRange, &Term<'_, ByteRange>)> =
            FxHashMap::default();
        for ((field_range, label), expr) in fields.iter() {
            written.entry(*label).or_insert((*field_range, expr));
        }

        let mut telescope = telescope.clone();
        let mut exprs = SliceVec::new(self.scope, labels.len());

        for label in labels.iter() {
            let (r#type, next_telescope) = match self.elim_env().split_telescope(telescope) {
                Some(entry) => entry,
                None => break,
            };
            let expr_term = match written.remove(label) {
                Some((_, expr)) => self.check(expr, &r#type),
                None if self.config.fail_missing_field => {
                    let field_type = self.pretty_value(&r#type);
                    self.messages.push(Message::MissingRecordField {
                        range,
                        label: *label,
                        field_type,
                    });
                    core::Term::Error(range.into())
                }
                None => self.push_unsolved_term(
                    range.into(),
                    MetaSource::MissingRecordField(range, *label),
                    r#type.clone(),
                ),
            };
            let expr_value = self.eval_env().eval(&expr_term);
            telescope = next_telescope(expr_value);
            exprs.push(expr_term);
        }

        if !written.is_empty() {
            self.messages.push(Message::MismatchedFieldLabels {
                range,
                expr_labels: fields
                    .iter()
                    .map(|((field_range, label), _)| (*field_range, *label))
                    .collect(),
                type_labels: labels.to_vec(),
            });
        }

        core::Term::RecordLit(range.into(), labels, exprs.into())
    }

    /// Report duplicate labels in a record type or literal.
    fn report_duplicate_labels(
        &mut self,
        range: ByteRange,
        fields: &[((ByteRange, StringId), Term<'_, ByteRange>)],
    ) {
        let mut seen: FxHashMap<StringId, ()> = FxHashMap::default();
        let mut duplicates = Vec::new();
        for ((field_range, label), _) in fields.iter() {
            if seen.insert(*label, ()).is_some() {
                duplicates.push((*field_range, *label));
            }
        }
        if !duplicates.is_empty() {
            self.messages.push(Message::DuplicateFieldLabels {
                range,
                labels: duplicates,
            });
        }
    }

    /// Elaborate a tactic block against a goal type.
    fn check_tactics(
        &mut self,
        range: ByteRange,
        steps: &[Tactic<'_, ByteRange>],
        goal: &ArcValue<'arena>,
    ) -> core::Term<'arena> {
        let (step, rest) = match steps.split_first() {
            Some(parts) => parts,
            // An unfinished block leaves the goal as a metavariable, so an
            // interactive session can keep refining it.
            None => {
                return self.push_unsolved_term(
                    range.into(),
                    MetaSource::TacticGoal(range),
                    goal.clone(),
                )
            }
        };

        if self.config.flycheck_goals {
            self.emit_goal(step.range(), goal);
        }

        match step {
            Tactic::Intro(step_range, name) => {
                let forced = self.force_fun_type(goal);
                match forced.as_ref() {
                    Value::FunType(plicity, type_name, dom, cod) => {
                        let name = (*name).or(*type_name);
                        let var = self.local_env.push_param(name, dom.clone());
                        let body_goal = self.elim_env().apply_closure(cod, var);
                        let body = self.check_tactics(range, rest, &body_goal);
                        self.local_env.pop();
                        core::Term::FunLit(
                            (*step_range).into(),
                            *plicity,
                            name,
                            self.scope.to_scope(body),
                        )
                    }
                    _ => {
                        let goal = self.pretty_value(goal);
                        self.messages.push(Message::GoalNotAFunction {
                            range: *step_range,
                            goal,
                        });
                        core::Term::Error((*step_range).into())
                    }
                }
            }
            Tactic::Exact(_, term) => {
                let expr = self.check(term, goal);
                self.report_trailing_tactics(rest);
                expr
            }
            Tactic::Assumption(step_range) => match self.find_assumption(goal) {
                Some(index) => {
                    self.report_trailing_tactics(rest);
                    core::Term::LocalVar((*step_range).into(), index)
                }
                None => {
                    let goal = self.pretty_value(goal);
                    self.messages.push(Message::AssumptionNotFound {
                        range: *step_range,
                        goal,
                    });
                    core::Term::Error((*step_range).into())
                }
            },
        }
    }

    fn report_trailing_tactics(&mut self, rest: &[Tactic<'_, ByteRange>]) {
        if let Some(step) = rest.first() {
            self.messages.push(Message::UnexpectedTactic {
                range: step.range(),
            });
        }
    }

    /// The innermost local hypothesis definitionally equal to the goal.
    fn find_assumption(&self, goal: &ArcValue<'arena>) -> Option<Index> {
        let types: Vec<ArcValue<'arena>> =
            self.local_env.types.iter().rev().cloned().collect();
        for (index, r#type) in Iterator::zip(env::indices(), types.into_iter()) {
            if self.conversion_env().is_equal(&r#type, goal) {
                return Some(index);
            }
        }
        None
    }

    /// Write the current goal to the flycheck sink.
    fn emit_goal(&mut self, range: ByteRange, goal: &ArcValue<'arena>) {
        if self.flycheck.is_none() {
            return;
        }
        let entries: Vec<(Option<StringId>, ArcValue<'arena>)> = Iterator::zip(
            self.local_env.names.iter().copied(),
            self.local_env.types.iter().cloned(),
        )
        .collect();
        let hypotheses = entries
            .into_iter()
            .map(|(name, r#type)| (name, self.pretty_value(&r#type)))
            .collect();
        let goal = self.pretty_value(goal);

        let snapshot = GoalSnapshot {
            range,
            hypotheses,
            goal,
        };
        if let Some(sink) = &mut self.flycheck {
            sink.goal(&snapshot);
        }
    }

    /// Convert an elaborated term from its synthesised type to an expected
    /// type: unification first, then registered coercions.
    fn convert(
        &mut self,
        range: ByteRange,
        term: core::Term<'arena>,
        r#type: &ArcValue<'arena>,
        expected_type: &ArcValue<'arena>,
    ) -> core::Term<'arena> {
        match self.unification_context().unify(r#type, expected_type) {
            Ok(()) => term,
            Err(error) => {
                if let Some(term) =
                    coercion::coerce(self, range.into(), term.clone(), r#type, expected_type)
                {
                    return term;
                }
                let found = self.pretty_value(r#type);
                let expected = self.pretty_value(expected_type);
                self.messages.push(Message::FailedToUnify {
                    range,
                    expected,
                    found,
                    error,
                });
                core::Term::Error(range.into())
            }
        }
    }
}
