//! Surface language.
//!
//! Surface terms are produced by an external parser and carry source ranges
//! of some `Range` type. The [elaborator][elaboration] completes them into
//! kernel terms; nothing in this crate parses text.

use crate::core::Plicity;
use crate::source::StringId;

pub mod elaboration;

/// Surface patterns.
#[derive(Debug, Clone)]
pub enum Pattern<'arena, Range> {
    /// Named patterns.
    Name(Range, StringId),
    /// Placeholder patterns.
    Placeholder(Range),
    /// Annotated patterns.
    Ann(
        Range,
        &'arena Pattern<'arena, Range>,
        &'arena Term<'arena, Range>,
    ),
}

impl<'arena, Range: Clone> Pattern<'arena, Range> {
    pub fn range(&self) -> Range {
        match self {
            Pattern::Name(range, _) | Pattern::Placeholder(range) | Pattern::Ann(range, _, _) => {
                range.clone()
            }
        }
    }

    /// The name the pattern binds, if any.
    pub fn name(&self) -> Option<StringId> {
        match self {
            Pattern::Name(_, name) => Some(*name),
            Pattern::Placeholder(_) => None,
            Pattern::Ann(_, pattern, _) => pattern.name(),
        }
    }
}

/// An argument of a function elimination.
#[derive(Debug, Clone)]
pub struct Arg<'arena, Range> {
    pub plicity: Plicity,
    pub term: Term<'arena, Range>,
}

/// Surface terms.
#[derive(Debug, Clone)]
pub enum Term<'arena, Range> {
    /// Named references.
    Name(Range, StringId),
    /// Hole expressions, `?name`.
    Hole(Range, StringId),
    /// Placeholder expressions, `_`.
    Placeholder(Range),
    /// Annotated expressions.
    Ann(
        Range,
        &'arena Term<'arena, Range>,
        &'arena Term<'arena, Range>,
    ),
    /// Let expressions.
    Let(
        Range,
        &'arena Pattern<'arena, Range>,
        &'arena Term<'arena, Range>,
        &'arena Term<'arena, Range>,
    ),
    /// Universe sorts: `Sort 0` is `Prop`, `Sort 1` is `Type`.
    Sort(Range, u32),
    /// Non-dependent function types.
    Arrow(
        Range,
        &'arena Term<'arena, Range>,
        &'arena Term<'arena, Range>,
    ),
    /// Dependent function types. The domain is carried by the pattern's
    /// annotation.
    FunType(
        Range,
        Plicity,
        &'arena Pattern<'arena, Range>,
        &'arena Term<'arena, Range>,
    ),
    /// Function literals.
    FunLiteral(
        Range,
        Plicity,
        &'arena Pattern<'arena, Range>,
        &'arena Term<'arena, Range>,
    ),
    /// Function eliminations: a head applied to a spine of arguments.
    FunElim(
        Range,
        &'arena Term<'arena, Range>,
        &'arena [Arg<'arena, Range>],
    ),
    /// Dependent record types.
    RecordType(Range, &'arena [((Range, StringId), Term<'arena, Range>)]),
    /// Record literals.
    RecordLiteral(Range, &'arena [((Range, StringId), Term<'arena, Range>)]),
    /// Record projections.
    RecordProj(Range, &'arena Term<'arena, Range>, (Range, StringId)),
    /// Number literals.
    NumberLiteral(Range, u64),
    /// String literals.
    StringLiteral(Range, StringId),
    /// Tactic blocks, elaborated goal-by-goal against the expected type.
    Tactics(Range, &'arena [Tactic<'arena, Range>]),
    /// Reported error sentinel.
    ReportedError(Range),
}

impl<'arena, Range: Clone> Term<'arena, Range> {
    /// Get the source range of the term.
    pub fn range(&self) -> Range {
        match self {
            Term::Name(range, _)
            | Term::Hole(range, _)
            | Term::Placeholder(range)
            | Term::Ann(range, _, _)
            | Term::Let(range, _, _, _)
            | Term::Sort(range, _)
            | Term::Arrow(range, _, _)
            | Term::FunType(range, _, _, _)
            | Term::FunLiteral(range, _, _, _)
            | Term::FunElim(range, _, _)
            | Term::RecordType(range, _)
            | Term::RecordLiteral(range, _)
            | Term::RecordProj(range, _, _)
            | Term::NumberLiteral(range, _)
            | Term::StringLiteral(range, _)
            | Term::Tactics(range, _)
            | Term::ReportedError(range) => range.clone(),
        }
    }
}

/// A single step of a tactic block.
#[derive(Debug, Clone)]
pub enum Tactic<'arena, Range> {
    /// Introduce the parameter of a function-type goal as a hypothesis.
    Intro(Range, Option<StringId>),
    /// Close the goal with an explicit term.
    Exact(Range, &'arena Term<'arena, Range>),
    /// Close the goal with the first local hypothesis of the goal type.
    Assumption(Range),
}

impl<'arena, Range: Clone> Tactic<'arena, Range> {
    pub fn range(&self) -> Range {
        match self {
            Tactic::Intro(range, _) | Tactic::Exact(range, _) | Tactic::Assumption(range) => {
                range.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_drop() {
        assert!(!std::mem::needs_drop::<Term<'_, ()>>());
        assert!(!std::mem::needs_drop::<Pattern<'_, ()>>());
        assert!(!std::mem::needs_drop::<Tactic<'_, ()>>());
    }
}
