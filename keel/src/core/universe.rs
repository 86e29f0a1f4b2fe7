//! Universe level expressions.
//!
//! Sorts are indexed by level expressions built from zero, successor, `max`,
//! `imax`, and named parameters bound by the enclosing declaration. `Sort 0`
//! is the universe of propositions; the kernel treats its inhabitants as
//! proof-irrelevant. `imax` is the impredicative product rule: `imax u 0 = 0`,
//! so propositions are closed under quantification over any type.
//!
//! Level equality is decided by normalising both sides to a canonical
//! max-of-atoms form, where an atom is a base (zero, a parameter, or an
//! irreducible `imax`) plus a constant offset.

use scoped_arena::Scope;

/// A universe level expression. Parameters refer positionally to the level
/// parameters of the enclosing declaration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ULevel<'arena> {
    /// The zero level: the universe of propositions.
    Zero,
    /// The successor of a level.
    Succ(&'arena ULevel<'arena>),
    /// The least upper bound of two levels.
    Max(&'arena ULevel<'arena>, &'arena ULevel<'arena>),
    /// The impredicative least upper bound: zero whenever the second level is
    /// zero.
    IMax(&'arena ULevel<'arena>, &'arena ULevel<'arena>),
    /// A level parameter of the enclosing declaration.
    Param(u16),
}

impl<'arena> ULevel<'arena> {
    pub const ZERO: ULevel<'static> = ULevel::Zero;

    /// A concrete level literal, built as a chain of successors.
    pub fn lit(scope: &'arena Scope<'arena>, n: u32) -> ULevel<'arena> {
        let mut level = ULevel::Zero;
        for _ in 0..n {
            level = ULevel::Succ(scope.to_scope(level));
        }
        level
    }

    pub fn succ(scope: &'arena Scope<'arena>, level: ULevel<'arena>) -> ULevel<'arena> {
        ULevel::Succ(scope.to_scope(level))
    }

    pub fn max(
        scope: &'arena Scope<'arena>,
        lhs: ULevel<'arena>,
        rhs: ULevel<'arena>,
    ) -> ULevel<'arena> {
        ULevel::Max(scope.to_scope(lhs), scope.to_scope(rhs))
    }

    pub fn imax(
        scope: &'arena Scope<'arena>,
        lhs: ULevel<'arena>,
        rhs: ULevel<'arena>,
    ) -> ULevel<'arena> {
        ULevel::IMax(scope.to_scope(lhs), scope.to_scope(rhs))
    }

    /// Replace level parameters with the supplied arguments. Parameters with
    /// no corresponding argument are left in place.
    pub fn instantiate(
        &self,
        scope: &'arena Scope<'arena>,
        args: &[ULevel<'arena>],
    ) -> ULevel<'arena> {
        match self {
            ULevel::Zero => ULevel::Zero,
            ULevel::Succ(level) => ULevel::Succ(scope.to_scope(level.instantiate(scope, args))),
            ULevel::Max(lhs, rhs) => ULevel::Max(
                scope.to_scope(lhs.instantiate(scope, args)),
                scope.to_scope(rhs.instantiate(scope, args)),
            ),
            ULevel::IMax(lhs, rhs) => ULevel::IMax(
                scope.to_scope(lhs.instantiate(scope, args)),
                scope.to_scope(rhs.instantiate(scope, args)),
            ),
            ULevel::Param(param) => match args.get(usize::from(*param)) {
                Some(level) => *level,
                None => ULevel::Param(*param),
            },
        }
    }

    /// The largest parameter index mentioned in the level, if any.
    pub fn max_param(&self) -> Option<u16> {
        match self {
            ULevel::Zero => None,
            ULevel::Succ(level) => level.max_param(),
            ULevel::Max(lhs, rhs) | ULevel::IMax(lhs, rhs) => {
                match (lhs.max_param(), rhs.max_param()) {
                    (Some(lhs), Some(rhs)) => Some(lhs.max(rhs)),
                    (lhs, rhs) => lhs.or(rhs),
                }
            }
            ULevel::Param(param) => Some(*param),
        }
    }

    /// Whether the level is equal to zero under every parameter assignment.
    pub fn is_zero(&self) -> bool {
        norm(self) == norm(&ULevel::Zero)
    }

    /// Whether the level is at least one under every parameter assignment.
    pub fn is_nonzero(&self) -> bool {
        norm(self).iter().all(|atom| atom.offset >= 1)
    }

    /// Definitional equality of levels: both sides normalise to the same
    /// max-of-atoms form.
    pub fn is_def_eq(&self, other: &ULevel<'arena>) -> bool {
        norm(self) == norm(other)
    }

    /// Definitional equality of level argument lists.
    pub fn all_def_eq(lhs: &[ULevel<'arena>], rhs: &[ULevel<'arena>]) -> bool {
        lhs.len() == rhs.len() && Iterator::zip(lhs.iter(), rhs.iter()).all(|(l, r)| l.is_def_eq(r))
    }
}

/// The base of a normalised atom.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Base {
    Zero,
    Param(u16),
    /// An `imax` whose second argument could not be decided zero or nonzero.
    IMax(Vec<Atom>, Vec<Atom>),
}

/// `base + offset` under the max in a normalised level.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Atom {
    base: Base,
    offset: u32,
}

/// Normalise a level to a sorted max-of-atoms form: the level denotes the
/// maximum of `base + offset` over its atoms.
fn norm(level: &ULevel<'_>) -> Vec<Atom> {
    match level {
        ULevel::Zero => vec![Atom {
            base: Base::Zero,
            offset: 0,
        }],
        ULevel::Succ(level) => {
            let mut atoms = norm(level);
            for atom in &mut atoms {
                atom.offset += 1;
            }
            atoms
        }
        ULevel::Max(lhs, rhs) => merge(norm(lhs), norm(rhs)),
        ULevel::IMax(lhs, rhs) => {
            let rhs = norm(rhs);
            if rhs.iter().all(|atom| atom.offset >= 1) {
                // The second argument is at least one, so `imax` is `max`.
                merge(norm(lhs), rhs)
            } else if rhs == norm(&ULevel::Zero) {
                norm(&ULevel::Zero)
            } else {
                // Like a parameter, an undecided `imax` is at least zero.
                // `Base::Zero` orders first, keeping the list sorted.
                vec![
                    Atom {
                        base: Base::Zero,
                        offset: 0,
                    },
                    Atom {
                        base: Base::IMax(norm(lhs), rhs),
                        offset: 0,
                    },
                ]
            }
        }
        // A parameter is always at least zero; `Base::Zero` orders first,
        // keeping the list sorted.
        ULevel::Param(param) => vec![
            Atom {
                base: Base::Zero,
                offset: 0,
            },
            Atom {
                base: Base::Param(*param),
                offset: 0,
            },
        ],
    }
}

/// Merge two atom lists, keeping the largest offset per base.
fn merge(lhs: Vec<Atom>, rhs: Vec<Atom>) -> Vec<Atom> {
    let mut atoms = lhs;
    atoms.extend(rhs);
    atoms.sort();
    atoms.dedup_by(|next, prev| {
        // After sorting, atoms with the same base are adjacent with the
        // largest offset last.
        if next.base == prev.base {
            prev.offset = prev.offset.max(next.offset);
            true
        } else {
            false
        }
    });
    // An atom subsumed by a same-or-larger zero-based atom is redundant only
    // when its own offset is smaller; keeping it is still canonical because
    // both sides of a comparison normalise the same way.
    atoms
}
