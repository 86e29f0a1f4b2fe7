//! Environments and variables.
//!
//! # Variables
//!
//! Nameless variables are used to avoid the expense of keeping track of name
//! substitutions during evaluation and conversion checking. We use a
//! combination of [de Bruijn indices][Index] in terms and [de Bruijn
//! levels][Level] in values in order to avoid the expensive and error-prone
//! shifting operations that are often associated with nameless approaches to
//! environments. For more information on this approach, see section 3.1 of
//! [Abel's habilitation thesis](https://www.cse.chalmers.se/~abela/habil.pdf).
//!
//! # Environments
//!
//! A number of different environment representations are used. Where possible
//! we try to stick to flat, low-indirection environments like [`UniqueEnv`]
//! and [`SliceEnv`], but when we need to copy environments often, we use a
//! [`SharedEnv`] to increase the amount of sharing at the expense of locality.

use std::fmt;

/// Underlying variable representation.
type RawVar = u32;

/// A [de Bruijn index], which counts the number of binders between a variable
/// occurrence and the binder that introduced the variable.
///
/// For example:
///
/// | Representation    | Example (S combinator)  |
/// | ----------------- | ----------------------- |
/// | Named             | `λx. λy. λz. x z (y z)` |
/// | de Bruijn indices | `λ_. λ_. λ_. 2 0 (1 0)` |
///
/// This representation allows terms to be compared for alpha-equivalence
/// based on their binding structure alone: both `λx. x` and `λy. y` are
/// described as `λ 0`.
///
/// [de Bruijn index]: https://en.wikipedia.org/wiki/De_Bruijn_index
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Index(RawVar);

impl Index {
    /// The last variable to be bound in the environment.
    pub const fn last() -> Index {
        Index(0)
    }

    /// Returns the previously bound variable, relative to this one.
    pub const fn prev(self) -> Index {
        Index(self.0 + 1)
    }

    pub const fn to_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns this index seen from under `amount` additional binders.
    pub const fn shifted(self, amount: u32) -> Index {
        Index(self.0 + amount)
    }

    /// Returns this index seen from outside `amount` enclosing binders.
    pub const fn unshifted(self, amount: u32) -> Index {
        Index(self.0 - amount)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index(")?;
        self.0.fmt(f)?;
        write!(f, ")")
    }
}

/// An iterator over indices, listed from the most recently bound.
pub fn indices() -> impl Iterator<Item = Index> {
    (0..).map(Index)
}

/// A [de Bruijn level], which counts the number of binders between the binder
/// that introduced the variable and the start of the environment. For example:
///
/// | Representation    | Example (S combinator)  |
/// | ----------------- | ----------------------- |
/// | Named             | `λx. λy. λz. x z (y z)` |
/// | de Bruijn levels  | `λ_. λ_. λ_. 0 2 (1 2)` |
///
/// Levels are used in [values][crate::core::semantics::Value] because they
/// are not tied to a specific binding depth, unlike [indices][Index]. Because
/// of this we can sidestep variable shifting during evaluation and quotation.
///
/// [de Bruijn level]: https://en.wikipedia.org/wiki/De_Bruijn_index
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Level(RawVar);

impl Level {
    /// The first variable to be bound in the environment.
    pub const fn first() -> Level {
        Level(0)
    }

    /// Returns the next bound variable, relative to this one.
    pub const fn next(self) -> Level {
        Level(self.0 + 1)
    }

    pub const fn to_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level(")?;
        self.0.fmt(f)?;
        write!(f, ")")
    }
}

/// An iterator over levels, listed from the least recently bound.
pub fn levels() -> impl Iterator<Item = Level> {
    (0..).map(Level)
}

/// The length of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EnvLen(RawVar);

impl EnvLen {
    /// Construct a new, empty environment length.
    pub fn new() -> EnvLen {
        EnvLen(0)
    }

    /// Reset to the empty environment.
    pub fn clear(&mut self) {
        *self = EnvLen::new();
    }

    /// Convert an index to a level in the current environment.
    pub fn index_to_level(self, index: Index) -> Option<Level> {
        Some(Level(self.0.checked_sub(index.0)?.checked_sub(1)?))
    }

    /// Convert a level to an index in the current environment.
    pub fn level_to_index(self, level: Level) -> Option<Index> {
        Some(Index(self.0.checked_sub(level.0)?.checked_sub(1)?))
    }

    /// The next level that will be bound in this environment.
    pub fn next_level(self) -> Level {
        Level(self.0)
    }

    /// Push an entry onto the environment.
    pub fn push(&mut self) {
        self.0 += 1;
    }

    /// Pop an entry off the environment.
    pub fn pop(&mut self) {
        self.0 -= 1;
    }

    /// Truncate the environment to the given length.
    pub fn truncate(&mut self, len: EnvLen) {
        *self = len;
    }
}

impl Default for EnvLen {
    fn default() -> EnvLen {
        EnvLen::new()
    }
}

/// A uniquely owned environment.
#[derive(Debug, Clone)]
pub struct UniqueEnv<Entry> {
    entries: Vec<Entry>,
}

impl<Entry> UniqueEnv<Entry> {
    /// Construct a new, empty environment.
    pub fn new() -> UniqueEnv<Entry> {
        UniqueEnv {
            entries: Vec::new(),
        }
    }

    /// Clear the entries. This is useful for reusing environment allocations.
    pub fn clear(&mut self) {
        self.entries.clear()
    }

    /// Resize the environment to the desired length, filling new entries with
    /// `entry`.
    pub fn resize(&mut self, new_len: EnvLen, entry: Entry)
    where
        Entry: Clone,
    {
        self.entries.resize(new_len.0 as usize, entry)
    }

    /// Push an entry onto the environment.
    pub fn push(&mut self, entry: Entry) {
        assert!(self.entries.len() < RawVar::MAX as usize);
        self.entries.push(entry);
    }

    /// Pop an entry off the environment.
    pub fn pop(&mut self) {
        self.entries.pop();
    }

    /// Truncate the environment to the given length.
    pub fn truncate(&mut self, len: EnvLen) {
        self.entries.truncate(len.0 as usize);
    }
}

impl<Entry> std::ops::Deref for UniqueEnv<Entry> {
    type Target = SliceEnv<Entry>;

    fn deref(&self) -> &SliceEnv<Entry> {
        // SAFETY:
        // - `SliceEnv<Entry>` is equivalent to an `[Entry]` internally
        unsafe { std::mem::transmute::<&[_], &SliceEnv<_>>(&self.entries[..]) }
    }
}

impl<Entry> std::ops::DerefMut for UniqueEnv<Entry> {
    fn deref_mut(&mut self) -> &mut SliceEnv<Entry> {
        // SAFETY:
        // - `SliceEnv<Entry>` is equivalent to an `[Entry]` internally
        unsafe { std::mem::transmute::<&mut [_], &mut SliceEnv<_>>(&mut self.entries[..]) }
    }
}

impl<Entry> Default for UniqueEnv<Entry> {
    fn default() -> UniqueEnv<Entry> {
        UniqueEnv::new()
    }
}

/// An environment backed by a slice.
#[derive(Debug)]
pub struct SliceEnv<Entry> {
    entries: [Entry],
}

impl<Entry> SliceEnv<Entry> {
    /// The length of the environment.
    pub fn len(&self) -> EnvLen {
        // `UniqueEnv` is the only way to construct a `SliceEnv`, and it
        // ensures that the length never exceeds the maximum `RawVar`.
        EnvLen(self.entries.len() as RawVar)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup an entry in the environment by level.
    pub fn get_level(&self, level: Level) -> Option<&Entry> {
        self.entries.get(level.0 as usize)
    }

    /// Lookup an entry in the environment by index.
    pub fn get_index(&self, index: Index) -> Option<&Entry> {
        self.get_level(self.len().index_to_level(index)?)
    }

    /// Set an entry in the environment by level.
    pub fn set_level(&mut self, level: Level, entry: Entry) {
        self.entries[level.0 as usize] = entry;
    }

    /// Iterate over the entries in the environment.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Entry> {
        self.entries.iter()
    }
}

/// A persistent environment with structural sharing.
#[derive(Clone)]
pub struct SharedEnv<Entry> {
    // An `rpds::Vector` is used instead of an `im::Vector` as it is a bit
    // more compact, which matters because these environments are captured in
    // closure values and cloned often.
    entries: rpds::VectorSync<Entry>,
}

impl<Entry> SharedEnv<Entry> {
    /// Construct a new, empty environment.
    pub fn new() -> SharedEnv<Entry> {
        SharedEnv {
            entries: rpds::Vector::new_sync(),
        }
    }

    /// The length of the environment.
    pub fn len(&self) -> EnvLen {
        EnvLen(self.entries.len() as RawVar)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup an entry in the environment by level.
    pub fn get_level(&self, level: Level) -> Option<&Entry> {
        self.entries.get(level.0 as usize)
    }

    /// Lookup an entry in the environment by index.
    pub fn get_index(&self, index: Index) -> Option<&Entry> {
        self.get_level(self.len().index_to_level(index)?)
    }

    /// Push an entry onto the environment.
    pub fn push(&mut self, entry: Entry) {
        assert!(self.entries.len() < RawVar::MAX as usize);
        self.entries.push_back_mut(entry);
    }

    /// Pop an entry off the environment.
    pub fn pop(&mut self) {
        self.entries.drop_last_mut();
    }

    /// Truncate the environment to the given length.
    pub fn truncate(&mut self, len: EnvLen) {
        (len.0..self.len().0).for_each(|_| self.pop());
    }

    /// Iterate over the entries in the environment.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Entry> {
        self.entries.iter()
    }
}

impl<Entry> Default for SharedEnv<Entry> {
    fn default() -> SharedEnv<Entry> {
        SharedEnv::new()
    }
}

impl<Entry: fmt::Debug> fmt::Debug for SharedEnv<Entry> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
