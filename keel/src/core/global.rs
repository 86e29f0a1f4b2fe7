//! The declaration environment.
//!
//! An [`Environment`] is a persistent map from [names][Name] to checked
//! declarations, together with the auxiliary indices the elaborator consults
//! (instance and coercion tables). Extending an environment returns a *new*
//! environment that shares unchanged structure with the old one; nothing is
//! ever mutated destructively, so workers can hold snapshots and elaborate
//! against them without synchronisation.
//!
//! The environment's invariant is that every declaration it holds has passed
//! the kernel against the environment it was added to. The only way to add a
//! declaration is [`typing::add_declaration`][crate::core::typing::add_declaration],
//! which checks first and extends after; a half-checked declaration is never
//! observable.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::fmt;
use std::sync::{Arc, Mutex};

use scoped_arena::Scope;

use crate::core::typing::KernelError;
use crate::core::universe::ULevel;
use crate::core::{Name, Term};
use crate::source::{Span, StringId};
use crate::StringInterner;

/// How eagerly the kernel's reduction may unfold a definition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reducibility {
    /// Unfolded freely during reduction and definitional equality.
    Transparent,
    /// Never unfolded. Marking a definition irreducible makes it behave like
    /// an axiom during reduction while keeping its body in the environment.
    Irreducible,
}

/// A computation rule of a recursor: applications of the recursor whose major
/// premise is headed by `ctor` reduce to `rhs` applied to the motive, the
/// minor premises, and the constructor's fields.
#[derive(Debug, Clone)]
pub struct RecRule<'arena> {
    pub ctor: Name,
    pub num_fields: usize,
    pub rhs: &'arena Term<'arena>,
}

/// The kind-specific payload of a declaration.
#[derive(Debug, Clone)]
pub enum DeclKind<'arena> {
    /// A constant with no body.
    Axiom,
    /// A definition with a body.
    Definition {
        body: &'arena Term<'arena>,
        reducibility: Reducibility,
    },
    /// An inductive type, listing its constructors in declaration order.
    Inductive { ctors: Vec<Name> },
    /// A constructor of an inductive type.
    Constructor {
        inductive: Name,
        index: usize,
        num_fields: usize,
    },
    /// The recursor of an inductive type.
    Recursor {
        inductive: Name,
        num_minors: usize,
        rules: Vec<RecRule<'arena>>,
    },
}

/// A checked declaration.
#[derive(Debug, Clone)]
pub struct Declaration<'arena> {
    pub name: Name,
    /// Names of the universe level parameters bound by this declaration.
    /// Level arguments on a [`Term::Const`] referencing it are positional
    /// against this list.
    pub level_params: Vec<StringId>,
    pub r#type: &'arena Term<'arena>,
    pub kind: DeclKind<'arena>,
}

impl<'arena> Declaration<'arena> {
    /// The definition body, if reduction is allowed to unfold it.
    pub fn unfoldable_body(&self) -> Option<&'arena Term<'arena>> {
        match &self.kind {
            DeclKind::Definition {
                body,
                reducibility: Reducibility::Transparent,
            } => Some(body),
            _ => None,
        }
    }
}

/// A registered instance for a class.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InstanceEntry {
    pub name: Name,
    pub priority: u32,
    /// Registration order, used to break priority ties.
    order: u64,
}

/// Names of the built-in base type declarations, resolved once when the
/// environment is created so that literal typing does not need the interner.
#[derive(Debug, Copy, Clone)]
pub struct Prims {
    pub nat: Name,
    pub string: Name,
}

/// A persistent store of checked declarations.
#[derive(Clone)]
pub struct Environment<'arena> {
    decls: rpds::HashTrieMapSync<Name, Arc<Declaration<'arena>>>,
    instances: rpds::HashTrieMapSync<Name, Arc<[InstanceEntry]>>,
    coercions: rpds::HashTrieMapSync<(Name, Name), Name>,
    instance_order: u64,
    prims: Prims,
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("num_decls", &self.decls.size())
            .finish_non_exhaustive()
    }
}

impl<'arena> Environment<'arena> {
    /// Construct an environment containing only the built-in base types.
    pub fn new(
        interner: &RefCell<StringInterner>,
        scope: &'arena Scope<'arena>,
    ) -> Environment<'arena> {
        let prims = Prims {
            nat: Name::intern(interner, "Nat"),
            string: Name::intern(interner, "String"),
        };
        let type0: &Term<'arena> = scope.to_scope(Term::Sort(Span::Empty, ULevel::lit(scope, 1)));
        let base_type = |name| {
            Arc::new(Declaration {
                name,
                level_params: Vec::new(),
                r#type: type0,
                kind: DeclKind::Axiom,
            })
        };

        Environment {
            decls: rpds::HashTrieMap::new_sync()
                .insert(prims.nat, base_type(prims.nat))
                .insert(prims.string, base_type(prims.string)),
            instances: rpds::HashTrieMap::new_sync(),
            coercions: rpds::HashTrieMap::new_sync(),
            instance_order: 0,
            prims,
        }
    }

    pub fn prims(&self) -> &Prims {
        &self.prims
    }

    /// Look up a declaration by name.
    pub fn get(&self, name: Name) -> Option<&Arc<Declaration<'arena>>> {
        self.decls.get(&name)
    }

    pub fn contains(&self, name: Name) -> bool {
        self.decls.contains_key(&name)
    }

    /// The number of declarations in the environment.
    pub fn num_decls(&self) -> usize {
        self.decls.size()
    }

    /// Iterate over the declared names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.decls.keys().copied()
    }

    /// Extend the environment with a declaration that has already been
    /// checked. Only the kernel may call this; everyone else goes through
    /// [`typing::add_declaration`][crate::core::typing::add_declaration].
    pub(crate) fn with_decl(&self, decl: Declaration<'arena>) -> Environment<'arena> {
        Environment {
            decls: self.decls.insert(decl.name, Arc::new(decl)),
            ..self.clone()
        }
    }

    /// The registered instances for a class, highest priority first.
    pub fn instances(&self, class: Name) -> &[InstanceEntry] {
        self.instances.get(&class).map_or(&[], |entries| &entries[..])
    }

    /// Register a declared name as an instance of the class its type
    /// targets. The class is the constant heading the final codomain of the
    /// instance's type.
    pub fn register_instance(
        &self,
        name: Name,
        priority: u32,
    ) -> Result<Environment<'arena>, KernelError<'arena>> {
        let decl = match self.get(name) {
            Some(decl) => decl,
            None => return Err(KernelError::unknown_declaration(self.clone(), name)),
        };
        let class = match class_of(decl.r#type) {
            Some(class) => class,
            None => return Err(KernelError::invalid_instance(self.clone(), name, decl.r#type)),
        };

        let entry = InstanceEntry {
            name,
            priority,
            order: self.instance_order,
        };
        let mut entries: Vec<_> = self.instances(class).to_vec();
        entries.push(entry);
        entries.sort_by_key(|entry| (Reverse(entry.priority), entry.order));

        Ok(Environment {
            instances: self.instances.insert(class, entries.into()),
            instance_order: self.instance_order + 1,
            ..self.clone()
        })
    }

    /// The registered coercion from `from` to `to`, if any.
    pub fn coercion(&self, from: Name, to: Name) -> Option<Name> {
        self.coercions.get(&(from, to)).copied()
    }

    /// Register a declared name as a coercion. Its type must be a function
    /// from one constant-headed type to another; the pair of head constants
    /// keys the coercion table.
    pub fn register_coercion(
        &self,
        name: Name,
    ) -> Result<Environment<'arena>, KernelError<'arena>> {
        let decl = match self.get(name) {
            Some(decl) => decl,
            None => return Err(KernelError::unknown_declaration(self.clone(), name)),
        };
        let (from, to) = match decl.r#type {
            Term::FunType(_, _, _, dom, cod) => match (head_const(dom), head_const(cod)) {
                (Some(from), Some(to)) => (from, to),
                (_, _) => {
                    return Err(KernelError::invalid_coercion(self.clone(), name, decl.r#type))
                }
            },
            _ => return Err(KernelError::invalid_coercion(self.clone(), name, decl.r#type)),
        };

        Ok(Environment {
            coercions: self.coercions.insert((from, to), name),
            ..self.clone()
        })
    }
}

/// The constant heading a (possibly applied) type.
pub fn head_const(mut r#type: &Term<'_>) -> Option<Name> {
    loop {
        match r#type {
            Term::Const(_, name, _) => return Some(*name),
            Term::FunApp(_, _, fun, _) => r#type = fun,
            Term::Ann(_, expr, _) => r#type = expr,
            _ => return None,
        }
    }
}

/// The class targeted by an instance type: the constant heading the final
/// codomain, under any leading binders.
pub fn class_of(mut r#type: &Term<'_>) -> Option<Name> {
    loop {
        match r#type {
            Term::FunType(_, _, _, _, cod) => r#type = cod,
            _ => return head_const(r#type),
        }
    }
}

/// A monotonically increasing version of a shared environment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

/// The serialized commit point for concurrent workers.
///
/// A worker takes a [snapshot][EnvStore::snapshot], elaborates and checks a
/// declaration purely against it, and then [commits][EnvStore::try_commit].
/// The commit is all-or-nothing: it is rejected with
/// [`CommitError::Conflict`] when the store advanced past the worker's
/// snapshot, in which case the worker retries against a fresh snapshot.
pub struct EnvStore<'arena> {
    inner: Mutex<(Generation, Environment<'arena>)>,
}

/// The outcome of a failed commit.
#[derive(Debug)]
pub enum CommitError<'arena> {
    /// The environment advanced underneath the worker; retry against a fresh
    /// snapshot.
    Conflict,
    /// The declaration failed kernel checking against the current
    /// environment.
    Kernel(KernelError<'arena>),
}

impl<'arena> EnvStore<'arena> {
    pub fn new(env: Environment<'arena>) -> EnvStore<'arena> {
        EnvStore {
            inner: Mutex::new((Generation(0), env)),
        }
    }

    /// Capture the current environment and its generation. The returned
    /// environment is a persistent value; later commits do not affect it.
    pub fn snapshot(&self) -> (Generation, Environment<'arena>) {
        let inner = self.lock();
        (inner.0, inner.1.clone())
    }

    /// Atomically extend the environment with a new declaration, provided no
    /// other worker has committed since `base` was snapshotted. The
    /// declaration is re-checked by the kernel under the lock, so the
    /// environment invariant holds no matter what the worker did.
    pub fn try_commit(
        &self,
        scope: &'arena Scope<'arena>,
        base: Generation,
        decl: &crate::core::typing::NewDeclaration<'arena>,
    ) -> Result<(Generation, Environment<'arena>), CommitError<'arena>> {
        let mut inner = self.lock();
        if inner.0 != base {
            return Err(CommitError::Conflict);
        }
        let env = crate::core::typing::add_declaration(scope, &inner.1, decl)
            .map_err(CommitError::Kernel)?;
        inner.0 = Generation(inner.0 .0 + 1);
        inner.1 = env.clone();
        Ok((inner.0, env))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (Generation, Environment<'arena>)> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned environment store still holds a consistent
            // environment: commits replace it wholesale under the lock.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
