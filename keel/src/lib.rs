//! The trusted core of the keel proof assistant.
//!
//! The crate is split into a small number of layers:
//!
//! - [`core`]: the kernel term language, the persistent declaration
//!   [environment][core::global::Environment], and the trusted
//!   [type checker][core::typing]. Only this layer is trusted for soundness.
//! - [`surface`]: partially-specified terms produced by an external parser,
//!   and the [elaborator][surface::elaboration] that completes them into
//!   kernel terms using metavariables, unification, instance resolution and
//!   coercion insertion.
//! - [`env`], [`source`], [`options`]: supporting machinery for nameless
//!   variable environments, source positions and interned strings, and the
//!   session configuration read from a key/value option store.

pub mod core;
pub mod env;
pub mod options;
pub mod source;
pub mod surface;

mod alloc;

pub use crate::source::{BytePos, ByteRange, FileId, StringId, StringInterner};

pub const BUG_REPORT_URL: &str = "https://github.com/keel-prover/keel/issues";
