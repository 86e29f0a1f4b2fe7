//! Session configuration.
//!
//! The elaborator is configured through a generic key/value option store.
//! The handful of options the core actually consumes are read *once* when a
//! session is created and frozen into an [`ElabConfig`]; no component can
//! observe a different value mid-session, and there is no process-wide
//! mutable registry to initialize or tear down.

use fxhash::FxHashMap;

/// Option keys read by the elaborator.
pub mod keys {
    /// Consider local hypotheses during instance resolution. Default: `true`.
    pub const LOCAL_INSTANCES: &str = "elaborator.local_instances";
    /// Skip instance resolution entirely, leaving instance-kind
    /// metavariables unassigned. Default: `false`.
    pub const IGNORE_INSTANCES: &str = "elaborator.ignore_instances";
    /// Emit a goal snapshot to the diagnostic sink before each tactic step.
    /// Default: `false`.
    pub const FLYCHECK_GOALS: &str = "elaborator.flycheck_goals";
    /// Report an error for structure literal fields the user did not supply,
    /// instead of inserting a placeholder. Default: `false`.
    pub const FAIL_IF_MISSING_FIELD: &str = "elaborator.fail_if_missing_field";
    /// Derive coercions between function types from registered coercions
    /// between their codomains. Default: `true`.
    pub const LIFT_COERCIONS: &str = "elaborator.lift_coercions";
}

/// A value held in the option store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Nat(u64),
    String(String),
}

/// A generic key/value option store. Keys are dotted paths such as
/// `elaborator.lift_coercions`.
#[derive(Debug, Clone, Default)]
pub struct Options {
    entries: FxHashMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: OptionValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, OptionValue::Bool(value));
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key)
    }

    /// Read a boolean option, falling back to `default` when the key is
    /// absent or holds a value of a different shape.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.entries.get(key) {
            Some(OptionValue::Bool(value)) => *value,
            Some(_) | None => default,
        }
    }

    /// Read a numeric option, falling back to `default` when the key is
    /// absent or holds a value of a different shape.
    pub fn get_nat(&self, key: &str, default: u64) -> u64 {
        match self.entries.get(key) {
            Some(OptionValue::Nat(value)) => *value,
            Some(_) | None => default,
        }
    }
}

/// Elaboration configuration, frozen for the lifetime of a session.
///
/// The five option-backed flags are read from an [`Options`] store when the
/// config is built. `check_unassigned` is not option-backed: whether leftover
/// metavariables are an error is decided by the caller per declaration (an
/// interactive front end may defer resolution; batch checking may not).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ElabConfig {
    pub use_local_instances: bool,
    pub ignore_instances: bool,
    pub flycheck_goals: bool,
    pub fail_missing_field: bool,
    pub lift_coercions: bool,
    pub check_unassigned: bool,
}

impl ElabConfig {
    pub fn new(options: &Options, check_unassigned: bool) -> ElabConfig {
        ElabConfig {
            use_local_instances: options.get_bool(keys::LOCAL_INSTANCES, true),
            ignore_instances: options.get_bool(keys::IGNORE_INSTANCES, false),
            flycheck_goals: options.get_bool(keys::FLYCHECK_GOALS, false),
            fail_missing_field: options.get_bool(keys::FAIL_IF_MISSING_FIELD, false),
            lift_coercions: options.get_bool(keys::LIFT_COERCIONS, true),
            check_unassigned,
        }
    }
}

impl Default for ElabConfig {
    fn default() -> ElabConfig {
        ElabConfig::new(&Options::new(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let options = Options::new();
        assert!(options.get_bool(keys::LOCAL_INSTANCES, true));
        assert!(!options.get_bool(keys::IGNORE_INSTANCES, false));
        assert!(!options.get_bool(keys::FLYCHECK_GOALS, false));
        assert!(!options.get_bool(keys::FAIL_IF_MISSING_FIELD, false));
        assert!(options.get_bool(keys::LIFT_COERCIONS, true));

        let config = ElabConfig::new(&options, true);
        assert!(config.use_local_instances);
        assert!(!config.ignore_instances);
        assert!(!config.flycheck_goals);
        assert!(!config.fail_missing_field);
        assert!(config.lift_coercions);
        assert!(config.check_unassigned);
    }

    #[test]
    fn overrides_and_shape_mismatches() {
        let mut options = Options::new();
        options.set_bool(keys::LIFT_COERCIONS, false);
        options.set(keys::IGNORE_INSTANCES, OptionValue::Nat(1));

        let config = ElabConfig::new(&options, false);
        assert!(!config.lift_coercions);
        // A value of the wrong shape falls back to the default.
        assert!(!config.ignore_instances);
        assert!(!config.check_unassigned);
    }
}
