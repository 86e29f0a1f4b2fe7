//! Diagnostic messages collected during elaboration.
//!
//! Messages are accumulated as plain data while elaboration runs and are
//! formatted on demand, so rendering cost is only paid for diagnostics that
//! are actually shown.

use std::cell::RefCell;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use itertools::Itertools;

use crate::source::{ByteRange, FileId, StringId, StringInterner};
use crate::surface::elaboration::{instances, unification, MetaSource};

/// Message produced during elaboration.
#[derive(Debug, Clone)]
pub enum Message {
    UnknownName {
        range: ByteRange,
        name: StringId,
        suggestion: Option<StringId>,
    },
    SortExpected {
        range: ByteRange,
        found: String,
    },
    BinderMissingType {
        range: ByteRange,
    },
    AmbiguousFunLiteral {
        range: ByteRange,
    },
    AmbiguousTacticBlock {
        range: ByteRange,
    },
    PlicityMismatch {
        head_range: ByteRange,
        arg_range: ByteRange,
        expected: &'static str,
        found: &'static str,
    },
    UnexpectedArgument {
        head_range: ByteRange,
        head_type: String,
        arg_range: ByteRange,
    },
    UnknownField {
        head_range: ByteRange,
        head_type: String,
        label_range: ByteRange,
        label: StringId,
    },
    DuplicateFieldLabels {
        range: ByteRange,
        labels: Vec<(ByteRange, StringId)>,
    },
    MismatchedFieldLabels {
        range: ByteRange,
        expr_labels: Vec<(ByteRange, StringId)>,
        type_labels: Vec<StringId>,
    },
    MissingRecordField {
        range: ByteRange,
        label: StringId,
        field_type: String,
    },
    FailedToUnify {
        range: ByteRange,
        expected: String,
        found: String,
        error: unification::Error,
    },
    GoalNotAFunction {
        range: ByteRange,
        goal: String,
    },
    AssumptionNotFound {
        range: ByteRange,
        goal: String,
    },
    UnexpectedTactic {
        range: ByteRange,
    },
    UnresolvedInstance {
        range: ByteRange,
        goal: String,
        failure: instances::Failure,
    },
    UnsolvedMeta {
        source: MetaSource,
    },
    /// The solution found for a named hole. Informational, not an error.
    HoleSolution {
        range: ByteRange,
        name: StringId,
        expr: String,
    },
}

impl Message {
    pub fn is_error(&self) -> bool {
        !matches!(self, Message::HoleSolution { .. })
    }

    pub fn to_diagnostic(
        &self,
        interner: &RefCell<StringInterner>,
        file_id: FileId,
    ) -> Diagnostic<FileId> {
        let primary_label = |range: &ByteRange| Label::primary(file_id, *range);
        let secondary_label = |range: &ByteRange| Label::secondary(file_id, *range);

        match self {
            Message::UnknownName {
                range,
                name,
                suggestion,
            } => {
                let name = interner.borrow().resolve(*name).map(str::to_owned);
                let name = name.as_deref().unwrap_or("?");
                let mut notes = Vec::new();
                if let Some(suggestion) = suggestion {
                    let suggestion = interner.borrow().resolve(*suggestion).map(str::to_owned);
                    if let Some(suggestion) = suggestion {
                        notes.push(format!("help: did you mean `{}`?", suggestion));
                    }
                }

                Diagnostic::error()
                    .with_message(format!("cannot find `{}` in scope", name))
                    .with_labels(vec![primary_label(range).with_message("unknown name")])
                    .with_notes(notes)
            }
            Message::SortExpected { range, found } => Diagnostic::error()
                .with_message("expected a sort")
                .with_labels(vec![primary_label(range)
                    .with_message(format!("expression of type {}", found))]),
            Message::BinderMissingType { range } => Diagnostic::error()
                .with_message("binder is missing a type annotation")
                .with_labels(vec![
                    primary_label(range).with_message("type annotation required")
                ]),
            Message::AmbiguousFunLiteral { range } => Diagnostic::error()
                .with_message("ambiguous function literal")
                .with_labels(vec![primary_label(range).with_message("type unknown")])
                .with_notes(vec![String::from(
                    "help: annotate the parameter, or check the function against a function type",
                )]),
            Message::AmbiguousTacticBlock { range } => Diagnostic::error()
                .with_message("tactic block has no expected type")
                .with_labels(vec![primary_label(range).with_message("goal unknown")]),
            Message::PlicityMismatch {
                head_range,
                arg_range,
                expected,
                found,
            } => Diagnostic::error()
                .with_message(format!(
                    "expected {} argument, found {} argument",
                    expected, found
                ))
                .with_labels(vec![
                    primary_label(arg_range).with_message(format!("{} argument", found)),
                    secondary_label(head_range)
                        .with_message(format!("expects {} argument", expected)),
                ]),
            Message::UnexpectedArgument {
                head_range,
                head_type,
                arg_range,
            } => Diagnostic::error()
                .with_message("unexpected argument")
                .with_labels(vec![
                    primary_label(arg_range).with_message("unexpected argument"),
                    secondary_label(head_range)
                        .with_message(format!("expression of type {}", head_type)),
                ]),
            Message::UnknownField {
                head_range,
                head_type,
                label_range,
                label,
            } => {
                let label = interner.borrow().resolve(*label).map(str::to_owned);
                let label = label.as_deref().unwrap_or("?");

                Diagnostic::error()
                    .with_message(format!("cannot find `{}` in expression", label))
                    .with_labels(vec![
                        primary_label(label_range).with_message("unknown field"),
                        secondary_label(head_range)
                            .with_message(format!("expression of type {}", head_type)),
                    ])
            }
            Message::DuplicateFieldLabels { range, labels } => Diagnostic::error()
                .with_message("duplicate labels found in record")
                .with_labels(
                    labels
                        .iter()
                        .map(|(label_range, _)| {
                            primary_label(label_range).with_message("duplicate label")
                        })
                        .chain(std::iter::once(secondary_label(range)))
                        .collect(),
                ),
            Message::MismatchedFieldLabels {
                range,
                expr_labels,
                type_labels,
            } => {
                let interner = interner.borrow();
                let found_labels = expr_labels
                    .iter()
                    .filter_map(|(_, label)| interner.resolve(*label))
                    .format_with(", ", |label, f| f(&format_args!("`{}`", label)));
                let expected_labels = type_labels
                    .iter()
                    .filter_map(|label| interner.resolve(*label))
                    .format_with(", ", |label, f| f(&format_args!("`{}`", label)));
                let notes = vec![
                    format!("expected fields {}", expected_labels),
                    format!("found fields {}", found_labels),
                ];
                drop(interner);

                Diagnostic::error()
                    .with_message("mismatched field labels in record")
                    .with_labels(vec![
                        primary_label(range).with_message("the record literal")
                    ])
                    .with_notes(notes)
            }
            Message::MissingRecordField {
                range,
                label,
                field_type,
            } => {
                let label = interner.borrow().resolve(*label).map(str::to_owned);
                let label = label.as_deref().unwrap_or("?");

                Diagnostic::error()
                    .with_message(format!("missing field `{}` in record", label))
                    .with_labels(vec![primary_label(range)
                        .with_message(format!("missing field of type {}", field_type))])
            }
            Message::FailedToUnify {
                range,
                expected,
                found,
                error,
            } => {
                let mut notes = vec![
                    format!("expected type {}", expected),
                    format!("   found type {}", found),
                ];
                match error {
                    unification::Error::Mismatch => {}
                    unification::Error::Spine(error) => match error {
                        unification::SpineError::NonLinearSpine(_) => notes.push(String::from(
                            "variable appeared more than once in problem spine",
                        )),
                        unification::SpineError::NonRigidFunApp => notes.push(String::from(
                            "non-variable function application in problem spine",
                        )),
                        unification::SpineError::RecordProj(_) => notes
                            .push(String::from("record projection found in problem spine")),
                    },
                    unification::Error::Rename(error) => match error {
                        unification::RenameError::EscapingLocalVar(_) => {
                            notes.push(String::from("local variable escapes solution"));
                        }
                        unification::RenameError::InfiniteSolution => {
                            notes.push(String::from("solution would be infinite in size"));
                        }
                    },
                }

                Diagnostic::error()
                    .with_message("mismatched types")
                    .with_labels(vec![primary_label(range).with_message("type mismatch")])
                    .with_notes(notes)
            }
            Message::GoalNotAFunction { range, goal } => Diagnostic::error()
                .with_message("`intro` expects a function goal")
                .with_labels(vec![
                    primary_label(range).with_message(format!("goal is {}", goal))
                ]),
            Message::AssumptionNotFound { range, goal } => Diagnostic::error()
                .with_message("no assumption matches the goal")
                .with_labels(vec![
                    primary_label(range).with_message(format!("goal is {}", goal))
                ]),
            Message::UnexpectedTactic { range } => Diagnostic::error()
                .with_message("tactic found after the goal was closed")
                .with_labels(vec![primary_label(range).with_message("unreachable tactic")]),
            Message::UnresolvedInstance {
                range,
                goal,
                failure,
            } => {
                let notes = match failure {
                    instances::Failure::NoCandidate => Vec::new(),
                    instances::Failure::DepthExceeded => vec![String::from(
                        "help: instance search gave up past its maximum depth",
                    )],
                };

                Diagnostic::error()
                    .with_message(format!("cannot find an instance of {}", goal))
                    .with_labels(vec![
                        primary_label(range).with_message("unresolved instance")
                    ])
                    .with_notes(notes)
            }
            Message::UnsolvedMeta { source } => {
                let (range, name) = match source {
                    MetaSource::HoleExpr(range, name) => {
                        let name = interner.borrow().resolve(*name).map(str::to_owned);
                        (range, name)
                    }
                    MetaSource::HoleType(range, _)
                    | MetaSource::PlaceholderType(range)
                    | MetaSource::PlaceholderExpr(range)
                    | MetaSource::InstanceArg(range)
                    | MetaSource::TacticGoal(range)
                    | MetaSource::ReportedErrorType(range) => (range, None),
                    MetaSource::ImplicitArg(range, name) => {
                        let name = (*name)
                            .and_then(|name| interner.borrow().resolve(name).map(str::to_owned));
                        (range, name)
                    }
                    MetaSource::MissingRecordField(range, label) => {
                        let label = interner.borrow().resolve(*label).map(str::to_owned);
                        (range, label)
                    }
                };
                let label_message = match source {
                    MetaSource::HoleExpr(..) => "unsolved hole",
                    MetaSource::ImplicitArg(..) => "unsolved implicit argument",
                    MetaSource::InstanceArg(..) => "unsolved instance argument",
                    MetaSource::MissingRecordField(..) => "unsolved record field",
                    MetaSource::TacticGoal(..) => "unsolved goal",
                    _ => "unsolved placeholder",
                };
                let message = match name {
                    Some(name) => format!("failed to infer `{}`", name),
                    None => String::from("failed to infer expression"),
                };

                Diagnostic::error()
                    .with_message(message)
                    .with_labels(vec![primary_label(range).with_message(label_message)])
            }
            Message::HoleSolution { range, name, expr } => {
                let name = interner.borrow().resolve(*name).map(str::to_owned);
                let name = name.as_deref().unwrap_or("?");

                Diagnostic::note()
                    .with_message(format!("solution found for `?{}`", name))
                    .with_labels(vec![
                        primary_label(range).with_message(format!("solved as {}", expr))
                    ])
            }
        }
    }
}
