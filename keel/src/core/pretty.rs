//! Pretty printing for core terms.
//!
//! Core terms are nameless, so the printer keeps a stack of binder names,
//! falling back to generated alphabetic names for binders without a name
//! hint. This is only used when rendering diagnostics; nothing round-trips
//! through the printed form.

use std::cell::RefCell;

use pretty::{Doc, DocAllocator, DocBuilder, DocPtr, RefDoc};
use scoped_arena::Scope;

use crate::core::universe::ULevel;
use crate::core::{Literal, Plicity, Term};
use crate::source::{StringId, StringInterner};

/// Term precedences
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    Top = 0,
    Let,
    Fun,
    App,
    Atomic,
}

const INDENT: isize = 4;

pub struct Context<'interner, 'arena> {
    interner: &'interner RefCell<StringInterner>,
    scope: &'arena Scope<'arena>,
    /// Names of the binders currently in scope, innermost last.
    binders: RefCell<Vec<StringId>>,
}

impl<'interner, 'arena> Context<'interner, 'arena> {
    pub fn new(
        interner: &'interner RefCell<StringInterner>,
        scope: &'arena Scope<'arena>,
    ) -> Context<'interner, 'arena> {
        Context {
            interner,
            scope,
            binders: RefCell::new(Vec::new()),
        }
    }

    fn string_id(&'arena self, name: StringId) -> DocBuilder<'arena, Self> {
        match self.interner.borrow().resolve(name) {
            Some(name) => self.text(name.to_owned()),
            None => self.text("#error"),
        }
    }

    /// Resolve a binder name hint, generating a fresh alphabetic name when
    /// the binder is unnamed, and push it onto the binder stack.
    fn push_binder(&'arena self, name: Option<StringId>) -> StringId {
        let name = match name {
            Some(name) => name,
            None => {
                let fresh = self.binders.borrow().len();
                self.interner.borrow_mut().get_alphabetic_name(fresh)
            }
        };
        self.binders.borrow_mut().push(name);
        name
    }

    fn pop_binder(&'arena self) {
        self.binders.borrow_mut().pop();
    }

    fn local_var(&'arena self, index: usize) -> DocBuilder<'arena, Self> {
        let binders = self.binders.borrow();
        match binders.len().checked_sub(index + 1).map(|i| binders[i]) {
            Some(name) => {
                drop(binders);
                self.string_id(name)
            }
            None => self.text("#var"),
        }
    }

    pub fn level(&'arena self, level: &ULevel<'_>) -> DocBuilder<'arena, Self> {
        // Collapse successor chains into an offset.
        let mut offset = 0u32;
        let mut level = level;
        while let ULevel::Succ(inner) = level {
            offset += 1;
            level = *inner;
        }
        let base = match level {
            ULevel::Zero => return self.text(offset.to_string()),
            ULevel::Param(param) => self.text(format!("u{param}")),
            ULevel::Max(lhs, rhs) => self.concat([
                self.text("(max"),
                self.space(),
                self.level(lhs),
                self.space(),
                self.level(rhs),
                self.text(")"),
            ]),
            ULevel::IMax(lhs, rhs) => self.concat([
                self.text("(imax"),
                self.space(),
                self.level(lhs),
                self.space(),
                self.level(rhs),
                self.text(")"),
            ]),
            ULevel::Succ(_) => unreachable!("successors were collapsed above"),
        };
        match offset {
            0 => base,
            _ => self.concat([base, self.text(format!("+{offset}"))]),
        }
    }

    pub fn term(&'arena self, term: &Term<'_>) -> DocBuilder<'arena, Self> {
        self.term_prec(Prec::Top, term)
    }

    pub fn term_prec(&'arena self, prec: Prec, term: &Term<'_>) -> DocBuilder<'arena, Self> {
        match term {
            Term::LocalVar(_, var) => self.local_var(var.to_usize()),
            Term::Const(_, name, levels) => {
                let name_doc = self.string_id(name.id());
                if levels.is_empty() {
                    name_doc
                } else {
                    self.concat([
                        name_doc,
                        self.text(".{"),
                        self.intersperse(
                            levels.iter().map(|level| self.level(level)),
                            self.concat([self.text(","), self.space()]),
                        ),
                        self.text("}"),
                    ])
                }
            }
            Term::MetaVar(_, var) | Term::InsertedMeta(_, var, _) => {
                self.text(format!("?{}", var.to_usize()))
            }
            Term::Sort(_, level) => match level {
                ULevel::Zero => self.text("Prop"),
                ULevel::Succ(ULevel::Zero) => self.text("Type"),
                level => self.concat([self.text("Sort"), self.space(), self.level(level)]),
            },
            Term::Ann(_, expr, r#type) => self.paren(
                prec > Prec::Top,
                self.concat([
                    self.concat([
                        self.term_prec(Prec::Let, expr),
                        self.space(),
                        self.text(":"),
                    ])
                    .group(),
                    self.softline(),
                    self.term_prec(Prec::Top, r#type),
                ]),
            ),
            Term::Let(_, name, r#type, expr, body) => {
                let type_doc = self.term_prec(Prec::Top, r#type);
                let expr_doc = self.term_prec(Prec::Let, expr);
                let name = self.push_binder(*name);
                let body_doc = self.term_prec(Prec::Let, body);
                self.pop_binder();
                let def = self
                    .concat([
                        self.text("let"),
                        self.space(),
                        self.string_id(name),
                        self.space(),
                        self.text(":"),
                        self.space(),
                        type_doc,
                        self.space(),
                        self.text("="),
                        self.softline(),
                        expr_doc,
                        self.text(";"),
                    ])
                    .group();
                self.paren(prec > Prec::Let, self.concat([def, self.line(), body_doc]))
            }
            Term::FunType(_, plicity, name, dom, cod) => {
                let dom_doc = self.term_prec(Prec::App, dom);
                let name = self.push_binder(*name);
                let cod_doc = self.term_prec(Prec::Fun, cod);
                self.pop_binder();
                self.paren(
                    prec > Prec::Fun,
                    self.concat([
                        self.concat([
                            self.text("fun"),
                            self.space(),
                            self.plicity_binder(*plicity, name, Some(dom_doc)),
                            self.space(),
                            self.text("->"),
                        ])
                        .group(),
                        self.softline(),
                        cod_doc,
                    ]),
                )
            }
            Term::FunLit(_, plicity, name, body) => {
                let name = self.push_binder(*name);
                let body_doc = self.term_prec(Prec::Let, body);
                self.pop_binder();
                self.paren(
                    prec > Prec::Fun,
                    self.concat([
                        self.concat([
                            self.text("fun"),
                            self.space(),
                            self.plicity_binder(*plicity, name, None),
                            self.space(),
                            self.text("=>"),
                        ])
                        .group(),
                        self.space(),
                        body_doc,
                    ]),
                )
            }
            Term::FunApp(_, plicity, fun, arg) => {
                let arg_doc = match plicity {
                    Plicity::Explicit => self.term_prec(Prec::Atomic, arg),
                    Plicity::Implicit => self.concat([
                        self.text("{"),
                        self.term_prec(Prec::Top, arg),
                        self.text("}"),
                    ]),
                    Plicity::Instance => self.concat([
                        self.text("["),
                        self.term_prec(Prec::Top, arg),
                        self.text("]"),
                    ]),
                };
                self.paren(
                    prec > Prec::App,
                    self.concat([self.term_prec(Prec::App, fun), self.space(), arg_doc]),
                )
            }
            Term::RecordType(_, labels, types) => {
                let mut fields = Vec::with_capacity(labels.len());
                for (label, r#type) in Iterator::zip(labels.iter(), types.iter()) {
                    let type_doc = self.term_prec(Prec::Top, r#type);
                    fields.push(self.concat([
                        self.string_id(*label),
                        self.space(),
                        self.text(":"),
                        self.space(),
                        type_doc,
                    ]));
                    self.push_binder(Some(*label));
                }
                for _ in labels.iter() {
                    self.pop_binder();
                }
                self.sequence(
                    self.text("{"),
                    fields.into_iter(),
                    self.text(","),
                    self.text("}"),
                )
            }
            Term::RecordLit(_, labels, exprs) => self.sequence(
                self.text("{"),
                Iterator::zip(labels.iter(), exprs.iter())
                    .map(|(label, expr)| {
                        self.concat([
                            self.string_id(*label),
                            self.space(),
                            self.text("="),
                            self.space(),
                            self.term_prec(Prec::Top, expr),
                        ])
                    })
                    .collect::<Vec<_>>()
                    .into_iter(),
                self.text(","),
                self.text("}"),
            ),
            Term::RecordProj(_, head, label) => self.concat([
                self.term_prec(Prec::Atomic, head),
                self.text("."),
                self.string_id(*label),
            ]),
            Term::Lit(_, Literal::Nat(n)) => self.text(n.to_string()),
            Term::Lit(_, Literal::Str(s)) => {
                self.concat([self.text("\""), self.string_id(*s), self.text("\"")])
            }
            Term::Error(_) => self.text("#error"),
        }
    }

    fn plicity_binder(
        &'arena self,
        plicity: Plicity,
        name: StringId,
        r#type: Option<DocBuilder<'arena, Self>>,
    ) -> DocBuilder<'arena, Self> {
        let (open, close) = match plicity {
            Plicity::Explicit => ("(", ")"),
            Plicity::Implicit => ("{", "}"),
            Plicity::Instance => ("[", "]"),
        };
        match r#type {
            Some(r#type) => self.concat([
                self.text(open),
                self.string_id(name),
                self.space(),
                self.text(":"),
                self.space(),
                r#type,
                self.text(close),
            ]),
            None => match plicity {
                Plicity::Explicit => self.string_id(name),
                _ => self.concat([self.text(open), self.string_id(name), self.text(close)]),
            },
        }
    }

    /// Wrap a document in parens.
    fn paren(&'arena self, wrap: bool, doc: DocBuilder<'arena, Self>) -> DocBuilder<'arena, Self> {
        if wrap {
            self.concat([self.text("("), doc, self.text(")")])
        } else {
            doc
        }
    }

    /// Pretty prints a delimited sequence of documents with a trailing
    /// separator if it is formatted over multiple lines.
    pub fn sequence(
        &'arena self,
        start_delim: DocBuilder<'arena, Self>,
        docs: impl ExactSizeIterator<Item = DocBuilder<'arena, Self>> + Clone,
        separator: DocBuilder<'arena, Self>,
        end_delim: DocBuilder<'arena, Self>,
    ) -> DocBuilder<'arena, Self> {
        if docs.len() == 0 {
            self.concat([start_delim, end_delim])
        } else {
            DocBuilder::flat_alt(
                self.concat([
                    start_delim.clone(),
                    self.concat(
                        docs.clone()
                            .map(|doc| self.concat([self.hardline(), doc, separator.clone()])),
                    )
                    .nest(INDENT),
                    self.hardline(),
                    end_delim.clone(),
                ]),
                self.concat([
                    start_delim,
                    self.space(),
                    self.intersperse(docs, self.concat([separator, self.space()])),
                    self.space(),
                    end_delim,
                ]),
            )
            .group()
        }
    }
}

impl<'interner, 'arena, A: 'arena> DocAllocator<'arena, A> for Context<'interner, 'arena> {
    type Doc = RefDoc<'arena, A>;

    #[inline]
    fn alloc(&'arena self, doc: Doc<'arena, Self::Doc, A>) -> Self::Doc {
        // Based on the `DocAllocator` implementation for `pretty::Arena`
        RefDoc(match doc {
            // Return 'static references for common variants to avoid some allocations
            Doc::Nil => &Doc::Nil,
            Doc::Hardline => &Doc::Hardline,
            Doc::Fail => &Doc::Fail,
            // space()
            Doc::BorrowedText(" ") => &Doc::BorrowedText(" "),
            // line()
            Doc::FlatAlt(RefDoc(Doc::Hardline), RefDoc(Doc::BorrowedText(" "))) => {
                &Doc::FlatAlt(RefDoc(&Doc::Hardline), RefDoc(&Doc::BorrowedText(" ")))
            }
            // line_()
            Doc::FlatAlt(RefDoc(Doc::Hardline), RefDoc(Doc::Nil)) => {
                &Doc::FlatAlt(RefDoc(&Doc::Hardline), RefDoc(&Doc::Nil))
            }
            // softline()
            Doc::Group(RefDoc(Doc::FlatAlt(
                RefDoc(Doc::Hardline),
                RefDoc(Doc::BorrowedText(" ")),
            ))) => &Doc::Group(RefDoc(&Doc::FlatAlt(
                RefDoc(&Doc::Hardline),
                RefDoc(&Doc::BorrowedText(" ")),
            ))),
            // softline_()
            Doc::Group(RefDoc(Doc::FlatAlt(RefDoc(Doc::Hardline), RefDoc(Doc::Nil)))) => {
                &Doc::Group(RefDoc(&Doc::FlatAlt(
                    RefDoc(&Doc::Hardline),
                    RefDoc(&Doc::Nil),
                )))
            }

            // Language tokens
            Doc::BorrowedText("fun") => &Doc::BorrowedText("fun"),
            Doc::BorrowedText("let") => &Doc::BorrowedText("let"),
            Doc::BorrowedText("Prop") => &Doc::BorrowedText("Prop"),
            Doc::BorrowedText("Type") => &Doc::BorrowedText("Type"),
            Doc::BorrowedText("Sort") => &Doc::BorrowedText("Sort"),
            Doc::BorrowedText(":") => &Doc::BorrowedText(":"),
            Doc::BorrowedText(",") => &Doc::BorrowedText(","),
            Doc::BorrowedText("=") => &Doc::BorrowedText("="),
            Doc::BorrowedText("=>") => &Doc::BorrowedText("=>"),
            Doc::BorrowedText(".") => &Doc::BorrowedText("."),
            Doc::BorrowedText("->") => &Doc::BorrowedText("->"),
            Doc::BorrowedText(";") => &Doc::BorrowedText(";"),
            Doc::BorrowedText("_") => &Doc::BorrowedText("_"),
            Doc::BorrowedText("{") => &Doc::BorrowedText("{"),
            Doc::BorrowedText("}") => &Doc::BorrowedText("}"),
            Doc::BorrowedText("[") => &Doc::BorrowedText("["),
            Doc::BorrowedText("]") => &Doc::BorrowedText("]"),
            Doc::BorrowedText("(") => &Doc::BorrowedText("("),
            Doc::BorrowedText(")") => &Doc::BorrowedText(")"),

            _ => self.scope.to_scope(doc),
        })
    }

    fn alloc_column_fn(
        &'arena self,
        f: impl 'arena + Fn(usize) -> Self::Doc,
    ) -> <Self::Doc as DocPtr<'arena, A>>::ColumnFn {
        self.scope.to_scope(f)
    }

    fn alloc_width_fn(
        &'arena self,
        f: impl 'arena + Fn(isize) -> Self::Doc,
    ) -> <Self::Doc as DocPtr<'arena, A>>::WidthFn {
        self.scope.to_scope(f)
    }
}

/// Render a term to a string at a fixed width. Convenience entry point for
/// error rendering.
pub fn render(interner: &RefCell<StringInterner>, term: &Term<'_>) -> String {
    let scope = Scope::new();
    let context = Context::new(interner, &scope);
    let doc = context.term(term).into_doc();
    format!("{}", doc.pretty(usize::MAX))
}
