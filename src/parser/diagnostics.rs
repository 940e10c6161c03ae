//! Translates parse failures into labeled source diagnostics.

use camino::Utf8Path;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::lexer::{LexError, LexErrorKind, Span};

/// Classification of a [`SyntaxError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyntaxErrorKind {
    /// A token appeared where the grammar does not allow it.
    UnexpectedToken,
    /// A brace-delimited block (or block comment) was never closed.
    UnterminatedBlock,
    /// A word in directive position that names no known construct.
    UnknownDirective,
    /// A malformed literal, such as a bad string escape.
    InvalidLiteral,
}

/// Error raised when module source text cannot be parsed.
///
/// Rendered through miette, the error shows the offending snippet with a
/// label under the relevant span and an optional help line.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(kiln::parse))]
pub struct SyntaxError {
    kind: SyntaxErrorKind,
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
}

impl SyntaxError {
    /// What class of failure this is.
    #[must_use]
    pub const fn kind(&self) -> SyntaxErrorKind {
        self.kind
    }

    /// The failing byte range, when one is known.
    #[must_use]
    pub const fn span(&self) -> Option<SourceSpan> {
        self.span
    }
}

/// Parser-internal failure: a [`SyntaxError`] without the source attached.
///
/// Inner parsing code produces these so it does not have to thread the
/// source text and name everywhere; [`ParseIssue::into_syntax_error`]
/// attaches both at the parse entry point.
#[derive(Clone, Debug)]
pub(crate) struct ParseIssue {
    kind: SyntaxErrorKind,
    message: String,
    span: Span,
    help: Option<String>,
}

impl ParseIssue {
    pub(crate) fn unexpected(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: SyntaxErrorKind::UnexpectedToken,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub(crate) fn unterminated(what: &str, open_span: Span) -> Self {
        Self {
            kind: SyntaxErrorKind::UnterminatedBlock,
            message: format!("unterminated {what}"),
            span: open_span,
            help: Some(format!("the {what} opened here is never closed")),
        }
    }

    pub(crate) fn unknown_directive(word: &str, span: Span) -> Self {
        Self {
            kind: SyntaxErrorKind::UnknownDirective,
            message: format!("unknown directive `{word}`"),
            span,
            help: None,
        }
    }

    pub(crate) fn invalid_literal(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: SyntaxErrorKind::InvalidLiteral,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub(crate) fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub(crate) fn into_syntax_error(self, origin: &Utf8Path, source: &str) -> SyntaxError {
        SyntaxError {
            kind: self.kind,
            message: self.message,
            src: NamedSource::new(origin.as_str(), source.to_owned()),
            span: Some(self.span.into()),
            help: self.help,
        }
    }
}

impl From<LexError> for ParseIssue {
    fn from(err: LexError) -> Self {
        let kind = match err.kind {
            LexErrorKind::UnterminatedComment => SyntaxErrorKind::UnterminatedBlock,
            LexErrorKind::UnterminatedString => SyntaxErrorKind::InvalidLiteral,
            LexErrorKind::UnexpectedCharacter => SyntaxErrorKind::UnexpectedToken,
        };
        Self {
            kind,
            message: err.to_string(),
            span: err.span,
            help: None,
        }
    }
}
