//! Lexer for the kiln project-description language.
//!
//! Both surface forms share one token set. Words are deliberately permissive:
//! they cover identifiers (`hello`), dotted file names (`hello.c`), hyphenated
//! toolset ids (`gnu-osx`), and anchored paths (`@top/windows`), so the parser
//! decides from position whether a word is a keyword, a name, or a path.

use logos::Logos;
use miette::SourceSpan;
use serde::Serialize;
use thiserror::Error;

/// Half-open byte range into the source text.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Span {
    /// Creates a span covering `start..end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        Self::new(span.start.into(), span.end.saturating_sub(span.start))
    }
}

/// A single lexical token borrowed from the source text.
#[derive(Logos, Clone, Copy, Debug, Eq, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token<'src> {
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `,`
    #[token(",")]
    Comma,
    /// `;`
    #[token(";")]
    Semi,
    /// `?`
    #[token("?")]
    Question,
    /// `:`
    #[token(":")]
    Colon,
    /// `=`
    #[token("=")]
    Eq,
    /// `+=`
    #[token("+=")]
    PlusEq,
    /// `==`
    #[token("==")]
    EqEq,
    /// `!=`
    #[token("!=")]
    NotEq,
    /// `&&`
    #[token("&&")]
    AndAnd,
    /// `||`
    #[token("||")]
    OrOr,
    /// `!`
    #[token("!")]
    Bang,
    /// Variable reference `$(name)`; holds the inner name.
    #[regex(r"\$\([A-Za-z0-9_][A-Za-z0-9_.]*\)", reference_name)]
    Reference(&'src str),
    /// Quoted string literal; holds the raw slice including quotes, escapes
    /// unresolved. The parser unescapes so it can report bad escapes with a
    /// position.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    Str(&'src str),
    /// Bare word: identifier, file name, toolset id, or anchored path.
    #[regex(r"[A-Za-z0-9_@][-A-Za-z0-9_@.]*(/[-A-Za-z0-9_@.]+)*", |lex| lex.slice())]
    Word(&'src str),
}

fn reference_name<'src>(lex: &mut logos::Lexer<'src, Token<'src>>) -> Option<&'src str> {
    let slice = lex.slice();
    slice.get(2..slice.len().saturating_sub(1))
}

/// Reason a chunk of input failed to lex.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum LexErrorKind {
    /// A string literal was opened but never closed.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// A block comment was opened but never closed.
    #[error("unterminated block comment")]
    UnterminatedComment,
    /// A character outside the language's alphabet.
    #[error("unrecognized character")]
    UnexpectedCharacter,
}

/// Error raised when source text cannot be tokenized.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct LexError {
    /// What went wrong.
    pub kind: LexErrorKind,
    /// Where it went wrong.
    pub span: Span,
}

/// Tokenizes `source`, returning tokens paired with their spans.
///
/// # Errors
///
/// Returns a [`LexError`] at the first byte that cannot start a token,
/// classifying unterminated strings and comments separately so the caller
/// can point at the opening delimiter.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, Span)>, LexError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(item) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start, range.end);
        match item {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(LexError {
                    kind: classify_failure(source, range.start),
                    span,
                });
            }
        }
    }
    Ok(tokens)
}

fn classify_failure(source: &str, at: usize) -> LexErrorKind {
    let rest = source.get(at..).unwrap_or_default();
    if rest.starts_with("/*") {
        LexErrorKind::UnterminatedComment
    } else if rest.starts_with('"') {
        LexErrorKind::UnterminatedString
    } else {
        LexErrorKind::UnexpectedCharacter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn lexes_words_paths_and_toolset_ids() {
        assert_eq!(
            kinds("hello.c gnu-osx @top/windows x86_64"),
            vec![
                Token::Word("hello.c"),
                Token::Word("gnu-osx"),
                Token::Word("@top/windows"),
                Token::Word("x86_64"),
            ],
        );
    }

    #[test]
    fn lexes_assignment_and_append() {
        assert_eq!(
            kinds("defines += PRINT_DETAILS;"),
            vec![
                Token::Word("defines"),
                Token::PlusEq,
                Token::Word("PRINT_DETAILS"),
                Token::Semi,
            ],
        );
    }

    #[test]
    fn reference_token_strips_dollar_parens() {
        assert_eq!(kinds("$(toolset)"), vec![Token::Reference("toolset")]);
        assert_eq!(
            kinds("$(vs2008.projectfile)"),
            vec![Token::Reference("vs2008.projectfile")],
        );
    }

    #[test]
    fn distinguishes_eq_from_eqeq() {
        assert_eq!(
            kinds("a = b == c != d"),
            vec![
                Token::Word("a"),
                Token::Eq,
                Token::Word("b"),
                Token::EqEq,
                Token::Word("c"),
                Token::NotEq,
                Token::Word("d"),
            ],
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        let source = "a // trailing\n/* block\n * with stars */ b /***/ c";
        assert_eq!(
            kinds(source),
            vec![Token::Word("a"), Token::Word("b"), Token::Word("c")],
        );
    }

    #[test]
    fn string_literal_keeps_raw_slice() {
        assert_eq!(
            kinds(r#""my file.c""#),
            vec![Token::Str(r#""my file.c""#)],
        );
    }

    #[test]
    fn spans_cover_token_bytes() {
        let tokens = lex("ab cd").expect("lex");
        let spans: Vec<Span> = tokens.into_iter().map(|(_, span)| span).collect();
        assert_eq!(spans, vec![Span::new(0, 2), Span::new(3, 5)]);
    }

    #[test]
    fn unterminated_comment_is_classified() {
        let err = lex("ok /* never closed").expect_err("lex failure");
        assert_eq!(err.kind, LexErrorKind::UnterminatedComment);
    }

    #[test]
    fn unterminated_string_is_classified() {
        let err = lex("x = \"open").expect_err("lex failure");
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        let err = lex("a ^ b").expect_err("lex failure");
        assert_eq!(err.kind, LexErrorKind::UnexpectedCharacter);
        assert_eq!(err.span, Span::new(2, 3));
    }

    #[test]
    fn merge_spans() {
        let merged = Span::new(4, 7).merge(Span::new(1, 5));
        assert_eq!(merged, Span::new(1, 7));
    }
}
