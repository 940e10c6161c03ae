//! Expression parsing: a small Pratt loop over unary and primary forms.
//!
//! Precedence, loosest first: ternary, `||`, `&&`, `==`/`!=`, `!`, primary.
//! The ternary is right-associative; the binary operators are
//! left-associative.

use crate::ast::{BinaryOp, Expr, ExprKind};
use crate::lexer::{Span, Token};

use super::diagnostics::ParseIssue;
use super::stream::{TokenStream, describe};

pub(crate) fn parse_expr(stream: &mut TokenStream<'_>) -> Result<Expr, ParseIssue> {
    let cond = parse_binary(stream, 0)?;
    if !stream.eat(Token::Question) {
        return Ok(cond);
    }
    let when_true = parse_expr(stream)?;
    stream.expect(Token::Colon, "ternary expression")?;
    let when_false = parse_expr(stream)?;
    let span = cond.span.merge(when_false.span);
    Ok(Expr::new(
        ExprKind::Ternary {
            cond: Box::new(cond),
            when_true: Box::new(when_true),
            when_false: Box::new(when_false),
        },
        span,
    ))
}

const fn binding_power(token: Token<'_>) -> Option<(u8, BinaryOp)> {
    match token {
        Token::OrOr => Some((1, BinaryOp::Or)),
        Token::AndAnd => Some((2, BinaryOp::And)),
        Token::EqEq => Some((3, BinaryOp::Eq)),
        Token::NotEq => Some((3, BinaryOp::Ne)),
        _ => None,
    }
}

fn parse_binary(stream: &mut TokenStream<'_>, min_bp: u8) -> Result<Expr, ParseIssue> {
    let mut lhs = parse_unary(stream)?;
    while let Some((bp, op)) = stream.peek().and_then(binding_power) {
        if bp < min_bp {
            break;
        }
        stream.advance();
        let rhs = parse_binary(stream, bp + 1)?;
        let span = lhs.span.merge(rhs.span);
        lhs = Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        );
    }
    Ok(lhs)
}

fn parse_unary(stream: &mut TokenStream<'_>) -> Result<Expr, ParseIssue> {
    if stream.peek() == Some(Token::Bang) {
        let bang = stream.current_span();
        stream.advance();
        let inner = parse_unary(stream)?;
        let span = bang.merge(inner.span);
        return Ok(Expr::new(ExprKind::Not(Box::new(inner)), span));
    }
    parse_primary(stream)
}

/// Parses a primary expression: a word, string, reference, list literal, or
/// parenthesized expression. File-entry positions call this directly so a
/// bare entry never swallows the following entry as an operator operand.
pub(crate) fn parse_primary(stream: &mut TokenStream<'_>) -> Result<Expr, ParseIssue> {
    match stream.advance() {
        Some((Token::Word(word), span)) => Ok(Expr::new(word_expr(word), span)),
        Some((Token::Str(raw), span)) => {
            let text = unescape_string(raw, span)?;
            Ok(Expr::new(ExprKind::Str(text), span))
        }
        Some((Token::Reference(name), span)) => {
            Ok(Expr::new(ExprKind::Ref(name.to_owned()), span))
        }
        Some((Token::LBracket, open)) => parse_list(stream, open),
        Some((Token::LParen, open)) => {
            let inner = parse_expr(stream)?;
            let close = stream.expect(Token::RParen, "parenthesized expression")?;
            Ok(Expr::new(inner.kind, open.merge(close)))
        }
        Some((token, span)) => Err(ParseIssue::unexpected(
            format!("expected an expression, found {}", describe(token)),
            span,
        )),
        None => Err(ParseIssue::unexpected(
            "expected an expression, found end of input",
            stream.current_span(),
        )),
    }
}

fn word_expr(word: &str) -> ExprKind {
    match word {
        "true" => ExprKind::Bool(true),
        "false" => ExprKind::Bool(false),
        "null" => ExprKind::Null,
        _ => ExprKind::Str(word.to_owned()),
    }
}

fn parse_list(stream: &mut TokenStream<'_>, open: Span) -> Result<Expr, ParseIssue> {
    let mut elements = Vec::new();
    let close;
    loop {
        if stream.peek() == Some(Token::RBracket) {
            close = stream.current_span();
            stream.advance();
            break;
        }
        if stream.at_end() {
            return Err(ParseIssue::unterminated("list literal", open));
        }
        elements.push(parse_expr(stream)?);
        if !stream.eat(Token::Comma) && stream.peek() != Some(Token::RBracket) {
            let found = stream
                .peek()
                .map_or_else(|| "end of input".to_owned(), describe);
            return Err(ParseIssue::unexpected(
                format!("expected `,` or `]` in list literal, found {found}"),
                stream.current_span(),
            ));
        }
    }
    Ok(Expr::new(ExprKind::List(elements), open.merge(close)))
}

pub(crate) fn unescape_string(raw: &str, span: Span) -> Result<String, ParseIssue> {
    let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            text.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => text.push('"'),
            Some('\\') => text.push('\\'),
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some(other) => {
                return Err(ParseIssue::invalid_literal(
                    format!("unsupported escape `\\{other}` in string literal"),
                    span,
                ));
            }
            None => {
                return Err(ParseIssue::invalid_literal(
                    "dangling escape in string literal",
                    span,
                ));
            }
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn expr(source: &str) -> Expr {
        let mut stream = TokenStream::new(lex(source).expect("lex"), source.len());
        let parsed = parse_expr(&mut stream).expect("expr");
        assert!(stream.at_end(), "trailing tokens after expression");
        parsed
    }

    fn strs(kind: &ExprKind) -> &str {
        match kind {
            ExprKind::Str(text) => text,
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn equality_binds_tighter_than_and_and_or() {
        let parsed = expr("$(toolset) == gnu && $(config) == Debug || fallback == x");
        let ExprKind::Binary { op: BinaryOp::Or, lhs, .. } = parsed.kind else {
            panic!("expected top-level ||: {parsed:?}");
        };
        let ExprKind::Binary { op: BinaryOp::And, lhs: eq_lhs, .. } = lhs.kind else {
            panic!("expected && under ||: {lhs:?}");
        };
        assert!(matches!(
            eq_lhs.kind,
            ExprKind::Binary { op: BinaryOp::Eq, .. }
        ));
    }

    #[test]
    fn ternary_is_right_associative() {
        let parsed = expr("a == b ? x : c == d ? y : z");
        let ExprKind::Ternary { when_false, .. } = parsed.kind else {
            panic!("expected ternary: {parsed:?}");
        };
        assert!(matches!(when_false.kind, ExprKind::Ternary { .. }));
    }

    #[test]
    fn ternary_branches_may_be_null() {
        let parsed = expr("$(diagnostics) ? ENABLE_DIAGNOSTICS : null");
        let ExprKind::Ternary { when_true, when_false, .. } = parsed.kind else {
            panic!("expected ternary: {parsed:?}");
        };
        assert_eq!(strs(&when_true.kind), "ENABLE_DIAGNOSTICS");
        assert!(matches!(when_false.kind, ExprKind::Null));
    }

    #[test]
    fn list_allows_trailing_comma_and_nested_exprs() {
        let parsed = expr("[a, (x == y ? b : null), c,]");
        let ExprKind::List(elements) = parsed.kind else {
            panic!("expected list: {parsed:?}");
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn not_binds_tighter_than_equality() {
        let parsed = expr("!$(flag) == true");
        assert!(matches!(
            parsed.kind,
            ExprKind::Binary { op: BinaryOp::Eq, .. }
        ));
    }

    #[test]
    fn string_escapes_are_resolved() {
        let parsed = expr(r#""a \"quoted\" name\n""#);
        assert_eq!(strs(&parsed.kind), "a \"quoted\" name\n");
    }

    #[test]
    fn bad_escape_is_an_invalid_literal() {
        let source = r#""bad \q escape""#;
        let mut stream = TokenStream::new(lex(source).expect("lex"), source.len());
        let issue = parse_expr(&mut stream).expect_err("issue");
        let rendered = format!("{issue:?}");
        assert!(rendered.contains("InvalidLiteral"), "issue: {rendered}");
    }

    #[test]
    fn missing_list_close_reports_unterminated() {
        let source = "[a, b";
        let mut stream = TokenStream::new(lex(source).expect("lex"), source.len());
        let issue = parse_expr(&mut stream).expect_err("issue");
        let rendered = format!("{issue:?}");
        assert!(rendered.contains("UnterminatedBlock"), "issue: {rendered}");
    }
}
