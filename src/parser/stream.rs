//! Token cursor shared by the declaration and expression parsers.

use crate::lexer::{Span, Token};

use super::diagnostics::ParseIssue;

/// Human-readable description of a token for error messages.
pub(crate) fn describe(token: Token<'_>) -> String {
    match token {
        Token::LBrace => "`{`".to_owned(),
        Token::RBrace => "`}`".to_owned(),
        Token::LBracket => "`[`".to_owned(),
        Token::RBracket => "`]`".to_owned(),
        Token::LParen => "`(`".to_owned(),
        Token::RParen => "`)`".to_owned(),
        Token::Comma => "`,`".to_owned(),
        Token::Semi => "`;`".to_owned(),
        Token::Question => "`?`".to_owned(),
        Token::Colon => "`:`".to_owned(),
        Token::Eq => "`=`".to_owned(),
        Token::PlusEq => "`+=`".to_owned(),
        Token::EqEq => "`==`".to_owned(),
        Token::NotEq => "`!=`".to_owned(),
        Token::AndAnd => "`&&`".to_owned(),
        Token::OrOr => "`||`".to_owned(),
        Token::Bang => "`!`".to_owned(),
        Token::Reference(name) => format!("reference `$({name})`"),
        Token::Str(_) => "string literal".to_owned(),
        Token::Word(word) => format!("`{word}`"),
    }
}

pub(crate) struct TokenStream<'src> {
    tokens: Vec<(Token<'src>, Span)>,
    pos: usize,
    eof: Span,
}

impl<'src> TokenStream<'src> {
    pub(crate) const fn new(tokens: Vec<(Token<'src>, Span)>, source_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            eof: Span::new(source_len, source_len),
        }
    }

    pub(crate) const fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).map(|&(token, _)| token)
    }

    pub(crate) fn peek_nth(&self, n: usize) -> Option<Token<'src>> {
        self.tokens.get(self.pos + n).map(|&(token, _)| token)
    }

    /// Span of the current token, or a zero-width span at end of input.
    pub(crate) fn current_span(&self) -> Span {
        self.tokens.get(self.pos).map_or(self.eof, |&(_, span)| span)
    }

    pub(crate) fn advance(&mut self) -> Option<(Token<'src>, Span)> {
        let item = self.tokens.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    /// Consumes the current token when it equals `token`.
    pub(crate) fn eat(&mut self, token: Token<'src>) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Consumes the current token, failing unless it equals `expected`.
    /// `context` names the construct being parsed for the error message.
    pub(crate) fn expect(
        &mut self,
        expected: Token<'src>,
        context: &str,
    ) -> Result<Span, ParseIssue> {
        match self.advance() {
            Some((token, span)) if token == expected => Ok(span),
            Some((token, span)) => Err(ParseIssue::unexpected(
                format!(
                    "expected {} in {context}, found {}",
                    describe(expected),
                    describe(token),
                ),
                span,
            )),
            None => Err(ParseIssue::unexpected(
                format!(
                    "expected {} in {context}, found end of input",
                    describe(expected),
                ),
                self.eof,
            )),
        }
    }

    /// Consumes a word token, failing on anything else.
    pub(crate) fn expect_word(&mut self, context: &str) -> Result<(&'src str, Span), ParseIssue> {
        match self.advance() {
            Some((Token::Word(word), span)) => Ok((word, span)),
            Some((token, span)) => Err(ParseIssue::unexpected(
                format!("expected a name in {context}, found {}", describe(token)),
                span,
            )),
            None => Err(ParseIssue::unexpected(
                format!("expected a name in {context}, found end of input"),
                self.eof,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn stream(source: &str) -> TokenStream<'_> {
        TokenStream::new(lex(source).expect("lex"), source.len())
    }

    #[test]
    fn peek_does_not_consume() {
        let mut cursor = stream("a b");
        assert_eq!(cursor.peek(), Some(Token::Word("a")));
        assert_eq!(cursor.peek(), Some(Token::Word("a")));
        assert_eq!(cursor.peek_nth(1), Some(Token::Word("b")));
        assert!(cursor.advance().is_some());
        assert_eq!(cursor.peek(), Some(Token::Word("b")));
    }

    #[test]
    fn expect_reports_found_token() {
        let mut cursor = stream("a");
        let issue = cursor.expect(Token::Semi, "assignment").expect_err("issue");
        let message = format!("{issue:?}");
        assert!(message.contains("assignment"), "message: {message}");
    }

    #[test]
    fn current_span_at_eof_is_zero_width() {
        let mut cursor = stream("ab");
        assert!(cursor.advance().is_some());
        assert_eq!(cursor.current_span(), Span::new(2, 2));
        assert!(cursor.at_end());
    }

    #[test]
    fn eat_consumes_only_on_match() {
        let mut cursor = stream("; a");
        assert!(cursor.eat(Token::Semi));
        assert!(!cursor.eat(Token::Semi));
        assert_eq!(cursor.peek(), Some(Token::Word("a")));
    }
}
