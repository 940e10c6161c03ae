//! Parsing of project-description source text.
//!
//! Two surface syntaxes produce the same [`Module`] tree: the statement-list
//! form, where the file body is the module body, and the module form, where
//! declarations sit inside `module { variables { … } targets { … } }`
//! sections. Parsing is a pure function from text to AST; all file handling
//! belongs to [`crate::project`].
//!
//! ```rust
//! use camino::Utf8Path;
//! use kiln::parser;
//!
//! let module = parser::parse(
//!     "toolsets = [gnu];\nprogram hello { sources { hello.c } }",
//!     Utf8Path::new("top.kiln"),
//! )?;
//! assert_eq!(module.name, "top");
//! assert_eq!(module.items.len(), 2);
//! # Ok::<(), kiln::parser::SyntaxError>(())
//! ```

mod decl;
mod diagnostics;
mod expr;
mod stream;

pub use diagnostics::{SyntaxError, SyntaxErrorKind};

use camino::Utf8Path;

use crate::ast::Module;
use crate::lexer;

use diagnostics::ParseIssue;
use stream::TokenStream;

/// Parses module source text into an AST.
///
/// `origin` names the source in diagnostics and gives the module its name
/// (the file stem) and its path prefix within the project.
///
/// # Errors
///
/// Returns a [`SyntaxError`] when the text cannot be tokenized or does not
/// match the grammar.
pub fn parse(source: &str, origin: &Utf8Path) -> Result<Module, SyntaxError> {
    let tokens =
        lexer::lex(source).map_err(|err| ParseIssue::from(err).into_syntax_error(origin, source))?;
    let mut stream = TokenStream::new(tokens, source.len());
    decl::parse_module(&mut stream, origin).map_err(|issue| issue.into_syntax_error(origin, source))
}
