//! Declaration parsing for both surface forms.
//!
//! The statement-list form treats the whole file as the module body; the
//! module form wraps declarations in `module { variables { … } targets
//! { … } }` sections. Both produce identical [`Item`] trees. Keywords are
//! positional: a word like `sources` or `program` only acts as a keyword
//! where its construct may begin, so the same words remain usable as
//! variable names.

use camino::{Utf8Path, Utf8PathBuf};

use crate::ast::{
    Assign, AssignOp, Condition, Expr, FileEntry, FileKind, FilesBlock, Import, Item, Module,
    StepDecl, TargetDecl, TargetItem, TargetKind,
};
use crate::lexer::{Span, Token};

use super::diagnostics::ParseIssue;
use super::expr::{parse_expr, parse_primary, unescape_string};
use super::stream::{TokenStream, describe};

/// What a given block position allows.
#[derive(Clone, Copy)]
struct Placement {
    assigns: bool,
    targets: bool,
    imports: bool,
}

impl Placement {
    const TOP_LEVEL: Self = Self {
        assigns: true,
        targets: true,
        imports: true,
    };
    const VARIABLES: Self = Self {
        assigns: true,
        targets: false,
        imports: false,
    };
    const TARGETS: Self = Self {
        assigns: false,
        targets: true,
        imports: false,
    };

    /// Conditional bodies inherit their surroundings but never allow imports.
    const fn in_condition(self) -> Self {
        Self {
            imports: false,
            ..self
        }
    }
}

enum Terminator {
    EndOfInput,
    Brace { open: Span, what: &'static str },
}

/// Parses a whole module, dispatching on surface form.
pub(crate) fn parse_module(
    stream: &mut TokenStream<'_>,
    origin: &Utf8Path,
) -> Result<Module, ParseIssue> {
    let module_form = stream.peek() == Some(Token::Word("module"))
        && stream.peek_nth(1) == Some(Token::LBrace);
    let items = if module_form {
        parse_module_form(stream)?
    } else {
        parse_items(stream, &Terminator::EndOfInput, Placement::TOP_LEVEL)?
    };
    Ok(Module::new(origin.to_path_buf(), items))
}

fn parse_module_form(stream: &mut TokenStream<'_>) -> Result<Vec<Item>, ParseIssue> {
    stream.advance();
    let open = stream.expect(Token::LBrace, "module block")?;
    let mut items = Vec::new();
    loop {
        if stream.eat(Token::RBrace) {
            break;
        }
        if stream.at_end() {
            return Err(ParseIssue::unterminated("module block", open));
        }
        match stream.peek() {
            Some(Token::Word("variables")) if stream.peek_nth(1) == Some(Token::LBrace) => {
                stream.advance();
                let section = stream.expect(Token::LBrace, "variables section")?;
                let terminator = Terminator::Brace {
                    open: section,
                    what: "variables section",
                };
                items.extend(parse_items(stream, &terminator, Placement::VARIABLES)?);
            }
            Some(Token::Word("targets")) if stream.peek_nth(1) == Some(Token::LBrace) => {
                stream.advance();
                let section = stream.expect(Token::LBrace, "targets section")?;
                let terminator = Terminator::Brace {
                    open: section,
                    what: "targets section",
                };
                items.extend(parse_items(stream, &terminator, Placement::TARGETS)?);
            }
            Some(Token::Word("import")) => items.push(Item::Import(parse_import(stream)?)),
            Some(Token::Word(word)) => {
                return Err(ParseIssue::unknown_directive(word, stream.current_span())
                    .with_help("a module block holds `variables { … }` and `targets { … }` sections"));
            }
            Some(token) => {
                return Err(ParseIssue::unexpected(
                    format!("expected a section in module block, found {}", describe(token)),
                    stream.current_span(),
                ));
            }
            None => return Err(ParseIssue::unterminated("module block", open)),
        }
    }
    if !stream.at_end() {
        return Err(ParseIssue::unexpected(
            "trailing input after module block",
            stream.current_span(),
        ));
    }
    Ok(items)
}

fn parse_items(
    stream: &mut TokenStream<'_>,
    terminator: &Terminator,
    placement: Placement,
) -> Result<Vec<Item>, ParseIssue> {
    let mut items = Vec::new();
    loop {
        if let Terminator::Brace { open, what } = terminator {
            if stream.eat(Token::RBrace) {
                return Ok(items);
            }
            if stream.at_end() {
                return Err(ParseIssue::unterminated(what, *open));
            }
        } else if stream.at_end() {
            return Ok(items);
        }
        items.push(parse_item(stream, placement)?);
    }
}

fn parse_item(stream: &mut TokenStream<'_>, placement: Placement) -> Result<Item, ParseIssue> {
    let span = stream.current_span();
    match stream.peek() {
        Some(Token::Word("if")) if stream.peek_nth(1) == Some(Token::LParen) => {
            let (guard, head) = parse_condition_head(stream)?;
            let body = parse_condition_items(stream, placement)?;
            Ok(Item::Condition(Condition {
                guard,
                body,
                span: head,
            }))
        }
        Some(Token::Word("import")) if placement.imports && !is_assign_head(stream) => {
            Ok(Item::Import(parse_import(stream)?))
        }
        Some(Token::Word("import"))
            if !placement.imports
                && !is_assign_head(stream) =>
        {
            Err(ParseIssue::unexpected(
                "imports are only allowed at module scope, outside conditional blocks",
                span,
            ))
        }
        Some(Token::Word(word)) => {
            if let Some(kind) = TargetKind::from_keyword(word)
                && !is_assign_head(stream)
            {
                if placement.targets {
                    return parse_target(stream, kind).map(Item::Target);
                }
                return Err(ParseIssue::unexpected(
                    format!("a {kind} declaration is not allowed in a variables section"),
                    span,
                ));
            }
            if placement.assigns {
                return parse_assign(stream).map(Item::Assign);
            }
            Err(ParseIssue::unexpected(
                format!("`{word}` is not a target declaration; assignments are not allowed in a targets section"),
                span,
            ))
        }
        Some(token) => Err(ParseIssue::unexpected(
            format!("expected a declaration, found {}", describe(token)),
            span,
        )),
        None => Err(ParseIssue::unexpected(
            "expected a declaration, found end of input",
            span,
        )),
    }
}

/// True when the current word starts an assignment (`word =` / `word +=`),
/// which lets statement keywords double as variable names.
fn is_assign_head(stream: &TokenStream<'_>) -> bool {
    matches!(stream.peek_nth(1), Some(Token::Eq | Token::PlusEq))
}

fn parse_condition_head(stream: &mut TokenStream<'_>) -> Result<(Expr, Span), ParseIssue> {
    let head = stream.current_span();
    stream.advance();
    stream.expect(Token::LParen, "condition")?;
    let guard = parse_expr(stream)?;
    stream.expect(Token::RParen, "condition")?;
    Ok((guard, head))
}

fn parse_condition_items(
    stream: &mut TokenStream<'_>,
    placement: Placement,
) -> Result<Vec<Item>, ParseIssue> {
    let inner = placement.in_condition();
    if stream.peek() == Some(Token::LBrace) {
        let open = stream.current_span();
        stream.advance();
        let terminator = Terminator::Brace {
            open,
            what: "conditional block",
        };
        return parse_items(stream, &terminator, inner);
    }
    Ok(vec![parse_item(stream, inner)?])
}

fn parse_import(stream: &mut TokenStream<'_>) -> Result<Import, ParseIssue> {
    let head = stream.current_span();
    stream.advance();
    let path = match stream.advance() {
        Some((Token::Word(word), _)) => Utf8PathBuf::from(word),
        Some((Token::Str(raw), span)) => Utf8PathBuf::from(unescape_string(raw, span)?),
        Some((token, span)) => {
            return Err(ParseIssue::unexpected(
                format!("expected a file path after `import`, found {}", describe(token)),
                span,
            ));
        }
        None => {
            return Err(ParseIssue::unexpected(
                "expected a file path after `import`, found end of input",
                stream.current_span(),
            ));
        }
    };
    let end = stream.expect(Token::Semi, "import statement")?;
    Ok(Import {
        path,
        span: head.merge(end),
    })
}

fn parse_assign(stream: &mut TokenStream<'_>) -> Result<Assign, ParseIssue> {
    let (word, name_span) = stream.expect_word("assignment")?;
    let (qualifier, name) = split_qualified(word, name_span)?;
    let op = match stream.advance() {
        Some((Token::Eq, _)) => AssignOp::Set,
        Some((Token::PlusEq, _)) => AssignOp::Append,
        Some((token, span)) => {
            return Err(ParseIssue::unexpected(
                format!(
                    "expected `=` or `+=` after `{word}`, found {}",
                    describe(token),
                ),
                span,
            ));
        }
        None => {
            return Err(ParseIssue::unexpected(
                format!("expected `=` or `+=` after `{word}`, found end of input"),
                stream.current_span(),
            ));
        }
    };
    let value = parse_expr(stream)?;
    let end = stream.expect(Token::Semi, "assignment")?;
    Ok(Assign {
        qualifier,
        name,
        op,
        value,
        span: name_span.merge(end),
    })
}

fn split_qualified(word: &str, span: Span) -> Result<(Option<String>, String), ParseIssue> {
    let Some((qualifier, rest)) = word.split_once('.') else {
        return Ok((None, word.to_owned()));
    };
    if qualifier.is_empty() || rest.is_empty() || rest.contains('.') || word.contains('/') {
        return Err(ParseIssue::unexpected(
            format!("invalid assignment target `{word}`"),
            span,
        )
        .with_help("write `name = …` or `toolset.name = …`"));
    }
    Ok((Some(qualifier.to_owned()), rest.to_owned()))
}

fn parse_target(
    stream: &mut TokenStream<'_>,
    kind: TargetKind,
) -> Result<TargetDecl, ParseIssue> {
    let head = stream.current_span();
    stream.advance();
    let (name, name_span) = stream.expect_word("target declaration")?;
    if name.contains('/') || name.starts_with('@') {
        return Err(ParseIssue::unexpected(
            format!("invalid target name `{name}`"),
            name_span,
        ));
    }
    let open = stream.expect(Token::LBrace, "target declaration")?;
    let body = parse_target_body(stream, open)?;
    Ok(TargetDecl {
        kind,
        name: name.to_owned(),
        body,
        span: head,
    })
}

fn parse_target_body(
    stream: &mut TokenStream<'_>,
    open: Span,
) -> Result<Vec<TargetItem>, ParseIssue> {
    let mut body = Vec::new();
    loop {
        if stream.eat(Token::RBrace) {
            return Ok(body);
        }
        if stream.at_end() {
            return Err(ParseIssue::unterminated("target body", open));
        }
        body.push(parse_target_item(stream)?);
    }
}

fn parse_target_item(stream: &mut TokenStream<'_>) -> Result<TargetItem, ParseIssue> {
    let span = stream.current_span();
    match stream.peek() {
        Some(Token::Word("if")) if stream.peek_nth(1) == Some(Token::LParen) => {
            let (guard, head) = parse_condition_head(stream)?;
            let body = if stream.peek() == Some(Token::LBrace) {
                let open = stream.current_span();
                stream.advance();
                parse_target_body(stream, open)?
            } else {
                vec![parse_target_item(stream)?]
            };
            Ok(TargetItem::Condition(Condition {
                guard,
                body,
                span: head,
            }))
        }
        Some(Token::Word("sources")) if stream.peek_nth(1) == Some(Token::LBrace) => {
            parse_files_block(stream, FileKind::Sources).map(TargetItem::Files)
        }
        Some(Token::Word("headers")) if stream.peek_nth(1) == Some(Token::LBrace) => {
            parse_files_block(stream, FileKind::Headers).map(TargetItem::Files)
        }
        Some(Token::Word(_)) => parse_assign(stream).map(TargetItem::Assign),
        Some(token) => Err(ParseIssue::unexpected(
            format!(
                "expected a property, conditional, or files block, found {}",
                describe(token),
            ),
            span,
        )),
        None => Err(ParseIssue::unexpected(
            "expected a target declaration item, found end of input",
            span,
        )),
    }
}

fn parse_files_block(
    stream: &mut TokenStream<'_>,
    kind: FileKind,
) -> Result<FilesBlock, ParseIssue> {
    let head = stream.current_span();
    stream.advance();
    let what = match kind {
        FileKind::Sources => "sources block",
        FileKind::Headers => "headers block",
    };
    let open = stream.expect(Token::LBrace, what)?;
    let mut entries = Vec::new();
    loop {
        if stream.eat(Token::RBrace) {
            break;
        }
        if stream.at_end() {
            return Err(ParseIssue::unterminated(what, open));
        }
        entries.push(parse_file_entry(stream)?);
        if !stream.eat(Token::Semi) {
            stream.eat(Token::Comma);
        }
    }
    Ok(FilesBlock {
        kind,
        entries,
        span: head,
    })
}

fn parse_file_entry(stream: &mut TokenStream<'_>) -> Result<FileEntry, ParseIssue> {
    let path = parse_primary(stream)?;
    let mut span = path.span;
    let step = if stream.peek() == Some(Token::LBrace) {
        let parsed = parse_step(stream)?;
        span = span.merge(parsed.span);
        Some(parsed)
    } else {
        None
    };
    Ok(FileEntry { path, step, span })
}

fn parse_step(stream: &mut TokenStream<'_>) -> Result<StepDecl, ParseIssue> {
    let open = stream.current_span();
    stream.advance();
    let mut cmd = None;
    let mut msg = None;
    let mut deps = None;
    let mut outs = None;
    let close;
    loop {
        if stream.peek() == Some(Token::RBrace) {
            close = stream.current_span();
            stream.advance();
            break;
        }
        if stream.at_end() {
            return Err(ParseIssue::unterminated("build-step block", open));
        }
        let (key, key_span) = stream.expect_word("build-step block")?;
        stream.expect(Token::Eq, "build-step attribute")?;
        let value = parse_expr(stream)?;
        stream.expect(Token::Semi, "build-step attribute")?;
        let slot = match key {
            "command" => &mut cmd,
            "message" => &mut msg,
            "dependencies" => &mut deps,
            "outputs" => &mut outs,
            _ => {
                return Err(ParseIssue::unknown_directive(key, key_span).with_help(
                    "build-step attributes are command, message, dependencies, and outputs",
                ));
            }
        };
        if slot.is_some() {
            return Err(ParseIssue::unexpected(
                format!("duplicate `{key}` in build step"),
                key_span,
            ));
        }
        *slot = Some(value);
    }
    let Some(command) = cmd else {
        return Err(ParseIssue::unexpected("build step is missing its command", close)
            .with_help("add `command = \"…\";` to the step block"));
    };
    Ok(StepDecl {
        command,
        message: msg,
        dependencies: deps,
        outputs: outs,
        span: open.merge(close),
    })
}
