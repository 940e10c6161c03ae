//! Surface-syntax coverage for the public parse entry point.

use camino::Utf8Path;
use kiln::ast::{AssignOp, ExprKind, FileKind, Item, TargetItem, TargetKind};
use kiln::parser::{SyntaxErrorKind, parse};
use rstest::rstest;

fn parse_ok(source: &str) -> kiln::ast::Module {
    parse(source, Utf8Path::new("top.kiln")).expect("fixture parses")
}

#[test]
fn statement_form_keeps_declaration_order() {
    let module = parse_ok(
        "
toolsets = [gnu];
import sub/other.kiln;
program hello {
    sources { hello.c }
}
",
    );
    assert_eq!(module.name, "top");
    assert_eq!(module.items.len(), 3);
    assert!(matches!(
        module.items.first(),
        Some(Item::Assign(assign)) if assign.name == "toolsets" && assign.op == AssignOp::Set,
    ));
    assert!(matches!(
        module.items.get(1),
        Some(Item::Import(import)) if import.path == Utf8Path::new("sub/other.kiln"),
    ));
    assert!(matches!(
        module.items.get(2),
        Some(Item::Target(target))
            if target.kind == TargetKind::Program && target.name == "hello",
    ));
}

#[test]
fn module_form_unwraps_to_the_same_declarations() {
    let module = parse_ok(
        "
module {
    variables {
        toolsets = [gnu];
    }
    targets {
        library core {
            sources { core.c }
        }
    }
}
",
    );
    assert_eq!(module.items.len(), 2);
    assert!(matches!(module.items.first(), Some(Item::Assign(_))));
    assert!(matches!(
        module.items.get(1),
        Some(Item::Target(target)) if target.kind == TargetKind::Library,
    ));
}

#[test]
fn target_bodies_mix_assignments_conditions_and_file_blocks() {
    let module = parse_ok(
        "
program hello {
    defines = [ONE];
    if ( $(toolset) == gnu )
        defines += TWO;
    sources { hello.c; util.c }
    headers { hello.h }
}
",
    );
    let Some(Item::Target(target)) = module.items.first() else {
        panic!("expected a target");
    };
    assert_eq!(target.body.len(), 4);
    assert!(matches!(
        target.body.first(),
        Some(TargetItem::Assign(assign)) if assign.op == AssignOp::Set,
    ));
    let Some(TargetItem::Condition(cond)) = target.body.get(1) else {
        panic!("expected a conditional");
    };
    assert_eq!(cond.body.len(), 1);
    assert!(matches!(
        cond.body.first(),
        Some(TargetItem::Assign(assign)) if assign.op == AssignOp::Append,
    ));
    assert!(matches!(
        target.body.get(2),
        Some(TargetItem::Files(block))
            if block.kind == FileKind::Sources && block.entries.len() == 2,
    ));
    assert!(matches!(
        target.body.get(3),
        Some(TargetItem::Files(block)) if block.kind == FileKind::Headers,
    ));
}

#[test]
fn step_blocks_capture_all_four_fields() {
    let module = parse_ok(
        r#"
program generated {
    sources {
        gen.py {
            command = "python %(in) %(out)";
            message = "generating %(out)";
            dependencies = [helper.py];
            outputs = [@builddir/out.c];
        }
    }
}
"#,
    );
    let Some(Item::Target(target)) = module.items.first() else {
        panic!("expected a target");
    };
    let Some(TargetItem::Files(block)) = target.body.first() else {
        panic!("expected a files block");
    };
    let step = block
        .entries
        .first()
        .and_then(|entry| entry.step.as_ref())
        .expect("entry carries a step");
    assert!(step.message.is_some());
    assert!(step.dependencies.is_some());
    assert!(step.outputs.is_some());
}

#[test]
fn keywords_still_work_as_variable_names() {
    let module = parse_ok("program = something;\nlibrary += more;\n");
    assert_eq!(module.items.len(), 2);
    assert!(matches!(
        module.items.first(),
        Some(Item::Assign(assign)) if assign.name == "program",
    ));
}

#[test]
fn qualified_assignments_split_on_the_first_dot() {
    let module = parse_ok("vs2008.projectfile = hello.vcproj;\n");
    let Some(Item::Assign(assign)) = module.items.first() else {
        panic!("expected an assignment");
    };
    assert_eq!(assign.qualifier.as_deref(), Some("vs2008"));
    assert_eq!(assign.name, "projectfile");
    assert!(matches!(
        &assign.value.kind,
        ExprKind::Str(text) if text == "hello.vcproj",
    ));
}

#[test]
fn comments_are_skipped_in_both_styles() {
    let module = parse_ok(
        "
// whole-line comment
toolsets = [gnu]; // trailing comment
/* block
   spanning lines */
program hello { sources { hello.c } }
",
    );
    assert_eq!(module.items.len(), 2);
}

#[test]
fn quoted_strings_unescape_and_allow_spaces() {
    let module = parse_ok(r#"banner = "say \"hi\"\n";"#);
    let Some(Item::Assign(assign)) = module.items.first() else {
        panic!("expected an assignment");
    };
    assert!(matches!(
        &assign.value.kind,
        ExprKind::Str(text) if text == "say \"hi\"\n",
    ));
}

#[rstest]
#[case::unknown_directive("binary hello { }", SyntaxErrorKind::UnknownDirective)]
#[case::unterminated_target("program hello { sources { a.c }", SyntaxErrorKind::UnterminatedBlock)]
#[case::unterminated_list("xs = [one, two;", SyntaxErrorKind::UnexpectedToken)]
#[case::bad_escape(r#"x = "\q";"#, SyntaxErrorKind::InvalidLiteral)]
#[case::unterminated_string(r#"x = "oops;"#, SyntaxErrorKind::InvalidLiteral)]
#[case::unterminated_comment("/* never closed", SyntaxErrorKind::UnterminatedBlock)]
#[case::stray_operator("defines += ;", SyntaxErrorKind::UnexpectedToken)]
fn parse_failures_are_classified(#[case] source: &str, #[case] expected: SyntaxErrorKind) {
    let err = parse(source, Utf8Path::new("top.kiln")).expect_err("fixture must not parse");
    assert_eq!(err.kind(), expected, "for source: {source}");
}

#[test]
fn imports_stay_out_of_conditional_blocks() {
    let err = parse(
        "
if ( $(toolset) == gnu ) {
    import extra.kiln;
}
",
        Utf8Path::new("top.kiln"),
    )
    .expect_err("conditional import must not parse");
    assert!(
        err.to_string().contains("module scope"),
        "unexpected message: {err}",
    );
}

#[test]
fn steps_require_a_command() {
    let err = parse(
        "
program broken {
    sources {
        gen.py {
            outputs = [@builddir/out.c];
        }
    }
}
",
        Utf8Path::new("top.kiln"),
    )
    .expect_err("step without command must not parse");
    assert!(
        err.to_string().contains("command"),
        "unexpected message: {err}",
    );
}

#[test]
fn step_fields_may_not_repeat() {
    let err = parse(
        r#"
program broken {
    sources {
        gen.py {
            command = "one";
            command = "two";
            outputs = [@builddir/out.c];
        }
    }
}
"#,
        Utf8Path::new("top.kiln"),
    )
    .expect_err("duplicate step field must not parse");
    assert!(
        err.to_string().contains("command"),
        "unexpected message: {err}",
    );
}

#[test]
fn errors_carry_the_failing_span() {
    let source = "program hello { sources { a.c }";
    let err = parse(source, Utf8Path::new("top.kiln")).expect_err("must not parse");
    let span = err.span().expect("span is attached");
    assert!(span.offset() < source.len());
}
