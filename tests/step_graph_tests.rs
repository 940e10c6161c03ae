//! Build-step expansion, ordering, and source checking over parsed projects.

use kiln::ir::{GraphError, ListedFiles, ResolutionError};
use test_support::{load_fixture, resolve_fixture};

const GENERATED_FILES_MODEL: &str = r#"
module {
    variables {
        toolsets = [gnu];
    }
    targets {
        program generated {
            sources {
                main.cpp;
                gensrc.py {
                    command = "python %(in) %(out)";
                    message = "generating %(out)";
                    outputs = [@builddir/gensrc.cpp];
                }
                @builddir/gensrc.cpp;
                gensrc2.py {
                    command = "python %(in) %(out0) %(out1)";
                    dependencies = [gentools.py];
                    outputs = [@builddir/gensrc2.cpp, @builddir/gensrc2.h];
                }
                @builddir/gensrc2.cpp;
            }
            headers {
                @builddir/gensrc2.h;
            }
        }
    }
}
"#;

fn listing() -> ListedFiles {
    ListedFiles::new(["main.cpp", "gensrc.py", "gensrc2.py", "gentools.py"])
}

#[test]
fn templates_expand_against_the_declared_outputs() {
    let fixture = [("generated_files.model", GENERATED_FILES_MODEL)];
    let graph = resolve_fixture(&fixture, "gnu", "Debug", &listing());
    assert!(graph.warnings.is_empty());

    let commands: Vec<_> = graph.steps.iter().map(|step| step.command.as_str()).collect();
    assert_eq!(
        commands,
        vec![
            "python @top/gensrc.py @builddir/gensrc.cpp",
            "python @top/gensrc2.py @builddir/gensrc2.cpp @builddir/gensrc2.h",
        ],
    );
    assert_eq!(
        graph.steps.first().and_then(|step| step.message.as_deref()),
        Some("generating @builddir/gensrc.cpp"),
    );
    let deps: Vec<_> = graph
        .steps
        .get(1)
        .map(|step| step.dependencies.iter().map(ToString::to_string).collect())
        .unwrap_or_default();
    assert_eq!(deps, vec!["@top/gentools.py"]);
}

#[test]
fn generated_entries_point_back_at_their_producing_step() {
    let fixture = [("generated_files.model", GENERATED_FILES_MODEL)];
    let graph = resolve_fixture(&fixture, "gnu", "Debug", &listing());
    let target = graph.target("generated").expect("target present");

    let produced = target
        .sources
        .iter()
        .find(|file| file.path.to_string() == "@builddir/gensrc.cpp")
        .and_then(|file| file.produced_by)
        .expect("generated source is wired to a step");
    let producer = graph.step(produced).expect("step id stays valid");
    assert!(producer.command.contains("gensrc.py"));

    let header_step = target
        .headers
        .iter()
        .find(|file| file.path.to_string() == "@builddir/gensrc2.h")
        .and_then(|file| file.produced_by)
        .expect("generated header is wired to a step");
    let multi = graph.step(header_step).expect("step id stays valid");
    assert_eq!(
        multi.outputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["@builddir/gensrc2.cpp", "@builddir/gensrc2.h"],
    );
}

#[test]
fn chained_steps_are_reordered_so_producers_come_first() {
    let source = r#"
toolsets = [gnu];
program chained {
    sources {
        @builddir/stage1.c {
            command = "expand %(in) %(out)";
            outputs = [@builddir/stage2.c];
        }
        seed.txt {
            command = "seed %(in) %(out)";
            outputs = [@builddir/stage1.c];
        }
        @builddir/stage2.c;
    }
}
"#;
    let fixture = [("top.kiln", source)];
    let graph = resolve_fixture(&fixture, "gnu", "Debug", &ListedFiles::new(["seed.txt"]));
    let commands: Vec<_> = graph
        .steps
        .iter()
        .map(|step| step.command.split_whitespace().next().unwrap_or_default())
        .collect();
    assert_eq!(commands, vec!["seed", "expand"]);
}

#[test]
fn a_source_outside_the_listing_and_without_a_producer_is_fatal() {
    let fixture = [("generated_files.model", GENERATED_FILES_MODEL)];
    let project = load_fixture(&fixture);
    let err = project
        .resolve("gnu", "Debug", &ListedFiles::new(["gensrc.py", "gensrc2.py", "gentools.py"]))
        .expect_err("main.cpp is not listed");
    assert!(matches!(
        err,
        ResolutionError::Graph {
            source: GraphError::MissingSource { ref path, .. },
        } if path.to_string() == "@top/main.cpp",
    ));
}

#[test]
fn two_steps_claiming_one_output_are_rejected() {
    let source = r#"
toolsets = [gnu];
program clash {
    sources {
        one.py {
            command = "python %(in) %(out)";
            outputs = [@builddir/same.c];
        }
        two.py {
            command = "python %(in) %(out)";
            outputs = [@builddir/same.c];
        }
        @builddir/same.c;
    }
}
"#;
    let fixture = [("top.kiln", source)];
    let project = load_fixture(&fixture);
    let err = project
        .resolve("gnu", "Debug", &ListedFiles::new(["one.py", "two.py"]))
        .expect_err("duplicate claim must fail");
    assert!(matches!(
        err,
        ResolutionError::Graph {
            source: GraphError::DuplicateOutput { .. },
        },
    ));
}

#[test]
fn steps_feeding_each_other_are_reported_as_a_cycle() {
    let source = r#"
toolsets = [gnu];
program tangled {
    sources {
        @builddir/a.c {
            command = "gen %(in) %(out)";
            outputs = [@builddir/b.c];
        }
        @builddir/b.c {
            command = "gen %(in) %(out)";
            outputs = [@builddir/a.c];
        }
    }
}
"#;
    let fixture = [("top.kiln", source)];
    let project = load_fixture(&fixture);
    let err = project
        .resolve("gnu", "Debug", &ListedFiles::default())
        .expect_err("step cycle must fail");
    assert!(matches!(
        err,
        ResolutionError::Graph {
            source: GraphError::StepCycle { .. },
        },
    ));
}

#[test]
fn an_output_nothing_reads_is_a_warning_not_an_error() {
    let source = r#"
toolsets = [gnu];
program quiet {
    sources {
        main.c;
        gen.py {
            command = "python %(in) %(out)";
            outputs = [@builddir/orphan.h];
        }
    }
}
"#;
    let fixture = [("top.kiln", source)];
    let graph = resolve_fixture(
        &fixture,
        "gnu",
        "Debug",
        &ListedFiles::new(["main.c", "gen.py"]),
    );
    let flagged: Vec<_> = graph
        .warnings
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    assert_eq!(flagged.len(), 1);
    assert!(
        flagged
            .first()
            .is_some_and(|warning| warning.contains("@builddir/orphan.h")),
    );
}

#[test]
fn placeholder_mistakes_are_reported_per_kind() {
    let bogus = r#"
toolsets = [gnu];
program broken {
    sources {
        gen.py {
            command = "python %(input)";
            outputs = [@builddir/out.c];
        }
        @builddir/out.c;
    }
}
"#;
    let project = load_fixture(&[("top.kiln", bogus)]);
    let err = project
        .resolve("gnu", "Debug", &ListedFiles::new(["gen.py"]))
        .expect_err("unknown placeholder must fail");
    assert!(matches!(
        err,
        ResolutionError::Graph {
            source: GraphError::UnknownPlaceholder { ref placeholder, .. },
        } if placeholder == "input",
    ));

    let out_of_range = r#"
toolsets = [gnu];
program broken {
    sources {
        gen.py {
            command = "python %(in) %(out1)";
            outputs = [@builddir/only.c];
        }
        @builddir/only.c;
    }
}
"#;
    let ranged = load_fixture(&[("top.kiln", out_of_range)]);
    let range_err = ranged
        .resolve("gnu", "Debug", &ListedFiles::new(["gen.py"]))
        .expect_err("index past the outputs must fail");
    assert!(matches!(
        range_err,
        ResolutionError::Graph {
            source: GraphError::OutputIndexOutOfRange { index: 1, count: 1, .. },
        },
    ));
}

#[test]
fn a_step_without_outputs_is_rejected_at_the_graph_stage() {
    let source = r#"
toolsets = [gnu];
program hollow {
    sources {
        gen.py {
            command = "python %(in)";
        }
    }
}
"#;
    let project = load_fixture(&[("top.kiln", source)]);
    let err = project
        .resolve("gnu", "Debug", &ListedFiles::new(["gen.py"]))
        .expect_err("outputless step must fail");
    assert!(matches!(
        err,
        ResolutionError::Graph {
            source: GraphError::NoOutputs { ref target },
        } if target == "hollow",
    ));
}

#[test]
fn step_fields_must_have_their_declared_shapes() {
    let source = "
toolsets = [gnu];
wanted = true;
program typed {
    sources {
        gen.py {
            command = $(wanted);
            outputs = [@builddir/out.c];
        }
        @builddir/out.c;
    }
}
";
    let project = load_fixture(&[("top.kiln", source)]);
    let err = project
        .resolve("gnu", "Debug", &ListedFiles::new(["gen.py"]))
        .expect_err("boolean command must fail");
    assert!(matches!(
        err,
        ResolutionError::BadStepField { ref field, .. } if *field == "command",
    ));
}

#[test]
fn steps_can_be_switched_per_toolset() {
    let source = r#"
toolsets = [gnu, vs2008];
program portable {
    sources {
        main.c;
        if ( $(toolset) == gnu ) {
            gen.sh {
                command = "sh %(in) %(out)";
                outputs = [@builddir/tables.c];
            }
            @builddir/tables.c;
        }
    }
}
"#;
    let fixture = [("top.kiln", source)];
    let gnu = resolve_fixture(
        &fixture,
        "gnu",
        "Debug",
        &ListedFiles::new(["main.c", "gen.sh"]),
    );
    assert_eq!(gnu.steps.len(), 1);

    let vs = resolve_fixture(&fixture, "vs2008", "Debug", &ListedFiles::new(["main.c"]));
    assert!(vs.steps.is_empty());
}
