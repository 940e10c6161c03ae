//! Emitter seam.
//!
//! The core stops at the resolved [`VariantGraph`]; writing native build
//! files is the job of per-toolset emitters implemented by downstream
//! crates. This module fixes the shape of that boundary: an emitter turns
//! one graph into a set of relative output files, optionally grouped under
//! a solution artifact when the toolset's format calls for one.

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::ir::VariantGraph;

/// One generated file, addressed relative to the emitter's output root.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutputFile {
    /// Output-root relative path.
    pub path: Utf8PathBuf,
    /// Full file contents.
    pub contents: String,
}

/// Everything an emitter produced for one variant.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EmitPlan {
    /// Per-target artifacts, in target order.
    pub files: Vec<OutputFile>,
    /// Grouping artifact referencing the per-target files, when the
    /// toolset's native format requires one.
    pub solution: Option<OutputFile>,
}

impl EmitPlan {
    /// Looks a produced file up by its relative path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&OutputFile> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// Turns resolved variant graphs into native build files.
///
/// Implementations own all toolset-specific knowledge; the core hands them
/// a finished graph and never inspects what they write.
pub trait Emitter {
    /// The toolset identifier this emitter serves.
    fn toolset(&self) -> &str;

    /// Produces the output files for one resolved variant.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures; the core does not
    /// constrain the error shape beyond [`anyhow::Error`].
    fn emit(&self, graph: &VariantGraph) -> anyhow::Result<EmitPlan>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileLister;

    impl Emitter for FileLister {
        fn toolset(&self) -> &str {
            "test"
        }

        fn emit(&self, graph: &VariantGraph) -> anyhow::Result<EmitPlan> {
            let files = graph
                .targets
                .values()
                .map(|target| OutputFile {
                    path: Utf8PathBuf::from(format!("{}.txt", target.name)),
                    contents: format!("{} sources\n", target.sources.len()),
                })
                .collect();
            Ok(EmitPlan {
                files,
                solution: None,
            })
        }
    }

    #[test]
    fn plans_expose_files_by_path() {
        let plan = EmitPlan {
            files: vec![OutputFile {
                path: Utf8PathBuf::from("hello.txt"),
                contents: "x".to_owned(),
            }],
            solution: None,
        };
        assert!(plan.file("hello.txt").is_some());
        assert!(plan.file("other.txt").is_none());
    }

    #[test]
    fn emitters_are_object_safe() {
        let emitters: Vec<Box<dyn Emitter>> = vec![Box::new(FileLister)];
        assert_eq!(
            emitters.first().map(|emitter| emitter.toolset()),
            Some("test"),
        );
    }
}
