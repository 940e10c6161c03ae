//! Build-step wiring.
//!
//! Turns the raw steps gathered during resolution into an ordered
//! [`BuildStepNode`] list: command and message templates are expanded,
//! every declared output is claimed by exactly one step, file entries
//! matching a claimed output are rewritten to depend on their producer,
//! and steps are ordered so producers precede consumers.

use std::fmt;

use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use super::graph::{BuildStepNode, StepId, TargetNode};
use crate::paths::{Anchor, SourcePath};

/// Failure to assemble the build-step graph.
#[derive(Clone, Debug, Diagnostic, Eq, Error, PartialEq)]
pub enum GraphError {
    /// A step declares no output files.
    #[error("a build step of target `{target}` declares no outputs")]
    #[diagnostic(code(kiln::steps::no_outputs))]
    NoOutputs {
        /// Target carrying the step.
        target: String,
    },
    /// Two steps claim the same output path.
    #[error("output `{output}` is declared by a step of `{first}` and again by `{second}`")]
    #[diagnostic(code(kiln::steps::duplicate_output))]
    DuplicateOutput {
        /// The contested path.
        output: SourcePath,
        /// Target of the first claiming step.
        first: String,
        /// Target of the second claiming step.
        second: String,
    },
    /// Steps consume each other's outputs in a loop.
    #[error("build steps of {} form a cycle", targets.join(", "))]
    #[diagnostic(code(kiln::steps::step_cycle))]
    StepCycle {
        /// Targets whose steps could not be ordered.
        targets: Vec<String>,
    },
    /// A command or message template names a placeholder that does not exist.
    #[error("unknown placeholder `%({placeholder})` in a step of target `{target}`")]
    #[diagnostic(code(kiln::steps::unknown_placeholder))]
    UnknownPlaceholder {
        /// Target carrying the template.
        target: String,
        /// The unrecognized placeholder name.
        placeholder: String,
    },
    /// A template opens `%(` without a closing parenthesis.
    #[error("unterminated placeholder in a step of target `{target}`")]
    #[diagnostic(code(kiln::steps::unterminated_placeholder))]
    UnterminatedPlaceholder {
        /// Target carrying the template.
        target: String,
    },
    /// `%(outN)` indexes past the declared output list.
    #[error("step of target `{target}` names output {index}, but only {count} are declared")]
    #[diagnostic(code(kiln::steps::output_index))]
    OutputIndexOutOfRange {
        /// Target carrying the template.
        target: String,
        /// The requested output index.
        index: usize,
        /// How many outputs the step declares.
        count: usize,
    },
    /// An expanded command is not shell-splittable.
    #[error("invalid command in a step of target `{target}`: {command}")]
    #[diagnostic(code(kiln::steps::invalid_command))]
    InvalidCommand {
        /// Target carrying the command.
        target: String,
        /// The expanded command text.
        command: String,
    },
    /// A source file neither exists on disk nor is produced by any step.
    #[error("source `{path}` of target `{target}` does not exist and no step produces it")]
    #[diagnostic(code(kiln::steps::missing_source))]
    MissingSource {
        /// Target listing the file.
        target: String,
        /// The unresolvable path.
        path: SourcePath,
    },
}

/// Non-fatal observation recorded on the finished graph.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphWarning {
    /// A declared output is never listed as a file or consumed by a step.
    UnconsumedOutput {
        /// Target whose step declares the output.
        target: String,
        /// The unreferenced path.
        output: SourcePath,
    },
}

impl fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnconsumedOutput { target, output } => {
                write!(f, "output `{output}` of a step in `{target}` is never consumed")
            }
        }
    }
}

/// Answers whether a source-tree file exists.
///
/// Consulted for file entries that no build step produces. Implementations
/// must be cheap and side-effect free; resolution may query the same path
/// from several variants at once.
pub trait FileOracle: Sync {
    /// Returns true when `path` denotes an existing file.
    fn exists(&self, path: &SourcePath) -> bool;
}

/// Oracle that vouches for every source-tree path.
///
/// Build-directory paths still need a producing step.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumePresent;

impl FileOracle for AssumePresent {
    fn exists(&self, path: &SourcePath) -> bool {
        matches!(path.anchor, Anchor::Top)
    }
}

/// Oracle backed by an explicit file listing.
#[derive(Clone, Debug, Default)]
pub struct ListedFiles {
    files: IndexSet<Utf8PathBuf>,
}

impl ListedFiles {
    /// Builds an oracle from source-tree relative paths.
    #[must_use]
    pub fn new<I>(files: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Utf8PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

impl FileOracle for ListedFiles {
    fn exists(&self, path: &SourcePath) -> bool {
        match path.anchor {
            Anchor::Top => self.files.contains(&path.path),
            Anchor::BuildDir => false,
        }
    }
}

/// A step as gathered by the resolver, templates not yet expanded.
#[derive(Clone, Debug)]
pub(crate) struct PendingStep {
    pub(crate) target: String,
    pub(crate) input: SourcePath,
    pub(crate) command: String,
    pub(crate) message: Option<String>,
    pub(crate) dependencies: Vec<SourcePath>,
    pub(crate) outputs: Vec<SourcePath>,
}

/// Orders and expands `pending`, rewiring `targets` file entries onto the
/// steps that produce them.
pub(crate) fn build(
    targets: &mut IndexMap<String, TargetNode>,
    pending: Vec<PendingStep>,
    oracle: &dyn FileOracle,
) -> Result<(Vec<BuildStepNode>, Vec<GraphWarning>), GraphError> {
    let claims = claim_outputs(&pending)?;
    let order = order_steps(&pending, &claims)?;

    let mut built = Vec::with_capacity(pending.len());
    let mut final_claims: IndexMap<SourcePath, (StepId, String)> = IndexMap::new();
    let mut slots: Vec<Option<PendingStep>> = pending.into_iter().map(Some).collect();
    for index in order {
        // Each index occurs exactly once in the order.
        let Some(step) = slots.get_mut(index).and_then(Option::take) else {
            continue;
        };
        let id = StepId::new(built.len());
        for output in &step.outputs {
            final_claims.insert(output.clone(), (id, step.target.clone()));
        }
        built.push(expand_step(step)?);
    }

    rewire(targets, &final_claims);
    check_sources(targets, &final_claims, oracle)?;
    check_step_inputs(&built, &final_claims, oracle)?;
    let warnings = unconsumed(targets, &built, &final_claims);
    Ok((built, warnings))
}

/// Maps every declared output to the index of its producing step.
fn claim_outputs(
    pending: &[PendingStep],
) -> Result<IndexMap<SourcePath, (usize, String)>, GraphError> {
    let mut claims: IndexMap<SourcePath, (usize, String)> = IndexMap::new();
    for (index, step) in pending.iter().enumerate() {
        if step.outputs.is_empty() {
            return Err(GraphError::NoOutputs {
                target: step.target.clone(),
            });
        }
        for output in &step.outputs {
            if let Some((_, first)) = claims.get(output) {
                return Err(GraphError::DuplicateOutput {
                    output: output.clone(),
                    first: first.clone(),
                    second: step.target.clone(),
                });
            }
            claims.insert(output.clone(), (index, step.target.clone()));
        }
    }
    Ok(claims)
}

/// Stable topological order: a step consuming another's output runs after
/// its producer, ties broken by declaration order.
fn order_steps(
    pending: &[PendingStep],
    claims: &IndexMap<SourcePath, (usize, String)>,
) -> Result<Vec<usize>, GraphError> {
    let mut remaining: Vec<(usize, Vec<usize>)> = pending
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let producers = std::iter::once(&step.input)
                .chain(&step.dependencies)
                .filter_map(|path| claims.get(path))
                .map(|(producer, _)| *producer)
                .collect();
            (index, producers)
        })
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    let mut placed: IndexSet<usize> = IndexSet::new();
    while !remaining.is_empty() {
        let next = remaining.iter().position(|(index, producers)| {
            producers
                .iter()
                .all(|producer| producer == index || placed.contains(producer))
        });
        match next {
            Some(position) => {
                let (index, _) = remaining.remove(position);
                placed.insert(index);
                order.push(index);
            }
            None => {
                let targets = remaining
                    .iter()
                    .filter_map(|(index, _)| pending.get(*index))
                    .map(|step| step.target.clone())
                    .collect();
                return Err(GraphError::StepCycle { targets });
            }
        }
    }
    Ok(order)
}

fn expand_step(step: PendingStep) -> Result<BuildStepNode, GraphError> {
    let command = expand_template(&step.command, &step.target, &step.input, &step.outputs)?;
    if shlex::split(&command).is_none() {
        return Err(GraphError::InvalidCommand {
            target: step.target,
            command,
        });
    }
    let message = step
        .message
        .as_deref()
        .map(|template| expand_template(template, &step.target, &step.input, &step.outputs))
        .transpose()?;
    Ok(BuildStepNode {
        target: step.target,
        input: step.input,
        command,
        message,
        dependencies: step.dependencies,
        outputs: step.outputs,
    })
}

/// Substitutes `%(in)`, `%(out)` and `%(outN)` in a template.
///
/// `%(out)` expands to the whole output list separated by spaces; `%(outN)`
/// addresses one output, counting from zero.
fn expand_template(
    template: &str,
    target: &str,
    input: &SourcePath,
    outputs: &[SourcePath],
) -> Result<String, GraphError> {
    let mut expanded = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' || chars.peek() != Some(&'(') {
            expanded.push(ch);
            continue;
        }
        chars.next();
        let mut name = String::new();
        loop {
            match chars.next() {
                Some(')') => break,
                Some(inner) => name.push(inner),
                None => {
                    return Err(GraphError::UnterminatedPlaceholder {
                        target: target.to_owned(),
                    });
                }
            }
        }
        expanded.push_str(&substitute(&name, target, input, outputs)?);
    }
    Ok(expanded)
}

fn substitute(
    name: &str,
    target: &str,
    input: &SourcePath,
    outputs: &[SourcePath],
) -> Result<String, GraphError> {
    if name == "in" {
        return Ok(input.to_string());
    }
    if name == "out" {
        return Ok(outputs.iter().join(" "));
    }
    let index = name
        .strip_prefix("out")
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| GraphError::UnknownPlaceholder {
            target: target.to_owned(),
            placeholder: name.to_owned(),
        })?;
    outputs
        .get(index)
        .map(SourcePath::to_string)
        .ok_or_else(|| GraphError::OutputIndexOutOfRange {
            target: target.to_owned(),
            index,
            count: outputs.len(),
        })
}

/// Points every file entry matching a claimed output at its producer.
fn rewire(
    targets: &mut IndexMap<String, TargetNode>,
    claims: &IndexMap<SourcePath, (StepId, String)>,
) {
    for node in targets.values_mut() {
        for file in node.sources.iter_mut().chain(node.headers.iter_mut()) {
            if let Some((id, _)) = claims.get(&file.path) {
                file.produced_by = Some(*id);
            }
        }
    }
}

/// Every source entry must either exist on disk or be produced by a step.
///
/// Header entries are exempt: a missing header is the compiler's problem to
/// report, not a graph defect.
fn check_sources(
    targets: &IndexMap<String, TargetNode>,
    claims: &IndexMap<SourcePath, (StepId, String)>,
    oracle: &dyn FileOracle,
) -> Result<(), GraphError> {
    for node in targets.values() {
        for file in &node.sources {
            if file.produced_by.is_some() || claims.contains_key(&file.path) {
                continue;
            }
            if !oracle.exists(&file.path) {
                return Err(GraphError::MissingSource {
                    target: node.name.clone(),
                    path: file.path.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Step inputs and extra dependencies must resolve the same way sources do.
fn check_step_inputs(
    built: &[BuildStepNode],
    claims: &IndexMap<SourcePath, (StepId, String)>,
    oracle: &dyn FileOracle,
) -> Result<(), GraphError> {
    for step in built {
        for path in std::iter::once(&step.input).chain(&step.dependencies) {
            if claims.contains_key(path) || oracle.exists(path) {
                continue;
            }
            return Err(GraphError::MissingSource {
                target: step.target.clone(),
                path: path.clone(),
            });
        }
    }
    Ok(())
}

/// Flags outputs that no file entry and no later step ever reads.
fn unconsumed(
    targets: &IndexMap<String, TargetNode>,
    built: &[BuildStepNode],
    claims: &IndexMap<SourcePath, (StepId, String)>,
) -> Vec<GraphWarning> {
    let mut consumed: IndexSet<&SourcePath> = IndexSet::new();
    for node in targets.values() {
        consumed.extend(node.sources.iter().map(|file| &file.path));
        consumed.extend(node.headers.iter().map(|file| &file.path));
    }
    for step in built {
        consumed.insert(&step.input);
        consumed.extend(&step.dependencies);
    }
    claims
        .iter()
        .filter(|(output, _)| !consumed.contains(*output))
        .map(|(output, (_, target))| GraphWarning::UnconsumedOutput {
            target: target.clone(),
            output: output.clone(),
        })
        .collect()
}
