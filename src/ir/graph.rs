//! Variant graph node types.

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::Serialize;

use super::GraphWarning;
use crate::ast::TargetKind;
use crate::eval::Value;
use crate::paths::SourcePath;

/// Identifier of a build step within its [`VariantGraph`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct StepId(usize);

impl StepId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) const fn index(self) -> usize {
        self.0
    }
}

/// The link-relevant property lists that flow across `deps` edges.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PropertySet {
    /// Preprocessor definitions.
    pub defines: Vec<String>,
    /// Header search directories.
    pub includedirs: Vec<SourcePath>,
    /// Library search directories.
    pub libdirs: Vec<SourcePath>,
    /// Libraries to link against.
    pub libs: Vec<String>,
}

impl PropertySet {
    /// True when all four lists are empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.defines.is_empty()
            && self.includedirs.is_empty()
            && self.libdirs.is_empty()
            && self.libs.is_empty()
    }
}

/// One `sources` / `headers` entry after resolution.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileNode {
    /// Anchored path of the file.
    pub path: SourcePath,
    /// Step that generates this file, when it is some step's output.
    pub produced_by: Option<StepId>,
}

/// A custom build step attached to a file entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BuildStepNode {
    /// Target the step belongs to.
    pub target: String,
    /// Primary input file.
    pub input: SourcePath,
    /// Command line with `%(in)` / `%(out)` / `%(outN)` expanded.
    pub command: String,
    /// Progress message with placeholders expanded, when declared.
    pub message: Option<String>,
    /// Extra files the step is stale against, beyond its input.
    pub dependencies: Vec<SourcePath>,
    /// Declared outputs, in declaration order.
    pub outputs: Vec<SourcePath>,
}

/// A fully resolved target.
#[derive(Clone, Debug, Serialize)]
pub struct TargetNode {
    /// Target name, unique across the project.
    pub name: String,
    /// Artifact kind.
    pub kind: TargetKind,
    /// Name of the module the target was declared in.
    pub module: String,
    /// Architectures the target builds for; empty means the toolset default.
    pub archs: Vec<String>,
    /// Names of the targets this one depends on.
    pub deps: Vec<String>,
    /// Source entries in declaration order.
    pub sources: Vec<FileNode>,
    /// Header entries in declaration order.
    pub headers: Vec<FileNode>,
    /// The target's own link-relevant properties.
    pub props: PropertySet,
    /// Own plus transitively propagated properties, first-seen deduplicated.
    pub effective: PropertySet,
    /// Per-toolset project file path, when one was set.
    pub project_file: Option<SourcePath>,
    /// User variables bound in the target body, as evaluated.
    pub vars: IndexMap<String, Value>,
}

/// Per-module results that are not tied to one target.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleNode {
    /// Module name, the origin's file stem.
    pub name: String,
    /// Path the module was parsed from.
    pub origin: Utf8PathBuf,
    /// Module-scope bindings as finally evaluated for this variant.
    pub vars: IndexMap<String, Value>,
}

/// The fully resolved model for one (toolset, configuration) pair.
///
/// Immutable once produced; resolution working state is discarded.
#[derive(Clone, Debug, Serialize)]
pub struct VariantGraph {
    /// Toolset the graph was resolved for.
    pub toolset: String,
    /// Configuration the graph was resolved for.
    pub config: String,
    /// Solution/grouping artifact path, when the root module sets one.
    pub solution_file: Option<SourcePath>,
    /// Modules in load order, root first.
    pub modules: Vec<ModuleNode>,
    /// Targets in declaration order, keyed by name.
    pub targets: IndexMap<String, TargetNode>,
    /// Build steps, producers ordered before their consumers.
    pub steps: Vec<BuildStepNode>,
    /// Non-fatal findings collected while wiring the step graph.
    pub warnings: Vec<GraphWarning>,
}

impl VariantGraph {
    /// Looks a target up by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&TargetNode> {
        self.targets.get(name)
    }

    /// Resolves a [`StepId`] recorded on a [`FileNode`].
    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&BuildStepNode> {
        self.steps.get(id.index())
    }

    /// Serializes the graph as pretty-printed JSON, for dumps and snapshot
    /// comparisons.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error, which only occurs when a
    /// formatter fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
