//! Resolved variant graphs.
//!
//! This module defines the toolset-agnostic model produced by resolution: a
//! [`VariantGraph`] per (toolset, configuration) pair, holding targets with
//! every expression reduced to literal values, dependency edges checked
//! acyclic, effective properties propagated, and custom build steps wired to
//! the entries that consume their outputs.
//!
//! # Examples
//!
//! ```
//! use kiln::ir::PropertySet;
//! use kiln::paths::SourcePath;
//!
//! let mut props = PropertySet::default();
//! props.libs.push("wininet".into());
//! props.libdirs.push(SourcePath::top("windows"));
//! assert_eq!(
//!     props.libdirs.first().map(ToString::to_string).as_deref(),
//!     Some("@top/windows"),
//! );
//! ```

mod cycle;
mod graph;
mod propagate;
mod resolve;
mod steps;

pub use graph::{
    BuildStepNode, FileNode, ModuleNode, PropertySet, StepId, TargetNode, VariantGraph,
};
pub use resolve::ResolutionError;
pub use steps::{AssumePresent, FileOracle, GraphError, GraphWarning, ListedFiles};
