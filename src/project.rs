//! Project loading and the parallel resolution driver.
//!
//! A project is the root module plus every transitively imported module,
//! flattened root-first. The loader is the only place in the crate that
//! touches the filesystem; everything downstream works on the immutable
//! module list. [`Project::resolve_all`] fans independent variants out
//! across a thread pool, since each resolution only reads the shared AST.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use miette::Diagnostic;
use rayon::prelude::*;
use thiserror::Error;

use crate::ast::{Item, Module};
use crate::ir::{FileOracle, ResolutionError, VariantGraph};
use crate::parser::{self, SyntaxError};
use crate::paths::{self, PathError};

/// Failure to assemble a project from module files.
#[derive(Debug, Diagnostic, Error)]
pub enum LoadError {
    /// A module file could not be read.
    #[error("cannot read module `{path}`")]
    #[diagnostic(code(kiln::load::read))]
    Read {
        /// The unreadable file, relative to the top directory.
        path: Utf8PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A module file does not parse.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] SyntaxError),
    /// Modules import each other in a loop.
    #[error("module `{path}` is imported in a cycle")]
    #[diagnostic(code(kiln::load::import_cycle))]
    ImportCycle {
        /// The module whose import closes the loop.
        path: Utf8PathBuf,
    },
    /// An import statement names a path outside the project.
    #[error("bad import in module `{module}`: {source}")]
    #[diagnostic(code(kiln::load::import_path))]
    ImportPath {
        /// The importing module's origin.
        module: Utf8PathBuf,
        /// Why the path was rejected.
        #[source]
        source: PathError,
    },
}

/// One module together with its project-relative path prefix.
#[derive(Clone, Debug)]
pub struct ProjectModule {
    /// The parsed module.
    pub module: Module,
    /// Directory of the module file, prepended to its bare relative paths.
    pub prefix: Utf8PathBuf,
}

/// An immutable, fully loaded project: the shared input of every variant
/// resolution.
#[derive(Clone, Debug)]
pub struct Project {
    modules: Vec<ProjectModule>,
    declared: IndexSet<String>,
}

impl Project {
    /// Reads the root module file and every transitive import.
    ///
    /// The root file's directory becomes the project top directory; module
    /// origins and path prefixes are recorded relative to it. Imports load
    /// once each, depth-first in encounter order; the grammar keeps them
    /// out of conditional blocks, so loading is variant-independent.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] for unreadable files, parse failures, import
    /// paths leaving the project, or import cycles.
    pub fn load(root_file: &Utf8Path) -> Result<Self, LoadError> {
        let top = paths::module_prefix(root_file);
        let origin = root_file
            .file_name()
            .map_or_else(|| root_file.to_path_buf(), Utf8PathBuf::from);
        let mut loader = Loader {
            top,
            loaded: IndexSet::new(),
            loading: Vec::new(),
            modules: Vec::new(),
        };
        loader.load_module(origin)?;
        Ok(Self::from_project_modules(loader.modules))
    }

    /// Builds a project from already parsed modules, first one the root.
    ///
    /// Import statements inside the modules are ignored; the caller owns
    /// the module list and its order.
    #[must_use]
    pub fn from_modules(modules: Vec<Module>) -> Self {
        let wrapped = modules
            .into_iter()
            .map(|module| {
                let prefix = paths::module_prefix(&module.origin);
                ProjectModule { module, prefix }
            })
            .collect();
        Self::from_project_modules(wrapped)
    }

    fn from_project_modules(modules: Vec<ProjectModule>) -> Self {
        let mut declared = IndexSet::new();
        for loaded in &modules {
            scan_targets(&loaded.module.items, &mut declared);
        }
        Self { modules, declared }
    }

    /// The flattened module list, root first.
    #[must_use]
    pub fn modules(&self) -> &[ProjectModule] {
        &self.modules
    }

    /// True when any module declares a target of this name, in any
    /// conditional branch. Used to tell a misspelled dependency apart from
    /// one that exists but is excluded from the variant at hand.
    #[must_use]
    pub fn is_declared_target(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    /// Resolves one (toolset, configuration) variant.
    ///
    /// # Errors
    ///
    /// Returns the [`ResolutionError`] that stopped this variant.
    pub fn resolve(
        &self,
        toolset: &str,
        config: &str,
        oracle: &dyn FileOracle,
    ) -> Result<VariantGraph, ResolutionError> {
        VariantGraph::resolve(self, toolset, config, oracle)
    }

    /// Resolves every requested variant, in parallel.
    ///
    /// Results come back in request order. A failed variant carries its
    /// own error and leaves the others untouched.
    #[must_use]
    pub fn resolve_all(
        &self,
        requests: &[VariantRequest],
        oracle: &dyn FileOracle,
    ) -> Vec<Result<VariantGraph, VariantError>> {
        requests
            .par_iter()
            .map(|request| {
                self.resolve(&request.toolset, &request.config, oracle)
                    .map_err(|source| VariantError {
                        toolset: request.toolset.clone(),
                        config: request.config.clone(),
                        source,
                    })
            })
            .collect()
    }
}

/// One (toolset, configuration) pair to resolve.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VariantRequest {
    /// Toolset identifier.
    pub toolset: String,
    /// Configuration name.
    pub config: String,
}

impl VariantRequest {
    /// Builds a request from identifier strings.
    #[must_use]
    pub fn new(toolset: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            toolset: toolset.into(),
            config: config.into(),
        }
    }
}

/// A resolution failure attributed to the variant that produced it.
#[derive(Clone, Debug, Diagnostic, Eq, Error, PartialEq)]
#[error("variant ({toolset}, {config}): {source}")]
pub struct VariantError {
    /// Toolset of the failed variant.
    pub toolset: String,
    /// Configuration of the failed variant.
    pub config: String,
    /// What went wrong.
    #[source]
    #[diagnostic_source]
    pub source: ResolutionError,
}

struct Loader {
    top: Utf8PathBuf,
    loaded: IndexSet<Utf8PathBuf>,
    loading: Vec<Utf8PathBuf>,
    modules: Vec<ProjectModule>,
}

impl Loader {
    fn load_module(&mut self, origin: Utf8PathBuf) -> Result<(), LoadError> {
        if self.loading.contains(&origin) {
            return Err(LoadError::ImportCycle { path: origin });
        }
        if self.loaded.contains(&origin) {
            return Ok(());
        }
        let on_disk = self.top.join(&origin);
        let source = std::fs::read_to_string(&on_disk).map_err(|err| LoadError::Read {
            path: origin.clone(),
            source: err,
        })?;
        let module = parser::parse(&source, &origin)?;
        tracing::debug!(module = %origin, items = module.items.len(), "parsed module");

        let prefix = paths::module_prefix(&origin);
        let mut imports = Vec::new();
        scan_imports(&module.items, &mut imports);
        self.loaded.insert(origin.clone());
        self.loading.push(origin.clone());
        self.modules.push(ProjectModule {
            module,
            prefix: prefix.clone(),
        });

        for import in imports {
            let resolved = paths::project_relative(&prefix, &import).map_err(|source| {
                LoadError::ImportPath {
                    module: origin.clone(),
                    source,
                }
            })?;
            self.load_module(resolved)?;
        }
        self.loading.pop();
        Ok(())
    }
}

fn scan_targets(items: &[Item], into: &mut IndexSet<String>) {
    for item in items {
        match item {
            Item::Target(decl) => {
                into.insert(decl.name.clone());
            }
            Item::Condition(cond) => scan_targets(&cond.body, into),
            Item::Assign(_) | Item::Import(_) => {}
        }
    }
}

fn scan_imports(items: &[Item], into: &mut Vec<Utf8PathBuf>) {
    // The grammar only admits imports at module scope, outside conditionals.
    for item in items {
        if let Item::Import(import) = item {
            into.push(import.path.clone());
        }
    }
}
