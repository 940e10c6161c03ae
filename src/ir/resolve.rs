//! Per-variant model resolution.
//!
//! One resolver walk turns the shared project AST into one [`VariantGraph`]
//! for an explicit (toolset, configuration) pair: items are evaluated in
//! declaration order, false conditionals prune their whole subtree, the
//! property registry types and defaults known names, and the finished
//! target set is validated, propagated, and wired to its build steps.

use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};
use miette::Diagnostic;
use thiserror::Error;

use super::graph::{FileNode, ModuleNode, PropertySet, TargetNode, VariantGraph};
use super::propagate;
use super::steps::{self, FileOracle, GraphError, PendingStep};
use crate::ast::{
    Assign, AssignOp, Expr, FileKind, FilesBlock, Item, StepDecl, TargetDecl, TargetItem,
};
use crate::eval::{self, Context, EvalError, Value};
use crate::paths::{self, PathError, PathScope, SourcePath};
use crate::project::Project;
use crate::props::{self, PropScope, PropertySpec, ShapeError};

/// Failure to resolve one (toolset, configuration) variant.
#[derive(Clone, Debug, Diagnostic, Eq, Error, PartialEq)]
pub enum ResolutionError {
    /// The root module never declares `toolsets`.
    #[error("module `{module}` does not declare `toolsets`")]
    #[diagnostic(code(kiln::resolve::missing_toolsets))]
    MissingToolsets {
        /// Root module name.
        module: String,
    },
    /// The requested toolset is not in the root module's `toolsets` list.
    #[error("toolset `{toolset}` is not declared by module `{module}`")]
    #[diagnostic(code(kiln::resolve::unsupported_toolset))]
    UnsupportedToolset {
        /// Requested toolset.
        toolset: String,
        /// Root module name.
        module: String,
    },
    /// The requested configuration is outside the project's axis.
    #[error("configuration `{config}` is not declared (axis: {})", axis.join(", "))]
    #[diagnostic(code(kiln::resolve::undeclared_configuration))]
    UndeclaredConfiguration {
        /// Requested configuration.
        config: String,
        /// The configuration axis in force.
        axis: Vec<String>,
    },
    /// A target restricts itself to a configuration the axis does not have.
    #[error("target `{target}` names unknown configuration `{config}`")]
    #[diagnostic(code(kiln::resolve::unknown_configuration))]
    UnknownConfiguration {
        /// Target carrying the bad restriction.
        target: String,
        /// The configuration name that is not on the axis.
        config: String,
    },
    /// Two targets share a name within this variant.
    #[error("duplicate target `{name}` in module `{module}` (first declared in `{previous}`)")]
    #[diagnostic(code(kiln::resolve::duplicate_target))]
    DuplicateTarget {
        /// The colliding name.
        name: String,
        /// Module of the second declaration.
        module: String,
        /// Module of the first declaration.
        previous: String,
    },
    /// A `deps` entry names a target that exists nowhere in the project.
    #[error("target `{target}` depends on unknown target `{dependency}`")]
    #[diagnostic(code(kiln::resolve::unknown_dependency))]
    UnknownDependency {
        /// The depending target.
        target: String,
        /// The name that resolves to nothing.
        dependency: String,
    },
    /// A `deps` entry names a target that was gated out of this variant.
    #[error(
        "target `{target}` depends on `{dependency}`, which is excluded from this variant"
    )]
    #[diagnostic(code(kiln::resolve::excluded_dependency))]
    ExcludedDependency {
        /// The depending target.
        target: String,
        /// The excluded target.
        dependency: String,
    },
    /// The `deps` relation contains a cycle.
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    #[diagnostic(code(kiln::resolve::dependency_cycle))]
    DependencyCycle {
        /// The cycle, first node repeated at the end.
        cycle: Vec<String>,
    },
    /// A module-scope property was assigned inside a target body.
    #[error("property `{name}` can only be set at module scope, not on target `{target}`")]
    #[diagnostic(code(kiln::resolve::module_only_property))]
    ModuleOnlyProperty {
        /// The misplaced property.
        name: String,
        /// Target whose body carries the assignment.
        target: String,
    },
    /// `+=` on a plain variable that has no previous value.
    #[error("cannot append to undefined variable `{name}` in module `{module}`")]
    #[diagnostic(code(kiln::resolve::append_to_undefined))]
    AppendToUndefined {
        /// The undefined name.
        name: String,
        /// Module of the statement.
        module: String,
    },
    /// A file entry evaluated to something that is not a path.
    #[error("a file entry of target `{target}` evaluated to {found}, expected a path")]
    #[diagnostic(code(kiln::resolve::bad_file_entry))]
    BadFileEntry {
        /// Target whose block carries the entry.
        target: String,
        /// What the entry evaluated to.
        found: &'static str,
    },
    /// A build step was attached to an entry that names several files.
    #[error("a build step in target `{target}` needs a single input file")]
    #[diagnostic(code(kiln::resolve::step_needs_one_input))]
    StepNeedsOneInput {
        /// Target whose block carries the step.
        target: String,
    },
    /// A build step field evaluated to the wrong type.
    #[error("build step `{field}` of target `{target}` must be {expected}, got {found}")]
    #[diagnostic(code(kiln::resolve::bad_step_field))]
    BadStepField {
        /// Target whose step is malformed.
        target: String,
        /// The step key.
        field: &'static str,
        /// The type the field requires.
        expected: &'static str,
        /// What it evaluated to.
        found: &'static str,
    },
    /// An expression failed to evaluate.
    #[error("in module `{module}`: {source}")]
    #[diagnostic(code(kiln::resolve::eval))]
    Eval {
        /// Module the expression appears in.
        module: String,
        /// The evaluation failure.
        #[source]
        source: EvalError,
    },
    /// A property value does not fit its registered shape.
    #[error("in module `{module}`: {source}")]
    #[diagnostic(code(kiln::resolve::property))]
    Property {
        /// Module the assignment appears in.
        module: String,
        /// The shape mismatch.
        #[source]
        source: ShapeError,
    },
    /// A declared path could not be anchored.
    #[error("in module `{module}`: {source}")]
    #[diagnostic(code(kiln::resolve::path))]
    Path {
        /// Module the path appears in.
        module: String,
        /// The path failure.
        #[source]
        source: PathError,
    },
    /// Step-graph construction failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph {
        /// The underlying failure.
        #[from]
        source: GraphError,
    },
}

impl VariantGraph {
    /// Resolves the project against one (toolset, configuration) pair.
    ///
    /// The walk is strictly sequential within the variant; independent
    /// variants resolve concurrently from the same shared AST. `oracle`
    /// answers whether plain source files exist when the step graph checks
    /// entries that no step produces.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] attributed to this variant. Other
    /// variants are unaffected.
    pub fn resolve(
        project: &Project,
        toolset: &str,
        config: &str,
        oracle: &dyn FileOracle,
    ) -> Result<Self, ResolutionError> {
        tracing::debug!(toolset, config, "resolving variant");
        let mut resolver = Resolver::new(project, toolset, config);
        resolver.run()?;
        resolver.finish(oracle)
    }
}

struct Resolver<'p> {
    project: &'p Project,
    ctx: Context,
    module_name: String,
    module_prefix: Utf8PathBuf,
    targets: IndexMap<String, TargetNode>,
    target_modules: IndexMap<String, String>,
    gated: IndexSet<String>,
    modules_out: Vec<ModuleNode>,
    pending_steps: Vec<PendingStep>,
    solution_file: Option<SourcePath>,
}

impl<'p> Resolver<'p> {
    fn new(project: &'p Project, toolset: &str, config: &str) -> Self {
        Self {
            project,
            ctx: Context::new(toolset, config),
            module_name: String::new(),
            module_prefix: Utf8PathBuf::new(),
            targets: IndexMap::new(),
            target_modules: IndexMap::new(),
            gated: IndexSet::new(),
            modules_out: Vec::new(),
            pending_steps: Vec::new(),
            solution_file: None,
        }
    }

    fn run(&mut self) -> Result<(), ResolutionError> {
        for (index, loaded) in self.project.modules().iter().enumerate() {
            self.module_name = loaded.module.name.clone();
            self.module_prefix = loaded.prefix.clone();
            if index == 0 {
                // The root module evaluates into the base scope, visible
                // to every imported module.
                self.walk_module_items(&loaded.module.items)?;
                self.validate_root()?;
                self.capture_solution_file()?;
                self.snapshot_module(&loaded.module.origin);
            } else {
                self.ctx.push_scope();
                let walked = self.walk_module_items(&loaded.module.items);
                self.snapshot_module(&loaded.module.origin);
                self.ctx.pop_scope();
                walked?;
            }
        }
        self.validate_deps()
    }

    fn finish(mut self, oracle: &dyn FileOracle) -> Result<VariantGraph, ResolutionError> {
        propagate::propagate(&mut self.targets)?;
        let (built_steps, warnings) = steps::build(&mut self.targets, self.pending_steps, oracle)?;
        Ok(VariantGraph {
            toolset: self.ctx.toolset().to_owned(),
            config: self.ctx.config().to_owned(),
            solution_file: self.solution_file,
            modules: self.modules_out,
            targets: self.targets,
            steps: built_steps,
            warnings,
        })
    }

    fn walk_module_items(&mut self, items: &[Item]) -> Result<(), ResolutionError> {
        for item in items {
            match item {
                Item::Assign(assign) => self.apply_assign(assign, PropScope::Module, None)?,
                Item::Condition(cond) => {
                    if self.guard_holds(&cond.guard)? {
                        self.walk_module_items(&cond.body)?;
                    }
                }
                Item::Target(decl) => self.resolve_target(decl)?,
                // Imports were flattened into the module list at load time.
                Item::Import(_) => {}
            }
        }
        Ok(())
    }

    fn validate_root(&self) -> Result<(), ResolutionError> {
        let declared = match self.ctx.get("toolsets") {
            Some(Value::List(items)) => collect_strings(items),
            _ => {
                return Err(ResolutionError::MissingToolsets {
                    module: self.module_name.clone(),
                });
            }
        };
        if !declared.iter().any(|name| name == self.ctx.toolset()) {
            return Err(ResolutionError::UnsupportedToolset {
                toolset: self.ctx.toolset().to_owned(),
                module: self.module_name.clone(),
            });
        }
        let axis = self.current_axis();
        if !axis.iter().any(|name| name == self.ctx.config()) {
            return Err(ResolutionError::UndeclaredConfiguration {
                config: self.ctx.config().to_owned(),
                axis,
            });
        }
        Ok(())
    }

    fn capture_solution_file(&mut self) -> Result<(), ResolutionError> {
        if let Some(Value::Str(raw)) = self.ctx.get("solutionfile") {
            let cloned = raw.clone();
            self.solution_file = Some(self.anchor_one(&cloned, PathScope::Module)?);
        }
        Ok(())
    }

    fn snapshot_module(&mut self, origin: &Utf8PathBuf) {
        // A binding whose final value is null counts as never set.
        let vars = self
            .ctx
            .innermost()
            .flattened()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();
        self.modules_out.push(ModuleNode {
            name: self.module_name.clone(),
            origin: origin.clone(),
            vars,
        });
    }

    fn validate_deps(&self) -> Result<(), ResolutionError> {
        for node in self.targets.values() {
            for dep in &node.deps {
                if self.targets.contains_key(dep) {
                    continue;
                }
                if self.gated.contains(dep) || self.project.is_declared_target(dep) {
                    return Err(ResolutionError::ExcludedDependency {
                        target: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                return Err(ResolutionError::UnknownDependency {
                    target: node.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    // Assignments.

    fn apply_assign(
        &mut self,
        assign: &Assign,
        at: PropScope,
        target: Option<&str>,
    ) -> Result<(), ResolutionError> {
        // A qualified assignment for another toolset is pruned without
        // evaluating its right-hand side.
        if assign
            .qualifier
            .as_deref()
            .is_some_and(|qualifier| qualifier != self.ctx.toolset())
        {
            return Ok(());
        }
        let spec = self.spec_for(assign, at, target)?;
        let evaluated = self.assign_value(assign, spec)?;
        let shaped = match spec {
            Some(found) => {
                let normalized =
                    props::normalize(found, evaluated).map_err(|source| ResolutionError::Property {
                        module: self.module_name.clone(),
                        source,
                    })?;
                if found.shape.holds_paths() {
                    self.anchor_values(normalized, at)?
                } else {
                    normalized
                }
            }
            None => evaluated,
        };
        if assign.qualifier.is_some() {
            self.ctx.set_override(assign.name.clone(), shaped);
        } else {
            self.ctx.set(assign.name.clone(), shaped);
        }
        Ok(())
    }

    fn spec_for(
        &self,
        assign: &Assign,
        at: PropScope,
        target: Option<&str>,
    ) -> Result<Option<&'static PropertySpec>, ResolutionError> {
        if let Some(found) = props::lookup(&assign.name, at) {
            return Ok(Some(found));
        }
        match at {
            // A target property assigned at module scope is a default for
            // every target below it.
            PropScope::Module => Ok(props::lookup(&assign.name, PropScope::Target)),
            PropScope::Target => {
                if props::lookup(&assign.name, PropScope::Module).is_some() {
                    return Err(ResolutionError::ModuleOnlyProperty {
                        name: assign.name.clone(),
                        target: target.unwrap_or_default().to_owned(),
                    });
                }
                Ok(None)
            }
        }
    }

    fn assign_value(
        &mut self,
        assign: &Assign,
        spec: Option<&'static PropertySpec>,
    ) -> Result<Value, ResolutionError> {
        match assign.op {
            AssignOp::Set => self.eval_definition(assign),
            AssignOp::Append => {
                let current = match self.ctx.get(&assign.name) {
                    Some(existing) if !existing.is_null() => existing.clone(),
                    _ => match spec.and_then(props::default_value) {
                        Some(default) => default,
                        None => {
                            return Err(ResolutionError::AppendToUndefined {
                                name: assign.name.clone(),
                                module: self.module_name.clone(),
                            });
                        }
                    },
                };
                let addition = self.eval_definition(assign)?;
                Ok(eval::append(current, addition))
            }
        }
    }

    fn eval_definition(&mut self, assign: &Assign) -> Result<Value, ResolutionError> {
        let module = self.module_name.clone();
        self.ctx
            .eval_definition(&assign.name, &assign.value)
            .map_err(|source| ResolutionError::Eval { module, source })
    }

    fn guard_holds(&self, guard: &Expr) -> Result<bool, ResolutionError> {
        self.ctx
            .eval_condition(guard)
            .map_err(|source| self.eval_error(source))
    }

    fn eval_error(&self, source: EvalError) -> ResolutionError {
        ResolutionError::Eval {
            module: self.module_name.clone(),
            source,
        }
    }

    // Targets.

    fn resolve_target(&mut self, decl: &TargetDecl) -> Result<(), ResolutionError> {
        if let Some(previous) = self.target_modules.get(&decl.name) {
            return Err(ResolutionError::DuplicateTarget {
                name: decl.name.clone(),
                module: self.module_name.clone(),
                previous: previous.clone(),
            });
        }
        self.target_modules
            .insert(decl.name.clone(), self.module_name.clone());

        let axis = self.current_axis();
        self.ctx.push_scope();
        let mut files = RawFiles::default();
        let walked = self.walk_target_items(&decl.body, &decl.name, &mut files);
        let outcome = walked.and_then(|()| self.collect_target(decl, &axis, files));
        self.ctx.pop_scope();
        outcome
    }

    fn walk_target_items(
        &mut self,
        items: &[TargetItem],
        target: &str,
        files: &mut RawFiles,
    ) -> Result<(), ResolutionError> {
        for item in items {
            match item {
                TargetItem::Assign(assign) => {
                    self.apply_assign(assign, PropScope::Target, Some(target))?;
                }
                TargetItem::Condition(cond) => {
                    if self.guard_holds(&cond.guard)? {
                        self.walk_target_items(&cond.body, target, files)?;
                    }
                }
                TargetItem::Files(block) => self.collect_files(block, target, files)?,
            }
        }
        Ok(())
    }

    fn collect_files(
        &mut self,
        block: &FilesBlock,
        target: &str,
        files: &mut RawFiles,
    ) -> Result<(), ResolutionError> {
        for entry in &block.entries {
            let value = self
                .ctx
                .eval(&entry.path)
                .map_err(|source| self.eval_error(source))?;
            match value {
                // A ternary that selected null drops the entry entirely.
                Value::Null => {}
                Value::Str(raw) => {
                    let path = self.anchor_one(&raw, PathScope::Target)?;
                    let pending = entry
                        .step
                        .as_ref()
                        .map(|step| self.eval_step(step, target, &path))
                        .transpose()?;
                    files.push(block.kind, RawEntry { path, step: pending });
                }
                Value::List(items) => {
                    if entry.step.is_some() {
                        return Err(ResolutionError::StepNeedsOneInput {
                            target: target.to_owned(),
                        });
                    }
                    for item in items {
                        let raw = item.as_str().ok_or_else(|| ResolutionError::BadFileEntry {
                            target: target.to_owned(),
                            found: item.type_name(),
                        })?;
                        let path = self.anchor_one(raw, PathScope::Target)?;
                        files.push(block.kind, RawEntry { path, step: None });
                    }
                }
                Value::Bool(_) => {
                    return Err(ResolutionError::BadFileEntry {
                        target: target.to_owned(),
                        found: "a boolean",
                    });
                }
            }
        }
        Ok(())
    }

    fn eval_step(
        &self,
        step: &StepDecl,
        target: &str,
        input: &SourcePath,
    ) -> Result<PendingStep, ResolutionError> {
        let command = self.step_string(&step.command, target, "command")?;
        let message = step
            .message
            .as_ref()
            .map(|expr| self.step_string(expr, target, "message"))
            .transpose()?;
        let dependencies = step
            .dependencies
            .as_ref()
            .map(|expr| self.step_paths(expr, target, "dependencies"))
            .transpose()?
            .unwrap_or_default();
        let outputs = step
            .outputs
            .as_ref()
            .map(|expr| self.step_paths(expr, target, "outputs"))
            .transpose()?
            .unwrap_or_default();
        Ok(PendingStep {
            target: target.to_owned(),
            input: input.clone(),
            command,
            message,
            dependencies,
            outputs,
        })
    }

    fn step_string(
        &self,
        expr: &Expr,
        target: &str,
        field: &'static str,
    ) -> Result<String, ResolutionError> {
        let value = self
            .ctx
            .eval(expr)
            .map_err(|source| self.eval_error(source))?;
        match value {
            Value::Str(text) => Ok(text),
            other => Err(ResolutionError::BadStepField {
                target: target.to_owned(),
                field,
                expected: "a string",
                found: other.type_name(),
            }),
        }
    }

    fn step_paths(
        &self,
        expr: &Expr,
        target: &str,
        field: &'static str,
    ) -> Result<Vec<SourcePath>, ResolutionError> {
        let value = self
            .ctx
            .eval(expr)
            .map_err(|source| self.eval_error(source))?;
        let mut anchored = Vec::new();
        for item in value.into_list() {
            let raw = item.as_str().ok_or_else(|| ResolutionError::BadStepField {
                target: target.to_owned(),
                field,
                expected: "a list of paths",
                found: item.type_name(),
            })?;
            anchored.push(self.anchor_one(raw, PathScope::Target)?);
        }
        Ok(anchored)
    }

    fn collect_target(
        &mut self,
        decl: &TargetDecl,
        axis: &[String],
        files: RawFiles,
    ) -> Result<(), ResolutionError> {
        let restricted = self.string_list("configurations");
        for name in &restricted {
            if !axis.contains(name) {
                return Err(ResolutionError::UnknownConfiguration {
                    target: decl.name.clone(),
                    config: name.clone(),
                });
            }
        }
        let enabled: &[String] = if restricted.is_empty() { axis } else { &restricted };
        if !enabled.iter().any(|name| name == self.ctx.config()) {
            tracing::debug!(
                target_name = %decl.name,
                config = self.ctx.config(),
                "target gated out of this variant",
            );
            self.gated.insert(decl.name.clone());
            return Ok(());
        }

        let props = PropertySet {
            defines: self.string_list("defines"),
            includedirs: self.path_list("includedirs")?,
            libdirs: self.path_list("libdirs")?,
            libs: self.string_list("libs"),
        };
        let (sources, headers) = self.register_files(files);
        let node = TargetNode {
            name: decl.name.clone(),
            kind: decl.kind,
            module: self.module_name.clone(),
            archs: self.string_list("archs"),
            deps: self.string_list("deps"),
            sources,
            headers,
            props,
            effective: PropertySet::default(),
            project_file: self.path_scalar("projectfile")?,
            vars: self.user_vars(),
        };
        tracing::debug!(target_name = %node.name, kind = %node.kind, "registered target");
        self.targets.insert(decl.name.clone(), node);
        Ok(())
    }

    fn register_files(&mut self, files: RawFiles) -> (Vec<FileNode>, Vec<FileNode>) {
        let mut adopt = |entries: Vec<RawEntry>| {
            entries
                .into_iter()
                .map(|entry| {
                    if let Some(pending) = entry.step {
                        self.pending_steps.push(pending);
                    }
                    FileNode {
                        path: entry.path,
                        produced_by: None,
                    }
                })
                .collect()
        };
        let sources = adopt(files.sources);
        let headers = adopt(files.headers);
        (sources, headers)
    }

    // Property reads for the node under construction. All values were
    // shape-checked when assigned, so reads are infallible on type.

    fn string_list(&self, name: &str) -> Vec<String> {
        match self.ctx.get(name) {
            Some(Value::List(items)) => collect_strings(items),
            Some(Value::Str(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    fn path_list(&self, name: &str) -> Result<Vec<SourcePath>, ResolutionError> {
        self.string_list(name)
            .iter()
            .map(|raw| self.anchor_one(raw, PathScope::Target))
            .collect()
    }

    fn path_scalar(&self, name: &str) -> Result<Option<SourcePath>, ResolutionError> {
        match self.ctx.get(name) {
            Some(Value::Str(raw)) => {
                let cloned = raw.clone();
                Ok(Some(self.anchor_one(&cloned, PathScope::Target)?))
            }
            _ => Ok(None),
        }
    }

    fn current_axis(&self) -> Vec<String> {
        match self.ctx.get("configurations") {
            Some(Value::List(items)) => collect_strings(items),
            _ => props::DEFAULT_CONFIGURATIONS
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
        }
    }

    fn user_vars(&self) -> IndexMap<String, Value> {
        self.ctx
            .innermost()
            .flattened()
            .into_iter()
            .filter(|(name, value)| !props::known_anywhere(name) && !value.is_null())
            .collect()
    }

    // Paths.

    fn anchor_values(&self, value: Value, at: PropScope) -> Result<Value, ResolutionError> {
        let scope = match at {
            PropScope::Module => PathScope::Module,
            PropScope::Target => PathScope::Target,
        };
        match value {
            Value::Str(raw) => Ok(Value::Str(self.anchor_one(&raw, scope)?.to_string())),
            Value::List(items) => {
                let mut anchored = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Str(raw) => {
                            anchored.push(Value::Str(self.anchor_one(&raw, scope)?.to_string()));
                        }
                        other => anchored.push(other),
                    }
                }
                Ok(Value::List(anchored))
            }
            other => Ok(other),
        }
    }

    fn anchor_one(&self, raw: &str, scope: PathScope) -> Result<SourcePath, ResolutionError> {
        paths::resolve(raw, &self.module_prefix, scope).map_err(|source| ResolutionError::Path {
            module: self.module_name.clone(),
            source,
        })
    }
}

fn collect_strings(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
}

#[derive(Default)]
struct RawFiles {
    sources: Vec<RawEntry>,
    headers: Vec<RawEntry>,
}

impl RawFiles {
    fn push(&mut self, kind: FileKind, entry: RawEntry) {
        match kind {
            FileKind::Sources => self.sources.push(entry),
            FileKind::Headers => self.headers.push(entry),
        }
    }
}

struct RawEntry {
    path: SourcePath,
    step: Option<PendingStep>,
}
