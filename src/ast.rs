//! Abstract syntax tree for project-description modules.
//!
//! Both surface forms, the statement-list form and the explicit
//! `module { variables { … } targets { … } }` form, parse into these
//! structures, so everything downstream of the parser is agnostic about
//! which spelling produced a declaration. The tree is immutable after
//! parsing and is shared read-only across variant resolutions.
//!
//! Types derive [`serde::Serialize`] so a resolved project can be dumped as
//! JSON for debugging.

use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;

use crate::lexer::Span;

/// One parsed module: the contents of a single source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    /// Module name, taken from the file stem of `origin`.
    pub name: String,
    /// Path of the file this module was parsed from, relative to the
    /// project's top directory. Determines the prefix applied to the
    /// module's relative source paths.
    pub origin: Utf8PathBuf,
    /// Declarations in source order.
    pub items: Vec<Item>,
}

impl Module {
    /// Builds a module, deriving its name from the origin's file stem.
    #[must_use]
    pub fn new(origin: Utf8PathBuf, items: Vec<Item>) -> Self {
        let name = origin
            .file_stem()
            .map_or_else(|| origin.as_str().to_owned(), ToOwned::to_owned);
        Self {
            name,
            origin,
            items,
        }
    }
}

/// A declaration at module scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Item {
    /// Variable assignment or append.
    Assign(Assign),
    /// Conditionally included declarations.
    Condition(Condition<Item>),
    /// Target declaration.
    Target(TargetDecl),
    /// Import of another module file.
    Import(Import),
}

/// A declaration inside a target body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TargetItem {
    /// Property or user-variable assignment.
    Assign(Assign),
    /// Conditionally included target declarations.
    Condition(Condition<TargetItem>),
    /// A `sources { … }` or `headers { … }` block.
    Files(FilesBlock),
}

/// `name = expr;` or `name += expr;`, optionally toolset-qualified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assign {
    /// Toolset qualifier: `vs2008.projectfile = …` carries `Some("vs2008")`.
    /// A qualified assignment only takes effect when the active toolset
    /// matches.
    pub qualifier: Option<String>,
    /// Variable or property name.
    pub name: String,
    /// Whether the value replaces or appends.
    pub op: AssignOp,
    /// Right-hand side, evaluated when the statement is reached.
    pub value: Expr,
    /// Span of the whole statement.
    pub span: Span,
}

/// Assignment flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    /// `=` replaces any previous value.
    Set,
    /// `+=` appends to the previous value (or to a property's default).
    Append,
}

/// `if ( guard ) { body }`. Nested conditions AND together; a false guard
/// prunes the whole subtree for the variant being resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition<I> {
    /// Boolean guard expression.
    pub guard: Expr,
    /// Declarations that exist only when the guard holds.
    pub body: Vec<I>,
    /// Span of the `if` head.
    pub span: Span,
}

/// An `import path;` statement pulling another module file into the project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Import {
    /// Imported file path, relative to the importing module's directory.
    pub path: Utf8PathBuf,
    /// Span of the statement.
    pub span: Span,
}

/// A target declaration: `program hello { … }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetDecl {
    /// What kind of artifact the target builds.
    pub kind: TargetKind,
    /// Target name; must be unique across the whole project.
    pub name: String,
    /// Body declarations in source order.
    pub body: Vec<TargetItem>,
    /// Span of the declaration head.
    pub span: Span,
}

/// The four kinds of build artifact a target may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// A final executable.
    Program,
    /// A static archive, not directly loadable at runtime.
    Library,
    /// A dynamically loaded artifact that downstream programs may link
    /// against.
    SharedLibrary,
    /// A dynamically loaded artifact that is not linked against; a `deps`
    /// edge onto one expresses build order and packaging, not linking.
    LoadableModule,
}

impl TargetKind {
    /// Maps a surface keyword to a kind, if it names one.
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "program" => Some(Self::Program),
            "library" => Some(Self::Library),
            "shared-library" => Some(Self::SharedLibrary),
            "loadable-module" => Some(Self::LoadableModule),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Self::Program => "program",
            Self::Library => "library",
            Self::SharedLibrary => "shared-library",
            Self::LoadableModule => "loadable-module",
        };
        f.write_str(keyword)
    }
}

/// Which file list a block contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Compiled inputs.
    Sources,
    /// Interface files; never compiled directly but tracked and emitted.
    Headers,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sources => f.write_str("sources"),
            Self::Headers => f.write_str("headers"),
        }
    }
}

/// A `sources { … }` or `headers { … }` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilesBlock {
    /// Sources or headers.
    pub kind: FileKind,
    /// Entries in declaration order.
    pub entries: Vec<FileEntry>,
    /// Span of the block head.
    pub span: Span,
}

/// One entry in a files block: a path expression, optionally annotated with
/// the build step that produces related outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    /// Path expression; may evaluate to a list, contributing several files.
    pub path: Expr,
    /// Build step attached with a trailing `{ … }` block. The entry's path
    /// is the step's input.
    pub step: Option<StepDecl>,
    /// Span of the entry.
    pub span: Span,
}

/// A custom build step attached to a file entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDecl {
    /// Command template; may reference `%(in)`, `%(out)`, `%(out0)`, ….
    pub command: Expr,
    /// Progress-message template shown while the step runs.
    pub message: Option<Expr>,
    /// Extra files the step depends on beyond its input.
    pub dependencies: Option<Expr>,
    /// Declared output paths. Required; checked when the step graph is
    /// built so the error carries variant attribution.
    pub outputs: Option<Expr>,
    /// Span of the step block.
    pub span: Span,
}

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    /// The expression itself.
    pub kind: ExprKind,
    /// Where it appears in the source.
    pub span: Span,
}

impl Expr {
    /// Pairs an expression kind with its span.
    #[must_use]
    pub const fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression tree. Evaluation yields a string, boolean, list, or the null
/// selection of a ternary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    /// String literal: a bare word or a quoted string.
    Str(String),
    /// `true` or `false`.
    Bool(bool),
    /// The absent value.
    Null,
    /// `$(name)` variable or context reference.
    Ref(String),
    /// `[e1, e2, …]` list literal.
    List(Vec<Expr>),
    /// `!expr`.
    Not(Box<Expr>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `cond ? a : b`; only the selected branch is evaluated.
    Ternary {
        /// Boolean guard.
        cond: Box<Expr>,
        /// Value when the guard holds.
        when_true: Box<Expr>,
        /// Value when it does not.
        when_false: Box<Expr>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        };
        f.write_str(symbol)
    }
}
