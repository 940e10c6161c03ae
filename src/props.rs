//! Known-property registry.
//!
//! The resolver consults this table when applying an assignment: known
//! names get shape checking, defaulting, and a propagation flag; unknown
//! names are user variables, stored as evaluated and carrying no further
//! meaning. The table is the single place that decides which properties
//! flow across `deps` edges.

use thiserror::Error;

use crate::eval::Value;

/// Configuration axis a root module gets when it declares none.
pub const DEFAULT_CONFIGURATIONS: [&str; 2] = ["Debug", "Release"];

/// Where a property may be assigned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PropScope {
    /// Module scope, outside any target.
    Module,
    /// Inside a target body.
    Target,
}

/// Shape a property's value must take.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PropShape {
    /// A single string.
    Scalar,
    /// A single anchored path.
    Path,
    /// A list of strings; a scalar assignment becomes a one-element list.
    StringList,
    /// A list of anchored paths, normalized like [`PropShape::StringList`].
    PathList,
    /// Declared through `sources { }` / `headers { }` blocks, never by
    /// assignment.
    FileList,
}

impl PropShape {
    /// Noun for error messages.
    #[must_use]
    pub const fn expected(self) -> &'static str {
        match self {
            Self::Scalar => "a string",
            Self::Path => "a path",
            Self::StringList => "a list of strings",
            Self::PathList => "a list of paths",
            Self::FileList => "a `sources { }` or `headers { }` block",
        }
    }

    /// Whether values hold paths that must be anchored.
    #[must_use]
    pub const fn holds_paths(self) -> bool {
        matches!(self, Self::Path | Self::PathList)
    }
}

/// Registry row for one known property.
#[derive(Clone, Copy, Debug)]
pub struct PropertySpec {
    /// Property name as written in source.
    pub name: &'static str,
    /// Scope the property belongs to.
    pub scope: PropScope,
    /// Shape assignments are checked against.
    pub shape: PropShape,
    /// Whether values flow to dependents across `deps` edges.
    pub propagates: bool,
}

const fn row(name: &'static str, scope: PropScope, shape: PropShape, propagates: bool) -> PropertySpec {
    PropertySpec {
        name,
        scope,
        shape,
        propagates,
    }
}

const REGISTRY: [PropertySpec; 13] = [
    row("toolsets", PropScope::Module, PropShape::StringList, false),
    row("configurations", PropScope::Module, PropShape::StringList, false),
    row("solutionfile", PropScope::Module, PropShape::Path, false),
    row("configurations", PropScope::Target, PropShape::StringList, false),
    row("archs", PropScope::Target, PropShape::StringList, false),
    row("deps", PropScope::Target, PropShape::StringList, false),
    row("defines", PropScope::Target, PropShape::StringList, true),
    row("includedirs", PropScope::Target, PropShape::PathList, true),
    row("libdirs", PropScope::Target, PropShape::PathList, true),
    row("libs", PropScope::Target, PropShape::StringList, true),
    row("sources", PropScope::Target, PropShape::FileList, false),
    row("headers", PropScope::Target, PropShape::FileList, false),
    row("projectfile", PropScope::Target, PropShape::Path, false),
];

/// The registry row for `name` at `scope`, if `name` is a known property
/// there.
#[must_use]
pub fn lookup(name: &str, scope: PropScope) -> Option<&'static PropertySpec> {
    REGISTRY
        .iter()
        .find(|spec| spec.name == name && spec.scope == scope)
}

/// Whether `name` is a known property in any scope. Used to flag a
/// property assigned at the wrong level rather than treating it as a user
/// variable.
#[must_use]
pub fn known_anywhere(name: &str) -> bool {
    REGISTRY.iter().any(|spec| spec.name == name)
}

/// The value an unset property takes, when the registry gives it one.
/// Dynamic defaults (a target's `configurations` falling back to the
/// module axis) are the resolver's business.
#[must_use]
pub const fn default_value(spec: &PropertySpec) -> Option<Value> {
    match spec.shape {
        PropShape::StringList | PropShape::PathList => Some(Value::List(Vec::new())),
        PropShape::Scalar | PropShape::Path | PropShape::FileList => None,
    }
}

/// An assigned value that does not fit the property's declared shape.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("property `{name}` expects {expected}, got {found}")]
pub struct ShapeError {
    /// Property name.
    pub name: &'static str,
    /// What the registry declares.
    pub expected: &'static str,
    /// What the assignment produced.
    pub found: &'static str,
}

/// Coerces an evaluated value to the property's shape.
///
/// Null passes through unchanged; it means unset for every shape. A scalar
/// assigned to a list-shaped property becomes a one-element list.
///
/// # Errors
///
/// Returns a [`ShapeError`] when the value cannot be coerced, including
/// any assignment to a block-only property.
pub fn normalize(spec: &PropertySpec, value: Value) -> Result<Value, ShapeError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match spec.shape {
        PropShape::Scalar | PropShape::Path => match value {
            Value::Str(_) => Ok(value),
            other => Err(shape_error(spec, &other)),
        },
        PropShape::StringList | PropShape::PathList => {
            let items = value.into_list();
            match items.iter().find(|item| item.as_str().is_none()) {
                Some(bad) => Err(shape_error(spec, bad)),
                None => Ok(Value::List(items)),
            }
        }
        PropShape::FileList => Err(shape_error(spec, &value)),
    }
}

fn shape_error(spec: &PropertySpec, found: &Value) -> ShapeError {
    ShapeError {
        name: spec.name,
        expected: spec.shape.expected(),
        found: found.type_name(),
    }
}
