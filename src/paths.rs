//! Anchored source paths.
//!
//! Declared paths use a virtual addressing scheme with two anchors: `@top`,
//! the project's top source directory, and `@builddir`, the per-target build
//! output directory. Bare relative paths are module-relative and are
//! rewritten onto `@top` by prefixing the module's directory, so the same
//! file spelled from different modules compares equal. Normalization removes
//! `.` and `..` segments and keeps `/` separators regardless of host.

use std::fmt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Virtual root a path is addressed from.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Anchor {
    /// The project's top source directory.
    Top,
    /// The build output directory of the target being resolved.
    BuildDir,
}

impl Anchor {
    /// Surface spelling of the anchor.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "@top",
            Self::BuildDir => "@builddir",
        }
    }
}

/// A normalized, anchored path.
///
/// Serializes as its display form (`@top/src/hello.c`), which keeps resolved
/// graphs compact and stable when dumped as JSON.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SourcePath {
    /// Which virtual root the path hangs off.
    pub anchor: Anchor,
    /// Path relative to the anchor; empty means the anchor itself.
    pub path: Utf8PathBuf,
}

impl SourcePath {
    /// A `@top`-anchored path.
    #[must_use]
    pub fn top(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            anchor: Anchor::Top,
            path: path.into(),
        }
    }

    /// A `@builddir`-anchored path.
    #[must_use]
    pub fn build(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            anchor: Anchor::BuildDir,
            path: path.into(),
        }
    }

    /// Final path component, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.as_str().is_empty() {
            f.write_str(self.anchor.as_str())
        } else {
            write!(f, "{}/{}", self.anchor.as_str(), self.path)
        }
    }
}

impl Serialize for SourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a declared path appears; decides whether `@builddir` is legal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathScope {
    /// Module-scope path properties, such as a solution file.
    Module,
    /// Target-scope path properties and file entries.
    Target,
}

/// Failure to interpret a declared path.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PathError {
    /// `@builddir` only means something once a target provides the build
    /// directory.
    #[error("`@builddir` paths are not allowed outside of targets: `{path}`")]
    BuildDirOutsideTarget {
        /// The offending path as written.
        path: String,
    },
    /// An `@word` prefix that is neither `@top` nor `@builddir`.
    #[error("unknown path anchor in `{path}`")]
    UnknownAnchor {
        /// The offending path as written.
        path: String,
    },
    /// Absolute paths would tie the model to one machine.
    #[error("absolute paths are not allowed: `{path}`")]
    Absolute {
        /// The offending path as written.
        path: String,
    },
    /// Too many `..` segments.
    #[error("path `{path}` points above its root")]
    EscapesRoot {
        /// The offending path as written.
        path: String,
    },
    /// Backslash separators are rejected rather than guessed at.
    #[error("path `{path}` uses `\\` separators; use `/`")]
    BackslashSeparator {
        /// The offending path as written.
        path: String,
    },
    /// An empty string where a path was expected.
    #[error("empty path")]
    Empty,
}

/// Interprets a declared path against the module `prefix` (the module's
/// directory relative to the top directory).
///
/// # Errors
///
/// Returns a [`PathError`] for absolute paths, backslash separators, unknown
/// anchors, `@builddir` outside a target, or `..` escaping the root.
pub fn resolve(raw: &str, prefix: &Utf8Path, scope: PathScope) -> Result<SourcePath, PathError> {
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if raw.contains('\\') {
        return Err(PathError::BackslashSeparator {
            path: raw.to_owned(),
        });
    }
    if raw.starts_with('/') || has_drive_prefix(raw) {
        return Err(PathError::Absolute {
            path: raw.to_owned(),
        });
    }
    if let Some(rest) = strip_anchor(raw, "@top") {
        return normalized(Anchor::Top, Utf8Path::new(rest), raw);
    }
    if let Some(rest) = strip_anchor(raw, "@builddir") {
        if scope == PathScope::Module {
            return Err(PathError::BuildDirOutsideTarget {
                path: raw.to_owned(),
            });
        }
        return normalized(Anchor::BuildDir, Utf8Path::new(rest), raw);
    }
    if raw.starts_with('@') {
        return Err(PathError::UnknownAnchor {
            path: raw.to_owned(),
        });
    }
    normalized(Anchor::Top, &prefix.join(raw), raw)
}

/// Joins `relative` onto `base_dir` and normalizes, keeping the result
/// inside the project. Used to resolve import paths between module files.
///
/// # Errors
///
/// Returns a [`PathError`] when the result is absolute or escapes the top
/// directory.
pub fn project_relative(
    base_dir: &Utf8Path,
    relative: &Utf8Path,
) -> Result<Utf8PathBuf, PathError> {
    let raw = relative.as_str();
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if raw.contains('\\') {
        return Err(PathError::BackslashSeparator {
            path: raw.to_owned(),
        });
    }
    let joined = normalized(Anchor::Top, &base_dir.join(relative), raw)?;
    Ok(joined.path)
}

/// Directory of a module file relative to the top directory; the prefix
/// applied to the module's bare relative paths.
#[must_use]
pub fn module_prefix(origin: &Utf8Path) -> Utf8PathBuf {
    origin
        .parent()
        .map_or_else(Utf8PathBuf::new, Utf8Path::to_path_buf)
}

fn strip_anchor<'raw>(raw: &'raw str, anchor: &str) -> Option<&'raw str> {
    if raw == anchor {
        return Some("");
    }
    raw.strip_prefix(anchor)
        .and_then(|rest| rest.strip_prefix('/'))
}

fn has_drive_prefix(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

fn normalized(anchor: Anchor, path: &Utf8Path, original: &str) -> Result<SourcePath, PathError> {
    let mut segments: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(segment) => segments.push(segment),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot {
                        path: original.to_owned(),
                    });
                }
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(PathError::Absolute {
                    path: original.to_owned(),
                });
            }
        }
    }
    Ok(SourcePath {
        anchor,
        path: segments.iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn bare_paths_pick_up_the_module_prefix() {
        let resolved =
            resolve("hello.c", Utf8Path::new("sub"), PathScope::Target).expect("resolve");
        assert_eq!(resolved, SourcePath::top("sub/hello.c"));
        assert_eq!(resolved.to_string(), "@top/sub/hello.c");
    }

    #[test]
    fn top_anchored_paths_ignore_the_prefix() {
        let resolved =
            resolve("@top/windows", Utf8Path::new("sub"), PathScope::Target).expect("resolve");
        assert_eq!(resolved, SourcePath::top("windows"));
    }

    #[test]
    fn builddir_requires_target_scope() {
        let err = resolve("@builddir/gen.c", Utf8Path::new(""), PathScope::Module)
            .expect_err("must fail");
        assert!(matches!(err, PathError::BuildDirOutsideTarget { .. }));
        let ok =
            resolve("@builddir/gen.c", Utf8Path::new(""), PathScope::Target).expect("resolve");
        assert_eq!(ok, SourcePath::build("gen.c"));
    }

    #[test]
    fn dotdot_collapses_within_the_prefix() {
        let resolved =
            resolve("../shared/util.c", Utf8Path::new("sub/nested"), PathScope::Target)
                .expect("resolve");
        assert_eq!(resolved, SourcePath::top("sub/shared/util.c"));
    }

    #[rstest]
    #[case("../escape.c", "")]
    #[case("../../escape.c", "sub")]
    fn dotdot_above_top_is_rejected(#[case] raw: &str, #[case] prefix: &str) {
        let err = resolve(raw, Utf8Path::new(prefix), PathScope::Target).expect_err("must fail");
        assert!(matches!(err, PathError::EscapesRoot { .. }));
    }

    #[rstest]
    #[case("/usr/lib")]
    #[case("C:/code/x.c")]
    fn absolute_paths_are_rejected(#[case] raw: &str) {
        let err = resolve(raw, Utf8Path::new(""), PathScope::Target).expect_err("must fail");
        assert!(matches!(err, PathError::Absolute { .. }));
    }

    #[test]
    fn unknown_anchors_are_rejected() {
        let err = resolve("@srcroot/a.c", Utf8Path::new(""), PathScope::Target)
            .expect_err("must fail");
        assert!(matches!(err, PathError::UnknownAnchor { .. }));
    }

    #[test]
    fn backslashes_are_rejected() {
        let err = resolve("windows\\a.c", Utf8Path::new(""), PathScope::Target)
            .expect_err("must fail");
        assert!(matches!(err, PathError::BackslashSeparator { .. }));
    }

    #[test]
    fn bare_anchor_names_the_root() {
        let resolved = resolve("@top", Utf8Path::new("sub"), PathScope::Target).expect("resolve");
        assert_eq!(resolved.to_string(), "@top");
        assert!(resolved.path.as_str().is_empty());
    }

    #[test]
    fn import_paths_resolve_between_modules() {
        let resolved = project_relative(Utf8Path::new("sub"), Utf8Path::new("../lib/extra.kiln"))
            .expect("resolve");
        assert_eq!(resolved, Utf8PathBuf::from("lib/extra.kiln"));
    }

    #[test]
    fn module_prefix_is_the_directory() {
        assert_eq!(module_prefix(Utf8Path::new("top.kiln")), Utf8PathBuf::new());
        assert_eq!(
            module_prefix(Utf8Path::new("sub/child.kiln")),
            Utf8PathBuf::from("sub"),
        );
    }

    #[test]
    fn serializes_as_display_form() {
        let json = serde_json::to_string(&SourcePath::build("gensrc.cpp")).expect("json");
        assert_eq!(json, "\"@builddir/gensrc.cpp\"");
    }
}
