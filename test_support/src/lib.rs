//! Shared helpers for kiln's integration tests.
//!
//! Fixtures are written to a temporary directory and loaded through the
//! real project loader, so tests exercise the same path the library's
//! consumers do. Graph comparisons go through canonical JSON to make
//! determinism checks independent of formatting.

use camino::Utf8Path;
use kiln::ir::{FileOracle, VariantGraph};
use kiln::project::Project;
use tempfile::TempDir;

/// Writes `files` into a fresh temporary directory and loads the project
/// rooted at the first file.
///
/// Paths may contain subdirectories; they are created as needed. The
/// temporary directory is discarded once loading has finished, since a
/// loaded project keeps no handle on the filesystem.
pub fn load_fixture(files: &[(&str, &str)]) -> Project {
    let dir = TempDir::new().expect("temp dir");
    let top = Utf8Path::from_path(dir.path()).expect("utf-8 temp dir");
    for (name, contents) in files {
        let path = top.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }
        std::fs::write(&path, contents).expect("write fixture file");
    }
    let (root, _) = files.first().expect("at least one fixture file");
    Project::load(&top.join(root)).expect("fixture project loads")
}

/// Loads a fixture and resolves one variant, panicking on failure.
pub fn resolve_fixture(
    files: &[(&str, &str)],
    toolset: &str,
    config: &str,
    oracle: &dyn FileOracle,
) -> VariantGraph {
    load_fixture(files)
        .resolve(toolset, config, oracle)
        .expect("fixture variant resolves")
}

/// Canonical (RFC 8785) JSON rendering of any serializable value.
///
/// Two values render identically exactly when their serialized forms are
/// equal, which is what graph determinism tests compare.
pub fn canonical_json<T: serde::Serialize>(value: &T) -> String {
    serde_json_canonicalizer::to_string(value).expect("canonical json")
}
