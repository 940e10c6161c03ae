//! Transitive property propagation across `deps` edges.

use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use super::cycle;
use super::graph::{PropertySet, TargetNode};
use super::resolve::ResolutionError;
use crate::ast::TargetKind;

/// Fills every target's `effective` set: its own properties followed by
/// each dependency's propagated properties, transitively, deduplicated
/// keeping the first occurrence.
///
/// Dependency names are validated before this runs, but a cycle is fatal
/// here regardless of earlier phases, since the walk cannot terminate on
/// one.
pub(crate) fn propagate(targets: &mut IndexMap<String, TargetNode>) -> Result<(), ResolutionError> {
    let edges: IndexMap<String, Vec<String>> = targets
        .iter()
        .map(|(name, node)| (name.clone(), node.deps.clone()))
        .collect();
    if let Some(found) = cycle::find_cycle(&edges) {
        return Err(ResolutionError::DependencyCycle { cycle: found });
    }

    let mut memo: IndexMap<String, PropertySet> = IndexMap::new();
    for name in edges.keys() {
        contribution(name, targets, &edges, &mut memo);
    }

    for node in targets.values_mut() {
        let mut merged = node.props.clone();
        for dep in &node.deps {
            if let Some(given) = memo.get(dep) {
                extend(&mut merged, given);
            }
        }
        node.effective = dedup(merged);
    }
    Ok(())
}

// What `name` passes to its dependents. A loadable module is loaded, not
// linked against, so it passes nothing at all.
fn contribution(
    name: &str,
    targets: &IndexMap<String, TargetNode>,
    edges: &IndexMap<String, Vec<String>>,
    memo: &mut IndexMap<String, PropertySet>,
) -> PropertySet {
    if let Some(done) = memo.get(name) {
        return done.clone();
    }
    let Some(node) = targets.get(name) else {
        return PropertySet::default();
    };
    let mut passed = PropertySet::default();
    if node.kind != TargetKind::LoadableModule {
        passed = node.props.clone();
        for dep in edges.get(name).into_iter().flatten() {
            let given = contribution(dep, targets, edges, memo);
            extend(&mut passed, &given);
        }
    }
    let deduped = dedup(passed);
    memo.insert(name.to_owned(), deduped.clone());
    deduped
}

fn extend(into: &mut PropertySet, from: &PropertySet) {
    into.defines.extend(from.defines.iter().cloned());
    into.includedirs.extend(from.includedirs.iter().cloned());
    into.libdirs.extend(from.libdirs.iter().cloned());
    into.libs.extend(from.libs.iter().cloned());
}

fn dedup(set: PropertySet) -> PropertySet {
    PropertySet {
        defines: dedup_list(set.defines),
        includedirs: dedup_list(set.includedirs),
        libdirs: dedup_list(set.libdirs),
        libs: dedup_list(set.libs),
    }
}

fn dedup_list<T: Hash + Eq>(items: Vec<T>) -> Vec<T> {
    let seen: IndexSet<T> = items.into_iter().collect();
    seen.into_iter().collect()
}
