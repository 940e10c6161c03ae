//! Cycle detection over the `deps` relation of one variant.

use indexmap::IndexMap;

/// Tracks the visitation state of a target during cycle detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Returns the first dependency cycle, canonicalized to start at the
/// smallest target name, or `None` when the relation is acyclic.
///
/// Dependency names are validated before this runs; an edge onto an
/// unknown name is skipped rather than treated as a node.
pub(crate) fn find_cycle(deps: &IndexMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut detector = CycleDetector::new(deps);
    for node in deps.keys() {
        if detector.is_visited(node) {
            continue;
        }
        if let Some(found) = detector.visit(node.clone()) {
            return Some(found);
        }
    }
    None
}

struct CycleDetector<'a> {
    deps: &'a IndexMap<String, Vec<String>>,
    stack: Vec<String>,
    states: IndexMap<String, VisitState>,
}

impl<'a> CycleDetector<'a> {
    fn new(deps: &'a IndexMap<String, Vec<String>>) -> Self {
        Self {
            deps,
            stack: Vec::new(),
            states: IndexMap::new(),
        }
    }

    fn is_visited(&self, node: &str) -> bool {
        matches!(self.states.get(node), Some(VisitState::Visited))
    }

    fn visit(&mut self, node: String) -> Option<Vec<String>> {
        match self.states.get(&node) {
            Some(VisitState::Visited) => return None,
            Some(VisitState::Visiting) => {
                let idx = self
                    .stack
                    .iter()
                    .position(|name| name == &node)
                    .unwrap_or_else(|| {
                        debug_assert!(false, "visiting node must be on the stack");
                        0
                    });
                let mut cycle: Vec<String> = self.stack.iter().skip(idx).cloned().collect();
                cycle.push(node);
                return Some(canonicalize_cycle(cycle));
            }
            None => {
                self.states.insert(node.clone(), VisitState::Visiting);
            }
        }

        self.stack.push(node.clone());

        if let Some(edges) = self.deps.get(&node) {
            for dep in edges {
                if !self.deps.contains_key(dep) {
                    tracing::debug!(
                        missing = %dep,
                        dependent = %node,
                        "skipping name missing from the variant during cycle detection",
                    );
                    continue;
                }

                if let Some(cycle) = self.visit(dep.clone()) {
                    return Some(cycle);
                }
            }
        }

        self.stack.pop();
        self.states.insert(node, VisitState::Visited);
        None
    }
}

fn canonicalize_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (prefix, suffix) = cycle.split_at_mut(len);
    prefix.rotate_left(start);
    if let (Some(first), Some(slot)) = (prefix.first().cloned(), suffix.first_mut()) {
        slot.clone_from(&first);
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_owned(),
                    deps.iter().map(|dep| (*dep).to_owned()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let deps = edges(&[("a", &["a"])]);
        let cycle = find_cycle(&deps).expect("cycle");
        assert_eq!(cycle, vec!["a".to_owned(), "a".to_owned()]);
    }

    #[test]
    fn two_node_cycle_is_found() {
        let deps = edges(&[("a", &["b"]), ("b", &["a"])]);
        let cycle = find_cycle(&deps).expect("cycle");
        assert_eq!(cycle, vec!["a".to_owned(), "b".to_owned(), "a".to_owned()]);
    }

    #[test]
    fn acyclic_relation_passes() {
        let deps = edges(&[("app", &["liba"]), ("liba", &["common"]), ("common", &[])]);
        assert!(find_cycle(&deps).is_none());
    }

    #[test]
    fn diamond_sharing_is_not_a_cycle() {
        let deps = edges(&[
            ("app", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        assert!(find_cycle(&deps).is_none());
    }

    #[test]
    fn cycle_starts_at_the_smallest_name() {
        let deps = edges(&[("c", &["a"]), ("a", &["b"]), ("b", &["c"])]);
        let cycle = find_cycle(&deps).expect("cycle");
        assert_eq!(
            cycle,
            vec![
                "a".to_owned(),
                "b".to_owned(),
                "c".to_owned(),
                "a".to_owned(),
            ],
        );
    }

    #[test]
    fn unknown_edge_names_are_skipped() {
        let deps = edges(&[("a", &["ghost"])]);
        assert!(find_cycle(&deps).is_none());
    }
}
