//! Dependency resolution: orders a discovery batch so that requirements
//! come before their dependents.

use crate::descriptor::ModDescriptor;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Result of ordering a discovery batch.
#[derive(Debug)]
pub struct Resolution {
    /// Every input id exactly once; for every requirement `(a requires b)`
    /// present in the batch, `b` precedes `a` (unless they share a cycle).
    pub order: Vec<String>,
    /// Ids participating in a requirement cycle. They still appear in
    /// `order`, but the runtime fails their load with a dependency error.
    pub cycles: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Walk<'a> {
    mods: &'a [ModDescriptor],
    index: HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    path: Vec<usize>,
    order: Vec<String>,
    cycle_members: HashSet<usize>,
}

/// DFS-postorder topological sort over declared requirements.
///
/// Traversal starts from each descriptor in discovery order and visits a
/// mod's requirements (in declared order) before appending the mod itself.
/// A requirement id absent from the batch is skipped here; its absence is
/// reported at load time, not as a resolution failure. A back edge marks
/// every mod on the enclosing path segment as a cycle member.
pub fn resolve_order(mods: &[ModDescriptor]) -> Resolution {
    let index: HashMap<&str, usize> = mods
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    let mut walk = Walk {
        mods,
        index,
        marks: vec![Mark::Unvisited; mods.len()],
        path: Vec::new(),
        order: Vec::with_capacity(mods.len()),
        cycle_members: HashSet::new(),
    };

    for i in 0..mods.len() {
        visit(&mut walk, i);
    }

    let cycles: Vec<String> = walk
        .cycle_members
        .iter()
        .map(|&i| mods[i].id.clone())
        .collect();
    for id in &cycles {
        warn!("[{}] participates in a requirement cycle", id);
    }

    Resolution {
        order: walk.order,
        cycles,
    }
}

fn visit(walk: &mut Walk<'_>, i: usize) {
    match walk.marks[i] {
        Mark::Done => return,
        Mark::InProgress => {
            // Back edge: everything on the path from `i` onward is cyclic.
            if let Some(pos) = walk.path.iter().position(|&p| p == i) {
                walk.cycle_members.extend(walk.path[pos..].iter().copied());
            }
            return;
        }
        Mark::Unvisited => {}
    }

    walk.marks[i] = Mark::InProgress;
    walk.path.push(i);
    for req in &walk.mods[i].requirements {
        if let Some(&j) = walk.index.get(req.id.as_str()) {
            visit(walk, j);
        }
    }
    walk.path.pop();
    walk.marks[i] = Mark::Done;
    walk.order.push(walk.mods[i].id.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ModDescriptor, ModManifest};
    use std::path::PathBuf;

    fn descriptor(id: &str, version: &str, requirements: &[&str]) -> ModDescriptor {
        let manifest = ModManifest {
            id: id.to_string(),
            version: version.to_string(),
            requirements: requirements.iter().map(|s| s.to_string()).collect(),
            entry_point: format!("{id}.Main.Load"),
            ..Default::default()
        };
        ModDescriptor::from_manifest(manifest, PathBuf::from(format!("/mods/{id}"))).unwrap()
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn requirement_precedes_dependent() {
        let mods = vec![
            descriptor("a", "1.0.0", &["b-1.2.0"]),
            descriptor("b", "1.3.0", &[]),
        ];
        let resolution = resolve_order(&mods);
        assert_eq!(resolution.order, vec!["b", "a"]);
        assert!(resolution.cycles.is_empty());
    }

    #[test]
    fn every_id_appears_exactly_once() {
        let mods = vec![
            descriptor("a", "1.0.0", &["c", "b"]),
            descriptor("b", "1.0.0", &["c"]),
            descriptor("c", "1.0.0", &[]),
            descriptor("d", "1.0.0", &["a"]),
        ];
        let resolution = resolve_order(&mods);
        assert_eq!(resolution.order.len(), 4);
        for m in &mods {
            assert_eq!(resolution.order.iter().filter(|x| **x == m.id).count(), 1);
        }
        // Topological validity over every declared edge.
        for m in &mods {
            for req in &m.requirements {
                if mods.iter().any(|x| x.id == req.id) {
                    assert!(
                        position(&resolution.order, &req.id) < position(&resolution.order, &m.id),
                        "'{}' must precede '{}'",
                        req.id,
                        m.id
                    );
                }
            }
        }
    }

    #[test]
    fn missing_requirement_does_not_abort_resolution() {
        let mods = vec![descriptor("a", "1.0.0", &["ghost"])];
        let resolution = resolve_order(&mods);
        assert_eq!(resolution.order, vec!["a"]);
        assert!(resolution.cycles.is_empty());
    }

    #[test]
    fn cycle_members_are_reported_and_still_ordered() {
        let mods = vec![
            descriptor("a", "1.0.0", &["b"]),
            descriptor("b", "1.0.0", &["a"]),
            descriptor("c", "1.0.0", &[]),
        ];
        let resolution = resolve_order(&mods);
        assert_eq!(resolution.order.len(), 3);
        let mut cycles = resolution.cycles.clone();
        cycles.sort();
        assert_eq!(cycles, vec!["a", "b"]);
    }

    #[test]
    fn self_requirement_is_a_cycle() {
        let mods = vec![descriptor("a", "1.0.0", &["a"])];
        let resolution = resolve_order(&mods);
        assert_eq!(resolution.order, vec!["a"]);
        assert_eq!(resolution.cycles, vec!["a"]);
    }
}
