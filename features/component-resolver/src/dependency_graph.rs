use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

use crate::component::Component;

/// Direct dependencies of every component reachable from the requested roots
///
/// Built fresh by every resolution. Components which were already cached are recorded without
/// dependencies - by the time they were cached all of their dependencies were cached as well.
pub type DependencyMap = HashMap<Component, Vec<Component>>;

/// Outcome of [sequence]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence<N> {
    /// Dependencies before dependents, each node once - empty unless the walk was sound
    pub order: Vec<N>,
    /// Nodes reached without an entry in the map
    pub missing: Vec<N>,
    /// Closed loops, from the first occurrence of a node through its repetition
    pub cycles: Vec<Vec<N>>,
}
impl<N> Sequence<N> {
    /// True if `order` can be trusted
    pub fn is_sound(&self) -> bool {
        self.missing.is_empty() && self.cycles.is_empty()
    }
}

/// Orders the nodes reachable from `roots` so that every node follows all of its dependencies
///
/// Depth first, visiting dependencies in declared order. A node shared by several dependents is
/// placed once, before the first dependent reached. If any node is missing from the map or any
/// cycle is found, the order is left empty and the problems are reported instead.
pub fn sequence<N>(map: &HashMap<N, Vec<N>>, roots: &[N]) -> Sequence<N>
where
    N: Clone + Eq + Hash,
{
    let mut walk = Walk {
        map,
        order: Vec::new(),
        placed: HashSet::new(),
        missing: Vec::new(),
        cycles: Vec::new(),
        open: Vec::new(),
    };

    for root in roots {
        walk.visit(root);
    }

    let Walk {
        mut order,
        missing,
        cycles,
        ..
    } = walk;

    // Partial orders are wrong at best - don't hand them out
    if !missing.is_empty() || !cycles.is_empty() {
        order.clear();
    }

    Sequence {
        order,
        missing,
        cycles,
    }
}

struct Walk<'a, N> {
    map: &'a HashMap<N, Vec<N>>,
    order: Vec<N>,
    placed: HashSet<N>,
    missing: Vec<N>,
    cycles: Vec<Vec<N>>,
    /// Nodes currently being expanded
    open: Vec<N>,
}
impl<N: Clone + Eq + Hash> Walk<'_, N> {
    fn visit(&mut self, node: &N) {
        if self.placed.contains(node) {
            return;
        }

        let Some(dependencies) = self.map.get(node) else {
            self.missing.push(node.clone());
            return;
        };

        // Circular Dependency Check
        if let Some(start) = self.open.iter().position(|open| open == node) {
            let mut chain = self.open[start..].to_vec();
            chain.push(node.clone()); // Add current so chain is closed
            self.cycles.push(chain);
            return;
        }

        self.open.push(node.clone());
        for dependency in dependencies {
            self.visit(dependency);
        }
        self.open.pop();

        self.placed.insert(node.clone());
        self.order.push(node.clone());
    }
}
