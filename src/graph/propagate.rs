//! Reload and direct-attach propagation.
//!
//! All traversals are iterative with an explicit visited set; graph depth is unbounded.

use std::collections::HashSet;

use tracing::debug;

use crate::{
    graph::{ModuleGraph, NodeId},
    resolution::ResolutionService,
};

impl ModuleGraph {
    /// Mark `id` and every transitive dependent as needing a reload.
    ///
    /// A node whose flag flips from false to true moves to the next generation. Every
    /// visited node loses direct-attach, since its identity is about to change.
    pub fn mark_needs_reload(&mut self, id: NodeId) {
        let mut visited = HashSet::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let node = self.node_mut(current);
            let was_marked = node.needs_reload;
            node.set_needs_reload();
            node.direct_attach = false;

            if !was_marked {
                debug!(module = %node.name, generation = node.generation, "marked for reload");
            }

            stack.extend(node.dependents.iter().copied());
        }
    }

    /// Like [`ModuleGraph::mark_needs_reload`], but direct-attach nodes keep their flag and
    /// their identity. Their dependents are still visited.
    pub fn mark_needs_reload_unless_direct_attach(&mut self, id: NodeId) {
        let mut visited = HashSet::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let node = self.node_mut(current);
            if !node.direct_attach && !node.needs_reload {
                node.set_needs_reload();
                debug!(module = %node.name, generation = node.generation, "marked for reload");
            }

            stack.extend(node.dependents.iter().copied());
        }
    }

    /// Whether `id` can be loaded under its unmodified identity.
    ///
    /// A node is eligible if it already is direct-attach, or if no image is resident
    /// under its plain name and all of its dependencies are eligible.
    #[must_use]
    pub fn can_direct_attach(&self, id: NodeId, resolution: &ResolutionService) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let node = self.node(current);
            if node.direct_attach {
                continue;
            }

            if resolution.is_loaded(&node.name) {
                return false;
            }

            stack.extend(node.dependencies.iter().copied());
        }

        true
    }

    /// Switch `id` and all of its transitive dependencies to direct-attach.
    ///
    /// Each node switched forces a reload on itself and on its dependents that are not
    /// direct-attach. Nodes only reachable through dependents are never switched.
    pub fn enable_direct_attach(&mut self, id: NodeId) {
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if self.node(current).direct_attach {
                continue;
            }

            self.mark_needs_reload_unless_direct_attach(current);

            let node = self.node_mut(current);
            node.direct_attach = true;
            debug!(module = %node.name, "direct attach enabled");

            stack.extend(node.dependencies.iter().rev().copied());
        }
    }
}
