//! The module dependency graph.
//!
//! Every module ever requested is tracked by a [`ModuleNode`] held in the arena of a
//! [`ModuleGraph`]. Edges between nodes are plain [`NodeId`] indices: `dependencies` is the
//! owning direction in the sense that it is derived from declared references, while
//! `dependents` is only an inverse index used by reload propagation. Nodes are never
//! removed, because the images loaded for them can never be released.
//!
//! # Key Components
//!
//! - [`ModuleGraph`] - node arena, edge maintenance, identity mapping and load ordering
//! - [`ModuleNode`] - per-module tracking record
//! - `builder` - recomputes edges for a batch ([`ModuleGraph::rebuild`])
//! - `propagate` - needs-reload and direct-attach propagation along edges
//!
//! # Identity Mapping
//!
//! When an image of a node is rewritten, every name it references is mapped through
//! [`ModuleGraph::map_name`]: the node's own name, its private libraries and its weak
//! dependencies are mapped by the node itself, anything else is delegated to its
//! dependencies in declaration order (depth first). Names nobody claims pass through.

mod builder;
mod node;
mod propagate;

pub use node::{ModuleNode, NodeId};

use std::collections::{HashMap, HashSet};

use crate::rewrite::{MappedName, MappingKind, NameScheme};

/// Arena of [`ModuleNode`]s indexed by name.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    by_name: HashMap<String, NodeId>,
}

impl ModuleGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no module was ever requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by module name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Look up a node by module name, creating it if this is the first request.
    pub fn find_or_create(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.find(name) {
            return id;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(ModuleNode::new(name));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Borrow a node.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ModuleNode {
        &mut self.nodes[id.0]
    }

    /// Borrow a node by module name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleNode> {
        self.find(name).map(|id| self.node(id))
    }

    /// Iterate over all nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ModuleNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index), node))
    }

    /// Add the edge `from -> to` together with its back edge. Existing edges are kept once.
    pub(crate) fn add_dependency(&mut self, from: NodeId, to: NodeId) {
        if self.nodes[from.0].dependencies.contains(&to) {
            return;
        }

        self.nodes[from.0].dependencies.push(to);
        self.nodes[to.0].dependents.push(from);
    }

    /// Remove every edge in the graph.
    pub(crate) fn clear_edges(&mut self) {
        for node in &mut self.nodes {
            node.dependencies.clear();
            node.dependents.clear();
        }
    }

    /// Returns a path `from -> ... -> to` along dependency edges, if one exists.
    pub(crate) fn dependency_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut parents: HashMap<NodeId, NodeId> = HashMap::new();
        let mut visited = HashSet::from([from]);
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&parent) = parents.get(&cursor) {
                    path.push(parent);
                    cursor = parent;
                }
                path.reverse();
                return Some(path);
            }

            for &next in &self.nodes[current.0].dependencies {
                if visited.insert(next) {
                    parents.insert(next, current);
                    stack.push(next);
                }
            }
        }

        None
    }

    /// Map a referenced name to the identity it must have in images of `id`.
    ///
    /// The first claim decides: `id` itself is consulted before its dependencies. Returns
    /// `None` for names no node in the dependency closure of `id` claims, and for names
    /// whose claim maps them onto themselves.
    #[must_use]
    pub fn map_name(&self, id: NodeId, name: &str) -> Option<MappedName> {
        let mut visited = HashSet::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let node = &self.nodes[current.0];
            let claimed = if name == node.name {
                Some((node.identity(), MappingKind::Own))
            } else if node.declares_library(name) {
                Some((node.library_identity(name), MappingKind::Library))
            } else if node.weak_dependencies.contains(name) {
                Some((node.weak_identity(name), MappingKind::Weak))
            } else {
                None
            };

            if let Some((identity, kind)) = claimed {
                if identity == name {
                    return None;
                }

                let kind = match kind {
                    MappingKind::Weak => MappingKind::Weak,
                    _ if current != id => MappingKind::Dependency,
                    other => other,
                };
                return Some(MappedName { identity, kind });
            }

            stack.extend(node.dependencies.iter().rev().copied());
        }

        None
    }

    /// [`NameScheme`] of a node, used when rewriting its images.
    #[must_use]
    pub fn scheme(&self, id: NodeId) -> NodeScheme<'_> {
        NodeScheme { graph: self, id }
    }

    /// Order `batch` so every node comes after its dependencies.
    ///
    /// Nodes without an ordering constraint keep their relative batch order. Edges to
    /// nodes outside `batch` are ignored.
    #[must_use]
    pub fn load_order(&self, batch: &[NodeId]) -> Vec<NodeId> {
        let members: HashSet<NodeId> = batch.iter().copied().collect();
        let mut placed = HashSet::with_capacity(batch.len());
        let mut order = Vec::with_capacity(batch.len());

        for &root in batch {
            // (node, dependencies expanded)
            let mut stack = vec![(root, false)];
            while let Some((current, expanded)) = stack.pop() {
                if placed.contains(&current) {
                    continue;
                }

                if expanded {
                    placed.insert(current);
                    order.push(current);
                    continue;
                }

                stack.push((current, true));
                for &dep in self.nodes[current.0].dependencies.iter().rev() {
                    if members.contains(&dep) && !placed.contains(&dep) {
                        stack.push((dep, false));
                    }
                }
            }
        }

        order
    }
}

/// Name mapping of a single node, see [`ModuleGraph::map_name`].
#[derive(Debug, Clone, Copy)]
pub struct NodeScheme<'a> {
    graph: &'a ModuleGraph,
    id: NodeId,
}

impl NameScheme for NodeScheme<'_> {
    fn owner(&self) -> &str {
        self.graph.node(self.id).name()
    }

    fn map_name(&self, name: &str) -> Option<MappedName> {
        self.graph.map_name(self.id, name)
    }

    fn direct_attach(&self) -> bool {
        self.graph.node(self.id).direct_attach
    }
}
