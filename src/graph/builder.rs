//! Edge computation for a batch of modules.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    graph::{ModuleGraph, NodeId},
};

impl ModuleGraph {
    /// Recompute every edge from the references declared by the nodes in `batch`.
    ///
    /// All existing edges are dropped first, including those of nodes outside the batch;
    /// the nodes themselves are kept. For each declared reference of a batch node:
    /// - if the referenced module is part of the batch, a hard edge is added
    /// - otherwise the name is recorded as a weak dependency; a reference that was not
    ///   declared weak is reported as a warning
    ///
    /// Weak dependencies that are no longer declared are forgotten. Finally every weak
    /// dependency that now has a matching node is upgraded to a hard one, which may force
    /// a reload or enable direct-attach on the resolved node.
    ///
    /// Rebuilding twice over unchanged references yields the same edges and has no further
    /// effect on reload state.
    ///
    /// A reference that would close a cycle is left out, so the edges always form a DAG.
    /// The cycle is recorded on the module declaring that reference and reported to
    /// `diagnostics`; [`crate::loader::ModuleLoader::ensure_loaded`] fails that module
    /// with [`crate::Error::DependencyCycle`] while the rest of the batch still loads.
    pub fn rebuild(&mut self, batch: &[NodeId], diagnostics: &Diagnostics) {
        self.clear_edges();

        let members: HashMap<String, NodeId> = batch
            .iter()
            .map(|&id| (self.node(id).name.clone(), id))
            .collect();

        for &id in batch {
            self.node_mut(id).cycle = None;
            let Some(archive) = self.node(id).archive.clone() else {
                continue;
            };

            let properties = archive.properties();
            for reference in &properties.module_references {
                let Some(&dep) = members.get(&reference.name) else {
                    let node = self.node_mut(id);
                    if node.weak_dependencies.insert(reference.name.clone()) && !reference.weak {
                        warn!(
                            module = %node.name,
                            reference = %reference.name,
                            "referenced module is not loaded, treating reference as weak"
                        );
                        diagnostics.warning(
                            DiagnosticCategory::Graph,
                            &node.name,
                            format!("Referenced module '{}' is not loaded", reference.name),
                        );
                    }
                    continue;
                };

                if let Some(path) = self.dependency_path(dep, id) {
                    let mut cycle: Vec<String> = vec![self.node(id).name.clone()];
                    cycle.extend(path.iter().map(|&step| self.node(step).name.clone()));

                    let node = self.node_mut(id);
                    warn!(module = %node.name, cycle = %cycle.join(" -> "), "dependency cycle");
                    diagnostics.error(
                        DiagnosticCategory::Graph,
                        &node.name,
                        format!("Reference to '{}' closes a dependency cycle", reference.name),
                    );
                    if node.cycle.is_none() {
                        node.cycle = Some(cycle);
                    }
                    continue;
                }

                self.add_dependency(id, dep);
            }

            let declared: BTreeSet<&str> = properties.reference_names(true).collect();
            self.node_mut(id)
                .weak_dependencies
                .retain(|name| declared.contains(name.as_str()));
        }

        for &id in batch {
            self.update_weak_references(id);
        }
    }

    /// Upgrade weak dependencies of `id` that now have a hard edge.
    fn update_weak_references(&mut self, id: NodeId) {
        let dependencies = self.node(id).dependencies.clone();

        for dep in dependencies {
            let dep_name = self.node(dep).name.clone();
            if !self.node_mut(id).weak_dependencies.remove(&dep_name) {
                continue;
            }

            let depender = self.node(id);
            let resolved = self.node(dep);
            if depender.direct_attach && !resolved.direct_attach {
                self.enable_direct_attach(dep);
            } else if resolved.identity() != depender.weak_identity(&dep_name) {
                self.mark_needs_reload(id);
            }
        }
    }
}
