use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::stub::{PluginId, PluginStub};

type GraphResult<T> = std::result::Result<T, PluginSystemError>;

/// Read-only view over every known stub and its two edge kinds.
///
/// `depends` edges must form a DAG; this is checked once in [`DependencyGraph::new`].
/// `imports` edges may form cycles. The graph is immutable after construction and is
/// shared as `Arc<DependencyGraph>` by concurrent controllers.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    stubs: HashMap<PluginId, Arc<PluginStub>>,
    /// Insertion order, so iteration and error reports are deterministic
    order: Vec<PluginId>,
}

impl DependencyGraph {
    /// Index the stubs and validate references and hard-dependency acyclicity
    pub fn new<I>(stubs: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = Arc<PluginStub>>,
    {
        let mut graph = Self {
            stubs: HashMap::new(),
            order: Vec::new(),
        };

        for stub in stubs {
            if graph.stubs.contains_key(&stub.id) {
                return Err(PluginSystemError::Configuration {
                    plugin_id: stub.id.to_string(),
                    message: "plugin id declared more than once".to_string(),
                });
            }
            graph.order.push(stub.id.clone());
            graph.stubs.insert(stub.id.clone(), stub);
        }

        graph.validate_references()?;
        if let Some(cycle) = graph.find_depends_cycle() {
            return Err(PluginSystemError::DependencyCycle(cycle));
        }

        log::debug!("Dependency graph built with {} plugin(s)", graph.order.len());
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &PluginId) -> bool {
        self.stubs.contains_key(id)
    }

    pub fn get(&self, id: &PluginId) -> Option<&Arc<PluginStub>> {
        self.stubs.get(id)
    }

    /// Like [`get`](Self::get) but reports unknown ids as an error
    pub fn resolve(&self, id: &PluginId) -> GraphResult<&Arc<PluginStub>> {
        self.stubs.get(id).ok_or_else(|| PluginSystemError::UnknownPlugin {
            plugin_id: id.to_string(),
            referenced_by: None,
        })
    }

    /// All stubs in insertion order
    pub fn stubs(&self) -> impl Iterator<Item = &Arc<PluginStub>> {
        self.order.iter().filter_map(|id| self.stubs.get(id))
    }

    /// Direct hard dependencies in declaration order
    pub fn direct_depends(&self, id: &PluginId) -> GraphResult<Vec<Arc<PluginStub>>> {
        let stub = self.resolve(id)?;
        stub.depends
            .iter()
            .map(|dep| self.resolve(dep).cloned())
            .collect()
    }

    /// Every stub reachable through `depends` edges, each once, dependencies first.
    ///
    /// Ties are broken by depth-first discovery order over the declared dependency
    /// lists. The stub itself is never part of its own closure.
    pub fn depends_closure(&self, id: &PluginId) -> GraphResult<Vec<Arc<PluginStub>>> {
        let root = self.resolve(id)?;
        let mut visited = HashSet::new();
        visited.insert(&root.id);
        let mut closure = Vec::new();
        self.collect_closure(root, &mut visited, &mut closure)?;
        Ok(closure)
    }

    fn collect_closure<'a>(
        &'a self,
        stub: &'a Arc<PluginStub>,
        visited: &mut HashSet<&'a PluginId>,
        closure: &mut Vec<Arc<PluginStub>>,
    ) -> GraphResult<()> {
        for dep_id in &stub.depends {
            let dep = self.resolve(dep_id)?;
            // Inserting before descending keeps a malformed cyclic graph from recursing forever
            if visited.insert(&dep.id) {
                self.collect_closure(dep, visited, closure)?;
                closure.push(dep.clone());
            }
        }
        Ok(())
    }

    /// Direct imports minus anything already in the hard-dependency closure
    pub fn imports_excluding_closure(&self, id: &PluginId) -> GraphResult<Vec<Arc<PluginStub>>> {
        let stub = self.resolve(id)?;
        let closure = self.depends_closure(id)?;
        let mut seen: HashSet<&PluginId> = closure.iter().map(|s| &s.id).collect();

        let mut imports = Vec::new();
        for import_id in &stub.imports {
            let import = self.resolve(import_id)?;
            if seen.insert(&import.id) {
                imports.push(import.clone());
            }
        }
        Ok(imports)
    }

    /// Check if the hard-dependency sub-graph contains cycles
    pub fn has_depends_cycle(&self) -> bool {
        self.find_depends_cycle().is_some()
    }

    fn validate_references(&self) -> GraphResult<()> {
        for stub in self.stubs() {
            for reference in stub.depends.iter().chain(stub.imports.iter()) {
                if !self.stubs.contains_key(reference) {
                    return Err(PluginSystemError::UnknownPlugin {
                        plugin_id: reference.to_string(),
                        referenced_by: Some(stub.id.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the first hard-dependency cycle found, as a path of ids
    fn find_depends_cycle(&self) -> Option<Vec<String>> {
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();

        for id in &self.order {
            if !visited.contains(id) {
                let mut path = Vec::new();
                if let Some(cycle) = self.detect_cycle_dfs(id, &mut visiting, &mut visited, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn detect_cycle_dfs<'a>(
        &'a self,
        id: &'a PluginId,
        visiting: &mut HashSet<&'a PluginId>,
        visited: &mut HashSet<&'a PluginId>,
        path: &mut Vec<&'a PluginId>,
    ) -> Option<Vec<String>> {
        visiting.insert(id);
        path.push(id);

        if let Some(stub) = self.stubs.get(id) {
            for dep in &stub.depends {
                if visiting.contains(dep) {
                    let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|p| p.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = self.detect_cycle_dfs(dep, visiting, visited, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        visiting.remove(id);
        visited.insert(id);
        None
    }
}
