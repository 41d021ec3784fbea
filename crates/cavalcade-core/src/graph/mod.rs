//! Dependency graph registry.
//!
//! Design:
//! - Membership is by task identity (`TaskId`), never by value
//! - Forward edges: node -> the nodes it takes as inputs
//! - Reverse edges: node -> the nodes that take it as an input
//! - Invariant: both edge maps describe the same set of edges
//!
//! ## Building a graph
//! Graphs grow as a side effect of building nodes. [`NodeBuilder::build`]
//! turns every declared input into a node (existing nodes as-is, callables
//! as zero-argument nodes, literals as constant nodes), registers each of
//! them, then registers the new node with its edges. Registering a node
//! twice is a no-op, so an input shared by many nodes appears once.
//!
//! ## Concurrency
//! The registry sits behind one mutex. The membership check and the insert
//! happen under the same lock, so nodes built concurrently on different
//! threads still deduplicate.
//!
//! ## Ownership
//! The graph holds its nodes strongly and each node holds the graph weakly.
//! Dropping every `Graph` handle frees the registry even while nodes are
//! still referenced elsewhere; [`Node::graph`] then returns `None`.
//!
//! ## What the graph does not do
//! It does not order or run anything and does not detect cycles. A scheduler
//! that wants to run a pipeline reads the edges (`inputs_of`,
//! `dependents_of`), submits nodes itself and feeds results forward with
//! [`Node::collect_inputs`].

mod node;

pub use self::node::{Input, Node, NodeBuilder};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::domain::TaskId;

#[derive(Default)]
pub(crate) struct Registry {
    nodes: HashMap<TaskId, Node>,

    /// Registration order.
    order: Vec<TaskId>,

    /// Forward edges: node -> inputs, in declaration order.
    edges: HashMap<TaskId, Vec<TaskId>>,

    /// Reverse edges: input -> nodes consuming it.
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

/// Shared registry of nodes. Clones refer to the same graph.
#[derive(Clone, Default)]
pub struct Graph {
    inner: Arc<Mutex<Registry>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<Registry>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<Mutex<Registry>>) -> Option<Graph> {
        weak.upgrade().map(|inner| Graph { inner })
    }

    /// Register `node` and its input edges. Returns false if it was already
    /// present; check and insert happen under one lock.
    pub fn add_node(&self, node: &Node) -> bool {
        let id = node.id();
        let inputs: Vec<TaskId> = node.all_inputs().map(Node::id).collect();

        let mut registry = self.lock();
        if registry.nodes.contains_key(&id) {
            return false;
        }
        registry.nodes.insert(id, node.clone());
        registry.order.push(id);
        for input in &inputs {
            registry.reverse_edges.entry(*input).or_default().insert(id);
        }
        if !inputs.is_empty() {
            registry.edges.insert(id, inputs);
        }
        true
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.contains_id(node.id())
    }

    pub fn contains_id(&self, id: TaskId) -> bool {
        self.lock().nodes.contains_key(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<Node> {
        self.lock().nodes.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    /// All nodes, in registration order.
    pub fn nodes(&self) -> Vec<Node> {
        let registry = self.lock();
        registry
            .order
            .iter()
            .filter_map(|id| registry.nodes.get(id).cloned())
            .collect()
    }

    /// Inputs declared by `id`, in declaration order.
    pub fn inputs_of(&self, id: TaskId) -> Vec<TaskId> {
        self.lock().edges.get(&id).cloned().unwrap_or_default()
    }

    /// Nodes that take `id` as an input.
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.lock()
            .reverse_edges
            .get(&id)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock();
        f.debug_struct("Graph")
            .field("nodes", &registry.order)
            .field("edges", &registry.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable;
    use crate::manager::{Manager, ManagerConfig};

    fn builder(graph: &Graph, manager: &Manager) -> NodeBuilder {
        NodeBuilder::new(callable::constant(0))
            .graph(graph)
            .manager(manager)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = Graph::new();
        assert!(graph.is_empty());
        assert!(graph.nodes().is_empty());
    }

    #[test]
    fn shared_input_is_registered_once() {
        let graph = Graph::new();
        let manager = Manager::new(ManagerConfig::default());
        let source = builder(&graph, &manager).name("source").build().unwrap();

        let left = builder(&graph, &manager)
            .input_args([Input::from(&source)])
            .build()
            .unwrap();
        let right = builder(&graph, &manager)
            .input_args([Input::from(&source)])
            .build()
            .unwrap();

        let ids: Vec<TaskId> = graph.nodes().iter().map(Node::id).collect();
        assert_eq!(ids.iter().filter(|id| **id == source.id()).count(), 1);
        assert_eq!(graph.len(), 3);

        let mut dependents = graph.dependents_of(source.id());
        dependents.sort();
        let mut expected = vec![left.id(), right.id()];
        expected.sort();
        assert_eq!(dependents, expected);
    }

    #[test]
    fn add_node_is_idempotent() {
        let graph = Graph::new();
        let manager = Manager::new(ManagerConfig::default());
        let node = builder(&graph, &manager).build().unwrap();

        assert!(!graph.add_node(&node));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn edges_follow_declaration_order() {
        let graph = Graph::new();
        let manager = Manager::new(ManagerConfig::default());
        let node = builder(&graph, &manager)
            .input_args([Input::literal(1), Input::literal(2)])
            .build()
            .unwrap();

        let inputs = graph.inputs_of(node.id());
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs, node.inputs().iter().map(Node::id).collect::<Vec<_>>());
        assert!(graph.inputs_of(inputs[0]).is_empty());
    }

    #[test]
    fn concurrent_registration_dedups() {
        let graph = Graph::new();
        let manager = Manager::new(ManagerConfig::default());
        let shared = builder(&graph, &manager).build().unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let graph = graph.clone();
                let manager = manager.clone();
                let shared = shared.clone();
                std::thread::spawn(move || {
                    builder(&graph, &manager)
                        .input_args([Input::from(shared)])
                        .build()
                        .unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(graph.len(), 9);
        assert_eq!(graph.dependents_of(shared.id()).len(), 8);
        assert!(graph.get(shared.id()).is_some());
    }
}
