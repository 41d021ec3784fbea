//! Node - a task whose inputs may themselves be tasks.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde_json::{Map, Value};

use super::{Graph, Registry};
use crate::callable::{self, Callable};
use crate::domain::{Args, CavalcadeError, Outcome, TaskId};
use crate::manager::Manager;
use crate::task::{ResultHandle, Task, TaskBuilder};

/// One declared input slot, before it is turned into a node.
pub enum Input {
    /// Used as-is.
    Node(Node),

    /// Wrapped in a fresh zero-argument node.
    Callable(Arc<dyn Callable>),

    /// Wrapped in a node that returns the value.
    Literal(Value),
}

impl Input {
    pub fn literal(value: impl Into<Value>) -> Self {
        Input::Literal(value.into())
    }

    pub fn callable(callable: Arc<dyn Callable>) -> Self {
        Input::Callable(callable)
    }
}

impl From<Node> for Input {
    fn from(node: Node) -> Self {
        Input::Node(node)
    }
}

impl From<&Node> for Input {
    fn from(node: &Node) -> Self {
        Input::Node(node.clone())
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<Arc<dyn Callable>> for Input {
    fn from(callable: Arc<dyn Callable>) -> Self {
        Input::Callable(callable)
    }
}

struct NodeInner {
    task: Task,
    graph: Weak<Mutex<Registry>>,
    inputs: Vec<Node>,
    named_inputs: Vec<(String, Node)>,
}

/// A task registered in a [`Graph`] together with its input nodes.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub const DEFAULT_NAME: &'static str = "Node";
    pub const LITERAL_NAME: &'static str = "Literal";

    pub fn builder(callable: Arc<dyn Callable>) -> NodeBuilder {
        NodeBuilder::new(callable)
    }

    pub fn id(&self) -> TaskId {
        self.inner.task.id()
    }

    pub fn name(&self) -> &str {
        self.inner.task.name()
    }

    pub fn task(&self) -> &Task {
        &self.inner.task
    }

    /// The graph this node was built in, while that graph is alive.
    pub fn graph(&self) -> Option<Graph> {
        Graph::upgrade(&self.inner.graph)
    }

    /// Positional inputs, in declaration order.
    pub fn inputs(&self) -> &[Node] {
        &self.inner.inputs
    }

    /// Keyword inputs, in declaration order.
    pub fn named_inputs(&self) -> &[(String, Node)] {
        &self.inner.named_inputs
    }

    pub fn input(&self, name: &str) -> Option<&Node> {
        self.inner
            .named_inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    pub(crate) fn all_inputs(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .inputs
            .iter()
            .chain(self.inner.named_inputs.iter().map(|(_, node)| node))
    }

    pub fn submit(&self, args: Args) -> ResultHandle {
        self.inner.task.submit(args)
    }

    pub fn call(&self) -> ResultHandle {
        self.inner.task.call()
    }

    pub fn handle(&self) -> ResultHandle {
        self.inner.task.handle()
    }

    /// Results of all inputs as call arguments: positional inputs become
    /// positional arguments, keyword inputs keyword arguments.
    ///
    /// Fails if an input is still pending or has failed. Nothing is run here;
    /// the caller decides when inputs execute.
    pub fn collect_inputs(&self) -> Result<Args, CavalcadeError> {
        let mut args = Args::new();
        for input in self.inputs() {
            args.positional.push(self.settled(input)?);
        }
        for (name, input) in self.named_inputs() {
            args.keyword.insert(name.clone(), self.settled(input)?);
        }
        Ok(args)
    }

    fn settled(&self, input: &Node) -> Result<Value, CavalcadeError> {
        match input.handle().poll() {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(failure) => Err(CavalcadeError::TaskFailed(failure)),
            Outcome::Pending => Err(CavalcadeError::InputPending {
                node: self.id(),
                input: input.id(),
            }),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("inputs", &self.all_inputs().map(Node::id).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Node`]. Takes every task option plus `graph`,
/// `input_args` and `input_kwargs`. A graph is mandatory.
pub struct NodeBuilder {
    task: TaskBuilder,
    graph: Option<Graph>,
    input_args: Vec<Input>,
    input_kwargs: Vec<(String, Input)>,
}

impl NodeBuilder {
    pub fn new(callable: Arc<dyn Callable>) -> Self {
        Self::wrap(TaskBuilder::new(callable))
    }

    /// Promote an existing task into a graph node. Copies its callable,
    /// bound arguments, callback, manager and name; the node is a new task
    /// with its own identity and result handle.
    pub fn from_task(task: &Task) -> Self {
        Self::wrap(TaskBuilder::from_task(task))
    }

    fn wrap(task: TaskBuilder) -> Self {
        Self {
            task,
            graph: None,
            input_args: Vec::new(),
            input_kwargs: Vec::new(),
        }
    }

    pub fn graph(mut self, graph: &Graph) -> Self {
        self.graph = Some(graph.clone());
        self
    }

    pub fn input_args<I, V>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Input>,
    {
        self.input_args = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn input_kwargs<I, K, V>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Input>,
    {
        self.input_kwargs = inputs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn func_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.task = self.task.func_args(args);
        self
    }

    pub fn func_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.task = self.task.func_kwargs(kwargs);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn Callable>) -> Self {
        self.task = self.task.callback(callback);
        self
    }

    pub fn callback_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.task = self.task.callback_args(args);
        self
    }

    pub fn callback_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.task = self.task.callback_kwargs(kwargs);
        self
    }

    pub fn manager(mut self, manager: &Manager) -> Self {
        self.task = self.task.manager(manager);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.task = self.task.name(name);
        self
    }

    /// Materialize the inputs, register them and the new node in the graph.
    pub fn build(self) -> Result<Node, CavalcadeError> {
        let graph = self.graph.ok_or(CavalcadeError::MissingGraph)?;
        let manager = self.task.manager.clone().unwrap_or_else(Manager::shared);

        let inputs = self
            .input_args
            .into_iter()
            .map(|input| materialize(input, &graph, &manager))
            .collect::<Result<Vec<_>, _>>()?;
        let named_inputs = self
            .input_kwargs
            .into_iter()
            .map(|(name, input)| -> Result<_, CavalcadeError> {
                Ok((name, materialize(input, &graph, &manager)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let node = Node {
            inner: Arc::new(NodeInner {
                task: self.task.manager(&manager).build_named(Node::DEFAULT_NAME),
                graph: graph.downgrade(),
                inputs,
                named_inputs,
            }),
        };
        graph.add_node(&node);
        Ok(node)
    }
}

fn materialize(input: Input, graph: &Graph, manager: &Manager) -> Result<Node, CavalcadeError> {
    let node = match input {
        Input::Node(node) => {
            graph.add_node(&node);
            node
        }
        Input::Callable(callable) => NodeBuilder::new(callable)
            .graph(graph)
            .manager(manager)
            .build()?,
        Input::Literal(value) => NodeBuilder::new(callable::constant(value))
            .name(Node::LITERAL_NAME)
            .graph(graph)
            .manager(manager)
            .build()?,
    };
    Ok(node)
}
