//! TaskBuilder - decorator-style construction of tasks.
//!
//! # Example
//! ```ignore
//! let double = event(callable::typed(|(x,): (i64,)| Ok(x * 2)))
//!     .name("double")
//!     .manager(&manager)
//!     .build();
//! let handle = double.submit(Args::from_positional([21]));
//! ```
//!
//! Options mirror the task fields: `func_args`, `func_kwargs`, `callback`,
//! `callback_args`, `callback_kwargs`, `manager`, `name`. Anything left
//! unset gets a default: empty arguments, no callback, the shared manager,
//! and [`Task::DEFAULT_NAME`].

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Callback, Task};
use crate::callable::Callable;
use crate::domain::Args;
use crate::manager::Manager;

#[derive(Clone)]
pub struct TaskBuilder {
    pub(crate) callable: Arc<dyn Callable>,
    pub(crate) func_args: Args,
    pub(crate) callback: Option<Arc<dyn Callable>>,
    pub(crate) callback_args: Args,
    pub(crate) manager: Option<Manager>,
    pub(crate) name: Option<String>,
}

/// Start configuring a task around `callable`.
pub fn event(callable: Arc<dyn Callable>) -> TaskBuilder {
    TaskBuilder::new(callable)
}

impl TaskBuilder {
    pub fn new(callable: Arc<dyn Callable>) -> Self {
        Self {
            callable,
            func_args: Args::new(),
            callback: None,
            callback_args: Args::new(),
            manager: None,
            name: None,
        }
    }

    /// Copy the configuration of an existing task: callable, bound
    /// arguments, callback, manager and name. The copy gets its own identity.
    pub fn from_task(task: &Task) -> Self {
        let callback = task.callback();
        Self {
            callable: Arc::clone(task.callable()),
            func_args: task.bound_args().clone(),
            callback: callback.map(|cb| Arc::clone(&cb.callable)),
            callback_args: callback.map(|cb| cb.args.clone()).unwrap_or_default(),
            manager: Some(task.manager().clone()),
            name: Some(task.name().to_string()),
        }
    }

    pub fn func_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.func_args.positional = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn func_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.func_args.keyword = kwargs;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn Callable>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn callback_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.callback_args.positional = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn callback_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.callback_args.keyword = kwargs;
        self
    }

    pub fn manager(mut self, manager: &Manager) -> Self {
        self.manager = Some(manager.clone());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> Task {
        self.build_named(Task::DEFAULT_NAME)
    }

    pub(crate) fn build_named(self, default_name: &str) -> Task {
        let callback = self.callback.map(|callable| Callback {
            callable,
            args: self.callback_args,
        });
        Task::from_parts(
            self.name.unwrap_or_else(|| default_name.to_string()),
            self.callable,
            self.func_args,
            callback,
            self.manager.unwrap_or_else(Manager::shared),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable;
    use crate::manager::ManagerConfig;
    use serde_json::json;

    #[test]
    fn defaults() {
        let task = event(callable::constant(1)).build();

        assert_eq!(task.name(), Task::DEFAULT_NAME);
        assert!(task.bound_args().is_empty());
        assert!(task.callback().is_none());
        assert_eq!(task.manager(), &Manager::shared());
    }

    #[test]
    fn options_are_applied() {
        let manager = Manager::new(ManagerConfig::default().with_name("custom"));
        let task = event(callable::constant(1))
            .name("configured")
            .func_args([json!(1), json!(2)])
            .func_kwargs(Args::from_keyword([("k", "v")]).keyword)
            .callback(callable::constant(0))
            .callback_args([json!("c")])
            .callback_kwargs(Args::from_keyword([("ck", 3)]).keyword)
            .manager(&manager)
            .build();

        assert_eq!(task.name(), "configured");
        assert_eq!(task.bound_args().positional, vec![json!(1), json!(2)]);
        assert_eq!(task.bound_args().keyword["k"], json!("v"));
        let cb = task.callback().unwrap();
        assert_eq!(cb.args.positional, vec![json!("c")]);
        assert_eq!(cb.args.keyword["ck"], json!(3));
        assert_eq!(task.manager().name(), "custom");
    }

    #[test]
    fn from_task_copies_configuration_not_identity() {
        let manager = Manager::new(ManagerConfig::default());
        let original = event(callable::constant(1))
            .name("source")
            .func_args([json!(5)])
            .callback(callable::constant(0))
            .manager(&manager)
            .build();

        let copy = TaskBuilder::from_task(&original).build();

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.name(), "source");
        assert_eq!(copy.bound_args(), original.bound_args());
        assert!(copy.callback().is_some());
        assert_eq!(copy.manager(), &manager);
    }
}
