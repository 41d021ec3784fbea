//! Callable - the unit of code a task runs.
//!
//! `Callable` is object-safe so tasks can hold `Arc<dyn Callable>` no matter
//! what the underlying closure looks like. The adapters below erase the
//! closure type the same way a typed handler is erased behind a dyn handler.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::Args;
use crate::task::Task;

/// Something a task can call with merged arguments.
#[async_trait]
pub trait Callable: Send + Sync {
    async fn call(&self, args: Args) -> anyhow::Result<Value>;
}

/// Synchronous closure over raw [`Args`].
pub struct FnCallable<F>(F);

#[async_trait]
impl<F> Callable for FnCallable<F>
where
    F: Fn(Args) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, args: Args) -> anyhow::Result<Value> {
        (self.0)(args)
    }
}

/// Closure returning a future. The future runs on the worker loop's
/// scheduler and may await other async work.
pub struct AsyncFnCallable<F>(F);

#[async_trait]
impl<F, Fut> Callable for AsyncFnCallable<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Args) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// Always returns the same value. Used to lift literals into graph nodes.
pub struct Constant(Value);

#[async_trait]
impl Callable for Constant {
    async fn call(&self, _args: Args) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

/// Closure over a decoded positional tuple.
///
/// The positional arguments are decoded as one JSON array into `A`
/// (a tuple or a `Vec`), and the return value is encoded back to JSON.
/// Keyword arguments are ignored.
pub struct TypedCallable<F, A, R> {
    f: F,
    _marker: PhantomData<fn(A) -> R>,
}

#[async_trait]
impl<F, A, R> Callable for TypedCallable<F, A, R>
where
    F: Fn(A) -> anyhow::Result<R> + Send + Sync,
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    async fn call(&self, args: Args) -> anyhow::Result<Value> {
        let input: A = serde_json::from_value(Value::Array(args.positional))
            .map_err(|e| anyhow::anyhow!("json decode: {e}"))?;
        let output = (self.f)(input)?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Submits a task with the arguments it is called with.
///
/// As a completion callback this chains one task after another. The
/// submission goes through the chained task's own manager and returns
/// without waiting for it.
pub struct Submit(Task);

#[async_trait]
impl Callable for Submit {
    async fn call(&self, args: Args) -> anyhow::Result<Value> {
        self.0.submit(args);
        Ok(Value::Null)
    }
}

pub fn from_fn<F>(f: F) -> Arc<dyn Callable>
where
    F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnCallable(f))
}

pub fn from_async<F, Fut>(f: F) -> Arc<dyn Callable>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(AsyncFnCallable(f))
}

pub fn constant(value: impl Into<Value>) -> Arc<dyn Callable> {
    Arc::new(Constant(value.into()))
}

pub fn submit(task: &Task) -> Arc<dyn Callable> {
    Arc::new(Submit(task.clone()))
}

pub fn typed<F, A, R>(f: F) -> Arc<dyn Callable>
where
    F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    Arc::new(TypedCallable {
        f,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sync_closure_sees_args() {
        let f = from_fn(|args: Args| Ok(json!(args.positional.len())));
        let out = f.call(Args::from_positional([1, 2, 3])).await.unwrap();
        assert_eq!(out, json!(3));
    }

    #[tokio::test]
    async fn async_closure_is_awaited() {
        let f = from_async(|args: Args| async move {
            tokio::task::yield_now().await;
            let x: i64 = args.arg(0)?;
            Ok(json!(x + 1))
        });
        let out = f.call(Args::from_positional([41])).await.unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn constant_ignores_args() {
        let f = constant("lit");
        let out = f.call(Args::from_positional([1])).await.unwrap();
        assert_eq!(out, json!("lit"));
    }

    #[tokio::test]
    async fn typed_decodes_tuple() {
        let add = typed(|(a, b): (i64, i64)| Ok(a + b));
        let out = add.call(Args::from_positional([40, 2])).await.unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn typed_reports_decode_error() {
        let add = typed(|(a, b): (i64, i64)| Ok(a + b));
        let err = add.call(Args::from_positional(["x"])).await.unwrap_err();
        assert!(err.to_string().contains("json decode"));
    }
}
