//! Name-based dispatch of invocations to a remote object's operations.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::handler::{erase, Handler, Operation, Outcome};
use super::message::{Invocation, ResultMessage};
use crate::error::{Result, TetherError};

/// A type whose methods are callable by name from the client.
pub trait Remote: Send + Sync + Sized + 'static {
    fn expose(ops: &mut Operations<Self>);
}

/// Registration table filled in by [`Remote::expose`].
pub struct Operations<T> {
    table: HashMap<String, Operation<T>>,
}

impl<T: 'static> Operations<T> {
    fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register `handler` under `name`. A later registration replaces an
    /// earlier one with the same name.
    pub fn add<H, Args>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler<T, Args>,
        Args: 'static,
    {
        let name = name.into();
        if self.table.contains_key(&name) {
            warn!("Operation {} registered twice, keeping the last one", name);
        }
        self.table.insert(name, erase(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Resolves invocations against a shared remote object.
pub struct Dispatcher<T> {
    target: Arc<T>,
    operations: HashMap<String, Operation<T>>,
}

impl<T: Remote> Dispatcher<T> {
    pub fn new(target: Arc<T>) -> Self {
        let mut ops = Operations::new();
        T::expose(&mut ops);
        debug!("Exposed {} operations", ops.len());
        Self {
            target,
            operations: ops.table,
        }
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Invoke an operation and return its values. A call-level error from the
    /// operation, or a panic inside it, becomes [`TetherError::Operation`].
    pub fn invoke(&self, invocation: &Invocation) -> Result<Vec<Value>> {
        let name = invocation.name.as_str();
        let op = self
            .operations
            .get(name)
            .ok_or_else(|| TetherError::UnknownOperation {
                name: name.to_string(),
            })?;

        let expected = op.arity();
        if invocation.args.len() != expected {
            return Err(TetherError::ArityMismatch {
                name: name.to_string(),
                expected,
                actual: invocation.args.len(),
            });
        }

        let target = self.target.as_ref();
        let outcome = catch_unwind(AssertUnwindSafe(|| op.call(target, name, &invocation.args)))
            .map_err(|payload| {
                TetherError::Operation(format!(
                    "Operation {} panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                ))
            })??;

        match outcome {
            Outcome::Values(values) => Ok(values),
            Outcome::Failed(message) => Err(TetherError::Operation(message)),
        }
    }

    /// Invoke and wrap the result for the wire. Never fails: every error is
    /// reported in the message's `e` field.
    pub fn dispatch(&self, invocation: &Invocation) -> ResultMessage {
        match self.invoke(invocation) {
            Ok(values) => ResultMessage::success(invocation.id, values),
            Err(e) => {
                debug!("Invocation {} (id {}) failed: {}", invocation.name, invocation.id, e);
                ResultMessage::failure(invocation.id, e.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
