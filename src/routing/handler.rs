//! Handler references stored in the route table.

use std::fmt;
use std::sync::Arc;

use crate::error::AppError;
use crate::http::context::RequestContext;

/// Signature every request and error handler implements.
pub type HandlerFn = dyn Fn(&mut RequestContext<'_>) -> Result<(), AppError> + Send + Sync;

/// A named, cheaply clonable handler.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&mut RequestContext<'_>) -> Result<(), AppError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, ctx: &mut RequestContext<'_>) -> Result<(), AppError> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}
