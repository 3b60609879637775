use crate::error::ServerResult;
use crate::http::Context;
use crate::middleware::Next;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub type HandlerResult = ServerResult<()>;
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;
pub type SharedHandler = Arc<dyn Handler>;

/// A step in a route's chain.
///
/// Route handlers and middleware are the same thing: each gets the request
/// [`Context`] and the [`Next`] continuation, and the rest of the chain only
/// runs if it calls [`Next::run`]. Any `Fn(Context, Next) -> impl Future`
/// closure is a handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context, next: Next) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Context, next: Next) -> HandlerFuture {
        Box::pin((self)(ctx, next))
    }
}

/// Several handlers registered as one route handler.
///
/// Members run in order with the usual continuation rules; once the last one
/// continues, the enclosing chain resumes.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<SharedHandler>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, handler: impl Handler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Handler for Chain {
    fn call(&self, ctx: Context, next: Next) -> HandlerFuture {
        Next::nested(Arc::from(self.handlers.clone()), ctx, next).run()
    }
}

/// Builds a [`Chain`] from a list of handlers.
///
/// ```rust,ignore
/// app.post("/party", chain![check_age, welcome]);
/// ```
#[macro_export]
macro_rules! chain {
    ($($handler:expr),+ $(,)?) => {
        $crate::handler::Chain::new()$(.then($handler))+
    };

    () => {
        compile_error!("The chain! macro requires at least one handler")
    };
}
