//! Application is the main entry point for liviano.
//!
//! It owns the route table and the error/not-found handlers, dispatches
//! requests through the matched chain and turns whatever happened into
//! exactly one [`Response`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use liviano::{Application, Context, Next, ServerResult};
//!
//! async fn hello(c: Context, _next: Next) -> ServerResult<()> {
//!     c.text("Hello!");
//!     Ok(())
//! }
//!
//! # async fn run() -> ServerResult<()> {
//! let mut app = Application::new();
//! app.base_path("/api");
//! app.get("/", hello);
//! let server = app.listen("127.0.0.1:3000").await?;
//! server.close().await;
//! # Ok(())
//! # }
//! ```

use crate::error::{HttpException, ServerError, ServerResult};
use crate::handler::Handler;
use crate::http::{BodyLimits, Context, Request, RequestHead, Response};
use crate::middleware::{run_chain, ChainState};
use crate::router::{RouteMethod, Router};
use crate::server::Server;
use crate::tls::TlsConfig;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

type ErrorHandler = Arc<dyn Fn(&HttpException, &Context) -> ServerResult<()> + Send + Sync>;
type NotFoundHandler = Arc<dyn Fn(&Context) -> ServerResult<()> + Send + Sync>;

/// What happens when more than one route matches a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Only the first matching route runs.
    #[default]
    FirstMatch,
    /// Every matching route runs in registration order, each with a fresh
    /// Context. Only the last Context is sent.
    EveryMatch,
}

#[derive(Clone)]
pub struct Application {
    pub max_connections: usize,
    pub(crate) header_timeout: Duration,
    pub(crate) max_header_size: usize,
    router: Router,
    limits: BodyLimits,
    dispatch_mode: DispatchMode,
    on_error: ErrorHandler,
    not_found: NotFoundHandler,
    tls_config: Option<Arc<TlsConfig>>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self {
            max_connections: 256,
            header_timeout: Duration::from_secs(5),
            max_header_size: 8 * 1024,
            router: Router::new(),
            limits: BodyLimits::default(),
            dispatch_mode: DispatchMode::default(),
            on_error: Arc::new(default_error_handler),
            not_found: Arc::new(default_not_found),
            tls_config: None,
        }
    }

    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.max_connections = max_connections;
        self
    }

    /// How long a connection may take to send its request line and headers
    /// before it is answered with 408 and closed.
    pub fn header_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.header_timeout = timeout;
        self
    }

    /// Upper bound on the request line plus headers. Larger heads get 431.
    pub fn max_header_size(&mut self, bytes: usize) -> &mut Self {
        self.max_header_size = bytes;
        self
    }

    /// How long [`Context::json_body`] waits for the first body bytes.
    pub fn body_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.limits.timeout = timeout;
        self
    }

    pub fn max_body_size(&mut self, bytes: usize) -> &mut Self {
        self.limits.max_size = bytes;
        self
    }

    pub fn dispatch_mode(&mut self, mode: DispatchMode) -> &mut Self {
        self.dispatch_mode = mode;
        self
    }

    /// Replaces the handler for [`HttpException`]s. It must write the
    /// response itself; nothing is formatted for it.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&HttpException, &Context) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.on_error = Arc::new(handler);
        self
    }

    pub fn not_found<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Context) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.not_found = Arc::new(handler);
        self
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.get(path, handler);
        self
    }

    pub fn head(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.head(path, handler);
        self
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.post(path, handler);
        self
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.put(path, handler);
        self
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.patch(path, handler);
        self
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.delete(path, handler);
        self
    }

    pub fn options(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.options(path, handler);
        self
    }

    /// Registers a route that accepts every method.
    pub fn all(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.router.all(path, handler);
        self
    }

    pub fn on(
        &mut self,
        method: impl Into<RouteMethod>,
        path: &str,
        handler: impl Handler,
    ) -> &mut Self {
        self.router.on(method, path, handler);
        self
    }

    /// Adds global middleware. It is prepended to the chain of every route
    /// registered after this call.
    pub fn middleware(&mut self, middleware: impl Handler) -> &mut Self {
        self.router.middleware(middleware);
        self
    }

    /// Sets the prefix for routes registered after this call.
    pub fn base_path(&mut self, prefix: &str) -> &mut Self {
        self.router.base_path(prefix);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn with_tls<P: AsRef<Path>>(&mut self, cert_file: P, key_file: P) -> &mut Self {
        self.tls_config = Some(Arc::new(TlsConfig::new(cert_file, key_file)));
        self
    }

    /// Binds `addr` and starts serving in the background.
    ///
    /// The application is frozen from here on; routes cannot be added to a
    /// running server.
    pub async fn listen(self, addr: &str) -> ServerResult<Server> {
        self.listen_with(addr, |_| {}).await
    }

    /// Like [`listen`](Self::listen), calling `on_listening` with the bound
    /// address once the socket accepts connections.
    pub async fn listen_with<F>(self, addr: &str, on_listening: F) -> ServerResult<Server>
    where
        F: FnOnce(SocketAddr),
    {
        let acceptor = match &self.tls_config {
            Some(tls) => Some(tls.acceptor()?),
            None => None,
        };
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            address = %local_addr,
            tls = acceptor.is_some(),
            routes = self.router.routes().len(),
            "server listening"
        );
        let server = Server::spawn(Arc::new(self), listener, acceptor, local_addr);
        on_listening(local_addr);
        Ok(server)
    }

    /// Dispatches one request and returns its finalized response.
    pub async fn handle(&self, request: Request) -> Response {
        let head = Arc::new(RequestHead::new(request, self.limits));
        let mut context = Context::new(Arc::clone(&head), HashMap::new());

        let result = AssertUnwindSafe(self.dispatch(&head, &mut context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ServerError::Panic(panic_message(panic))));

        if let Err(err) = result {
            self.recover(&context, err);
        }

        match context.end() {
            Some(response) => response,
            None => {
                error!(path = %head.path(), "context was ended before dispatch finished");
                Response::plain(500, "Internal Server Error")
            }
        }
    }

    async fn dispatch(&self, head: &Arc<RequestHead>, context: &mut Context) -> ServerResult<()> {
        let method = head.method();
        let path = head.path();
        let mut found = false;

        for route in self.router.routes() {
            let Some(params) = route.matches(method, path) else {
                continue;
            };
            found = true;
            *context = Context::new(Arc::clone(head), params);
            debug!(%method, path, route = route.path(), "route matched");

            match run_chain(route.chain(), context.clone()).await {
                ChainState::Completed { reached, total } if reached < total => {
                    debug!(route = route.path(), reached, total, "chain stopped early");
                }
                ChainState::Completed { .. } => {}
                ChainState::Aborted { at, error } => {
                    debug!(route = route.path(), at, %error, "chain aborted");
                    return Err(error);
                }
            }

            if self.dispatch_mode == DispatchMode::FirstMatch {
                break;
            }
        }

        if !found {
            debug!(%method, path, "no route matched");
            (self.not_found)(context)?;
        }
        Ok(())
    }

    fn recover(&self, context: &Context, err: ServerError) {
        let err = match err {
            ServerError::Http(exception) => {
                let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                    (self.on_error)(&exception, context)
                }))
                .unwrap_or_else(|panic| Err(ServerError::Panic(panic_message(panic))));
                match handled {
                    Ok(()) => return,
                    Err(err) => err,
                }
            }
            other => other,
        };

        error!(error = %err, path = %context.path(), "request failed");
        context.status(500);
        if context.json(&json!({ "message": "Internal Server Error" })).is_err() {
            context.text("Internal Server Error");
        }
    }
}

fn default_error_handler(e: &HttpException, c: &Context) -> ServerResult<()> {
    c.status(e.status);
    c.json(&json!({ "message": e.message }))
}

fn default_not_found(c: &Context) -> ServerResult<()> {
    c.status(404);
    c.json(&json!({ "message": format!("Route \"{}\" does not exist", c.url()) }))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Unknown panic".to_string()
    }
}
