mod pattern;

pub use pattern::PathPattern;

use crate::handler::{Handler, SharedHandler};
use crate::http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// The method a route was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Only(Method),
    Any,
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        RouteMethod::Only(method)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Only(method) => fmt::Display::fmt(method, f),
            RouteMethod::Any => f.write_str("ALL"),
        }
    }
}

#[derive(Clone)]
pub struct Route {
    method: RouteMethod,
    pattern: PathPattern,
    handlers: Arc<[SharedHandler]>,
}

impl Route {
    pub fn method(&self) -> RouteMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        self.pattern.template()
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Number of handlers in the chain, global middleware included.
    pub fn chain_len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn chain(&self) -> Arc<[SharedHandler]> {
        Arc::clone(&self.handlers)
    }

    /// `OPTIONS` is accepted by every route so preflight middleware can run.
    pub fn accepts(&self, method: Method) -> bool {
        match self.method {
            RouteMethod::Any => true,
            RouteMethod::Only(m) => m == method || method == Method::OPTIONS,
        }
    }

    /// Returns the captured params if this route takes `method` on `path`.
    pub fn matches(&self, method: Method, path: &str) -> Option<HashMap<String, String>> {
        if !self.accepts(method) {
            return None;
        }
        self.pattern.captures(path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// The ordered route table.
///
/// Routes are matched in registration order. The base path and global
/// middleware are captured when a route is registered, so changing either
/// later only affects routes registered after the change.
#[derive(Clone, Default)]
pub struct Router {
    base_path: String,
    middlewares: Vec<SharedHandler>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::GET, path, handler)
    }

    pub fn head(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::HEAD, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::DELETE, path, handler)
    }

    pub fn options(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::OPTIONS, path, handler)
    }

    pub fn all(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(RouteMethod::Any, path, handler)
    }

    /// Registers `handler` under the current base path. A template the regex
    /// engine refuses (only possible past its size limit) is logged and not
    /// registered.
    pub fn on(
        &mut self,
        method: impl Into<RouteMethod>,
        path: &str,
        handler: impl Handler,
    ) -> &mut Self {
        let path = format!("{}{}", self.base_path, path);
        // Only the regex size limit can reject a template.
        let pattern = match PathPattern::parse(&path) {
            Ok(pattern) => pattern,
            Err(e) => {
                error!(template_len = path.len(), error = %e, "route template rejected");
                return self;
            }
        };

        let mut handlers = self.middlewares.clone();
        handlers.push(Arc::new(handler));

        self.routes.push(Route {
            method: method.into(),
            pattern,
            handlers: Arc::from(handlers),
        });
        self
    }

    /// Adds global middleware for routes registered from now on.
    pub fn middleware(&mut self, middleware: impl Handler) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn base_path(&mut self, prefix: &str) -> &mut Self {
        self.base_path = prefix.to_string();
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
