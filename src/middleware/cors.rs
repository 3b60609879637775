use crate::error::{HttpException, ServerError};
use crate::handler::{Handler, HandlerFuture};
use crate::http::{Context, Method};
use crate::middleware::Next;
use futures::future::{self, FutureExt};
use serde::Deserialize;
use std::sync::Arc;

/// Which request origins are allowed. Deserializes from either a string or
/// a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AllowOrigin {
    One(String),
    List(Vec<String>),
}

impl AllowOrigin {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, AllowOrigin::One(origin) if origin == "*")
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        match self {
            AllowOrigin::One(allowed) => allowed == "*" || Some(allowed.as_str()) == origin,
            AllowOrigin::List(allowed) => origin.is_some_and(|o| allowed.iter().any(|a| a == o)),
        }
    }
}

impl Default for AllowOrigin {
    fn default() -> Self {
        AllowOrigin::One("*".to_string())
    }
}

impl From<&str> for AllowOrigin {
    fn from(origin: &str) -> Self {
        AllowOrigin::One(origin.to_string())
    }
}

impl From<Vec<&str>> for AllowOrigin {
    fn from(origins: Vec<&str>) -> Self {
        AllowOrigin::List(origins.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsConfig {
    pub origin: AllowOrigin,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub credentials: bool,
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: AllowOrigin::default(),
            allow_methods: ["GET", "HEAD", "PUT", "POST", "DELETE", "PATCH"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            allow_headers: Vec::new(),
            expose_headers: Vec::new(),
            credentials: false,
            max_age: None,
        }
    }
}

/// CORS middleware.
///
/// Preflight (`OPTIONS`) requests are answered with 204 and never reach the
/// rest of the chain; a preflight from an origin that is not allowed fails
/// with a 403 [`HttpException`].
#[derive(Clone)]
pub struct Cors {
    config: Arc<CorsConfig>,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn apply(&self, c: &Context, preflight: bool) -> Result<(), HttpException> {
        let config = &self.config;
        let origin = c.get_header("origin");
        let allowed = config.origin.allows(origin);

        if !allowed && preflight {
            return Err(HttpException::new(403, "Forbidden"));
        }

        if allowed {
            c.header("Access-Control-Allow-Origin", origin.unwrap_or("*"));
        }
        if !config.origin.is_wildcard() {
            c.header("Vary", "Origin");
        }
        if config.credentials {
            c.header("Access-Control-Allow-Credentials", "true");
        }
        if !config.expose_headers.is_empty() {
            c.header("Access-Control-Expose-Headers", &config.expose_headers.join(", "));
        }

        if preflight {
            if !config.allow_methods.is_empty() {
                c.header("Access-Control-Allow-Methods", &config.allow_methods.join(", "));
            }
            if !config.allow_headers.is_empty() {
                c.header("Access-Control-Allow-Headers", &config.allow_headers.join(", "));
            }
            if let Some(max_age) = config.max_age.filter(|age| *age > 0) {
                c.header("Access-Control-Max-Age", &max_age.to_string());
            }
            c.status(204);
        }
        Ok(())
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(CorsConfig::default())
    }
}

impl Handler for Cors {
    fn call(&self, c: Context, next: Next) -> HandlerFuture {
        let preflight = c.method() == Method::OPTIONS;
        match self.apply(&c, preflight) {
            Err(e) => future::ready(Err(ServerError::from(e))).boxed(),
            Ok(()) if preflight => future::ready(Ok(())).boxed(),
            Ok(()) => next.run(),
        }
    }
}
