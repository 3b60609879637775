//! # Liviano
//!
//! A small HTTP router with ordered route matching and continuation-style
//! middleware.
//!
//! ## Features
//!
//! - Express-style routing with `:name` path parameters and a base path
//! - Global middleware and multi-handler chains driven by an explicit `next`
//! - Buffered responses, sent exactly once per request
//! - Typed HTTP exceptions routed to a configurable error handler
//! - JSON request bodies with a bounded wait for the first bytes
//! - CORS and request logging middleware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use liviano::{json, Application, Context, Next, ServerResult};
//!
//! async fn user(c: Context, _next: Next) -> ServerResult<()> {
//!     let id = c.param("id").unwrap_or_default().to_string();
//!     c.json(&json!({ "id": id }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> ServerResult<()> {
//!     let mut app = Application::new();
//!     app.get("/users/:id", user);
//!
//!     let server = app.listen("127.0.0.1:3000").await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Middleware Usage
//!
//! ```rust,ignore
//! use liviano::middleware::{Cors, CorsConfig, RequestLogger};
//!
//! app.middleware(RequestLogger);
//! app.middleware(Cors::new(CorsConfig { origin: "https://example.com".into(), ..Default::default() }));
//! ```

pub mod app;
pub mod error;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
pub mod tls;
pub extern crate serde_json;

pub use app::{Application, DispatchMode};
pub use error::{HttpException, ServerError, ServerResult};
pub use handler::{Chain, Handler, HandlerResult};
pub use http::{Body, Context, Method, Request, Response};
pub use middleware::Next;
pub use router::{RouteMethod, Router};
pub use server::Server;

// Reexport serde_json
pub use serde_json::{json, Value};
