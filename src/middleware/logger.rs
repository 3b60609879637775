use crate::handler::{Handler, HandlerFuture};
use crate::http::Context;
use crate::middleware::Next;
use std::time::Instant;
use tracing::info;

/// Logs one line per request once the rest of the chain has finished.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLogger;

impl Handler for RequestLogger {
    fn call(&self, c: Context, next: Next) -> HandlerFuture {
        Box::pin(async move {
            let start = Instant::now();
            let result = next.run().await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => info!(
                    method = %c.method(),
                    path = %c.path(),
                    status = c.current_status(),
                    elapsed_ms,
                    "request handled"
                ),
                Err(err) => info!(
                    method = %c.method(),
                    path = %c.path(),
                    error = %err,
                    elapsed_ms,
                    "request failed"
                ),
            }
            result
        })
    }
}
