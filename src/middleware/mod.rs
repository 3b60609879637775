mod cors;
mod logger;

pub use cors::{AllowOrigin, Cors, CorsConfig};
pub use logger::RequestLogger;

use crate::error::ServerError;
use crate::handler::{HandlerFuture, SharedHandler};
use crate::http::Context;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// How far one chain got. A nested [`Chain`](crate::Chain) keeps its own.
#[derive(Debug, Default)]
struct Progress {
    reached: AtomicUsize,
    failed_at: OnceLock<usize>,
}

/// The continuation handed to every handler.
///
/// A `Next` is a cursor into the chain that is currently running. Calling
/// [`Next::run`] consumes it, runs the handler under the cursor and, through
/// that handler's own `Next`, the rest of the chain; it resolves when the
/// downstream handlers are done. Dropping it without running stops the
/// chain there.
pub struct Next {
    chain: Arc<[SharedHandler]>,
    cursor: usize,
    ctx: Context,
    progress: Arc<Progress>,
    then: Option<Box<Next>>,
}

impl Next {
    fn start(chain: Arc<[SharedHandler]>, ctx: Context, progress: Arc<Progress>) -> Self {
        Self {
            chain,
            cursor: 0,
            ctx,
            progress,
            then: None,
        }
    }

    /// A continuation over `chain` that resumes `outer` once `chain` is
    /// exhausted.
    pub(crate) fn nested(chain: Arc<[SharedHandler]>, ctx: Context, outer: Next) -> Self {
        Self {
            chain,
            cursor: 0,
            ctx,
            progress: Arc::default(),
            then: Some(Box::new(outer)),
        }
    }

    /// Runs the rest of the chain.
    pub fn run(self) -> HandlerFuture {
        Box::pin(async move {
            let Next {
                chain,
                cursor,
                ctx,
                progress,
                then,
            } = self;

            match chain.get(cursor).cloned() {
                Some(handler) => {
                    progress.reached.fetch_max(cursor + 1, Ordering::Relaxed);
                    let next = Next {
                        chain,
                        cursor: cursor + 1,
                        ctx: ctx.clone(),
                        progress: Arc::clone(&progress),
                        then,
                    };
                    let result = handler.call(ctx, next).await;
                    if result.is_err() {
                        // The innermost failure resolves first.
                        let _ = progress.failed_at.set(cursor);
                    }
                    result
                }
                None => match then {
                    Some(outer) => outer.run().await,
                    None => Ok(()),
                },
            }
        })
    }
}

/// Where a chain ended up once its future resolved.
#[derive(Debug)]
pub(crate) enum ChainState {
    /// No handler failed. `reached` is the number of handlers that ran; it
    /// is below `total` when some handler did not continue.
    Completed { reached: usize, total: usize },
    /// The handler at position `at` (zero-based) produced an error. An
    /// error passed up unchanged is charged to the handler that raised it.
    Aborted { at: usize, error: ServerError },
}

pub(crate) async fn run_chain(chain: Arc<[SharedHandler]>, ctx: Context) -> ChainState {
    let total = chain.len();
    let progress = Arc::new(Progress::default());
    let result = Next::start(chain, ctx, Arc::clone(&progress)).run().await;
    match result {
        Ok(()) => ChainState::Completed {
            reached: progress.reached.load(Ordering::Relaxed),
            total,
        },
        Err(error) => ChainState::Aborted {
            at: progress.failed_at.get().copied().unwrap_or_default(),
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain;
    use crate::error::HttpException;
    use crate::handler::Handler;
    use crate::http::{Method, Request};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn step(log: &Log, before: &'static str, after: Option<&'static str>) -> impl Handler {
        let log = Arc::clone(log);
        move |_c: Context, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(before);
                if let Some(after) = after {
                    next.run().await?;
                    log.lock().unwrap().push(after);
                }
                Ok::<(), ServerError>(())
            }
        }
    }

    fn shared(handlers: Vec<SharedHandler>) -> Arc<[SharedHandler]> {
        Arc::from(handlers)
    }

    fn ctx() -> Context {
        Context::for_request(Request::new(Method::GET, "/"))
    }

    #[tokio::test]
    async fn continuation_resumes_after_downstream() {
        let log: Log = Arc::default();
        let chain = shared(vec![
            Arc::new(step(&log, "a:in", Some("a:out"))),
            Arc::new(step(&log, "b:in", Some("b:out"))),
            Arc::new(step(&log, "c", None)),
        ]);

        let state = run_chain(chain, ctx()).await;
        assert!(matches!(state, ChainState::Completed { reached: 3, total: 3 }));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:in", "b:in", "c", "b:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn handler_without_next_short_circuits() {
        let log: Log = Arc::default();
        let chain = shared(vec![
            Arc::new(step(&log, "gate", None)),
            Arc::new(step(&log, "never", None)),
        ]);

        let state = run_chain(chain, ctx()).await;
        assert!(matches!(state, ChainState::Completed { reached: 1, total: 2 }));
        assert_eq!(*log.lock().unwrap(), vec!["gate"]);
    }

    #[tokio::test]
    async fn error_aborts_remaining_handlers() {
        let log: Log = Arc::default();
        let fail = |_c: Context, _next: Next| async {
            Err::<(), ServerError>(HttpException::new(403, "Forbidden").into())
        };
        let chain = shared(vec![
            Arc::new(step(&log, "first", Some("unwound"))),
            Arc::new(fail),
            Arc::new(step(&log, "never", None)),
        ]);

        match run_chain(chain, ctx()).await {
            ChainState::Aborted { at, error } => {
                assert_eq!(at, 1);
                assert!(error.is_http());
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn nested_chain_continues_outer_chain() {
        let log: Log = Arc::default();
        let inner = chain![
            step(&log, "inner:1", Some("inner:1:out")),
            step(&log, "inner:2", Some("inner:2:out")),
        ];
        let chain = shared(vec![
            Arc::new(step(&log, "outer", Some("outer:out"))),
            Arc::new(inner),
            Arc::new(step(&log, "tail", None)),
        ]);

        run_chain(chain, ctx()).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer", "inner:1", "inner:2", "tail", "inner:2:out", "inner:1:out", "outer:out"]
        );
    }

    #[tokio::test]
    async fn empty_chain_completes() {
        let state = run_chain(shared(Vec::new()), ctx()).await;
        assert!(matches!(state, ChainState::Completed { reached: 0, total: 0 }));
    }

    #[tokio::test]
    async fn failure_after_next_is_charged_to_the_outer_handler() {
        let log: Log = Arc::default();
        let fail_on_way_out = |_c: Context, next: Next| async move {
            next.run().await?;
            Err::<(), ServerError>(ServerError::Internal("late".to_string()))
        };
        let chain = shared(vec![
            Arc::new(fail_on_way_out),
            Arc::new(step(&log, "inner", None)),
        ]);

        match run_chain(chain, ctx()).await {
            ChainState::Aborted { at, .. } => assert_eq!(at, 0),
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["inner"]);
    }

    #[tokio::test]
    async fn failure_inside_nested_chain_is_charged_to_the_chain() {
        let log: Log = Arc::default();
        let fail = |_c: Context, _next: Next| async {
            Err::<(), ServerError>(HttpException::new(400, "nope").into())
        };
        let inner = chain![step(&log, "inner:1", Some("inner:1:out")), fail];
        let chain = shared(vec![
            Arc::new(step(&log, "outer", Some("outer:out"))),
            Arc::new(inner),
            Arc::new(step(&log, "tail", None)),
        ]);

        match run_chain(chain, ctx()).await {
            ChainState::Aborted { at, error } => {
                assert_eq!(at, 1);
                assert!(error.is_http());
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner:1"]);
    }
}
