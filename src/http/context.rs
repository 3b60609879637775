use crate::error::{ServerError, ServerResult};
use crate::http::request::{parse_query, split_url, Body, Method, Request};
use crate::http::response::{set_header, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Limits applied when a handler reads the request body.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyLimits {
    pub(crate) timeout: Duration,
    pub(crate) max_size: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_size: 2 * 1024 * 1024,
        }
    }
}

enum BodyState {
    Unread(Body),
    Read(Arc<Vec<u8>>),
    Failed,
}

/// Request data shared by every Context created for one request.
pub(crate) struct RequestHead {
    method: Method,
    url: String,
    path: String,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    body: tokio::sync::Mutex<BodyState>,
    limits: BodyLimits,
}

impl RequestHead {
    pub(crate) fn new(request: Request, limits: BodyLimits) -> Self {
        let (path, query) = split_url(&request.url);
        let path = path.to_string();
        let query = parse_query(query);
        Self {
            method: request.method,
            url: request.url,
            path,
            headers: request.headers,
            query,
            body: tokio::sync::Mutex::new(BodyState::Unread(request.body)),
            limits,
        }
    }

    pub(crate) fn method(&self) -> Method {
        self.method
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    async fn read_body(&self) -> ServerResult<Arc<Vec<u8>>> {
        let mut state = self.body.lock().await;
        match mem::replace(&mut *state, BodyState::Failed) {
            BodyState::Read(data) => {
                *state = BodyState::Read(Arc::clone(&data));
                Ok(data)
            }
            BodyState::Unread(body) => {
                let data = Arc::new(body.read(self.limits.timeout, self.limits.max_size).await?);
                *state = BodyState::Read(Arc::clone(&data));
                Ok(data)
            }
            BodyState::Failed => Err(ServerError::Internal(
                "request body could not be read".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct ResponseState {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    ended: bool,
}

/// Per-request state handed to every handler.
///
/// Reads come from the shared request head; writes are buffered and only
/// turned into a [`Response`] when the dispatcher ends the context. Cloning
/// is cheap and every clone sees the same buffered response.
#[derive(Clone)]
pub struct Context {
    head: Arc<RequestHead>,
    params: Arc<HashMap<String, String>>,
    response: Arc<Mutex<ResponseState>>,
}

impl Context {
    pub(crate) fn new(head: Arc<RequestHead>, params: HashMap<String, String>) -> Self {
        Self {
            head,
            params: Arc::new(params),
            response: Arc::new(Mutex::new(ResponseState::default())),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_request(request: Request) -> Self {
        Self::new(
            Arc::new(RequestHead::new(request, BodyLimits::default())),
            HashMap::new(),
        )
    }

    pub fn method(&self) -> Method {
        self.head.method
    }

    /// The raw request target, query string included.
    pub fn url(&self) -> &str {
        &self.head.url
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.head
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.head.headers
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.head.query.get(name).map(String::as_str)
    }

    pub fn queries(&self) -> &HashMap<String, String> {
        &self.head.query
    }

    /// Parses the request body as JSON. An empty body parses as `{}`.
    ///
    /// Fails with [`ServerError::BodyTimeout`] when no body bytes arrive in
    /// time and with [`ServerError::Json`] when the body is malformed.
    pub async fn json_body<T: DeserializeOwned>(&self) -> ServerResult<T> {
        let data = self.head.read_body().await?;
        let value = if data.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&data)?
        };
        Ok(serde_json::from_value(value)?)
    }

    pub async fn body_text(&self) -> ServerResult<String> {
        let data = self.head.read_body().await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    pub fn status(&self, status: u16) {
        self.write(|state| state.status = Some(status));
    }

    pub fn current_status(&self) -> u16 {
        self.state().status.unwrap_or(200)
    }

    pub fn header(&self, key: &str, value: &str) {
        self.write(|state| set_header(&mut state.headers, key, value));
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> ServerResult<()> {
        let body = serde_json::to_string(value)?;
        self.write(|state| {
            set_header(&mut state.headers, "Content-Type", "application/json");
            state.body = Some(body);
        });
        Ok(())
    }

    pub fn text(&self, value: impl Into<String>) {
        let body = value.into();
        self.write(|state| {
            set_header(&mut state.headers, "Content-Type", "text/plain");
            state.body = Some(body);
        });
    }

    /// Takes the buffered response. Returns `None` if this context was
    /// already ended.
    pub(crate) fn end(&self) -> Option<Response> {
        let mut state = self.state();
        if state.ended {
            return None;
        }
        state.ended = true;

        let mut headers = vec![("Content-Type".to_string(), "text/plain".to_string())];
        for (key, value) in mem::take(&mut state.headers) {
            set_header(&mut headers, &key, &value);
        }
        Some(Response {
            status: state.status.unwrap_or(200),
            headers,
            body: state.body.take().unwrap_or_default(),
        })
    }

    fn write(&self, f: impl FnOnce(&mut ResponseState)) {
        let mut state = self.state();
        if state.ended {
            warn!(path = %self.head.path, "response already sent; write ignored");
            return;
        }
        f(&mut state);
    }

    fn state(&self) -> MutexGuard<'_, ResponseState> {
        self.response.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
