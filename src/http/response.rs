use crate::error::ServerResult;
use serde::de::DeserializeOwned;
use std::time::SystemTime;
use tracing::warn;

/// Headers the serializer always writes itself.
const FRAMING_HEADERS: [&str; 3] = ["content-length", "date", "connection"];

/// A finalized response, produced once per request by `Context::end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Sets a header, replacing any existing value under the same name
    /// compared case-insensitively.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        set_header(&mut self.headers, name.as_ref(), value.as_ref());
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> ServerResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// A response for transport-level failures that never reach dispatch.
    pub(crate) fn plain(status: u16, body: &str) -> Response {
        let mut response = Response::new(status);
        response.header("Content-Type", "text/plain");
        response.body = body.to_string();
        response
    }

    fn allows_body(&self) -> bool {
        !matches!(self.status, 100..=199 | 204 | 304)
    }

    /// Serializes the response as an HTTP/1.1 message. `head_only` drops the
    /// body bytes while keeping `Content-Length`, as HEAD requires.
    ///
    /// Headers containing CR or LF are dropped, as are user-set framing
    /// headers (`Content-Length`, `Date`, `Connection`).
    pub(crate) fn to_bytes(&self, head_only: bool) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            if FRAMING_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            if has_line_break(name) || has_line_break(value) {
                warn!(header = %name.escape_debug(), "header with line break dropped");
                continue;
            }
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if self.allows_body() {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str(&format!(
            "Date: {}\r\n",
            httpdate::fmt_http_date(SystemTime::now())
        ));
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        if self.allows_body() && !head_only {
            bytes.extend_from_slice(self.body.as_bytes());
        }
        bytes
    }
}

fn has_line_break(text: &str) -> bool {
    text.contains(['\r', '\n'])
}

pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some(entry) => entry.1 = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        431 => "Request Header Fields Too Large",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
