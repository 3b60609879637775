use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    /// Parses a request-line method token. Unknown tokens yield `None`.
    pub fn from_string(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "CONNECT" => Some(Method::CONNECT),
            "OPTIONS" => Some(Method::OPTIONS),
            "TRACE" => Some(Method::TRACE),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum BodySource {
    Buffered(Vec<u8>),
    Stream {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: usize,
    },
}

/// The not-yet-read request body.
///
/// The transport hands over the connection's read half together with the
/// declared `Content-Length`; nothing is read until a handler asks for it.
pub struct Body {
    source: BodySource,
}

impl Body {
    pub fn empty() -> Body {
        Body {
            source: BodySource::Buffered(Vec::new()),
        }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Body {
        Body {
            source: BodySource::Buffered(data.into()),
        }
    }

    pub fn from_reader<R>(reader: R, length: usize) -> Body
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Body {
            source: BodySource::Stream {
                reader: Box::new(reader),
                length,
            },
        }
    }

    /// Reads the whole body.
    ///
    /// Only the wait for the first bytes is bounded by `timeout`; once data
    /// has started arriving the rest is read to the declared length.
    pub(crate) async fn read(self, timeout: Duration, limit: usize) -> ServerResult<Vec<u8>> {
        match self.source {
            BodySource::Buffered(data) => {
                if data.len() > limit {
                    return Err(ServerError::http(413, "Payload Too Large"));
                }
                Ok(data)
            }
            BodySource::Stream { mut reader, length } => {
                if length == 0 {
                    return Ok(Vec::new());
                }
                if length > limit {
                    return Err(ServerError::http(413, "Payload Too Large"));
                }

                let mut data = vec![0u8; length];
                let first = tokio::time::timeout(timeout, reader.read(&mut data))
                    .await
                    .map_err(|_| ServerError::BodyTimeout(timeout))??;
                if first == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before the body arrived",
                    )
                    .into());
                }
                reader.read_exact(&mut data[first..]).await?;
                Ok(data)
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            BodySource::Buffered(data) => write!(f, "Body::Buffered({} bytes)", data.len()),
            BodySource::Stream { length, .. } => write!(f, "Body::Stream({} bytes)", length),
        }
    }
}

/// A raw inbound request as produced by the transport.
///
/// Header names are stored lowercased.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Request {
        Request {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: Body::empty(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Request {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Body) -> Request {
        self.body = body;
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Splits a request target into its path and raw query string.
pub(crate) fn split_url(url: &str) -> (&str, &str) {
    let url = url.split('#').next().unwrap_or("");
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

/// Parses `a=1&b=two` into a map, percent-decoding keys and values.
/// Repeated keys keep the last value.
pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(s)
}
