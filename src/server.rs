use crate::app::Application;
use crate::error::{ServerError, ServerResult};
use crate::http::{Body, Method, Request, Response};
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Handle to a running server.
///
/// Dropping the handle also stops the accept loop; use [`Server::close`] to
/// wait for it.
#[derive(Debug)]
pub struct Server {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Server {
    pub(crate) fn spawn(
        app: Arc<Application>,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
        local_addr: SocketAddr,
    ) -> Server {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(accept_loop(app, listener, acceptor, signal));
        Server {
            local_addr,
            shutdown,
            task,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections. Requests already being served finish on
    /// their own.
    pub async fn close(self) {
        self.close_with(|| {}).await
    }

    pub async fn close_with<F: FnOnce()>(self, on_closed: F) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "accept loop ended abnormally");
        }
        info!(address = %self.local_addr, "server closed");
        on_closed();
    }
}

async fn accept_loop(
    app: Arc<Application>,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(app.max_connections.max(1)));

    loop {
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "connection failed");
                    continue;
                }
            },
        };

        let app = Arc::clone(&app);
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let result = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(&app, tls_stream).await,
                    Err(e) => {
                        warn!(%peer, error = %e, "TLS handshake failed");
                        Ok(())
                    }
                },
                None => serve_connection(&app, stream).await,
            };

            if let Err(e) = result {
                debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

/// Request line and headers of an incoming request.
#[derive(Debug)]
struct RawHead {
    method: String,
    url: String,
    headers: HashMap<String, String>,
}

/// Reads one request from `stream`, dispatches it and writes the response.
async fn serve_connection<S>(app: &Application, stream: S) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let head = match timeout(app.header_timeout, read_head(&mut reader, app.max_header_size)).await
    {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(ServerError::Http(e))) => {
            debug!(status = e.status, "request head rejected");
            return reject(&mut write_half, e.status, &e.message).await;
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            debug!(timeout = ?app.header_timeout, "request head timed out");
            return reject(&mut write_half, 408, "Request Timeout").await;
        }
    };

    let Some(method) = Method::from_string(&head.method) else {
        debug!(method = %head.method, "unsupported method");
        return reject(&mut write_half, 501, "Not Implemented").await;
    };

    let length = head
        .headers
        .get("content-length")
        .and_then(|value: &String| value.parse::<usize>().ok())
        .unwrap_or(0);

    let request = Request {
        method,
        url: head.url,
        headers: head.headers,
        body: Body::from_reader(reader, length),
    };
    let response = app.handle(request).await;

    write_half
        .write_all(&response.to_bytes(method == Method::HEAD))
        .await?;
    write_half.flush().await?;
    write_half.shutdown().await?;
    Ok(())
}

async fn reject<W>(writer: &mut W, status: u16, message: &str) -> ServerResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&Response::plain(status, message).to_bytes(false))
        .await?;
    writer.shutdown().await?;
    Ok(())
}

/// Reads the request line and headers, at most `limit` bytes in total.
/// Returns `None` when the peer closed before sending anything.
async fn read_head<R>(reader: &mut R, limit: usize) -> ServerResult<Option<RawHead>>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = limit;
    let Some(request_line) = read_line(reader, &mut budget).await? else {
        return Ok(None);
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(url)) = (parts.next(), parts.next()) else {
        return Err(Error::new(ErrorKind::InvalidData, "Invalid request line").into());
    };
    let (method, url) = (method.to_string(), url.to_string());

    let mut headers = HashMap::new();
    loop {
        let Some(line) = read_line(reader, &mut budget).await? else {
            return Err(Error::new(ErrorKind::UnexpectedEof, "connection closed in headers").into());
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(Some(RawHead {
        method,
        url,
        headers,
    }))
}

/// One `\n`-terminated line charged against `budget`. `None` on EOF.
async fn read_line<R>(reader: &mut R, budget: &mut usize) -> ServerResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = AsyncReadExt::take(&mut *reader, *budget as u64)
        .read_until(b'\n', &mut line)
        .await?;
    *budget -= read;

    if line.ends_with(b"\n") {
        return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
    }
    if *budget == 0 {
        return Err(ServerError::http(431, "Request Header Fields Too Large"));
    }
    Ok(None)
}
