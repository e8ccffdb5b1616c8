//! Outbound response writers.
//!
//! # Responsibilities
//! - Define the mandatory writer surface (status, headers, body, commit)
//! - Expose flush, close notification and hijack as optional capabilities
//! - Bridge a synchronous handler to axum's async response body
//!
//! # Data Flow
//! ```text
//! handler (blocking worker)              axum handler (async)
//!   ctx.write(..)  → buffer
//!   ctx.flush()    → commit head ──────→ PendingResponse::recv()
//!                  → chunk ──mpsc──────→ Body stream → hyper → client
//!   ctx.finish()   → last chunk, close
//! ```
//!
//! # Design Decisions
//! - Nothing reaches the client before the first flush or finish, so a
//!   faulting handler can still be answered with a clean 500
//! - A response finished without any flush is sent as one complete body
//!   with a known length
//! - Capability absence is an explicit `WriterError::Unsupported`

use std::convert::Infallible;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Optional writer capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Flush,
    CloseNotify,
    Hijack,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Flush => f.write_str("flush"),
            Capability::CloseNotify => f.write_str("close-notify"),
            Capability::Hijack => f.write_str("hijack"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("response writer does not support {0}")]
    Unsupported(Capability),

    #[error("connection closed by client")]
    Closed,

    #[error("connection already hijacked")]
    Hijacked,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle reporting when the client side of a response goes away.
#[derive(Debug, Clone)]
pub struct CloseNotify(watch::Receiver<()>);

impl CloseNotify {
    /// True once the client stopped consuming the response.
    pub fn is_closed(&self) -> bool {
        self.0.has_changed().is_err()
    }

    /// Resolves when the client stops consuming the response.
    pub async fn closed(&mut self) {
        while self.0.changed().await.is_ok() {}
    }
}

/// A taken-over connection, usable with tokio's `AsyncRead`/`AsyncWrite`.
pub type HijackedIo = TokioIo<Upgraded>;

/// Wait for a connection handed out by [`ResponseWriter::hijack`].
///
/// Resolves once the `101 Switching Protocols` head has been sent, so the
/// handler must finish (or flush) its response before this can complete.
pub async fn upgraded(upgrade: OnUpgrade) -> Result<HijackedIo, WriterError> {
    upgrade
        .await
        .map(TokioIo::new)
        .map_err(|e| WriterError::Io(io::Error::other(e)))
}

/// The response side of a request.
///
/// `status`, `headers`, `write` and `finish` are always available. The
/// optional capabilities default to [`WriterError::Unsupported`]; check
/// [`ResponseWriter::supports`] first when the fallback matters.
pub trait ResponseWriter: Send {
    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Append body bytes. Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, WriterError>;

    /// True once the status line and headers left the process.
    fn is_committed(&self) -> bool;

    /// Drop status, headers and buffered body. Returns false when the
    /// response was already committed and nothing could be discarded.
    fn reset(&mut self) -> bool;

    /// Complete the response. Further writes fail; repeated calls are no-ops.
    fn finish(&mut self);

    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    fn flush(&mut self) -> Result<(), WriterError> {
        Err(WriterError::Unsupported(Capability::Flush))
    }

    fn close_notify(&mut self) -> Result<CloseNotify, WriterError> {
        Err(WriterError::Unsupported(Capability::CloseNotify))
    }

    /// Take over the connection once the response is sent. The caller is
    /// expected to answer `101 Switching Protocols` and await the upgrade.
    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        Err(WriterError::Unsupported(Capability::Hijack))
    }
}

enum HeadBody {
    Complete(Bytes),
    Streaming(mpsc::UnboundedReceiver<Bytes>),
}

struct Head {
    status: StatusCode,
    headers: HeaderMap,
    body: HeadBody,
}

/// Writer backed by a channel into an axum response.
pub struct StreamWriter {
    status: StatusCode,
    headers: HeaderMap,
    buffer: Vec<u8>,
    head: Option<oneshot::Sender<Head>>,
    chunks: Option<mpsc::UnboundedSender<Bytes>>,
    closed: watch::Receiver<()>,
    upgrade: Option<OnUpgrade>,
    hijacked: bool,
    finished: bool,
}

/// Receiving half of a [`StreamWriter`]: yields the response once the
/// writer commits.
pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    closed: watch::Sender<()>,
}

impl StreamWriter {
    pub fn new(upgrade: Option<OnUpgrade>) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = watch::channel(());

        let writer = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            buffer: Vec::new(),
            head: Some(head_tx),
            chunks: None,
            closed: closed_rx,
            upgrade,
            hijacked: false,
            finished: false,
        };

        (
            writer,
            PendingResponse {
                head: head_rx,
                closed: closed_tx,
            },
        )
    }

    fn commit(&mut self, body: HeadBody) -> Result<(), WriterError> {
        let Some(head) = self.head.take() else {
            return Ok(());
        };

        head.send(Head {
            status: self.status,
            headers: self.headers.clone(),
            body,
        })
        .map_err(|_| WriterError::Closed)
    }

    fn send_chunk(&mut self, chunk: Bytes) -> Result<(), WriterError> {
        if chunk.is_empty() {
            return Ok(());
        }
        match &self.chunks {
            Some(chunks) => chunks.send(chunk).map_err(|_| WriterError::Closed),
            None => Err(WriterError::Closed),
        }
    }
}

impl ResponseWriter for StreamWriter {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.head.is_some() {
            self.status = status;
        } else {
            tracing::warn!(status = %status, "Status change after response was committed ignored");
        }
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriterError> {
        if self.finished {
            return Err(WriterError::Closed);
        }
        if self.head.is_some() {
            self.buffer.extend_from_slice(data);
        } else {
            self.send_chunk(Bytes::copy_from_slice(data))?;
        }
        Ok(data.len())
    }

    fn is_committed(&self) -> bool {
        self.head.is_none()
    }

    fn reset(&mut self) -> bool {
        if self.is_committed() {
            return false;
        }
        self.status = StatusCode::OK;
        self.headers.clear();
        self.buffer.clear();
        true
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let buffered = Bytes::from(std::mem::take(&mut self.buffer));
        let result = if self.head.is_some() {
            self.commit(HeadBody::Complete(buffered))
        } else {
            self.send_chunk(buffered)
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Response dropped before completion");
        }
        self.chunks = None;
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Flush | Capability::CloseNotify => true,
            Capability::Hijack => self.upgrade.is_some(),
        }
    }

    fn flush(&mut self) -> Result<(), WriterError> {
        if self.finished {
            return Err(WriterError::Closed);
        }
        if self.head.is_some() {
            let (tx, rx) = mpsc::unbounded_channel();
            self.chunks = Some(tx);
            self.commit(HeadBody::Streaming(rx))?;
        }
        let buffered = Bytes::from(std::mem::take(&mut self.buffer));
        self.send_chunk(buffered)
    }

    fn close_notify(&mut self) -> Result<CloseNotify, WriterError> {
        Ok(CloseNotify(self.closed.clone()))
    }

    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        match self.upgrade.take() {
            Some(upgrade) => {
                self.hijacked = true;
                Ok(upgrade)
            }
            None if self.hijacked => Err(WriterError::Hijacked),
            None => Err(WriterError::Unsupported(Capability::Hijack)),
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

impl PendingResponse {
    /// Wait for the writer to commit. `None` if it was dropped without ever
    /// producing a response.
    pub async fn recv(self) -> Option<Response<Body>> {
        let head = self.head.await.ok()?;
        Some(head.into_response(self.closed))
    }

    /// Non-blocking variant of [`PendingResponse::recv`].
    pub fn try_recv(mut self) -> Option<Response<Body>> {
        let head = self.head.try_recv().ok()?;
        Some(head.into_response(self.closed))
    }
}

impl Head {
    fn into_response(self, closed: watch::Sender<()>) -> Response<Body> {
        let body = match self.body {
            HeadBody::Complete(bytes) => Body::from(bytes),
            HeadBody::Streaming(chunks) => {
                // The close sender lives as long as the body is being polled.
                let stream = futures_util::stream::unfold((chunks, closed), |(mut rx, closed)| async move {
                    rx.recv()
                        .await
                        .map(|chunk| (Ok::<_, Infallible>(chunk), (rx, closed)))
                });
                Body::from_stream(stream)
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug, Default)]
struct Recorded {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    finished: bool,
}

/// In-memory writer without optional capabilities.
///
/// Useful for driving a `Dispatcher` without a network stack; the paired
/// [`Recording`] exposes what was written.
pub struct BufferWriter {
    recorded: Arc<Mutex<Recorded>>,
    headers: HeaderMap,
    status: StatusCode,
}

/// Read side of a [`BufferWriter`].
#[derive(Clone)]
pub struct Recording(Arc<Mutex<Recorded>>);

impl BufferWriter {
    pub fn new() -> (Self, Recording) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                recorded: Arc::clone(&recorded),
                headers: HeaderMap::new(),
                status: StatusCode::OK,
            },
            Recording(recorded),
        )
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResponseWriter for BufferWriter {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriterError> {
        let mut recorded = self.recorded();
        if recorded.finished {
            return Err(WriterError::Closed);
        }
        recorded.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn is_committed(&self) -> bool {
        self.recorded().finished
    }

    fn reset(&mut self) -> bool {
        {
            let mut recorded = self.recorded();
            if recorded.finished {
                return false;
            }
            recorded.body.clear();
        }
        self.status = StatusCode::OK;
        self.headers.clear();
        true
    }

    fn finish(&mut self) {
        let mut recorded = self.recorded();
        if recorded.finished {
            return;
        }
        recorded.status = self.status;
        recorded.headers = self.headers.clone();
        recorded.finished = true;
    }
}

impl Recording {
    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Final status; `200 OK` until the writer finishes.
    pub fn status(&self) -> StatusCode {
        self.recorded().status
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.recorded()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn body(&self) -> Vec<u8> {
        self.recorded().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.recorded().body).into_owned()
    }

    pub fn is_finished(&self) -> bool {
        self.recorded().finished
    }
}

/// `Content-Type` for plain-text fallbacks.
pub(crate) fn text_plain() -> HeaderValue {
    HeaderValue::from_static("text/plain; charset=utf-8")
}

/// Write a plain-text error response: status, `text/plain`, `nosniff`, and
/// the message plus a newline.
pub(crate) fn write_error(writer: &mut dyn ResponseWriter, status: StatusCode, message: &str) {
    let headers = writer.headers_mut();
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(header::CONTENT_TYPE, text_plain());
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    writer.set_status(status);
    if let Err(e) = writer.write(format!("{}\n", message).as_bytes()) {
        tracing::debug!(error = %e, status = %status, "Failed to write error response");
    }
}
