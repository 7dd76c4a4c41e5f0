//! Responses and their forward-only body stream.

use crate::error::Result;
use crate::native::NativeTransport;
use crate::request::{RequestContext, ResponseHead};
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode, Version};
use std::fmt;
use url::Url;

/// Largest piece requested from the native layer by [`ResponseStream::chunk`].
const CHUNK_SIZE: usize = 64 * 1024;

/// When [`send`](crate::WinHttpHandler::send) returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompletionOption {
    /// After the whole body has been read into memory.
    #[default]
    ResponseContentRead,
    /// As soon as the headers arrive; the body is read from the stream.
    ResponseHeadersRead,
}

pub struct ResponseMessage<T: NativeTransport> {
    status: StatusCode,
    version: Version,
    reason: String,
    headers: HeaderMap,
    url: Url,
    body: ResponseStream<T>,
}

impl<T: NativeTransport> ResponseMessage<T> {
    pub(crate) fn new(head: ResponseHead, url: Url, body: ResponseStream<T>) -> Self {
        Self {
            status: head.status,
            version: head.version,
            reason: head.reason,
            headers: head.headers,
            url,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Reason phrase from the status line; may be empty.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL the request was sent to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns `true` if the status code is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&mut self) -> &mut ResponseStream<T> {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseStream<T> {
        self.body
    }

    /// Reads the rest of the body into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        self.body.read_to_end().await
    }

    /// The rest of the body as UTF-8 (lossy).
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<T: NativeTransport> fmt::Debug for ResponseMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseMessage")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Response body, read incrementally.
///
/// Reads may return fewer bytes than requested. A read of 0 bytes into a
/// non-empty buffer means the end of the body, and every later read
/// returns 0 as well. Dropping the stream releases the native request.
pub struct ResponseStream<T: NativeTransport> {
    pending: Bytes,
    context: Option<Box<RequestContext<T>>>,
}

impl<T: NativeTransport> ResponseStream<T> {
    pub(crate) fn live(context: RequestContext<T>) -> Self {
        Self {
            pending: Bytes::new(),
            context: Some(Box::new(context)),
        }
    }

    pub(crate) fn buffered(bytes: Bytes) -> Self {
        Self {
            pending: bytes,
            context: None,
        }
    }

    /// Reads into `buf`, returning how many bytes were written.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.fetch(buf.len()).await? {
                Some(bytes) => self.pending = bytes,
                None => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }

    /// The next piece of the body, or `None` at its end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        self.fetch(CHUNK_SIZE).await
    }

    /// Reads everything that is left.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let first = match self.chunk().await? {
            Some(bytes) => bytes,
            None => return Ok(Bytes::new()),
        };
        let Some(second) = self.chunk().await? else {
            return Ok(first);
        };
        let mut body = BytesMut::from(&first[..]);
        body.extend_from_slice(&second);
        while let Some(bytes) = self.chunk().await? {
            body.extend_from_slice(&bytes);
        }
        Ok(body.freeze())
    }

    /// Releases the native request. Later reads return end of stream.
    /// Calling it again has no effect.
    pub fn close(&mut self) {
        self.pending.clear();
        if self.context.take().is_some() {
            tracing::trace!("response stream closed");
        }
    }

    /// `true` once nothing more can be read.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.pending.is_empty() && self.context.is_none()
    }

    async fn fetch(&mut self, max: usize) -> Result<Option<Bytes>> {
        let Some(context) = self.context.as_mut() else {
            return Ok(None);
        };
        match context.read_data(max).await {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            Ok(None) => {
                self.context = None;
                Ok(None)
            }
            Err(err) => {
                self.context = None;
                Err(err)
            }
        }
    }
}

impl<T: NativeTransport> fmt::Debug for ResponseStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("pending", &self.pending.len())
            .field("live", &self.context.is_some())
            .finish()
    }
}
