//! Request bodies.
//!
//! Use the [`From`] impls to pass raw bytes, or [`Body::from_stream`] for a
//! body produced incrementally.
//!
//! ```
//! use winhttp_handler::Body;
//!
//! let body: Body = b"hello".as_slice().into();
//! assert_eq!(body.content_length(), Some(5));
//! let body: Body = String::from("plain text").into();
//! assert!(body.is_replayable());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{Stream, StreamExt};
use std::fmt;
use std::io;
use std::pin::Pin;

pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Terminating chunk of a chunked body.
pub(crate) const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Bytes),
    Stream {
        stream: BodyStream,
        length: Option<u64>,
    },
}

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A body read from `stream`. With `length` set, the stream must yield
    /// exactly that many bytes; without it the body is sent chunked.
    pub fn from_stream<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            kind: Kind::Stream {
                stream: Box::pin(stream),
                length,
            },
        }
    }

    /// `true` for a body with no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(bytes) => bytes.is_empty(),
            Kind::Stream { length, .. } => *length == Some(0),
        }
    }

    /// The size of the body, if known up front.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Full(bytes) => Some(bytes.len() as u64),
            Kind::Stream { length, .. } => *length,
        }
    }

    /// `true` when the body can be sent more than once.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        !matches!(self.kind, Kind::Stream { .. })
    }

    /// Pieces of the body in order. Buffered bodies stay intact and can be
    /// iterated again; a stream is consumed.
    pub(crate) fn chunks(&mut self) -> Chunks<'_> {
        match &mut self.kind {
            Kind::Empty => Chunks::Once(None),
            Kind::Full(bytes) => Chunks::Once(Some(bytes.clone())),
            Kind::Stream { stream, .. } => Chunks::Stream(stream),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Kind::Stream { length, .. } => f
                .debug_struct("Body::Stream")
                .field("length", length)
                .finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Full(bytes),
        }
    }
}

impl From<&[u8]> for Body {
    fn from(data: &[u8]) -> Self {
        Bytes::copy_from_slice(data).into()
    }
}

impl<const N: usize> From<&[u8; N]> for Body {
    fn from(data: &[u8; N]) -> Self {
        Bytes::copy_from_slice(data).into()
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Bytes::from(data).into()
    }
}

impl From<&str> for Body {
    fn from(data: &str) -> Self {
        Bytes::copy_from_slice(data.as_bytes()).into()
    }
}

impl From<String> for Body {
    fn from(data: String) -> Self {
        Bytes::from(data).into()
    }
}

pub(crate) enum Chunks<'a> {
    Once(Option<Bytes>),
    Stream(&'a mut BodyStream),
}

impl Chunks<'_> {
    /// The next non-empty piece, or `None` at the end of the body.
    pub(crate) async fn next(&mut self) -> Option<io::Result<Bytes>> {
        match self {
            Chunks::Once(bytes) => bytes.take().filter(|b| !b.is_empty()).map(Ok),
            Chunks::Stream(stream) => loop {
                match stream.next().await? {
                    Ok(bytes) if bytes.is_empty() => continue,
                    other => return Some(other),
                }
            },
        }
    }
}

/// Wraps `data` in chunked transfer-encoding framing.
pub(crate) fn frame_chunk(data: &[u8]) -> Bytes {
    let size = format!("{:X}\r\n", data.len());
    let mut framed = BytesMut::with_capacity(size.len() + data.len() + 2);
    framed.put_slice(size.as_bytes());
    framed.put_slice(data);
    framed.put_slice(b"\r\n");
    framed.freeze()
}
