//! The native transport boundary.
//!
//! Everything below this trait is the OS HTTP stack; everything above it is
//! policy. Calls that start I/O return as soon as the operation is queued and
//! report completion through the request's [`EventSink`]. Query calls answer
//! synchronously.

use crate::callback::EventSink;
use crate::config::NetworkCredential;
use crate::error::NativeError;
use crate::options::NativeOption;
use crate::types::{AccessType, AuthScheme, AuthTarget};
use bytes::Bytes;
use std::num::NonZeroUsize;

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// An opaque, non-null native handle value.
///
/// Ownership lives in [`NativeHandle`](crate::handle::NativeHandle); this is
/// just the value passed across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    pub fn new(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(Self)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Arguments of the session-open call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub user_agent: String,
    pub access_type: AccessType,
    /// Only meaningful with [`AccessType::NamedProxy`].
    pub proxy: Option<String>,
    pub proxy_bypass: Option<String>,
}

/// Arguments of the request-open call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest<'a> {
    pub method: &'a str,
    /// Path and query of the target URL.
    pub path: &'a str,
    pub secure: bool,
}

/// Authentication schemes offered in a 401/407 challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge {
    pub supported: AuthScheme,
    pub first: AuthScheme,
    pub target: AuthTarget,
}

/// Operations the handler needs from the OS HTTP stack.
///
/// Implementations must be callable from any thread. A handle value stays
/// valid until it is passed to [`close_handle`](Self::close_handle), which
/// the handler does exactly once per handle.
pub trait NativeTransport: Send + Sync + 'static {
    fn open_session(&self, params: &SessionParams) -> NativeResult<RawHandle>;

    fn connect(&self, session: RawHandle, host: &str, port: u16) -> NativeResult<RawHandle>;

    /// Opens a request handle whose completions are delivered to `sink`.
    fn open_request(
        &self,
        connection: RawHandle,
        request: &OpenRequest<'_>,
        sink: EventSink,
    ) -> NativeResult<RawHandle>;

    fn set_option(&self, handle: RawHandle, option: &NativeOption) -> NativeResult<()>;

    /// Appends CRLF-separated header lines to the request.
    fn add_request_headers(&self, request: RawHandle, headers: &str) -> NativeResult<()>;

    /// Starts sending. `total_length` is the body size, or
    /// [`WINHTTP_IGNORE_REQUEST_TOTAL_LENGTH`](crate::types::WINHTTP_IGNORE_REQUEST_TOTAL_LENGTH)
    /// for chunked bodies. Completes with `SendRequestComplete`.
    fn send_request(&self, request: RawHandle, total_length: u32) -> NativeResult<()>;

    /// Completes with `WriteComplete(n)`.
    fn write_data(&self, request: RawHandle, data: Bytes) -> NativeResult<()>;

    /// Completes with `HeadersAvailable`.
    fn receive_response(&self, request: RawHandle) -> NativeResult<()>;

    fn query_status_code(&self, request: RawHandle) -> NativeResult<u16>;

    /// The status line and headers, CRLF separated.
    fn query_raw_headers(&self, request: RawHandle) -> NativeResult<String>;

    /// Completes with `DataAvailable(n)`.
    fn query_data_available(&self, request: RawHandle) -> NativeResult<()>;

    /// Reads at most `len` bytes. Completes with `ReadComplete(bytes)`.
    fn read_data(&self, request: RawHandle, len: usize) -> NativeResult<()>;

    fn query_auth_schemes(&self, request: RawHandle) -> NativeResult<AuthChallenge>;

    fn set_credentials(
        &self,
        request: RawHandle,
        target: AuthTarget,
        scheme: AuthScheme,
        credential: &NetworkCredential,
    ) -> NativeResult<()>;

    /// Releases a handle. Failures are not reported.
    fn close_handle(&self, handle: RawHandle);
}
