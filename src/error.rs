//! Error taxonomy.
//!
//! Every failure surfaced by the handler belongs to one of four classes,
//! reported by [`Error::kind`]: configuration, transport, cancellation and
//! resource errors.

use crate::cancel::Phase;
use crate::types::{ERROR_WINHTTP_OPERATION_CANCELLED, ERROR_WINHTTP_TIMEOUT};
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Names a native entry point, so diagnostics say which call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeApi {
    Open,
    Connect,
    OpenRequest,
    SetOption,
    SetStatusCallback,
    AddRequestHeaders,
    SendRequest,
    WriteData,
    ReceiveResponse,
    QueryHeaders,
    QueryDataAvailable,
    ReadData,
    QueryAuthSchemes,
    SetCredentials,
}

impl NativeApi {
    pub fn name(self) -> &'static str {
        match self {
            NativeApi::Open => "WinHttpOpen",
            NativeApi::Connect => "WinHttpConnect",
            NativeApi::OpenRequest => "WinHttpOpenRequest",
            NativeApi::SetOption => "WinHttpSetOption",
            NativeApi::SetStatusCallback => "WinHttpSetStatusCallback",
            NativeApi::AddRequestHeaders => "WinHttpAddRequestHeaders",
            NativeApi::SendRequest => "WinHttpSendRequest",
            NativeApi::WriteData => "WinHttpWriteData",
            NativeApi::ReceiveResponse => "WinHttpReceiveResponse",
            NativeApi::QueryHeaders => "WinHttpQueryHeaders",
            NativeApi::QueryDataAvailable => "WinHttpQueryDataAvailable",
            NativeApi::ReadData => "WinHttpReadData",
            NativeApi::QueryAuthSchemes => "WinHttpQueryAuthSchemes",
            NativeApi::SetCredentials => "WinHttpSetCredentials",
        }
    }
}

impl fmt::Display for NativeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed native call: which entry point, and the platform error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{api} failed with error {code}")]
pub struct NativeError {
    pub api: NativeApi,
    pub code: u32,
}

impl NativeError {
    pub fn new(api: NativeApi, code: u32) -> Self {
        Self { api, code }
    }

    /// `true` when the native layer reports its own timeout.
    pub fn is_timeout(&self) -> bool {
        self.code == ERROR_WINHTTP_TIMEOUT
    }

    /// `true` when the native layer reports an aborted operation.
    pub fn is_cancelled(&self) -> bool {
        self.code == ERROR_WINHTTP_OPERATION_CANCELLED
    }
}

/// Symbolic name of a validated setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Argument {
    SendTimeout,
    ReceiveHeadersTimeout,
    ReceiveDataTimeout,
    TcpKeepAliveTime,
    TcpKeepAliveInterval,
    MaxAutomaticRedirections,
    MaxConnectionsPerServer,
    MaxResponseHeadersLength,
    MaxResponseDrainSize,
    CookieUsePolicy,
    WindowsProxyUsePolicy,
}

impl Argument {
    pub fn name(self) -> &'static str {
        match self {
            Argument::SendTimeout => "send_timeout",
            Argument::ReceiveHeadersTimeout => "receive_headers_timeout",
            Argument::ReceiveDataTimeout => "receive_data_timeout",
            Argument::TcpKeepAliveTime => "tcp_keep_alive_time",
            Argument::TcpKeepAliveInterval => "tcp_keep_alive_interval",
            Argument::MaxAutomaticRedirections => "max_automatic_redirections",
            Argument::MaxConnectionsPerServer => "max_connections_per_server",
            Argument::MaxResponseHeadersLength => "max_response_headers_length",
            Argument::MaxResponseDrainSize => "max_response_drain_size",
            Argument::CookieUsePolicy => "cookie_use_policy",
            Argument::WindowsProxyUsePolicy => "windows_proxy_use_policy",
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration errors. Raised synchronously by a setter or right before a
/// request is sent; never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{argument} is out of range: {value}")]
    OutOfRange { argument: Argument, value: String },

    #[error("cookie_use_policy requires a cookie container, but none was set")]
    MissingCookieContainer,

    #[error("windows_proxy_use_policy requires a proxy, but none was set")]
    MissingProxy,

    #[error("a proxy was set, but windows_proxy_use_policy does not use a custom proxy")]
    ProxyPolicyMismatch,

    #[error("proxy resolution failed: {0}")]
    ProxyResolution(String),

    #[error("request declares both a Content-Length and chunked transfer encoding")]
    ConflictingBodyLength,

    #[error("request asks for chunked transfer encoding but has no body")]
    ChunkedWithoutBody,

    #[error("invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),

    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(argument: Argument, value: impl fmt::Debug) -> Self {
        ConfigError::OutOfRange {
            argument,
            value: format!("{value:?}"),
        }
    }
}

/// Error class, one per failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Cancellation,
    Resource,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The handler already started sending and its configuration is frozen.
    #[error("the handler configuration cannot change once a request has been sent")]
    InvalidOperation,

    #[error("request body produced {actual} bytes but declared {declared}")]
    BodyLengthMismatch { declared: u64, actual: u64 },

    #[error("error sending request: {0}")]
    Transport(NativeError),

    #[error("request body stream failed: {0}")]
    Body(#[source] std::io::Error),

    #[error("the request was canceled")]
    Cancelled,

    #[error("the request timed out during {phase}")]
    TimedOut { phase: Phase },

    #[error("failed to create native handle: {0}")]
    Resource(NativeError),

    #[error("the handler has been disposed")]
    Disposed,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::InvalidOperation | Error::BodyLengthMismatch { .. } => {
                ErrorKind::Configuration
            }
            Error::Transport(_) | Error::Body(_) => ErrorKind::Transport,
            Error::Cancelled | Error::TimedOut { .. } => ErrorKind::Cancellation,
            Error::Resource(_) | Error::Disposed => ErrorKind::Resource,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// The native diagnostic carried by transport and resource errors.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Error::Transport(err) | Error::Resource(err) => Some(err),
            _ => None,
        }
    }
}
