//! # winhttp-handler
//!
//! An HTTP message handler that enforces a validated configuration on top of
//! a native, OS-level HTTP transport (WinHTTP on Windows).
//!
//! The handler takes care of policy: timeouts, redirects, proxy selection,
//! TLS protocol choice, cookies, connection limits and keep-alive. It turns
//! that policy into native options once per session, drives each request
//! through the transport, and streams the response back while honoring
//! cancellation.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(windows)]
//! # async fn demo() -> winhttp_handler::Result<()> {
//! use std::time::Duration;
//! use url::Url;
//! use winhttp_handler::{CompletionOption, HandlerConfig, HttpRequest, WinHttpHandler, WinHttpTransport};
//!
//! let mut config = HandlerConfig::builder();
//! config
//!     .receive_headers_timeout(Duration::from_secs(10))?
//!     .max_automatic_redirections(5)?;
//!
//! let handler = WinHttpHandler::with_config(WinHttpTransport::new(), config.build());
//! let url = Url::parse("https://example.com/").expect("valid url");
//! let response = handler
//!     .send(HttpRequest::get(url), CompletionOption::ResponseContentRead)
//!     .await?;
//! println!("{}", response.text().await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Configuration**: [`HandlerConfigBuilder`] validates every setter;
//!   [`HandlerConfig`] is the immutable snapshot a session runs with.
//! - **Translation**: [`options`] maps a configuration to [`NativeOption`]s,
//!   [`ProxyResolver`] maps the proxy policy to a session access type and a
//!   [`ProxyDecision`] per request.
//! - **Native boundary**: [`NativeTransport`]. Completions arrive as
//!   [`CallbackEvent`]s through an [`EventSink`] and wake the waiting task.
//! - **Handler**: [`WinHttpHandler`] opens its session lazily, sends
//!   requests and returns a [`ResponseMessage`] whose body is a
//!   forward-only [`ResponseStream`].
//!
//! Every native handle is owned by exactly one RAII wrapper and is released
//! on every exit path, including cancellation.

mod body;
mod callback;
mod cancel;
mod config;
mod error;
mod handle;
mod handler;
mod native;
pub mod options;
mod proxy;
mod request;
mod response;
mod session;
mod types;
#[cfg(windows)]
mod winhttp;

pub use body::{Body, BodyStream};
pub use callback::{CallbackEvent, EventSink};
pub use cancel::Phase;
pub use config::{
    ClientCertificate, CookieContainer, CookieUsePolicy, HandlerConfig, HandlerConfigBuilder,
    MAX_TIMEOUT, NetworkCredential, Properties, ServerCredentials, TcpKeepAlive, Timeout,
    WindowsProxyUsePolicy,
};
pub use error::{Argument, ConfigError, Error, ErrorKind, NativeApi, NativeError, Result};
pub use handler::WinHttpHandler;
pub use native::{
    AuthChallenge, NativeResult, NativeTransport, OpenRequest, RawHandle, SessionParams,
};
pub use options::NativeOption;
pub use proxy::{Proxy, ProxyDecision, ProxyError, ProxyResolver, StaticProxy, WebProxy};
pub use request::HttpRequest;
pub use response::{CompletionOption, ResponseMessage, ResponseStream};
#[cfg(windows)]
pub use winhttp::WinHttpTransport;

pub use tokio_util::sync::CancellationToken;
pub use types::*;
