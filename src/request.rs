//! Outgoing requests and the pipeline that drives one through the native
//! transport up to the response headers.

use crate::body::{Body, LAST_CHUNK, frame_chunk};
use crate::callback::{self, CallbackEvent, EventStream};
use crate::cancel::{CancellationBridge, Phase};
use crate::config::{CookieUsePolicy, HandlerConfig, ServerCredentials, Timeout};
use crate::error::{ConfigError, Error, NativeApi, NativeError, Result};
use crate::handle::NativeHandle;
use crate::native::{NativeTransport, OpenRequest};
use crate::options::request_options;
use crate::session::{Connection, Session};
use crate::types::{
    AuthTarget, ERROR_WINHTTP_INVALID_SERVER_RESPONSE, ERROR_WINHTTP_OPERATION_CANCELLED,
    WINHTTP_IGNORE_REQUEST_TOTAL_LENGTH,
};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, COOKIE, SET_COOKIE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use url::{Position, Url};

/// An HTTP request to be sent through a handler.
///
/// ```
/// use http::{Method, header};
/// use url::Url;
/// use winhttp_handler::HttpRequest;
///
/// let request = HttpRequest::new(Method::POST, Url::parse("http://example.com/items")?)
///     .header(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"))
///     .body("hello");
/// assert_eq!(request.body_ref().content_length(), Some(5));
/// # Ok::<(), url::ParseError>(())
/// ```
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
    cancellation: Option<CancellationToken>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::empty(),
            cancellation: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Cancels the request, including a streamed response, when `token` fires.
    #[must_use]
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    pub(crate) fn token(&self) -> Option<CancellationToken> {
        self.cancellation.clone()
    }
}

/// Status line and headers of a received response.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub(crate) status: StatusCode,
    pub(crate) version: Version,
    pub(crate) reason: String,
    pub(crate) headers: HeaderMap,
}

/// How the body goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked,
}

/// Everything one in-flight request owns.
///
/// Fields drop in declaration order: the request handle closes before its
/// connection, and the connection before the session reference.
pub(crate) struct RequestContext<T: NativeTransport> {
    request: NativeHandle<T>,
    connection: Connection<T>,
    _slot: Option<OwnedSemaphorePermit>,
    events: EventStream,
    session: Arc<Session<T>>,
    bridge: CancellationBridge,
}

impl<T: NativeTransport> RequestContext<T> {
    fn config(&self) -> &HandlerConfig {
        self.session.config()
    }

    fn timeout(&self, phase: Phase) -> Timeout {
        let config = self.config();
        match phase {
            Phase::AcquireSlot => Timeout::Infinite,
            Phase::Send => config.send_timeout(),
            Phase::ReceiveHeaders => config.receive_headers_timeout(),
            Phase::ReceiveData => config.receive_data_timeout(),
        }
    }

    /// Waits for the next completion of `api` under the phase deadline.
    async fn wait(&mut self, phase: Phase, api: NativeApi) -> Result<CallbackEvent> {
        let timeout = self.timeout(phase);
        let events = &mut self.events;
        self.bridge
            .run(phase, timeout, async move {
                match events.next_event().await {
                    Some(CallbackEvent::RequestError(err)) if err.is_timeout() => {
                        Err(Error::TimedOut { phase })
                    }
                    Some(CallbackEvent::RequestError(err)) => Err(transport_error(err)),
                    Some(event) => Ok(event),
                    None => Err(transport_error(NativeError::new(
                        api,
                        ERROR_WINHTTP_OPERATION_CANCELLED,
                    ))),
                }
            })
            .await
    }

    async fn send_request(&mut self, total_length: u32) -> Result<()> {
        self.request
            .transport()
            .send_request(self.request.raw(), total_length)
            .map_err(transport_error)?;
        loop {
            match self.wait(Phase::Send, NativeApi::SendRequest).await? {
                CallbackEvent::SendRequestComplete => return Ok(()),
                event => tracing::trace!(?event, "ignored while sending"),
            }
        }
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        let mut remaining = data;
        while !remaining.is_empty() {
            self.request
                .transport()
                .write_data(self.request.raw(), remaining.clone())
                .map_err(transport_error)?;
            let written = loop {
                match self.wait(Phase::Send, NativeApi::WriteData).await? {
                    CallbackEvent::WriteComplete(n) => break n,
                    event => tracing::trace!(?event, "ignored while writing"),
                }
            };
            if written == 0 {
                return Err(transport_error(NativeError::new(
                    NativeApi::WriteData,
                    ERROR_WINHTTP_INVALID_SERVER_RESPONSE,
                )));
            }
            let _ = remaining.split_to(written.min(remaining.len()));
        }
        Ok(())
    }

    async fn write_body(&mut self, body: &mut Body, framing: Framing) -> Result<()> {
        let mut written = 0u64;
        let mut chunks = body.chunks();
        loop {
            let timeout = self.timeout(Phase::Send);
            let next = self
                .bridge
                .run(Phase::Send, timeout, async { Ok(chunks.next().await) })
                .await?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(Error::Body)?;
            let actual = written + chunk.len() as u64;
            match framing {
                Framing::Length(declared) if actual > declared => {
                    return Err(Error::BodyLengthMismatch { declared, actual });
                }
                Framing::Length(_) => self.write(chunk).await?,
                Framing::Chunked => self.write(frame_chunk(&chunk)).await?,
            }
            written = actual;
        }

        match framing {
            Framing::Length(declared) if written != declared => Err(Error::BodyLengthMismatch {
                declared,
                actual: written,
            }),
            Framing::Length(_) => Ok(()),
            Framing::Chunked => self.write(Bytes::from_static(LAST_CHUNK)).await,
        }
    }

    async fn receive_head(&mut self) -> Result<ResponseHead> {
        let transport = self.request.transport();
        let raw = self.request.raw();
        transport.receive_response(raw).map_err(transport_error)?;
        loop {
            match self
                .wait(Phase::ReceiveHeaders, NativeApi::ReceiveResponse)
                .await?
            {
                CallbackEvent::HeadersAvailable => break,
                event => tracing::trace!(?event, "ignored while receiving headers"),
            }
        }

        let transport = self.request.transport();
        let code = transport.query_status_code(raw).map_err(transport_error)?;
        let status = StatusCode::from_u16(code).map_err(|_| {
            transport_error(NativeError::new(
                NativeApi::QueryHeaders,
                ERROR_WINHTTP_INVALID_SERVER_RESPONSE,
            ))
        })?;
        let raw_headers = transport.query_raw_headers(raw).map_err(transport_error)?;
        let (version, reason, headers) = parse_raw_headers(&raw_headers);
        Ok(ResponseHead {
            status,
            version,
            reason,
            headers,
        })
    }

    /// Reads at most `max` bytes of the response body. `None` at the end.
    pub(crate) async fn read_data(&mut self, max: usize) -> Result<Option<Bytes>> {
        self.bridge.check()?;
        let raw = self.request.raw();
        self.request
            .transport()
            .query_data_available(raw)
            .map_err(transport_error)?;
        let available = loop {
            match self
                .wait(Phase::ReceiveData, NativeApi::QueryDataAvailable)
                .await?
            {
                CallbackEvent::DataAvailable(n) => break n as usize,
                event => tracing::trace!(?event, "ignored while querying data"),
            }
        };
        if available == 0 {
            return Ok(None);
        }

        self.request
            .transport()
            .read_data(raw, available.min(max))
            .map_err(transport_error)?;
        loop {
            match self.wait(Phase::ReceiveData, NativeApi::ReadData).await? {
                CallbackEvent::ReadComplete(bytes) if bytes.is_empty() => return Ok(None),
                CallbackEvent::ReadComplete(bytes) => return Ok(Some(bytes)),
                event => tracing::trace!(?event, "ignored while reading"),
            }
        }
    }

    fn connection(&self) -> &Connection<T> {
        &self.connection
    }
}

pub(crate) fn transport_error(err: NativeError) -> Error {
    tracing::warn!(error = %err, "native call failed");
    Error::Transport(err)
}

/// Checks the body against its framing headers, before any native call.
fn framing(headers: &HeaderMap, body: &Body) -> Result<Framing> {
    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        if headers.contains_key(CONTENT_LENGTH) {
            return Err(ConfigError::ConflictingBodyLength.into());
        }
        if body.is_empty() {
            return Err(ConfigError::ChunkedWithoutBody.into());
        }
        return Ok(Framing::Chunked);
    }

    let declared = match headers.get(CONTENT_LENGTH) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    ConfigError::InvalidContentLength(
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })?,
        ),
        None => None,
    };

    match (declared, body.content_length()) {
        (Some(declared), Some(actual)) if declared != actual => {
            Err(Error::BodyLengthMismatch { declared, actual })
        }
        (_, Some(actual)) => Ok(Framing::Length(actual)),
        (Some(declared), None) => Ok(Framing::Length(declared)),
        (None, None) => Ok(Framing::Chunked),
    }
}

/// Header block handed to the native layer, CRLF separated.
fn header_block(
    request: &HttpRequest,
    framing: Framing,
    config: &HandlerConfig,
) -> String {
    let mut block = String::new();
    for (name, value) in &request.headers {
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push_str("\r\n");
    }
    if framing == Framing::Chunked && !request.headers.contains_key(TRANSFER_ENCODING) {
        block.push_str("Transfer-Encoding: chunked\r\n");
    }
    if config.cookie_use_policy() == CookieUsePolicy::UseSpecifiedCookieContainer
        && !request.headers.contains_key(COOKIE)
    {
        if let Some(cookies) = config
            .cookie_container()
            .and_then(|container| container.cookie_header(&request.url))
            .filter(|cookies| !cookies.is_empty())
        {
            block.push_str("Cookie: ");
            block.push_str(&cookies);
            block.push_str("\r\n");
        }
    }
    block
}

/// Splits a raw header block into version, reason phrase and headers.
/// Lines that are not valid headers are skipped.
pub(crate) fn parse_raw_headers(raw: &str) -> (Version, String, HeaderMap) {
    let mut lines = raw.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = match parts.next().unwrap_or_default() {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/2" | "HTTP/2.0" => Version::HTTP_2,
        "HTTP/3" | "HTTP/3.0" => Version::HTTP_3,
        _ => Version::HTTP_11,
    };
    let _status = parts.next();
    let reason = parts.next().unwrap_or_default().trim().to_string();

    let mut headers = HeaderMap::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            tracing::trace!(line, "skipping malformed header line");
            continue;
        };
        match (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::trace!(line, "skipping invalid header"),
        }
    }
    (version, reason, headers)
}

/// Drives `request` from connect to received headers.
///
/// On error every handle opened so far is closed before returning.
pub(crate) async fn execute<T: NativeTransport>(
    session: Arc<Session<T>>,
    mut request: HttpRequest,
    bridge: CancellationBridge,
) -> Result<(RequestContext<T>, ResponseHead)> {
    let url = request.url.clone();
    let secure = match url.scheme() {
        "https" => true,
        "http" => false,
        other => return Err(ConfigError::UnsupportedScheme(other.to_string()).into()),
    };
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()).into());
    };

    let decision = session.proxy().decide(&url)?;
    let framing = framing(&request.headers, &request.body)?;

    let authority = format!("{host}:{port}");
    let slot = bridge
        .run(
            Phase::AcquireSlot,
            Timeout::Infinite,
            session.acquire_slot(&authority),
        )
        .await?;

    let connection = session.connect(host, port)?;
    let (sink, events) = callback::channel();
    let transport = session.transport().clone();
    let open = OpenRequest {
        method: request.method.as_str(),
        path: &url[Position::BeforePath..Position::AfterQuery],
        secure,
    };
    let raw = transport
        .open_request(connection.raw(), &open, sink)
        .map_err(transport_error)?;

    let mut context = RequestContext {
        request: NativeHandle::new(transport.clone(), raw),
        connection,
        _slot: slot,
        events,
        session,
        bridge,
    };
    tracing::trace!(
        request = raw.get(),
        connection = context.connection().raw().get(),
        "request opened"
    );

    let config = context.session.config().clone();
    for option in request_options(&config, secure)
        .into_iter()
        .chain(decision.options())
    {
        tracing::trace!(option = option.id(), "request option");
        transport
            .set_option(raw, &option)
            .map_err(transport_error)?;
    }

    let headers = header_block(&request, framing, &config);
    if !headers.is_empty() {
        transport
            .add_request_headers(raw, &headers)
            .map_err(transport_error)?;
    }

    let total_length = match framing {
        Framing::Length(n) => u32::try_from(n).unwrap_or(u32::MAX),
        Framing::Chunked => WINHTTP_IGNORE_REQUEST_TOTAL_LENGTH,
    };

    let mut authenticated = false;
    let head = loop {
        context.send_request(total_length).await?;
        context.write_body(&mut request.body, framing).await?;
        let head = context.receive_head().await?;

        if head.status != StatusCode::UNAUTHORIZED || authenticated || !request.body.is_replayable()
        {
            break head;
        }
        let Some(ServerCredentials::Explicit(credential)) = config.server_credentials() else {
            break head;
        };
        let challenge = transport
            .query_auth_schemes(raw)
            .map_err(transport_error)?;
        let Some(scheme) = challenge.supported.strongest() else {
            break head;
        };
        tracing::debug!(?scheme, "answering server authentication challenge");
        transport
            .set_credentials(raw, AuthTarget::Server, scheme, credential)
            .map_err(transport_error)?;
        authenticated = true;
    };

    if config.cookie_use_policy() == CookieUsePolicy::UseSpecifiedCookieContainer {
        if let Some(container) = config.cookie_container() {
            let set_cookie: Vec<&str> = head
                .headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            if !set_cookie.is_empty() {
                container.set_cookies(&url, &set_cookie);
            }
        }
    }

    tracing::debug!(status = head.status.as_u16(), "response headers received");
    Ok((context, head))
}
