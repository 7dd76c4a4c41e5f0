//! Translation of a [`HandlerConfig`] into discrete native options.
//!
//! Session options are applied once, when the session handle opens. Request
//! options are applied to every request handle before it is sent. An option
//! whose setting equals the platform default is omitted rather than set.

use crate::config::{ClientCertificate, CookieUsePolicy, HandlerConfig, ServerCredentials, Timeout};
use crate::types::*;

/// One native option together with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeOption {
    SecureProtocols(SecureProtocol),
    RedirectPolicy(RedirectPolicy),
    MaxAutomaticRedirects(u32),
    Decompression(DecompressionFlags),
    DisableFeature(DisableFlags),
    EnableFeature(EnableFlags),
    MaxConnsPerServer(u32),
    TcpKeepAlive {
        on: bool,
        time_ms: u32,
        interval_ms: u32,
    },
    MaxResponseHeaderSize(u32),
    MaxResponseDrainSize(u32),
    AutologonPolicy(AutologonPolicy),
    /// `None` explicitly selects "no client certificate".
    ClientCertificate(Option<ClientCertificate>),
    SendTimeout(u32),
    /// Wait for the response headers.
    ReceiveResponseTimeout(u32),
    /// Wait for each piece of response data.
    ReceiveTimeout(u32),
    Proxy {
        access_type: AccessType,
        proxy: Option<String>,
        bypass: Option<String>,
    },
    ProxyUsername(String),
    ProxyPassword(String),
}

impl NativeOption {
    /// The native option identifier.
    pub fn id(&self) -> u32 {
        match self {
            NativeOption::SecureProtocols(_) => WINHTTP_OPTION_SECURE_PROTOCOLS,
            NativeOption::RedirectPolicy(_) => WINHTTP_OPTION_REDIRECT_POLICY,
            NativeOption::MaxAutomaticRedirects(_) => WINHTTP_OPTION_MAX_HTTP_AUTOMATIC_REDIRECTS,
            NativeOption::Decompression(_) => WINHTTP_OPTION_DECOMPRESSION,
            NativeOption::DisableFeature(_) => WINHTTP_OPTION_DISABLE_FEATURE,
            NativeOption::EnableFeature(_) => WINHTTP_OPTION_ENABLE_FEATURE,
            NativeOption::MaxConnsPerServer(_) => WINHTTP_OPTION_MAX_CONNS_PER_SERVER,
            NativeOption::TcpKeepAlive { .. } => WINHTTP_OPTION_TCP_KEEPALIVE,
            NativeOption::MaxResponseHeaderSize(_) => WINHTTP_OPTION_MAX_RESPONSE_HEADER_SIZE,
            NativeOption::MaxResponseDrainSize(_) => WINHTTP_OPTION_MAX_RESPONSE_DRAIN_SIZE,
            NativeOption::AutologonPolicy(_) => WINHTTP_OPTION_AUTOLOGON_POLICY,
            NativeOption::ClientCertificate(_) => WINHTTP_OPTION_CLIENT_CERT_CONTEXT,
            NativeOption::SendTimeout(_) => WINHTTP_OPTION_SEND_TIMEOUT,
            NativeOption::ReceiveResponseTimeout(_) => WINHTTP_OPTION_RECEIVE_RESPONSE_TIMEOUT,
            NativeOption::ReceiveTimeout(_) => WINHTTP_OPTION_RECEIVE_TIMEOUT,
            NativeOption::Proxy { .. } => WINHTTP_OPTION_PROXY,
            NativeOption::ProxyUsername(_) => WINHTTP_OPTION_PROXY_USERNAME,
            NativeOption::ProxyPassword(_) => WINHTTP_OPTION_PROXY_PASSWORD,
        }
    }

    /// The value as a single native `DWORD`, for options that take one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            NativeOption::SecureProtocols(flags) => Some(flags.bits()),
            NativeOption::RedirectPolicy(policy) => Some((*policy).into()),
            NativeOption::Decompression(flags) => Some(flags.bits()),
            NativeOption::DisableFeature(flags) => Some(flags.bits()),
            NativeOption::EnableFeature(flags) => Some(flags.bits()),
            NativeOption::AutologonPolicy(policy) => Some((*policy).into()),
            NativeOption::MaxAutomaticRedirects(v)
            | NativeOption::MaxConnsPerServer(v)
            | NativeOption::MaxResponseHeaderSize(v)
            | NativeOption::MaxResponseDrainSize(v)
            | NativeOption::SendTimeout(v)
            | NativeOption::ReceiveResponseTimeout(v)
            | NativeOption::ReceiveTimeout(v) => Some(*v),
            NativeOption::TcpKeepAlive { .. }
            | NativeOption::ClientCertificate(_)
            | NativeOption::Proxy { .. }
            | NativeOption::ProxyUsername(_)
            | NativeOption::ProxyPassword(_) => None,
        }
    }
}

/// Native milliseconds for a timeout; [`Timeout::Infinite`] is `u32::MAX`.
///
/// A finite duration below one millisecond rounds up so it never reads as
/// "no timeout".
pub fn millis(timeout: Timeout) -> u32 {
    match timeout {
        Timeout::Infinite => u32::MAX,
        Timeout::Finite(d) => u32::try_from(d.as_millis()).unwrap_or(u32::MAX).max(1),
    }
}

/// Maps the managed protocol set to native flags, one native flag per bit.
pub fn secure_protocols(protocols: SslProtocols) -> SecureProtocol {
    [
        (SslProtocols::SSL2, SecureProtocol::SSL2),
        (SslProtocols::SSL3, SecureProtocol::SSL3),
        (SslProtocols::TLS, SecureProtocol::TLS1_0),
        (SslProtocols::TLS11, SecureProtocol::TLS1_1),
        (SslProtocols::TLS12, SecureProtocol::TLS1_2),
        (SslProtocols::TLS13, SecureProtocol::TLS1_3),
    ]
    .into_iter()
    .filter(|(managed, _)| protocols.contains(*managed))
    .fold(SecureProtocol::NONE, |acc, (_, native)| acc | native)
}

pub fn decompression(methods: DecompressionMethods) -> DecompressionFlags {
    let mut flags = DecompressionFlags::NONE;
    if methods.contains(DecompressionMethods::GZIP) {
        flags |= DecompressionFlags::GZIP;
    }
    if methods.contains(DecompressionMethods::DEFLATE) {
        flags |= DecompressionFlags::DEFLATE;
    }
    flags
}

/// Options set on the session handle, once.
pub fn session_options(config: &HandlerConfig) -> Vec<NativeOption> {
    let mut options = Vec::new();

    let protocols = secure_protocols(config.ssl_protocols());
    if !protocols.is_empty() {
        options.push(NativeOption::SecureProtocols(protocols));
    }

    if let Some(max) = config.connection_limit() {
        options.push(NativeOption::MaxConnsPerServer(max));
    }

    let keep_alive = config.tcp_keep_alive();
    if keep_alive.enabled {
        options.push(NativeOption::TcpKeepAlive {
            on: true,
            time_ms: millis(keep_alive.time),
            interval_ms: millis(keep_alive.interval),
        });
    }

    options
}

/// Options set on every request handle before sending.
pub fn request_options(config: &HandlerConfig, secure: bool) -> Vec<NativeOption> {
    let mut options = Vec::new();

    if config.automatic_redirection() {
        options.push(NativeOption::RedirectPolicy(
            RedirectPolicy::DisallowHttpsToHttp,
        ));
        options.push(NativeOption::MaxAutomaticRedirects(
            config.max_automatic_redirections(),
        ));
    } else {
        options.push(NativeOption::RedirectPolicy(RedirectPolicy::Never));
    }

    let decoders = decompression(config.automatic_decompression());
    if !decoders.is_empty() {
        options.push(NativeOption::Decompression(decoders));
    }

    match config.cookie_use_policy() {
        CookieUsePolicy::IgnoreCookies | CookieUsePolicy::UseSpecifiedCookieContainer => {
            options.push(NativeOption::DisableFeature(DisableFlags::COOKIES));
        }
        CookieUsePolicy::UseInternalCookieStoreOnly => {}
    }

    if config.check_certificate_revocation_list() {
        options.push(NativeOption::EnableFeature(EnableFlags::SSL_REVOCATION));
    }

    match config.server_credentials() {
        Some(ServerCredentials::DefaultCredentials) => {
            options.push(NativeOption::AutologonPolicy(AutologonPolicy::Low));
        }
        Some(ServerCredentials::Explicit(_)) => {
            options.push(NativeOption::AutologonPolicy(AutologonPolicy::High));
        }
        None => {}
    }

    if secure {
        options.push(NativeOption::ClientCertificate(
            config.client_certificates().first().cloned(),
        ));
    }

    options.push(NativeOption::SendTimeout(millis(config.send_timeout())));
    options.push(NativeOption::ReceiveResponseTimeout(millis(
        config.receive_headers_timeout(),
    )));
    options.push(NativeOption::ReceiveTimeout(millis(
        config.receive_data_timeout(),
    )));

    options.push(NativeOption::MaxResponseHeaderSize(
        config.max_response_headers_length().saturating_mul(1024),
    ));
    options.push(NativeOption::MaxResponseDrainSize(
        config.max_response_drain_size(),
    ));

    options
}
