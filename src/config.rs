//! Handler configuration: a validating builder and the immutable snapshot it
//! produces.
//!
//! ```
//! use std::time::Duration;
//! use winhttp_handler::{HandlerConfig, Timeout};
//!
//! let mut builder = HandlerConfig::builder();
//! builder
//!     .send_timeout(Duration::from_secs(10))?
//!     .receive_data_timeout(Timeout::Infinite)?
//!     .max_automatic_redirections(5)?
//!     .automatic_redirection(true);
//! let config = builder.build();
//! assert_eq!(config.max_automatic_redirections(), 5);
//! # Ok::<(), winhttp_handler::ConfigError>(())
//! ```

use crate::error::{Argument, ConfigError};
use crate::proxy::Proxy;
use crate::types::{DecompressionMethods, SslProtocols};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Largest finite timeout the native layer can represent (`i32::MAX` ms).
pub const MAX_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// A phase timeout: a positive finite duration, or no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    Finite(Duration),
    Infinite,
}

impl Timeout {
    pub const fn from_secs(secs: u64) -> Self {
        Timeout::Finite(Duration::from_secs(secs))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Timeout::Finite(Duration::from_millis(millis))
    }

    /// Converts a signed millisecond count using the platform convention:
    /// `-1` means infinite, any other negative value is not a timeout.
    ///
    /// Zero converts, but every setter rejects it.
    pub fn try_from_millis(millis: i64) -> Option<Self> {
        match millis {
            -1 => Some(Timeout::Infinite),
            m if m < 0 => None,
            m => Some(Timeout::Finite(Duration::from_millis(m as u64))),
        }
    }

    /// The finite duration, or `None` for [`Timeout::Infinite`].
    pub fn duration(self) -> Option<Duration> {
        match self {
            Timeout::Finite(d) => Some(d),
            Timeout::Infinite => None,
        }
    }

    fn validate(self, argument: Argument) -> Result<Self, ConfigError> {
        match self {
            Timeout::Finite(d) if d.is_zero() || d > MAX_TIMEOUT => {
                Err(ConfigError::out_of_range(argument, d))
            }
            _ => Ok(self),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::Finite(d)
    }
}

/// TCP keep-alive probing on connections opened by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpKeepAlive {
    pub enabled: bool,
    /// Idle time before the first probe.
    pub time: Timeout,
    /// Interval between unanswered probes.
    pub interval: Timeout,
}

impl Default for TcpKeepAlive {
    fn default() -> Self {
        Self {
            enabled: false,
            time: Timeout::from_secs(2 * 60 * 60),
            interval: Timeout::from_secs(1),
        }
    }
}

/// Which cookie behavior applies to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CookieUsePolicy {
    /// Cookies are neither sent nor stored.
    IgnoreCookies,
    /// The native layer tracks cookies per session.
    #[default]
    UseInternalCookieStoreOnly,
    /// Cookies come from, and go to, a caller-supplied [`CookieContainer`].
    UseSpecifiedCookieContainer,
}

impl TryFrom<i32> for CookieUsePolicy {
    type Error = ConfigError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CookieUsePolicy::IgnoreCookies),
            1 => Ok(CookieUsePolicy::UseInternalCookieStoreOnly),
            2 => Ok(CookieUsePolicy::UseSpecifiedCookieContainer),
            other => Err(ConfigError::out_of_range(Argument::CookieUsePolicy, other)),
        }
    }
}

/// Where the proxy for a request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowsProxyUsePolicy {
    /// Connect directly.
    DoNotUseProxy,
    /// The platform's static default proxy configuration.
    #[default]
    UseWinHttpProxy,
    /// Per-user settings with automatic discovery.
    UseWinInetProxy,
    /// The caller-supplied [`Proxy`].
    UseCustomProxy,
}

impl TryFrom<i32> for WindowsProxyUsePolicy {
    type Error = ConfigError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WindowsProxyUsePolicy::DoNotUseProxy),
            1 => Ok(WindowsProxyUsePolicy::UseWinHttpProxy),
            2 => Ok(WindowsProxyUsePolicy::UseWinInetProxy),
            3 => Ok(WindowsProxyUsePolicy::UseCustomProxy),
            other => Err(ConfigError::out_of_range(
                Argument::WindowsProxyUsePolicy,
                other,
            )),
        }
    }
}

/// A caller-owned cookie store.
///
/// The handler never parses cookies itself: it asks the container for the
/// `Cookie` header of an outgoing request and hands back every `Set-Cookie`
/// value of the response.
pub trait CookieContainer: Send + Sync {
    fn cookie_header(&self, url: &Url) -> Option<String>;
    fn set_cookies(&self, url: &Url, set_cookie: &[&str]);
}

/// A user name and password, optionally qualified by a domain.
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkCredential {
    pub user_name: String,
    pub password: String,
    pub domain: Option<String>,
}

impl NetworkCredential {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
            domain: None,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// `DOMAIN\user` when a domain is present, otherwise the bare user name.
    pub fn qualified_user_name(&self) -> String {
        match &self.domain {
            Some(domain) if !domain.is_empty() => format!("{domain}\\{}", self.user_name),
            _ => self.user_name.clone(),
        }
    }
}

impl fmt::Debug for NetworkCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCredential")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Credentials presented to servers that challenge the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCredentials {
    /// The logged-on user's credentials (integrated authentication).
    DefaultCredentials,
    Explicit(NetworkCredential),
}

/// A DER-encoded X.509 client certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    der: Arc<[u8]>,
}

impl ClientCertificate {
    pub fn from_der(der: impl Into<Arc<[u8]>>) -> Self {
        Self { der: der.into() }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("len", &self.der.len())
            .finish()
    }
}

/// Free-form, string-keyed values attached to a handler.
#[derive(Clone, Default)]
pub struct Properties {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Properties {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Immutable handler configuration.
///
/// Built through [`HandlerConfig::builder`]; a handler snapshots it when its
/// native session opens.
#[derive(Clone)]
pub struct HandlerConfig {
    user_agent: String,
    ssl_protocols: SslProtocols,
    automatic_redirection: bool,
    max_automatic_redirections: u32,
    automatic_decompression: DecompressionMethods,
    cookie_use_policy: CookieUsePolicy,
    cookie_container: Option<Arc<dyn CookieContainer>>,
    check_certificate_revocation_list: bool,
    client_certificates: Vec<ClientCertificate>,
    server_credentials: Option<ServerCredentials>,
    windows_proxy_use_policy: WindowsProxyUsePolicy,
    proxy: Option<Proxy>,
    max_connections_per_server: Option<u32>,
    send_timeout: Timeout,
    receive_headers_timeout: Timeout,
    receive_data_timeout: Timeout,
    tcp_keep_alive: TcpKeepAlive,
    max_response_headers_length: u32,
    max_response_drain_size: u32,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            ssl_protocols: SslProtocols::NONE,
            automatic_redirection: true,
            max_automatic_redirections: 50,
            automatic_decompression: DecompressionMethods::NONE,
            cookie_use_policy: CookieUsePolicy::UseInternalCookieStoreOnly,
            cookie_container: None,
            check_certificate_revocation_list: true,
            client_certificates: Vec::new(),
            server_credentials: None,
            windows_proxy_use_policy: WindowsProxyUsePolicy::UseWinHttpProxy,
            proxy: None,
            max_connections_per_server: None,
            send_timeout: Timeout::from_secs(30),
            receive_headers_timeout: Timeout::from_secs(30),
            receive_data_timeout: Timeout::from_secs(30),
            tcp_keep_alive: TcpKeepAlive::default(),
            max_response_headers_length: 64,
            max_response_drain_size: 1024 * 1024,
        }
    }
}

impl HandlerConfig {
    #[must_use]
    pub fn builder() -> HandlerConfigBuilder {
        HandlerConfigBuilder::default()
    }

    /// A builder seeded with this configuration.
    #[must_use]
    pub fn to_builder(&self) -> HandlerConfigBuilder {
        HandlerConfigBuilder {
            config: self.clone(),
        }
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn ssl_protocols(&self) -> SslProtocols {
        self.ssl_protocols
    }

    #[must_use]
    pub fn automatic_redirection(&self) -> bool {
        self.automatic_redirection
    }

    #[must_use]
    pub fn max_automatic_redirections(&self) -> u32 {
        self.max_automatic_redirections
    }

    #[must_use]
    pub fn automatic_decompression(&self) -> DecompressionMethods {
        self.automatic_decompression
    }

    #[must_use]
    pub fn cookie_use_policy(&self) -> CookieUsePolicy {
        self.cookie_use_policy
    }

    #[must_use]
    pub fn cookie_container(&self) -> Option<&Arc<dyn CookieContainer>> {
        self.cookie_container.as_ref()
    }

    #[must_use]
    pub fn check_certificate_revocation_list(&self) -> bool {
        self.check_certificate_revocation_list
    }

    #[must_use]
    pub fn client_certificates(&self) -> &[ClientCertificate] {
        &self.client_certificates
    }

    #[must_use]
    pub fn server_credentials(&self) -> Option<&ServerCredentials> {
        self.server_credentials.as_ref()
    }

    #[must_use]
    pub fn windows_proxy_use_policy(&self) -> WindowsProxyUsePolicy {
        self.windows_proxy_use_policy
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// The per-server connection limit; `i32::MAX` when unbounded.
    #[must_use]
    pub fn max_connections_per_server(&self) -> u32 {
        self.max_connections_per_server.unwrap_or(i32::MAX as u32)
    }

    pub(crate) fn connection_limit(&self) -> Option<u32> {
        self.max_connections_per_server
    }

    #[must_use]
    pub fn send_timeout(&self) -> Timeout {
        self.send_timeout
    }

    #[must_use]
    pub fn receive_headers_timeout(&self) -> Timeout {
        self.receive_headers_timeout
    }

    #[must_use]
    pub fn receive_data_timeout(&self) -> Timeout {
        self.receive_data_timeout
    }

    #[must_use]
    pub fn tcp_keep_alive(&self) -> TcpKeepAlive {
        self.tcp_keep_alive
    }

    /// Maximum size of the response headers, in KiB.
    #[must_use]
    pub fn max_response_headers_length(&self) -> u32 {
        self.max_response_headers_length
    }

    #[must_use]
    pub fn max_response_drain_size(&self) -> u32 {
        self.max_response_drain_size
    }

    /// Checks the pairings that can only be judged once the whole
    /// configuration is known, i.e. right before the first send.
    pub(crate) fn validate_for_send(&self) -> Result<(), ConfigError> {
        if self.cookie_use_policy == CookieUsePolicy::UseSpecifiedCookieContainer
            && self.cookie_container.is_none()
        {
            return Err(ConfigError::MissingCookieContainer);
        }
        Ok(())
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("user_agent", &self.user_agent)
            .field("ssl_protocols", &self.ssl_protocols)
            .field("automatic_redirection", &self.automatic_redirection)
            .field("max_automatic_redirections", &self.max_automatic_redirections)
            .field("automatic_decompression", &self.automatic_decompression)
            .field("cookie_use_policy", &self.cookie_use_policy)
            .field("cookie_container", &self.cookie_container.is_some())
            .field(
                "check_certificate_revocation_list",
                &self.check_certificate_revocation_list,
            )
            .field("client_certificates", &self.client_certificates)
            .field("server_credentials", &self.server_credentials)
            .field("windows_proxy_use_policy", &self.windows_proxy_use_policy)
            .field("proxy", &self.proxy)
            .field("max_connections_per_server", &self.max_connections_per_server)
            .field("send_timeout", &self.send_timeout)
            .field("receive_headers_timeout", &self.receive_headers_timeout)
            .field("receive_data_timeout", &self.receive_data_timeout)
            .field("tcp_keep_alive", &self.tcp_keep_alive)
            .field("max_response_headers_length", &self.max_response_headers_length)
            .field("max_response_drain_size", &self.max_response_drain_size)
            .finish()
    }
}

/// Mutable, validating builder for [`HandlerConfig`].
///
/// Fallible setters check their argument first and leave the builder
/// untouched on error.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfigBuilder {
    config: HandlerConfig,
}

impl HandlerConfigBuilder {
    /// The configuration as currently set.
    #[must_use]
    pub fn current(&self) -> &HandlerConfig {
        &self.config
    }

    #[must_use]
    pub fn build(&self) -> HandlerConfig {
        self.config.clone()
    }

    pub fn user_agent(&mut self, agent: impl Into<String>) -> &mut Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn ssl_protocols(&mut self, protocols: SslProtocols) -> &mut Self {
        self.config.ssl_protocols = protocols;
        self
    }

    pub fn automatic_redirection(&mut self, enabled: bool) -> &mut Self {
        self.config.automatic_redirection = enabled;
        self
    }

    pub fn max_automatic_redirections(&mut self, max: i32) -> Result<&mut Self, ConfigError> {
        self.config.max_automatic_redirections =
            positive(Argument::MaxAutomaticRedirections, max)?;
        Ok(self)
    }

    pub fn automatic_decompression(&mut self, methods: DecompressionMethods) -> &mut Self {
        self.config.automatic_decompression = methods;
        self
    }

    pub fn cookie_use_policy(&mut self, policy: CookieUsePolicy) -> &mut Self {
        self.config.cookie_use_policy = policy;
        self
    }

    pub fn cookie_container(&mut self, container: Option<Arc<dyn CookieContainer>>) -> &mut Self {
        self.config.cookie_container = container;
        self
    }

    pub fn check_certificate_revocation_list(&mut self, check: bool) -> &mut Self {
        self.config.check_certificate_revocation_list = check;
        self
    }

    pub fn client_certificates(
        &mut self,
        certificates: impl IntoIterator<Item = ClientCertificate>,
    ) -> &mut Self {
        self.config.client_certificates = certificates.into_iter().collect();
        self
    }

    pub fn server_credentials(&mut self, credentials: Option<ServerCredentials>) -> &mut Self {
        self.config.server_credentials = credentials;
        self
    }

    pub fn windows_proxy_use_policy(&mut self, policy: WindowsProxyUsePolicy) -> &mut Self {
        self.config.windows_proxy_use_policy = policy;
        self
    }

    pub fn proxy(&mut self, proxy: Option<Proxy>) -> &mut Self {
        self.config.proxy = proxy;
        self
    }

    pub fn max_connections_per_server(&mut self, max: i32) -> Result<&mut Self, ConfigError> {
        let max = positive(Argument::MaxConnectionsPerServer, max)?;
        self.config.max_connections_per_server = (max != i32::MAX as u32).then_some(max);
        Ok(self)
    }

    pub fn send_timeout(&mut self, timeout: impl Into<Timeout>) -> Result<&mut Self, ConfigError> {
        self.config.send_timeout = timeout.into().validate(Argument::SendTimeout)?;
        Ok(self)
    }

    pub fn receive_headers_timeout(
        &mut self,
        timeout: impl Into<Timeout>,
    ) -> Result<&mut Self, ConfigError> {
        self.config.receive_headers_timeout =
            timeout.into().validate(Argument::ReceiveHeadersTimeout)?;
        Ok(self)
    }

    pub fn receive_data_timeout(
        &mut self,
        timeout: impl Into<Timeout>,
    ) -> Result<&mut Self, ConfigError> {
        self.config.receive_data_timeout = timeout.into().validate(Argument::ReceiveDataTimeout)?;
        Ok(self)
    }

    pub fn tcp_keep_alive_enabled(&mut self, enabled: bool) -> &mut Self {
        self.config.tcp_keep_alive.enabled = enabled;
        self
    }

    pub fn tcp_keep_alive_time(
        &mut self,
        time: impl Into<Timeout>,
    ) -> Result<&mut Self, ConfigError> {
        self.config.tcp_keep_alive.time = time.into().validate(Argument::TcpKeepAliveTime)?;
        Ok(self)
    }

    pub fn tcp_keep_alive_interval(
        &mut self,
        interval: impl Into<Timeout>,
    ) -> Result<&mut Self, ConfigError> {
        self.config.tcp_keep_alive.interval =
            interval.into().validate(Argument::TcpKeepAliveInterval)?;
        Ok(self)
    }

    /// Maximum size of the response headers, in KiB.
    pub fn max_response_headers_length(&mut self, kib: i32) -> Result<&mut Self, ConfigError> {
        self.config.max_response_headers_length =
            positive(Argument::MaxResponseHeadersLength, kib)?;
        Ok(self)
    }

    pub fn max_response_drain_size(&mut self, bytes: i32) -> Result<&mut Self, ConfigError> {
        self.config.max_response_drain_size = positive(Argument::MaxResponseDrainSize, bytes)?;
        Ok(self)
    }
}

fn positive(argument: Argument, value: i32) -> Result<u32, ConfigError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::out_of_range(argument, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.ssl_protocols(), SslProtocols::NONE);
        assert!(config.automatic_redirection());
        assert_eq!(config.max_automatic_redirections(), 50);
        assert_eq!(config.automatic_decompression(), DecompressionMethods::NONE);
        assert_eq!(
            config.cookie_use_policy(),
            CookieUsePolicy::UseInternalCookieStoreOnly
        );
        assert!(config.cookie_container().is_none());
        assert!(config.check_certificate_revocation_list());
        assert!(config.client_certificates().is_empty());
        assert!(config.server_credentials().is_none());
        assert_eq!(
            config.windows_proxy_use_policy(),
            WindowsProxyUsePolicy::UseWinHttpProxy
        );
        assert!(config.proxy().is_none());
        assert_eq!(config.max_connections_per_server(), i32::MAX as u32);
        assert_eq!(config.send_timeout(), Timeout::from_secs(30));
        assert_eq!(config.receive_headers_timeout(), Timeout::from_secs(30));
        assert_eq!(config.receive_data_timeout(), Timeout::from_secs(30));
        assert!(!config.tcp_keep_alive().enabled);
        assert_eq!(config.tcp_keep_alive().time, Timeout::from_secs(7200));
        assert_eq!(config.tcp_keep_alive().interval, Timeout::from_secs(1));
        assert_eq!(config.max_response_headers_length(), 64);
        assert_eq!(config.max_response_drain_size(), 1024 * 1024);
    }

    #[test]
    fn test_invalid_timeouts_rejected_without_mutation() {
        let mut builder = HandlerConfig::builder();
        let invalid = [Duration::ZERO, MAX_TIMEOUT + Duration::from_millis(1)];
        for d in invalid {
            assert!(builder.send_timeout(d).is_err());
            assert!(builder.receive_headers_timeout(d).is_err());
            assert!(builder.receive_data_timeout(d).is_err());
            assert!(builder.tcp_keep_alive_time(d).is_err());
            assert!(builder.tcp_keep_alive_interval(d).is_err());
        }
        assert_eq!(builder.current().send_timeout(), Timeout::from_secs(30));
        assert_eq!(builder.current().tcp_keep_alive().interval, Timeout::from_secs(1));
    }

    #[test]
    fn test_timeout_error_names_argument() {
        let mut builder = HandlerConfig::builder();
        let err = builder.receive_data_timeout(Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                argument: Argument::ReceiveDataTimeout,
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_from_signed_millis() {
        assert_eq!(Timeout::try_from_millis(-1), Some(Timeout::Infinite));
        assert_eq!(Timeout::try_from_millis(-2), None);
        assert_eq!(Timeout::try_from_millis(1500), Some(Timeout::from_millis(1500)));
        let zero = Timeout::try_from_millis(0).unwrap();
        assert!(HandlerConfig::builder().send_timeout(zero).is_err());
    }

    #[test]
    fn test_max_timeout_accepted() {
        let mut builder = HandlerConfig::builder();
        builder.send_timeout(MAX_TIMEOUT).unwrap();
        builder.receive_headers_timeout(Timeout::Infinite).unwrap();
        let config = builder.build();
        assert_eq!(config.send_timeout(), Timeout::Finite(MAX_TIMEOUT));
        assert_eq!(config.receive_headers_timeout(), Timeout::Infinite);
    }

    #[test]
    fn test_keep_alive_round_trip() {
        let mut builder = HandlerConfig::builder();
        builder
            .tcp_keep_alive_enabled(true)
            .tcp_keep_alive_time(Duration::from_secs(42 * 60))
            .unwrap()
            .tcp_keep_alive_interval(Duration::from_secs(13))
            .unwrap();
        let keep_alive = builder.build().tcp_keep_alive();
        assert!(keep_alive.enabled);
        assert_eq!(keep_alive.time, Timeout::from_secs(42 * 60));
        assert_eq!(keep_alive.interval, Timeout::from_secs(13));
    }

    #[test]
    fn test_positive_integers() {
        let mut builder = HandlerConfig::builder();
        assert!(builder.max_automatic_redirections(0).is_err());
        assert!(builder.max_automatic_redirections(-1).is_err());
        assert!(builder.max_connections_per_server(0).is_err());
        assert!(builder.max_connections_per_server(-1).is_err());
        assert!(builder.max_response_headers_length(0).is_err());
        assert!(builder.max_response_drain_size(-5).is_err());

        builder.max_automatic_redirections(35).unwrap();
        builder.max_connections_per_server(1).unwrap();
        let config = builder.build();
        assert_eq!(config.max_automatic_redirections(), 35);
        assert_eq!(config.max_connections_per_server(), 1);
        assert_eq!(config.connection_limit(), Some(1));
    }

    #[test]
    fn test_unbounded_connection_limit() {
        let mut builder = HandlerConfig::builder();
        builder.max_connections_per_server(i32::MAX).unwrap();
        assert_eq!(builder.current().connection_limit(), None);
    }

    #[test]
    fn test_policy_from_integral() {
        assert_eq!(
            CookieUsePolicy::try_from(0).unwrap(),
            CookieUsePolicy::IgnoreCookies
        );
        assert!(matches!(
            CookieUsePolicy::try_from(100),
            Err(ConfigError::OutOfRange {
                argument: Argument::CookieUsePolicy,
                ..
            })
        ));
        assert_eq!(
            WindowsProxyUsePolicy::try_from(3).unwrap(),
            WindowsProxyUsePolicy::UseCustomProxy
        );
        assert!(matches!(
            WindowsProxyUsePolicy::try_from(100),
            Err(ConfigError::OutOfRange {
                argument: Argument::WindowsProxyUsePolicy,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_cookie_container_only_fails_on_validate() {
        let mut builder = HandlerConfig::builder();
        builder.cookie_use_policy(CookieUsePolicy::UseSpecifiedCookieContainer);
        let config = builder.build();
        assert_eq!(
            config.validate_for_send(),
            Err(ConfigError::MissingCookieContainer)
        );
    }

    #[test]
    fn test_properties() {
        let mut properties = Properties::default();
        assert!(properties.is_empty());
        properties.insert("item", 42u32);
        assert_eq!(properties.get::<u32>("item"), Some(&42));
        assert_eq!(properties.get::<String>("item"), None);
        assert!(properties.remove("item"));
        assert_eq!(properties.len(), 0);
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let credential = NetworkCredential::new("user", "hunter2").with_domain("corp");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(credential.qualified_user_name(), "corp\\user");
    }
}
