//! Proxy policy and per-request proxy decisions.

use crate::config::{NetworkCredential, WindowsProxyUsePolicy};
use crate::error::ConfigError;
use crate::options::NativeOption;
use crate::types::AccessType;
use std::fmt;
use std::sync::Arc;
use url::Url;

pub type ProxyError = Box<dyn std::error::Error + Send + Sync>;

/// A caller-supplied proxy selector.
pub trait WebProxy: Send + Sync {
    /// The proxy to use for `destination`, or `None` to connect directly.
    fn proxy_for(&self, destination: &Url) -> Result<Option<Url>, ProxyError>;

    fn is_bypassed(&self, destination: &Url) -> bool;

    fn credentials(&self) -> Option<NetworkCredential> {
        None
    }
}

/// The proxy attached to a handler configuration.
#[derive(Clone)]
pub enum Proxy {
    /// Defer to the platform's automatic proxy settings.
    SystemDefault,
    Custom(Arc<dyn WebProxy>),
}

impl Proxy {
    pub fn custom(proxy: impl WebProxy + 'static) -> Self {
        Proxy::Custom(Arc::new(proxy))
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proxy::SystemDefault => f.write_str("SystemDefault"),
            Proxy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A fixed proxy address with a host bypass list.
///
/// Bypass entries match a host exactly or, written as `*.suffix`, any
/// subdomain. The entry `<local>` matches dotless host names.
#[derive(Debug, Clone)]
pub struct StaticProxy {
    address: Url,
    bypass: Vec<String>,
    credentials: Option<NetworkCredential>,
}

impl StaticProxy {
    pub fn new(address: Url) -> Self {
        Self {
            address,
            bypass: Vec::new(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn bypass(mut self, entry: impl Into<String>) -> Self {
        self.bypass.push(entry.into().to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: NetworkCredential) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl WebProxy for StaticProxy {
    fn proxy_for(&self, _destination: &Url) -> Result<Option<Url>, ProxyError> {
        Ok(Some(self.address.clone()))
    }

    fn is_bypassed(&self, destination: &Url) -> bool {
        let Some(host) = destination.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.bypass.iter().any(|entry| match entry.as_str() {
            "<local>" => !host.contains('.'),
            pattern => match pattern.strip_prefix("*.") {
                Some(suffix) => host
                    .strip_suffix(suffix)
                    .is_some_and(|rest| rest.ends_with('.')),
                None => host == pattern,
            },
        })
    }

    fn credentials(&self) -> Option<NetworkCredential> {
        self.credentials.clone()
    }
}

/// How one request reaches its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyDecision {
    /// Use whatever the session handle was opened with.
    Inherit,
    /// Connect directly, overriding the session.
    NoProxy,
    Named {
        proxy: String,
        credentials: Option<NetworkCredential>,
    },
}

impl ProxyDecision {
    /// Request-level options realizing this decision.
    pub fn options(&self) -> Vec<NativeOption> {
        match self {
            ProxyDecision::Inherit => Vec::new(),
            ProxyDecision::NoProxy => vec![NativeOption::Proxy {
                access_type: AccessType::NoProxy,
                proxy: None,
                bypass: None,
            }],
            ProxyDecision::Named { proxy, credentials } => {
                let mut options = vec![NativeOption::Proxy {
                    access_type: AccessType::NamedProxy,
                    proxy: Some(proxy.clone()),
                    bypass: None,
                }];
                if let Some(credentials) = credentials {
                    options.push(NativeOption::ProxyUsername(
                        credentials.qualified_user_name(),
                    ));
                    options.push(NativeOption::ProxyPassword(credentials.password.clone()));
                }
                options
            }
        }
    }
}

/// Applies a proxy policy: one access type for the session, one decision
/// per request.
#[derive(Debug, Clone)]
pub struct ProxyResolver {
    policy: WindowsProxyUsePolicy,
    proxy: Option<Proxy>,
}

impl ProxyResolver {
    /// Fails when the policy and the configured proxy do not belong together.
    pub fn new(policy: WindowsProxyUsePolicy, proxy: Option<&Proxy>) -> Result<Self, ConfigError> {
        match (policy, proxy) {
            (WindowsProxyUsePolicy::UseCustomProxy, None) => Err(ConfigError::MissingProxy),
            (WindowsProxyUsePolicy::UseCustomProxy, Some(_)) | (_, None) => Ok(Self {
                policy,
                proxy: proxy.cloned(),
            }),
            (_, Some(_)) => Err(ConfigError::ProxyPolicyMismatch),
        }
    }

    pub fn session_access_type(&self) -> AccessType {
        match (self.policy, &self.proxy) {
            (WindowsProxyUsePolicy::DoNotUseProxy, _) => AccessType::NoProxy,
            (WindowsProxyUsePolicy::UseWinHttpProxy, _) => AccessType::DefaultProxy,
            (WindowsProxyUsePolicy::UseWinInetProxy, _) => AccessType::AutomaticProxy,
            (WindowsProxyUsePolicy::UseCustomProxy, Some(Proxy::SystemDefault)) => {
                AccessType::AutomaticProxy
            }
            (WindowsProxyUsePolicy::UseCustomProxy, _) => AccessType::NoProxy,
        }
    }

    pub fn decide(&self, destination: &Url) -> Result<ProxyDecision, ConfigError> {
        let Some(Proxy::Custom(proxy)) = &self.proxy else {
            return Ok(ProxyDecision::Inherit);
        };

        if proxy.is_bypassed(destination) {
            tracing::trace!(%destination, "proxy bypassed");
            return Ok(ProxyDecision::NoProxy);
        }

        let address = proxy
            .proxy_for(destination)
            .map_err(|err| ConfigError::ProxyResolution(err.to_string()))?;
        let Some(address) = address else {
            return Ok(ProxyDecision::NoProxy);
        };
        let Some(host) = address.host_str() else {
            return Err(ConfigError::ProxyResolution(format!(
                "proxy address has no host: {address}"
            )));
        };
        let proxy_string = match address.port() {
            Some(port) => format!("{}://{host}:{port}", address.scheme()),
            None => format!("{}://{host}", address.scheme()),
        };

        Ok(ProxyDecision::Named {
            proxy: proxy_string,
            credentials: proxy.credentials(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProxy;

    impl WebProxy for FailingProxy {
        fn proxy_for(&self, _destination: &Url) -> Result<Option<Url>, ProxyError> {
            Err("script failed".into())
        }

        fn is_bypassed(&self, _destination: &Url) -> bool {
            false
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn proxy() -> Proxy {
        Proxy::custom(
            StaticProxy::new(url("http://proxy.corp:3128"))
                .bypass("*.internal.corp")
                .bypass("localhost")
                .bypass("<local>"),
        )
    }

    #[test]
    fn test_session_access_types() {
        let cases = [
            (WindowsProxyUsePolicy::DoNotUseProxy, None, AccessType::NoProxy),
            (WindowsProxyUsePolicy::UseWinHttpProxy, None, AccessType::DefaultProxy),
            (WindowsProxyUsePolicy::UseWinInetProxy, None, AccessType::AutomaticProxy),
            (
                WindowsProxyUsePolicy::UseCustomProxy,
                Some(Proxy::SystemDefault),
                AccessType::AutomaticProxy,
            ),
            (WindowsProxyUsePolicy::UseCustomProxy, Some(proxy()), AccessType::NoProxy),
        ];
        for (policy, proxy, expected) in cases {
            let resolver = ProxyResolver::new(policy, proxy.as_ref()).unwrap();
            assert_eq!(resolver.session_access_type(), expected, "{policy:?}");
        }
    }

    #[test]
    fn test_pairing_errors() {
        assert_eq!(
            ProxyResolver::new(WindowsProxyUsePolicy::UseCustomProxy, None).unwrap_err(),
            ConfigError::MissingProxy
        );
        assert_eq!(
            ProxyResolver::new(WindowsProxyUsePolicy::DoNotUseProxy, Some(&proxy())).unwrap_err(),
            ConfigError::ProxyPolicyMismatch
        );
    }

    #[test]
    fn test_named_decision() {
        let resolver =
            ProxyResolver::new(WindowsProxyUsePolicy::UseCustomProxy, Some(&proxy())).unwrap();
        let decision = resolver.decide(&url("https://www.example.com/")).unwrap();
        assert_eq!(
            decision,
            ProxyDecision::Named {
                proxy: "http://proxy.corp:3128".into(),
                credentials: None,
            }
        );
    }

    #[test]
    fn test_default_port_left_out() {
        let custom = Proxy::custom(StaticProxy::new(url("http://proxy.contoso.com")));
        let resolver =
            ProxyResolver::new(WindowsProxyUsePolicy::UseCustomProxy, Some(&custom)).unwrap();
        let decision = resolver.decide(&url("http://example.com/")).unwrap();
        assert_eq!(
            decision,
            ProxyDecision::Named {
                proxy: "http://proxy.contoso.com".into(),
                credentials: None,
            }
        );

        let explicit = Proxy::custom(StaticProxy::new(url("http://proxy.contoso.com:80")));
        let resolver =
            ProxyResolver::new(WindowsProxyUsePolicy::UseCustomProxy, Some(&explicit)).unwrap();
        assert!(matches!(
            resolver.decide(&url("http://example.com/")).unwrap(),
            ProxyDecision::Named { proxy, .. } if proxy == "http://proxy.contoso.com"
        ));

        let resolver =
            ProxyResolver::new(WindowsProxyUsePolicy::UseCustomProxy, Some(&proxy())).unwrap();
        assert!(matches!(
            resolver.decide(&url("http://example.com/")).unwrap(),
            ProxyDecision::Named { proxy, .. } if proxy == "http://proxy.corp:3128"
        ));
    }

    #[test]
    fn test_bypass_decision() {
        let resolver =
            ProxyResolver::new(WindowsProxyUsePolicy::UseCustomProxy, Some(&proxy())).unwrap();
        for target in [
            "http://localhost/",
            "http://intranet/",
            "http://build.internal.corp/x",
        ] {
            assert_eq!(
                resolver.decide(&url(target)).unwrap(),
                ProxyDecision::NoProxy,
                "{target}"
            );
        }
        assert!(matches!(
            resolver.decide(&url("http://internal.corp.evil.com/")).unwrap(),
            ProxyDecision::Named { .. }
        ));
        assert_eq!(
            ProxyDecision::NoProxy.options(),
            vec![NativeOption::Proxy {
                access_type: AccessType::NoProxy,
                proxy: None,
                bypass: None,
            }]
        );
    }

    #[test]
    fn test_system_default_inherits() {
        let resolver = ProxyResolver::new(
            WindowsProxyUsePolicy::UseCustomProxy,
            Some(&Proxy::SystemDefault),
        )
        .unwrap();
        let decision = resolver.decide(&url("http://example.com/")).unwrap();
        assert_eq!(decision, ProxyDecision::Inherit);
        assert!(decision.options().is_empty());
    }

    #[test]
    fn test_resolution_failure() {
        let resolver = ProxyResolver::new(
            WindowsProxyUsePolicy::UseCustomProxy,
            Some(&Proxy::custom(FailingProxy)),
        )
        .unwrap();
        assert!(matches!(
            resolver.decide(&url("http://example.com/")),
            Err(ConfigError::ProxyResolution(msg)) if msg == "script failed"
        ));
    }

    #[test]
    fn test_proxy_credentials_options() {
        let decision = ProxyDecision::Named {
            proxy: "http://proxy:8080".into(),
            credentials: Some(NetworkCredential::new("u", "p").with_domain("d")),
        };
        let options = decision.options();
        assert_eq!(options.len(), 3);
        assert_eq!(options[1], NativeOption::ProxyUsername("d\\u".into()));
        assert_eq!(options[2], NativeOption::ProxyPassword("p".into()));
    }
}
