//! Native constants and type-safe flag wrappers.
//!
//! The numeric values match the WinHTTP C headers, so the same option set can
//! be recorded by a test transport on any platform and forwarded verbatim to
//! `WinHttpSetOption` on Windows.
//!
//! ## Flag types
//!
//! - [`SslProtocols`]: TLS versions the caller allows (SChannel values)
//! - [`DecompressionMethods`]: response decoders the caller wants
//! - [`SecureProtocol`]: native secure-protocol flags
//! - [`DecompressionFlags`]: native decompression flags
//! - [`DisableFlags`] / [`EnableFlags`]: native feature switches
//! - [`AuthScheme`] / [`AuthTarget`]: authentication schemes and targets
//!
//! All flag types implement bitwise OR (`|`, `|=`) and AND (`&`, `&=`) and
//! convert to/from `u32` via [`From`]/[`Into`].

// Option identifiers (WINHTTP_OPTION_*)
pub const WINHTTP_OPTION_SEND_TIMEOUT: u32 = 5;
pub const WINHTTP_OPTION_RECEIVE_TIMEOUT: u32 = 6;
pub const WINHTTP_OPTION_RECEIVE_RESPONSE_TIMEOUT: u32 = 7;
pub const WINHTTP_OPTION_PROXY: u32 = 38;
pub const WINHTTP_OPTION_CONTEXT_VALUE: u32 = 45;
pub const WINHTTP_OPTION_CLIENT_CERT_CONTEXT: u32 = 47;
pub const WINHTTP_OPTION_DISABLE_FEATURE: u32 = 63;
pub const WINHTTP_OPTION_MAX_CONNS_PER_SERVER: u32 = 73;
pub const WINHTTP_OPTION_AUTOLOGON_POLICY: u32 = 77;
pub const WINHTTP_OPTION_ENABLE_FEATURE: u32 = 79;
pub const WINHTTP_OPTION_SECURE_PROTOCOLS: u32 = 84;
pub const WINHTTP_OPTION_REDIRECT_POLICY: u32 = 88;
pub const WINHTTP_OPTION_MAX_HTTP_AUTOMATIC_REDIRECTS: u32 = 89;
pub const WINHTTP_OPTION_MAX_RESPONSE_HEADER_SIZE: u32 = 91;
pub const WINHTTP_OPTION_MAX_RESPONSE_DRAIN_SIZE: u32 = 92;
pub const WINHTTP_OPTION_DECOMPRESSION: u32 = 118;
pub const WINHTTP_OPTION_TCP_KEEPALIVE: u32 = 152;
pub const WINHTTP_OPTION_PROXY_USERNAME: u32 = 0x1002;
pub const WINHTTP_OPTION_PROXY_PASSWORD: u32 = 0x1003;

// Secure protocol flags (for WINHTTP_OPTION_SECURE_PROTOCOLS)
pub const WINHTTP_FLAG_SECURE_PROTOCOL_SSL2: u32 = 0x0000_0008;
pub const WINHTTP_FLAG_SECURE_PROTOCOL_SSL3: u32 = 0x0000_0020;
pub const WINHTTP_FLAG_SECURE_PROTOCOL_TLS1: u32 = 0x0000_0080;
pub const WINHTTP_FLAG_SECURE_PROTOCOL_TLS1_1: u32 = 0x0000_0200;
pub const WINHTTP_FLAG_SECURE_PROTOCOL_TLS1_2: u32 = 0x0000_0800;
pub const WINHTTP_FLAG_SECURE_PROTOCOL_TLS1_3: u32 = 0x0000_2000;

// Decompression flags (for WINHTTP_OPTION_DECOMPRESSION)
pub const WINHTTP_DECOMPRESSION_FLAG_GZIP: u32 = 0x0000_0001;
pub const WINHTTP_DECOMPRESSION_FLAG_DEFLATE: u32 = 0x0000_0002;

// Feature flags (for WINHTTP_OPTION_DISABLE_FEATURE / ENABLE_FEATURE)
pub const WINHTTP_DISABLE_COOKIES: u32 = 0x0000_0001;
pub const WINHTTP_DISABLE_REDIRECTS: u32 = 0x0000_0002;
pub const WINHTTP_DISABLE_AUTHENTICATION: u32 = 0x0000_0004;
pub const WINHTTP_DISABLE_KEEP_ALIVE: u32 = 0x0000_0008;
pub const WINHTTP_ENABLE_SSL_REVOCATION: u32 = 0x0000_0001;

// Redirect policy values (for WINHTTP_OPTION_REDIRECT_POLICY)
pub const WINHTTP_OPTION_REDIRECT_POLICY_NEVER: u32 = 0;
pub const WINHTTP_OPTION_REDIRECT_POLICY_DISALLOW_HTTPS_TO_HTTP: u32 = 1;
pub const WINHTTP_OPTION_REDIRECT_POLICY_ALWAYS: u32 = 2;

// Autologon policy values (for WINHTTP_OPTION_AUTOLOGON_POLICY)
pub const WINHTTP_AUTOLOGON_SECURITY_LEVEL_LOW: u32 = 1;
pub const WINHTTP_AUTOLOGON_SECURITY_LEVEL_HIGH: u32 = 2;

// Access types (for WinHttpOpen and WINHTTP_OPTION_PROXY)
pub const WINHTTP_ACCESS_TYPE_DEFAULT_PROXY: u32 = 0;
pub const WINHTTP_ACCESS_TYPE_NO_PROXY: u32 = 1;
pub const WINHTTP_ACCESS_TYPE_NAMED_PROXY: u32 = 3;
pub const WINHTTP_ACCESS_TYPE_AUTOMATIC_PROXY: u32 = 4;

// Authentication schemes and targets
pub const WINHTTP_AUTH_SCHEME_BASIC: u32 = 0x0000_0001;
pub const WINHTTP_AUTH_SCHEME_NTLM: u32 = 0x0000_0002;
pub const WINHTTP_AUTH_SCHEME_DIGEST: u32 = 0x0000_0008;
pub const WINHTTP_AUTH_SCHEME_NEGOTIATE: u32 = 0x0000_0010;
pub const WINHTTP_AUTH_TARGET_SERVER: u32 = 0x0000_0000;
pub const WINHTTP_AUTH_TARGET_PROXY: u32 = 0x0000_0001;

/// Passed as the total length to `WinHttpSendRequest` for chunked uploads.
pub const WINHTTP_IGNORE_REQUEST_TOTAL_LENGTH: u32 = 0;

// Native error codes (ERROR_WINHTTP_*)
pub const ERROR_WINHTTP_TIMEOUT: u32 = 12002;
pub const ERROR_WINHTTP_OPERATION_CANCELLED: u32 = 12017;
pub const ERROR_WINHTTP_INCORRECT_HANDLE_TYPE: u32 = 12018;
pub const ERROR_WINHTTP_CANNOT_CONNECT: u32 = 12029;
pub const ERROR_WINHTTP_INVALID_SERVER_RESPONSE: u32 = 12152;

/// Macro to generate a bitflag-style newtype wrapping `u32`.
///
/// The generated type supports `|`, `|=`, `&`, `&=`, `==`, `Debug`,
/// `Clone`, `Copy`, `Default`, `Hash`, and converts to/from `u32`.
macro_rules! bitflags_u32 {
    (
        $(#[$outer:meta])*
        $vis:vis struct $Name:ident;

        $(
            $(#[$inner:meta])*
            const $FLAG:ident = $value:expr;
        )*
    ) => {
        $(#[$outer])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(transparent)]
        $vis struct $Name(pub u32);

        impl $Name {
            $(
                $(#[$inner])*
                pub const $FLAG: Self = Self($value);
            )*

            /// The empty set.
            pub const NONE: Self = Self(0);

            /// Returns `true` if no flags are set.
            #[inline]
            pub const fn is_empty(self) -> bool { self.0 == 0 }

            /// Returns `true` if all flags in `other` are set in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            /// Returns the raw `u32` value.
            #[inline]
            pub const fn bits(self) -> u32 { self.0 }
        }

        impl ::std::fmt::Debug for $Name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut first = true;
                f.write_str(concat!(stringify!($Name), "("))?;
                $(
                    if self.contains(Self::$FLAG) && Self::$FLAG.0 != 0 {
                        if !first { f.write_str(" | ")?; }
                        f.write_str(stringify!($FLAG))?;
                        first = false;
                    }
                )*
                if first { write!(f, "0x{:08X}", self.0)?; }
                f.write_str(")")
            }
        }

        impl ::std::ops::BitOr for $Name {
            type Output = Self;
            #[inline]
            fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
        }

        impl ::std::ops::BitOrAssign for $Name {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
        }

        impl ::std::ops::BitAnd for $Name {
            type Output = Self;
            #[inline]
            fn bitand(self, rhs: Self) -> Self { Self(self.0 & rhs.0) }
        }

        impl ::std::ops::BitAndAssign for $Name {
            #[inline]
            fn bitand_assign(&mut self, rhs: Self) { self.0 &= rhs.0; }
        }

        impl From<u32> for $Name {
            #[inline]
            fn from(val: u32) -> Self { Self(val) }
        }

        impl From<$Name> for u32 {
            #[inline]
            fn from(val: $Name) -> u32 { val.0 }
        }
    };
}

bitflags_u32! {
    /// TLS/SSL protocol versions a handler may negotiate.
    ///
    /// Values follow the SChannel `SP_PROT_*` client|server pairs. The empty
    /// set means "use the platform default" and applies no override.
    pub struct SslProtocols;

    /// SSL 2.0 (insecure).
    const SSL2 = 0x0000_000C;
    /// SSL 3.0 (insecure).
    const SSL3 = 0x0000_0030;
    /// TLS 1.0.
    const TLS = 0x0000_00C0;
    /// TLS 1.1.
    const TLS11 = 0x0000_0300;
    /// TLS 1.2.
    const TLS12 = 0x0000_0C00;
    /// TLS 1.3.
    const TLS13 = 0x0000_3000;
}

bitflags_u32! {
    /// Content decoders applied to responses.
    pub struct DecompressionMethods;

    /// gzip.
    const GZIP = 0x0000_0001;
    /// deflate.
    const DEFLATE = 0x0000_0002;
    /// gzip and deflate.
    const ALL = 0x0000_0003;
}

bitflags_u32! {
    /// Native TLS/SSL protocol version flags.
    pub struct SecureProtocol;

    const SSL2 = WINHTTP_FLAG_SECURE_PROTOCOL_SSL2;
    const SSL3 = WINHTTP_FLAG_SECURE_PROTOCOL_SSL3;
    const TLS1_0 = WINHTTP_FLAG_SECURE_PROTOCOL_TLS1;
    const TLS1_1 = WINHTTP_FLAG_SECURE_PROTOCOL_TLS1_1;
    const TLS1_2 = WINHTTP_FLAG_SECURE_PROTOCOL_TLS1_2;
    const TLS1_3 = WINHTTP_FLAG_SECURE_PROTOCOL_TLS1_3;
}

bitflags_u32! {
    /// Native automatic response decompression flags.
    pub struct DecompressionFlags;

    const GZIP = WINHTTP_DECOMPRESSION_FLAG_GZIP;
    const DEFLATE = WINHTTP_DECOMPRESSION_FLAG_DEFLATE;
}

bitflags_u32! {
    /// Native feature disable flags.
    pub struct DisableFlags;

    /// Disable automatic cookie handling.
    const COOKIES = WINHTTP_DISABLE_COOKIES;
    /// Disable automatic redirect following.
    const REDIRECTS = WINHTTP_DISABLE_REDIRECTS;
    /// Disable automatic authentication.
    const AUTHENTICATION = WINHTTP_DISABLE_AUTHENTICATION;
    /// Disable HTTP keep-alive connections.
    const KEEP_ALIVE = WINHTTP_DISABLE_KEEP_ALIVE;
}

bitflags_u32! {
    /// Native feature enable flags.
    pub struct EnableFlags;

    /// Check server certificates against their revocation lists.
    const SSL_REVOCATION = WINHTTP_ENABLE_SSL_REVOCATION;
}

bitflags_u32! {
    /// Authentication scheme flags.
    pub struct AuthScheme;

    /// HTTP Basic authentication.
    const BASIC = WINHTTP_AUTH_SCHEME_BASIC;
    /// NTLM authentication.
    const NTLM = WINHTTP_AUTH_SCHEME_NTLM;
    /// HTTP Digest authentication (RFC 2617).
    const DIGEST = WINHTTP_AUTH_SCHEME_DIGEST;
    /// Negotiate (SPNEGO), selecting between Kerberos and NTLM.
    const NEGOTIATE = WINHTTP_AUTH_SCHEME_NEGOTIATE;
}

impl AuthScheme {
    /// Picks the strongest single scheme out of a supported set.
    ///
    /// Preference order: Negotiate, NTLM, Digest, Basic. Any other bit the
    /// server offers is ignored.
    #[must_use]
    pub fn strongest(self) -> Option<Self> {
        [Self::NEGOTIATE, Self::NTLM, Self::DIGEST, Self::BASIC]
            .into_iter()
            .find(|scheme| self.contains(*scheme))
    }
}

/// Authentication target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AuthTarget {
    /// Authenticate with the destination server.
    Server = WINHTTP_AUTH_TARGET_SERVER,
    /// Authenticate with the proxy server.
    Proxy = WINHTTP_AUTH_TARGET_PROXY,
}

/// Redirect policy for HTTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RedirectPolicy {
    /// Never follow redirects.
    Never = WINHTTP_OPTION_REDIRECT_POLICY_NEVER,
    /// Follow redirects, but disallow HTTPS-to-HTTP downgrades.
    DisallowHttpsToHttp = WINHTTP_OPTION_REDIRECT_POLICY_DISALLOW_HTTPS_TO_HTTP,
    /// Always follow redirects.
    Always = WINHTTP_OPTION_REDIRECT_POLICY_ALWAYS,
}

impl From<RedirectPolicy> for u32 {
    #[inline]
    fn from(val: RedirectPolicy) -> u32 {
        val as u32
    }
}

/// Autologon security level for NTLM/Negotiate authentication. Left unset,
/// the platform sends default credentials to intranet servers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AutologonPolicy {
    /// Send default credentials to all servers.
    Low = WINHTTP_AUTOLOGON_SECURITY_LEVEL_LOW,
    /// Never automatically send default credentials.
    High = WINHTTP_AUTOLOGON_SECURITY_LEVEL_HIGH,
}

impl From<AutologonPolicy> for u32 {
    #[inline]
    fn from(val: AutologonPolicy) -> u32 {
        val as u32
    }
}

/// Proxy access type of a session or request handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AccessType {
    /// The platform's configured default proxy.
    DefaultProxy = WINHTTP_ACCESS_TYPE_DEFAULT_PROXY,
    /// Resolve names directly.
    NoProxy = WINHTTP_ACCESS_TYPE_NO_PROXY,
    /// An explicitly named proxy.
    NamedProxy = WINHTTP_ACCESS_TYPE_NAMED_PROXY,
    /// Automatic proxy discovery (WPAD / PAC / per-user settings).
    AutomaticProxy = WINHTTP_ACCESS_TYPE_AUTOMATIC_PROXY,
}

impl From<AccessType> for u32 {
    #[inline]
    fn from(val: AccessType) -> u32 {
        val as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_ops() {
        let mut flags = SslProtocols::TLS12;
        flags |= SslProtocols::TLS13;
        assert!(flags.contains(SslProtocols::TLS12));
        assert!(flags.contains(SslProtocols::TLS13));
        assert!(!flags.contains(SslProtocols::TLS));
        assert!((flags & SslProtocols::TLS).is_empty());
        assert!(SslProtocols::NONE.is_empty());
    }

    #[test]
    fn test_flag_debug() {
        let flags = DisableFlags::COOKIES | DisableFlags::REDIRECTS;
        assert_eq!(format!("{flags:?}"), "DisableFlags(COOKIES | REDIRECTS)");
        assert_eq!(format!("{:?}", DisableFlags::NONE), "DisableFlags(0x00000000)");
    }

    #[test]
    fn test_strongest_auth_scheme() {
        let offered = AuthScheme::BASIC | AuthScheme::NTLM | AuthScheme::DIGEST;
        assert_eq!(offered.strongest(), Some(AuthScheme::NTLM));
        assert_eq!(AuthScheme::BASIC.strongest(), Some(AuthScheme::BASIC));
        assert_eq!(AuthScheme(0x0000_0004).strongest(), None);
        assert_eq!(
            (AuthScheme(0x0000_0004) | AuthScheme::DIGEST).strongest(),
            Some(AuthScheme::DIGEST)
        );
    }

    #[test]
    fn test_enum_values() {
        assert_eq!(u32::from(RedirectPolicy::Never), 0);
        assert_eq!(u32::from(RedirectPolicy::DisallowHttpsToHttp), 1);
        assert_eq!(u32::from(AccessType::AutomaticProxy), 4);
        assert_eq!(u32::from(AutologonPolicy::Low), 1);
        assert_eq!(u32::from(AutologonPolicy::High), 2);
    }
}
