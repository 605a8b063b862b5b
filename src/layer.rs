use std::sync::Arc;

use http::{HeaderMap, Method, Uri};
use regex::Regex;
use tower_cookies::CookieManager;
use tower_layer::Layer;

use crate::{
    cipher::{self, Algorithm, IV_LEN},
    driver::CsrfDriver,
    envelope::DEFAULT_EXPIRES_IN_MINUTES,
    error::Error,
    guard::CsrfGuard,
};

pub(crate) const DEFAULT_HEADER_NAME: &str = "x-csrf-jwt";

/// An owned snapshot of the inbound request head, taken before the inner
/// service consumes the request. Configuration callbacks see this view.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

pub(crate) type UserTokenFn = Arc<dyn Fn(&RequestHead) -> Option<String> + Send + Sync>;
pub(crate) type CookieDomainFn = Arc<dyn Fn(&RequestHead) -> Option<String> + Send + Sync>;

/// A pattern exempting request paths from verification.
///
/// Strings match by substring, regexes by `is_match`; both are tested
/// against the path portion before any query or fragment.
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    Path(String),
    Pattern(Regex),
}

impl ExcludePattern {
    pub(crate) fn matches(&self, path: &str) -> bool {
        match self {
            Self::Path(fragment) => path.contains(fragment.as_str()),
            Self::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl From<&str> for ExcludePattern {
    fn from(path: &str) -> Self {
        Self::Path(path.to_owned())
    }
}

impl From<String> for ExcludePattern {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<Regex> for ExcludePattern {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) secret: String,
    pub(crate) algorithm: Algorithm,
    pub(crate) iv: [u8; IV_LEN],
    pub(crate) expires_in_minutes: u64,
    pub(crate) driver: CsrfDriver,
    pub(crate) header_name: String,
    pub(crate) exclude_urls: Vec<ExcludePattern>,
    pub(crate) base_url: Option<String>,
    pub(crate) user_token: Option<UserTokenFn>,
    pub(crate) cookie_domain: Option<CookieDomainFn>,
    pub(crate) secure: bool,
}

impl Config {
    pub(crate) fn resolve_user_token(&self, head: &RequestHead) -> Option<String> {
        self.user_token.as_ref().and_then(|resolve| resolve(head))
    }

    /// GET-like methods and excluded paths skip verification entirely.
    pub(crate) fn is_exempt(&self, head: &RequestHead) -> bool {
        if [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(&head.method) {
            return true;
        }

        let path = head.uri.path();

        self.exclude_urls
            .iter()
            .any(|pattern| pattern.matches(path))
    }

    /// Fold the configured base URL into the string exclusion patterns.
    fn apply_base_url(&mut self) {
        if let Some(base_url) = self.base_url.take() {
            for pattern in &mut self.exclude_urls {
                if let ExcludePattern::Path(path) = pattern {
                    *path = format!("{base_url}{path}");
                }
            }
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.driver.requires_identity() && self.user_token.is_none() {
            return Err(Error::MissingUserTokenResolver(self.driver));
        }

        let expected = self.algorithm.key_len();
        if self.secret.len() != expected {
            return Err(Error::SecretLength {
                algorithm: self.algorithm,
                expected,
                actual: self.secret.len(),
            });
        }

        Ok(())
    }
}

/// The CSRF protection layer.
///
/// Wraps a service in the verification orchestrator and a
/// [`CookieManager`]: mutating requests are checked against the configured
/// strategy, and every response leaves with a fresh token set.
///
/// The secret doubles as the envelope signing key and the cipher key;
/// pre-hash it to the algorithm's key length (32 bytes for the default).
///
/// Mounting the layer validates the configuration: a secret of the wrong
/// length, or an authenticated driver without a [`user_token`] resolver,
/// panics at startup rather than surfacing per request.
///
/// [`user_token`]: JwtCsrf::user_token
#[derive(Clone)]
pub struct JwtCsrf {
    config: Config,
}

impl JwtCsrf {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            config: Config {
                secret: secret.into(),
                algorithm: Algorithm::default(),
                iv: cipher::default_iv(),
                expires_in_minutes: DEFAULT_EXPIRES_IN_MINUTES,
                driver: CsrfDriver::default(),
                header_name: DEFAULT_HEADER_NAME.into(),
                exclude_urls: Vec::new(),
                base_url: None,
                user_token: None,
                cookie_domain: None,
                secure: true,
            },
        }
    }

    /// Override the cipher algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.algorithm = algorithm;

        self
    }

    /// Override the process-wide IV. Share a fixed IV across processes when
    /// more than one process verifies the same tokens.
    pub fn iv(mut self, iv: [u8; IV_LEN]) -> Self {
        self.config.iv = iv;

        self
    }

    /// Envelope lifetime in minutes. Defaults to 60.
    pub fn expires_in_minutes(mut self, minutes: u64) -> Self {
        self.config.expires_in_minutes = minutes;

        self
    }

    /// The verification strategy for tokens this layer generates. Defaults
    /// to [`CsrfDriver::DoubleSubmit`].
    pub fn driver(mut self, driver: CsrfDriver) -> Self {
        self.config.driver = driver;

        self
    }

    /// The header name tokens travel under; also the cookie name. Defaults
    /// to `x-csrf-jwt`.
    pub fn header_name(mut self, header_name: impl Into<String>) -> Self {
        self.config.header_name = header_name.into();

        self
    }

    /// Exempt request paths matching `pattern` from verification.
    pub fn exclude_url(mut self, pattern: impl Into<ExcludePattern>) -> Self {
        self.config.exclude_urls.push(pattern.into());

        self
    }

    /// Exempt request paths matching any of `patterns` from verification.
    pub fn exclude_urls<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ExcludePattern>,
    {
        self.config
            .exclude_urls
            .extend(patterns.into_iter().map(Into::into));

        self
    }

    /// Prefix applied to every string exclusion pattern. Regex patterns are
    /// matched as given.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());

        self
    }

    /// How to resolve the caller's identity from a request, e.g. out of a
    /// session or bearer header. Required for [`CsrfDriver::AuthedToken`]
    /// and [`CsrfDriver::AuthedDoubleSubmit`].
    pub fn user_token<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&RequestHead) -> Option<String> + Send + Sync + 'static,
    {
        self.config.user_token = Some(Arc::new(resolve));

        self
    }

    /// Override cookie domain resolution. By default the domain is the
    /// request host without its port, dot-prefixed.
    pub fn cookie_domain<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&RequestHead) -> Option<String> + Send + Sync + 'static,
    {
        self.config.cookie_domain = Some(Arc::new(resolve));

        self
    }

    /// Whether the token cookie is `Secure`. Defaults to true; disable for
    /// plain-HTTP deployments.
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;

        self
    }
}

impl<S> Layer<S> for JwtCsrf {
    type Service = CookieManager<CsrfGuard<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        let mut config = self.config.clone();
        config.apply_base_url();

        if let Err(err) = config.validate() {
            panic!("tower-jwt-csrf misconfigured: {err}");
        }

        CookieManager::new(CsrfGuard::new(Arc::new(config), inner))
    }
}
