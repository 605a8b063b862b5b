//! Persistence drivers: where a packed token lives on the wire.
//!
//! Each driver knows how to write an envelope into an outbound response and
//! read one back out of an inbound request. Verification works on whatever
//! the drivers hand back; nothing is stored server-side.

use hmac::Mac;
use http::{
    header::{HeaderName, HeaderValue, HOST},
    HeaderMap,
};
use tower_cookies::{
    cookie::time::{Duration, OffsetDateTime},
    Cookie, Cookies,
};

use crate::{
    error::{Error, VerificationError},
    layer::{Config, RequestHead},
    HmacSha256,
};

/// The closed set of channels a token can travel in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceDriver {
    Header,
    Cookie,
}

impl PersistenceDriver {
    /// Wire name, as carried in the `persistenceDriver` payload field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }

    /// Write an envelope into the outbound response.
    pub(crate) fn drop(
        &self,
        head: &RequestHead,
        cookies: &Cookies,
        headers: &mut HeaderMap,
        config: &Config,
        envelope: String,
    ) -> Result<(), Error> {
        match self {
            Self::Header => {
                let name = HeaderName::from_bytes(config.header_name.as_bytes())?;
                let hash_name =
                    HeaderName::from_bytes(format!("{}-hash", config.header_name).as_bytes())?;

                headers.insert(hash_name, HeaderValue::from_str(&hash(&config.secret, &envelope)?)?);
                headers.insert(name, HeaderValue::from_str(&envelope)?);
            }
            Self::Cookie => {
                let mut cookie = Cookie::build((config.header_name.clone(), envelope))
                    .path("/")
                    .http_only(true)
                    .secure(config.secure)
                    // A week, independent of the envelope's own expiry.
                    .expires(OffsetDateTime::now_utc() + Duration::weeks(1));

                if let Some(domain) = cookie_domain(head, config) {
                    cookie = cookie.domain(domain);
                }

                cookies.add(cookie.build());
            }
        }

        Ok(())
    }

    /// Read an envelope out of the inbound request, or report its absence.
    ///
    /// `body_token` is the `meta.<headerName>` value of a buffered JSON
    /// body, the fallback transport for header-bound tokens.
    pub(crate) fn retrieve(
        &self,
        head: &RequestHead,
        body_token: Option<&str>,
        cookies: &Cookies,
        config: &Config,
    ) -> Result<Option<String>, Error> {
        match self {
            Self::Header => retrieve_header(head, body_token, config),
            Self::Cookie => Ok(cookies
                .get(&config.header_name)
                .map(|cookie| cookie.value().to_owned())
                .filter(|envelope| !envelope.is_empty())),
        }
    }
}

fn retrieve_header(
    head: &RequestHead,
    body_token: Option<&str>,
    config: &Config,
) -> Result<Option<String>, Error> {
    let header_token = head
        .headers
        .get(config.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .filter(|envelope| !envelope.is_empty());

    if let Some(envelope) = header_token {
        return Ok(Some(envelope.to_owned()));
    }

    let Some(body_token) = body_token else {
        return Ok(None);
    };

    // A body-borne token is only trusted when its companion hash header
    // verifies under the shared secret.
    let hash_name = format!("{}-hash", config.header_name);
    let Some(provided) = head
        .headers
        .get(hash_name.as_str())
        .and_then(|value| value.to_str().ok())
    else {
        return Err(VerificationError::new("BODY_CSRF_HASH_HEADER_MISSING").into());
    };

    if provided != hash(&config.secret, body_token)? {
        return Err(VerificationError::new("BODY_CSRF_HASH_MISMATCH").into());
    }

    Ok(Some(body_token.to_owned()))
}

/// Hex HMAC-SHA256 of `text` under the shared secret.
pub(crate) fn hash(secret: &str, text: &str) -> Result<String, Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(text.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn cookie_domain(head: &RequestHead, config: &Config) -> Option<String> {
    match &config.cookie_domain {
        Some(resolve) => resolve(head),
        None => resolve_domain(head),
    }
}

/// The request host without any port, dot-prefixed: `".mysite.com"`.
fn resolve_domain(head: &RequestHead) -> Option<String> {
    let host = match head.uri.host() {
        Some(host) => host.to_owned(),
        None => head
            .headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())?
            .to_owned(),
    };
    let domain = host.split(':').next().unwrap_or(host.as_str());

    Some(format!(".{domain}"))
}
