use std::{
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body_util::BodyExt;
use tower_cookies::Cookies;
use tower_service::Service;

use crate::{
    driver::CsrfDriver,
    envelope,
    error::{Error, VerificationError},
    layer::{Config, RequestHead},
    payload::{ChannelTokens, TokenPayload},
    persist::PersistenceDriver,
    token::Token,
};

/// The caller's identity as resolved by downstream processing, e.g. a login
/// handler. When present in the response extensions it overrides the
/// request-derived identity during token refresh, so the refreshed token is
/// bound to whoever the response says the caller now is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity(pub String);

/// The envelopes dropped on an outbound response, for downstream layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedTokens {
    pub header: Option<String>,
    pub cookie: Option<String>,
}

/// The verification orchestrator.
///
/// Per request: decide exemption, read and unpack the channel tokens the
/// governing strategy declares, verify, and — whatever the outcome short of
/// a hard fault — refresh the token set on the outbound response.
#[derive(Clone)]
pub struct CsrfGuard<S> {
    config: Arc<Config>,
    inner: S,
}

impl<S> CsrfGuard<S> {
    pub(crate) fn new(config: Arc<Config>, inner: S) -> Self {
        Self { config, inner }
    }
}

impl<S, Q, R> Service<Request<Q>> for CsrfGuard<S>
where
    S: Service<Request<Q>, Response = Response<R>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Q: http_body::Body + From<Bytes> + Send + 'static,
    Q::Data: Send,
    Q::Error: std::fmt::Display,
    R: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Q>) -> Self::Future {
        let config = self.config.clone();

        let cookies = match request
            .extensions()
            .get::<Cookies>()
            .cloned()
            .ok_or(Error::ExtensionNotFound("Cookies".into()))
        {
            Ok(cookies) => cookies,
            Err(err) => return Box::pin(async move { Error::make_layer_error(err) }),
        };

        let head = Arc::new(RequestHead {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        });

        request.extensions_mut().insert(Token {
            config: config.clone(),
            head: head.clone(),
        });

        // Swap in a fresh clone; `self.inner` was the one driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut rejection = None;

            if config.is_exempt(&head) {
                tracing::debug!(path = head.uri.path(), "csrf verification skipped");
            } else {
                // The body is only buffered when the header itself carries
                // no token, to give the `meta` fallback a chance.
                let mut body_token = None;

                if header_token_absent(&head, &config) {
                    let (parts, body) = request.into_parts();

                    let bytes = match body.collect().await {
                        Ok(collected) => collected.to_bytes(),
                        Err(err) => {
                            return Error::make_layer_error(Error::BodyRead(err.to_string()))
                        }
                    };

                    body_token = meta_token(&bytes, &config.header_name);
                    request = Request::from_parts(parts, Q::from(bytes));
                }

                match verify(&head, body_token.as_deref(), &cookies, &config) {
                    Ok(()) => {}
                    Err(Error::Verification(err)) => rejection = Some(err),
                    Err(fault) => return Error::make_layer_error(fault),
                }
            }

            let mut response = match rejection {
                Some(err) => Error::make_rejection(err),
                None => inner.call(request).await?,
            };

            // Refresh runs last so it sees the final downstream state, and
            // unconditionally so even rejections carry a usable token set.
            if let Err(fault) = refresh_tokens(&head, &cookies, &mut response, &config) {
                return Error::make_layer_error(fault);
            }

            Ok(response)
        })
    }
}

fn header_token_absent(head: &RequestHead, config: &Config) -> bool {
    head.headers
        .get(config.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .filter(|envelope| !envelope.is_empty())
        .is_none()
}

/// Pull `meta.<headerName>` out of a buffered JSON body, the fallback
/// transport for header-bound tokens.
fn meta_token(body: &[u8], header_name: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;

    value
        .get("meta")?
        .get(header_name)?
        .as_str()
        .map(str::to_owned)
}

/// Retrieve and unpack one channel's token. Absent channels produce the
/// empty payload. A token naming a different channel than the one it was
/// read from is rejected.
fn read(
    channel: PersistenceDriver,
    head: &RequestHead,
    body_token: Option<&str>,
    cookies: &Cookies,
    config: &Config,
) -> Result<TokenPayload, Error> {
    let Some(envelope) = channel.retrieve(head, body_token, cookies, config)? else {
        return Ok(TokenPayload::default());
    };

    let payload = envelope::unpack(&envelope, &config.secret, config.algorithm, &config.iv)?;

    if let Some(declared) = payload.persistence_driver.as_deref() {
        if declared != channel.name() {
            return Err(VerificationError::new(format!(
                "GOT_{}_EXPECTED_{}",
                declared.to_uppercase(),
                channel.name().to_uppercase()
            ))
            .into());
        }
    }

    Ok(payload)
}

/// Unpack the header token, route to the strategy it names, assemble the
/// channel token set, and run the strategy's verifier.
fn verify(
    head: &RequestHead,
    body_token: Option<&str>,
    cookies: &Cookies,
    config: &Config,
) -> Result<(), Error> {
    let header = read(PersistenceDriver::Header, head, body_token, cookies, config)?;

    // Strategy identity comes from the decoded header token alone; the
    // cookie's declared strategy is never consulted.
    let driver = CsrfDriver::from_name(header.csrf_driver.as_deref());

    let mut tokens = ChannelTokens::default();

    for channel in driver.persists_to() {
        match channel {
            PersistenceDriver::Header => tokens.header = header.clone(),
            PersistenceDriver::Cookie => {
                tokens.cookie = read(*channel, head, body_token, cookies, config)?;
            }
        }
    }

    let identity = config.resolve_user_token(head);

    driver
        .verify(&tokens, identity.as_deref())
        .map_err(Error::from)
}

/// Regenerate tokens for the configured strategy and write them through
/// every channel it persists to.
fn refresh_tokens<R>(
    head: &RequestHead,
    cookies: &Cookies,
    response: &mut Response<R>,
    config: &Config,
) -> Result<(), Error> {
    let identity = response
        .extensions()
        .get::<UserIdentity>()
        .map(|identity| identity.0.clone())
        .or_else(|| config.resolve_user_token(head));

    let base = config.driver.generate(identity.as_deref());
    let mut issued = IssuedTokens::default();

    for channel in config.driver.persists_to() {
        let payload = TokenPayload {
            csrf_driver: Some(config.driver.name().to_owned()),
            persistence_driver: Some(channel.name().to_owned()),
            ..base.clone()
        };

        let envelope = envelope::pack(
            &payload,
            &config.secret,
            config.algorithm,
            &config.iv,
            config.expires_in_minutes,
        )?;

        match channel {
            PersistenceDriver::Header => issued.header = Some(envelope.clone()),
            PersistenceDriver::Cookie => issued.cookie = Some(envelope.clone()),
        }

        channel.drop(head, cookies, response.headers_mut(), config, envelope)?;
    }

    response.extensions_mut().insert(issued);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_token_reads_the_configured_name() {
        let body = br#"{"meta":{"x-csrf-jwt":"envelope"},"amount":5}"#;

        assert_eq!(
            meta_token(body, "x-csrf-jwt").as_deref(),
            Some("envelope")
        );
        assert_eq!(meta_token(body, "x-other"), None);
    }

    #[test]
    fn meta_token_tolerates_non_json_bodies() {
        assert_eq!(meta_token(b"amount=5", "x-csrf-jwt"), None);
        assert_eq!(meta_token(b"", "x-csrf-jwt"), None);
        assert_eq!(meta_token(br#"{"meta":"flat"}"#, "x-csrf-jwt"), None);
    }
}
