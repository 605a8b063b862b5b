use std::sync::Arc;

use crate::{
    envelope,
    error::Error,
    layer::{Config, RequestHead},
    persist::PersistenceDriver,
};

/// A per-request handle for issuing header-channel tokens on demand.
///
/// The layer inserts one into every request's extensions. Handlers that
/// render pages or answer out-of-band clients can [`issue`](Token::issue) an
/// envelope to embed, instead of waiting for the response headers.
#[derive(Clone)]
pub struct Token {
    pub(crate) config: Arc<Config>,
    pub(crate) head: Arc<RequestHead>,
}

impl Token {
    /// Pack a fresh header-channel envelope for the configured strategy.
    pub fn issue(&self) -> Result<String, Error> {
        let identity = self.config.resolve_user_token(&self.head);

        let mut payload = self.config.driver.generate(identity.as_deref());
        payload.csrf_driver = Some(self.config.driver.name().to_owned());
        payload.persistence_driver = Some(PersistenceDriver::Header.name().to_owned());

        envelope::pack(
            &payload,
            &self.config.secret,
            self.config.algorithm,
            &self.config.iv,
            self.config.expires_in_minutes,
        )
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, Uri};

    use super::*;
    use crate::{cipher, test_support::test_config};

    #[test]
    fn issues_an_unpackable_header_token() {
        let config = test_config();
        let token = Token {
            config: Arc::new(config.clone()),
            head: Arc::new(RequestHead {
                method: Method::GET,
                uri: Uri::from_static("/"),
                headers: HeaderMap::new(),
            }),
        };

        let envelope = token.issue().unwrap();
        let payload = envelope::unpack(
            &envelope,
            &config.secret,
            config.algorithm,
            &cipher::default_iv(),
        )
        .unwrap();

        assert_eq!(payload.csrf_driver.as_deref(), Some("DOUBLE_SUBMIT"));
        assert_eq!(payload.persistence_driver.as_deref(), Some("header"));
        assert!(payload.id.is_some());
    }
}
