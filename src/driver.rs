//! Verification strategies: what a token must contain and how it is checked.

use uuid::Uuid;

use crate::{
    error::VerificationError,
    payload::{ChannelTokens, TokenPayload},
    persist::PersistenceDriver,
};

/// The closed set of CSRF verification strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsrfDriver {
    /// Header-only token bound to the caller's identity.
    AuthedToken,
    /// A random id mirrored in a header and a cookie.
    #[default]
    DoubleSubmit,
    /// Double submit with an identity fallback when the mirror check fails.
    AuthedDoubleSubmit,
}

impl CsrfDriver {
    /// Wire name, as carried in the `csrfDriver` payload field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthedToken => "AUTHED_TOKEN",
            Self::DoubleSubmit => "DOUBLE_SUBMIT",
            Self::AuthedDoubleSubmit => "AUTHED_DOUBLE_SUBMIT",
        }
    }

    /// The strategy an inbound token names. Absent or unrecognized names
    /// select the default.
    pub(crate) fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("AUTHED_TOKEN") => Self::AuthedToken,
            Some("AUTHED_DOUBLE_SUBMIT") => Self::AuthedDoubleSubmit,
            _ => Self::default(),
        }
    }

    /// The channels this strategy persists tokens to.
    pub(crate) fn persists_to(&self) -> &'static [PersistenceDriver] {
        match self {
            Self::AuthedToken => &[PersistenceDriver::Header],
            Self::DoubleSubmit | Self::AuthedDoubleSubmit => {
                &[PersistenceDriver::Header, PersistenceDriver::Cookie]
            }
        }
    }

    pub(crate) fn requires_identity(&self) -> bool {
        matches!(self, Self::AuthedToken | Self::AuthedDoubleSubmit)
    }

    /// Fresh strategy-specific payload fields. `identity` is the caller's
    /// identity at generation time, when one is resolvable.
    pub(crate) fn generate(&self, identity: Option<&str>) -> TokenPayload {
        let mut payload = TokenPayload::default();

        match self {
            Self::AuthedToken => {
                payload.uid = identity.map(str::to_owned);
            }
            Self::DoubleSubmit => {
                payload.id = Some(Uuid::new_v4().to_string());
            }
            Self::AuthedDoubleSubmit => {
                payload.uid = identity.map(str::to_owned);
                payload.id = Some(Uuid::new_v4().to_string());
            }
        }

        payload
    }

    /// Check an inbound channel token set against this strategy's rules.
    pub(crate) fn verify(
        &self,
        tokens: &ChannelTokens,
        identity: Option<&str>,
    ) -> Result<(), VerificationError> {
        if tokens.header.is_empty() {
            return Err(VerificationError::new("TOKEN_NOT_IN_HEADER"));
        }

        match self {
            Self::AuthedToken => verify_identity(&tokens.header, identity),
            Self::DoubleSubmit => verify_mirrored_ids(tokens),
            Self::AuthedDoubleSubmit => {
                // The mirror check runs first; when it rejects, the identity
                // rules are a secondary acceptance path.
                verify_mirrored_tokens(tokens)
                    .or_else(|_| verify_identity(&tokens.header, identity))
            }
        }
    }
}

fn verify_mirrored_ids(tokens: &ChannelTokens) -> Result<(), VerificationError> {
    let header_id = tokens
        .header
        .id
        .as_deref()
        .ok_or_else(|| VerificationError::new("ID_NOT_IN_HEADER"))?;
    let cookie_id = tokens
        .cookie
        .id
        .as_deref()
        .ok_or_else(|| VerificationError::new("ID_NOT_IN_COOKIE"))?;

    if header_id != cookie_id {
        return Err(VerificationError::new("HEADER_COOKIE_ID_MISMATCH"));
    }

    Ok(())
}

fn verify_mirrored_tokens(tokens: &ChannelTokens) -> Result<(), VerificationError> {
    if tokens.cookie.is_empty() {
        return Err(VerificationError::new("TOKEN_NOT_IN_COOKIE"));
    }

    if tokens.header.id.is_none() {
        return Err(VerificationError::new("ID_NOT_IN_HEADER"));
    }

    if tokens.cookie.id.is_none() {
        return Err(VerificationError::new("ID_NOT_IN_COOKIE"));
    }

    if tokens.header.id != tokens.cookie.id {
        return Err(VerificationError::new("HEADER_COOKIE_MISMATCH"));
    }

    Ok(())
}

fn verify_identity(
    header: &TokenPayload,
    identity: Option<&str>,
) -> Result<(), VerificationError> {
    // With no resolvable identity there is nothing to hold the token to.
    let Some(identity) = identity else {
        return Ok(());
    };

    match header.uid.as_deref() {
        None => Err(VerificationError::new("TOKEN_PAYERID_MISSING")),
        Some(uid) if uid != identity => Err(VerificationError::new("TOKEN_PAYERID_MISMATCH")),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: Option<&str>, uid: Option<&str>) -> TokenPayload {
        TokenPayload {
            csrf_driver: Some("DOUBLE_SUBMIT".into()),
            persistence_driver: Some("header".into()),
            id: id.map(str::to_owned),
            uid: uid.map(str::to_owned),
        }
    }

    fn cookie(id: Option<&str>) -> TokenPayload {
        TokenPayload {
            csrf_driver: Some("DOUBLE_SUBMIT".into()),
            persistence_driver: Some("cookie".into()),
            id: id.map(str::to_owned),
            uid: None,
        }
    }

    fn code(err: VerificationError) -> String {
        err.code().to_owned()
    }

    #[test]
    fn unrecognized_names_select_the_default() {
        assert_eq!(CsrfDriver::from_name(None), CsrfDriver::DoubleSubmit);
        assert_eq!(
            CsrfDriver::from_name(Some("A_NEW_STRATEGY")),
            CsrfDriver::DoubleSubmit
        );
        assert_eq!(
            CsrfDriver::from_name(Some("AUTHED_TOKEN")),
            CsrfDriver::AuthedToken
        );
    }

    #[test]
    fn every_strategy_needs_a_header_token() {
        for driver in [
            CsrfDriver::AuthedToken,
            CsrfDriver::DoubleSubmit,
            CsrfDriver::AuthedDoubleSubmit,
        ] {
            let err = driver
                .verify(&ChannelTokens::default(), Some("user-1"))
                .unwrap_err();

            assert_eq!(code(err), "TOKEN_NOT_IN_HEADER");
        }
    }

    #[test]
    fn double_submit_accepts_matching_ids() {
        let tokens = ChannelTokens {
            header: header(Some("a"), None),
            cookie: cookie(Some("a")),
        };

        assert!(CsrfDriver::DoubleSubmit.verify(&tokens, None).is_ok());
    }

    #[test]
    fn double_submit_rejects_mismatched_ids() {
        let tokens = ChannelTokens {
            header: header(Some("a"), None),
            cookie: cookie(Some("b")),
        };

        let err = CsrfDriver::DoubleSubmit.verify(&tokens, None).unwrap_err();

        assert_eq!(code(err), "HEADER_COOKIE_ID_MISMATCH");
    }

    #[test]
    fn double_submit_needs_both_ids() {
        let tokens = ChannelTokens {
            header: header(None, Some("user-1")),
            cookie: cookie(Some("a")),
        };
        let err = CsrfDriver::DoubleSubmit.verify(&tokens, None).unwrap_err();
        assert_eq!(code(err), "ID_NOT_IN_HEADER");

        let tokens = ChannelTokens {
            header: header(Some("a"), None),
            cookie: TokenPayload::default(),
        };
        let err = CsrfDriver::DoubleSubmit.verify(&tokens, None).unwrap_err();
        assert_eq!(code(err), "ID_NOT_IN_COOKIE");
    }

    #[test]
    fn authed_token_accepts_matching_uid() {
        let tokens = ChannelTokens {
            header: header(None, Some("user-1")),
            cookie: TokenPayload::default(),
        };

        assert!(CsrfDriver::AuthedToken
            .verify(&tokens, Some("user-1"))
            .is_ok());
    }

    #[test]
    fn authed_token_rejects_foreign_uid() {
        let tokens = ChannelTokens {
            header: header(None, Some("user-2")),
            cookie: TokenPayload::default(),
        };

        let err = CsrfDriver::AuthedToken
            .verify(&tokens, Some("user-1"))
            .unwrap_err();

        assert_eq!(code(err), "TOKEN_PAYERID_MISMATCH");
    }

    #[test]
    fn authed_token_rejects_missing_uid() {
        let tokens = ChannelTokens {
            header: header(Some("a"), None),
            cookie: TokenPayload::default(),
        };

        let err = CsrfDriver::AuthedToken
            .verify(&tokens, Some("user-1"))
            .unwrap_err();

        assert_eq!(code(err), "TOKEN_PAYERID_MISSING");
    }

    #[test]
    fn authed_token_passes_without_a_resolvable_identity() {
        let tokens = ChannelTokens {
            header: header(None, Some("anyone")),
            cookie: TokenPayload::default(),
        };

        assert!(CsrfDriver::AuthedToken.verify(&tokens, None).is_ok());
    }

    #[test]
    fn authed_double_submit_falls_back_to_identity() {
        // Mismatched ids, but the header uid matches the caller.
        let tokens = ChannelTokens {
            header: header(Some("a"), Some("user-1")),
            cookie: cookie(Some("b")),
        };

        assert!(CsrfDriver::AuthedDoubleSubmit
            .verify(&tokens, Some("user-1"))
            .is_ok());
    }

    #[test]
    fn authed_double_submit_rejects_when_both_paths_fail() {
        let tokens = ChannelTokens {
            header: header(Some("a"), Some("user-2")),
            cookie: cookie(Some("b")),
        };

        let err = CsrfDriver::AuthedDoubleSubmit
            .verify(&tokens, Some("user-1"))
            .unwrap_err();

        assert_eq!(code(err), "TOKEN_PAYERID_MISMATCH");
    }

    #[test]
    fn authed_double_submit_prefers_the_mirror_check() {
        // Matching ids pass outright, identity never consulted.
        let tokens = ChannelTokens {
            header: header(Some("a"), Some("user-2")),
            cookie: cookie(Some("a")),
        };

        assert!(CsrfDriver::AuthedDoubleSubmit
            .verify(&tokens, Some("user-1"))
            .is_ok());
    }

    #[test]
    fn authed_double_submit_needs_a_cookie_token() {
        let tokens = ChannelTokens {
            header: header(Some("a"), None),
            cookie: TokenPayload::default(),
        };

        // No identity resolvable either: the fallback passes.
        assert!(CsrfDriver::AuthedDoubleSubmit.verify(&tokens, None).is_ok());

        let err = CsrfDriver::AuthedDoubleSubmit
            .verify(&tokens, Some("user-1"))
            .unwrap_err();
        assert_eq!(code(err), "TOKEN_PAYERID_MISSING");
    }

    #[test]
    fn persistence_channels_per_strategy() {
        assert_eq!(
            CsrfDriver::AuthedToken.persists_to(),
            &[PersistenceDriver::Header]
        );
        assert_eq!(
            CsrfDriver::DoubleSubmit.persists_to(),
            &[PersistenceDriver::Header, PersistenceDriver::Cookie]
        );
    }

    #[test]
    fn generate_fills_strategy_fields() {
        let payload = CsrfDriver::AuthedDoubleSubmit.generate(Some("user-1"));
        assert_eq!(payload.uid.as_deref(), Some("user-1"));
        assert!(payload.id.is_some());

        let payload = CsrfDriver::DoubleSubmit.generate(None);
        assert!(payload.uid.is_none());
        assert!(payload.id.is_some());

        let payload = CsrfDriver::AuthedToken.generate(None);
        assert!(payload.uid.is_none());
        assert!(payload.id.is_none());
    }
}
