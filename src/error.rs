use http::StatusCode;

use crate::{cipher::Algorithm, driver::CsrfDriver};

/// Failure inside the symmetric cipher.
///
/// Cipher failures are security-relevant faults, not verification
/// rejections. Messages stay opaque: neither key material nor plaintext ever
/// reaches an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// The ciphertext is not valid hex.
    #[error("ciphertext is not valid hex")]
    Encoding,
    /// The key length does not match the algorithm.
    #[error("key length does not match the cipher algorithm")]
    KeyLength,
    #[error("payload could not be encrypted")]
    Encrypt,
    /// Produced under a different key, algorithm, or IV.
    #[error("payload could not be decrypted")]
    Decrypt,
}

/// A CSRF verification rejection.
///
/// The only expected, user-facing failure kind: the guard answers it with a
/// 401 and stores the error in the response extensions. The code is a stable
/// taxonomy value — uppercase, underscored, at most 25 characters — such as
/// `HEADER_COOKIE_ID_MISMATCH` or `JWT_EXPIRED`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("EINVALIDCSRF_{code}")]
pub struct VerificationError {
    code: String,
}

impl VerificationError {
    pub(crate) fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// Normalize a free-text failure reason into a code: truncate to 25
    /// characters, spaces to underscores, uppercase.
    pub(crate) fn from_reason(reason: &str) -> Self {
        let code = reason
            .chars()
            .take(25)
            .collect::<String>()
            .replace(' ', "_")
            .to_uppercase();

        Self { code }
    }

    /// The normalized rejection code.
    pub fn code(&self) -> &str {
        &self.code
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A verification rejection. See [`VerificationError`].
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// A cipher fault. See [`CipherError`].
    #[error(transparent)]
    Cipher(#[from] CipherError),
    /// Maps the [`hmac::digest::InvalidLength`] error.
    #[error(transparent)]
    InvalidLength(#[from] hmac::digest::InvalidLength),
    /// The envelope could not be signed.
    #[error("couldn't sign envelope: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
    /// A token payload could not be serialized.
    #[error("couldn't serialize token payload: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The configured header name is not a valid HTTP header name.
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// An envelope or hash is not a valid HTTP header value.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// The request body could not be buffered for the `meta` fallback.
    #[error("couldn't read request body: {0}")]
    BodyRead(String),
    /// An expected extension was missing.
    #[error("couldn't extract `{0}`. is `JwtCsrf` enabled?")]
    ExtensionNotFound(String),
    /// An authenticated driver was configured without a `user_token` resolver.
    #[error("`user_token` resolver required for the {0:?} driver")]
    MissingUserTokenResolver(CsrfDriver),
    /// The secret does not match the cipher algorithm's key length.
    #[error("secret must be {expected} bytes for {algorithm:?}, got {actual}")]
    SecretLength {
        algorithm: Algorithm,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    pub(crate) fn make_layer_error<T: Default, E>(
        err: impl std::error::Error,
    ) -> Result<http::Response<T>, E> {
        tracing::error!(err = %err);

        let mut response = http::Response::default();
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

        Ok(response)
    }

    /// Build the 401 a rejected request is answered with. The error rides in
    /// the response extensions since the body type is opaque to the layer.
    pub(crate) fn make_rejection<T: Default>(err: VerificationError) -> http::Response<T> {
        tracing::warn!(code = err.code(), "csrf verification failed");

        let mut response = http::Response::default();
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        response.extensions_mut().insert(err);

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_reasons() {
        assert_eq!(
            VerificationError::from_reason("jwt expired").code(),
            "JWT_EXPIRED"
        );
        assert_eq!(
            VerificationError::from_reason("invalid signature").code(),
            "INVALID_SIGNATURE"
        );
    }

    #[test]
    fn truncates_reasons_to_25_chars() {
        let err = VerificationError::from_reason("this reason is much too long to keep");
        assert_eq!(err.code().chars().count(), 25);
        assert_eq!(err.code(), "THIS_REASON_IS_MUCH_TOO_L");
    }

    #[test]
    fn displays_with_prefix() {
        let err = VerificationError::new("TOKEN_NOT_IN_HEADER");
        assert_eq!(err.to_string(), "EINVALIDCSRF_TOKEN_NOT_IN_HEADER");
    }

    #[test]
    fn rejection_response_carries_the_error() {
        let err = VerificationError::new("ID_NOT_IN_COOKIE");
        let response: http::Response<()> = Error::make_rejection(err.clone());

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.extensions().get::<VerificationError>(), Some(&err));
    }
}
