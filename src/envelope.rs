//! The signed, time-limited envelope a token payload travels in.
//!
//! An envelope is a JWT whose single custom claim is the encrypted,
//! serialized payload: `[signed [encrypted [serialized [payload]]]]`.
//! [`pack`] builds one, [`unpack`] takes one apart, verifying signature and
//! expiry before touching the ciphertext.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm as Signing, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};

use crate::{
    cipher::{self, Algorithm, IV_LEN},
    error::{Error, VerificationError},
    payload::TokenPayload,
};

pub(crate) const DEFAULT_EXPIRES_IN_MINUTES: u64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    token: String,
    exp: u64,
}

/// Serialize, encrypt, and sign a token payload into an envelope string.
pub fn pack(
    payload: &TokenPayload,
    secret: &str,
    algorithm: Algorithm,
    iv: &[u8; IV_LEN],
    expires_in_minutes: u64,
) -> Result<String, Error> {
    let serialized = serde_json::to_string(payload)?;

    let claims = Claims {
        token: cipher::encrypt(secret.as_bytes(), &serialized, algorithm, iv)?,
        exp: jsonwebtoken::get_current_timestamp() + expires_in_minutes * 60,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Verify, decrypt, and deserialize an envelope back into its payload.
///
/// Signature or expiry failures become a [`VerificationError`] whose code is
/// the normalized failure reason (`JWT_EXPIRED`, `INVALID_SIGNATURE`, ...),
/// as does a payload that decrypts to something other than valid JSON. A
/// decryption failure is a [`CipherError`](crate::CipherError) fault: the
/// signature already checked out, so the ciphertext itself was packed under
/// foreign cipher settings.
pub fn unpack(
    envelope: &str,
    secret: &str,
    algorithm: Algorithm,
    iv: &[u8; IV_LEN],
) -> Result<TokenPayload, Error> {
    let mut validation = Validation::new(Signing::HS256);
    validation.leeway = 0;

    let claims = decode::<Claims>(
        envelope,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| VerificationError::from_reason(reason(err.kind())))?
    .claims;

    let serialized = cipher::decrypt(secret.as_bytes(), &claims.token, algorithm, iv)?;

    serde_json::from_str(&serialized)
        .map_err(|_| VerificationError::from_reason("malformed token json").into())
}

/// Stable failure phrases fed into code normalization.
fn reason(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "jwt expired",
        ErrorKind::InvalidSignature => "invalid signature",
        ErrorKind::ImmatureSignature => "jwt not active",
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => "invalid algorithm",
        ErrorKind::MissingRequiredClaim(_) => "missing required claim",
        _ => "jwt malformed",
    }
}
