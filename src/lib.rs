//! ## Overview
//!
//! CSRF protection for [`tower`][crate-tower] services: anti-forgery state
//! packed into signed, encrypted tokens and distributed over a response
//! header and a cookie.
//!
//! ### How it works
//!
//! - **Envelopes**: a token is a JSON payload, encrypted with AES-GCM and
//!   wrapped in a signed, time-limited JWT under your **secret key**. Nothing
//!   is stored server-side; every envelope carries what verification needs.
//! - **Strategies** ([`CsrfDriver`]): what a token must contain and how it is
//!   checked.
//!   - `DoubleSubmit` (default): a random id mirrored in the header and the
//!     cookie; both must round-trip and match.
//!   - `AuthedToken`: a header-only token bound to the caller's identity.
//!   - `AuthedDoubleSubmit`: double submit first, identity as a fallback.
//! - **Verification**: mutating requests (anything but GET/HEAD/OPTIONS/TRACE,
//!   minus excluded paths) must present the tokens their strategy demands; a
//!   bad set is answered with a 401 carrying a [`VerificationError`] in its
//!   extensions.
//! - **Refresh**: every response — success, rejection, or exempt — leaves
//!   with a freshly generated token set, so the client is always equipped for
//!   its next request.
//!
//! ## Usage
//!
//! ### With [`axum`][crate-axum]
//!
//! ```rust,no_run
//! use axum::{routing::{get, post}, Router};
//! use tower_jwt_csrf::{CsrfDriver, JwtCsrf, RequestHead};
//!
//! #[tokio::main]
//! async fn main() {
//!     let csrf = JwtCsrf::new("an example very very secret key.")
//!         .driver(CsrfDriver::AuthedDoubleSubmit)
//!         .user_token(|head: &RequestHead| {
//!             head.headers
//!                 .get("x-auth-token")
//!                 .and_then(|value| value.to_str().ok())
//!                 .and_then(|value| value.strip_prefix("Token "))
//!                 .map(str::to_owned)
//!         })
//!         .exclude_url("/login")
//!         .secure(false);
//!
//!     let app = Router::new()
//!         .route("/", get(|| async { "hello" }))
//!         .route("/login", post(|| async {}))
//!         .layer(csrf);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!
//!     axum::serve(listener, app.into_make_service()).await.unwrap();
//! }
//! ```
//!
//! Clients echo the `x-csrf-jwt` response header back as a request header
//! (or as a `meta.x-csrf-jwt` field of a JSON body, alongside the
//! `x-csrf-jwt-hash` header); the cookie rides along on its own.
//!
//! [crate-axum]: https://github.com/tokio-rs/axum
//! [crate-tower]: https://github.com/tower-rs/tower

use hmac::Hmac;
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

pub use driver::CsrfDriver;
pub use error::{CipherError, Error, VerificationError};
pub use guard::{CsrfGuard, IssuedTokens, UserIdentity};
pub use layer::{ExcludePattern, JwtCsrf, RequestHead};
pub use payload::{ChannelTokens, TokenPayload};
pub use persist::PersistenceDriver;
pub use token::Token;

pub mod cipher;
pub mod envelope;

mod driver;
mod error;
mod guard;
mod layer;
mod payload;
mod persist;
mod token;

#[cfg(feature = "axum")]
mod extract;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{cipher, driver::CsrfDriver, envelope::DEFAULT_EXPIRES_IN_MINUTES, layer::Config};

    pub(crate) fn test_config() -> Config {
        Config {
            secret: "an example very very secret key.".into(),
            algorithm: cipher::Algorithm::default(),
            iv: cipher::default_iv(),
            expires_in_minutes: DEFAULT_EXPIRES_IN_MINUTES,
            driver: CsrfDriver::default(),
            header_name: crate::layer::DEFAULT_HEADER_NAME.into(),
            exclude_urls: Vec::new(),
            base_url: None,
            user_token: None,
            cookie_domain: None,
            secure: false,
        }
    }
}
