use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use http::StatusCode;
use serde_json::{json, Value};
use tower_jwt_csrf::{CsrfDriver, JwtCsrf, RequestHead, Token, UserIdentity};

#[tokio::main]
async fn main() {
    let csrf = JwtCsrf::new("an example very very secret key.")
        .driver(CsrfDriver::AuthedDoubleSubmit)
        .user_token(auth_token)
        .exclude_url("/login")
        .secure(false);

    let app = Router::new()
        .route("/", get(root))
        .route("/login", post(login))
        .route("/submit", post(submit))
        .layer(csrf);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    axum::serve(listener, app.into_make_service()).await.unwrap();
}

fn auth_token(head: &RequestHead) -> Option<String> {
    head.headers
        .get("x-auth-token")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Token "))
        .map(str::to_owned)
}

/// Hand the client a token to echo back in the `x-csrf-jwt` header on its
/// next mutation. Watch the response headers: every exchange also carries a
/// fresh token set.
async fn root(token: Token) -> Result<Json<Value>, StatusCode> {
    let envelope = token
        .issue()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({ "csrf": envelope })))
}

/// Excluded from verification; publishes the identity the refreshed token
/// should be bound to.
async fn login() -> (Extension<UserIdentity>, Json<Value>) {
    (
        Extension(UserIdentity("demo-user".into())),
        Json(json!({ "user": "demo-user" })),
    )
}

async fn submit() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Success!")
}
