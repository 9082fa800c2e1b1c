//! Caller identity resolution.
//!
//! Unlike an access gate, this middleware never rejects: an unresolved
//! caller proceeds without an [`Identity`] and each route decides what that
//! means. The reply endpoint answers with a sign-in notice, the history
//! endpoint with 401.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::config::Config;
use crate::state::AppState;

/// Gateway header carrying an already-verified user id.
pub static X_AUTHENTICATED_USER: &str = "x-authenticated-user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

pub async fn resolve_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(identity) = identify(&state.config, req.headers()) {
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}

/// Bearer tokens take precedence over the gateway header.
pub fn identify(config: &Config, headers: &HeaderMap) -> Option<Identity> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if let Some(token) = bearer {
        match config.api_tokens.get(token) {
            Some(user_id) => return Some(Identity(user_id.clone())),
            None => debug!("unknown bearer token"),
        }
    }

    if config.trust_identity_header {
        return headers
            .get(X_AUTHENTICATED_USER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .map(|uid| Identity(uid.to_owned()));
    }
    None
}

/// Extractor for the optional caller identity.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|Identity(uid)| uid.as_str())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(parts.extensions.get::<Identity>().cloned()))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use axum::http::HeaderValue;

    fn config(trust_header: bool) -> Config {
        let mut cfg = Config::from_lookup(|key| {
            (key == "EDU_API_TOKENS").then(|| "tok-1:alice".to_owned())
        });
        cfg.trust_identity_header = trust_header;
        cfg
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn known_bearer_token_resolves() {
        let id = identify(&config(false), &headers(&[("authorization", "Bearer tok-1")]));
        assert_eq!(id, Some(Identity("alice".into())));
    }

    #[test]
    fn unknown_bearer_token_is_anonymous() {
        let id = identify(&config(false), &headers(&[("authorization", "Bearer nope")]));
        assert_eq!(id, None);
    }

    #[test]
    fn gateway_header_requires_trust() {
        let h = headers(&[("x-authenticated-user", "bob")]);
        assert_eq!(identify(&config(false), &h), None);
        assert_eq!(identify(&config(true), &h), Some(Identity("bob".into())));
    }

    #[test]
    fn bearer_wins_over_gateway_header() {
        let h = headers(&[("authorization", "Bearer tok-1"), ("x-authenticated-user", "bob")]);
        assert_eq!(identify(&config(true), &h), Some(Identity("alice".into())));
    }

    #[test]
    fn blank_gateway_header_is_anonymous() {
        let h = headers(&[("x-authenticated-user", "  ")]);
        assert_eq!(identify(&config(true), &h), None);
    }
}
