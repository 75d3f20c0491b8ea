use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{HeaderName, HeaderValue, Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use confirm_api::ApiError;
use uuid::Uuid;

use crate::engine::{Caller, LanguageHint};
use crate::server::AppState;

/// Legacy session header accepted next to `Authorization: Bearer`.
pub const SESSION_TOKEN_HEADER: &str = "x-tidepool-session-token";
pub const USER_LANGUAGE_HEADER: &str = "x-user-language";

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(req_id_value) = req_id_value else {
        return next.run(req).await;
    };

    // Picked up by the trace span
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

fn session_token(parts: &Parts) -> Option<&str> {
    let legacy = parts
        .headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());
    let bearer = || {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
    };
    legacy
        .or_else(bearer)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The authenticated caller, resolved through the identity directory.
///
/// Accepts `x-tidepool-session-token` or `Authorization: Bearer <token>`;
/// anything else is rejected with 401 before the handler runs.
pub struct Auth(pub Caller);

impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(parts) else {
            return Err(ApiError::unauthorized("missing session token"));
        };
        let caller = state.engine.authenticate(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            ApiError::from(e)
        })?;
        tracing::Span::current().record("caller", tracing::field::display(&caller.user_id));
        Ok(Auth(caller))
    }
}

/// Language requested by the client, if any.
pub struct Language(pub LanguageHint);

impl<S> FromRequestParts<S> for Language
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
        Ok(Language(LanguageHint::from_headers(
            header(USER_LANGUAGE_HEADER),
            header("accept-language"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/status");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn legacy_header_wins_over_bearer() {
        let p = parts(&[
            (SESSION_TOKEN_HEADER, "legacy"),
            ("authorization", "Bearer modern"),
        ]);
        assert_eq!(session_token(&p), Some("legacy"));

        let p = parts(&[("authorization", "Bearer modern")]);
        assert_eq!(session_token(&p), Some("modern"));
    }

    #[test]
    fn blank_or_foreign_schemes_are_ignored() {
        assert_eq!(session_token(&parts(&[("authorization", "Basic abc")])), None);
        assert_eq!(session_token(&parts(&[(SESSION_TOKEN_HEADER, "  ")])), None);
        assert_eq!(session_token(&parts(&[])), None);
    }

    #[tokio::test]
    async fn language_prefers_explicit_header() {
        let mut p = parts(&[
            (USER_LANGUAGE_HEADER, "fr"),
            ("accept-language", "de-DE,de;q=0.9"),
        ]);
        let Language(hint) = Language::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(hint.0.as_deref(), Some("fr"));

        let mut p = parts(&[("accept-language", "de-DE,de;q=0.9")]);
        let Language(hint) = Language::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(hint.0.as_deref(), Some("de"));
    }
}
