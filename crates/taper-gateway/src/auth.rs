//! Authentication middleware and extractors.
//!
//! `require_auth` validates the access token of a request and stores an
//! [`AuthUser`] in its extensions. Handlers behind it take `AuthUser` as an
//! extractor.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};

use taper_auth::{token_fingerprint, TokenClaims};
use taper_core::{TokenId, UserId};
use taper_store::Store;

use crate::error::ApiError;
use crate::state::GatewayState;

/// The caller identified by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// The authenticated user.
    pub user_id: UserId,
    /// The `jti` of the presented token.
    pub token_id: TokenId,
    /// When the presented token expires.
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    /// Create an `AuthUser` from verified claims.
    #[must_use]
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.user_id(),
            token_id: claims.token_id,
            expires_at: claims.expires_at,
        }
    }
}

/// Extract the token of an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware that rejects requests without a valid access token.
///
/// Every failure produces the same 401 response; the cause is logged at
/// debug level.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the header is absent or the token
/// does not verify as an access token.
pub async fn require_auth<S>(
    State(state): State<Arc<GatewayState<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: Store + 'static,
{
    let Some(token) = bearer_token(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "Missing bearer token");
        return Err(ApiError::Unauthorized);
    };

    let claims = state.signer().verify_access(token).map_err(|e| {
        tracing::debug!(
            fingerprint = %token_fingerprint(token),
            error = %e,
            "Access token rejected"
        );
        ApiError::from(e)
    })?;

    let user = AuthUser::from_claims(&claims);
    tracing::debug!(user_id = %user.user_id, token_id = %user.token_id, "Request authenticated");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

impl<St> FromRequestParts<St> for AuthUser
where
    St: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 St,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            // Only present when the route sits behind require_auth
            parts
                .extensions
                .get::<AuthUser>()
                .cloned()
                .ok_or(ApiError::Unauthorized)
        })
    }
}
