//! User resolution middleware.
//!
//! Runs behind [`require_auth`](crate::auth::require_auth). Loads the acting
//! user through the [`UserCache`](crate::cache::UserCache), applies the
//! account-status policy, and stores a [`CurrentUser`] in the request
//! extensions.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use taper_store::{Store, User};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// The active user behind the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Middleware that resolves the authenticated user and rejects inactive accounts.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if there is no authenticated caller or
/// the user no longer exists, `ApiError::Forbidden` if the account is not
/// active, and `ApiError::Internal` if the store fails.
pub async fn resolve_user<S>(
    State(state): State<Arc<GatewayState<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: Store + 'static,
{
    let Some(auth) = request.extensions().get::<AuthUser>().cloned() else {
        tracing::error!("resolve_user installed without require_auth");
        return Err(ApiError::Unauthorized);
    };

    let user = match state.users.get(&auth.user_id) {
        Some(user) => user,
        None => {
            // Fetched without holding the cache lock
            let Some(user) = state.auth.store().get_user(&auth.user_id)? else {
                tracing::debug!(user_id = %auth.user_id, "Authenticated user no longer exists");
                return Err(ApiError::Unauthorized);
            };
            state.users.insert(user.clone());
            user
        }
    };

    if !user.is_active() {
        tracing::debug!(user_id = %user.user_id, status = ?user.status, "Inactive account");
        return Err(ApiError::Forbidden);
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

impl<St> FromRequestParts<St> for CurrentUser
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
            parts
                .extensions
                .get::<CurrentUser>()
                .cloned()
                .ok_or(ApiError::Unauthorized)
        })
    }
}
