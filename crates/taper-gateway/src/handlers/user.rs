//! Endpoints for the resolved, active user.

use axum::Json;
use serde::Serialize;

use taper_core::UserId;
use taper_store::UserStatus;

use crate::user::CurrentUser;

/// The profile of the current user.
#[derive(Debug, Serialize)]
pub struct UserProfileResponse {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Mobile number.
    pub mobile: String,
    /// Email address, if known.
    pub email: Option<String>,
    /// Avatar location, if set.
    pub avatar_url: Option<String>,
    /// Account status.
    pub status: UserStatus,
}

/// Return the current user's profile.
///
/// Served from the user cache, so changes may take up to the cache TTL to
/// show.
pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<UserProfileResponse> {
    Json(UserProfileResponse {
        id: user.user_id,
        name: user.name,
        mobile: user.mobile,
        email: user.email,
        avatar_url: user.avatar_url,
        status: user.status,
    })
}
