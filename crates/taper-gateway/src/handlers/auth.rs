//! OTP login and session endpoints.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use taper_core::{DeviceId, UserId};
use taper_session::TokenPair;
use taper_store::{Store, User};

use crate::auth::{bearer_token, AuthUser};
use crate::error::ApiError;
use crate::state::GatewayState;
use crate::user::CurrentUser;

// ============================================================================
// Request / response bodies
// ============================================================================

/// Body of `POST /auth/request-otp`.
#[derive(Debug, Deserialize)]
pub struct RequestOtpRequest {
    /// Registered mobile number.
    pub mobile: String,
}

/// Body of `POST /auth/verify-otp`.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    /// Registered mobile number.
    pub mobile: String,
    /// The code received by SMS.
    pub otp: String,
    /// The device the session is bound to.
    pub device_id: String,
}

/// Body carrying only a device id.
#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    /// The device the call applies to.
    pub device_id: String,
}

/// A plain confirmation message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human readable message.
    pub message: &'static str,
}

/// An access and refresh token pair.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Short-lived access token.
    pub access_token: String,
    /// Device-bound refresh token.
    pub refresh_token: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

/// The public part of a user.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Mobile number.
    pub mobile: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.user_id,
            name: user.name,
            mobile: user.mobile,
        }
    }
}

/// Response of `POST /auth/verify-otp`.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Short-lived access token.
    pub access_token: String,
    /// Device-bound refresh token.
    pub refresh_token: String,
    /// The logged in user.
    pub user: UserSummary,
}

/// Response of `POST /auth/logout-all`.
#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    /// Human readable message.
    pub message: &'static str,
    /// Number of device sessions removed.
    pub revoked: usize,
}

/// Query of `GET /auth/token`.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    /// The device to bind the new session to.
    pub device_id: Option<String>,
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn parse_device_id(value: &str) -> Result<DeviceId, ApiError> {
    required(value, "device_id")?
        .parse()
        .map_err(|_| ApiError::BadRequest("device_id must be a UUID".to_string()))
}

// ============================================================================
// Public endpoints
// ============================================================================

/// Send an OTP to a registered mobile number.
///
/// # Example
///
/// ```text
/// POST /auth/request-otp
/// {"mobile": "+15550001111"}
///
/// Response: 200 OK
/// {"message": "OTP sent"}
/// ```
///
/// # Errors
///
/// 400 for a missing number, 404 for an unknown one, 500 if the code could
/// not be stored or sent.
pub async fn request_otp<S>(
    State(state): State<Arc<GatewayState<S>>>,
    body: Result<Json<RequestOtpRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError>
where
    S: Store + 'static,
{
    let Json(body) = body?;
    let mobile = required(&body.mobile, "mobile")?;

    state.auth.request_otp(&mobile).await?;

    Ok(Json(MessageResponse { message: "OTP sent" }))
}

/// Verify an OTP and start a session on a device.
///
/// # Errors
///
/// 400 for missing fields, 401 for an unknown number or a wrong, expired, or
/// used code.
pub async fn verify_otp<S>(
    State(state): State<Arc<GatewayState<S>>>,
    body: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError>
where
    S: Store + 'static,
{
    let Json(body) = body?;
    let mobile = required(&body.mobile, "mobile")?;
    let otp = required(&body.otp, "otp")?;
    let device_id = parse_device_id(&body.device_id)?;

    let (user, pair) = state.auth.verify_otp(&mobile, &otp, device_id)?;
    tracing::info!(user_id = %user.user_id, device_id = %device_id, "User logged in");

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: user.into(),
    }))
}

/// Rotate the refresh token presented as the bearer credential.
///
/// # Errors
///
/// 400 for a missing device id, 401 if the token is absent, invalid, not the
/// device's current token, or expired.
pub async fn refresh<S>(
    State(state): State<Arc<GatewayState<S>>>,
    headers: HeaderMap,
    body: Result<Json<DeviceRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError>
where
    S: Store + 'static,
{
    let Json(body) = body?;
    let device_id = parse_device_id(&body.device_id)?;
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;

    let pair = state.auth.refresh(device_id, token)?;

    Ok(Json(pair.into()))
}

// ============================================================================
// Authenticated endpoints
// ============================================================================

/// End the session of one device. Repeating the call succeeds.
///
/// # Errors
///
/// 400 for a missing device id, 500 if the store fails.
pub async fn logout<S>(
    State(state): State<Arc<GatewayState<S>>>,
    auth: AuthUser,
    body: Result<Json<DeviceRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError>
where
    S: Store + 'static,
{
    let Json(body) = body?;
    let device_id = parse_device_id(&body.device_id)?;

    state.auth.logout(auth.user_id, device_id)?;

    Ok(Json(MessageResponse {
        message: "Logged out",
    }))
}

/// End the sessions of every device of the caller.
///
/// # Errors
///
/// 500 if the store fails.
pub async fn logout_all<S>(
    State(state): State<Arc<GatewayState<S>>>,
    auth: AuthUser,
) -> Result<Json<LogoutAllResponse>, ApiError>
where
    S: Store + 'static,
{
    let revoked = state.auth.logout_all(auth.user_id)?;

    Ok(Json(LogoutAllResponse {
        message: "Logged out from all devices",
        revoked,
    }))
}

/// Read the caller's profile directly from the store.
///
/// # Errors
///
/// 404 if the user no longer exists.
pub async fn profile<S>(
    State(state): State<Arc<GatewayState<S>>>,
    auth: AuthUser,
) -> Result<Json<UserSummary>, ApiError>
where
    S: Store + 'static,
{
    let user = state.auth.profile(&auth.user_id)?;
    Ok(Json(user.into()))
}

/// Mint a fresh token pair for an active caller on a device.
///
/// # Errors
///
/// 400 for a missing device id.
pub async fn token<S>(
    State(state): State<Arc<GatewayState<S>>>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> Result<Json<TokenResponse>, ApiError>
where
    S: Store + 'static,
{
    let Query(query) = query?;
    let device_id = parse_device_id(query.device_id.as_deref().unwrap_or_default())?;

    let pair = state.auth.create_bootstrap_token(user.user_id, device_id)?;
    tracing::info!(user_id = %user.user_id, device_id = %device_id, "Bootstrap token issued");

    Ok(Json(pair.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_validation() {
        assert!(matches!(parse_device_id(""), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_device_id("phone"), Err(ApiError::BadRequest(_))));

        let id = DeviceId::generate();
        assert_eq!(parse_device_id(&format!(" {id} ")).unwrap(), id);
    }

    #[test]
    fn required_trims() {
        assert_eq!(required(" +1555 ", "mobile").unwrap(), "+1555");
        assert!(required("   ", "mobile").is_err());
    }
}
