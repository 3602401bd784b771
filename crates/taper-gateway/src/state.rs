//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use taper_auth::TokenSigner;
use taper_session::AuthService;
use taper_store::Store;

use crate::cache::UserCache;
use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<S>
where
    S: Store,
{
    /// OTP and session operations.
    pub auth: Arc<AuthService<S>>,
    /// Cache used by the user resolution middleware.
    pub users: Arc<UserCache>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<S> GatewayState<S>
where
    S: Store,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(auth: Arc<AuthService<S>>, users: Arc<UserCache>, config: GatewayConfig) -> Self {
        Self {
            auth,
            users,
            config,
        }
    }

    /// The token signer used to verify bearer tokens.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        self.auth.sessions().signer()
    }
}

impl<S> Clone for GatewayState<S>
where
    S: Store,
{
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            users: Arc::clone(&self.users),
            config: self.config.clone(),
        }
    }
}
