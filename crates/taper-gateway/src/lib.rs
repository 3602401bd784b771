//! HTTP gateway for the taper mobile session layer.
//!
//! This crate provides the public-facing API of the session layer.
//! It handles:
//!
//! - OTP login and refresh token rotation endpoints
//! - Access token authentication middleware
//! - User resolution with a TTL cache and account-status policy
//! - Environment configuration for the binary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Mobile clients                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       taper-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │ require_    │ │ resolve_    │ │  Router             │    │
//! │  │ auth        │→│ user(cache) │→│  + Handlers         │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Auth    │   │  Token   │   │  Store   │
//!        │ Service  │   │  Signer  │   │ (RocksDB)│
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taper_auth::{AuthConfig, TokenSigner};
//! use taper_core::{Clock, SystemClock};
//! use taper_gateway::{create_router, GatewayConfig, GatewayState, UserCache};
//! use taper_session::{
//!     AuthService, DeploymentProfile, NoopSmsSender, OtpConfig, OtpManager, SessionManager,
//! };
//! use taper_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/taper")?);
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let signer = Arc::new(TokenSigner::new(
//!     AuthConfig::new("a-secret-of-at-least-thirty-two-bytes"),
//!     clock.clone(),
//! ));
//!
//! let otp = OtpManager::new(
//!     store.clone(),
//!     Arc::new(NoopSmsSender::new()),
//!     clock.clone(),
//!     OtpConfig::default(),
//!     DeploymentProfile::Dev,
//! );
//! let sessions = SessionManager::new(store.clone(), signer, clock.clone());
//! let service = Arc::new(AuthService::new(store, otp, sessions));
//!
//! let config = GatewayConfig::default();
//! let users = Arc::new(UserCache::new(config.user_cache_ttl(), clock));
//! let app = create_router(GatewayState::new(service, users, config));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod user;

pub use cache::UserCache;
pub use config::{AppConfig, ConfigError, GatewayConfig, SmsProvider};
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::AuthUser;
pub use user::CurrentUser;
