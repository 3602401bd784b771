//! OTP login and device-bound refresh sessions for taper.
//!
//! This crate provides the business logic behind the authentication
//! endpoints. It coordinates the store, the token signer, and the SMS
//! provider.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       AuthService                           │
//! │  ┌─────────────────────┐       ┌─────────────────────────┐  │
//! │  │     OtpManager      │       │     SessionManager      │  │
//! │  │  issue / verify     │       │  login / refresh / out  │  │
//! │  └─────────────────────┘       └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Signer  │   │   SMS    │
//!        │ (RocksDB)│   │  (JWT)   │   │ (Twilio) │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use taper_auth::{AuthConfig, TokenSigner};
//! use taper_core::{Clock, DeviceId, SystemClock};
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
//! let sessions = SessionManager::new(store.clone(), signer, clock);
//! let service = AuthService::new(store, otp, sessions);
//!
//! service.request_otp("+15550001111").await?;
//! let (user, tokens) = service.verify_otp("+15550001111", "123456", DeviceId::generate())?;
//!
//! println!("Logged in {} with {}", user.name, tokens.access_token);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod otp;
pub mod service;
pub mod session;
pub mod sms;
pub mod types;

pub use error::{RefreshRejection, Result, SessionError};
pub use otp::{generate_code, OtpManager};
pub use service::AuthService;
pub use session::SessionManager;
pub use sms::{NoopSmsSender, SmsSender, TwilioConfig, TwilioSmsSender};
pub use types::{DeploymentProfile, OtpConfig, OtpStrength, TokenPair};

#[cfg(any(test, feature = "test-utils"))]
pub use sms::{RecordingSmsSender, SentOtp};

// Re-export commonly used types from dependencies for convenience
pub use taper_core::{DeviceId, UserId};
pub use taper_store::{User, UserStatus};
