//! Taper Gateway - HTTP API for the mobile session layer
//!
//! This is the main entry point for the gateway service. Configuration is
//! read from the environment, see [`AppConfig`] for the variables.
//!
//! # SMS
//!
//! `SMS_PROVIDER=twilio` sends codes through Twilio. The default `noop`
//! provider only logs them and is refused when `APP_ENV=prod`.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taper_auth::TokenSigner;
use taper_core::{Clock, SystemClock};
use taper_gateway::{create_router, AppConfig, GatewayState, SmsProvider, UserCache};
use taper_session::{
    AuthService, NoopSmsSender, OtpManager, SessionManager, SmsSender, TwilioSmsSender,
};
use taper_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Taper Gateway");

    let config = AppConfig::from_env()?;
    tracing::info!(
        profile = %config.profile,
        listen_addr = %config.gateway.listen_addr,
        data_dir = %config.data_dir.display(),
        access_ttl_secs = config.auth.access_ttl_seconds,
        refresh_ttl_secs = config.auth.refresh_ttl_seconds,
        otp = ?config.otp,
        "Gateway configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir.display(), "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let signer = Arc::new(TokenSigner::new(config.auth.clone(), clock.clone()));

    let sms: Arc<dyn SmsSender> = match &config.sms {
        SmsProvider::Noop => {
            tracing::warn!("No SMS provider configured - OTP codes will only be logged");
            Arc::new(NoopSmsSender::new())
        }
        SmsProvider::Twilio(twilio) => {
            tracing::info!(from = %twilio.from, "Twilio SMS provider enabled");
            Arc::new(TwilioSmsSender::new(twilio.clone())?)
        }
    };

    let otp = OtpManager::new(
        store.clone(),
        sms,
        clock.clone(),
        config.otp.clone(),
        config.profile,
    );
    let sessions = SessionManager::new(store.clone(), signer, clock.clone());
    let service = Arc::new(AuthService::new(store, otp, sessions));
    tracing::info!("Auth service initialized");

    let users = Arc::new(UserCache::new(config.gateway.user_cache_ttl(), clock));
    let listen_addr = config.gateway.listen_addr.clone();
    let state = GatewayState::new(service, users, config.gateway);

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
