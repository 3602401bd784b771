//! Gateway configuration.
//!
//! `GatewayConfig` holds the HTTP settings. `AppConfig` gathers every
//! setting of the service from the environment and validates it once at
//! startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use taper_auth::{
    AuthConfig, DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS, MIN_SECRET_LEN,
};
use taper_session::{DeploymentProfile, OtpConfig, OtpStrength, TwilioConfig};

/// Configuration for the HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default = "GatewayConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// How long a resolved user stays cached, in seconds.
    #[serde(default = "GatewayConfig::default_user_cache_ttl")]
    pub user_cache_ttl_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    const fn default_max_body() -> usize {
        64 * 1024 // 64 KB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_user_cache_ttl() -> u64 {
        300 // 5 minutes
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the user cache TTL as a `Duration`.
    #[must_use]
    pub fn user_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.user_cache_ttl_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: Self::default_cors_origins(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            user_cache_ttl_seconds: Self::default_user_cache_ttl(),
        }
    }
}

/// Which SMS provider delivers OTP codes.
#[derive(Debug, Clone)]
pub enum SmsProvider {
    /// Log codes instead of sending them.
    Noop,
    /// Send through Twilio.
    Twilio(TwilioConfig),
}

/// Errors found while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// The variable name.
        var: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// The full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deployment profile (`APP_ENV`).
    pub profile: DeploymentProfile,
    /// RocksDB directory (`DATA_DIR`).
    pub data_dir: PathBuf,
    /// HTTP settings.
    pub gateway: GatewayConfig,
    /// Token signing settings.
    pub auth: AuthConfig,
    /// OTP settings.
    pub otp: OtpConfig,
    /// SMS provider selection.
    pub sms: SmsProvider,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is
    /// out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let profile = match var("APP_ENV") {
            Some(v) => v
                .parse::<DeploymentProfile>()
                .map_err(|e| ConfigError::invalid("APP_ENV", e))?,
            None => DeploymentProfile::Dev,
        };

        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "/data/taper".into()));

        let mut gateway = GatewayConfig::default();
        if let Some(addr) = var("LISTEN_ADDR") {
            gateway.listen_addr = addr;
        }
        if let Some(origins) = var("CORS_ORIGINS") {
            gateway.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        gateway.user_cache_ttl_seconds = parse_or(
            var("USER_CACHE_TTL_SECONDS"),
            "USER_CACHE_TTL_SECONDS",
            gateway.user_cache_ttl_seconds,
        )?;

        let auth = Self::auth_from(&var)?;
        let otp = Self::otp_from(&var, profile)?;
        let sms = Self::sms_from(&var, profile)?;

        Ok(Self {
            profile,
            data_dir,
            gateway,
            auth,
            otp,
            sms,
        })
    }

    fn auth_from<F>(var: &F) -> Result<AuthConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::invalid(
                "JWT_SECRET",
                format!("must be at least {MIN_SECRET_LEN} bytes"),
            ));
        }

        let access_ttl_seconds = parse_or(
            var("ACCESS_TOKEN_TTL_SECONDS"),
            "ACCESS_TOKEN_TTL_SECONDS",
            DEFAULT_ACCESS_TTL_SECONDS,
        )?;
        if access_ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "ACCESS_TOKEN_TTL_SECONDS",
                "must be greater than zero",
            ));
        }

        let refresh_ttl_seconds = parse_or(
            var("REFRESH_TOKEN_TTL_SECONDS"),
            "REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_REFRESH_TTL_SECONDS,
        )?;
        if refresh_ttl_seconds <= access_ttl_seconds {
            return Err(ConfigError::invalid(
                "REFRESH_TOKEN_TTL_SECONDS",
                "must be greater than the access token TTL",
            ));
        }

        Ok(AuthConfig {
            secret,
            access_ttl_seconds,
            refresh_ttl_seconds,
        })
    }

    fn otp_from<F>(var: &F, profile: DeploymentProfile) -> Result<OtpConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = OtpConfig::default();

        let strength = match var("OTP_STRENGTH") {
            Some(v) => v
                .parse::<OtpStrength>()
                .map_err(|e| ConfigError::invalid("OTP_STRENGTH", e))?,
            None => defaults.strength,
        };

        let code_length = parse_or(var("OTP_LENGTH"), "OTP_LENGTH", defaults.code_length)?;
        if !(4..=10).contains(&code_length) {
            return Err(ConfigError::invalid("OTP_LENGTH", "must be between 4 and 10"));
        }

        let ttl_seconds = parse_or(
            var("OTP_TTL_SECONDS"),
            "OTP_TTL_SECONDS",
            defaults.ttl_seconds,
        )?;
        if ttl_seconds == 0 {
            return Err(ConfigError::invalid("OTP_TTL_SECONDS", "must be greater than zero"));
        }

        let magic_code = var("MAGIC_OTP");
        if magic_code.is_some() && profile.is_prod() {
            return Err(ConfigError::invalid(
                "MAGIC_OTP",
                "not allowed under the production profile",
            ));
        }

        Ok(OtpConfig {
            strength,
            code_length,
            ttl_seconds,
            magic_code,
            dispatch_timeout_seconds: defaults.dispatch_timeout_seconds,
        })
    }

    fn sms_from<F>(var: &F, profile: DeploymentProfile) -> Result<SmsProvider, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = var("SMS_PROVIDER").unwrap_or_else(|| "noop".into());

        match provider.to_ascii_lowercase().as_str() {
            "noop" if profile.is_prod() => Err(ConfigError::invalid(
                "SMS_PROVIDER",
                "noop is not allowed under the production profile",
            )),
            "noop" => Ok(SmsProvider::Noop),
            "twilio" => Ok(SmsProvider::Twilio(TwilioConfig {
                account_sid: var("TWILIO_ACCOUNT_SID")
                    .ok_or(ConfigError::Missing("TWILIO_ACCOUNT_SID"))?,
                auth_token: var("TWILIO_AUTH_TOKEN")
                    .ok_or(ConfigError::Missing("TWILIO_AUTH_TOKEN"))?,
                from: var("TWILIO_FROM").ok_or(ConfigError::Missing("TWILIO_FROM"))?,
            })),
            other => Err(ConfigError::invalid(
                "SMS_PROVIDER",
                format!("unknown provider {other}"),
            )),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(var, format!("not a number: {v}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn default_gateway_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.user_cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn gateway_config_deserializes_with_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"listen_addr": "127.0.0.1:9000"}"#).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.request_timeout_seconds, 30);
    }

    #[test]
    fn minimal_environment() {
        let config = load(&[("JWT_SECRET", SECRET)]).unwrap();

        assert_eq!(config.profile, DeploymentProfile::Dev);
        assert_eq!(config.data_dir, PathBuf::from("/data/taper"));
        assert_eq!(config.auth.access_ttl_seconds, 900);
        assert_eq!(config.auth.refresh_ttl_seconds, 604_800);
        assert_eq!(config.otp.code_length, 6);
        assert!(matches!(config.sms, SmsProvider::Noop));
    }

    #[test]
    fn secret_is_required_and_long_enough() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
        assert!(matches!(
            load(&[("JWT_SECRET", "short")]),
            Err(ConfigError::Invalid { var: "JWT_SECRET", .. })
        ));
    }

    #[test]
    fn ttl_bounds() {
        assert!(load(&[("JWT_SECRET", SECRET), ("ACCESS_TOKEN_TTL_SECONDS", "0")]).is_err());
        assert!(load(&[
            ("JWT_SECRET", SECRET),
            ("ACCESS_TOKEN_TTL_SECONDS", "600"),
            ("REFRESH_TOKEN_TTL_SECONDS", "600"),
        ])
        .is_err());
        assert!(load(&[("JWT_SECRET", SECRET), ("OTP_LENGTH", "3")]).is_err());
        assert!(load(&[("JWT_SECRET", SECRET), ("OTP_LENGTH", "eleven")]).is_err());
    }

    #[test]
    fn cors_origins_split() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(
            config.gateway.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn prod_rejects_test_shortcuts() {
        let twilio = [
            ("JWT_SECRET", SECRET),
            ("APP_ENV", "prod"),
            ("SMS_PROVIDER", "twilio"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "token"),
            ("TWILIO_FROM", "+15550000000"),
        ];
        let config = load(&twilio).unwrap();
        assert!(config.profile.is_prod());
        assert!(matches!(config.sms, SmsProvider::Twilio(_)));

        let mut with_magic = twilio.to_vec();
        with_magic.push(("MAGIC_OTP", "999999"));
        assert!(matches!(
            load(&with_magic),
            Err(ConfigError::Invalid { var: "MAGIC_OTP", .. })
        ));

        assert!(matches!(
            load(&[("JWT_SECRET", SECRET), ("APP_ENV", "production")]),
            Err(ConfigError::Invalid { var: "SMS_PROVIDER", .. })
        ));
    }

    #[test]
    fn magic_code_allowed_outside_prod() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("APP_ENV", "staging"),
            ("MAGIC_OTP", "999999"),
        ])
        .unwrap();
        assert_eq!(config.otp.magic_code.as_deref(), Some("999999"));
    }

    #[test]
    fn twilio_requires_credentials() {
        assert_eq!(
            load(&[("JWT_SECRET", SECRET), ("SMS_PROVIDER", "twilio")]).unwrap_err(),
            ConfigError::Missing("TWILIO_ACCOUNT_SID")
        );
    }
}
