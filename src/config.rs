//! Process configuration
//! ---------------------
//! Immutable configuration injected into the token engine and auth service at
//! construction time. Nothing here is read from module-level state after
//! startup; `from_env` is the single place the `OPENSTATS_*` variables are
//! consulted.

use chrono::Duration;

use crate::password::Parameters;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Symmetric HS256 signing secret shared by every token.
    pub token_secret: String,
    pub issuer: String,
    pub audience: String,
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// User-session token lifetime.
    pub session_duration: Duration,
    /// nbf backdating applied to every issued token (clock-skew allowance).
    pub session_jitter: Duration,
    /// Game-session token lifetime between rotations.
    pub game_session_duration: Duration,
    pub argon: Parameters,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "openstats-development-secret".to_string(),
            issuer: "openstats".to_string(),
            audience: "openstats".to_string(),
            cookie_name: "sessionid".to_string(),
            cookie_secure: true,
            session_duration: Duration::days(7),
            session_jitter: Duration::minutes(1),
            game_session_duration: Duration::hours(1),
            argon: Parameters::default(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        match std::env::var("OPENSTATS_TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => cfg.token_secret = secret,
            _ => tracing::warn!(
                target: "startup",
                "OPENSTATS_TOKEN_SECRET is not set; using the built-in development secret"
            ),
        }
        if let Ok(v) = std::env::var("OPENSTATS_SESSION_COOKIE_SECURE") {
            cfg.cookie_secure = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        cfg
    }
}
