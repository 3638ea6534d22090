//! Account and session authentication for openstats.
//! Keep the public surface thin and split implementation across sub-modules.

mod heartbeat;
mod principal;
mod resolver;

pub use heartbeat::{
    jittered_pulse_interval, should_rotate, SessionLease, PULSE_BASE_SECS, PULSE_JITTER_SECS,
    ROTATE_MARGIN_SECS,
};
pub use principal::{
    GameSessionPrincipal, GameTokenPrincipal, Principal, RequestIdentity, SessionSubject, UserPrincipal,
};
pub use resolver::{bearer_token, parse_cookie, PrincipalResolver};

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::password::{self, PasswordError};
use crate::rid::Rid;
use crate::store::{AuthStore, StoreError, UserRecord};
use crate::token::{TokenEngine, TokenRecord};

fn valid_slug(slug: &str) -> bool {
    (2..=64).contains(&slug.len())
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn valid_password(pass: &str) -> bool {
    (10..=32).contains(&pass.len())
        && pass.chars().all(|c| c.is_ascii_alphanumeric() || "!@#$%^&*".contains(c))
}

/// Owns the token engine, the persistence handle, and the resolver. All
/// configuration is injected at construction; the service holds no mutable
/// state of its own.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    engine: Arc<TokenEngine>,
    config: Arc<AuthConfig>,
    resolver: PrincipalResolver,
}

impl AuthService {
    pub fn new(store: Arc<dyn AuthStore>, config: AuthConfig) -> Self {
        let engine = Arc::new(TokenEngine::new(
            config.token_secret.as_bytes(),
            config.issuer.clone(),
            config.audience.clone(),
        ));
        let resolver = PrincipalResolver::new(store.clone(), engine.clone(), config.cookie_name.clone());
        Self { store, engine, config: Arc::new(config), resolver }
    }

    pub fn resolver(&self) -> &PrincipalResolver {
        &self.resolver
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    pub(crate) fn engine(&self) -> &TokenEngine {
        &self.engine
    }

    /// Create an account. The password is hashed on the blocking pool so the
    /// memory-hard KDF cannot stall unrelated requests.
    pub async fn add_new_user(
        &self,
        slug: &str,
        pass: &str,
        email: Option<&str>,
        display_name: &str,
    ) -> AppResult<UserRecord> {
        if !valid_slug(slug) {
            return Err(AppError::user("invalid_slug", "slug must be 2-64 lowercase-alphanum characters with dashes"));
        }
        if !valid_password(pass) {
            return Err(AppError::user("invalid_password", "password must be 10-32 alphanum characters with specials"));
        }

        let params = self.config.argon;
        let pass = pass.to_string();
        let encoded = tokio::task::spawn_blocking(move || password::encode_password(&pass, &params))
            .await
            .map_err(|e| AppError::internal("hash_task", e.to_string()))?
            .map_err(|e| AppError::internal("hash_failed", e.to_string()))?;

        match self.store.create_user(slug, &encoded, email, display_name).await {
            Ok(user) => Ok(user),
            Err(StoreError::SlugInUse) => {
                Err(AppError::conflict("slug_in_use", "the user slug is already in use"))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Issue and persist a user-session token. Subject is the user's RID.
    pub async fn create_session_token(&self, user_id: Uuid) -> AppResult<(String, TokenRecord)> {
        let now = Utc::now();
        let subject = Rid::user(user_id).to_string();
        let (signed, record) = self
            .engine
            .issue(&subject, now - self.config.session_jitter, now + self.config.session_duration)?;
        self.store.create_token(&record).await?;
        Ok((signed, record))
    }

    /// Verify credentials and mint a session. Unknown slug and wrong password
    /// are deliberately indistinguishable to the caller.
    pub async fn sign_in(&self, slug: &str, pass: &str) -> AppResult<(UserRecord, String, TokenRecord)> {
        let denied = || AppError::not_found("bad_credentials", "slug or password don't match");

        let Some(user) = self.store.find_user_by_slug(slug).await? else {
            return Err(denied());
        };

        let encoded = user.password_hash.clone();
        let pass = pass.to_string();
        let verified = tokio::task::spawn_blocking(move || password::verify_password(&pass, &encoded))
            .await
            .map_err(|e| AppError::internal("hash_task", e.to_string()))?;
        match verified {
            Ok(()) => {}
            Err(PasswordError::HashMismatch) => return Err(denied()),
            Err(err) => {
                // a stored envelope that fails to parse is a data-integrity
                // problem, not a bad login; deny without leaking which
                tracing::warn!(target: "auth", slug, "stored credential envelope rejected: {err}");
                return Err(denied());
            }
        }

        let (signed, token) = self.create_session_token(user.id).await?;
        Ok((user, signed, token))
    }

    /// Write the revocation marker for the principal's token. Verification
    /// does not consult the marker; tokens age out on their own and the
    /// marker exists for audit queries.
    pub async fn sign_out(&self, principal: &UserPrincipal) -> AppResult<()> {
        self.store.disallow_token(principal.token_id).await?;
        Ok(())
    }

    /// Ensure the root admin account exists. Run once at startup when the
    /// root password is configured; an existing account is left as is.
    pub async fn seed_root_admin(&self, slug: &str, pass: &str) -> AppResult<UserRecord> {
        if let Some(existing) = self.store.find_user_by_slug(slug).await? {
            return Ok(existing);
        }
        let user = self.add_new_user(slug, pass, None, "Root Admin").await?;
        Ok(self.store.promote_admin(user.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(valid_slug("ab"));
        assert!(valid_slug("some-user-42"));
        assert!(!valid_slug("a"));
        assert!(!valid_slug("Uppercase"));
        assert!(!valid_slug("has space"));
        assert!(!valid_slug(&"x".repeat(65)));
    }

    #[test]
    fn password_validation() {
        assert!(valid_password("Sw0rdfish!!"));
        assert!(!valid_password("short"));
        assert!(!valid_password("has a space 123"));
        assert!(!valid_password(&"p".repeat(33)));
    }
}
