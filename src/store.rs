//! Persistence interface boundary
//! ------------------------------
//! Record shapes and the `AuthStore` trait covering exactly the lookups and
//! writes the identity core needs. Real row storage (users, games,
//! achievements) lives behind this trait; `MemoryStore` is the in-process
//! implementation used by the default server wiring and by tests. It keeps
//! every table behind one `parking_lot::RwLock`, which is what makes the
//! session+token pair write atomic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::token::TokenRecord;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Long-lived opaque credential binding one user to one game.
#[derive(Debug, Clone)]
pub struct GameTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub game_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One active play session. 1:1 with a currently-valid token record; never
/// hard-deleted, it just becomes unreachable once its token expires.
#[derive(Debug, Clone)]
pub struct GameSessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub game_id: Uuid,
    pub game_token_id: Uuid,
    pub token_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_pulse_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("the user slug is already in use")]
    SlugInUse,
    #[error("record not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Internal(String),
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn create_user(
        &self,
        slug: &str,
        password_hash: &str,
        email: Option<&str>,
        display_name: &str,
    ) -> Result<UserRecord, StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;
    async fn find_user_by_slug(&self, slug: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Set the admin flag on an existing user and return the updated record.
    async fn promote_admin(&self, user_id: Uuid) -> Result<UserRecord, StoreError>;

    async fn create_token(&self, token: &TokenRecord) -> Result<(), StoreError>;
    /// Write the revocation marker for a token. Verification does not consult
    /// this marker; it exists for audit and a future revocation story.
    async fn disallow_token(&self, token_id: Uuid) -> Result<(), StoreError>;
    async fn is_token_disallowed(&self, token_id: Uuid) -> Result<bool, StoreError>;

    async fn create_game_token(&self, user_id: Uuid, game_id: Uuid) -> Result<GameTokenRecord, StoreError>;
    async fn find_game_token(&self, token_id: Uuid) -> Result<Option<GameTokenRecord>, StoreError>;

    /// Persist a new session and its token as a single atomic unit.
    async fn create_game_session(
        &self,
        session: &GameSessionRecord,
        token: &TokenRecord,
    ) -> Result<(), StoreError>;
    /// Look up the session matching the full (token, user, game, session)
    /// tuple from a verified game-session token.
    async fn get_valid_session(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        game_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<GameSessionRecord>, StoreError>;
    /// Bump `last_pulse_at` in place (last writer wins) and return it.
    async fn heartbeat_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    slugs: HashMap<String, Uuid>,
    tokens: HashMap<Uuid, TokenRecord>,
    disallowed: HashSet<Uuid>,
    game_tokens: HashMap<Uuid, GameTokenRecord>,
    sessions: HashMap<Uuid, GameSessionRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user(
        &self,
        slug: &str,
        password_hash: &str,
        email: Option<&str>,
        display_name: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        if tables.slugs.contains_key(slug) {
            return Err(StoreError::SlugInUse);
        }
        let user = UserRecord {
            id: Uuid::now_v7(),
            slug: slug.to_string(),
            display_name: display_name.to_string(),
            email: email.map(str::to_string),
            password_hash: password_hash.to_string(),
            is_admin: false,
            created_at: Utc::now(),
        };
        tables.slugs.insert(user.slug.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_slug(&self, slug: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.slugs.get(slug).and_then(|id| tables.users.get(id)).cloned())
    }

    async fn promote_admin(&self, user_id: Uuid) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_admin = true;
        Ok(user.clone())
    }

    async fn create_token(&self, token: &TokenRecord) -> Result<(), StoreError> {
        self.tables.write().tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn disallow_token(&self, token_id: Uuid) -> Result<(), StoreError> {
        self.tables.write().disallowed.insert(token_id);
        Ok(())
    }

    async fn is_token_disallowed(&self, token_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.read().disallowed.contains(&token_id))
    }

    async fn create_game_token(&self, user_id: Uuid, game_id: Uuid) -> Result<GameTokenRecord, StoreError> {
        let record = GameTokenRecord { id: Uuid::now_v7(), user_id, game_id, created_at: Utc::now() };
        self.tables.write().game_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_game_token(&self, token_id: Uuid) -> Result<Option<GameTokenRecord>, StoreError> {
        Ok(self.tables.read().game_tokens.get(&token_id).cloned())
    }

    async fn create_game_session(
        &self,
        session: &GameSessionRecord,
        token: &TokenRecord,
    ) -> Result<(), StoreError> {
        // both rows land under one write guard
        let mut tables = self.tables.write();
        tables.tokens.insert(token.id, token.clone());
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_valid_session(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        game_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<GameSessionRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .sessions
            .get(&session_id)
            .filter(|s| s.token_id == token_id && s.user_id == user_id && s.game_id == game_id)
            .cloned())
    }

    async fn heartbeat_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        let mut tables = self.tables.write();
        let session = tables.sessions.get_mut(&session_id).ok_or(StoreError::NotFound)?;
        session.last_pulse_at = now;
        Ok(session.last_pulse_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slug_uniqueness() {
        let store = MemoryStore::new();
        store.create_user("dupe", "$hash", None, "").await.unwrap();
        let err = store.create_user("dupe", "$hash", None, "").await.unwrap_err();
        assert!(matches!(err, StoreError::SlugInUse));
    }

    #[tokio::test]
    async fn promote_admin_sets_the_flag() {
        let store = MemoryStore::new();
        let user = store.create_user("boss", "$hash", None, "").await.unwrap();
        assert!(!user.is_admin);
        let promoted = store.promote_admin(user.id).await.unwrap();
        assert!(promoted.is_admin);
        assert!(store.find_user(user.id).await.unwrap().unwrap().is_admin);
        assert!(matches!(store.promote_admin(Uuid::now_v7()).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn valid_session_requires_full_tuple_match() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let session = GameSessionRecord {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            game_id: Uuid::now_v7(),
            game_token_id: Uuid::now_v7(),
            token_id: Uuid::now_v7(),
            created_at: now,
            last_pulse_at: now,
        };
        let token = TokenRecord {
            id: session.token_id,
            issuer: "openstats".into(),
            subject: "sub".into(),
            audience: "openstats".into(),
            issued_at: now,
            not_before: now,
            expires_at: now,
        };
        store.create_game_session(&session, &token).await.unwrap();

        let found = store
            .get_valid_session(session.token_id, session.user_id, session.game_id, session.id)
            .await
            .unwrap();
        assert!(found.is_some());

        // any mismatching element of the tuple yields nothing
        let miss = store
            .get_valid_session(Uuid::now_v7(), session.user_id, session.game_id, session.id)
            .await
            .unwrap();
        assert!(miss.is_none());
        let miss = store
            .get_valid_session(session.token_id, Uuid::now_v7(), session.game_id, session.id)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn heartbeat_bumps_last_pulse() {
        let store = MemoryStore::new();
        let created = Utc::now() - chrono::Duration::minutes(10);
        let session = GameSessionRecord {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            game_id: Uuid::now_v7(),
            game_token_id: Uuid::now_v7(),
            token_id: Uuid::now_v7(),
            created_at: created,
            last_pulse_at: created,
        };
        let token = TokenRecord {
            id: session.token_id,
            issuer: "openstats".into(),
            subject: "sub".into(),
            audience: "openstats".into(),
            issued_at: created,
            not_before: created,
            expires_at: created,
        };
        store.create_game_session(&session, &token).await.unwrap();

        let now = Utc::now();
        let bumped = store.heartbeat_session(session.id, now).await.unwrap();
        assert_eq!(bumped, now);
        assert!(matches!(
            store.heartbeat_session(Uuid::now_v7(), now).await,
            Err(StoreError::NotFound)
        ));
    }
}
