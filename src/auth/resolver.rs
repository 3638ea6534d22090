//! Principal resolution
//! --------------------
//! Three independent, optimistic resolution procedures. A malformed or
//! unverifiable credential at any step yields `Ok(None)` — the request simply
//! proceeds anonymous for that scheme, and only a later authorization gate
//! turns "no principal" into a rejection. Persistence failures are the one
//! exception: they propagate as errors instead of masquerading as anonymity.

use std::sync::Arc;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::rid::{Rid, GAME_TOKEN_PREFIX, USER_PREFIX};
use crate::store::{AuthStore, StoreError};
use crate::token::TokenEngine;

use super::principal::{
    GameSessionPrincipal, GameTokenPrincipal, Principal, RequestIdentity, SessionSubject, UserPrincipal,
};

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie")?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[derive(Clone)]
pub struct PrincipalResolver {
    store: Arc<dyn AuthStore>,
    engine: Arc<TokenEngine>,
    cookie_name: String,
}

impl PrincipalResolver {
    pub fn new(store: Arc<dyn AuthStore>, engine: Arc<TokenEngine>, cookie_name: impl Into<String>) -> Self {
        Self { store, engine, cookie_name: cookie_name.into() }
    }

    /// Populate the request identity for a cookie-authenticated route.
    pub async fn identify_user(&self, headers: &HeaderMap) -> Result<RequestIdentity, StoreError> {
        Ok(match self.resolve_user(headers).await? {
            Some(p) => RequestIdentity { principal: Some(Principal::User(p)) },
            None => RequestIdentity::anonymous(),
        })
    }

    /// Populate the request identity for a game-token bearer route.
    pub async fn identify_game_token(&self, headers: &HeaderMap) -> Result<RequestIdentity, StoreError> {
        Ok(match self.resolve_game_token(headers).await? {
            Some(p) => RequestIdentity { principal: Some(Principal::GameToken(p)) },
            None => RequestIdentity::anonymous(),
        })
    }

    /// Populate the request identity for a game-session bearer route.
    pub async fn identify_game_session(&self, headers: &HeaderMap) -> Result<RequestIdentity, StoreError> {
        Ok(match self.resolve_game_session(headers).await? {
            Some(p) => RequestIdentity { principal: Some(Principal::GameSession(p)) },
            None => RequestIdentity::anonymous(),
        })
    }

    /// Cookie -> verified user-session claims -> user RID subject -> user row.
    pub async fn resolve_user(&self, headers: &HeaderMap) -> Result<Option<UserPrincipal>, StoreError> {
        let Some(cookie) = parse_cookie(headers, &self.cookie_name) else {
            return Ok(None);
        };
        let Some(claims) = self.engine.verify(&cookie, false) else {
            return Ok(None);
        };
        let Ok(subject) = claims.sub.parse::<Rid>() else {
            return Ok(None);
        };
        if subject.prefix != USER_PREFIX {
            return Ok(None);
        }
        let Some(user) = self.store.find_user(subject.id).await? else {
            return Ok(None);
        };
        let Ok(token_id) = Uuid::parse_str(&claims.jti) else {
            return Ok(None);
        };
        Ok(Some(UserPrincipal { user, token_id, claims }))
    }

    /// Bearer opaque secret (a game-token RID) -> the (user, game) association
    /// it grants. No signature involved; possession is the credential.
    pub async fn resolve_game_token(&self, headers: &HeaderMap) -> Result<Option<GameTokenPrincipal>, StoreError> {
        let Some(bearer) = bearer_token(headers) else {
            return Ok(None);
        };
        let Ok(secret) = bearer.parse::<Rid>() else {
            return Ok(None);
        };
        if secret.prefix != GAME_TOKEN_PREFIX {
            return Ok(None);
        }
        let Some(record) = self.store.find_game_token(secret.id).await? else {
            return Ok(None);
        };
        Ok(Some(GameTokenPrincipal {
            token_id: record.id,
            user_rid: Rid::user(record.user_id),
            game_rid: Rid::game(record.game_id),
        }))
    }

    /// Bearer claims token (expiration mandatory) -> structured subject path
    /// -> (token, user, game, session) tuple matched against a live session.
    pub async fn resolve_game_session(&self, headers: &HeaderMap) -> Result<Option<GameSessionPrincipal>, StoreError> {
        let Some(bearer) = bearer_token(headers) else {
            return Ok(None);
        };
        let Some(claims) = self.engine.verify(bearer, true) else {
            return Ok(None);
        };
        let Some(subject) = SessionSubject::parse(&claims.sub) else {
            return Ok(None);
        };
        let Ok(token_id) = Uuid::parse_str(&claims.jti) else {
            return Ok(None);
        };
        let Some(expires_at) = chrono::DateTime::from_timestamp(claims.exp, 0) else {
            return Ok(None);
        };
        let Some(session) = self
            .store
            .get_valid_session(token_id, subject.user.id, subject.game.id, subject.session.id)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(GameSessionPrincipal {
            session_rid: subject.session,
            user_rid: subject.user,
            game_rid: subject.game,
            game_token_id: session.game_token_id,
            last_pulse_at: session.last_pulse_at,
            expires_at,
        }))
    }
}
