//! Resolved request identities: one of three mutually exclusive principal
//! kinds, plus the structured subject path grammar used by game-session
//! tokens.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::rid::{Rid, GAME_PREFIX, GAME_SESSION_PREFIX, USER_PREFIX};
use crate::store::UserRecord;
use crate::token::RegisteredClaims;

/// A signed-in human user, resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct UserPrincipal {
    pub user: UserRecord,
    pub token_id: Uuid,
    pub claims: RegisteredClaims,
}

impl UserPrincipal {
    pub fn rid(&self) -> Rid {
        Rid::user(self.user.id)
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin
    }
}

/// A game acting on behalf of a user via its long-lived opaque token.
#[derive(Debug, Clone)]
pub struct GameTokenPrincipal {
    pub token_id: Uuid,
    pub user_rid: Rid,
    pub game_rid: Rid,
}

/// An active play session, resolved from a short-lived bearer claims token.
#[derive(Debug, Clone)]
pub struct GameSessionPrincipal {
    pub session_rid: Rid,
    pub user_rid: Rid,
    pub game_rid: Rid,
    pub game_token_id: Uuid,
    pub last_pulse_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Principal {
    User(UserPrincipal),
    GameToken(GameTokenPrincipal),
    GameSession(GameSessionPrincipal),
}

/// Per-request identity, populated once by the resolver and carried
/// explicitly through the call chain. `None` means anonymous.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub principal: Option<Principal>,
}

impl RequestIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&UserPrincipal> {
        match &self.principal {
            Some(Principal::User(p)) => Some(p),
            _ => None,
        }
    }

    pub fn game_token(&self) -> Option<&GameTokenPrincipal> {
        match &self.principal {
            Some(Principal::GameToken(p)) => Some(p),
            _ => None,
        }
    }

    pub fn game_session(&self) -> Option<&GameSessionPrincipal> {
        match &self.principal {
            Some(Principal::GameSession(p)) => Some(p),
            _ => None,
        }
    }
}

/// Subject path carried by game-session tokens:
/// `users/v1/{userRID}/games/{gameRID}/sessions/{sessionRID}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubject {
    pub user: Rid,
    pub game: Rid,
    pub session: Rid,
}

impl SessionSubject {
    /// Strict grammar: exactly 7 slash-delimited segments, fixed literals,
    /// and each embedded RID decoded with its expected kind tag.
    pub fn parse(subject: &str) -> Option<Self> {
        let parts: Vec<&str> = subject.split('/').collect();
        if parts.len() != 7
            || parts[0] != "users"
            || parts[1] != "v1"
            || parts[3] != "games"
            || parts[5] != "sessions"
        {
            return None;
        }
        let user: Rid = parts[2].parse().ok()?;
        if user.prefix != USER_PREFIX {
            return None;
        }
        let game: Rid = parts[4].parse().ok()?;
        if game.prefix != GAME_PREFIX {
            return None;
        }
        let session: Rid = parts[6].parse().ok()?;
        if session.prefix != GAME_SESSION_PREFIX {
            return None;
        }
        Some(Self { user, game, session })
    }
}

impl Display for SessionSubject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "users/v1/{}/games/{}/sessions/{}", self.user, self.game, self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SessionSubject {
        SessionSubject {
            user: Rid::user(Uuid::now_v7()),
            game: Rid::game(Uuid::now_v7()),
            session: Rid::game_session(Uuid::now_v7()),
        }
    }

    #[test]
    fn subject_round_trip() {
        let s = subject();
        assert_eq!(SessionSubject::parse(&s.to_string()), Some(s));
    }

    #[test]
    fn subject_rejects_wrong_literals() {
        let s = subject().to_string();
        assert!(SessionSubject::parse(&s.replacen("v1", "v2", 1)).is_none());
        assert!(SessionSubject::parse(&s.replacen("users", "accounts", 1)).is_none());
        assert!(SessionSubject::parse(&s.replacen("/games/", "/game/", 1)).is_none());
    }

    #[test]
    fn subject_rejects_missing_segment() {
        let s = subject().to_string();
        let truncated = s.rsplit_once('/').unwrap().0;
        assert!(SessionSubject::parse(truncated).is_none());
        assert!(SessionSubject::parse(&format!("{s}/extra")).is_none());
    }

    #[test]
    fn subject_rejects_wrong_kind_tags() {
        let s = subject();
        // a user RID in the session slot decodes fine but has the wrong tag
        let swapped = format!("users/v1/{}/games/{}/sessions/{}", s.user, s.game, s.user);
        assert!(SessionSubject::parse(&swapped).is_none());
        let swapped = format!("users/v1/{}/games/{}/sessions/{}", s.session, s.game, s.session);
        assert!(SessionSubject::parse(&swapped).is_none());
    }
}
