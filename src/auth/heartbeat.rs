//! Game session lifecycle and heartbeat coordination
//! -------------------------------------------------
//! Sessions are opened with a Game Token principal and kept alive by
//! heartbeats. Each heartbeat picks a jittered next interval (360s ± 180s, so
//! a fleet of sessions never renews in lockstep) and then decides: if the
//! current token would expire before the next expected heartbeat (minus a
//! 60s safety margin), mint a brand-new session+token pair; otherwise just
//! bump `last_pulse_at`. An expired session is unrecoverable — the client
//! must open a new one with its Game Token.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::AppResult;
use crate::rid::Rid;
use crate::store::GameSessionRecord;

use super::principal::{GameSessionPrincipal, GameTokenPrincipal, SessionSubject};
use super::AuthService;

pub const PULSE_BASE_SECS: i64 = 360;
pub const PULSE_JITTER_SECS: i64 = 180;
pub const ROTATE_MARGIN_SECS: i64 = 60;

/// Next-heartbeat interval: 360s plus uniform jitter in [-180s, +180s).
pub fn jittered_pulse_interval() -> Duration {
    let jitter = rand::thread_rng().gen_range(-PULSE_JITTER_SECS..PULSE_JITTER_SECS);
    Duration::seconds(PULSE_BASE_SECS + jitter)
}

/// True when the current token will not survive until the next expected
/// heartbeat. The margin covers request latency so the caller never arrives
/// with an already-expired token.
pub fn should_rotate(now: DateTime<Utc>, expires_at: DateTime<Utc>, next_pulse_after: Duration) -> bool {
    now + next_pulse_after - Duration::seconds(ROTATE_MARGIN_SECS) > expires_at
}

/// What a session-open or heartbeat call hands back to the game client.
#[derive(Debug, Clone)]
pub struct SessionLease {
    pub session_rid: Rid,
    pub last_pulse_at: DateTime<Utc>,
    /// Schedule the next heartbeat close to this long from now.
    pub next_pulse_after: Duration,
    /// Present when a new token was minted; the caller must switch to it.
    /// Absent on a touch-only heartbeat.
    pub token: Option<String>,
}

impl AuthService {
    /// Mint a session+token pair and persist both atomically.
    async fn mint_session(
        &self,
        game_token_id: Uuid,
        user_rid: &Rid,
        game_rid: &Rid,
    ) -> AppResult<(String, GameSessionRecord)> {
        let now = Utc::now();
        let session_id = Uuid::now_v7();
        let subject = SessionSubject {
            user: user_rid.clone(),
            game: game_rid.clone(),
            session: Rid::game_session(session_id),
        };
        let (signed, token) = self.engine().issue(
            &subject.to_string(),
            now - self.config().session_jitter,
            now + self.config().game_session_duration,
        )?;
        let session = GameSessionRecord {
            id: session_id,
            user_id: user_rid.id,
            game_id: game_rid.id,
            game_token_id,
            token_id: token.id,
            created_at: now,
            last_pulse_at: now,
        };
        self.store().create_game_session(&session, &token).await?;
        Ok((signed, session))
    }

    /// Open a fresh game session for the (user, game) pair a Game Token grants.
    pub async fn open_game_session(&self, principal: &GameTokenPrincipal) -> AppResult<SessionLease> {
        let (signed, session) = self
            .mint_session(principal.token_id, &principal.user_rid, &principal.game_rid)
            .await?;
        tracing::debug!(target: "auth", session = %Rid::game_session(session.id), "game session opened");
        Ok(SessionLease {
            session_rid: Rid::game_session(session.id),
            last_pulse_at: session.last_pulse_at,
            next_pulse_after: jittered_pulse_interval(),
            token: Some(signed),
        })
    }

    /// One heartbeat: rotate the session if its token won't last until the
    /// next expected pulse, otherwise touch `last_pulse_at` in place.
    pub async fn heartbeat_game_session(
        &self,
        principal: &GameSessionPrincipal,
    ) -> AppResult<SessionLease> {
        let next_pulse_after = jittered_pulse_interval();
        let now = Utc::now();

        if should_rotate(now, principal.expires_at, next_pulse_after) {
            let (signed, session) = self
                .mint_session(principal.game_token_id, &principal.user_rid, &principal.game_rid)
                .await?;
            tracing::debug!(
                target: "auth",
                old = %principal.session_rid,
                new = %Rid::game_session(session.id),
                "game session rotated"
            );
            Ok(SessionLease {
                session_rid: Rid::game_session(session.id),
                last_pulse_at: session.last_pulse_at,
                next_pulse_after,
                token: Some(signed),
            })
        } else {
            let last_pulse_at = self.store().heartbeat_session(principal.session_rid.id, now).await?;
            Ok(SessionLease {
                session_rid: principal.session_rid.clone(),
                last_pulse_at,
                next_pulse_after,
                token: None,
            })
        }
    }
}
