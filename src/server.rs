//!
//! openstats HTTP server
//! ---------------------
//! Axum surface for the identity protocol: account sign-up/sign-in/sign-out,
//! session introspection, and the game-session open/heartbeat endpoints.
//!
//! Responsibilities:
//! - Session cookie issuance mirroring the token's expiry (Secure,
//!   SameSite=Strict).
//! - Principal resolution per route: user scheme via cookie, game token and
//!   game session schemes via the Authorization header.
//! - The authorization gate: handlers that require a principal reject with
//!   401 when resolution yielded none.
//! - Rotated game-session tokens delivered in the `X-Game-Session-Token`
//!   response header.
//!
//! Profile, achievement, and admin routers are mounted elsewhere; this module
//! only wires the credential surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::auth::{AuthService, GameSessionPrincipal, GameTokenPrincipal, SessionLease};
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::rid::Rid;
use crate::store::MemoryStore;

pub const GAME_SESSION_TOKEN_HEADER: &str = "x-game-session-token";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
}

pub fn router(auth: AuthService) -> Router {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/session", get(get_session))
        .route("/users/{user}/games/{game}/sessions", post(create_game_session))
        .route("/users/{user}/games/{game}/sessions/{session}/heartbeat", post(heartbeat_game_session))
        .with_state(AppState { auth })
}

/// Convenience entry point: in-memory store, config from the environment.
pub async fn run() -> anyhow::Result<()> {
    let port = std::env::var("OPENSTATS_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    run_with_port(port, AuthConfig::from_env()).await
}

pub async fn run_with_port(port: u16, config: AuthConfig) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let auth = AuthService::new(store, config);
    match std::env::var("OPENSTATS_ROOT_ADMIN_PASSWORD") {
        Ok(pass) if !pass.is_empty() => {
            let admin = auth.seed_root_admin("root", &pass).await?;
            info!(target: "startup", "root admin account ready: {}", Rid::user(admin.id));
        }
        _ => {}
    }
    let app = router(auth);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(target: "startup", "openstats listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

type Reply = (StatusCode, HeaderMap, Json<Value>);

fn error_response(err: AppError) -> Reply {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(target: "http", "{err}");
    }
    (
        status,
        HeaderMap::new(),
        Json(json!({"status": "error", "code": err.code_str(), "message": err.message()})),
    )
}

fn session_cookie(config: &AuthConfig, value: &str, expires_at: DateTime<Utc>) -> HeaderValue {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let expires = expires_at.format("%a, %d %b %Y %H:%M:%S GMT");
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={}; Max-Age={}; Expires={}; HttpOnly{}; SameSite=Strict; Path=/",
        config.cookie_name, value, max_age, expires, secure
    ))
    .unwrap()
}

fn clear_session_cookie(config: &AuthConfig) -> HeaderValue {
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly{}; SameSite=Strict; Path=/",
        config.cookie_name, secure
    ))
    .unwrap()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpPayload {
    slug: String,
    password: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

async fn sign_up(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<SignUpPayload>) -> Reply {
    match state.auth.resolver().identify_user(&headers).await {
        Ok(identity) if identity.user().is_some() => {
            return error_response(AppError::auth("already_signed_in", "already signed in"))
        }
        Ok(_) => {}
        Err(err) => return error_response(err.into()),
    }

    let user = match state
        .auth
        .add_new_user(
            &payload.slug,
            &payload.password,
            payload.email.as_deref(),
            payload.display_name.as_deref().unwrap_or(""),
        )
        .await
    {
        Ok(user) => user,
        Err(err) => return error_response(err),
    };

    let (signed, token) = match state.auth.create_session_token(user.id).await {
        Ok(pair) => pair,
        Err(err) => return error_response(err),
    };

    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", session_cookie(state.auth.config(), &signed, token.expires_at));
    (
        StatusCode::OK,
        h,
        Json(json!({
            "rid": Rid::user(user.id),
            "slug": user.slug,
            "displayName": user.display_name,
            "email": user.email,
        })),
    )
}

#[derive(Debug, Deserialize)]
struct SignInPayload {
    slug: String,
    password: String,
}

async fn sign_in(State(state): State<AppState>, Json(payload): Json<SignInPayload>) -> Reply {
    match state.auth.sign_in(&payload.slug, &payload.password).await {
        Ok((user, signed, token)) => {
            let mut h = HeaderMap::new();
            h.insert("Set-Cookie", session_cookie(state.auth.config(), &signed, token.expires_at));
            (
                StatusCode::OK,
                h,
                Json(json!({"rid": Rid::user(user.id), "slug": user.slug, "displayName": user.display_name})),
            )
        }
        Err(err) => error_response(err),
    }
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Reply {
    match state.auth.resolver().identify_user(&headers).await {
        Ok(identity) => {
            if let Some(principal) = identity.user() {
                if let Err(err) = state.auth.sign_out(principal).await {
                    return error_response(err);
                }
            }
        }
        Err(err) => return error_response(err.into()),
    }

    // no matter what, always expire the session cookie
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie(state.auth.config()));
    (StatusCode::OK, h, Json(json!({"status": "ok"})))
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Reply {
    let identity = match state.auth.resolver().identify_user(&headers).await {
        Ok(identity) => identity,
        Err(err) => return error_response(err.into()),
    };
    match identity.user() {
        Some(principal) => (
            StatusCode::OK,
            HeaderMap::new(),
            Json(json!({
                "rid": principal.rid(),
                "slug": principal.user.slug,
                "displayName": principal.user.display_name,
                "isAdmin": principal.is_admin(),
            })),
        ),
        None => error_response(AppError::auth("no_session", "no session")),
    }
}

/// Full-RID comparison: the kind tag is part of identity, so a matching UUID
/// under the wrong tag does not pass.
fn grant_matches(principal: &GameTokenPrincipal, user: &Rid, game: &Rid) -> bool {
    principal.user_rid == *user && principal.game_rid == *game
}

fn session_matches(principal: &GameSessionPrincipal, user: &Rid, game: &Rid, session: &Rid) -> bool {
    principal.user_rid == *user && principal.game_rid == *game && principal.session_rid == *session
}

fn lease_body(lease: &SessionLease, user_rid: &Rid, game_rid: &Rid) -> Value {
    json!({
        "rid": lease.session_rid,
        "lastPulse": lease.last_pulse_at.timestamp(),
        "nextPulseAfter": lease.next_pulse_after.num_seconds(),
        "user": {"rid": user_rid},
        "game": {"rid": game_rid},
    })
}

async fn create_game_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user, game)): Path<(String, String)>,
) -> Reply {
    let (Ok(user_rid), Ok(game_rid)) = (user.parse::<Rid>(), game.parse::<Rid>()) else {
        return error_response(AppError::user("invalid_rid", "path RIDs are malformed"));
    };

    let identity = match state.auth.resolver().identify_game_token(&headers).await {
        Ok(identity) => identity,
        Err(err) => return error_response(err.into()),
    };
    let Some(principal) = identity.game_token() else {
        return error_response(AppError::auth(
            "game_token_required",
            "creating a game session requires a user-supplied game token",
        ));
    };

    if !grant_matches(principal, &user_rid, &game_rid) {
        return error_response(AppError::auth(
            "wrong_association",
            "sessions may only be created for the user and game the game token is associated with",
        ));
    }

    match state.auth.open_game_session(principal).await {
        Ok(lease) => {
            let mut h = HeaderMap::new();
            if let Some(token) = &lease.token {
                if let Ok(value) = HeaderValue::from_str(token) {
                    h.insert(GAME_SESSION_TOKEN_HEADER, value);
                }
            }
            let body = lease_body(&lease, &principal.user_rid, &principal.game_rid);
            (StatusCode::OK, h, Json(body))
        }
        Err(err) => error_response(err),
    }
}

async fn heartbeat_game_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user, game, session)): Path<(String, String, String)>,
) -> Reply {
    let (Ok(user_rid), Ok(game_rid), Ok(session_rid)) =
        (user.parse::<Rid>(), game.parse::<Rid>(), session.parse::<Rid>())
    else {
        return error_response(AppError::user("invalid_rid", "path RIDs are malformed"));
    };

    let identity = match state.auth.resolver().identify_game_session(&headers).await {
        Ok(identity) => identity,
        Err(err) => return error_response(err.into()),
    };
    let Some(principal) = identity.game_session() else {
        return error_response(AppError::auth(
            "game_session_required",
            "heartbeats must be authenticated with a game session token",
        ));
    };

    if !session_matches(principal, &user_rid, &game_rid, &session_rid) {
        return error_response(AppError::auth(
            "wrong_session",
            "heartbeats may only target the session the token was issued for",
        ));
    }

    match state.auth.heartbeat_game_session(principal).await {
        Ok(lease) => {
            let mut h = HeaderMap::new();
            if let Some(token) = &lease.token {
                if let Ok(value) = HeaderValue::from_str(token) {
                    h.insert(GAME_SESSION_TOKEN_HEADER, value);
                }
            }
            let body = lease_body(&lease, &principal.user_rid, &principal.game_rid);
            (StatusCode::OK, h, Json(body))
        }
        Err(err) => error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn grant_check_compares_kind_tags_too() {
        let user = Uuid::now_v7();
        let game = Uuid::now_v7();
        let principal = GameTokenPrincipal {
            token_id: Uuid::now_v7(),
            user_rid: Rid::user(user),
            game_rid: Rid::game(game),
        };
        assert!(grant_matches(&principal, &Rid::user(user), &Rid::game(game)));
        // the same UUIDs under the wrong tags are different resources
        assert!(!grant_matches(&principal, &Rid::game(user), &Rid::game(game)));
        assert!(!grant_matches(&principal, &Rid::user(user), &Rid::user(game)));
        assert!(!grant_matches(&principal, &Rid::user(game), &Rid::game(user)));
    }

    #[test]
    fn session_check_compares_kind_tags_too() {
        let user = Uuid::now_v7();
        let game = Uuid::now_v7();
        let session = Uuid::now_v7();
        let principal = GameSessionPrincipal {
            session_rid: Rid::game_session(session),
            user_rid: Rid::user(user),
            game_rid: Rid::game(game),
            game_token_id: Uuid::now_v7(),
            last_pulse_at: Utc::now(),
            expires_at: Utc::now(),
        };
        assert!(session_matches(&principal, &Rid::user(user), &Rid::game(game), &Rid::game_session(session)));
        assert!(!session_matches(&principal, &Rid::user(user), &Rid::game(game), &Rid::game(session)));
        assert!(!session_matches(&principal, &Rid::game_token(user), &Rid::game(game), &Rid::game_session(session)));
    }
}
