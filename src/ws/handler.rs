//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{verify_jwt, JwtClaims};
use crate::matchmaking::Participant;
use crate::store::{ensure_identity, Identity};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Look up (or create) the identity behind a token. Store failures fall back
/// to an unpersisted identity so the player can still play.
async fn resolve_identity(state: &AppState, claims: &JwtClaims) -> Identity {
    let name = claims.display_name();
    match ensure_identity(state.store.as_ref(), claims.sub, &name).await {
        Ok(identity) => identity,
        Err(e) => {
            error!(user_id = %claims.sub, error = %e, "Failed to load identity");
            Identity::new(claims.sub, name)
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, claims: JwtClaims, state: AppState) {
    let user_id = claims.sub;
    info!(user_id = %user_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let identity = resolve_identity(&state, &claims).await;
    if identity.is_banned {
        warn!(user_id = %user_id, "Banned player refused");
        let reason = identity
            .ban_reason
            .unwrap_or_else(|| "Account banned".to_string());
        let _ = send_msg(&mut ws_sink, &ServerMsg::error("banned", reason)).await;
        let _ = ws_sink.close().await;
        return;
    }

    let (connection_id, mut outbound) = state.hub.register(user_id);
    state.hub.send_to(
        user_id,
        ServerMsg::Welcome {
            user_id,
            rating: identity.mmr,
            server_time: unix_millis(),
        },
    );

    // Writer task: hub queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let participant = Participant {
        user_id,
        display_name: identity.username,
    };
    let rate_limiter = PlayerRateLimiter::new();

    // Reader loop: WebSocket -> lobby
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                        state
                            .hub
                            .send_to(user_id, ServerMsg::error("bad_message", e.to_string()));
                        continue;
                    }
                };

                if !admit(&state, &rate_limiter, user_id, &client_msg) {
                    continue;
                }

                state.lobby.handle_message(&participant, client_msg).await;
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // A newer connection for the same player keeps the lobby state
    if state.hub.unregister(user_id, connection_id) {
        state.lobby.disconnect(user_id).await;
    }
    writer_handle.abort();

    info!(user_id = %user_id, "WebSocket connection closed");
}

/// In-match traffic gets the larger rate budget
fn is_gameplay(msg: &ClientMsg) -> bool {
    matches!(
        msg,
        ClientMsg::PlayerInput { .. } | ClientMsg::ReportCollision { .. } | ClientMsg::Ping { .. }
    )
}

/// Charge a message against the sender's budget. Over the limit, the
/// message is dropped and the sender told so.
fn admit(state: &AppState, limiter: &PlayerRateLimiter, user_id: Uuid, msg: &ClientMsg) -> bool {
    let allowed = if is_gameplay(msg) {
        limiter.check_input()
    } else {
        limiter.check_lobby()
    };
    if !allowed {
        warn!(user_id = %user_id, "Rate limited client message");
        state.hub.send_to(
            user_id,
            ServerMsg::error("rate_limited", "Too many messages, slow down"),
        );
    }
    allowed
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::GameStore;
    use crate::ws::protocol::PlayerAction;

    fn claims(username: Option<&str>) -> JwtClaims {
        JwtClaims {
            sub: Uuid::new_v4(),
            exp: u64::MAX,
            iat: 0,
            username: username.map(str::to_string),
            role: None,
        }
    }

    #[test]
    fn gameplay_messages_use_input_budget() {
        let room_id = Uuid::new_v4();
        assert!(is_gameplay(&ClientMsg::PlayerInput {
            room_id,
            input: PlayerAction::Jump,
        }));
        assert!(is_gameplay(&ClientMsg::Ping { t: 1 }));
        assert!(!is_gameplay(&ClientMsg::FindMatch));
        assert!(!is_gameplay(&ClientMsg::JoinRoom { room_id }));
    }

    #[tokio::test]
    async fn throttled_lobby_message_is_answered() {
        let state = AppState::new(Config::for_tests("k"));
        let user_id = Uuid::new_v4();
        let (_, mut rx) = state.hub.register(user_id);

        let limiter = PlayerRateLimiter::new();
        let cancel = ClientMsg::CancelMatch;
        while admit(&state, &limiter, user_id, &cancel) {}

        match rx.try_recv() {
            Ok(ServerMsg::Error { code, .. }) => assert_eq!(code, "rate_limited"),
            other => panic!("expected rate_limited error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_connection_creates_identity() {
        let state = AppState::new(Config::for_tests("k"));
        let claims = claims(Some("trinity"));

        let identity = resolve_identity(&state, &claims).await;
        assert_eq!(identity.username, "trinity");
        assert_eq!(identity.mmr, crate::store::DEFAULT_RATING);

        let stored = state.store.get_identity(claims.sub).await.unwrap();
        assert_eq!(stored, Some(identity));
    }

    #[tokio::test]
    async fn existing_identity_is_reused() {
        let state = AppState::new(Config::for_tests("k"));
        let claims = claims(None);
        state
            .store
            .create_identity(claims.sub, "old_name".to_string())
            .await
            .unwrap();
        state.store.set_rating(claims.sub, 1234).await.unwrap();

        let identity = resolve_identity(&state, &claims).await;
        assert_eq!(identity.username, "old_name");
        assert_eq!(identity.mmr, 1234);
    }
}
