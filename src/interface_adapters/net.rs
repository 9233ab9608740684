use crate::domain::Player;
use crate::interface_adapters::protocol::{ClientMessage, JoinGamePayload, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{PresenceMap, RoomCommand, RoomEvent, RoomHandle};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use std::sync::Arc;

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    RoomClosed,
    RoomEventsClosed,
    JoinRequired,
    JoinTimeout,
    JoinRejected,
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    // Separate session id for correlating logs before/after a user_id exists.
    let session_id = Uuid::new_v4().to_string();
    let span = info_span!("conn", session_id = %session_id, user_id = tracing::field::Empty);
    let _enter = span.enter();

    let mut ctx = match bootstrap_connection(&mut socket, &state, &session_id).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeJoin) => {
            info!("client disconnected before join handshake");
            return;
        }
        Err(NetError::JoinRejected) => {
            // The join failure was already reported in-band.
            return;
        }
        Err(e) => {
            warn!(error = ?e, "failed to bootstrap connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "bootstrap failed".into(),
                })))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    span.record("user_id", ctx.user_id);
    info!(
        user_id = ctx.user_id,
        room_code = %ctx.room.room_code,
        username = %ctx.username,
        "client connected"
    );

    // Main Client Loop
    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

struct ConnCtx {
    pub user_id: i64,
    pub session_id: String,
    pub username: String,
    // Registered set to tear down presence only for the owning session.
    pub presence: Arc<PresenceMap>,
    pub room: RoomHandle,
    pub events_rx: broadcast::Receiver<RoomEvent>,
    // Targeted events aimed at this session only.
    pub session_rx: mpsc::Receiver<RoomEvent>,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_invalid_msg_log: Instant,
    pub last_events_lag_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    session_id: &str,
) -> Result<ConnCtx, NetError> {
    // The first meaningful message must be the join handshake.
    let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join_handshake(socket)).await {
        Ok(result) => result?,
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, "join timeout").await;
            return Err(NetError::JoinTimeout);
        }
    };

    // The committed ledger balance is the seat's starting snapshot.
    let balance_cents = match state.ledger.fetch_balance(join.user_id).await {
        Ok(balance) => balance,
        Err(e) => {
            debug!(user_id = join.user_id, error = ?e, "balance lookup failed on join");
            let _ = send_message(
                socket,
                &ServerMessage::JoinFailed {
                    reason: "unknown user".to_string(),
                },
            )
            .await;
            let _ = send_close_with_reason(socket, close_code::POLICY, "join rejected").await;
            return Err(NetError::JoinRejected);
        }
    };

    let (room, _created) = state.registry.get_or_create(&join.room_code).await;

    // Subscribe to broadcasts *before* sending Join so the resulting
    // GameUpdated is never missed.
    let events_rx = room.events_tx.subscribe();
    let (session_tx, session_rx) = mpsc::channel::<RoomEvent>(SESSION_CHANNEL_CAPACITY);
    let (ack_tx, ack_rx) = oneshot::channel();

    room.command_tx
        .send(RoomCommand::Join {
            player: Player {
                id: join.user_id,
                username: join.username.clone(),
                balance_cents,
            },
            session: session_tx.clone(),
            ack: ack_tx,
        })
        .await
        .map_err(|_| NetError::RoomClosed)?;

    // The room answers before anything else may happen on this connection.
    // A duplicate connection for an already-seated user is declined here and
    // must never bind presence or emit Leave; the earlier connection owns
    // both the seat and the presence entry.
    match ack_rx.await.map_err(|_| NetError::RoomClosed)? {
        Ok(()) => {}
        Err(reason) => {
            let _ = send_message(socket, &ServerMessage::JoinFailed { reason }).await;
            let _ = send_close_with_reason(socket, close_code::POLICY, "join rejected").await;
            return Err(NetError::JoinRejected);
        }
    }

    state
        .presence
        .bind(join.user_id, session_id.to_string(), session_tx)
        .await;

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        user_id: join.user_id,
        session_id: session_id.to_string(),
        username: join.username,
        presence: state.presence.clone(),
        room,
        events_rx,
        session_rx,

        msgs_in: join.msgs_in,
        msgs_out: 0,
        bytes_in: join.bytes_in,
        bytes_out: 0,

        invalid_json: 0,

        last_invalid_msg_log: now,
        last_events_lag_log: now,

        close_frame: None,
    })
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
struct JoinHandshake {
    room_code: String,
    user_id: i64,
    username: String,
    bytes_in: u64,
    msgs_in: u64,
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

async fn read_join_handshake(socket: &mut WebSocket) -> Result<JoinHandshake, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                let payload = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::JoinGame(payload)) => payload,
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                            .await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid join payload",
                        )
                        .await;
                        return Err(NetError::JoinRequired);
                    }
                };

                let JoinGamePayload {
                    room_code,
                    user_id,
                    username,
                } = payload;
                let room_code = room_code.trim().to_uppercase();
                let username = username.trim().to_string();
                if room_code.is_empty()
                    || room_code.len() > MAX_ROOM_CODE_LEN
                    || username.is_empty()
                    || username.len() > MAX_USERNAME_LEN
                {
                    let _ =
                        send_close_with_reason(socket, close_code::POLICY, "invalid join payload")
                            .await;
                    return Err(NetError::JoinRequired);
                }

                return Ok(JoinHandshake {
                    room_code,
                    user_id,
                    username,
                    bytes_in,
                    msgs_in: 1,
                });
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

const MAX_ROOM_CODE_LEN: usize = 16;
const MAX_USERNAME_LEN: usize = 32;

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let user_id = ctx.user_id;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        session_id,
        presence,
        room,
        events_rx,
        session_rx,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_invalid_msg_log,
        last_events_lag_log,
        close_frame,
        ..
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                match handle_incoming_ws(
                    incoming,
                    user_id,
                    &room.command_tx,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_invalid_msg_log,
                    close_frame,
                ).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Broadcast room events for everyone at the table.
            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        match forward_event(event, socket, msgs_out, bytes_out).await {
                            LoopControl::Continue => false,
                            LoopControl::Disconnect => true,
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // A lagged client misses intermediate events; the next
                        // broadcast carries the full player list again.
                        if should_log(last_events_lag_log) {
                            warn!(user_id, missed = n, "room events lagged");
                        }
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::RoomEventsClosed);
                        true
                    }
                }
            }

            // Targeted events aimed only at this session.
            targeted = session_rx.recv() => {
                match targeted {
                    Some(event) => {
                        match forward_event(event, socket, msgs_out, bytes_out).await {
                            LoopControl::Continue => false,
                            LoopControl::Disconnect => true,
                        }
                    }
                    None => {
                        fatal = Some(NetError::RoomClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    if let Err(e) = disconnect_cleanup(
        user_id,
        session_id,
        presence,
        room,
        *msgs_in,
        *msgs_out,
        *bytes_in,
        *bytes_out,
        *invalid_json,
    )
    .await
    {
        warn!(error = ?e, "error during disconnect cleanup");
        if fatal.is_none() {
            fatal = Some(e);
        }
    }

    if let Some(err) = fatal {
        Err(err)
    } else {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    user_id: i64,
    command_tx: &mpsc::Sender<RoomCommand>,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_invalid_msg_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::JoinGame(_)) => {
                        // Ignore repeated join packets after bootstrap to keep
                        // the session stable.
                        if should_log(last_invalid_msg_log) {
                            warn!(user_id, "duplicate join ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Ok(message) => {
                        let command = match message {
                            ClientMessage::PlaceBet(payload) => RoomCommand::PlaceBet {
                                player_id: user_id,
                                symbol: payload.symbol.into(),
                                amount_cents: payload.amount_cents,
                            },
                            ClientMessage::StartRound => {
                                RoomCommand::StartRound { player_id: user_id }
                            }
                            ClientMessage::RollDice => RoomCommand::RollDice { player_id: user_id },
                            ClientMessage::StartNewGame => {
                                RoomCommand::StartNewGame { player_id: user_id }
                            }
                            ClientMessage::RefreshBalance => {
                                RoomCommand::RefreshBalance { player_id: user_id }
                            }
                            ClientMessage::JoinGame(_) => unreachable!("handled above"),
                        };
                        command_tx
                            .send(command)
                            .await
                            .map_err(|_| NetError::RoomClosed)?;
                        Ok(LoopControl::Continue)
                    }
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_msg_log) {
                            warn!(
                                user_id,
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(user_id, error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!(user_id, "websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_event(
    event: RoomEvent,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let msg = ServerMessage::from(event);
    match send_message(socket, &msg).await {
        Ok(bytes) => {
            *msgs_out += 1;
            *bytes_out += bytes as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = ?err, "failed to send room event");
            LoopControl::Disconnect
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn disconnect_cleanup(
    user_id: i64,
    session_id: &str,
    presence: &Arc<PresenceMap>,
    room: &RoomHandle,
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
) -> Result<(), NetError> {
    // Stale sessions must not evict a newer binding for the same user.
    presence.unbind(user_id, session_id).await;

    // Leave is a no-op inside the room if the seat was never granted.
    room.command_tx
        .send(RoomCommand::Leave { player_id: user_id })
        .await
        .map_err(|_| NetError::RoomClosed)?;

    debug!(
        user_id,
        msgs_in, msgs_out, bytes_in, bytes_out, invalid_json, "connection stats"
    );
    info!(user_id, "client disconnected");
    Ok(())
}
