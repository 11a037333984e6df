//! One WebSocket session: upgrade, read loop, writer task, cleanup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    debug_handler,
    extract::{
        ConnectInfo, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    AppResult, AppState, auth,
    hub::{ConnId, Connection, Hub, HubError, HubResult, Outbound},
    proto::{Reply, Request, RequestKind},
    rooms, users,
};

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;
/// How long cleanup waits for the writer to flush queued replies.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Anonymous,
    Authenticated,
    Closing,
    Closed,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

/// `GET /ws`. A token, if presented in the `Authorization` header or the
/// `token` query parameter, must be valid; the session then starts signed in.
#[debug_handler(state = AppState)]
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<Hub>>,
    Query(WsQuery { token }): Query<WsQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let token = auth::bearer_token(&headers).map(str::to_owned).or(token);
    let user = match token {
        Some(token) => Some(hub.authenticate(&token)?.username),
        None => None,
    };
    debug!(%addr, user = user.as_deref().unwrap_or("-"), state = ?SessionState::Connecting, "upgrading connection");

    Ok(ws.on_upgrade(move |socket| run(hub, socket, ConnId::from(addr), user)))
}

pub async fn run(hub: Arc<Hub>, socket: WebSocket, id: ConnId, user: Option<String>) {
    let (sink, stream) = socket.split();
    serve(hub, id, user, sink, stream).await
}

/// Drive a session over any frame sink and stream until the peer goes away.
pub async fn serve<W, R>(hub: Arc<Hub>, id: ConnId, user: Option<String>, sink: W, mut stream: R)
where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let mut writer = tokio::spawn(write_loop(id.clone(), sink, rx));

    let conn = Arc::new(Connection::new(id, tx));
    hub.register_connection(Arc::clone(&conn));
    if let Some(username) = &user {
        if let Err(err) = hub.attach(&conn.id, username) {
            warn!(conn = %conn.id, username, error = %err, "could not attach token user");
        }
    }

    let mut session = Session {
        hub,
        conn,
        state: SessionState::Connecting,
    };
    session.refresh();

    while let Some(frame) = stream.next().await {
        let open = match frame {
            Ok(Message::Text(text)) => session.handle(text.as_str()).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle(text).await,
                Err(_) => {
                    session
                        .reply(Reply::error(Reply::BAD_REQUEST, "binary frames must be UTF-8 JSON"))
                        .await
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(conn = %session.conn.id, ?frame, "peer closed connection");
                false
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => true,
            Err(err) => {
                warn!(conn = %session.conn.id, error = %err, "read failed");
                false
            }
        };
        if !open {
            break;
        }
    }

    session.close();
    drop(session);

    // Every sender is gone once the hub forgot the connection, so the writer
    // ends after flushing what is queued.
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn write_loop<W>(id: ConnId, mut sink: W, mut rx: mpsc::Receiver<Outbound>)
where
    W: Sink<Message> + Unpin,
{
    while let Some(text) = rx.recv().await {
        if sink.send(Message::Text(text.as_str().into())).await.is_err() {
            debug!(conn = %id, "write failed, stopping writer");
            break;
        }
    }
    let _ = sink.close().await;
}

struct Session {
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    state: SessionState,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(conn = %self.conn.id, from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    /// Re-derive signed-in state from the registry; other sessions and
    /// HTTP requests can attach or detach our user at any time.
    fn refresh(&mut self) {
        let next = match self.hub.user_of(&self.conn.id) {
            Some(_) => SessionState::Authenticated,
            None => SessionState::Anonymous,
        };
        self.transition(next);
    }

    /// Returns false once the connection can no longer be written to.
    async fn handle(&mut self, text: &str) -> bool {
        let open = match dispatch(&self.hub, &self.conn, text).await {
            Some(reply) => self.reply(reply).await,
            None => true,
        };
        self.refresh();
        open
    }

    async fn reply(&self, reply: Reply) -> bool {
        match self
            .conn
            .send_json(&reply, self.hub.settings().write_timeout)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(conn = %self.conn.id, error = %err, "failed to send reply");
                false
            }
        }
    }

    fn close(&mut self) {
        self.transition(SessionState::Closing);
        self.conn.close_read();
        self.hub.remove_connection(&self.conn.id);
        self.transition(SessionState::Closed);
    }
}

/// Decode and run one client message. Returns the reply for the sender, if
/// the request kind has one.
pub async fn dispatch(hub: &Hub, conn: &Connection, text: &str) -> Option<Reply> {
    let request: Request = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            debug!(conn = %conn.id, error = %err, "undecodable message");
            return Some(Reply::error(
                Reply::BAD_REQUEST,
                format!("failed to decode message: {err}"),
            ));
        }
    };
    debug!(conn = %conn.id, request_type = %request.request_type, "new message received");

    match handle(hub, &conn.id, request).await {
        Ok(reply) => reply,
        Err(err) => {
            if err.code() >= 500 {
                warn!(conn = %conn.id, error = %err, "request failed");
            } else {
                debug!(conn = %conn.id, error = %err, "request rejected");
            }
            Some(Reply::from(&err))
        }
    }
}

fn require<T>(value: Option<T>, field: &str) -> HubResult<T> {
    value.ok_or_else(|| HubError::Validation(format!("missing field `{field}`")))
}

fn signed_in(actor: &Option<String>) -> HubResult<&str> {
    actor.as_deref().ok_or(HubError::AuthMissing)
}

async fn handle(hub: &Hub, conn: &ConnId, request: Request) -> HubResult<Option<Reply>> {
    let kind = request.kind()?;
    let actor = hub.user_of(conn);
    if !kind.is_public() {
        hub.check_session(signed_in(&actor)?)?;
    }

    let reply = match kind {
        RequestKind::Signup => {
            let info = require(request.user_info, "user_info")?;
            let password = require(request.password, "password")?;
            auth::signup_user(hub, info, password, Some(conn)).await?
        }
        RequestKind::Login => {
            let username = require(request.username, "username")?;
            let password = require(request.password, "password")?;
            auth::login_user(hub, &username, &password, Some(conn)).await?
        }
        RequestKind::CreateUser => {
            let info = require(request.user_info, "user_info")?;
            users::create_user(hub, info, conn).await?
        }
        RequestKind::GetUsers => users::get_users(hub, request.room_id)?,
        RequestKind::GetRooms => rooms::get_rooms(hub)?,
        RequestKind::DeleteUser => users::delete_user(hub, signed_in(&actor)?).await?,
        RequestKind::UpdateUser => {
            let info = require(request.user_info, "user_info")?;
            users::update_user(hub, signed_in(&actor)?, info).await?
        }
        RequestKind::CallUpdate => {
            let call_data = request.call_data.unwrap_or_default();
            rooms::call_update(hub, signed_in(&actor)?, &call_data).await?;
            return Ok(None);
        }
        RequestKind::JoinRoom => {
            let room_id = require(request.room_id, "room_id")?;
            rooms::join_room(hub, signed_in(&actor)?, room_id).await?
        }
        RequestKind::LeaveRoom => rooms::leave_room(hub, signed_in(&actor)?).await?,
        RequestKind::CreateRoom => {
            let name = require(request.room_name, "room_name")?;
            rooms::create_room(hub, signed_in(&actor)?, &name).await?
        }
        RequestKind::DeleteRoom => {
            let room_id = require(request.room_id, "room_id")?;
            rooms::delete_room(hub, signed_in(&actor)?, room_id).await?
        }
    };
    Ok(Some(reply))
}
