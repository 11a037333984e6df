pub mod auth;
pub mod config;
pub mod hub;
pub mod proto;
pub mod rooms;
pub mod session;
pub mod users;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router, debug_handler,
    extract::{FromRef, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use hub::{Hub, HubError, HubStats};
use proto::Reply;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub started: Instant,
}

impl AppState {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub: Arc::new(hub),
            started: Instant::now(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.0.downcast_ref::<HubError>() {
            Some(err) => Reply::from(err).into_response(),
            None => {
                error!(error = ?self.0, "request failed");
                Reply::error(Reply::INTERNAL_ERROR, self.0.to_string()).into_response()
            }
        }
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(HubError);

pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(rooms::router())
        .merge(users::router())
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.hub),
            auth::require_auth,
        ));

    Router::new()
        .merge(auth::router())
        .merge(protected)
        .route("/ws", get(session::ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the app in the background.
pub async fn bind(addr: &str, state: AppState) -> anyhow::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let service = app(state).into_make_service_with_connect_info::<SocketAddr>();
    let handle = tokio::spawn(async move { axum::serve(listener, service).await });
    Ok((local, handle))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    uptime_secs: u64,
    #[serde(flatten)]
    stats: HubStats,
}

#[debug_handler]
async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        uptime_secs: state.started.elapsed().as_secs(),
        stats: state.hub.stats(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn signup(app: &Router, username: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/signup",
            None,
            Some(json!({"user_info": {"username": username}, "password": "Abcdef1!"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["auth_token"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let app = app(AppState::new(Hub::default()));
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = app(AppState::new(Hub::default()));
        let (status, body) = call(&app, Method::GET, "/rooms", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["response_type"], "error");

        let (status, _) = call(&app, Method::GET, "/users", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_validates_password() {
        let app = app(AppState::new(Hub::default()));
        let (status, body) = call(
            &app,
            Method::POST,
            "/signup",
            None,
            Some(json!({"user_info": {"username": "alice"}, "password": "abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn signup_then_login_reuses_token() {
        let app = app(AppState::new(Hub::default()));
        let token = signup(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({"username": "alice", "password": "Abcdef1!"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["auth_token"], token.as_str());

        let (status, _) = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({"username": "alice", "password": "Abcdef1?"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            Method::POST,
            "/signup",
            None,
            Some(json!({"user_info": {"username": "alice"}, "password": "Abcdef1!"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn room_lifecycle_over_http() {
        let app = app(AppState::new(Hub::default()));
        let alice = signup(&app, "alice").await;
        let bob = signup(&app, "bob").await;

        let (status, body) = call(&app, Method::POST, "/rooms", Some(&alice), Some(json!({"room_name": "Standup"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], 1);

        let (status, body) = call(&app, Method::POST, "/rooms/1/join", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["room"]["members"], json!(["alice", "bob"]));
        assert_eq!(body["data"]["reconnect_required"], true);

        let (_, body) = call(&app, Method::GET, "/users?id=1", Some(&bob), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, _) = call(&app, Method::DELETE, "/rooms/1", Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, Method::DELETE, "/rooms/1", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&app, Method::GET, "/rooms", Some(&bob), None).await;
        assert_eq!(body["data"], json!([]));
        let (status, _) = call(&app, Method::POST, "/rooms/leave", Some(&bob), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_and_delete_account() {
        let app = app(AppState::new(Hub::default()));
        let alice = signup(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::PUT,
            "/users",
            Some(&alice),
            Some(json!({"username": "alice", "display_name": "Alice A."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["display_name"], "Alice A.");

        let (status, _) = call(&app, Method::DELETE, "/users", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, Method::GET, "/rooms", Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
