//! WebSocket rooms on top of the hub. Observers only listen; anything they
//! send besides close frames is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Extension, Router,
};
use cinema_booking::HubHandle;
use cinema_shared::Topic;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::middleware::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/screenings/{id}/ws", get(screening_room))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/ws", get(admin_room))
}

async fn screening_room(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(screening_id): Path<String>,
) -> Response {
    let topic = Topic::screening(&screening_id);
    ws.on_upgrade(move |socket| serve(socket, state.hub, topic, claims.sub))
}

async fn admin_room(ws: WebSocketUpgrade, State(state): State<AppState>, Extension(claims): Extension<Claims>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state.hub, Topic::admin(), claims.sub))
}

async fn serve(socket: WebSocket, hub: HubHandle, topic: Topic, user_id: String) {
    let mut subscription = match hub.register(topic.clone()).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Cannot join {}: {}", topic, e);
            return;
        }
    };
    info!("{} joined {}", user_id, topic);

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            if sender.send(Message::Text(payload.as_ref().into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    // Dropping the subscription (with the send task) unregisters it.
    debug!("{} left {}", user_id, topic);
}
