//! WebSocket 연결 handler.
//!
//! Axum WebSocket 엔드포인트 및 메시지 처리. 피드 메시지는 알림 버스
//! 구독을 통해 모든 연결에 중계되고, 클라이언트의 제어 명령은 활성
//! 피드(`FeedControl`)로 전달됩니다.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use tripcast_feed::{ControlCommand, FeedControl, NotificationBus};

/// WebSocket 상태.
///
/// 알림 버스와 활성 피드 제어 핸들을 포함한 서버 상태.
#[derive(Clone)]
pub struct WsState {
    /// 피드 메시지 버스
    pub bus: NotificationBus,
    /// 활성 피드 (재생 엔진 또는 합성 피드)
    pub control: Arc<dyn FeedControl>,
}

impl WsState {
    /// 새로운 WebSocket 상태 생성.
    pub fn new(bus: NotificationBus, control: Arc<dyn FeedControl>) -> Self {
        Self { bus, control }
    }
}

/// WebSocket 라우터 생성.
///
/// # 엔드포인트
///
/// `GET /ws`
pub fn ws_router(state: WsState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// WebSocket 업그레이드 핸들러.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket connected: {}", session_id);

    let (mut sender, mut receiver) = socket.split();

    // 버스 구독: 피드 메시지를 이 소켓 전용 큐로 직렬화해 전달
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let guard = state.bus.subscribe(move |msg| match msg.to_json() {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            warn!("Failed to serialize feed message: {}", e);
        }
    });

    // 피드 메시지 전송 태스크
    let session_id_clone = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("Send failed, closing session: {}", session_id_clone);
                break;
            }
        }
    });

    // 클라이언트 제어 명령 수신 루프
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match ControlCommand::from_json(text.as_str()) {
                Ok(command) => {
                    debug!(?command, session = %session_id, "Control command received");
                    dispatch_command(&state.control, command).await;
                }
                Err(e) => {
                    warn!("Dropping malformed control command: {}", e);
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Close frame received: {}", session_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    drop(guard);
    info!("WebSocket disconnected: {}", session_id);
}

/// 제어 명령을 활성 피드로 전달합니다.
///
/// `Ping`은 연결 유지용이므로 피드에 전달하지 않습니다.
async fn dispatch_command(control: &Arc<dyn FeedControl>, command: ControlCommand) {
    match command {
        ControlCommand::Start => control.start().await,
        ControlCommand::Pause => control.pause().await,
        ControlCommand::Resume => control.resume().await,
        ControlCommand::Stop => control.stop().await,
        ControlCommand::SetSpeed { speed } => control.set_speed(speed).await,
        ControlCommand::Ping => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripcast_core::SyntheticConfig;
    use tripcast_feed::SyntheticFeed;

    fn state() -> WsState {
        let bus = NotificationBus::new();
        let control: Arc<dyn FeedControl> = Arc::new(SyntheticFeed::new(
            bus.clone(),
            SyntheticConfig {
                speed: 50.0,
                target_total: 10,
            },
        ));
        WsState::new(bus, control)
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_start_and_stop() {
        let state = state();

        dispatch_command(&state.control, ControlCommand::Start).await;
        assert!(state.control.is_running().await);

        dispatch_command(&state.control, ControlCommand::Stop).await;
        assert!(!state.control.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_set_speed_is_clamped() {
        let state = state();

        dispatch_command(&state.control, ControlCommand::SetSpeed { speed: 1000.0 }).await;
        assert_eq!(state.control.speed().await, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_does_not_touch_feed() {
        let state = state();

        dispatch_command(&state.control, ControlCommand::Ping).await;
        assert!(!state.control.is_running().await);
    }
}
