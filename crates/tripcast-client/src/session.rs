//! 세션/연결 관리자.
//!
//! 실 피드로 가는 단일 채널을 소유하고 연결 상태 기계를 관리합니다.
//! 수신 프레임은 `FeedMessage`로 파싱되어 알림 버스로 재브로드캐스트되고,
//! 파싱 실패는 로그 후 폐기됩니다(연결 에러로 승격하지 않음).
//!
//! 채널 수명주기 콜백은 세대 토큰으로 보호됩니다: `disconnect()` 이후
//! 도착하는 이전 채널의 종료/에러 이벤트가 이미 진행된 상태를 되돌리지
//! 못합니다.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tripcast_feed::{ControlCommand, FeedMessage, NotificationBus};

use crate::channel::{ChannelEvent, FeedChannel};
use crate::error::ClientError;

/// 연결 상태.
///
/// 항상 정확히 하나의 값을 가지며, connect/disconnect 호출과 채널
/// 수명주기 이벤트로만 전이됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 연결 안 됨
    Disconnected,
    /// 연결 시도 중
    Connecting,
    /// 연결됨
    Connected,
    /// 채널 수준 에러 (명시적 재연결로 복구 가능)
    Error,
}

struct SharedInner {
    state: ConnectionState,
    generation: u64,
}

/// 세션 상태 공유 핸들. 리더 태스크와 관리자가 함께 사용합니다.
#[derive(Clone)]
struct SessionShared {
    inner: Arc<Mutex<SharedInner>>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedInner {
                state: ConnectionState::Disconnected,
                generation: 0,
            })),
        }
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().expect("session state lock poisoned").state
    }

    /// 세대를 증가시키고 상태를 설정합니다. 새 세대 번호를 반환합니다.
    fn advance(&self, state: ConnectionState) -> u64 {
        let mut inner = self.inner.lock().expect("session state lock poisoned");
        inner.generation += 1;
        inner.state = state;
        inner.generation
    }

    /// 주어진 세대가 여전히 현재일 때만 상태를 설정합니다.
    fn set_state_if_current(&self, generation: u64, state: ConnectionState) -> bool {
        let mut inner = self.inner.lock().expect("session state lock poisoned");
        if inner.generation == generation {
            inner.state = state;
            true
        } else {
            debug!(
                stale = generation,
                current = inner.generation,
                "Ignoring stale channel event"
            );
            false
        }
    }
}

/// 세션/연결 관리자.
///
/// 한 번에 정확히 하나의 채널 핸들만 소유합니다.
pub struct SessionManager {
    bus: NotificationBus,
    channel: Box<dyn FeedChannel>,
    shared: SessionShared,
    reader_task: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// 새로운 세션 관리자를 생성합니다.
    ///
    /// 수신 메시지는 `bus`로 재브로드캐스트됩니다.
    pub fn new(channel: Box<dyn FeedChannel>, bus: NotificationBus) -> Self {
        Self {
            bus,
            channel,
            shared: SessionShared::new(),
            reader_task: None,
        }
    }

    /// 현재 연결 상태.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// 피드에 연결합니다.
    ///
    /// 이미 Connecting/Connected 상태면 두 번째 채널을 열지 않고
    /// 아무 것도 하지 않습니다.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("connect() ignored: already connecting or connected");
                return Ok(());
            }
            _ => {}
        }

        let generation = self.shared.advance(ConnectionState::Connecting);

        match self.channel.open().await {
            Ok(mut rx) => {
                self.shared
                    .set_state_if_current(generation, ConnectionState::Connected);
                info!("Feed session connected");

                let bus = self.bus.clone();
                let shared = self.shared.clone();
                self.reader_task = Some(tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        match event {
                            ChannelEvent::Message(text) => match FeedMessage::from_json(&text) {
                                Ok(msg) => bus.broadcast(&msg),
                                Err(e) => {
                                    warn!("Dropping malformed feed message: {}", e);
                                }
                            },
                            ChannelEvent::Closed => {
                                shared.set_state_if_current(
                                    generation,
                                    ConnectionState::Disconnected,
                                );
                                info!("Feed channel closed");
                                break;
                            }
                            ChannelEvent::Error(reason) => {
                                warn!("Feed channel error: {}", reason);
                                shared.set_state_if_current(generation, ConnectionState::Error);
                                break;
                            }
                        }
                    }
                }));

                Ok(())
            }
            Err(e) => {
                self.shared
                    .set_state_if_current(generation, ConnectionState::Error);
                warn!("Feed connection failed: {}", e);
                Err(e)
            }
        }
    }

    /// 연결을 해제합니다.
    ///
    /// 로컬 상태 전이는 동기적입니다 — 채널 자체의 종료 콜백 타이밍과
    /// 무관하게 반환 시점에 Disconnected가 보장됩니다.
    pub async fn disconnect(&mut self) {
        // 이전 채널의 늦은 수명주기 이벤트를 무효화
        self.shared.advance(ConnectionState::Disconnected);

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.channel.close().await;

        info!("Feed session disconnected");
    }

    /// 제어 명령을 피드로 전송합니다.
    ///
    /// Connected가 아니면 경고 후 버립니다 — 나중을 위해 큐에 넣지
    /// 않습니다(의도된 최선 노력 정책).
    pub async fn send(&mut self, command: &ControlCommand) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            warn!(?command, "send() while not connected, dropping command");
            return Ok(());
        }

        let json = command.to_json()?;
        self.channel.send(json).await
    }
}
