//! 라이브 피드 세션 파사드.
//!
//! 렌더링 레이어에 노출되는 제어 표면을 한 곳에 모읍니다:
//! connect / disconnect / start / pause / resume / stop / set_speed /
//! clear_trips / active_trips. 실 피드에 연결할 수 없으면 합성 피드로
//! 매끄럽게 폴백하며, 합성 여부는 세션의 플래그로만 드러납니다 —
//! 메시지 형태로는 구분할 수 없습니다.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use tripcast_core::AppConfig;
use tripcast_feed::{
    ControlCommand, FeedControl, NotificationBus, SubscriptionGuard, SyntheticFeed,
};

use crate::channel::FeedChannel;
use crate::error::ClientError;
use crate::reducer::{attach_reducer, ActiveTrip, LiveStats, SharedReducer, TripReducer};
use crate::session::{ConnectionState, SessionManager};

/// 라이브 피드 세션.
///
/// 세션 관리자(실 피드) 또는 합성 피드 중 활성인 쪽의 메시지가
/// 공유 버스를 거쳐 리듀서로 흘러갑니다.
pub struct LiveFeedSession {
    bus: NotificationBus,
    session: SessionManager,
    synthetic: SyntheticFeed,
    reducer: SharedReducer,
    _reducer_guard: SubscriptionGuard,
    is_synthetic: bool,
    animation_task: Option<JoinHandle<()>>,
}

impl LiveFeedSession {
    /// 새로운 라이브 세션을 생성합니다.
    pub fn new(channel: Box<dyn FeedChannel>, config: &AppConfig) -> Self {
        let bus = NotificationBus::new();
        let reducer: SharedReducer =
            Arc::new(Mutex::new(TripReducer::new(config.client.clone())));
        let reducer_guard = attach_reducer(&bus, reducer.clone());

        Self {
            session: SessionManager::new(channel, bus.clone()),
            synthetic: SyntheticFeed::new(bus.clone(), config.synthetic.clone()),
            bus,
            reducer,
            _reducer_guard: reducer_guard,
            is_synthetic: false,
            animation_task: None,
        }
    }

    /// 피드에 연결합니다.
    ///
    /// 실 피드를 열 수 없으면 합성 피드를 시작하고 폴백 플래그를
    /// 설정합니다. 폴백도 실패로 취급하지 않습니다.
    pub async fn connect(&mut self) {
        match self.session.connect().await {
            Ok(()) => {
                self.is_synthetic = false;
            }
            Err(e) => {
                warn!("Live feed unavailable, falling back to synthetic feed: {}", e);
                self.is_synthetic = true;
                self.synthetic.start().await;
            }
        }
    }

    /// 연결을 해제하고 합성 피드도 정지합니다.
    pub async fn disconnect(&mut self) {
        if self.is_synthetic {
            self.synthetic.stop().await;
            self.is_synthetic = false;
        }
        self.session.disconnect().await;
        info!("Live session torn down");
    }

    /// 재생을 시작합니다.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        self.control(ControlCommand::Start).await
    }

    /// 재생을 일시정지합니다.
    pub async fn pause(&mut self) -> Result<(), ClientError> {
        self.control(ControlCommand::Pause).await
    }

    /// 재생을 재개합니다.
    pub async fn resume(&mut self) -> Result<(), ClientError> {
        self.control(ControlCommand::Resume).await
    }

    /// 재생을 정지합니다.
    pub async fn stop(&mut self) -> Result<(), ClientError> {
        self.control(ControlCommand::Stop).await
    }

    /// 재생 속도를 변경합니다.
    pub async fn set_speed(&mut self, speed: f64) -> Result<(), ClientError> {
        self.control(ControlCommand::SetSpeed { speed }).await
    }

    /// 활성 소스로 제어 명령을 보냅니다.
    async fn control(&mut self, command: ControlCommand) -> Result<(), ClientError> {
        if self.is_synthetic {
            match command {
                ControlCommand::Start => self.synthetic.start().await,
                ControlCommand::Pause => self.synthetic.pause().await,
                ControlCommand::Resume => self.synthetic.resume().await,
                ControlCommand::Stop => self.synthetic.stop().await,
                ControlCommand::SetSpeed { speed } => self.synthetic.set_speed(speed).await,
                ControlCommand::Ping => {}
            }
            Ok(())
        } else {
            self.session.send(&command).await
        }
    }

    /// 수신한 여행 상태를 비웁니다. 연결/재생 상태에는 영향 없음.
    pub fn clear_trips(&self) {
        if let Ok(mut reducer) = self.reducer.lock() {
            reducer.clear();
        }
    }

    /// 활성 애니메이션 엔티티의 스냅샷.
    pub fn active_trips(&self) -> Vec<ActiveTrip> {
        self.reducer
            .lock()
            .map(|r| r.active_trips())
            .unwrap_or_default()
    }

    /// 표시용 통계 스냅샷.
    pub fn stats(&self) -> LiveStats {
        self.reducer
            .lock()
            .map(|r| r.stats())
            .unwrap_or_else(|_| TripReducer::new(Default::default()).stats())
    }

    /// 현재 연결 상태.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// 합성 피드로 동작 중인지 여부.
    pub fn is_synthetic(&self) -> bool {
        self.is_synthetic
    }

    /// 공유 버스 핸들 (추가 관찰자 등록용).
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// 주기적 애니메이션 드라이버를 시작합니다.
    pub fn start_animation(&mut self, period: Duration) {
        if self.animation_task.is_none() {
            self.animation_task = Some(crate::reducer::spawn_animation_driver(
                self.reducer.clone(),
                period,
            ));
        }
    }
}

impl Drop for LiveFeedSession {
    fn drop(&mut self) {
        if let Some(task) = self.animation_task.take() {
            task.abort();
        }
    }
}
