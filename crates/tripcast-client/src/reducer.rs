//! 라이브 상태 리듀서.
//!
//! 수신 피드 메시지를 파생 상태로 환원합니다: 상한이 있는 최근 목록,
//! 누적 목록, 경과 시간 기반 진행률을 가진 애니메이션 엔티티 집합,
//! 초당 이벤트 수. 렌더링과는 완전히 독립적이며, 애니메이션 스텝은
//! 호스트의 주기 신호(또는 테스트의 수동 호출)로 구동됩니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use tripcast_core::{ClientConfig, Trip};
use tripcast_feed::FeedMessage;

/// 애니메이션 중인 여행 엔티티.
///
/// 리듀서가 단독 소유하는 파생 상태이며 영속되지 않습니다.
#[derive(Debug, Clone)]
pub struct ActiveTrip {
    /// 안정 키 (여행 ID 또는 합성 키)
    pub key: String,
    /// 원본 여행
    pub trip: Trip,
    /// 애니메이션 시작 시각
    pub started: Instant,
    /// 진행률 [0, 1]
    pub progress: f64,
}

/// 표시용 파생 통계.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveStats {
    /// 누적 수신 여행 수
    pub total: u64,
    /// 직전 1초 윈도우의 초당 이벤트 수
    pub events_per_sec: u32,
    /// 피드가 알려준 재생 진행 퍼센트
    pub progress_pct: u8,
    /// 피드가 알려준 전체 이벤트 수
    pub total_hint: usize,
    /// 재생 중 여부
    pub playing: bool,
    /// 표시용 재생 속도
    pub speed: f64,
}

/// 라이브 상태 리듀서.
pub struct TripReducer {
    config: ClientConfig,
    animation_duration: Duration,
    recent: VecDeque<Trip>,
    cumulative: Vec<Trip>,
    active: HashMap<String, ActiveTrip>,
    total: u64,
    window_count: u32,
    events_per_sec: u32,
    window_started: Option<Instant>,
    progress_pct: u8,
    total_hint: usize,
    playing: bool,
    speed: f64,
}

impl TripReducer {
    /// 새로운 리듀서를 생성합니다.
    pub fn new(config: ClientConfig) -> Self {
        let animation_duration = Duration::from_millis(config.animation_duration_ms.max(1));
        Self {
            config,
            animation_duration,
            recent: VecDeque::new(),
            cumulative: Vec::new(),
            active: HashMap::new(),
            total: 0,
            window_count: 0,
            events_per_sec: 0,
            window_started: None,
            progress_pct: 0,
            total_hint: 0,
            playing: false,
            speed: 1.0,
        }
    }

    /// 피드 메시지를 현재 시각 기준으로 적용합니다.
    pub fn apply(&mut self, message: &FeedMessage) {
        self.apply_at(message, Instant::now());
    }

    /// 피드 메시지를 주어진 시각 기준으로 적용합니다.
    ///
    /// 태그별 분기는 전수적입니다 — 새 메시지 태그가 추가되면 여기서
    /// 컴파일 에러로 드러납니다.
    pub fn apply_at(&mut self, message: &FeedMessage, now: Instant) {
        match message {
            FeedMessage::NewTrips {
                trips,
                progress,
                timestamp,
            } => {
                for (index, trip) in trips.iter().enumerate() {
                    self.recent.push_front(trip.clone());
                    self.recent.truncate(self.config.max_recent);
                    self.cumulative.push(trip.clone());
                    self.total += 1;
                    self.window_count += 1;

                    // 안정 키: 여행 ID가 없으면 출발/도착 + 수신 시각 +
                    // 배치 내 인덱스로 합성
                    let key = trip.id.clone().unwrap_or_else(|| {
                        format!(
                            "{}-{}-{}-{}",
                            trip.start_station.id,
                            trip.end_station.id,
                            timestamp.timestamp_millis(),
                            index
                        )
                    });
                    self.insert_active(key, trip.clone(), now);
                }

                self.progress_pct = progress.percentage;
                self.total_hint = progress.total;
            }
            FeedMessage::SessionStarted { total, .. } => {
                self.playing = true;
                self.total_hint = *total;
            }
            FeedMessage::SessionPaused { .. } => {
                self.playing = false;
            }
            FeedMessage::SessionResumed { .. } => {
                self.playing = true;
            }
            FeedMessage::SessionStopped { .. } => {
                self.playing = false;
            }
            FeedMessage::SessionComplete { .. } => {
                self.playing = false;
                self.progress_pct = 100;
            }
            FeedMessage::SpeedChanged { speed, .. } => {
                self.speed = *speed;
            }
        }
    }

    /// 엔티티를 활성 집합에 넣습니다. 상한에 도달하면 가장 오래된
    /// 엔티티를 먼저 퇴출합니다.
    fn insert_active(&mut self, key: String, trip: Trip, now: Instant) {
        if !self.active.contains_key(&key) && self.active.len() >= self.config.max_active {
            if let Some(oldest) = self
                .active
                .values()
                .min_by_key(|a| a.started)
                .map(|a| a.key.clone())
            {
                debug!(key = %oldest, "Active set full, evicting oldest entity");
                self.active.remove(&oldest);
            }
        }

        self.active.insert(
            key.clone(),
            ActiveTrip {
                key,
                trip,
                started: now,
                progress: 0.0,
            },
        );
    }

    /// 애니메이션 스텝.
    ///
    /// 메시지 소비와 무관하게 호스트의 주기 신호로 호출됩니다. 상태
    /// 변화가 없으면 멱등이며, 메시지 사이에 0번 이상 호출되어도
    /// 안전합니다.
    pub fn step(&mut self, now: Instant) {
        // 엔티티 진행률 갱신 및 완료 엔티티 퇴출
        for entity in self.active.values_mut() {
            let elapsed = now.saturating_duration_since(entity.started);
            entity.progress =
                (elapsed.as_secs_f64() / self.animation_duration.as_secs_f64()).clamp(0.0, 1.0);
        }
        self.active.retain(|_, entity| entity.progress < 1.0);

        // 1초 슬라이딩 윈도우로 초당 이벤트 수 측정.
        // 윈도우 카운터만 리셋하고 누적 합계는 건드리지 않습니다.
        let window_started = *self.window_started.get_or_insert(now);
        if now.saturating_duration_since(window_started) >= Duration::from_secs(1) {
            self.events_per_sec = self.window_count;
            self.window_count = 0;
            self.window_started = Some(now);
        }
    }

    /// 파생 상태를 초기화합니다.
    ///
    /// 연결/재생 상태에는 영향을 주지 않습니다.
    pub fn clear(&mut self) {
        self.recent.clear();
        self.cumulative.clear();
        self.active.clear();
        self.total = 0;
        self.window_count = 0;
        self.events_per_sec = 0;
        self.window_started = None;
        self.progress_pct = 0;
    }

    /// 활성 엔티티의 스냅샷.
    pub fn active_trips(&self) -> Vec<ActiveTrip> {
        self.active.values().cloned().collect()
    }

    /// 최근 여행 목록 (최신 순).
    pub fn recent(&self) -> &VecDeque<Trip> {
        &self.recent
    }

    /// 누적 여행 수.
    pub fn cumulative_len(&self) -> usize {
        self.cumulative.len()
    }

    /// 표시용 통계 스냅샷.
    pub fn stats(&self) -> LiveStats {
        LiveStats {
            total: self.total,
            events_per_sec: self.events_per_sec,
            progress_pct: self.progress_pct,
            total_hint: self.total_hint,
            playing: self.playing,
            speed: self.speed,
        }
    }
}

/// 공유 가능한 리듀서 타입.
pub type SharedReducer = Arc<Mutex<TripReducer>>;

/// 리듀서에 버스 구독을 연결합니다.
pub fn attach_reducer(
    bus: &tripcast_feed::NotificationBus,
    reducer: SharedReducer,
) -> tripcast_feed::SubscriptionGuard {
    bus.subscribe(move |msg| {
        if let Ok(mut reducer) = reducer.lock() {
            reducer.apply(msg);
        }
    })
}

/// 주기적으로 애니메이션 스텝을 실행하는 드라이버를 생성합니다.
///
/// 디스플레이 리프레시 신호가 없는 헤드리스 호스트용 기본 구현입니다.
/// 테스트는 이 드라이버 대신 `step()`을 직접 호출합니다.
pub fn spawn_animation_driver(reducer: SharedReducer, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Ok(mut reducer) = reducer.lock() {
                reducer.step(Instant::now());
            }
        }
    })
}
