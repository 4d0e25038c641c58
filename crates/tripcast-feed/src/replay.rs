//! 가상 시계 재생 엔진.
//!
//! 시간순 정렬된 여행 로그를 원본 이벤트 간격을 유지한 채 배속 재생하여
//! 알림 버스로 방출합니다. 가상 시간 불변식:
//!
//! ```text
//! virtual_time = virtual_origin + (now - wall_origin) * speed
//! ```
//!
//! 일시정지/재개는 wall_origin만 보정하며 virtual_origin은 건드리지
//! 않습니다. 정지나 속도 변경처럼 경과분의 환산 배율이 바뀌는 지점에서는
//! 현재 가상 시간을 virtual_origin으로 접어 넣어 연속성을 유지합니다.
//! 엔진 상태는 인스턴스별로 캡슐화되어 여러 재생 세션이 서로 간섭 없이
//! 동작합니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

use tripcast_core::{ReplayConfig, TripLog};

use crate::bus::NotificationBus;
use crate::control::{clamp_speed, FeedControl};
use crate::messages::{FeedMessage, ReplayProgress};

/// 틱 간격을 계산합니다: max(50ms, 100ms / speed).
fn tick_interval(speed: f64) -> Duration {
    let ms = (100.0 / speed).max(50.0);
    Duration::from_millis(ms as u64)
}

/// 재생 세션 상태.
///
/// 엔진의 제어 연산에 의해서만 변경됩니다.
struct ReplayState {
    running: bool,
    speed: f64,
    cursor: usize,
    /// 첫 틱에서 로그 첫 이벤트의 시작 시각으로 초기화
    virtual_origin: Option<DateTime<Utc>>,
    /// 재생이 마지막으로 (재)시작된 벽시계 시각
    wall_origin: Option<Instant>,
    /// 일시정지된 벽시계 시각 (재개 시 wall_origin 보정용)
    paused_at: Option<Instant>,
    tick_task: Option<JoinHandle<()>>,
    /// 중단된 틱 루프의 늦은 콜백을 무시하기 위한 세대 토큰
    generation: u64,
}

struct EngineInner {
    log: TripLog,
    bus: NotificationBus,
    max_batch: usize,
    state: Mutex<ReplayState>,
}

/// 가상 시계 재생 엔진.
///
/// 복제해도 같은 재생 세션을 공유합니다.
#[derive(Clone)]
pub struct ReplayEngine {
    inner: Arc<EngineInner>,
}

impl ReplayEngine {
    /// 새로운 재생 엔진을 생성합니다.
    ///
    /// 로그는 `TripLog` 생성 시점에 이미 정렬되어 있습니다.
    pub fn new(log: TripLog, bus: NotificationBus, config: ReplayConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                log,
                bus,
                max_batch: config.max_batch.max(1),
                state: Mutex::new(ReplayState {
                    running: false,
                    speed: clamp_speed(config.speed),
                    cursor: 0,
                    virtual_origin: None,
                    wall_origin: None,
                    paused_at: None,
                    tick_task: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// 현재 커서 위치.
    pub async fn cursor(&self) -> usize {
        self.inner.state.lock().await.cursor
    }

    /// 전체 이벤트 수.
    pub fn total(&self) -> usize {
        self.inner.log.len()
    }

    /// 커서를 처음으로 되돌리고 가상 시간 원점을 초기화합니다.
    ///
    /// 정지와 동일한 `SessionStopped`를 브로드캐스트합니다. 별도의
    /// reset 태그는 도입하지 않았습니다 — 소비자 어휘를 일곱 태그로
    /// 유지하기 위한 의도적 오버로드입니다.
    pub async fn reset(&self) {
        self.stop().await;

        let mut st = self.inner.state.lock().await;
        st.cursor = 0;
        st.virtual_origin = None;
        st.wall_origin = None;
        st.paused_at = None;
        info!("Replay session reset");
    }

    /// 틱 루프를 생성합니다. 호출자는 상태 잠금을 쥐고 있어야 합니다.
    fn spawn_ticks(&self, st: &mut ReplayState) {
        st.generation += 1;
        let generation = st.generation;
        let period = tick_interval(st.speed);
        let inner = self.inner.clone();

        st.tick_task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            // 첫 틱은 즉시 발화하므로 건너뜀
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !run_tick(&inner, generation).await {
                    break;
                }
            }
        }));
    }
}

/// `end` 시점까지의 경과분을 현재 속도로 환산해 virtual_origin으로 접어
/// 넣습니다. 호출 후 wall_origin == end 이며 가상 시간은 변하지 않습니다.
///
/// 속도가 바뀌기 전에 호출해야 합니다 — 접힌 구간에는 이전 속도가,
/// 이후 구간에는 새 속도가 적용됩니다.
fn freeze_virtual(st: &mut ReplayState, end: Instant) {
    if let (Some(origin), Some(wall)) = (st.virtual_origin, st.wall_origin) {
        let elapsed = end.saturating_duration_since(wall);
        let advance_ms = (elapsed.as_secs_f64() * st.speed * 1000.0) as i64;
        st.virtual_origin = Some(origin + chrono::Duration::milliseconds(advance_ms));
        st.wall_origin = Some(end);
    }
}

/// 한 틱 분량의 배치를 계산하고 방출합니다.
///
/// 루프를 계속해야 하면 `true`를 반환합니다.
async fn run_tick(inner: &Arc<EngineInner>, generation: u64) -> bool {
    // 브로드캐스트는 잠금 해제 후에 수행 (관찰자가 버스를 재진입해도 안전)
    let mut outgoing: Vec<FeedMessage> = Vec::new();
    let keep_going;

    {
        let mut st = inner.state.lock().await;
        if !st.running || st.generation != generation {
            return false;
        }

        let now = Instant::now();
        // 첫 시작이거나 정지 후 재시작이면 벽시계 원점을 재설정.
        // 멈춰 있던 구간은 가상 시간에 포함되지 않습니다.
        if st.wall_origin.is_none() {
            st.wall_origin = Some(now);
            if st.virtual_origin.is_none() {
                st.virtual_origin = inner.log.first_started_at();
            }
        }

        let (Some(origin), Some(wall)) = (st.virtual_origin, st.wall_origin) else {
            return true;
        };

        let elapsed = now.saturating_duration_since(wall);
        let advance_ms = (elapsed.as_secs_f64() * st.speed * 1000.0) as i64;
        let target = origin + chrono::Duration::milliseconds(advance_ms);

        // 커서부터 목표 가상 시간 이전의 이벤트를 배치 한도까지 소비.
        // 오래 정지했다가 재개해도 한 틱의 버스트는 max_batch로 제한되고
        // 나머지는 다음 틱에서 소진됩니다.
        let mut batch = Vec::new();
        while st.cursor < inner.log.len() && batch.len() < inner.max_batch {
            match inner.log.get(st.cursor) {
                Some(trip) if trip.started_at <= target => {
                    batch.push(trip.clone());
                    st.cursor += 1;
                }
                _ => break,
            }
        }

        if !batch.is_empty() {
            debug!(count = batch.len(), cursor = st.cursor, "Emitting trip batch");
            let progress = ReplayProgress::new(st.cursor, inner.log.len());
            outgoing.push(FeedMessage::new_trips(batch, progress));
        }

        if st.cursor >= inner.log.len() {
            st.running = false;
            outgoing.push(FeedMessage::session_complete(inner.log.len()));
            info!(total = inner.log.len(), "Replay session complete");
            keep_going = false;
        } else {
            keep_going = true;
        }
    }

    for msg in &outgoing {
        inner.bus.broadcast(msg);
    }
    keep_going
}

#[async_trait]
impl FeedControl for ReplayEngine {
    async fn start(&self) {
        let mut st = self.inner.state.lock().await;
        if st.running {
            return;
        }
        st.running = true;

        info!(total = self.inner.log.len(), speed = st.speed, "Replay session started");
        self.inner
            .bus
            .broadcast(&FeedMessage::session_started(self.inner.log.len()));

        // 빈 로그는 시작 직후 완료로 처리
        if self.inner.log.is_empty() {
            st.running = false;
            self.inner.bus.broadcast(&FeedMessage::session_complete(0));
            return;
        }

        self.spawn_ticks(&mut st);
    }

    async fn pause(&self) {
        let mut st = self.inner.state.lock().await;
        if !st.running {
            return;
        }

        // 틱 루프를 즉시 중단 — pause 반환 이후에는 새 틱이 발화하지 않음
        if let Some(task) = st.tick_task.take() {
            task.abort();
        }
        st.generation += 1;
        st.running = false;
        st.paused_at = Some(Instant::now());

        debug!(cursor = st.cursor, "Replay session paused");
        self.inner.bus.broadcast(&FeedMessage::session_paused());
    }

    async fn resume(&self) {
        {
            let mut st = self.inner.state.lock().await;
            if st.running {
                self.inner.bus.broadcast(&FeedMessage::session_resumed());
                return;
            }

            // 정지해 있던 구간만큼 wall_origin을 밀어 가상 시간이 정확히
            // 일시정지 지점부터 이어지게 합니다. virtual_origin은 그대로.
            if let (Some(paused_at), Some(wall)) = (st.paused_at.take(), st.wall_origin) {
                let gap = Instant::now().saturating_duration_since(paused_at);
                st.wall_origin = Some(wall + gap);
            }
        }

        self.start().await;
        self.inner.bus.broadcast(&FeedMessage::session_resumed());
    }

    async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(task) = st.tick_task.take() {
            task.abort();
        }
        st.generation += 1;
        st.running = false;

        // 정지 시점의 가상 시간을 고정하고 벽시계 원점을 비워 둡니다.
        // 다음 start()가 원점을 다시 잡으므로 정지 구간이 가상 시간에
        // 포함되지 않습니다.
        let end = st.paused_at.take().unwrap_or_else(Instant::now);
        freeze_virtual(&mut st, end);
        st.wall_origin = None;

        debug!(cursor = st.cursor, "Replay session stopped");
        self.inner.bus.broadcast(&FeedMessage::session_stopped());
    }

    async fn set_speed(&self, speed: f64) {
        let clamped = clamp_speed(speed);
        {
            let mut st = self.inner.state.lock().await;

            if st.running {
                // 실행 중이면 현재 가상 시간을 고정한 뒤 원점을 재설정해
                // 속도 변경 전후로 가상 시간이 연속되게 합니다.
                freeze_virtual(&mut st, Instant::now());

                if let Some(task) = st.tick_task.take() {
                    task.abort();
                }
                st.speed = clamped;
                self.spawn_ticks(&mut st);
            } else {
                // 일시정지 중에도 정지 시점의 가상 시간을 먼저 고정합니다.
                // 그러지 않으면 재개 시 정지 이전 경과분이 새 속도로
                // 소급 환산되어 가상 시간이 점프합니다.
                if let Some(paused_at) = st.paused_at {
                    freeze_virtual(&mut st, paused_at);
                }
                st.speed = clamped;
            }
        }

        info!(speed = clamped, "Replay speed changed");
        self.inner.bus.broadcast(&FeedMessage::speed_changed(clamped));
    }

    async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    async fn speed(&self) -> f64 {
        self.inner.state.lock().await.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};
    use tripcast_core::{RiderType, Station, Trip};

    fn trips(count: usize, gap_secs: i64) -> Vec<Trip> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let start = base + chrono::Duration::seconds(gap_secs * i as i64);
                Trip::new(
                    Some(format!("trip-{}", i)),
                    start,
                    start + chrono::Duration::minutes(10),
                    Station::new("ST-1", "여의나루역 1번출구", 37.527, 126.932),
                    Station::new("ST-2", "뚝섬유원지역", 37.529, 127.069),
                    RiderType::Member,
                )
            })
            .collect()
    }

    /// 브로드캐스트된 메시지를 수집하는 테스트 구독자.
    fn collect(bus: &NotificationBus) -> (StdArc<StdMutex<Vec<FeedMessage>>>, crate::bus::SubscriptionGuard) {
        let messages = StdArc::new(StdMutex::new(Vec::new()));
        let sink = messages.clone();
        let guard = bus.subscribe(move |msg| sink.lock().unwrap().push(msg.clone()));
        (messages, guard)
    }

    fn engine_with(trips: Vec<Trip>, speed: f64, max_batch: usize) -> (ReplayEngine, NotificationBus) {
        let bus = NotificationBus::new();
        let config = ReplayConfig { speed, max_batch };
        let engine = ReplayEngine::new(TripLog::new(trips), bus.clone(), config);
        (engine, bus)
    }

    async fn wait_for_complete(messages: &StdArc<StdMutex<Vec<FeedMessage>>>) {
        for _ in 0..2000 {
            if messages
                .lock()
                .unwrap()
                .iter()
                .any(|m| matches!(m, FeedMessage::SessionComplete { .. }))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session did not complete in time");
    }

    #[test]
    fn test_tick_interval_bounds() {
        assert_eq!(tick_interval(1.0), Duration::from_millis(100));
        assert_eq!(tick_interval(50.0), Duration::from_millis(50));
        assert_eq!(tick_interval(0.1), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_log_completes_immediately() {
        let (engine, bus) = engine_with(vec![], 1.0, 5);
        let (messages, _guard) = collect(&bus);

        engine.start().await;

        let messages = messages.lock().unwrap();
        assert!(matches!(messages[0], FeedMessage::SessionStarted { total: 0, .. }));
        assert!(matches!(messages[1], FeedMessage::SessionComplete { .. }));
        assert!(!engine.inner.state.try_lock().unwrap().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_replay_emits_each_trip_once() {
        let (engine, bus) = engine_with(trips(10, 1), 50.0, 5);
        let (messages, _guard) = collect(&bus);

        engine.start().await;
        wait_for_complete(&messages).await;

        assert_eq!(engine.cursor().await, 10);

        let mut seen = Vec::new();
        let mut completes = 0;
        for msg in messages.lock().unwrap().iter() {
            match msg {
                FeedMessage::NewTrips { trips, .. } => {
                    for trip in trips {
                        let id = trip.id.clone().unwrap();
                        assert!(!seen.contains(&id), "trip emitted twice: {}", id);
                        seen.push(id);
                    }
                }
                FeedMessage::SessionComplete { progress, .. } => {
                    completes += 1;
                    assert_eq!(progress.percentage, 100);
                }
                _ => {}
            }
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(completes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_size_is_capped() {
        // 모든 이벤트가 같은 시각 — 첫 틱에 전부 만기
        let (engine, bus) = engine_with(trips(12, 0), 1.0, 5);
        let (messages, _guard) = collect(&bus);

        engine.start().await;
        wait_for_complete(&messages).await;

        for msg in messages.lock().unwrap().iter() {
            if let FeedMessage::NewTrips { trips, .. } = msg {
                assert!(trips.len() <= 5, "batch exceeded cap: {}", trips.len());
            }
        }
        assert_eq!(engine.cursor().await, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_cursor() {
        let (engine, bus) = engine_with(trips(100, 1), 1.0, 5);
        let (_messages, _guard) = collect(&bus);

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        engine.pause().await;

        let cursor_at_pause = engine.cursor().await;
        assert!(cursor_at_pause > 0);
        assert!(!engine.is_running().await);

        // 정지 동안 벽시계가 한참 흘러도 커서는 그대로
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(engine.cursor().await, cursor_at_pause);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_continues_from_pause_point() {
        // 1초 간격 100개, 속도 1.0 → 초당 약 1개
        let (engine, bus) = engine_with(trips(100, 1), 1.0, 5);
        let (_messages, _guard) = collect(&bus);

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(3100)).await;
        engine.pause().await;
        let cursor_at_pause = engine.cursor().await;

        // 오래 정지했다가 재개 — 정지 구간은 가상 시간에 포함되지 않으므로
        // 재개 직후 대량 배출이 없어야 함
        tokio::time::sleep(Duration::from_secs(3600)).await;
        engine.resume().await;
        assert!(engine.is_running().await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let cursor_after = engine.cursor().await;
        assert!(
            cursor_after >= cursor_at_pause && cursor_after <= cursor_at_pause + 3,
            "cursor jumped after resume: {} -> {}",
            cursor_at_pause,
            cursor_after
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_speed_clamps() {
        let (engine, bus) = engine_with(trips(5, 1), 1.0, 5);
        let (messages, _guard) = collect(&bus);

        engine.set_speed(1000.0).await;
        assert_eq!(engine.speed().await, 50.0);

        engine.set_speed(0.0).await;
        assert_eq!(engine.speed().await, 0.1);

        let speeds: Vec<f64> = messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                FeedMessage::SpeedChanged { speed, .. } => Some(*speed),
                _ => None,
            })
            .collect();
        assert_eq!(speeds, vec![50.0, 0.1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_cursor() {
        let (engine, bus) = engine_with(trips(50, 1), 5.0, 5);
        let (messages, _guard) = collect(&bus);

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        engine.stop().await;

        let cursor = engine.cursor().await;
        assert!(cursor > 0);
        assert!(!engine.is_running().await);
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, FeedMessage::SessionStopped { .. })));

        // stop은 커서를 보존
        assert_eq!(engine.cursor().await, cursor);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_cursor() {
        let (engine, bus) = engine_with(trips(50, 1), 5.0, 5);
        let (_messages, _guard) = collect(&bus);

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        engine.reset().await;

        assert_eq!(engine.cursor().await, 0);
        assert!(!engine.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (engine, bus) = engine_with(trips(10, 1), 1.0, 5);
        let (messages, _guard) = collect(&bus);

        engine.start().await;
        engine.start().await;

        let started = messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| matches!(m, FeedMessage::SessionStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_speed_while_paused_preserves_virtual_time() {
        let (engine, bus) = engine_with(trips(100, 1), 1.0, 5);
        let (_messages, _guard) = collect(&bus);

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(3100)).await;
        engine.pause().await;
        let cursor_at_pause = engine.cursor().await;
        assert!(cursor_at_pause > 0);

        // 일시정지 중 속도 변경 — 정지 이전 경과분이 새 속도로 소급
        // 환산되면 안 됨. 재개 후 200ms × 50배속 = 가상 10초 분량만 진행.
        engine.set_speed(50.0).await;
        engine.resume().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let cursor_after = engine.cursor().await;
        assert!(
            cursor_after > cursor_at_pause && cursor_after <= cursor_at_pause + 12,
            "virtual time jumped after set_speed while paused: {} -> {}",
            cursor_at_pause,
            cursor_after
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_continues_without_burst() {
        let (engine, bus) = engine_with(trips(100, 1), 1.0, 5);
        let (_messages, _guard) = collect(&bus);

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        engine.stop().await;
        let cursor_at_stop = engine.cursor().await;
        assert!(cursor_at_stop > 0);

        // 정지 구간은 가상 시간에 포함되지 않음 — 오래 멈췄다 재시작해도
        // "밀린" 이벤트가 한꺼번에 쏟아지지 않는다
        tokio::time::sleep(Duration::from_secs(3600)).await;
        engine.start().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let cursor_after = engine.cursor().await;
        assert!(
            cursor_after >= cursor_at_stop && cursor_after <= cursor_at_stop + 3,
            "cursor jumped after restart: {} -> {}",
            cursor_at_stop,
            cursor_after
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// 완주까지 가상 시간으로 최대 수 분이 걸릴 수 있어 일반
        /// 헬퍼보다 긴 시한으로 기다립니다.
        async fn wait_for_complete_long(messages: &StdArc<StdMutex<Vec<FeedMessage>>>) {
            for _ in 0..10_000 {
                if messages
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|m| matches!(m, FeedMessage::SessionComplete { .. }))
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            panic!("session did not complete in time");
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            /// 어떤 속도와 일시정지/재개 시퀀스에서도 각 여행은 로그
            /// 순서대로 정확히 한 번씩 방출되고 커서는 로그 길이에서
            /// 끝난다.
            #[test]
            fn prop_replay_emits_each_trip_exactly_once(
                speed in 0.1f64..50.0,
                count in 1usize..20,
                gap_secs in 0i64..3,
                pauses in proptest::collection::vec((20u64..400, 20u64..400), 0..3),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .start_paused(true)
                    .build()
                    .unwrap();

                rt.block_on(async {
                    let (engine, bus) = engine_with(trips(count, gap_secs), speed, 5);
                    let (messages, _guard) = collect(&bus);

                    engine.start().await;
                    for (run_ms, pause_ms) in pauses {
                        tokio::time::sleep(Duration::from_millis(run_ms)).await;
                        engine.pause().await;
                        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
                        engine.resume().await;
                    }
                    wait_for_complete_long(&messages).await;

                    let mut emitted = Vec::new();
                    for msg in messages.lock().unwrap().iter() {
                        if let FeedMessage::NewTrips { trips, .. } = msg {
                            for trip in trips {
                                emitted.push(trip.id.clone().unwrap());
                            }
                        }
                    }

                    prop_assert_eq!(engine.cursor().await, count);
                    let expected: Vec<String> =
                        (0..count).map(|i| format!("trip-{}", i)).collect();
                    prop_assert_eq!(emitted, expected);
                    Ok(())
                })?;
            }
        }
    }
}
