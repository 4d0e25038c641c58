//! 합성 피드 생성기.
//!
//! 실 피드를 사용할 수 없을 때 그럴듯한 무작위 여행을 일정 주기로
//! 방출합니다. 재생 엔진과 동일한 메시지 어휘와 제어 표면을 사용하므로
//! 소비자는 메시지 형태만으로 출처를 구분할 수 없습니다. "합성 여부"
//! 플래그는 세션 쪽에만 존재하며 메시지에는 실리지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use tripcast_core::{RiderType, Station, SyntheticConfig, Trip};

use crate::bus::NotificationBus;
use crate::control::{clamp_speed, FeedControl};
use crate::messages::{FeedMessage, ReplayProgress};

/// 합성 여행에 사용하는 대여소 풀.
const STATION_POOL: &[(&str, &str, f64, f64)] = &[
    ("ST-101", "여의나루역 1번출구 앞", 37.5270, 126.9326),
    ("ST-207", "뚝섬유원지역 1번출구 앞", 37.5297, 127.0668),
    ("ST-310", "반포한강공원 입구", 37.5083, 126.9956),
    ("ST-412", "망원한강공원 주차장", 37.5536, 126.8950),
    ("ST-523", "잠실새내역 4번출구", 37.5114, 127.0861),
    ("ST-615", "홍대입구역 2번출구 앞", 37.5575, 126.9238),
    ("ST-702", "서울숲 공영주차장 앞", 37.5443, 127.0374),
    ("ST-818", "광나루한강공원 축구장", 37.5498, 127.1197),
];

/// 방출 주기를 계산합니다: max(500ms, 2000ms / speed).
fn emit_interval(speed: f64) -> Duration {
    let ms = (2000.0 / speed).max(500.0);
    Duration::from_millis(ms as u64)
}

/// 풀에서 무작위 여행을 생성합니다.
fn random_trip<R: Rng>(rng: &mut R) -> Trip {
    let start_idx = rng.gen_range(0..STATION_POOL.len());
    let mut end_idx = rng.gen_range(0..STATION_POOL.len());
    if end_idx == start_idx {
        end_idx = (end_idx + 1) % STATION_POOL.len();
    }

    let (sid, sname, slat, slng) = STATION_POOL[start_idx];
    let (eid, ename, elat, elng) = STATION_POOL[end_idx];

    let duration_mins = rng.gen_range(5..=40);
    let started_at = Utc::now();
    let rider_type = if rng.gen_bool(0.7) {
        RiderType::Member
    } else {
        RiderType::Casual
    };

    Trip::new(
        Some(uuid::Uuid::new_v4().to_string()),
        started_at,
        started_at + chrono::Duration::minutes(duration_mins),
        Station::new(sid, sname, slat, slng),
        Station::new(eid, ename, elat, elng),
        rider_type,
    )
}

struct SyntheticState {
    running: bool,
    speed: f64,
    /// 목표 총량을 향해 단조 증가하는 방출 카운터
    emitted: usize,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

struct SyntheticInner {
    bus: NotificationBus,
    target_total: usize,
    state: Mutex<SyntheticState>,
}

/// 합성 피드 생성기.
#[derive(Clone)]
pub struct SyntheticFeed {
    inner: Arc<SyntheticInner>,
}

impl SyntheticFeed {
    /// 새로운 합성 피드를 생성합니다.
    pub fn new(bus: NotificationBus, config: SyntheticConfig) -> Self {
        Self {
            inner: Arc::new(SyntheticInner {
                bus,
                target_total: config.target_total.max(1),
                state: Mutex::new(SyntheticState {
                    running: false,
                    speed: clamp_speed(config.speed),
                    emitted: 0,
                    task: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// 지금까지 방출한 여행 수.
    pub async fn emitted(&self) -> usize {
        self.inner.state.lock().await.emitted
    }

    fn spawn_emitter(&self, st: &mut SyntheticState) {
        st.generation += 1;
        let generation = st.generation;
        let period = emit_interval(st.speed);
        let inner = self.inner.clone();

        st.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !emit_batch(&inner, generation).await {
                    break;
                }
            }
        }));
    }
}

/// 1~3개의 무작위 여행을 방출합니다. 계속 방출해야 하면 `true`.
async fn emit_batch(inner: &Arc<SyntheticInner>, generation: u64) -> bool {
    let mut outgoing: Vec<FeedMessage> = Vec::new();
    let keep_going;

    {
        let mut st = inner.state.lock().await;
        if !st.running || st.generation != generation {
            return false;
        }

        let remaining = inner.target_total.saturating_sub(st.emitted);
        let count = {
            let mut rng = rand::thread_rng();
            rng.gen_range(1..=3).min(remaining)
        };

        if count > 0 {
            let trips: Vec<Trip> = {
                let mut rng = rand::thread_rng();
                (0..count).map(|_| random_trip(&mut rng)).collect()
            };
            st.emitted += count;

            debug!(count, emitted = st.emitted, "Emitting synthetic trips");
            let progress = ReplayProgress::new(st.emitted, inner.target_total);
            outgoing.push(FeedMessage::new_trips(trips, progress));
        }

        if st.emitted >= inner.target_total {
            st.running = false;
            outgoing.push(FeedMessage::session_complete(inner.target_total));
            info!(total = inner.target_total, "Synthetic feed complete");
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
impl FeedControl for SyntheticFeed {
    async fn start(&self) {
        let mut st = self.inner.state.lock().await;
        if st.running {
            return;
        }
        st.running = true;

        info!(target = self.inner.target_total, "Synthetic feed started");
        self.inner
            .bus
            .broadcast(&FeedMessage::session_started(self.inner.target_total));

        self.spawn_emitter(&mut st);
    }

    async fn pause(&self) {
        let mut st = self.inner.state.lock().await;
        if !st.running {
            return;
        }

        if let Some(task) = st.task.take() {
            task.abort();
        }
        st.generation += 1;
        st.running = false;

        debug!(emitted = st.emitted, "Synthetic feed paused");
        self.inner.bus.broadcast(&FeedMessage::session_paused());
    }

    async fn resume(&self) {
        {
            let st = self.inner.state.lock().await;
            if st.running {
                self.inner.bus.broadcast(&FeedMessage::session_resumed());
                return;
            }
        }

        self.start().await;
        self.inner.bus.broadcast(&FeedMessage::session_resumed());
    }

    async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(task) = st.task.take() {
            task.abort();
        }
        st.generation += 1;
        st.running = false;

        debug!(emitted = st.emitted, "Synthetic feed stopped");
        self.inner.bus.broadcast(&FeedMessage::session_stopped());
    }

    async fn set_speed(&self, speed: f64) {
        let clamped = clamp_speed(speed);
        {
            let mut st = self.inner.state.lock().await;
            st.speed = clamped;

            if st.running {
                if let Some(task) = st.task.take() {
                    task.abort();
                }
                self.spawn_emitter(&mut st);
            }
        }

        info!(speed = clamped, "Synthetic feed speed changed");
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
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    fn collect(bus: &NotificationBus) -> (StdArc<StdMutex<Vec<FeedMessage>>>, crate::bus::SubscriptionGuard) {
        let messages = StdArc::new(StdMutex::new(Vec::new()));
        let sink = messages.clone();
        let guard = bus.subscribe(move |msg| sink.lock().unwrap().push(msg.clone()));
        (messages, guard)
    }

    #[test]
    fn test_emit_interval_bounds() {
        assert_eq!(emit_interval(1.0), Duration::from_millis(2000));
        assert_eq!(emit_interval(50.0), Duration::from_millis(500));
        assert_eq!(emit_interval(0.1), Duration::from_millis(20000));
    }

    #[test]
    fn test_random_trip_uses_pool() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let trip = random_trip(&mut rng);
            assert_ne!(trip.start_station.id, trip.end_station.id);
            assert!(trip.id.is_some());
            assert!(trip.duration_secs >= 300);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_batches_of_one_to_three() {
        let bus = NotificationBus::new();
        let (messages, _guard) = collect(&bus);
        let feed = SyntheticFeed::new(
            bus,
            SyntheticConfig {
                speed: 50.0,
                target_total: 30,
            },
        );

        feed.start().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        feed.stop().await;

        let messages = messages.lock().unwrap();
        let batches: Vec<usize> = messages
            .iter()
            .filter_map(|m| match m {
                FeedMessage::NewTrips { trips, .. } => Some(trips.len()),
                _ => None,
            })
            .collect();

        assert!(!batches.is_empty());
        for len in batches {
            assert!((1..=3).contains(&len));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_target_total() {
        let bus = NotificationBus::new();
        let (messages, _guard) = collect(&bus);
        let feed = SyntheticFeed::new(
            bus,
            SyntheticConfig {
                speed: 50.0,
                target_total: 5,
            },
        );

        feed.start().await;

        for _ in 0..100 {
            if !feed.is_running().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        assert!(!feed.is_running().await);
        assert_eq!(feed.emitted().await, 5);
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, FeedMessage::SessionComplete { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_is_clamped() {
        let bus = NotificationBus::new();
        let feed = SyntheticFeed::new(bus, SyntheticConfig::default());

        feed.set_speed(9999.0).await;
        assert_eq!(feed.speed().await, 50.0);

        feed.set_speed(-1.0).await;
        assert_eq!(feed.speed().await, 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_halts_emission() {
        let bus = NotificationBus::new();
        let feed = SyntheticFeed::new(
            bus,
            SyntheticConfig {
                speed: 50.0,
                target_total: 1000,
            },
        );

        feed.start().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        feed.pause().await;

        let emitted = feed.emitted().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(feed.emitted().await, emitted);
    }
}
