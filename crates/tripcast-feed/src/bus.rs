//! 알림 버스.
//!
//! 피드에서 등록된 모든 관찰자에게 메시지를 전달하는 프로세스 내 팬아웃
//! 메커니즘. 한 관찰자의 패닉이 나머지 전달을 막지 않습니다.
//!
//! 단일 구독자 기준으로 연속된 브로드캐스트는 호출 순서대로 전달되며,
//! 버스 내부에서 재정렬이나 배칭은 일어나지 않습니다.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{error, trace};

use crate::messages::FeedMessage;

type Handler = Arc<dyn Fn(&FeedMessage) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    /// 등록 순서를 유지하는 (id, handler) 목록
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// 프로세스 내 알림 버스.
///
/// 복제해도 같은 구독자 집합을 공유합니다.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    /// 새로운 버스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 관찰자를 등록합니다.
    ///
    /// 반환된 가드를 드롭하거나 `unsubscribe()`를 호출하면 구독이
    /// 해제됩니다.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionGuard
    where
        F: Fn(&FeedMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .expect("bus handler lock poisoned")
            .push((id, Arc::new(handler)));

        SubscriptionGuard {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// 현재 등록된 모든 관찰자에게 메시지를 전달합니다.
    ///
    /// 관찰자가 패닉하면 로그를 남기고 나머지 관찰자에게 계속
    /// 전달합니다. 전달은 동기적입니다.
    pub fn broadcast(&self, message: &FeedMessage) {
        // 전달 중 구독/해제가 가능하도록 잠금을 먼저 해제
        let handlers: Vec<(u64, Handler)> = self
            .inner
            .handlers
            .lock()
            .expect("bus handler lock poisoned")
            .clone();

        trace!(subscribers = handlers.len(), "Broadcasting feed message");

        for (id, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(message)));
            if let Err(panic) = result {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(subscriber = id, reason = %reason, "Feed observer panicked, skipping");
            }
        }
    }

    /// 현재 구독자 수.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .expect("bus handler lock poisoned")
            .len()
    }
}

/// 구독 해제 가드.
///
/// 드롭 시 자동으로 구독을 해제합니다.
pub struct SubscriptionGuard {
    bus: Weak<BusInner>,
    id: u64,
}

impl SubscriptionGuard {
    /// 명시적으로 구독을 해제합니다.
    pub fn unsubscribe(self) {
        // Drop이 해제를 수행
    }

    fn remove(&self) {
        if let Some(inner) = self.bus.upgrade() {
            if let Ok(mut handlers) = inner.handlers.lock() {
                handlers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.remove();
    }
}
