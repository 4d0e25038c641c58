//! # Tripcast Feed
//!
//! 여행 로그를 실시간처럼 재생하는 피드 측 구성요소를 제공합니다:
//! - 가상 시계 기반 재생 엔진 (`ReplayEngine`)
//! - 관찰자 장애를 격리하는 알림 버스 (`NotificationBus`)
//! - 실 피드가 없을 때 사용하는 합성 피드 (`SyntheticFeed`)
//! - 두 피드가 공유하는 제어 인터페이스 (`FeedControl`)
//!
//! 컴포넌트 간 통신은 전부 `NotificationBus::broadcast`를 통해 이루어지며
//! 공유 가변 필드는 사용하지 않습니다.

pub mod bus;
pub mod control;
pub mod messages;
pub mod replay;
pub mod synthetic;

pub use bus::{NotificationBus, SubscriptionGuard};
pub use control::{clamp_speed, FeedControl, MAX_SPEED, MIN_SPEED};
pub use messages::{ControlCommand, FeedError, FeedMessage, ReplayProgress};
pub use replay::ReplayEngine;
pub use synthetic::SyntheticFeed;
