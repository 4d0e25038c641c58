//! # Tripcast Client
//!
//! 피드 소비자 측 구성요소를 제공합니다:
//! - 추상 채널 위의 연결/세션 관리 (`SessionManager`)
//! - WebSocket 채널 구현 (`WsFeedChannel`)과 테스트용 인메모리 채널
//! - 수신 메시지를 파생 상태로 환원하는 리듀서 (`TripReducer`)
//! - 합성 피드 폴백을 포함한 세션 파사드 (`LiveFeedSession`)

pub mod channel;
pub mod error;
pub mod live;
pub mod reducer;
pub mod session;

pub use channel::{ChannelEvent, FeedChannel, MemoryChannel, MemoryChannelHandle, WsFeedChannel};
pub use error::ClientError;
pub use live::LiveFeedSession;
pub use reducer::{
    attach_reducer, spawn_animation_driver, ActiveTrip, LiveStats, SharedReducer, TripReducer,
};
pub use session::{ConnectionState, SessionManager};
