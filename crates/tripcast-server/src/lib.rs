//! # Tripcast Server
//!
//! 여행 로그를 WebSocket으로 실시간처럼 재생하는 피드 서버입니다:
//! - CSV 여행 로그 로더 (`loader`)
//! - WebSocket 엔드포인트와 제어 명령 브리지 (`handler`)
//!
//! 로그를 로드할 수 없으면 합성 피드로 기동합니다.

pub mod error;
pub mod handler;
pub mod loader;

pub use error::{ServerError, ServerResult};
pub use handler::{ws_router, WsState};
pub use loader::{load_trips_csv, parse_trips_csv};
