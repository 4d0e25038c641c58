//! 도메인 타입.
//!
//! 여행(Trip), 대여소(Station), 여행 로그 등 재생 시스템의 기본 도메인 모델.

mod trip;
mod trip_log;

pub use trip::{RiderType, Station, Trip};
pub use trip_log::TripLog;
